//! Per-item work plugged into the queue engine.
//!
//! The renamer, the splitter's page analysis and the payment-code reader
//! all drain their items with the same [`crate::queue::BatchQueue`]. What
//! differs is the call made for one file and how a finished item is named,
//! which is what an [`ItemProcessor`] supplies.
//!
//! | Processor | Output | Used by |
//! |-----------|--------|---------|
//! | [`RenameProcessor`]      | [`crate::fields::ExtractedFields`] | renamer |
//! | [`DueDateProcessor`]     | [`PageDueDate`]                     | splitter |
//! | [`PaymentCodeProcessor`] | [`crate::codes::PaymentCodes`]      | boleto code reader |

mod due_date;
mod payment_codes;
mod rename;

pub use due_date::{DueDateProcessor, PageDueDate};
pub use payment_codes::PaymentCodeProcessor;
pub use rename::RenameProcessor;

use crate::error::ExtractError;
use crate::item::{Category, SourceFile, WorkItem};
use async_trait::async_trait;

/// Work done for one item by the queue engine.
///
/// `process` must classify its failures: the engine maps
/// [`ExtractError::PasswordRequired`] to `WaitingPassword`,
/// [`ExtractError::QuotaExceeded`] to a batch cooldown and everything else
/// to `Error`.
#[async_trait]
pub trait ItemProcessor: Send + Sync + 'static {
    type Output: Clone + Send + Sync + 'static;

    async fn process(
        &self,
        file: &SourceFile,
        category: &Category,
    ) -> Result<Self::Output, ExtractError>;

    /// Download name of a `Complete` item.
    fn project_name(&self, item: &WorkItem<Self::Output>, _output: &Self::Output) -> String {
        item.original_name().to_string()
    }
}
