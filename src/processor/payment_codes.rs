use super::ItemProcessor;
use crate::codes::{PaymentCodeSource, PaymentCodes};
use crate::error::ExtractError;
use crate::item::{Category, SourceFile};
use async_trait::async_trait;
use std::sync::Arc;

/// Reads the bar line and Pix payload of each boleto in a batch.
///
/// A boleto with neither code still completes, with `found == false`; the
/// caller lists it as "nothing found" rather than as a failure.
pub struct PaymentCodeProcessor {
    source: Arc<dyn PaymentCodeSource>,
}

impl PaymentCodeProcessor {
    pub fn new(source: Arc<dyn PaymentCodeSource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl ItemProcessor for PaymentCodeProcessor {
    type Output = PaymentCodes;

    async fn process(
        &self,
        file: &SourceFile,
        _category: &Category,
    ) -> Result<PaymentCodes, ExtractError> {
        self.source.extract_codes(file).await
    }
}
