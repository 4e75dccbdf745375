//! Progress-callback trait for batch events.
//!
//! Inject an [`Arc<dyn BatchProgressCallback>`] into a
//! [`crate::batch::DocumentBatch`] to receive events as the queue engine
//! moves items through their states. The shell decides what to do with
//! them: a terminal progress bar, a toast, a websocket message.
//!
//! # Example
//!
//! ```rust
//! use edgequake_docbatch::{BatchProgressCallback, ItemId};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! #[derive(Default)]
//! struct Counting {
//!     done: AtomicUsize,
//! }
//!
//! impl BatchProgressCallback for Counting {
//!     fn on_item_complete(&self, _id: ItemId, name: &str) {
//!         let n = self.done.fetch_add(1, Ordering::SeqCst) + 1;
//!         eprintln!("{n}: {name}");
//!     }
//! }
//! ```

use crate::item::ItemId;
use std::sync::Arc;
use std::time::Duration;

/// Called by the queue engine as it processes a batch.
///
/// All methods have default no-op implementations. Events of one batch are
/// emitted sequentially, but the engine may run on any runtime thread, hence
/// `Send + Sync`.
pub trait BatchProgressCallback: Send + Sync {
    /// A queue pass starts with `total` eligible items.
    fn on_run_start(&self, total: usize) {
        let _ = total;
    }

    /// The extractor is about to be called for an item.
    fn on_item_start(&self, id: ItemId, name: &str) {
        let _ = (id, name);
    }

    /// An item reached `Complete`.
    fn on_item_complete(&self, id: ItemId, name: &str) {
        let _ = (id, name);
    }

    /// An item reached `Error`.
    fn on_item_error(&self, id: ItemId, name: &str, error: &str) {
        let _ = (id, name, error);
    }

    /// An item is waiting for a password.
    fn on_password_required(&self, id: ItemId, name: &str) {
        let _ = (id, name);
    }

    /// The provider signalled a quota problem; the batch pauses for `delay`.
    fn on_cooldown(&self, delay: Duration) {
        let _ = delay;
    }

    /// The batch is idle again and can accept work (after a full pass or a
    /// cooldown).
    fn on_ready(&self) {}

    /// A pass ended normally after processing `processed` items.
    fn on_run_complete(&self, processed: usize) {
        let _ = processed;
    }
}

/// A no-op implementation, the default when no callback is configured.
pub struct NoopProgressCallback;

impl BatchProgressCallback for NoopProgressCallback {}

/// Convenience alias for the stored callback type.
pub type ProgressCallback = Arc<dyn BatchProgressCallback>;
