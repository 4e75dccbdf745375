//! # edgequake-docbatch
//!
//! Batch processing of Brazilian financial documents (payment receipts,
//! bank slips, invoices) with Vision Language Models.
//!
//! Documents are queued, read one at a time by a vision model and renamed
//! to a canonical `date_PAYEE_[DOC]_amount_TYPE.ext` name. The same queue
//! splits multi-page boleto PDFs into one file per due date and reads the
//! bar line and Pix code of a boleto.
//!
//! ## Pipeline Overview
//!
//! ```text
//! files ─▶ DocumentBatch::add_files ─▶ ItemStore (FIFO)
//!                                        │
//!                           BatchQueue (one item at a time)
//!                                        │
//!       ┌─ pacing delay between calls ───┤
//!       │                                ▼
//!       │                 ItemProcessor::process
//!       │      (pdfium render ─▶ base64 PNG ─▶ VLM ─▶ JSON fields)
//!       │                                │
//!       │       Complete / Error / WaitingPassword / quota ─▶ Cooldown
//!       │                                ▼
//!       └──────────────── naming::project_name ─▶ download
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_docbatch::{
//!     BatchConfig, Category, DocumentBatch, PdfiumTools, RenameProcessor, SourceFile,
//!     VisionExtractor, VisionReader,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / GEMINI_API_KEY
//!     let config = BatchConfig::default();
//!     let pdf = Arc::new(PdfiumTools::new());
//!     let reader = Arc::new(VisionReader::from_config(pdf.clone(), config.clone())?);
//!     let batch = DocumentBatch::new(
//!         RenameProcessor::new(Arc::new(VisionExtractor::new(reader))),
//!         pdf,
//!         &config,
//!     );
//!
//!     let id = batch.add_files([SourceFile::read("boleto.pdf").await?], Category::BankSlip)[0];
//!     batch.settle().await;
//!     if let Some(download) = batch.download(id) {
//!         println!("{}", download.name);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `docbatch` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-docbatch = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod batch;
pub mod codes;
pub mod config;
pub mod error;
pub mod extract;
pub mod fields;
pub mod item;
pub mod naming;
pub mod pdf;
pub mod processor;
pub mod progress;
pub mod prompts;
pub mod qr;
pub mod queue;
pub mod store;
pub mod vision;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use batch::{BatchStats, DirectorySink, Download, DownloadSink, DocumentBatch};
pub use codes::{PaymentCodeExtractor, PaymentCodeSource, PaymentCodes};
pub use config::{BatchConfig, BatchConfigBuilder};
pub use error::{DocBatchError, ExtractError, PdfError, UnlockError};
pub use extract::{DocumentExtractor, VisionExtractor};
pub use fields::{ExtractedFields, FieldsPatch, RawFields};
pub use item::{Category, ItemId, ItemState, SourceFile, WorkItem};
pub use naming::project_name;
pub use pdf::{PdfTools, PdfiumTools, Unlocker};
pub use processor::{
    DueDateProcessor, ItemProcessor, PageDueDate, PaymentCodeProcessor, RenameProcessor,
};
pub use progress::{BatchProgressCallback, NoopProgressCallback, ProgressCallback};
pub use qr::{QrDecoder, RqrrDecoder};
pub use queue::{BatchQueue, RunOutcome, RunState, UnlockOutcome};
pub use vision::{resolve_provider, DocumentReader, VisionReader};
