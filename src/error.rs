//! Error types for the edgequake-docbatch library.
//!
//! Errors are split by the level at which they are handled:
//!
//! * [`ExtractError`] — **Item level**: one document could not be processed.
//!   The batch engine never propagates it; it converts it into the item's
//!   state (`WaitingPassword`, `Error`) or into batch back-off (`Cooldown`).
//!
//! * [`UnlockError`] — **Item level**: a password supplied for a protected
//!   file was rejected. The item stays in `WaitingPassword`.
//!
//! * [`PdfError`] — failures of the PDF utilities (split, unlock, rasterise).
//!
//! * [`DocBatchError`] — **Fatal**: the operation cannot proceed at all
//!   (bad configuration, provider not configured, unreadable output folder).

use std::path::PathBuf;
use thiserror::Error;

/// Outcome of a failed extraction, already classified by the collaborator
/// adapter. The batch engine matches on these variants only; it never looks
/// at message text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    /// The file is encrypted; a password must be supplied before retrying.
    #[error("document is password protected")]
    PasswordRequired,

    /// The provider asked us to slow down (quota exhausted, HTTP 429).
    #[error("extraction quota exceeded")]
    QuotaExceeded,

    /// Any other failure. Terminal for the item.
    #[error("{0}")]
    Failed(String),
}

impl ExtractError {
    pub fn failed(message: impl Into<String>) -> Self {
        ExtractError::Failed(message.into())
    }
}

impl From<PdfError> for ExtractError {
    fn from(e: PdfError) -> Self {
        match e {
            PdfError::PasswordRequired => ExtractError::PasswordRequired,
            other => ExtractError::Failed(other.to_string()),
        }
    }
}

/// Failure to remove the password from a protected file.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnlockError {
    #[error("Incorrect password")]
    IncorrectPassword,

    #[error("Could not unlock file: {0}")]
    Pdf(String),
}

impl From<PdfError> for UnlockError {
    fn from(e: PdfError) -> Self {
        match e {
            PdfError::WrongPassword | PdfError::PasswordRequired => UnlockError::IncorrectPassword,
            other => UnlockError::Pdf(other.to_string()),
        }
    }
}

/// Errors raised by the PDF utilities.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PdfError {
    /// PDF requires a password but none was provided.
    #[error("PDF is encrypted and requires a password")]
    PasswordRequired,

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF")]
    WrongPassword,

    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF is corrupt: {0}")]
    Corrupt(String),

    /// Requested page index exceeds the page count.
    #[error("Page {page} is out of range (document has {total} pages)")]
    PageOutOfRange { page: usize, total: usize },

    /// pdfium returned an error while rendering a page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    /// The file is neither a PDF nor a decodable image.
    #[error("Unsupported media type '{0}'")]
    UnsupportedMedia(String),

    /// Image decoding or encoding failed.
    #[error("Image error: {0}")]
    Image(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Fatal errors returned by the library entry points.
#[derive(Debug, Error)]
pub enum DocBatchError {
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// Could not read an input file.
    #[error("Failed to read '{path}': {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Could not write a downloaded file.
    #[error("Failed to write '{path}': {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Pdf(#[from] PdfError),
}
