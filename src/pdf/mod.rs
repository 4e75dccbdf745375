//! PDF utilities the batch relies on.
//!
//! The queue engine and the processors only see the [`PdfTools`] and
//! [`Unlocker`] contracts; [`PdfiumTools`] is the production implementation
//! on top of pdfium.
//!
//! ```text
//! is_encrypted ─▶ unlock ─▶ split_pages / extract_page ─▶ rasterize ─▶ encode
//! ```

pub mod encode;
mod pdfium;

pub use pdfium::PdfiumTools;

use crate::error::{PdfError, UnlockError};
use crate::item::SourceFile;
use async_trait::async_trait;
use image::DynamicImage;

/// Page-level operations on an uploaded file.
#[async_trait]
pub trait PdfTools: Send + Sync {
    /// True if the file is a PDF that cannot be opened without a password.
    async fn is_encrypted(&self, file: &SourceFile) -> Result<bool, PdfError>;

    /// One single-page PDF per page, in page order. Page files are named
    /// `<stem>_p<N>.pdf` with `N` starting at 1.
    async fn split_pages(&self, file: &SourceFile) -> Result<Vec<SourceFile>, PdfError>;

    /// A single-page PDF holding page `index` (0-based).
    async fn extract_page(&self, file: &SourceFile, index: usize) -> Result<SourceFile, PdfError>;

    /// Render up to `max_pages` leading pages, longest edge capped at
    /// `max_pixels`. Images are decoded and scaled the same way.
    async fn rasterize(
        &self,
        file: &SourceFile,
        max_pages: usize,
        max_pixels: u32,
    ) -> Result<Vec<DynamicImage>, PdfError>;
}

/// Removes the password of a protected file.
#[async_trait]
pub trait Unlocker: Send + Sync {
    /// A replacement file that opens without a password.
    async fn unlock(&self, file: &SourceFile, password: &str) -> Result<SourceFile, UnlockError>;
}

/// File name of page `index` (0-based) split out of `source_name`.
pub fn page_file_name(source_name: &str, index: usize) -> String {
    let (stem, _) = crate::naming::split_extension(source_name);
    format!("{}_p{}.pdf", stem, index + 1)
}
