//! pdfium-backed implementation of the PDF utilities.
//!
//! pdfium is not async-safe, so every operation runs inside
//! `tokio::task::spawn_blocking` and binds the library afresh on that thread.

use super::{page_file_name, PdfTools, Unlocker};
use crate::error::{PdfError, UnlockError};
use crate::item::{SourceFile, MEDIA_PDF};
use async_trait::async_trait;
use image::imageops::FilterType;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::sync::Arc;
use tracing::{debug, info};

/// PDF utilities on top of the system pdfium library.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfiumTools;

impl PdfiumTools {
    pub fn new() -> Self {
        Self
    }
}

async fn blocking<T, F>(f: F) -> Result<T, PdfError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, PdfError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| PdfError::Internal(format!("pdfium task panicked: {e}")))?
}

#[async_trait]
impl PdfTools for PdfiumTools {
    async fn is_encrypted(&self, file: &SourceFile) -> Result<bool, PdfError> {
        if !file.is_pdf() {
            return Ok(false);
        }
        let bytes = Arc::clone(&file.bytes);
        blocking(move || {
            let pdfium = Pdfium::default();
            let encrypted = match pdfium.load_pdf_from_byte_slice(&bytes, None) {
                Ok(_) => Ok(false),
                Err(e) => match classify_load_error(&e, false) {
                    PdfError::PasswordRequired => Ok(true),
                    other => Err(other),
                },
            };
            encrypted
        })
        .await
    }

    async fn split_pages(&self, file: &SourceFile) -> Result<Vec<SourceFile>, PdfError> {
        require_pdf(file)?;
        let bytes = Arc::clone(&file.bytes);
        let name = file.name.clone();
        blocking(move || {
            let pdfium = Pdfium::default();
            let source = open(&pdfium, &bytes, None)?;
            let total = source.pages().len() as usize;
            info!("Splitting '{}' into {} pages", name, total);
            (0..total)
                .map(|idx| copy_pages(&pdfium, &source, &[idx]).map(|b| page_file(&name, idx, b)))
                .collect()
        })
        .await
    }

    async fn extract_page(&self, file: &SourceFile, index: usize) -> Result<SourceFile, PdfError> {
        require_pdf(file)?;
        let bytes = Arc::clone(&file.bytes);
        let name = file.name.clone();
        blocking(move || {
            let pdfium = Pdfium::default();
            let source = open(&pdfium, &bytes, None)?;
            let total = source.pages().len() as usize;
            if index >= total {
                return Err(PdfError::PageOutOfRange {
                    page: index + 1,
                    total,
                });
            }
            let out = copy_pages(&pdfium, &source, &[index])?;
            Ok(page_file(&name, index, out))
        })
        .await
    }

    async fn rasterize(
        &self,
        file: &SourceFile,
        max_pages: usize,
        max_pixels: u32,
    ) -> Result<Vec<DynamicImage>, PdfError> {
        let bytes = Arc::clone(&file.bytes);
        if !file.is_pdf() {
            if !file.media_type.starts_with("image/") {
                return Err(PdfError::UnsupportedMedia(file.media_type.clone()));
            }
            return blocking(move || {
                let img = image::load_from_memory(&bytes)
                    .map_err(|e| PdfError::Image(e.to_string()))?;
                Ok(vec![cap_size(img, max_pixels)])
            })
            .await;
        }
        blocking(move || render_blocking(&bytes, max_pages, max_pixels)).await
    }
}

#[async_trait]
impl Unlocker for PdfiumTools {
    async fn unlock(&self, file: &SourceFile, password: &str) -> Result<SourceFile, UnlockError> {
        require_pdf(file)?;
        let bytes = Arc::clone(&file.bytes);
        let password = password.to_string();
        let name = file.name.clone();
        let out = blocking(move || {
            let pdfium = Pdfium::default();
            let source = open(&pdfium, &bytes, Some(password.as_str()))?;
            let total = source.pages().len() as usize;
            // A document built from copied pages carries no security handler.
            let indices: Vec<usize> = (0..total).collect();
            copy_pages(&pdfium, &source, &indices)
        })
        .await?;
        info!("Removed password from '{}'", name);
        Ok(SourceFile::new(name, MEDIA_PDF, out))
    }
}

fn require_pdf(file: &SourceFile) -> Result<(), PdfError> {
    if file.is_pdf() {
        Ok(())
    } else {
        Err(PdfError::UnsupportedMedia(file.media_type.clone()))
    }
}

fn open<'a>(
    pdfium: &'a Pdfium,
    bytes: &'a [u8],
    password: Option<&'a str>,
) -> Result<PdfDocument<'a>, PdfError> {
    pdfium
        .load_pdf_from_byte_slice(bytes, password)
        .map_err(|e| classify_load_error(&e, password.is_some()))
}

fn classify_load_error(e: &PdfiumError, password_given: bool) -> PdfError {
    let err_str = format!("{:?}", e);
    if err_str.contains("Password") || err_str.contains("password") {
        if password_given {
            PdfError::WrongPassword
        } else {
            PdfError::PasswordRequired
        }
    } else {
        PdfError::Corrupt(err_str)
    }
}

/// Copy `indices` of `source` into a fresh document and serialise it.
fn copy_pages(pdfium: &Pdfium, source: &PdfDocument, indices: &[usize]) -> Result<Vec<u8>, PdfError> {
    let mut target = pdfium
        .create_new_pdf()
        .map_err(|e| PdfError::Internal(format!("{:?}", e)))?;
    for (dest, &idx) in indices.iter().enumerate() {
        target
            .pages_mut()
            .copy_page_from_document(source, idx as u16, dest as u16)
            .map_err(|e| PdfError::Internal(format!("copy page {}: {:?}", idx + 1, e)))?;
    }
    target
        .save_to_bytes()
        .map_err(|e| PdfError::Internal(format!("{:?}", e)))
}

fn page_file(source_name: &str, index: usize, bytes: Vec<u8>) -> SourceFile {
    SourceFile::new(page_file_name(source_name, index), MEDIA_PDF, bytes)
}

fn render_blocking(
    bytes: &[u8],
    max_pages: usize,
    max_pixels: u32,
) -> Result<Vec<DynamicImage>, PdfError> {
    let pdfium = Pdfium::default();
    let document = open(&pdfium, bytes, None)?;
    let pages = document.pages();
    let total = pages.len() as usize;

    let render_config = PdfRenderConfig::new()
        .set_target_width(max_pixels as i32)
        .set_maximum_height(max_pixels as i32);

    let mut images = Vec::with_capacity(total.min(max_pages));
    for idx in 0..total.min(max_pages) {
        let page = pages
            .get(idx as u16)
            .map_err(|e| PdfError::RasterisationFailed {
                page: idx + 1,
                detail: format!("{:?}", e),
            })?;
        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| PdfError::RasterisationFailed {
                page: idx + 1,
                detail: format!("{:?}", e),
            })?;
        let image = bitmap.as_image();
        debug!(
            "Rendered page {} → {}x{} px",
            idx + 1,
            image.width(),
            image.height()
        );
        images.push(image);
    }
    Ok(images)
}

/// Scale down so the longest edge is at most `max_pixels`.
fn cap_size(img: DynamicImage, max_pixels: u32) -> DynamicImage {
    if img.width() <= max_pixels && img.height() <= max_pixels {
        img
    } else {
        img.resize(max_pixels, max_pixels, FilterType::Triangle)
    }
}
