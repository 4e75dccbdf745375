//! Payment codes of a boleto: the typeable bar line and the Pix "copia e
//! cola" payload.
//!
//! QR codes are decoded locally and are the only source of a Pix payload.
//! The bar line comes from the vision model, reduced to digits and accepted
//! only when its length matches a boleto or utility-bill line.

use crate::config::BatchConfig;
use crate::error::ExtractError;
use crate::item::SourceFile;
use crate::pdf::PdfTools;
use crate::prompts::{BAR_LINE_INSTRUCTION, BAR_LINE_SYSTEM_PROMPT};
use crate::qr::QrDecoder;
use crate::vision::DocumentReader;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

/// Shortest accepted bar line (utility bills use 44 or 48 digits, boletos 47).
pub const MIN_BAR_LINE_DIGITS: usize = 44;
pub const MAX_BAR_LINE_DIGITS: usize = 48;

const PIX_PREFIX: &str = "000201";
const PIX_GUI: &str = "br.gov.bcb.pix";
const MIN_PIX_LEN: usize = 50;

/// Codes read from one boleto.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentCodes {
    pub bar_line: Option<String>,
    pub pix_payload: Option<String>,
    /// True when at least one code was found.
    pub found: bool,
}

impl PaymentCodes {
    pub fn new(bar_line: Option<String>, pix_payload: Option<String>) -> Self {
        let found = bar_line.is_some() || pix_payload.is_some();
        Self {
            bar_line,
            pix_payload,
            found,
        }
    }
}

/// Reads the payment codes of one document.
#[async_trait]
pub trait PaymentCodeSource: Send + Sync {
    async fn extract_codes(&self, file: &SourceFile) -> Result<PaymentCodes, ExtractError>;
}

/// True for a static or dynamic Pix BR Code payload.
pub fn is_valid_pix(payload: &str) -> bool {
    let payload = payload.trim();
    payload.starts_with(PIX_PREFIX)
        && payload.to_lowercase().contains(PIX_GUI)
        && payload.len() >= MIN_PIX_LEN
}

/// Digits of a model reply when they form a plausible bar line.
pub fn clean_bar_line(reply: &str) -> Option<String> {
    let digits: String = reply.chars().filter(|c| c.is_ascii_digit()).collect();
    (MIN_BAR_LINE_DIGITS..=MAX_BAR_LINE_DIGITS)
        .contains(&digits.len())
        .then_some(digits)
}

/// [`PaymentCodeSource`] combining local QR decoding with a vision model.
pub struct PaymentCodeExtractor {
    pdf: Arc<dyn PdfTools>,
    qr: Arc<dyn QrDecoder>,
    reader: Arc<dyn DocumentReader>,
    config: BatchConfig,
}

impl PaymentCodeExtractor {
    pub fn new(
        pdf: Arc<dyn PdfTools>,
        qr: Arc<dyn QrDecoder>,
        reader: Arc<dyn DocumentReader>,
        config: BatchConfig,
    ) -> Self {
        Self {
            pdf,
            qr,
            reader,
            config,
        }
    }

    async fn find_pix(&self, file: &SourceFile) -> Result<Option<String>, ExtractError> {
        let pages = self
            .pdf
            .rasterize(file, self.config.max_pages, self.config.max_rendered_pixels)
            .await?;
        let qr = Arc::clone(&self.qr);
        let payloads = tokio::task::spawn_blocking(move || {
            pages.iter().flat_map(|p| qr.decode(p)).collect::<Vec<_>>()
        })
        .await
        .map_err(|e| ExtractError::failed(format!("QR task panicked: {e}")))?;
        debug!("'{}': {} QR payload(s)", file.name, payloads.len());
        Ok(payloads
            .into_iter()
            .map(|p| p.trim().to_string())
            .find(|p| is_valid_pix(p)))
    }
}

#[async_trait]
impl PaymentCodeSource for PaymentCodeExtractor {
    async fn extract_codes(&self, file: &SourceFile) -> Result<PaymentCodes, ExtractError> {
        if self.pdf.is_encrypted(file).await? {
            return Err(ExtractError::PasswordRequired);
        }

        let pix = self.find_pix(file).await?;

        let bar_line = match self
            .reader
            .read(file, BAR_LINE_SYSTEM_PROMPT, BAR_LINE_INSTRUCTION)
            .await
        {
            Ok(reply) => clean_bar_line(&reply),
            // A Pix code alone is a usable result.
            Err(ExtractError::Failed(msg)) if pix.is_some() => {
                warn!("'{}': bar line unreadable: {}", file.name, msg);
                None
            }
            Err(e) => return Err(e),
        };

        Ok(PaymentCodes::new(bar_line, pix))
    }
}
