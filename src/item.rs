//! The unit of work and its state machine.
//!
//! A [`WorkItem`] owns one uploaded file and, once processed, the output of
//! the processor that handled it. Transition methods are crate-private: the
//! batch engine is the only writer of `state`, and every transition checks
//! its source state so a late result can never overwrite a newer one.
//!
//! ```text
//!            begin_processing          complete
//!   Idle ─────────────────────▶ Processing ──────────▶ Complete
//!    ▲  ▲                        │    │    └─ fail ──▶ Error
//!    │  └──────── requeue ───────┘    └─ require_password ─▶ WaitingPassword
//!    └──────────────────── unlock_with ─────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

/// Opaque, stable identifier of a work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemId(Uuid);

impl ItemId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub const MEDIA_PDF: &str = "application/pdf";

/// An uploaded file: bytes plus declared media type.
///
/// Bytes are shared, so cloning a `SourceFile` into an in-flight extraction
/// is cheap.
#[derive(Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub name: String,
    pub media_type: String,
    pub bytes: Arc<[u8]>,
}

impl fmt::Debug for SourceFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceFile")
            .field("name", &self.name)
            .field("media_type", &self.media_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl SourceFile {
    pub fn new(name: impl Into<String>, media_type: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            name: name.into(),
            media_type: media_type.into(),
            bytes: bytes.into(),
        }
    }

    /// Build a file whose media type is guessed from its extension.
    pub fn from_bytes(name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        let name = name.into();
        let media_type = media_type_for(&name).to_string();
        Self::new(name, media_type, bytes)
    }

    /// Read a file from disk.
    pub async fn read(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());
        Ok(Self::from_bytes(name, bytes))
    }

    pub fn is_pdf(&self) -> bool {
        self.media_type == MEDIA_PDF || self.bytes.starts_with(b"%PDF")
    }

    /// Extension of the original name including the leading dot, or "".
    pub fn extension(&self) -> &str {
        match self.name.rfind('.') {
            Some(i) if i > 0 && i + 1 < self.name.len() => &self.name[i..],
            _ => "",
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

fn media_type_for(name: &str) -> &'static str {
    let ext = name.rsplit('.').next().unwrap_or("").to_ascii_lowercase();
    match ext.as_str() {
        "pdf" => MEDIA_PDF,
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        _ => "application/octet-stream",
    }
}

/// Kind of financial document. Steers the extraction prompt and the label in
/// the projected file name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Category {
    /// Payment receipt ("comprovante").
    #[default]
    Receipt,
    /// Bank slip ("boleto").
    BankSlip,
    /// Invoice ("nota fiscal").
    Invoice,
    /// Caller-supplied kind.
    Other(String),
}

impl Category {
    pub fn as_str(&self) -> &str {
        match self {
            Category::Receipt => "comprovante",
            Category::BankSlip => "boleto",
            Category::Invoice => "nf",
            Category::Other(s) => s,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_lowercase();
        Ok(match key.as_str() {
            "comprovante" | "receipt" => Category::Receipt,
            "boleto" | "bank-slip" | "bankslip" => Category::BankSlip,
            "nf" | "nota fiscal" | "nota_fiscal" | "invoice" => Category::Invoice,
            _ => Category::Other(s.trim().to_string()),
        })
    }
}

impl Serialize for Category {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Category {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let Ok(category) = s.parse::<Category>();
        Ok(category)
    }
}

/// Processing state of a single item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemState {
    Idle,
    Processing,
    Complete,
    Error,
    WaitingPassword,
}

/// One document tracked by a batch.
#[derive(Debug, Clone, Serialize)]
pub struct WorkItem<T> {
    id: ItemId,
    #[serde(skip)]
    file: SourceFile,
    original_name: String,
    category: Category,
    state: ItemState,
    extracted: Option<T>,
    error_message: Option<String>,
    /// Transient UI flag; not part of the state machine.
    pub editing: bool,
}

impl<T> WorkItem<T> {
    pub fn new(file: SourceFile, category: Category) -> Self {
        Self {
            id: ItemId::new(),
            original_name: file.name.clone(),
            file,
            category,
            state: ItemState::Idle,
            extracted: None,
            error_message: None,
            editing: false,
        }
    }

    pub fn id(&self) -> ItemId {
        self.id
    }

    pub fn file(&self) -> &SourceFile {
        &self.file
    }

    pub fn original_name(&self) -> &str {
        &self.original_name
    }

    pub fn category(&self) -> &Category {
        &self.category
    }

    pub fn state(&self) -> ItemState {
        self.state
    }

    /// Processor output. `Some` iff the item is `Complete`.
    pub fn extracted(&self) -> Option<&T> {
        self.extracted.as_ref()
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub(crate) fn extracted_mut(&mut self) -> Option<&mut T> {
        self.extracted.as_mut()
    }

    pub(crate) fn set_category(&mut self, category: Category) {
        self.category = category;
    }

    pub(crate) fn begin_processing(&mut self) -> bool {
        if self.state != ItemState::Idle {
            return false;
        }
        self.state = ItemState::Processing;
        true
    }

    pub(crate) fn complete(&mut self, output: T) -> bool {
        if self.state != ItemState::Processing {
            return false;
        }
        self.state = ItemState::Complete;
        self.extracted = Some(output);
        self.error_message = None;
        true
    }

    pub(crate) fn fail(&mut self, message: impl Into<String>) -> bool {
        if self.state != ItemState::Processing {
            return false;
        }
        self.state = ItemState::Error;
        self.extracted = None;
        self.error_message = Some(message.into());
        true
    }

    pub(crate) fn require_password(&mut self) -> bool {
        if self.state != ItemState::Processing {
            return false;
        }
        self.state = ItemState::WaitingPassword;
        self.extracted = None;
        self.error_message = None;
        true
    }

    /// Park the item back in `Idle` after a quota signal.
    pub(crate) fn requeue(&mut self) -> bool {
        if self.state != ItemState::Processing {
            return false;
        }
        self.state = ItemState::Idle;
        self.error_message = None;
        true
    }

    pub(crate) fn unlock_with(&mut self, file: SourceFile) -> bool {
        if self.state != ItemState::WaitingPassword {
            return false;
        }
        self.file = file;
        self.state = ItemState::Idle;
        self.error_message = None;
        true
    }

    pub(crate) fn reject_password(&mut self, message: impl Into<String>) -> bool {
        if self.state != ItemState::WaitingPassword {
            return false;
        }
        self.error_message = Some(message.into());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item() -> WorkItem<String> {
        WorkItem::new(SourceFile::from_bytes("a.pdf", b"%PDF-1.7".to_vec()), Category::Receipt)
    }

    #[test]
    fn new_item_is_idle_without_output() {
        let it = item();
        assert_eq!(it.state(), ItemState::Idle);
        assert!(it.extracted().is_none());
        assert_eq!(it.original_name(), "a.pdf");
    }

    #[test]
    fn complete_sets_output_and_clears_error() {
        let mut it = item();
        assert!(it.begin_processing());
        assert!(it.complete("ok".to_string()));
        assert_eq!(it.state(), ItemState::Complete);
        assert_eq!(it.extracted().map(String::as_str), Some("ok"));
        assert!(it.error_message().is_none());
    }

    #[test]
    fn outcomes_require_processing() {
        let mut it = item();
        assert!(!it.complete("x".into()));
        assert!(!it.fail("x"));
        assert!(!it.require_password());
        assert!(!it.requeue());
        assert_eq!(it.state(), ItemState::Idle);
        assert!(it.extracted().is_none());
    }

    #[test]
    fn begin_processing_only_from_idle() {
        let mut it = item();
        assert!(it.begin_processing());
        assert!(!it.begin_processing());
    }

    #[test]
    fn password_flow() {
        let mut it = item();
        it.begin_processing();
        assert!(it.require_password());
        assert!(it.error_message().is_none());
        assert!(it.reject_password("Incorrect password"));
        assert_eq!(it.state(), ItemState::WaitingPassword);
        assert_eq!(it.error_message(), Some("Incorrect password"));

        let unlocked = SourceFile::from_bytes("a.pdf", b"%PDF-1.7 open".to_vec());
        assert!(it.unlock_with(unlocked.clone()));
        assert_eq!(it.state(), ItemState::Idle);
        assert!(it.error_message().is_none());
        assert_eq!(it.file(), &unlocked);
    }

    #[test]
    fn extension_and_media_type() {
        let f = SourceFile::from_bytes("Scan.JPEG", vec![1u8]);
        assert_eq!(f.extension(), ".JPEG");
        assert_eq!(f.media_type, "image/jpeg");
        assert!(!f.is_pdf());
        assert_eq!(SourceFile::from_bytes("noext", vec![]).extension(), "");
        assert_eq!(SourceFile::from_bytes(".hidden", vec![]).extension(), "");
    }

    #[test]
    fn pdf_detected_by_magic_bytes() {
        let f = SourceFile::new("upload", "application/octet-stream", b"%PDF-1.4".to_vec());
        assert!(f.is_pdf());
    }

    #[test]
    fn category_parsing() {
        assert_eq!("boleto".parse::<Category>().unwrap(), Category::BankSlip);
        assert_eq!("NF".parse::<Category>().unwrap(), Category::Invoice);
        assert_eq!(
            "recibo aluguel".parse::<Category>().unwrap(),
            Category::Other("recibo aluguel".into())
        );
        assert_eq!(Category::Invoice.to_string(), "nf");
    }
}
