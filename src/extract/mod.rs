//! Field extraction: one document in, [`RawFields`] out.
//!
//! [`DocumentExtractor`] is the seam the processors depend on. The
//! production [`VisionExtractor`] sends the document to a
//! [`DocumentReader`] with the category-specific prompt and parses the JSON
//! reply; tests plug in scripted extractors instead.

mod parse;

pub use parse::{clean_reply, parse_fields};

use crate::error::ExtractError;
use crate::fields::RawFields;
use crate::item::{Category, SourceFile};
use crate::prompts::{category_instruction, DEFAULT_SYSTEM_PROMPT};
use crate::vision::DocumentReader;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Reads the structured fields of one document.
///
/// Implementations classify their own failures; see [`ExtractError`].
#[async_trait]
pub trait DocumentExtractor: Send + Sync {
    async fn extract(&self, file: &SourceFile, category: &Category)
        -> Result<RawFields, ExtractError>;
}

/// [`DocumentExtractor`] that asks a vision model for a JSON object.
pub struct VisionExtractor {
    reader: Arc<dyn DocumentReader>,
    system_prompt: Option<String>,
}

impl VisionExtractor {
    pub fn new(reader: Arc<dyn DocumentReader>) -> Self {
        Self {
            reader,
            system_prompt: None,
        }
    }

    /// Replace the built-in system prompt.
    pub fn with_system_prompt(mut self, prompt: Option<String>) -> Self {
        self.system_prompt = prompt;
        self
    }
}

#[async_trait]
impl DocumentExtractor for VisionExtractor {
    async fn extract(
        &self,
        file: &SourceFile,
        category: &Category,
    ) -> Result<RawFields, ExtractError> {
        let system = self.system_prompt.as_deref().unwrap_or(DEFAULT_SYSTEM_PROMPT);
        let reply = self
            .reader
            .read(file, system, &category_instruction(category))
            .await?;
        let fields = parse_fields(&reply)?;
        debug!("'{}': extracted {:?}", file.name, fields);
        Ok(fields)
    }
}
