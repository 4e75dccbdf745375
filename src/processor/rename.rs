use super::ItemProcessor;
use crate::error::ExtractError;
use crate::extract::DocumentExtractor;
use crate::fields::{today, ExtractedFields};
use crate::item::{Category, SourceFile, WorkItem};
use crate::naming::project_name;
use async_trait::async_trait;
use std::sync::Arc;

/// Extract date, payee and amount and derive the canonical file name.
pub struct RenameProcessor {
    extractor: Arc<dyn DocumentExtractor>,
}

impl RenameProcessor {
    pub fn new(extractor: Arc<dyn DocumentExtractor>) -> Self {
        Self { extractor }
    }
}

#[async_trait]
impl ItemProcessor for RenameProcessor {
    type Output = ExtractedFields;

    async fn process(
        &self,
        file: &SourceFile,
        category: &Category,
    ) -> Result<ExtractedFields, ExtractError> {
        let raw = self.extractor.extract(file, category).await?;
        if raw.is_empty() {
            return Err(ExtractError::failed("No fields could be read from the document"));
        }
        Ok(ExtractedFields::from_raw(raw, &today()))
    }

    fn project_name(&self, item: &WorkItem<ExtractedFields>, output: &ExtractedFields) -> String {
        project_name(output, item.category(), item.file().extension())
    }
}
