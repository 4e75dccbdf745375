use super::ItemProcessor;
use crate::error::ExtractError;
use crate::extract::DocumentExtractor;
use crate::fields::normalize_date;
use crate::item::{Category, SourceFile, WorkItem};
use crate::naming::{page_name, split_extension};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

/// Due date read from one split page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageDueDate {
    /// `ddmmYYYY`, or None when the page shows no readable date.
    pub due_date: Option<String>,
}

/// Reads the due date of each page produced by the splitter. The extractor
/// is always asked about a bank slip, whatever the batch category says.
pub struct DueDateProcessor {
    extractor: Arc<dyn DocumentExtractor>,
}

impl DueDateProcessor {
    pub fn new(extractor: Arc<dyn DocumentExtractor>) -> Self {
        Self { extractor }
    }
}

#[async_trait]
impl ItemProcessor for DueDateProcessor {
    type Output = PageDueDate;

    async fn process(
        &self,
        file: &SourceFile,
        _category: &Category,
    ) -> Result<PageDueDate, ExtractError> {
        let raw = self.extractor.extract(file, &Category::BankSlip).await?;
        let due_date = raw
            .date
            .map(|d| normalize_date(&d))
            .filter(|d| d.len() == 8 && d.chars().all(|c| c.is_ascii_digit()));
        Ok(PageDueDate { due_date })
    }

    fn project_name(&self, item: &WorkItem<PageDueDate>, output: &PageDueDate) -> String {
        page_name(output.due_date.as_deref(), &page_label(item.original_name()))
    }
}

/// Page files are named `<stem>_p<N>.pdf` by the splitter; the label is `N`.
/// Foreign names fall back to their stem.
pub(crate) fn page_label(name: &str) -> String {
    let (stem, _) = split_extension(name);
    match stem.rsplit_once("_p") {
        Some((_, n)) if !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()) => n.to_string(),
        _ => stem.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::RawFields;
    use std::sync::Mutex;

    struct Recording {
        seen: Mutex<Vec<Category>>,
        date: Option<String>,
    }

    #[async_trait]
    impl DocumentExtractor for Recording {
        async fn extract(&self, _: &SourceFile, c: &Category) -> Result<RawFields, ExtractError> {
            self.seen.lock().unwrap().push(c.clone());
            Ok(RawFields {
                date: self.date.clone(),
                ..Default::default()
            })
        }
    }

    fn page(n: usize) -> SourceFile {
        SourceFile::from_bytes(format!("lote_p{n}.pdf"), b"%PDF".to_vec())
    }

    #[tokio::test]
    async fn always_asks_for_a_bank_slip() {
        let ex = Arc::new(Recording {
            seen: Mutex::new(vec![]),
            date: Some("10/01/2025".into()),
        });
        let p = DueDateProcessor::new(ex.clone());
        let out = p.process(&page(1), &Category::Invoice).await.unwrap();
        assert_eq!(out.due_date.as_deref(), Some("10012025"));
        assert_eq!(*ex.seen.lock().unwrap(), vec![Category::BankSlip]);
    }

    #[tokio::test]
    async fn unreadable_date_is_none() {
        let ex = Arc::new(Recording {
            seen: Mutex::new(vec![]),
            date: Some("sem vencimento".into()),
        });
        let p = DueDateProcessor::new(ex);
        let out = p.process(&page(1), &Category::BankSlip).await.unwrap();
        assert_eq!(out.due_date, None);
    }

    #[test]
    fn names_use_date_or_page_number() {
        let ex = Arc::new(Recording {
            seen: Mutex::new(vec![]),
            date: None,
        });
        let p = DueDateProcessor::new(ex);
        let item = WorkItem::new(page(7), Category::BankSlip);
        assert_eq!(
            p.project_name(&item, &PageDueDate { due_date: None }),
            "SEM_DATA_7.pdf"
        );
        assert_eq!(
            p.project_name(&item, &PageDueDate { due_date: Some("01022025".into()) }),
            "01022025.pdf"
        );
    }

    #[test]
    fn page_label_fallback() {
        assert_eq!(page_label("contas_p12.pdf"), "12");
        assert_eq!(page_label("avulso.pdf"), "avulso");
        assert_eq!(page_label("x_p.pdf"), "x_p");
    }
}
