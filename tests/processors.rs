//! The three processors running inside a real batch: renaming, due-date
//! splitting and payment-code reading.

mod common;

use async_trait::async_trait;
use common::{config, pdf, PasswordUnlocker};
use edgequake_docbatch::{
    Category, DirectorySink, DocBatchError, DocumentBatch, DocumentExtractor, Download,
    DownloadSink, DueDateProcessor, ExtractError, FieldsPatch, ItemState, PaymentCodeProcessor,
    PaymentCodeSource, PaymentCodes, PdfError, PdfTools, RawFields, RenameProcessor, SourceFile,
};
use image::DynamicImage;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tokio_test::assert_ok;

/// Extractor answering from a name → fields table.
struct Table(HashMap<String, RawFields>);

impl Table {
    fn new(rows: &[(&str, RawFields)]) -> Arc<Self> {
        Arc::new(Self(
            rows.iter()
                .map(|(name, raw)| (name.to_string(), raw.clone()))
                .collect(),
        ))
    }
}

#[async_trait]
impl DocumentExtractor for Table {
    async fn extract(&self, file: &SourceFile, category: &Category) -> Result<RawFields, ExtractError> {
        assert!(
            !matches!(category, Category::Other(_)),
            "unexpected category {category}"
        );
        self.0
            .get(&file.name)
            .cloned()
            .ok_or_else(|| ExtractError::failed(format!("no fields for {}", file.name)))
    }
}

fn fields(date: &str, payee: &str, amount: &str) -> RawFields {
    RawFields {
        date: Some(date.into()),
        payee: Some(payee.into()),
        amount: Some(amount.into()),
        ..Default::default()
    }
}

/// Sink that keeps what it receives and when.
#[derive(Default)]
struct Recorder(Mutex<Vec<(String, Instant)>>);

#[async_trait]
impl DownloadSink for Recorder {
    async fn save(&self, download: &Download) -> Result<(), DocBatchError> {
        self.0
            .lock()
            .unwrap()
            .push((download.name.clone(), Instant::now()));
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn rename_batch_projects_names_and_staggers_downloads() {
    let extractor = Table::new(&[
        ("scan1.pdf", fields("25/12/2024", "joão / silva", "1.234,56")),
        ("scan2.jpg", fields("25122024", "JOÃO  SILVA", "1234,56")),
        ("scan3.pdf", fields("01012025", "Padaria", "9,90")),
    ]);
    let batch = DocumentBatch::new(
        RenameProcessor::new(extractor),
        Arc::new(PasswordUnlocker),
        &config(true),
    );
    let ids = batch.add_files(
        [pdf("scan1.pdf"), SourceFile::from_bytes("scan2.jpg", vec![1, 2, 3]), pdf("scan3.pdf")],
        Category::Invoice,
    );
    batch.add_files([pdf("unknown.pdf")], Category::Invoice);
    batch.settle().await;

    assert_eq!(batch.stats().complete, 3);
    assert_eq!(batch.stats().error, 1);
    assert_eq!(
        batch.download(ids[0]).unwrap().name,
        "25122024_JOÃO  SILVA_1234,56_NOTA FISCAL.pdf"
    );

    let sink = Recorder::default();
    assert_eq!(assert_ok!(batch.download_all(&sink).await), 3);
    let saved = sink.0.lock().unwrap().clone();
    let names: Vec<&str> = saved.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(
        names,
        [
            "25122024_JOÃO  SILVA_1234,56_NOTA FISCAL.pdf",
            "25122024_JOÃO  SILVA_1234,56_NOTA FISCAL.jpg",
            "01012025_PADARIA_9,90_NOTA FISCAL.pdf",
        ]
    );
    assert!(saved[1].1 - saved[0].1 >= Duration::from_millis(300));
    assert!(saved[2].1 - saved[1].1 >= Duration::from_millis(300));
}

#[tokio::test(start_paused = true)]
async fn manual_corrections_change_the_download_name_only() {
    let extractor = Table::new(&[("nf.pdf", fields("02022025", "Acme", "100,00"))]);
    let batch = DocumentBatch::new(
        RenameProcessor::new(extractor),
        Arc::new(PasswordUnlocker),
        &config(true),
    );
    let id = batch.add_files([pdf("nf.pdf")], Category::Invoice)[0];
    batch.settle().await;

    assert!(batch.update_item(
        id,
        FieldsPatch {
            payee: Some("Acme Ltda".into()),
            document_number: Some("4567".into()),
            ..Default::default()
        },
    ));
    let item = batch.item(id).unwrap();
    assert_eq!(item.state(), ItemState::Complete);
    assert_eq!(item.extracted().unwrap().original_amount, "100,00");
    assert_eq!(
        batch.download(id).unwrap().name,
        "02022025_ACME LTDA_4567_100,00_NOTA FISCAL.pdf"
    );

    batch.change_category(Category::Receipt);
    assert_eq!(
        batch.download(id).unwrap().name,
        "02022025_ACME LTDA_4567_100,00_COMPROVANTE.pdf"
    );
}

#[tokio::test]
async fn download_all_into_a_directory() {
    let extractor = Table::new(&[
        ("a.pdf", fields("03032025", "Luz", "50,00")),
        ("b.pdf", fields("03032025", "Luz", "50,00")),
    ]);
    let config = edgequake_docbatch::BatchConfig::builder()
        .pacing_delay(Duration::ZERO)
        .download_stagger(Duration::ZERO)
        .build()
        .unwrap();
    let batch = DocumentBatch::new(
        RenameProcessor::new(extractor),
        Arc::new(PasswordUnlocker),
        &config,
    );
    batch.add_files([pdf("a.pdf"), pdf("b.pdf")], Category::BankSlip);
    batch.settle().await;

    let dir = tempfile::tempdir().unwrap();
    let sink = DirectorySink::new(dir.path().join("out"));
    assert_eq!(batch.download_all(&sink).await.unwrap(), 2);

    let first = dir.path().join("out/03032025_LUZ_50,00_BOLETO.pdf");
    let second = dir.path().join("out/03032025_LUZ_50,00_BOLETO_2.pdf");
    assert_eq!(std::fs::read(first).unwrap(), b"%PDF-1.7 a.pdf");
    assert_eq!(std::fs::read(second).unwrap(), b"%PDF-1.7 b.pdf");
}

/// Splits into a fixed number of pages without touching pdfium.
struct FakeSplitter(usize);

#[async_trait]
impl PdfTools for FakeSplitter {
    async fn is_encrypted(&self, _: &SourceFile) -> Result<bool, PdfError> {
        Ok(false)
    }

    async fn split_pages(&self, file: &SourceFile) -> Result<Vec<SourceFile>, PdfError> {
        if !file.is_pdf() {
            return Err(PdfError::UnsupportedMedia(file.media_type.clone()));
        }
        Ok((0..self.0)
            .map(|i| {
                SourceFile::from_bytes(
                    edgequake_docbatch::pdf::page_file_name(&file.name, i),
                    format!("%PDF page {}", i + 1).into_bytes(),
                )
            })
            .collect())
    }

    async fn extract_page(&self, file: &SourceFile, _: usize) -> Result<SourceFile, PdfError> {
        Ok(file.clone())
    }

    async fn rasterize(&self, _: &SourceFile, _: usize, _: u32) -> Result<Vec<DynamicImage>, PdfError> {
        Ok(Vec::new())
    }
}

#[tokio::test(start_paused = true)]
async fn split_names_pages_by_due_date() {
    let extractor = Table::new(&[
        ("boletos_p1.pdf", fields("10/01/2025", "Água", "80,00")),
        ("boletos_p2.pdf", RawFields { payee: Some("Gás".into()), ..Default::default() }),
        ("boletos_p3.pdf", fields("10.01.2025", "Luz", "120,00")),
    ]);
    let batch = DocumentBatch::new(
        DueDateProcessor::new(extractor),
        Arc::new(PasswordUnlocker),
        &config(true),
    );
    let source = pdf("boletos.pdf");
    let ids = batch.split_document(&source, &FakeSplitter(3)).await.unwrap();
    assert_eq!(ids.len(), 3);
    batch.settle().await;

    let names: Vec<String> = batch.downloads().into_iter().map(|d| d.name).collect();
    assert_eq!(names, ["10012025.pdf", "SEM_DATA_2.pdf", "10012025_2.pdf"]);
    assert_eq!(
        batch.item(ids[1]).unwrap().extracted().unwrap().due_date,
        None
    );

    let image = SourceFile::from_bytes("photo.png", vec![0u8; 8]);
    assert!(matches!(
        batch.split_document(&image, &FakeSplitter(1)).await,
        Err(PdfError::UnsupportedMedia(_))
    ));
}

struct FixedCodes;

#[async_trait]
impl PaymentCodeSource for FixedCodes {
    async fn extract_codes(&self, file: &SourceFile) -> Result<PaymentCodes, ExtractError> {
        match file.name.as_str() {
            "both.pdf" => Ok(PaymentCodes::new(
                Some("8".repeat(47)),
                Some("000201...br.gov.bcb.pix".into()),
            )),
            "none.pdf" => Ok(PaymentCodes::new(None, None)),
            _ => Err(ExtractError::failed("unreadable")),
        }
    }
}

#[tokio::test(start_paused = true)]
async fn payment_code_batch_keeps_empty_results_complete() {
    let batch = DocumentBatch::new(
        PaymentCodeProcessor::new(Arc::new(FixedCodes)),
        Arc::new(PasswordUnlocker),
        &config(true),
    );
    let ids = batch.add_files(
        [pdf("both.pdf"), pdf("none.pdf"), pdf("bad.pdf")],
        Category::BankSlip,
    );
    batch.settle().await;

    let both = batch.item(ids[0]).unwrap();
    assert!(both.extracted().unwrap().found);
    let none = batch.item(ids[1]).unwrap();
    assert_eq!(none.state(), ItemState::Complete);
    assert!(!none.extracted().unwrap().found);
    assert_eq!(batch.item(ids[2]).unwrap().state(), ItemState::Error);

    // Unrenamed: downloads keep the original name.
    assert_eq!(batch.download(ids[1]).unwrap().name, "none.pdf");
    let json = serde_json::to_value(both.extracted().unwrap()).unwrap();
    assert_eq!(json["found"], true);
    assert_eq!(json["barLine"].as_str().map(str::len), Some(47));
}

#[tokio::test]
async fn odd_dates_never_escape_the_download_directory() {
    let extractor = Table::new(&[
        ("a.pdf", fields("../escaped", "Acme", "1,00")),
        ("b.pdf", fields("01022025", "Acme", "2,00")),
    ]);
    let config = edgequake_docbatch::BatchConfig::builder()
        .pacing_delay(Duration::ZERO)
        .download_stagger(Duration::ZERO)
        .build()
        .unwrap();
    let batch = DocumentBatch::new(
        RenameProcessor::new(extractor),
        Arc::new(PasswordUnlocker),
        &config,
    );
    let ids = batch.add_files([pdf("a.pdf"), pdf("b.pdf")], Category::Receipt);
    batch.settle().await;

    assert!(batch.update_item(
        ids[1],
        FieldsPatch {
            date: Some("25/12/2024".into()),
            ..Default::default()
        },
    ));
    assert_eq!(
        batch.download(ids[1]).unwrap().name,
        "25122024_ACME_2,00_COMPROVANTE.pdf"
    );

    let root = tempfile::tempdir().unwrap();
    let sink = DirectorySink::new(root.path().join("out"));
    assert_eq!(batch.download_all(&sink).await.unwrap(), 2);

    let mut outside: Vec<String> = std::fs::read_dir(root.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    outside.sort();
    assert_eq!(outside, ["out"]);
    let mut inside: Vec<String> = std::fs::read_dir(root.path().join("out"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    inside.sort();
    assert_eq!(
        inside,
        ["..ESCAPED_ACME_1,00_COMPROVANTE.pdf", "25122024_ACME_2,00_COMPROVANTE.pdf"]
    );
}
