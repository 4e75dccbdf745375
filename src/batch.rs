//! Control surface: the operations a shell performs on a batch.
//!
//! [`DocumentBatch`] wraps a [`BatchQueue`] and adds the user-facing edits
//! (category changes, field corrections, deletes) and the download path.
//! Every operation is a short read-modify-write on the shared item store
//! plus, where it adds work, a background queue pass.
//!
//! # Example
//!
//! ```rust,no_run
//! use edgequake_docbatch::{
//!     BatchConfig, Category, DirectorySink, DocumentBatch, PdfiumTools, RenameProcessor,
//!     SourceFile, VisionExtractor, VisionReader,
//! };
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = BatchConfig::default();
//! let pdf = Arc::new(PdfiumTools::new());
//! let reader = Arc::new(VisionReader::from_config(pdf.clone(), config.clone())?);
//! let extractor = Arc::new(VisionExtractor::new(reader));
//! let batch = DocumentBatch::new(RenameProcessor::new(extractor), pdf, &config);
//!
//! batch.add_files([SourceFile::read("receipt.pdf").await?], Category::Receipt);
//! batch.settle().await;
//! batch.download_all(&DirectorySink::new("renamed")).await?;
//! # Ok(())
//! # }
//! ```

use crate::config::BatchConfig;
use crate::error::{DocBatchError, PdfError};
use crate::fields::{ExtractedFields, FieldsPatch};
use crate::item::{Category, ItemId, ItemState, SourceFile, WorkItem};
use crate::naming::{dedupe_names, split_extension};
use crate::pdf::{PdfTools, Unlocker};
use crate::processor::{DueDateProcessor, ItemProcessor, RenameProcessor};
use crate::progress::ProgressCallback;
use crate::queue::{BatchQueue, RunOutcome, RunState, UnlockOutcome};
use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};

/// Item counts per state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchStats {
    pub idle: usize,
    pub processing: usize,
    pub complete: usize,
    pub error: usize,
    pub waiting_password: usize,
}

impl BatchStats {
    pub fn total(&self) -> usize {
        self.idle + self.processing + self.complete + self.error + self.waiting_password
    }
}

/// A completed item's file under its projected name.
#[derive(Debug, Clone)]
pub struct Download {
    pub id: ItemId,
    pub name: String,
    pub file: SourceFile,
}

/// Destination of downloaded files.
#[async_trait]
pub trait DownloadSink: Send + Sync {
    async fn save(&self, download: &Download) -> Result<(), DocBatchError>;
}

/// Writes downloads into a directory. A name that already exists gets a
/// ` (n)` suffix instead of being overwritten.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `download` and return the path actually used. Only the last
    /// component of the download name is used, so files never land outside
    /// the directory.
    pub async fn write(&self, download: &Download) -> Result<PathBuf, DocBatchError> {
        let name = flat_name(&download.name).ok_or_else(|| DocBatchError::WriteFailed {
            path: self.dir.join(&download.name),
            source: std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("'{}' is not a file name", download.name),
            ),
        })?;
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| DocBatchError::WriteFailed {
                path: self.dir.clone(),
                source,
            })?;
        let path = self.free_path(name).await;
        tokio::fs::write(&path, &download.file.bytes)
            .await
            .map_err(|source| DocBatchError::WriteFailed {
                path: path.clone(),
                source,
            })?;
        info!("Wrote {}", path.display());
        Ok(path)
    }

    async fn free_path(&self, name: &str) -> PathBuf {
        let candidate = self.dir.join(name);
        if !exists(&candidate).await {
            return candidate;
        }
        let (stem, ext) = split_extension(name);
        let mut n = 1;
        loop {
            let candidate = self.dir.join(format!("{stem} ({n}){ext}"));
            if !exists(&candidate).await {
                return candidate;
            }
            n += 1;
        }
    }
}

/// Last normal component of `name`, with `\\` treated as a separator too.
fn flat_name(name: &str) -> Option<&str> {
    let last = name.rsplit(['/', '\\']).next()?.trim();
    match last {
        "" | "." | ".." => None,
        _ => Some(last),
    }
}

async fn exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

#[async_trait]
impl DownloadSink for DirectorySink {
    async fn save(&self, download: &Download) -> Result<(), DocBatchError> {
        self.write(download).await.map(|_| ())
    }
}

/// A batch of documents and the operations a shell performs on it.
pub struct DocumentBatch<P: ItemProcessor> {
    queue: BatchQueue<P>,
    download_stagger: Duration,
}

impl<P: ItemProcessor> Clone for DocumentBatch<P> {
    fn clone(&self) -> Self {
        Self {
            queue: self.queue.clone(),
            download_stagger: self.download_stagger,
        }
    }
}

impl<P: ItemProcessor> DocumentBatch<P> {
    pub fn new(processor: P, unlocker: Arc<dyn Unlocker>, config: &BatchConfig) -> Self {
        Self::from_queue(BatchQueue::new(processor, unlocker, config), config)
    }

    pub fn with_progress(
        processor: P,
        unlocker: Arc<dyn Unlocker>,
        config: &BatchConfig,
        callback: ProgressCallback,
    ) -> Self {
        Self::from_queue(
            BatchQueue::with_progress(processor, unlocker, config, callback),
            config,
        )
    }

    fn from_queue(queue: BatchQueue<P>, config: &BatchConfig) -> Self {
        Self {
            queue,
            download_stagger: config.download_stagger,
        }
    }

    pub fn queue(&self) -> &BatchQueue<P> {
        &self.queue
    }

    /// Append `files` as `Idle` items and start a queue pass in the
    /// background. Must be called from within a Tokio runtime.
    pub fn add_files(
        &self,
        files: impl IntoIterator<Item = SourceFile>,
        category: Category,
    ) -> Vec<ItemId> {
        let items: Vec<WorkItem<P::Output>> = files
            .into_iter()
            .map(|f| WorkItem::new(f, category.clone()))
            .collect();
        let ids: Vec<ItemId> = items.iter().map(WorkItem::id).collect();
        if ids.is_empty() {
            return ids;
        }
        info!("Adding {} file(s) as {}", ids.len(), category);
        self.queue.store().extend(items);
        self.queue.spawn_run();
        ids
    }

    /// Reassign the category of every item. Nothing is reprocessed.
    pub fn change_category(&self, category: Category) {
        self.queue
            .store()
            .for_each_mut(|it| it.set_category(category.clone()));
    }

    /// Edit the output of a `Complete` item in place. Returns false when the
    /// item is gone or has no output.
    pub fn edit_output(&self, id: ItemId, f: impl FnOnce(&mut P::Output)) -> bool {
        self.queue
            .store()
            .update(id, |it| it.extracted_mut().map(f).is_some())
            .unwrap_or(false)
    }

    pub fn set_editing(&self, id: ItemId, editing: bool) -> bool {
        self.queue
            .store()
            .update(id, |it| it.editing = editing)
            .is_some()
    }

    /// Remove an item whatever its state. A result still in flight for it
    /// is discarded when it arrives.
    pub fn delete_item(&self, id: ItemId) -> bool {
        let removed = self.queue.store().remove(id);
        if removed {
            debug!("Deleted item {}", id);
        }
        removed
    }

    /// Cancel all work and drop every item. Does nothing unless `confirmed`.
    pub fn clear_all(&self, confirmed: bool) -> usize {
        if !confirmed {
            return 0;
        }
        self.queue.cancel_all();
        let n = self.queue.store().clear();
        info!("Cleared {} item(s)", n);
        n
    }

    /// Run the queue again over the `Idle` items.
    pub async fn retry(&self) -> RunOutcome {
        self.queue.retry_queue().await
    }

    pub async fn unlock(&self, id: ItemId, password: &str) -> UnlockOutcome {
        self.queue.unlock(id, password).await
    }

    pub fn items(&self) -> Vec<WorkItem<P::Output>> {
        self.queue.store().snapshot()
    }

    pub fn item(&self, id: ItemId) -> Option<WorkItem<P::Output>> {
        self.queue.store().get(id)
    }

    pub fn stats(&self) -> BatchStats {
        let mut stats = BatchStats::default();
        for state in self.queue.store().map(WorkItem::state) {
            match state {
                ItemState::Idle => stats.idle += 1,
                ItemState::Processing => stats.processing += 1,
                ItemState::Complete => stats.complete += 1,
                ItemState::Error => stats.error += 1,
                ItemState::WaitingPassword => stats.waiting_password += 1,
            }
        }
        stats
    }

    pub fn run_state(&self) -> RunState {
        self.queue.run_state()
    }

    pub fn subscribe(&self) -> watch::Receiver<RunState> {
        self.queue.subscribe()
    }

    /// Wait for background queue work to finish.
    pub async fn settle(&self) {
        self.queue.settle().await;
    }

    /// The file of a `Complete` item under its projected name.
    pub fn download(&self, id: ItemId) -> Option<Download> {
        let processor = self.queue.processor();
        self.queue
            .store()
            .with_item(id, |it| {
                it.extracted().map(|out| Download {
                    id,
                    name: processor.project_name(it, out),
                    file: it.file().clone(),
                })
            })
            .flatten()
    }

    /// Every `Complete` item, in enqueue order, with repeated names made
    /// unique.
    pub fn downloads(&self) -> Vec<Download> {
        let processor = self.queue.processor();
        let mut downloads: Vec<Download> = self
            .queue
            .store()
            .map(|it| {
                it.extracted().map(|out| Download {
                    id: it.id(),
                    name: processor.project_name(it, out),
                    file: it.file().clone(),
                })
            })
            .into_iter()
            .flatten()
            .collect();
        let names: Vec<String> = downloads.iter().map(|d| d.name.clone()).collect();
        for (download, name) in downloads.iter_mut().zip(dedupe_names(&names)) {
            download.name = name;
        }
        downloads
    }

    /// Hand every `Complete` item to `sink`, waiting `download_stagger`
    /// between files. Returns how many files were saved.
    pub async fn download_all(&self, sink: &dyn DownloadSink) -> Result<usize, DocBatchError> {
        let downloads = self.downloads();
        for (i, download) in downloads.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.download_stagger).await;
            }
            sink.save(download).await?;
        }
        Ok(downloads.len())
    }
}

impl DocumentBatch<RenameProcessor> {
    /// Correct the extracted fields of a `Complete` item.
    pub fn update_item(&self, id: ItemId, patch: FieldsPatch) -> bool {
        self.edit_output(id, |fields: &mut ExtractedFields| fields.apply(patch))
    }
}

impl DocumentBatch<DueDateProcessor> {
    /// Split `file` into single pages and queue each page for due-date
    /// reading.
    pub async fn split_document(
        &self,
        file: &SourceFile,
        pdf: &dyn PdfTools,
    ) -> Result<Vec<ItemId>, PdfError> {
        let pages = pdf.split_pages(file).await?;
        info!("'{}' split into {} page(s)", file.name, pages.len());
        Ok(self.add_files(pages, Category::BankSlip))
    }
}
