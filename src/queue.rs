//! The batch queue engine.
//!
//! [`BatchQueue`] drains the `Idle` items of its [`ItemStore`] one at a time,
//! in enqueue order, through an [`ItemProcessor`].
//!
//! ## Pipeline
//!
//! ```text
//! run_queue ─▶ snapshot Idle ids ─▶ for each: begin_processing
//!                                             │
//!                         pacing sleep (not before the first) ─▶ process
//!                                             │
//!             ┌───────────────┬───────────────┼─────────────────┐
//!          Complete     WaitingPassword     Error     QuotaExceeded ─▶ requeue,
//!                                                     Cooldown, stop the pass
//! ```
//!
//! ## Run state
//!
//! [`RunState`] is `Idle`, `Running` or `Cooldown` and is published on a
//! `tokio::sync::watch` channel. Only one pass runs at a time: a `run_queue`
//! call while `Running` sets a rerun flag and the active run picks up new
//! `Idle` items when its pass ends. During `Cooldown` a call is a no-op; the
//! cooldown timer returns the batch to `Idle` and, with `auto_resume`,
//! starts the next pass itself.
//!
//! ## Cancellation
//!
//! Each batch generation owns a `CancellationToken`. [`BatchQueue::cancel_all`]
//! cancels it; the pacing sleep and the cooldown timer race the token, and
//! the token is checked before each step and after every await. A result
//! that resolves after cancellation is dropped. The next run installs a
//! fresh token.

use crate::config::BatchConfig;
use crate::error::{ExtractError, UnlockError};
use crate::item::{ItemId, ItemState};
use crate::pdf::Unlocker;
use crate::processor::ItemProcessor;
use crate::progress::{NoopProgressCallback, ProgressCallback};
use crate::store::ItemStore;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Batch-level run state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub enum RunState {
    Idle,
    Running,
    Cooldown,
}

/// How a `run_queue` call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// No `Idle` items; nothing changed.
    Empty,
    /// A run was already active; it will pick up the new items.
    Joined,
    /// The batch is cooling down after a quota signal.
    CoolingDown,
    /// Every eligible item was attempted.
    Finished { processed: usize },
    /// A quota signal paused the run; the batch is now in `Cooldown`.
    Paused,
    /// `cancel_all` was called while the run was active.
    Cancelled,
}

/// Result of [`BatchQueue::unlock`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnlockOutcome {
    /// The file was replaced and the item re-queued.
    Unlocked,
    /// The password was rejected; the item keeps waiting.
    IncorrectPassword,
    /// The unlock collaborator failed for another reason.
    Failed(String),
    /// The item exists but is not waiting for a password.
    NotWaiting,
    NotFound,
}

/// Message stored on an item whose password was rejected.
pub const INCORRECT_PASSWORD: &str = "Incorrect password";

/// Engine timings taken from [`BatchConfig`].
#[derive(Debug, Clone, Copy)]
struct Timings {
    pacing_delay: Duration,
    cooldown: Duration,
    auto_resume: bool,
}

struct Control {
    state: RunState,
    token: CancellationToken,
    rerun: bool,
}

struct Inner<P: ItemProcessor> {
    processor: P,
    unlocker: Arc<dyn Unlocker>,
    store: ItemStore<P::Output>,
    timings: Timings,
    callback: ProgressCallback,
    control: Mutex<Control>,
    state_tx: watch::Sender<RunState>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// Sequential, cancellable queue over an [`ItemStore`].
///
/// Cloning is cheap and every clone drives the same batch.
pub struct BatchQueue<P: ItemProcessor> {
    inner: Arc<Inner<P>>,
}

impl<P: ItemProcessor> Clone for BatchQueue<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P: ItemProcessor> BatchQueue<P> {
    pub fn new(processor: P, unlocker: Arc<dyn Unlocker>, config: &BatchConfig) -> Self {
        Self::with_progress(processor, unlocker, config, Arc::new(NoopProgressCallback))
    }

    pub fn with_progress(
        processor: P,
        unlocker: Arc<dyn Unlocker>,
        config: &BatchConfig,
        callback: ProgressCallback,
    ) -> Self {
        let (state_tx, _) = watch::channel(RunState::Idle);
        Self {
            inner: Arc::new(Inner {
                processor,
                unlocker,
                store: ItemStore::new(),
                timings: Timings {
                    pacing_delay: config.pacing_delay,
                    cooldown: config.cooldown,
                    auto_resume: config.auto_resume,
                },
                callback,
                control: Mutex::new(Control {
                    state: RunState::Idle,
                    token: CancellationToken::new(),
                    rerun: false,
                }),
                state_tx,
                tasks: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn store(&self) -> &ItemStore<P::Output> {
        &self.inner.store
    }

    pub fn processor(&self) -> &P {
        &self.inner.processor
    }

    pub fn run_state(&self) -> RunState {
        *self.inner.state_tx.borrow()
    }

    /// Watch run-state changes.
    pub fn subscribe(&self) -> watch::Receiver<RunState> {
        self.inner.state_tx.subscribe()
    }

    /// Process every `Idle` item, in order, until none is left, a quota
    /// signal pauses the batch or the batch is cancelled.
    pub async fn run_queue(&self) -> RunOutcome {
        Inner::run_queue(&self.inner).await
    }

    /// Re-run the queue over the current item set. A no-op without `Idle`
    /// items.
    pub async fn retry_queue(&self) -> RunOutcome {
        self.run_queue().await
    }

    /// Start `run_queue` in the background.
    pub fn spawn_run(&self) {
        Inner::spawn_run(&self.inner);
    }

    /// Freeze the batch: no further item or run-state mutation from work
    /// already in flight, and no cooldown auto-resume.
    pub fn cancel_all(&self) {
        let mut control = self.inner.control();
        control.token.cancel();
        control.rerun = false;
        self.inner.set_state(&mut control, RunState::Idle);
        info!("Batch cancelled");
    }

    /// Remove the password of a `WaitingPassword` item. On success the item
    /// returns to `Idle` and a queue pass is started in the background.
    pub async fn unlock(&self, id: ItemId, password: &str) -> UnlockOutcome {
        let inner = &self.inner;
        let file = match inner.store.with_item(id, |it| (it.state(), it.file().clone())) {
            None => return UnlockOutcome::NotFound,
            Some((ItemState::WaitingPassword, file)) => file,
            Some(_) => return UnlockOutcome::NotWaiting,
        };

        match inner.unlocker.unlock(&file, password).await {
            Ok(unlocked) => match inner.store.update(id, |it| it.unlock_with(unlocked)) {
                Some(true) => {
                    info!("Unlocked '{}'", file.name);
                    Inner::spawn_run(inner);
                    UnlockOutcome::Unlocked
                }
                Some(false) => UnlockOutcome::NotWaiting,
                None => UnlockOutcome::NotFound,
            },
            Err(UnlockError::IncorrectPassword) => {
                debug!("Wrong password for '{}'", file.name);
                inner
                    .store
                    .update(id, |it| it.reject_password(INCORRECT_PASSWORD));
                UnlockOutcome::IncorrectPassword
            }
            Err(UnlockError::Pdf(msg)) => {
                warn!("Could not unlock '{}': {}", file.name, msg);
                inner.store.update(id, |it| it.reject_password(msg.clone()));
                UnlockOutcome::Failed(msg)
            }
        }
    }

    /// Wait until no background task of this queue is pending. A pending
    /// cooldown timer counts; a cancelled one finishes at once.
    pub async fn settle(&self) {
        loop {
            let handles = std::mem::take(&mut *self.inner.tasks());
            if handles.is_empty() {
                break;
            }
            for handle in handles {
                if let Err(e) = handle.await {
                    warn!("Background batch task failed: {}", e);
                }
            }
        }
    }
}

impl<P: ItemProcessor> Inner<P> {
    fn control(&self) -> MutexGuard<'_, Control> {
        self.control.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn tasks(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.tasks.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, control: &mut Control, state: RunState) {
        if control.state != state {
            debug!("Run state {:?} → {:?}", control.state, state);
        }
        control.state = state;
        self.state_tx.send_replace(state);
    }

    fn track(&self, handle: JoinHandle<()>) {
        let mut tasks = self.tasks();
        tasks.retain(|h| !h.is_finished());
        tasks.push(handle);
    }

    fn spawn_run(this: &Arc<Self>) {
        let inner = Arc::clone(this);
        let handle = tokio::spawn(async move {
            let outcome = Inner::run_queue(&inner).await;
            debug!("Background run ended: {:?}", outcome);
        });
        this.track(handle);
    }

    /// Claim the batch for a new run. Returns the run's token and its first
    /// snapshot, or the outcome when no run starts.
    fn start_run(&self) -> Result<(CancellationToken, Vec<ItemId>), RunOutcome> {
        let mut control = self.control();
        match control.state {
            RunState::Running => {
                control.rerun = true;
                return Err(RunOutcome::Joined);
            }
            RunState::Cooldown => return Err(RunOutcome::CoolingDown),
            RunState::Idle => {}
        }
        let ids = self.store.idle_ids();
        if ids.is_empty() {
            return Err(RunOutcome::Empty);
        }
        if control.token.is_cancelled() {
            control.token = CancellationToken::new();
        }
        control.rerun = false;
        self.set_state(&mut control, RunState::Running);
        Ok((control.token.clone(), ids))
    }

    /// End of a pass: the next snapshot when a rerun was requested and
    /// there is work, otherwise the batch goes `Idle`.
    fn end_pass(&self, token: &CancellationToken) -> Result<Option<Vec<ItemId>>, RunOutcome> {
        let mut control = self.control();
        if token.is_cancelled() {
            return Err(RunOutcome::Cancelled);
        }
        if std::mem::take(&mut control.rerun) {
            let ids = self.store.idle_ids();
            if !ids.is_empty() {
                return Ok(Some(ids));
            }
        }
        self.set_state(&mut control, RunState::Idle);
        Ok(None)
    }

    async fn run_queue(this: &Arc<Self>) -> RunOutcome {
        let (token, mut ids) = match this.start_run() {
            Ok(run) => run,
            Err(outcome) => return outcome,
        };

        let mut processed = 0usize;
        let mut attempted = 0usize;
        loop {
            info!("Queue pass over {} item(s)", ids.len());
            this.callback.on_run_start(ids.len());

            for id in ids {
                if token.is_cancelled() {
                    return RunOutcome::Cancelled;
                }
                let claimed = this.store.update(id, |it| {
                    it.begin_processing().then(|| {
                        (
                            it.file().clone(),
                            it.category().clone(),
                            it.original_name().to_string(),
                        )
                    })
                });
                // Deleted, or already handled by an earlier pass.
                let Some(Some((file, category, name))) = claimed else {
                    continue;
                };

                if attempted > 0 {
                    tokio::select! {
                        _ = token.cancelled() => return RunOutcome::Cancelled,
                        _ = tokio::time::sleep(this.timings.pacing_delay) => {}
                    }
                    let still_claimed = this
                        .store
                        .with_item(id, |it| it.state() == ItemState::Processing)
                        .unwrap_or(false);
                    if !still_claimed {
                        debug!("'{}' removed while waiting; skipped", name);
                        continue;
                    }
                }
                attempted += 1;

                this.callback.on_item_start(id, &name);
                debug!("Processing '{}'", name);
                let result = this.processor.process(&file, &category).await;
                if token.is_cancelled() {
                    debug!("Dropping result for '{}' after cancellation", name);
                    return RunOutcome::Cancelled;
                }

                match result {
                    Ok(output) => {
                        if this.store.update(id, |it| it.complete(output)) == Some(true) {
                            processed += 1;
                            info!("'{}' complete", name);
                            this.callback.on_item_complete(id, &name);
                        }
                    }
                    Err(ExtractError::PasswordRequired) => {
                        if this.store.update(id, |it| it.require_password()) == Some(true) {
                            info!("'{}' needs a password", name);
                            this.callback.on_password_required(id, &name);
                        }
                    }
                    Err(ExtractError::QuotaExceeded) => {
                        this.store.update(id, |it| it.requeue());
                        Inner::enter_cooldown(this, &token);
                        return RunOutcome::Paused;
                    }
                    Err(ExtractError::Failed(message)) => {
                        if this.store.update(id, |it| it.fail(message.clone())) == Some(true) {
                            warn!("'{}' failed: {}", name, message);
                            this.callback.on_item_error(id, &name, &message);
                        }
                    }
                }
            }

            match this.end_pass(&token) {
                Err(outcome) => return outcome,
                Ok(Some(next)) => ids = next,
                Ok(None) => break,
            }
        }

        info!("Queue finished: {} item(s) complete", processed);
        this.callback.on_run_complete(processed);
        this.callback.on_ready();
        RunOutcome::Finished { processed }
    }

    fn enter_cooldown(this: &Arc<Self>, token: &CancellationToken) {
        {
            let mut control = this.control();
            if token.is_cancelled() {
                return;
            }
            control.rerun = false;
            this.set_state(&mut control, RunState::Cooldown);
        }
        let delay = this.timings.cooldown;
        warn!("Quota exceeded; cooling down for {:?}", delay);
        this.callback.on_cooldown(delay);

        let inner = Arc::clone(this);
        let token = token.clone();
        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!("Cooldown timer cancelled");
                }
                _ = tokio::time::sleep(delay) => {
                    Inner::finish_cooldown(&inner, &token).await;
                }
            }
        });
        this.track(handle);
    }

    async fn finish_cooldown(this: &Arc<Self>, token: &CancellationToken) {
        {
            let mut control = this.control();
            if token.is_cancelled() || control.state != RunState::Cooldown {
                return;
            }
            this.set_state(&mut control, RunState::Idle);
        }
        info!("Cooldown over; batch ready");
        this.callback.on_ready();
        if this.timings.auto_resume {
            let outcome = Inner::run_queue(this).await;
            debug!("Auto-resumed run ended: {:?}", outcome);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::{Category, SourceFile, WorkItem};
    use async_trait::async_trait;

    struct Echo;

    #[async_trait]
    impl ItemProcessor for Echo {
        type Output = String;

        async fn process(&self, file: &SourceFile, _: &Category) -> Result<String, ExtractError> {
            Ok(file.name.to_uppercase())
        }
    }

    struct NoUnlock;

    #[async_trait]
    impl Unlocker for NoUnlock {
        async fn unlock(&self, _: &SourceFile, _: &str) -> Result<SourceFile, UnlockError> {
            Err(UnlockError::IncorrectPassword)
        }
    }

    fn queue() -> BatchQueue<Echo> {
        let config = BatchConfig::builder()
            .pacing_delay(Duration::from_millis(10))
            .build()
            .unwrap();
        BatchQueue::new(Echo, Arc::new(NoUnlock), &config)
    }

    fn add(q: &BatchQueue<Echo>, name: &str) -> ItemId {
        let item = WorkItem::new(
            SourceFile::from_bytes(name, b"x".to_vec()),
            Category::Receipt,
        );
        let id = item.id();
        q.store().extend([item]);
        id
    }

    #[tokio::test(start_paused = true)]
    async fn empty_queue_stays_idle() {
        let q = queue();
        let rx = q.subscribe();
        assert_eq!(q.run_queue().await, RunOutcome::Empty);
        assert_eq!(q.run_state(), RunState::Idle);
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn completes_items() {
        let q = queue();
        let id = add(&q, "a.pdf");
        assert_eq!(q.run_queue().await, RunOutcome::Finished { processed: 1 });
        let item = q.store().get(id).unwrap();
        assert_eq!(item.state(), ItemState::Complete);
        assert_eq!(item.extracted().map(String::as_str), Some("A.PDF"));
        assert_eq!(q.run_state(), RunState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_batch_does_not_run_until_called_again() {
        let q = queue();
        q.cancel_all();
        add(&q, "a.pdf");
        assert_eq!(q.run_queue().await, RunOutcome::Finished { processed: 1 });
    }

    #[tokio::test(start_paused = true)]
    async fn unlock_of_idle_item_is_rejected() {
        let q = queue();
        let id = add(&q, "a.pdf");
        assert_eq!(q.unlock(id, "x").await, UnlockOutcome::NotWaiting);
        assert_eq!(q.unlock(ItemId::new(), "x").await, UnlockOutcome::NotFound);
    }
}
