//! Scripted collaborators shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use edgequake_docbatch::{
    BatchConfig, BatchProgressCallback, Category, ExtractError, ItemId, ItemProcessor,
    SourceFile, UnlockError, Unlocker,
};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// Bytes that make [`Scripted`] report a password-protected file.
pub const LOCKED: &[u8] = b"locked";

/// Per-file replies and delays for [`Scripted`]. Files without a scripted
/// reply succeed with `done:<name>`.
#[derive(Default)]
pub struct Script {
    replies: Mutex<HashMap<String, VecDeque<Result<String, ExtractError>>>>,
    delays: Mutex<HashMap<String, Duration>>,
    calls: Mutex<Vec<(String, Instant)>>,
}

impl Script {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reply(&self, name: &str, reply: Result<String, ExtractError>) {
        self.replies
            .lock()
            .unwrap()
            .entry(name.to_string())
            .or_default()
            .push_back(reply);
    }

    pub fn delay(&self, name: &str, delay: Duration) {
        self.delays.lock().unwrap().insert(name.to_string(), delay);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|(n, _)| n.clone()).collect()
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().iter().map(|(_, t)| *t).collect()
    }
}

/// Processor driven by a [`Script`].
pub struct Scripted(pub Arc<Script>);

#[async_trait]
impl ItemProcessor for Scripted {
    type Output = String;

    async fn process(&self, file: &SourceFile, _: &Category) -> Result<String, ExtractError> {
        let script = &self.0;
        script
            .calls
            .lock()
            .unwrap()
            .push((file.name.clone(), Instant::now()));
        let delay = script.delays.lock().unwrap().get(&file.name).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if &*file.bytes == LOCKED {
            return Err(ExtractError::PasswordRequired);
        }
        let reply = script
            .replies
            .lock()
            .unwrap()
            .get_mut(&file.name)
            .and_then(VecDeque::pop_front);
        reply.unwrap_or_else(|| Ok(format!("done:{}", file.name)))
    }
}

/// Accepts only the password `right`.
pub struct PasswordUnlocker;

#[async_trait]
impl Unlocker for PasswordUnlocker {
    async fn unlock(&self, file: &SourceFile, password: &str) -> Result<SourceFile, UnlockError> {
        if password == "right" {
            Ok(SourceFile::new(
                file.name.clone(),
                file.media_type.clone(),
                b"%PDF-unlocked".to_vec(),
            ))
        } else {
            Err(UnlockError::IncorrectPassword)
        }
    }
}

/// Records callback events as short strings.
#[derive(Default)]
pub struct Events(Mutex<Vec<String>>);

impl Events {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.0.lock().unwrap())
    }

    fn push(&self, event: String) {
        self.0.lock().unwrap().push(event);
    }
}

impl BatchProgressCallback for Events {
    fn on_item_complete(&self, _id: ItemId, name: &str) {
        self.push(format!("complete:{name}"));
    }

    fn on_item_error(&self, _id: ItemId, name: &str, error: &str) {
        self.push(format!("error:{name}:{error}"));
    }

    fn on_password_required(&self, _id: ItemId, name: &str) {
        self.push(format!("password:{name}"));
    }

    fn on_cooldown(&self, delay: Duration) {
        self.push(format!("cooldown:{}", delay.as_secs()));
    }

    fn on_ready(&self) {
        self.push("ready".to_string());
    }
}

/// Default timings: 4 s pacing, 15 s cooldown.
pub fn config(auto_resume: bool) -> BatchConfig {
    BatchConfig::builder()
        .pacing_delay(Duration::from_secs(4))
        .cooldown(Duration::from_secs(15))
        .download_stagger(Duration::from_millis(300))
        .auto_resume(auto_resume)
        .build()
        .unwrap()
}

pub fn pdf(name: &str) -> SourceFile {
    SourceFile::from_bytes(name, format!("%PDF-1.7 {name}").into_bytes())
}

pub fn locked_pdf(name: &str) -> SourceFile {
    SourceFile::new(name, "application/pdf", LOCKED.to_vec())
}
