//! Configuration types for batch document processing.
//!
//! All batch behaviour is controlled through [`BatchConfig`], built via its
//! [`BatchConfigBuilder`]. One struct holds the pacing and back-off timings
//! of the queue engine as well as the knobs of the vision extractor, so a
//! config can be cloned into every collaborator that needs it.

use crate::error::DocBatchError;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Default substrings that mark a provider error as a quota / rate-limit signal.
pub const DEFAULT_QUOTA_MARKERS: &[&str] = &["quota", "429", "exceeded"];

/// Configuration for a document batch.
///
/// # Example
/// ```rust
/// use edgequake_docbatch::BatchConfig;
/// use std::time::Duration;
///
/// let config = BatchConfig::builder()
///     .pacing_delay(Duration::from_secs(2))
///     .model("gpt-4.1-mini")
///     .build()
///     .unwrap();
/// assert_eq!(config.pacing_delay, Duration::from_secs(2));
/// ```
#[derive(Clone)]
pub struct BatchConfig {
    /// Wait inserted before every extraction call except the first of a run.
    /// Default: 4 s.
    ///
    /// Free-tier vision APIs allow roughly 15 requests per minute. Spacing
    /// calls keeps a long batch under that ceiling instead of tripping it
    /// and falling into cooldown.
    pub pacing_delay: Duration,

    /// How long the batch stays in `Cooldown` after a quota signal. Default: 15 s.
    pub cooldown: Duration,

    /// Restart the queue automatically when the cooldown elapses. Default: true.
    ///
    /// When false the batch returns to `Idle` and waits for an explicit
    /// retry.
    pub auto_resume: bool,

    /// Delay between files handed to a download sink. Default: 300 ms.
    pub download_stagger: Duration,

    /// LLM model identifier. If None, uses the provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "gemini", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.1.
    pub temperature: f32,

    /// Maximum tokens the model may generate per document. Default: 1024.
    ///
    /// The reply is a small JSON object; 1 024 leaves room for the
    /// `explanation` field without letting a confused model ramble.
    pub max_tokens: usize,

    /// Pages of a PDF sent to the model. Default: 2.
    ///
    /// Receipts and slips carry everything on the first page; the second
    /// catches invoices whose totals spill over.
    pub max_pages: usize,

    /// Longest edge of a rasterised page, in pixels. Default: 2000.
    pub max_rendered_pixels: u32,

    /// Per-call timeout for the vision model, in seconds. Default: 60.
    pub api_timeout_secs: u64,

    /// Retries for a failed vision call that is not a quota signal. Default: 2.
    pub max_retries: u32,

    /// Base back-off between retries, doubled on each attempt. Default: 500 ms.
    pub retry_backoff_ms: u64,

    /// Case-insensitive substrings that classify a provider error as a quota
    /// signal. Default: [`DEFAULT_QUOTA_MARKERS`].
    pub quota_markers: Vec<String>,

    /// Custom system prompt. If None, uses the built-in prompt.
    pub system_prompt: Option<String>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            pacing_delay: Duration::from_secs(4),
            cooldown: Duration::from_secs(15),
            auto_resume: true,
            download_stagger: Duration::from_millis(300),
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.1,
            max_tokens: 1024,
            max_pages: 2,
            max_rendered_pixels: 2000,
            api_timeout_secs: 60,
            max_retries: 2,
            retry_backoff_ms: 500,
            quota_markers: DEFAULT_QUOTA_MARKERS.iter().map(|s| s.to_string()).collect(),
            system_prompt: None,
        }
    }
}

impl fmt::Debug for BatchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchConfig")
            .field("pacing_delay", &self.pacing_delay)
            .field("cooldown", &self.cooldown)
            .field("auto_resume", &self.auto_resume)
            .field("download_stagger", &self.download_stagger)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_pages", &self.max_pages)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("quota_markers", &self.quota_markers)
            .finish()
    }
}

impl BatchConfig {
    /// Create a new builder for `BatchConfig`.
    pub fn builder() -> BatchConfigBuilder {
        BatchConfigBuilder {
            config: Self::default(),
        }
    }

    /// True if `message` matches one of the configured quota markers.
    pub fn is_quota_message(&self, message: &str) -> bool {
        let lower = message.to_lowercase();
        self.quota_markers
            .iter()
            .any(|m| !m.is_empty() && lower.contains(&m.to_lowercase()))
    }
}

/// Builder for [`BatchConfig`].
#[derive(Debug)]
pub struct BatchConfigBuilder {
    config: BatchConfig,
}

impl BatchConfigBuilder {
    pub fn pacing_delay(mut self, delay: Duration) -> Self {
        self.config.pacing_delay = delay;
        self
    }

    pub fn cooldown(mut self, delay: Duration) -> Self {
        self.config.cooldown = delay;
        self
    }

    pub fn auto_resume(mut self, v: bool) -> Self {
        self.config.auto_resume = v;
        self
    }

    pub fn download_stagger(mut self, delay: Duration) -> Self {
        self.config.download_stagger = delay;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_pages(mut self, n: usize) -> Self {
        self.config.max_pages = n;
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn quota_markers<I, S>(mut self, markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.quota_markers = markers.into_iter().map(Into::into).collect();
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<BatchConfig, DocBatchError> {
        let c = &self.config;
        if c.max_pages == 0 {
            return Err(DocBatchError::InvalidConfig(
                "max_pages must be ≥ 1".into(),
            ));
        }
        if c.max_tokens == 0 {
            return Err(DocBatchError::InvalidConfig(
                "max_tokens must be ≥ 1".into(),
            ));
        }
        if c.api_timeout_secs == 0 {
            return Err(DocBatchError::InvalidConfig(
                "api_timeout_secs must be ≥ 1".into(),
            ));
        }
        if c.quota_markers.iter().all(|m| m.trim().is_empty()) {
            return Err(DocBatchError::InvalidConfig(
                "at least one quota marker is required".into(),
            ));
        }
        Ok(self.config)
    }
}
