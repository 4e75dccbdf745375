//! Vision-model access: rasterise a document and ask the provider about it.
//!
//! [`VisionReader`] is the only code that talks to an LLM. It classifies
//! provider failures before they leave this module: quota / rate-limit
//! messages become [`ExtractError::QuotaExceeded`], everything else becomes
//! [`ExtractError::Failed`]. Callers never inspect message text.
//!
//! ## Retry Strategy
//!
//! Non-quota failures (timeouts, 5xx) are retried with exponential backoff
//! (`retry_backoff_ms * 2^attempt`). Quota failures are returned at once;
//! the batch handles them with its cooldown.

use crate::config::BatchConfig;
use crate::error::{DocBatchError, ExtractError};
use crate::item::SourceFile;
use crate::pdf::encode::encode_page;
use crate::pdf::PdfTools;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, warn};

/// Model used when a provider is named without one.
pub const DEFAULT_MODEL: &str = "gpt-4.1-nano";

/// Sends a document to a vision model and returns its text reply.
#[async_trait]
pub trait DocumentReader: Send + Sync {
    async fn read(
        &self,
        file: &SourceFile,
        system_prompt: &str,
        instruction: &str,
    ) -> Result<String, ExtractError>;
}

/// [`DocumentReader`] over an `edgequake_llm` provider.
pub struct VisionReader {
    provider: Arc<dyn LLMProvider>,
    pdf: Arc<dyn PdfTools>,
    config: BatchConfig,
}

impl VisionReader {
    pub fn new(provider: Arc<dyn LLMProvider>, pdf: Arc<dyn PdfTools>, config: BatchConfig) -> Self {
        Self {
            provider,
            pdf,
            config,
        }
    }

    /// Build a reader with the provider resolved from `config` or the
    /// environment; see [`resolve_provider`].
    pub fn from_config(pdf: Arc<dyn PdfTools>, config: BatchConfig) -> Result<Self, DocBatchError> {
        let provider = resolve_provider(&config)?;
        Ok(Self::new(provider, pdf, config))
    }

    async fn chat_once(&self, messages: &[ChatMessage]) -> Result<String, String> {
        let options = build_options(&self.config);
        let limit = Duration::from_secs(self.config.api_timeout_secs);
        match timeout(limit, self.provider.chat(messages, Some(&options))).await {
            Ok(Ok(response)) => {
                debug!(
                    "{} input tokens, {} output tokens",
                    response.prompt_tokens, response.completion_tokens
                );
                Ok(response.content)
            }
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!(
                "vision call timed out after {}s",
                self.config.api_timeout_secs
            )),
        }
    }
}

#[async_trait]
impl DocumentReader for VisionReader {
    async fn read(
        &self,
        file: &SourceFile,
        system_prompt: &str,
        instruction: &str,
    ) -> Result<String, ExtractError> {
        if self.pdf.is_encrypted(file).await? {
            return Err(ExtractError::PasswordRequired);
        }

        let pages = self
            .pdf
            .rasterize(file, self.config.max_pages, self.config.max_rendered_pixels)
            .await?;
        if pages.is_empty() {
            return Err(ExtractError::failed("Document has no pages"));
        }
        let images = pages
            .iter()
            .map(encode_page)
            .collect::<Result<Vec<_>, _>>()?;

        let messages = vec![
            ChatMessage::system(system_prompt),
            ChatMessage::user_with_images(instruction, images),
        ];

        let start = Instant::now();
        let mut last_err = String::new();
        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let backoff = backoff_ms(self.config.retry_backoff_ms, attempt);
                warn!(
                    "'{}': retry {}/{} after {}ms",
                    file.name, attempt, self.config.max_retries, backoff
                );
                sleep(Duration::from_millis(backoff)).await;
            }

            match self.chat_once(&messages).await {
                Ok(content) => {
                    debug!("'{}': answered in {:?}", file.name, start.elapsed());
                    return Ok(content);
                }
                Err(msg) => {
                    let classified = classify_provider_error(&msg, &self.config);
                    if classified == ExtractError::QuotaExceeded {
                        warn!("'{}': quota signal from provider: {}", file.name, msg);
                        return Err(classified);
                    }
                    warn!("'{}': attempt {} failed: {}", file.name, attempt + 1, msg);
                    last_err = msg;
                }
            }
        }
        Err(ExtractError::Failed(last_err))
    }
}

/// Delay before retry number `attempt` (1-based): `base * 2^(attempt-1)`,
/// saturating instead of overflowing.
fn backoff_ms(base: u64, attempt: u32) -> u64 {
    base.saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)))
}

/// Map a provider error message to the typed outcome the batch acts on.
pub fn classify_provider_error(message: &str, config: &BatchConfig) -> ExtractError {
    if config.is_quota_message(message) {
        ExtractError::QuotaExceeded
    } else {
        ExtractError::Failed(message.to_string())
    }
}

fn build_options(config: &BatchConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

/// Resolve the LLM provider, in order of precedence:
///
/// 1. `config.provider`
/// 2. `config.provider_name` with `config.model`
/// 3. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`
/// 4. OpenAI when `OPENAI_API_KEY` is set
/// 5. whatever `ProviderFactory::from_env` detects
pub fn resolve_provider(config: &BatchConfig) -> Result<Arc<dyn LLMProvider>, DocBatchError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
    if let Some(ref name) = config.provider_name {
        return create_vision_provider(name, model);
    }

    if let (Ok(prov), Ok(env_model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !env_model.is_empty() {
            return create_vision_provider(&prov, &env_model);
        }
    }

    if std::env::var("OPENAI_API_KEY").is_ok_and(|k| !k.is_empty()) {
        return create_vision_provider("openai", model);
    }

    let (llm_provider, _) =
        ProviderFactory::from_env().map_err(|e| DocBatchError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!("No LLM provider auto-detected: {}", e),
        })?;
    Ok(llm_provider)
}

fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, DocBatchError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        DocBatchError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_options_defaults() {
        let opts = build_options(&BatchConfig::default());
        assert_eq!(opts.temperature, Some(0.1));
        assert_eq!(opts.max_tokens, Some(1024));
    }

    #[test]
    fn backoff_doubles_and_saturates() {
        assert_eq!(backoff_ms(500, 1), 500);
        assert_eq!(backoff_ms(500, 2), 1000);
        assert_eq!(backoff_ms(500, 4), 4000);
        assert_eq!(backoff_ms(500, 65), u64::MAX);
        assert_eq!(backoff_ms(500, u32::MAX), u64::MAX);
    }

    #[test]
    fn quota_messages_are_classified() {
        let config = BatchConfig::default();
        assert_eq!(
            classify_provider_error("Error 429: Resource has been exhausted (e.g. check quota).", &config),
            ExtractError::QuotaExceeded
        );
        assert_eq!(
            classify_provider_error("connection reset", &config),
            ExtractError::Failed("connection reset".into())
        );
    }
}
