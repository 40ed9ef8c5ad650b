//! Stage runner — one "ask the model for X" operation.
//!
//! Each attempt streams a response, assembles it, strips reasoning and, for
//! structured stages, extracts records. The retry policy decides how many
//! attempts are made and what each attempt's request looks like.

use crate::brain::LlmProvider;
use crate::config::StageConfig;
use crate::error::{LlmError, StageError};
use crate::extract::{self, RecordShape};
use crate::reasoning::strip_assembled;
use crate::retry::{AttemptProfile, RetryPolicy};
use crate::stream;
use crate::types::{ChatRequest, Message, ResponseShape};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// What a single stage asks for.
#[derive(Debug, Clone)]
pub struct StageSpec<'a> {
    /// Stage label for logs.
    pub name: &'a str,
    pub config: &'a StageConfig,
    pub messages: Vec<Message>,
}

impl<'a> StageSpec<'a> {
    pub fn new(name: &'a str, config: &'a StageConfig, system: &str, user: &str) -> Self {
        Self {
            name,
            config,
            messages: vec![Message::system(system), Message::user(user)],
        }
    }

    fn request(&self, shape: Option<ResponseShape>) -> ChatRequest {
        let mut request = self.config.request();
        request.messages = self.messages.clone();
        request.response_shape = shape;
        request
    }
}

/// Runs stages against one provider under one retry policy and one
/// cancellation token.
#[derive(Clone)]
pub struct StageRunner {
    provider: Arc<dyn LlmProvider>,
    policy: RetryPolicy,
    cancel: CancellationToken,
}

impl StageRunner {
    pub fn new(provider: Arc<dyn LlmProvider>, policy: RetryPolicy, cancel: CancellationToken) -> Self {
        Self {
            provider,
            policy,
            cancel,
        }
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Ask for a list of records. Exhausted retries yield an empty list.
    ///
    /// The only error is [`StageError::Cancelled`].
    pub async fn ask_structured<T: RecordShape>(
        &self,
        spec: &StageSpec<'_>,
    ) -> Result<Vec<T>, StageError> {
        let records = self
            .policy
            .run(spec.name, &self.cancel, |attempt, profile| async move {
                let shape = profile.strict_schema.then(T::response_shape);
                let text = self.attempt(spec, attempt, profile, shape).await?;
                let records = extract::extract::<T>(&text)?;
                if records.is_empty() {
                    return Err(StageError::EmptyPayload);
                }
                Ok(records)
            })
            .await?;

        let records = records.unwrap_or_default();
        info!(stage = spec.name, count = records.len(), "Stage finished");
        Ok(records)
    }

    /// Ask for free text. Exhausted retries yield an empty string.
    ///
    /// The only error is [`StageError::Cancelled`].
    pub async fn ask_text(&self, spec: &StageSpec<'_>) -> Result<String, StageError> {
        let text = self
            .policy
            .run(spec.name, &self.cancel, |attempt, profile| {
                self.attempt(spec, attempt, profile, None)
            })
            .await?;

        let text = text.unwrap_or_default();
        info!(stage = spec.name, chars = text.len(), "Stage finished");
        Ok(text)
    }

    /// One streamed call: request, assemble, strip. An empty answer is a
    /// failed attempt.
    async fn attempt(
        &self,
        spec: &StageSpec<'_>,
        attempt: u32,
        profile: AttemptProfile,
        shape: Option<ResponseShape>,
    ) -> Result<String, StageError> {
        let request = spec.request(shape);
        let model = if request.model.is_empty() {
            self.provider.model_name().to_string()
        } else {
            request.model.clone()
        };
        info!(
            stage = spec.name,
            attempt = attempt + 1,
            max_attempts = self.policy.max_attempts(),
            model = %model,
            strict = profile.strict_schema,
            "Calling model"
        );

        let call = async {
            let deltas = self
                .provider
                .chat_stream(request)
                .await
                .map_err(StageError::from)?;
            stream::collect(deltas, &self.cancel, &model).await
        };
        let assembled = tokio::time::timeout(spec.config.timeout(), call)
            .await
            .map_err(|_| LlmError::Timeout {
                timeout_secs: spec.config.timeout_secs,
            })??;

        debug!(stage = spec.name, raw = %assembled.as_str(), "Assembled response");
        let stripped = strip_assembled(&assembled);
        if stripped.answer.is_empty() {
            return Err(StageError::EmptyPayload);
        }
        Ok(stripped.answer.to_string())
    }
}
