//! Application orchestration: turns validated requests into model calls.

use crate::ai::{GeminiModelClient, GenerationSettings, ModelOutcome, ModelRequest, ModelService};
use crate::models::{Config, GeneratedImage, GenerationRequest, ImageAttachment, ImageKind, ImageMode};
use crate::placeholder::{self, PlaceholderArtifact, PlaceholderStyle};
use crate::retry::{RetryPolicy, RetryState, Transition};
use crate::{prompts, Error, Result};
use serde_json::Value;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio_retry::RetryIf;
use tracing::{error, info, warn};

/// Suggestions returned to the caller are capped at this many.
pub const SUGGESTION_COUNT: usize = 4;

const IMAGE_TIMEOUT: Duration = Duration::from_secs(120);
const TEXT_TIMEOUT: Duration = Duration::from_secs(30);

/// Runs the image and suggestion pipelines against injected model services.
pub struct App {
    image_model: Box<dyn ModelService>,
    text_model: Box<dyn ModelService>,
    settings: AppSettings,
}

/// Injectable service bundle used to construct [`App`] in tests/harnesses.
pub struct AppServices {
    pub image_model: Box<dyn ModelService>,
    pub text_model: Box<dyn ModelService>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppSettings {
    pub image_mode: ImageMode,
    /// Applied to image-seeking modes only; text modes make one attempt.
    pub retry: RetryPolicy,
}

impl App {
    pub fn with_services(services: AppServices, settings: AppSettings) -> Self {
        Self {
            image_model: services.image_model,
            text_model: services.text_model,
            settings,
        }
    }

    /// Build Gemini-backed services from configuration.
    ///
    /// Fails with [`Error::Config`] when no API key is configured.
    pub fn from_config(config: &Config) -> Result<Self> {
        let api_key = config.gemini_api_key.clone().ok_or_else(|| {
            Error::Config("GEMINI_API_KEY is not set".to_string())
        })?;

        // Reuse one HTTP connection pool across both clients.
        let http_client = reqwest::Client::new();

        info!(
            "Image model: {} (mode: {}), text model: {}",
            config.image_model,
            config.image_mode.as_str(),
            config.text_model
        );

        let image_model = GeminiModelClient::new_with_client(
            api_key.clone(),
            config.image_model.clone(),
            IMAGE_TIMEOUT,
            http_client.clone(),
        )
        .with_base_url(config.gemini_base_url.clone());

        let text_model = GeminiModelClient::new_with_client(
            api_key,
            config.text_model.clone(),
            TEXT_TIMEOUT,
            http_client,
        )
        .with_base_url(config.gemini_base_url.clone());

        Ok(Self::with_services(
            AppServices {
                image_model: Box::new(image_model),
                text_model: Box::new(text_model),
            },
            AppSettings {
                image_mode: config.image_mode,
                retry: config.retry,
            },
        ))
    }

    pub fn settings(&self) -> AppSettings {
        self.settings
    }

    /// Policy used for the configured image mode.
    pub fn image_retry_policy(&self) -> RetryPolicy {
        if self.settings.image_mode.seeks_image() {
            self.settings.retry
        } else {
            RetryPolicy::single_attempt()
        }
    }

    /// Compose the model request for an image mode. The same request is reused
    /// unchanged across retries.
    pub fn image_request(mode: ImageMode, request: &GenerationRequest) -> ModelRequest {
        let instruction = prompts::image_instruction(mode, &request.prompt);
        let settings = match mode {
            ImageMode::DirectImage => GenerationSettings {
                temperature: Some(1.0),
                max_output_tokens: Some(8192),
                response_modalities: Some(vec!["TEXT".to_string(), "IMAGE".to_string()]),
                ..Default::default()
            },
            ImageMode::ShootingPlan | ImageMode::SceneDescription => GenerationSettings {
                temperature: Some(0.9),
                top_p: Some(0.95),
                top_k: Some(40),
                max_output_tokens: Some(2048),
                ..Default::default()
            },
        };
        ModelRequest::new(instruction, &request.attachments, settings)
    }

    pub fn suggestions_request(attachments: &[ImageAttachment]) -> ModelRequest {
        ModelRequest::new(
            prompts::suggestions_instruction(attachments.len()),
            attachments,
            GenerationSettings {
                temperature: Some(0.7),
                max_output_tokens: Some(1000),
                response_mime_type: Some("application/json".to_string()),
                ..Default::default()
            },
        )
        .with_system_instruction(prompts::SUGGESTIONS_SYSTEM.trim())
    }

    pub async fn generate_image(&self, request: &GenerationRequest) -> Result<GeneratedImage> {
        let mode = self.settings.image_mode;
        let model_request = Self::image_request(mode, request);
        let policy = self.image_retry_policy();

        info!(
            "Generating image in {} mode from {} attachment(s)",
            mode.as_str(),
            request.attachments.len()
        );

        let (mut generated, attempts) =
            run_with_retry(self.image_model.as_ref(), &model_request, policy, |outcome| {
                accept_image_outcome(mode, outcome)
            })
            .await?;

        generated.attempts = attempts;
        info!(
            "Produced {:?} ({}) after {} attempt(s)",
            generated.kind, generated.mime_type, attempts
        );
        Ok(generated)
    }

    pub async fn suggest_prompts(&self, attachments: &[ImageAttachment]) -> Result<Vec<String>> {
        let model_request = Self::suggestions_request(attachments);
        info!(
            "Requesting prompt suggestions for {} attachment(s)",
            attachments.len()
        );

        let (suggestions, _) = run_with_retry(
            self.text_model.as_ref(),
            &model_request,
            RetryPolicy::single_attempt(),
            |outcome| match outcome {
                ModelOutcome::Text(text) => parse_suggestions(&text),
                ModelOutcome::Image { .. } => Err(Error::InvalidResponseFormat(
                    "expected JSON text, got inline data".to_string(),
                )),
                ModelOutcome::Empty => {
                    Err(Error::InvalidResponseFormat("empty response".to_string()))
                }
            },
        )
        .await?;

        info!("Returning {} suggestion(s)", suggestions.len());
        Ok(suggestions)
    }
}

/// Drive one model call through the retry state machine.
///
/// `tokio_retry` sleeps through the policy's backoff schedule; the condition
/// consults [`RetryState`] so only retryable failure classes are repeated.
async fn run_with_retry<T, F>(
    model: &dyn ModelService,
    request: &ModelRequest,
    policy: RetryPolicy,
    accept: F,
) -> Result<(T, u32)>
where
    F: Fn(ModelOutcome) -> Result<T>,
{
    let tracker = Mutex::new(RetryState::new(policy));
    let state = &tracker;
    let accept = &accept;

    let result = RetryIf::spawn(
        policy.backoff_schedule(),
        move || async move {
            let attempt = {
                let mut state = lock_state(state);
                state.resume();
                state.attempt() + 1
            };
            info!("Calling model (attempt {}/{})", attempt, policy.max_attempts);
            model.generate(request).await.and_then(accept)
        },
        move |e: &Error| {
            let mut state = lock_state(state);
            match state.record_failure(e) {
                Transition::Retry(delay) => {
                    warn!(
                        "Attempt {}/{} failed: {}. Retrying in {}ms",
                        state.attempts_made(),
                        state.max_attempts(),
                        e,
                        delay.as_millis()
                    );
                    true
                }
                Transition::GiveUp => false,
            }
        },
    )
    .await;

    let mut state = lock_state(&tracker);
    match result {
        Ok(value) => {
            state.record_success();
            Ok((value, state.attempts_made()))
        }
        Err(e) => {
            error!(
                "Model call failed after {} attempt(s): {}",
                state.attempts_made(),
                e
            );
            Err(e)
        }
    }
}

fn lock_state(state: &Mutex<RetryState>) -> MutexGuard<'_, RetryState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

fn accept_image_outcome(mode: ImageMode, outcome: ModelOutcome) -> Result<GeneratedImage> {
    match outcome {
        ModelOutcome::Image { mime_type, data } => Ok(GeneratedImage {
            data,
            mime_type,
            kind: ImageKind::Image,
            description: None,
            attempts: 0,
        }),
        ModelOutcome::Text(text) if mode.seeks_image() => {
            warn!(
                "Model returned text instead of image: {}",
                text.chars().take(120).collect::<String>()
            );
            Err(Error::ModalityMismatch)
        }
        ModelOutcome::Text(description) => {
            let artifact =
                PlaceholderArtifact::render(&description, &PlaceholderStyle::for_mode(mode));
            Ok(GeneratedImage {
                data: artifact.to_base64(),
                mime_type: placeholder::MIME_TYPE.to_string(),
                kind: ImageKind::Placeholder,
                description: Some(description),
                attempts: 0,
            })
        }
        ModelOutcome::Empty if mode.seeks_image() => {
            Err(Error::EmptyResponse("No image data in response".to_string()))
        }
        ModelOutcome::Empty => Err(Error::EmptyResponse("No description generated".to_string())),
    }
}

/// Parse the model's JSON array of suggestion strings.
pub fn parse_suggestions(text: &str) -> Result<Vec<String>> {
    let trimmed = strip_code_fence(text.trim());
    let value: Value = serde_json::from_str(trimmed).map_err(|e| {
        error!("Failed to parse AI response: {}", text);
        Error::InvalidResponseFormat(e.to_string())
    })?;

    let items = match value {
        Value::Array(items) if !items.is_empty() => items,
        _ => return Err(Error::InvalidSuggestions),
    };

    let mut suggestions = items
        .into_iter()
        .map(|item| match item {
            Value::String(s) => Some(s),
            _ => None,
        })
        .collect::<Option<Vec<String>>>()
        .ok_or(Error::InvalidSuggestions)?;

    if suggestions.len() > SUGGESTION_COUNT {
        warn!(
            "Model returned {} suggestions, keeping the first {}",
            suggestions.len(),
            SUGGESTION_COUNT
        );
        suggestions.truncate(SUGGESTION_COUNT);
    } else if suggestions.len() < SUGGESTION_COUNT {
        warn!(
            "Model returned only {} suggestion(s), expected {}",
            suggestions.len(),
            SUGGESTION_COUNT
        );
    }

    Ok(suggestions)
}

fn strip_code_fence(text: &str) -> &str {
    text.strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(text)
}
