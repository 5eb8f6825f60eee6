use super::client::GeminiHttpClient;
use super::types::{GenerateContentRequest, GenerateContentResponse};
use crate::ai::{ModelOutcome, ModelRequest, ModelService};
use crate::Result;
use async_trait::async_trait;
use std::time::Duration;

/// [`ModelService`] backed by Gemini's `generateContent`.
pub struct GeminiModelClient {
    http: GeminiHttpClient,
}

impl GeminiModelClient {
    pub fn new(api_key: String, model: String, timeout: Duration) -> Self {
        Self::new_with_client(api_key, model, timeout, reqwest::Client::new())
    }

    pub fn new_with_client(
        api_key: String,
        model: String,
        timeout: Duration,
        client: reqwest::Client,
    ) -> Self {
        Self {
            http: GeminiHttpClient::new_with_client(api_key, model, timeout, client),
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.http = self.http.with_base_url(base_url);
        self
    }

    pub fn model(&self) -> &str {
        self.http.model()
    }
}

#[async_trait]
impl ModelService for GeminiModelClient {
    async fn generate(&self, request: &ModelRequest) -> Result<ModelOutcome> {
        let body = GenerateContentRequest::from(request);
        tracing::debug!(
            "Sending generateContent to {} with {} parts",
            self.http.model(),
            request.parts.len()
        );

        let response: GenerateContentResponse = self.http.generate_content(&body).await?;
        let outcome = response.classify();

        match &outcome {
            ModelOutcome::Image { mime_type, data } => {
                tracing::debug!("Gemini returned {} image ({} base64 chars)", mime_type, data.len())
            }
            ModelOutcome::Text(text) => {
                tracing::debug!("Gemini returned text ({} chars)", text.chars().count())
            }
            ModelOutcome::Empty => tracing::warn!(
                "Gemini returned no usable parts (reason: {})",
                response.empty_reason().unwrap_or("unspecified")
            ),
        }

        Ok(outcome)
    }
}
