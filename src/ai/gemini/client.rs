use crate::models::DEFAULT_GEMINI_BASE_URL;
use crate::{Error, Result};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};

/// Characters of an unparseable response body kept in logs.
const LOGGED_BODY_CHARS: usize = 500;

/// Shape of Gemini's JSON error envelope: `{"error": {"code", "message", "status"}}`.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
    #[serde(default)]
    status: Option<String>,
}

/// REST transport for one Gemini model.
pub struct GeminiHttpClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    timeout: Duration,
}

impl GeminiHttpClient {
    /// `model` may be given as `gemini-2.0-flash-exp` or `models/gemini-2.0-flash-exp`.
    pub fn new_with_client(
        api_key: String,
        model: String,
        timeout: Duration,
        client: Client,
    ) -> Self {
        let model = match model.strip_prefix("models/") {
            Some(bare) => bare.to_string(),
            None => model,
        };

        Self {
            client,
            api_key,
            model,
            base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            timeout,
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// URL of a model method, e.g. `generateContent`.
    pub fn endpoint(&self, method: &str) -> String {
        format!("{}/v1beta/models/{}:{}", self.base_url, self.model, method)
    }

    /// POST `request` to `generateContent` and decode the reply.
    ///
    /// Non-2xx replies become [`Error::Upstream`] so callers can classify them.
    pub async fn generate_content<Req, Resp>(&self, request: &Req) -> Result<Resp>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let url = self.endpoint("generateContent");
        debug!("POST {}", url);

        let response = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .header("x-goog-api-key", &self.api_key)
            .json(request)
            .send()
            .await
            .inspect_err(|e| error!("Gemini request to {} failed: {}", self.model, e))?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(upstream_error(status, &body));
        }

        serde_json::from_str(&body).map_err(|e| {
            error!(
                "Failed to parse Gemini response: {}\nBody ({} bytes): {}",
                e,
                body.len(),
                body_preview(&body)
            );
            Error::AiProvider(format!("Failed to parse Gemini response: {}", e))
        })
    }
}

/// Leading slice of a response body, safe to log.
fn body_preview(body: &str) -> &str {
    match body.char_indices().nth(LOGGED_BODY_CHARS) {
        Some((end, _)) => &body[..end],
        None => body,
    }
}

/// Prefer the envelope's message over the raw body when one is present.
fn upstream_error(status: StatusCode, body: &str) -> Error {
    let body = match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(ErrorEnvelope { error: detail }) => match detail.status {
            Some(code) => format!("{} ({})", detail.message, code),
            None => detail.message,
        },
        Err(_) => body.to_string(),
    };

    error!("Gemini API error (status {}): {}", status, body);
    Error::Upstream {
        status: status.as_u16(),
        body,
    }
}
