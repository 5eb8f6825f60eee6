//! Data models and structures
//!
//! Defines inbound generation requests, response bodies, the image modes the
//! service can run in, and environment configuration.

use crate::retry::{RetryPolicy, DEFAULT_BASE_DELAY, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_DELAY};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;
use std::time::Duration;

/// Client-supplied reference image. Contents are opaque.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImageAttachment {
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    #[serde(rename = "base64")]
    pub data: String,
}

/// Validated `/generate-images` payload.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub attachments: Vec<ImageAttachment>,
}

impl GenerationRequest {
    /// Validate a raw JSON body: prompt first, then files.
    pub fn from_json(body: &Value) -> Result<Self> {
        let prompt = match body.get("prompt") {
            Some(Value::String(p)) if !p.is_empty() => p.clone(),
            _ => return Err(Error::Validation("No prompt provided".to_string())),
        };

        let attachments = parse_attachments(body)?;

        Ok(Self {
            prompt,
            attachments,
        })
    }
}

/// Extract the non-empty `files` array from a raw JSON body.
pub fn parse_attachments(body: &Value) -> Result<Vec<ImageAttachment>> {
    let files = match body.get("files") {
        Some(Value::Array(files)) if !files.is_empty() => files,
        _ => return Err(Error::Validation("No files provided".to_string())),
    };

    files
        .iter()
        .enumerate()
        .map(|(index, file)| {
            ImageAttachment::deserialize(file).map_err(|e| Error::InvalidFile {
                index,
                reason: format!("requires string mimeType and base64 ({})", e),
            })
        })
        .collect()
}

/// Which directive the image endpoint sends and how it treats the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageMode {
    /// Text shooting plan rendered into a placeholder card.
    #[default]
    ShootingPlan,
    /// Text scene description rendered into a placeholder card.
    SceneDescription,
    /// Ask the model for image bytes directly; text is a failure.
    DirectImage,
}

impl ImageMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageMode::ShootingPlan => "shooting-plan",
            ImageMode::SceneDescription => "scene-description",
            ImageMode::DirectImage => "direct-image",
        }
    }

    pub fn seeks_image(&self) -> bool {
        matches!(self, ImageMode::DirectImage)
    }
}

impl FromStr for ImageMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "shooting-plan" | "plan" => Ok(ImageMode::ShootingPlan),
            "scene-description" | "scene" => Ok(ImageMode::SceneDescription),
            "direct-image" | "image" => Ok(ImageMode::DirectImage),
            other => Err(format!(
                "Unknown image mode '{}'. Expected shooting-plan, scene-description or direct-image",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageKind {
    Image,
    Placeholder,
}

/// Result of the image pipeline, before HTTP shaping.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedImage {
    /// Base64 payload.
    pub data: String,
    pub mime_type: String,
    pub kind: ImageKind,
    pub description: Option<String>,
    pub attempts: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ImageResponse {
    pub image: String,
    pub kind: ImageKind,
    pub mime_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl From<GeneratedImage> for ImageResponse {
    fn from(generated: GeneratedImage) -> Self {
        Self {
            image: generated.data,
            kind: generated.kind,
            mime_type: generated.mime_type,
            description: generated.description,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

// Configuration
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_IMAGE_MODEL: &str = "gemini-2.0-flash-exp";
pub const DEFAULT_TEXT_MODEL: &str = "gemini-1.5-flash";

#[derive(Debug, Clone)]
pub struct Config {
    pub gemini_api_key: Option<String>,
    pub gemini_base_url: String,
    pub image_model: String,
    pub text_model: String,
    pub image_mode: ImageMode,
    pub retry: RetryPolicy,
    pub production: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let image_mode = match lookup("IMAGE_MODE") {
            Some(raw) => raw.parse().map_err(Error::Config)?,
            None => ImageMode::default(),
        };

        let max_attempts = parse_var(&lookup, "IMAGE_MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS)?;
        if max_attempts == 0 {
            return Err(Error::Config(
                "IMAGE_MAX_ATTEMPTS must be at least 1".to_string(),
            ));
        }

        let retry = RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(parse_var(
                &lookup,
                "RETRY_BASE_DELAY_MS",
                DEFAULT_BASE_DELAY.as_millis() as u64,
            )?),
            max_delay: Duration::from_millis(parse_var(
                &lookup,
                "RETRY_MAX_DELAY_MS",
                DEFAULT_MAX_DELAY.as_millis() as u64,
            )?),
            retry_on_text: parse_var(&lookup, "RETRY_ON_TEXT", true)?,
        };

        Ok(Self {
            gemini_api_key: lookup("GEMINI_API_KEY").filter(|k| !k.trim().is_empty()),
            gemini_base_url: lookup("GEMINI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.to_string()),
            image_model: lookup("GEMINI_IMAGE_MODEL")
                .unwrap_or_else(|| DEFAULT_IMAGE_MODEL.to_string()),
            text_model: lookup("GEMINI_TEXT_MODEL")
                .unwrap_or_else(|| DEFAULT_TEXT_MODEL.to_string()),
            image_mode,
            retry,
            production: lookup("APP_ENV")
                .map(|env| env.eq_ignore_ascii_case("production"))
                .unwrap_or(false),
        })
    }
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("{} has invalid value '{}'", key, raw))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn validation_message(err: Error) -> String {
        match err {
            Error::Validation(msg) => msg,
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_generation_request_parses_valid_body() {
        let body = json!({
            "prompt": "studio lighting shot",
            "files": [
                { "mimeType": "image/png", "base64": "AAAA" },
                { "mimeType": "image/jpeg", "base64": "BBBB" }
            ]
        });

        let request = GenerationRequest::from_json(&body).unwrap();
        assert_eq!(request.prompt, "studio lighting shot");
        assert_eq!(request.attachments.len(), 2);
        assert_eq!(request.attachments[1].mime_type, "image/jpeg");
        assert_eq!(request.attachments[1].data, "BBBB");
    }

    #[test]
    fn test_missing_or_non_string_prompt_is_rejected() {
        for body in [
            json!({ "files": [{ "mimeType": "image/png", "base64": "AA" }] }),
            json!({ "prompt": 42, "files": [{ "mimeType": "image/png", "base64": "AA" }] }),
            json!({ "prompt": "", "files": [{ "mimeType": "image/png", "base64": "AA" }] }),
            json!({ "prompt": null }),
        ] {
            let err = GenerationRequest::from_json(&body).unwrap_err();
            assert_eq!(validation_message(err), "No prompt provided");
        }
    }

    #[test]
    fn test_empty_or_non_array_files_are_rejected() {
        for body in [
            json!({ "prompt": "p" }),
            json!({ "prompt": "p", "files": [] }),
            json!({ "prompt": "p", "files": "not-an-array" }),
            json!({ "prompt": "p", "files": { "mimeType": "image/png" } }),
        ] {
            let err = GenerationRequest::from_json(&body).unwrap_err();
            assert_eq!(validation_message(err), "No files provided");
        }
    }

    #[test]
    fn test_file_without_payload_is_rejected() {
        let body = json!({ "files": [
            { "mimeType": "image/png", "base64": "AA" },
            { "mimeType": "image/png" }
        ] });
        let err = parse_attachments(&body).unwrap_err();
        assert!(matches!(err, Error::InvalidFile { index: 1, .. }));
        assert!(err.to_string().starts_with("Invalid file entry: files[1]"));
    }

    #[test]
    fn test_image_response_serializes_camel_case() {
        let response = ImageResponse::from(GeneratedImage {
            data: "QUJD".to_string(),
            mime_type: "image/svg+xml".to_string(),
            kind: ImageKind::Placeholder,
            description: Some("plan".to_string()),
            attempts: 1,
        });

        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(
            value,
            json!({
                "image": "QUJD",
                "kind": "placeholder",
                "mimeType": "image/svg+xml",
                "description": "plan"
            })
        );
    }

    #[test]
    fn test_error_body_omits_missing_details() {
        let json = serde_json::to_string(&ErrorBody::new("No files provided")).unwrap();
        assert_eq!(json, r#"{"error":"No files provided"}"#);
    }

    #[test]
    fn test_image_mode_parsing() {
        assert_eq!("direct-image".parse::<ImageMode>(), Ok(ImageMode::DirectImage));
        assert_eq!(" Scene ".parse::<ImageMode>(), Ok(ImageMode::SceneDescription));
        assert!("video".parse::<ImageMode>().is_err());
    }

    #[test]
    fn test_config_defaults() {
        let config = Config::from_lookup(lookup_from(&[])).unwrap();
        assert!(config.gemini_api_key.is_none());
        assert_eq!(config.image_model, DEFAULT_IMAGE_MODEL);
        assert_eq!(config.text_model, DEFAULT_TEXT_MODEL);
        assert_eq!(config.image_mode, ImageMode::ShootingPlan);
        assert_eq!(config.retry, RetryPolicy::default());
        assert!(!config.production);
    }

    #[test]
    fn test_config_overrides() {
        let config = Config::from_lookup(lookup_from(&[
            ("GEMINI_API_KEY", "secret"),
            ("IMAGE_MODE", "direct-image"),
            ("IMAGE_MAX_ATTEMPTS", "5"),
            ("RETRY_BASE_DELAY_MS", "1000"),
            ("RETRY_ON_TEXT", "false"),
            ("APP_ENV", "Production"),
        ]))
        .unwrap();

        assert_eq!(config.gemini_api_key.as_deref(), Some("secret"));
        assert_eq!(config.image_mode, ImageMode::DirectImage);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.base_delay, Duration::from_millis(1000));
        assert_eq!(config.retry.max_delay, Duration::from_millis(10_000));
        assert!(!config.retry.retry_on_text);
        assert!(config.production);
    }

    #[test]
    fn test_blank_api_key_counts_as_missing() {
        let config = Config::from_lookup(lookup_from(&[("GEMINI_API_KEY", "  ")])).unwrap();
        assert!(config.gemini_api_key.is_none());
    }

    #[test]
    fn test_config_rejects_bad_values() {
        assert!(matches!(
            Config::from_lookup(lookup_from(&[("IMAGE_MAX_ATTEMPTS", "0")])),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            Config::from_lookup(lookup_from(&[("RETRY_BASE_DELAY_MS", "soon")])),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            Config::from_lookup(lookup_from(&[("IMAGE_MODE", "video")])),
            Err(Error::Config(_))
        ));
    }
}
