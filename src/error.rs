//! Error handling and custom error types
//!
//! Provides unified error handling across the service using thiserror, plus
//! the failure classification the retry loop keys its transitions on.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{0}")]
    Validation(String),

    #[error("Invalid file entry: files[{index}] {reason}")]
    InvalidFile { index: usize, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Gemini API error (status {status}): {body}")]
    Upstream { status: u16, body: String },

    #[error("AI provider error: {0}")]
    AiProvider(String),

    #[error("Model returned text instead of image")]
    ModalityMismatch,

    #[error("{0}")]
    EmptyResponse(String),

    #[error("Invalid response format from AI: {0}")]
    InvalidResponseFormat(String),

    #[error("AI did not return valid suggestions")]
    InvalidSuggestions,
}

/// Coarse failure classes used to decide whether an attempt may be repeated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Upstream answered 429.
    RateLimited,
    /// Upstream answered 5xx.
    ServerError,
    /// The model answered, but with text where an image was required.
    ModalityMismatch,
    Terminal,
}

impl Error {
    pub fn class(&self) -> FailureClass {
        match self {
            Error::Upstream { status: 429, .. } => FailureClass::RateLimited,
            Error::Upstream { status, .. } if (500..600).contains(status) => {
                FailureClass::ServerError
            }
            Error::ModalityMismatch => FailureClass::ModalityMismatch,
            _ => FailureClass::Terminal,
        }
    }

    /// Upstream status code, when the failure came from a non-2xx response.
    pub fn upstream_status(&self) -> Option<u16> {
        match self {
            Error::Upstream { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    fn upstream(status: u16) -> Error {
        Error::Upstream {
            status,
            body: String::new(),
        }
    }

    #[test]
    fn test_rate_limit_is_classified() {
        assert_eq!(upstream(429).class(), FailureClass::RateLimited);
    }

    #[test]
    fn test_5xx_is_server_error() {
        assert_eq!(upstream(500).class(), FailureClass::ServerError);
        assert_eq!(upstream(503).class(), FailureClass::ServerError);
        assert_eq!(upstream(599).class(), FailureClass::ServerError);
    }

    #[test]
    fn test_other_statuses_are_terminal() {
        assert_eq!(upstream(400).class(), FailureClass::Terminal);
        assert_eq!(upstream(403).class(), FailureClass::Terminal);
    }

    #[test]
    fn test_shape_errors_are_terminal() {
        assert_eq!(
            Error::InvalidResponseFormat("eof".to_string()).class(),
            FailureClass::Terminal
        );
        assert_eq!(Error::InvalidSuggestions.class(), FailureClass::Terminal);
        assert_eq!(
            Error::EmptyResponse("No image data in response".to_string()).class(),
            FailureClass::Terminal
        );
    }

    #[test]
    fn test_modality_mismatch_has_own_class() {
        assert_eq!(
            Error::ModalityMismatch.class(),
            FailureClass::ModalityMismatch
        );
    }
}
