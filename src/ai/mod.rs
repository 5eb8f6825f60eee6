//! Generative model integration
//!
//! [`ModelService`] is the seam between the generation pipeline and the
//! provider: the pipeline builds a provider-neutral [`ModelRequest`] and gets
//! back a classified [`ModelOutcome`].

pub mod gemini;
pub mod mock;

pub use gemini::GeminiModelClient;
pub use mock::{MockModelClient, MockReply};

use crate::models::ImageAttachment;
use crate::Result;
use async_trait::async_trait;

/// One piece of model input. Order is preserved on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestPart {
    Text(String),
    Image(ImageAttachment),
}

/// Sampling and output settings sent alongside a request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationSettings {
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub top_k: Option<u32>,
    pub max_output_tokens: Option<u32>,
    pub response_mime_type: Option<String>,
    /// e.g. `["TEXT", "IMAGE"]` when binary image output is wanted.
    pub response_modalities: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelRequest {
    pub system_instruction: Option<String>,
    pub parts: Vec<RequestPart>,
    pub settings: GenerationSettings,
}

impl ModelRequest {
    /// Instruction text first, then each attachment in input order.
    pub fn new(
        instruction: impl Into<String>,
        attachments: &[ImageAttachment],
        settings: GenerationSettings,
    ) -> Self {
        let mut parts = Vec::with_capacity(attachments.len() + 1);
        parts.push(RequestPart::Text(instruction.into()));
        parts.extend(attachments.iter().cloned().map(RequestPart::Image));

        Self {
            system_instruction: None,
            parts,
            settings,
        }
    }

    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = Some(instruction.into());
        self
    }

    pub fn instruction(&self) -> Option<&str> {
        match self.parts.first() {
            Some(RequestPart::Text(text)) => Some(text),
            _ => None,
        }
    }
}

/// What the first candidate of a model response carried.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelOutcome {
    /// Inline binary payload, base64 encoded.
    Image { mime_type: String, data: String },
    Text(String),
    Empty,
}

#[async_trait]
pub trait ModelService: Send + Sync {
    async fn generate(&self, request: &ModelRequest) -> Result<ModelOutcome>;
}
