use super::{ModelOutcome, ModelRequest, ModelService};
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

/// 1x1 transparent PNG, base64 encoded.
pub const TINY_PNG_BASE64: &str =
    "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";

/// Scripted upstream behaviour for one call.
#[derive(Debug, Clone, PartialEq)]
pub enum MockReply {
    Image { mime_type: String, data: String },
    Text(String),
    Empty,
    /// Upstream answered with this non-2xx status.
    Status(u16),
}

impl MockReply {
    pub fn png() -> Self {
        MockReply::Image {
            mime_type: "image/png".to_string(),
            data: TINY_PNG_BASE64.to_string(),
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        MockReply::Text(text.into())
    }

    fn into_result(self) -> Result<ModelOutcome> {
        match self {
            MockReply::Image { mime_type, data } => Ok(ModelOutcome::Image { mime_type, data }),
            MockReply::Text(text) => Ok(ModelOutcome::Text(text)),
            MockReply::Empty => Ok(ModelOutcome::Empty),
            MockReply::Status(status) => Err(Error::Upstream {
                status,
                body: format!("mock upstream status {}", status),
            }),
        }
    }
}

/// Test double for [`ModelService`].
///
/// Replies are served in the order they were added and the last one repeats.
/// Clones share state, so a clone kept by the test can observe calls.
#[derive(Clone, Default)]
pub struct MockModelClient {
    replies: Arc<Mutex<Vec<MockReply>>>,
    requests: Arc<Mutex<Vec<ModelRequest>>>,
}

impl MockModelClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reply(self, reply: MockReply) -> Self {
        self.replies.lock().unwrap().push(reply);
        self
    }

    pub fn get_call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelService for MockModelClient {
    async fn generate(&self, request: &ModelRequest) -> Result<ModelOutcome> {
        let index = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request.clone());
            requests.len() - 1
        };

        let reply = {
            let replies = self.replies.lock().unwrap();
            replies
                .get(index)
                .or_else(|| replies.last())
                .cloned()
                .unwrap_or_else(MockReply::png)
        };

        reply.into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::GenerationSettings;

    fn request() -> ModelRequest {
        ModelRequest::new("prompt", &[], GenerationSettings::default())
    }

    #[tokio::test]
    async fn test_mock_defaults_to_png() {
        let client = MockModelClient::new();
        let outcome = client.generate(&request()).await.unwrap();
        assert!(matches!(outcome, ModelOutcome::Image { ref mime_type, .. } if mime_type == "image/png"));
    }

    #[tokio::test]
    async fn test_mock_serves_replies_in_order_then_repeats_last() {
        let client = MockModelClient::new()
            .with_reply(MockReply::text("first"))
            .with_reply(MockReply::Status(429));

        assert_eq!(
            client.generate(&request()).await.unwrap(),
            ModelOutcome::Text("first".to_string())
        );
        for _ in 0..2 {
            let err = client.generate(&request()).await.unwrap_err();
            assert_eq!(err.upstream_status(), Some(429));
        }
    }

    #[tokio::test]
    async fn test_mock_call_count_shared_between_clones() {
        let client = MockModelClient::new();
        let probe = client.clone();

        assert_eq!(probe.get_call_count(), 0);
        client.generate(&request()).await.unwrap();
        client.generate(&request()).await.unwrap();
        assert_eq!(probe.get_call_count(), 2);
        assert_eq!(probe.requests()[0].instruction(), Some("prompt"));
    }
}
