//! Request/response bodies for the OpenAI-compatible chat-completion
//! endpoint.
//!
//! These mirror the reference service's schema closely enough for real
//! OpenAI clients to round-trip requests through this gateway; fields the
//! engine never reads (`temperature`, `stream`, `logit_bias`, ...) are kept
//! with `#[serde(default)]` purely for wire compatibility.

use serde::{Deserialize, Serialize};

/// One chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

/// `POST /v1/chat/completions` request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub top_p: Option<f64>,
    #[serde(default)]
    pub n: Option<u32>,
    #[serde(default)]
    pub stream: Option<bool>,
    #[serde(default)]
    pub stop: Option<Vec<String>>,
    #[serde(default)]
    pub presence_penalty: Option<f64>,
    #[serde(default)]
    pub frequency_penalty: Option<f64>,
    #[serde(default)]
    pub logit_bias: Option<std::collections::HashMap<String, f64>>,
    #[serde(default)]
    pub user: Option<String>,
}

impl ChatCompletionRequest {
    /// `max(1, total_chars / 4)`, the reference's token estimate.
    pub fn estimated_input_tokens(&self) -> u64 {
        let total_chars: usize = self.messages.iter().map(|m| m.content.len()).sum();
        std::cmp::max(1, (total_chars / 4) as u64)
    }
}

/// Token accounting reported back to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// One completion choice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    pub index: u32,
    pub message: Message,
    pub finish_reason: String,
}

/// `POST /v1/chat/completions` response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionResponse {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<Choice>,
    pub usage: Usage,
}

impl ChatCompletionResponse {
    /// Build the fixed mock completion the engine returns on admission.
    ///
    /// The response body content is a stub -- it is not part of the
    /// admission engine's contract, only its shape is.
    pub fn mock(model: &str, input_tokens: u64, output_tokens: u64) -> Self {
        let created = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);

        Self {
            id: format!("chatcmpl-{created:x}"),
            object: "chat.completion".to_string(),
            created,
            model: model.to_string(),
            choices: vec![Choice {
                index: 0,
                message: Message {
                    role: "assistant".to_string(),
                    content: "Mock response from the rate-limited gateway.".to_string(),
                },
                finish_reason: "stop".to_string(),
            }],
            usage: Usage {
                prompt_tokens: input_tokens,
                completion_tokens: output_tokens,
                total_tokens: input_tokens + output_tokens,
            },
        }
    }
}

/// `GET /health` response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: i64,
    pub store_backend: String,
    pub pool_size: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_estimate_floors_at_one() {
        let req = ChatCompletionRequest {
            model: "gpt-test".into(),
            messages: vec![Message {
                role: "user".into(),
                content: "hi".into(),
            }],
            max_tokens: None,
            temperature: None,
            top_p: None,
            n: None,
            stream: None,
            stop: None,
            presence_penalty: None,
            frequency_penalty: None,
            logit_bias: None,
            user: None,
        };
        assert_eq!(req.estimated_input_tokens(), 1);
    }

    #[test]
    fn test_token_estimate_scales_with_chars() {
        let req = ChatCompletionRequest {
            model: "gpt-test".into(),
            messages: vec![Message {
                role: "user".into(),
                content: "x".repeat(400),
            }],
            max_tokens: None,
            temperature: None,
            top_p: None,
            n: None,
            stream: None,
            stop: None,
            presence_penalty: None,
            frequency_penalty: None,
            logit_bias: None,
            user: None,
        };
        assert_eq!(req.estimated_input_tokens(), 100);
    }
}
