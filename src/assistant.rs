use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

/// AssistantError
///
/// Failure talking to the assistant service. Surfaces as a 500 with the message
/// "Error sending request to target API".
#[derive(Debug, Error)]
pub enum AssistantError {
    #[error("assistant request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("assistant answered {status}: {body}")]
    Status { status: u16, body: String },
}

/// The payload the assistant service expects for a text command.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TextCommand {
    /// The caller's subject id.
    pub id: String,
    pub username: String,
    pub content: String,
}

// 1. AssistantService Contract
/// AssistantService
///
/// Sends one user message to the assistant and returns its reply text. Handlers
/// depend on this trait only, so tests swap in [`MockAssistant`].
#[async_trait]
pub trait AssistantService: Send + Sync {
    async fn send_text_command(&self, command: &TextCommand) -> Result<String, AssistantError>;
}

// 2. The Real Implementation
/// HttpAssistant
///
/// Posts commands as JSON to `<base_url>/telegram-bot/text-command`.
#[derive(Clone)]
pub struct HttpAssistant {
    client: reqwest::Client,
    base_url: String,
}

impl HttpAssistant {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/telegram-bot/text-command", self.base_url)
    }
}

#[async_trait]
impl AssistantService for HttpAssistant {
    async fn send_text_command(&self, command: &TextCommand) -> Result<String, AssistantError> {
        let response = self
            .client
            .post(self.endpoint())
            .json(command)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        tracing::debug!(status = status.as_u16(), bytes = body.len(), "assistant replied");

        if !status.is_success() {
            return Err(AssistantError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(reply_text(&body))
    }
}

/// Extracts the reply from the assistant's response body: the first string
/// among `content`, `text` and `reply` of a JSON object, a bare JSON string, or
/// else the raw body.
pub fn reply_text(body: &str) -> String {
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(map)) => ["content", "text", "reply"]
            .iter()
            .find_map(|field| map.get(*field).and_then(Value::as_str))
            .map_or_else(|| body.to_string(), str::to_string),
        Ok(Value::String(text)) => text,
        _ => body.to_string(),
    }
}

// 3. The Mock Implementation (For Tests and Local Runs)
/// MockAssistant
///
/// Answers every command with a fixed reply, or fails when asked to.
#[derive(Clone)]
pub struct MockAssistant {
    /// When true, every command returns a simulated upstream failure.
    pub should_fail: bool,
}

pub const MOCK_REPLY: &str = "This is a mock response from the assistant.";

impl MockAssistant {
    pub fn new() -> Self {
        Self { should_fail: false }
    }

    pub fn new_failing() -> Self {
        Self { should_fail: true }
    }
}

impl Default for MockAssistant {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AssistantService for MockAssistant {
    async fn send_text_command(&self, _command: &TextCommand) -> Result<String, AssistantError> {
        if self.should_fail {
            return Err(AssistantError::Status {
                status: 502,
                body: "Mock Assistant Error: Simulation requested".to_string(),
            });
        }
        Ok(MOCK_REPLY.to_string())
    }
}

/// AssistantState
///
/// Shared handle to the assistant client held in the application state.
pub type AssistantState = Arc<dyn AssistantService>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_prefers_known_json_fields() {
        assert_eq!(reply_text(r#"{"content":"hi"}"#), "hi");
        assert_eq!(reply_text(r#"{"status":"ok","text":"hello"}"#), "hello");
        assert_eq!(reply_text(r#"{"reply":"yo","content":7}"#), "yo");
        assert_eq!(reply_text(r#""plain json string""#), "plain json string");
    }

    #[test]
    fn reply_falls_back_to_raw_body() {
        assert_eq!(reply_text("Sure, noted."), "Sure, noted.");
        assert_eq!(reply_text(r#"{"status":"ok"}"#), r#"{"status":"ok"}"#);
        assert_eq!(reply_text("[1,2]"), "[1,2]");
    }

    #[test]
    fn endpoint_joins_base_url() {
        let client = HttpAssistant::new("https://bot.example.com/");
        assert_eq!(
            client.endpoint(),
            "https://bot.example.com/telegram-bot/text-command"
        );
    }

    #[tokio::test]
    async fn mock_replies_or_fails_on_request() {
        let command = TextCommand {
            id: "u1".into(),
            username: "alice".into(),
            content: "hello".into(),
        };
        assert_eq!(
            MockAssistant::new().send_text_command(&command).await.unwrap(),
            MOCK_REPLY
        );
        assert!(MockAssistant::new_failing()
            .send_text_command(&command)
            .await
            .is_err());
    }
}
