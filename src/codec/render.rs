//! Provider-shaped rendering structures.
//!
//! Each provider gets its own tagged type rather than one duck-typed
//! record with optional fields; a codec that has nothing to contribute
//! for a provider returns an empty render list.

use serde_json::Value;
use std::fmt;

/// Conversation role shared by the Anthropic and OpenAI shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    /// Caller-side content.
    User,
    /// Model-side content.
    Assistant,
}

impl fmt::Display for ChatRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

/// Rendering for the Anthropic Messages API.
#[derive(Debug, Clone, PartialEq)]
pub enum AnthropicRender {
    /// An entry of the separate `system` array.
    System {
        /// System text.
        text: String,
    },
    /// A conversation message; `content` holds content-block values
    /// (`{"type": "text", ...}`, `{"type": "tool_result", ...}`).
    Message {
        /// Message role.
        role: ChatRole,
        /// Content blocks in provider shape.
        content: Vec<Value>,
    },
}

/// Rendering for OpenAI chat completions: one inline message.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenAiRender {
    /// `system`, `user`, `assistant`, or `tool`.
    pub role: &'static str,
    /// Message text.
    pub content: String,
    /// Present on `tool` messages.
    pub tool_call_id: Option<String>,
}

/// Gemini content role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeminiRole {
    /// Caller-side content.
    User,
    /// Model-side content.
    Model,
}

impl fmt::Display for GeminiRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Model => write!(f, "model"),
        }
    }
}

/// Rendering for Gemini GenerateContent.
#[derive(Debug, Clone, PartialEq)]
pub enum GeminiRender {
    /// Contribution to the single system-instruction string.
    System {
        /// System text.
        text: String,
    },
    /// A content entry; `parts` holds part values (`{"text": ...}`,
    /// `{"functionResponse": ...}`).
    Content {
        /// Content role.
        role: GeminiRole,
        /// Parts in provider shape.
        parts: Vec<Value>,
    },
}
