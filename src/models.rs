//! Data models for agentping.
//!
//! This module contains the messages decoded from the agent stream and
//! the result produced by aggregating one of those streams.

use crate::credentials::CredentialStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// One event from the agent's query stream.
///
/// Only `Assistant` carries text the aggregator cares about; every other
/// variant is counted and otherwise ignored.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    /// Model output, possibly mixing text and tool calls.
    Assistant {
        message: AssistantBody,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
    },
    /// Input echoed back by the agent (prompts, tool results).
    User {
        #[serde(default)]
        message: Value,
    },
    /// Session lifecycle notices, e.g. the `init` event.
    System {
        #[serde(default)]
        subtype: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model: Option<String>,
    },
    /// Final summary emitted once the agent is done.
    Result {
        #[serde(default)]
        subtype: String,
        #[serde(default)]
        is_error: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        num_turns: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        total_cost_usd: Option<f64>,
    },
    /// Any message type this tool does not know about.
    #[serde(other)]
    Other,
}

/// Payload of an assistant message.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct AssistantBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default)]
    pub content: Vec<ContentBlock>,
}

/// A content fragment inside a message.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        #[serde(default)]
        content: Value,
        #[serde(default)]
        is_error: bool,
    },
    Thinking {
        #[serde(default)]
        thinking: String,
    },
    #[serde(other)]
    Other,
}

impl ContentBlock {
    /// The text of a textual fragment, `None` for everything else.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ContentBlock::Text { text } => Some(text),
            _ => None,
        }
    }
}

impl Message {
    /// Shorthand for an assistant message made of text fragments.
    #[cfg(test)]
    pub fn assistant_text<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Message::Assistant {
            message: AssistantBody {
                content: fragments
                    .into_iter()
                    .map(|t| ContentBlock::Text { text: t.into() })
                    .collect(),
                ..AssistantBody::default()
            },
            session_id: None,
        }
    }

    /// Content fragments of a text-bearing message. Empty for other kinds.
    pub fn content(&self) -> &[ContentBlock] {
        match self {
            Message::Assistant { message, .. } => &message.content,
            _ => &[],
        }
    }

    /// If this is a `result` flagged as an error, the detail to report.
    pub fn reported_error(&self) -> Option<String> {
        match self {
            Message::Result {
                is_error: true,
                result,
                subtype,
                ..
            } => Some(
                result
                    .clone()
                    .filter(|r| !r.trim().is_empty())
                    .unwrap_or_else(|| subtype.clone()),
            ),
            _ => None,
        }
    }

    /// Short label used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Assistant { .. } => "assistant",
            Message::User { .. } => "user",
            Message::System { .. } => "system",
            Message::Result { .. } => "result",
            Message::Other => "other",
        }
    }
}

/// How a query ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// Stream closed and produced text.
    Completed,
    /// Stream closed without any text.
    Empty,
    /// Stream raised an error or was cancelled.
    Failed,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Completed => write!(f, "Completed"),
            Outcome::Empty => write!(f, "Empty"),
            Outcome::Failed => write!(f, "Failed"),
        }
    }
}

/// Terminal result of aggregating one query stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationResult {
    /// True only for a completed stream with non-blank text.
    pub success: bool,
    /// Ordered concatenation of every text fragment. Empty on failure.
    pub text: String,
    /// Number of messages consumed, regardless of kind.
    pub message_count: usize,
    /// Error detail when the stream failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// How the stream ended.
    pub outcome: Outcome,
}

impl AggregationResult {
    /// Result for a stream that closed normally.
    pub fn completed(text: String, message_count: usize) -> Self {
        if text.trim().is_empty() {
            Self {
                success: false,
                text,
                message_count,
                error: None,
                outcome: Outcome::Empty,
            }
        } else {
            Self {
                success: true,
                text,
                message_count,
                error: None,
                outcome: Outcome::Completed,
            }
        }
    }

    /// Result for a stream that failed after `message_count` messages.
    pub fn failed(message_count: usize, detail: impl Into<String>) -> Self {
        Self {
            success: false,
            text: String::new(),
            message_count,
            error: Some(detail.into()),
            outcome: Outcome::Failed,
        }
    }

    /// Number of characters in the aggregated text.
    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }
}

/// Everything reported about one agentping run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// Model requested from the agent.
    pub model: String,
    /// Prompt sent (or that would have been sent).
    pub prompt: String,
    /// Set/unset status of every checked variable.
    pub credentials: Vec<CredentialStatus>,
    /// Variable the credential came from, if preflight passed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential_source: Option<String>,
    /// Aggregated response; absent when no query was sent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<AggregationResult>,
    /// Wall-clock duration of the run in seconds.
    pub duration_seconds: f64,
}

impl RunReport {
    /// Whether the run counts as a pass.
    ///
    /// With a query that means a successful result; without one (dry run)
    /// passing preflight is enough.
    pub fn passed(&self) -> bool {
        match self.result {
            Some(ref result) => result.success,
            None => self.credential_source.is_some(),
        }
    }

    /// Conventional process exit code: 0 on pass, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        if self.passed() {
            0
        } else {
            1
        }
    }
}
