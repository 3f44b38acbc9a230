//! Error types for preflight and the query stream.
//!
//! Neither of these is fatal to the process: a preflight error stops the
//! run before any query is made, and a query error ends up as the
//! `error` field of a failed aggregation.

use thiserror::Error;

/// Raised when no acceptable credential is present.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PreflightError {
    #[error("no authentication token found (checked: {})", .checked.join(", "))]
    MissingCredential {
        /// Variables that were inspected, in order.
        checked: Vec<String>,
    },
}

/// Errors raised by a query stream while it is being consumed.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("failed to start `{executable}`: {source}")]
    Spawn {
        executable: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error while reading the agent stream: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not decode agent message: {source} (line: {line})")]
    Decode {
        line: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("agent exited with {}", exit_detail(.code, .stderr))]
    Exited { code: Option<i32>, stderr: String },

    #[error("agent reported an error: {0}")]
    Reported(String),

    #[error("query cancelled")]
    Cancelled,
}

fn exit_detail(code: &Option<i32>, stderr: &str) -> String {
    let status = match code {
        Some(code) => format!("status {}", code),
        None => "no status (killed by signal)".to_string(),
    };
    if stderr.is_empty() {
        status
    } else {
        format!("{}: {}", status, stderr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_credential_lists_variables() {
        let err = PreflightError::MissingCredential {
            checked: vec![
                "CLAUDE_CODE_OAUTH_TOKEN".to_string(),
                "CLAUDE_CODE_SESSION".to_string(),
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("CLAUDE_CODE_OAUTH_TOKEN, CLAUDE_CODE_SESSION"));
    }

    #[test]
    fn test_exited_display() {
        let err = QueryError::Exited {
            code: Some(3),
            stderr: "boom".to_string(),
        };
        assert_eq!(err.to_string(), "agent exited with status 3: boom");

        let killed = QueryError::Exited {
            code: None,
            stderr: String::new(),
        };
        assert_eq!(
            killed.to_string(),
            "agent exited with no status (killed by signal)"
        );

        let silent = QueryError::Exited {
            code: Some(3),
            stderr: String::new(),
        };
        assert_eq!(silent.to_string(), "agent exited with status 3");
    }
}
