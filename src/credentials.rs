//! Credential preflight.
//!
//! Before any query is attempted we make sure at least one of the accepted
//! token variables is set. No network call happens here.

use crate::error::PreflightError;
use serde::Serialize;
use tracing::debug;

/// OAuth token variable, checked first.
pub const OAUTH_TOKEN_VAR: &str = "CLAUDE_CODE_OAUTH_TOKEN";

/// Session token variable.
pub const SESSION_TOKEN_VAR: &str = "CLAUDE_CODE_SESSION";

/// Token characters shown in the environment check.
pub const DEFAULT_PREVIEW_CHARS: usize = 20;

/// One candidate credential: the variable name and whatever it held.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub variable: String,
    pub value: Option<String>,
}

impl Candidate {
    pub fn new(variable: impl Into<String>, value: Option<String>) -> Self {
        Self {
            variable: variable.into(),
            value,
        }
    }

    /// True when the variable holds a non-empty value.
    pub fn is_set(&self) -> bool {
        self.value.as_deref().is_some_and(|v| !v.is_empty())
    }

    /// Public view of this candidate, safe to print or serialize.
    pub fn status(&self) -> CredentialStatus {
        CredentialStatus {
            variable: self.variable.clone(),
            set: self.is_set(),
        }
    }
}

/// Set/unset status of a variable. Never carries the token itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CredentialStatus {
    pub variable: String,
    pub set: bool,
}

/// A credential that passed preflight.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    variable: String,
    token: String,
}

impl Credential {
    /// Name of the variable the token came from.
    pub fn variable(&self) -> &str {
        &self.variable
    }

    pub fn token(&self) -> &str {
        &self.token
    }
}

// Keep the token out of debug logs.
impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("variable", &self.variable)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// The first `chars` characters of `token` followed by `...`.
pub fn preview(token: &str, chars: usize) -> String {
    let head: String = token.chars().take(chars).collect();
    format!("{}...", head)
}

/// The default variable list: OAuth token first, then session token.
pub fn default_variables() -> Vec<String> {
    vec![OAUTH_TOKEN_VAR.to_string(), SESSION_TOKEN_VAR.to_string()]
}

/// Read each named variable from the process environment.
pub fn candidates_from_env(names: &[String]) -> Vec<Candidate> {
    names
        .iter()
        .map(|name| {
            let value = std::env::var(name).ok();
            debug!(
                "Credential variable {}: {}",
                name,
                if value.is_some() { "present" } else { "absent" }
            );
            Candidate::new(name.clone(), value)
        })
        .collect()
}

/// Pass iff at least one candidate is non-empty.
pub fn is_satisfied(candidates: &[Candidate]) -> bool {
    candidates.iter().any(Candidate::is_set)
}

/// Run the preflight check, returning the first usable credential.
pub fn preflight(candidates: &[Candidate]) -> Result<Credential, PreflightError> {
    let missing = || PreflightError::MissingCredential {
        checked: candidates.iter().map(|c| c.variable.clone()).collect(),
    };

    if !is_satisfied(candidates) {
        return Err(missing());
    }

    candidates
        .iter()
        .find(|c| c.is_set())
        .and_then(|c| {
            c.value.as_ref().map(|token| Credential {
                variable: c.variable.clone(),
                token: token.clone(),
            })
        })
        .ok_or_else(missing)
}
