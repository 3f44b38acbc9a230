//! Console and JSON report generation.
//!
//! Every function here returns a `String`; printing is left to the caller.

use crate::credentials::{preview, Candidate};
use crate::error::PreflightError;
use crate::models::{AggregationResult, Outcome, RunReport};
use anyhow::{Context, Result};

const RULE_WIDTH: usize = 50;

/// Title line followed by a rule.
pub fn generate_header(title: &str) -> String {
    format!("🔍 {}\n{}\n", title, "=".repeat(RULE_WIDTH))
}

/// The environment check: one line per variable, with a token preview.
pub fn generate_env_check(candidates: &[Candidate], preview_chars: usize) -> String {
    let mut section = String::new();

    section.push_str("\n📋 Environment Check:\n");
    for candidate in candidates {
        let mark = if candidate.is_set() {
            "✓ SET"
        } else {
            "✗ NOT SET"
        };
        section.push_str(&format!("  {}: {}\n", candidate.variable, mark));

        if let Some(value) = candidate.value.as_deref().filter(|v| !v.is_empty()) {
            section.push_str(&format!("    Preview: {}\n", preview(value, preview_chars)));
        }
    }

    section
}

/// Setup instructions shown when preflight fails.
pub fn generate_missing_credential(err: &PreflightError) -> String {
    let PreflightError::MissingCredential { checked } = err;
    let mut section = String::new();

    section.push_str("\n❌ No authentication tokens found!\n");
    section.push_str("\nPlease set one of these environment variables:\n");
    for variable in checked {
        section.push_str(&format!("  export {}=<token>\n", variable));
    }
    section.push_str("  or run interactive authentication:\n");
    section.push_str("  claude auth login\n");

    section
}

/// Summary block for a finished query.
pub fn generate_result_section(report: &RunReport, result: &AggregationResult) -> String {
    let mut section = String::new();

    section.push_str(&format!(
        "\n📥 Received {} message(s)\n",
        result.message_count
    ));

    match result.outcome {
        Outcome::Completed => {
            section.push_str(&format!("📝 Response: {}\n", result.text.trim()));
            section.push_str("\n🎉 SUCCESS: Authentication is working!\n");
            section.push_str("\n📊 Test Results:\n");
            section.push_str("  ✓ Authentication: Working\n");
            section.push_str(&format!("  ✓ Model: {}\n", report.model));
            section.push_str(&format!(
                "  ✓ Response received: {} characters\n",
                result.char_count()
            ));
            section.push_str(&format!(
                "  ✓ Messages processed: {}\n",
                result.message_count
            ));
            section.push_str(&format!("  ✓ Duration: {:.1}s\n", report.duration_seconds));
        }
        Outcome::Empty => {
            section.push_str("\n⚠️  WARNING: Empty response received\n");
            section.push_str(
                "Authentication may be working but the agent didn't respond as expected\n",
            );
        }
        Outcome::Failed => {
            section.push_str("\n❌ ERROR: Query failed\n");
            section.push_str(&format!(
                "Error details: {}\n",
                result.error.as_deref().unwrap_or("unknown error")
            ));
            section.push_str(&generate_debugging_steps());
        }
    }

    section
}

/// Hints for diagnosing a failed query.
fn generate_debugging_steps() -> String {
    let mut steps = String::new();

    steps.push_str("\n🔧 Debugging steps:\n");
    steps.push_str("1. Check if the agent CLI is installed:\n");
    steps.push_str("   claude --version\n");
    steps.push_str("2. Check authentication status:\n");
    steps.push_str("   claude auth status\n");
    steps.push_str("3. Try re-authenticating:\n");
    steps.push_str("   claude auth login\n");

    steps
}

/// Generate a JSON report.
pub fn generate_json_report(report: &RunReport) -> Result<String> {
    serde_json::to_string_pretty(report).context("Failed to serialize report to JSON")
}
