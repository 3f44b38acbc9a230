//! Query source backed by the agent CLI.
//!
//! The agent is run in print mode with `--output-format stream-json`, which
//! writes one JSON message per line on stdout. Each line becomes one
//! [`Message`] on the returned stream.

use super::query::{MessageStream, QueryRequest, QuerySource};
use crate::error::QueryError;
use crate::models::Message;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Executable used when none is configured.
pub const DEFAULT_EXECUTABLE: &str = "claude";

/// Longest slice of an undecodable line kept in the error.
const MAX_LINE_IN_ERROR: usize = 200;

/// Spawns the agent CLI once per query.
#[derive(Debug, Clone)]
pub struct ProcessQuery {
    executable: String,
    /// Arguments placed before the generated ones (e.g. a script path).
    executable_args: Vec<String>,
}

impl Default for ProcessQuery {
    fn default() -> Self {
        Self::new(DEFAULT_EXECUTABLE)
    }
}

enum Step {
    Cancelled,
    Line(std::io::Result<Option<String>>),
}

impl ProcessQuery {
    pub fn new(executable: impl Into<String>) -> Self {
        Self {
            executable: executable.into(),
            executable_args: Vec::new(),
        }
    }

    pub fn with_executable_args(mut self, args: Vec<String>) -> Self {
        self.executable_args = args;
        self
    }

    pub fn executable(&self) -> &str {
        &self.executable
    }

    /// Full argument list for `request`.
    pub fn build_args(&self, request: &QueryRequest) -> Vec<String> {
        let options = &request.options;
        let mut args = self.executable_args.clone();

        args.extend([
            "-p".to_string(),
            request.prompt.clone(),
            "--output-format".to_string(),
            "stream-json".to_string(),
            "--verbose".to_string(),
            "--model".to_string(),
            options.model.clone(),
        ]);

        if let Some(turns) = options.max_turns {
            args.push("--max-turns".to_string());
            args.push(turns.to_string());
        }
        if let Some(ref system_prompt) = options.system_prompt {
            args.push("--system-prompt".to_string());
            args.push(system_prompt.clone());
        }
        if !options.allowed_tools.is_empty() {
            args.push("--allowedTools".to_string());
            args.push(options.allowed_tools.join(","));
        }
        args.extend(options.extra_args.iter().cloned());

        args
    }

    fn command(&self, request: &QueryRequest) -> Command {
        let mut command = Command::new(&self.executable);
        command
            .args(self.build_args(request))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(ref credential) = request.credential {
            command.env(credential.variable(), credential.token());
        }
        command
    }
}

impl QuerySource for ProcessQuery {
    fn query(&self, request: QueryRequest, cancel: CancellationToken) -> MessageStream {
        let executable = self.executable.clone();
        let mut command = self.command(&request);

        info!(
            "Starting agent `{}` with model {}",
            executable, request.options.model
        );

        Box::pin(async_stream::stream! {
            let mut child = match command.spawn() {
                Ok(child) => child,
                Err(source) => {
                    yield Err(QueryError::Spawn { executable, source });
                    return;
                }
            };

            // Drain stderr on the side so a chatty agent can't block on a full pipe.
            let stderr = child.stderr.take();
            let stderr_task = tokio::spawn(async move {
                let mut buf = String::new();
                if let Some(mut stderr) = stderr {
                    let _ = stderr.read_to_string(&mut buf).await;
                }
                buf
            });

            let stdout = match child.stdout.take() {
                Some(stdout) => stdout,
                None => {
                    yield Err(QueryError::Io(std::io::Error::other("agent stdout was not captured")));
                    return;
                }
            };
            let mut lines = BufReader::new(stdout).lines();

            loop {
                let step = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Step::Cancelled,
                    line = lines.next_line() => Step::Line(line),
                };

                match step {
                    Step::Cancelled => {
                        debug!("Cancellation requested, stopping agent");
                        let _ = child.kill().await;
                        yield Err(QueryError::Cancelled);
                        return;
                    }
                    Step::Line(Ok(Some(line))) => {
                        let trimmed = line.trim();
                        if trimmed.is_empty() {
                            continue;
                        }
                        match serde_json::from_str::<Message>(trimmed) {
                            Ok(message) => {
                                debug!("Agent message: {}", message.kind());
                                let reported = message.reported_error();
                                yield Ok(message);
                                if let Some(detail) = reported {
                                    yield Err(QueryError::Reported(detail));
                                    return;
                                }
                            }
                            Err(source) => {
                                yield Err(QueryError::Decode {
                                    line: truncate(trimmed, MAX_LINE_IN_ERROR),
                                    source,
                                });
                                return;
                            }
                        }
                    }
                    Step::Line(Ok(None)) => break,
                    Step::Line(Err(e)) => {
                        yield Err(QueryError::Io(e));
                        return;
                    }
                }
            }

            let status = match child.wait().await {
                Ok(status) => status,
                Err(e) => {
                    yield Err(QueryError::Io(e));
                    return;
                }
            };
            let stderr = stderr_task.await.unwrap_or_default();
            let stderr = stderr.trim();

            if !status.success() {
                yield Err(QueryError::Exited {
                    code: status.code(),
                    stderr: stderr.to_string(),
                });
            } else if !stderr.is_empty() {
                debug!("Agent stderr: {}", stderr);
            }
        })
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_chars).collect();
        format!("{}...", head)
    }
}
