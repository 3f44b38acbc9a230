//! Streaming response aggregation.
//!
//! Consumes one message stream from start to end, concatenating text
//! fragments as they arrive and handing each one to an observer so callers
//! can display output incrementally. The stream is read once, in order,
//! and never resumed.

use crate::agent::{QueryRequest, QuerySource};
use crate::credentials::Credential;
use crate::error::QueryError;
use crate::models::{AggregationResult, Message};
use futures::{Stream, StreamExt};
use std::pin::pin;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Receives each text fragment as soon as it is extracted.
pub trait TextObserver {
    fn on_text(&mut self, text: &str);
}

impl<F> TextObserver for F
where
    F: FnMut(&str),
{
    fn on_text(&mut self, text: &str) {
        self(text)
    }
}

/// Runs queries against a source and aggregates the responses.
pub struct Aggregator<Q> {
    source: Q,
}

impl<Q: QuerySource> Aggregator<Q> {
    pub fn new(source: Q) -> Self {
        Self { source }
    }

    /// Open a fresh stream for `request` and aggregate it.
    ///
    /// Taking a [`Credential`] means preflight has already passed. This never
    /// fails: every problem ends up in the returned result.
    pub async fn run<O>(
        &self,
        credential: &Credential,
        request: QueryRequest,
        cancel: CancellationToken,
        observer: &mut O,
    ) -> AggregationResult
    where
        O: TextObserver,
    {
        if request.prompt.trim().is_empty() {
            warn!("Refusing to send an empty prompt");
            return AggregationResult::failed(0, "prompt must not be empty");
        }

        info!(
            "Sending prompt ({} chars) using credential from {}",
            request.prompt.chars().count(),
            credential.variable()
        );

        let request = request.with_credential(credential.clone());
        let stream = self.source.query(request, cancel.clone());
        aggregate(stream, &cancel, observer).await
    }

    /// Like [`Aggregator::run`], but gives up once `deadline` has passed.
    ///
    /// On expiry the query is cancelled rather than dropped, so the result
    /// still counts the messages consumed before the deadline.
    pub async fn run_with_deadline<O>(
        &self,
        credential: &Credential,
        request: QueryRequest,
        cancel: CancellationToken,
        observer: &mut O,
        deadline: Option<Duration>,
    ) -> AggregationResult
    where
        O: TextObserver,
    {
        let Some(limit) = deadline else {
            return self.run(credential, request, cancel, observer).await;
        };

        let query_cancel = cancel.child_token();
        let mut run = pin!(self.run(credential, request, query_cancel.clone(), observer));
        let mut expiry = pin!(tokio::time::sleep(limit));
        let mut timed_out = false;

        let result = loop {
            tokio::select! {
                biased;
                result = &mut run => break result,
                _ = &mut expiry, if !timed_out => {
                    warn!("No complete response within {:?}", limit);
                    timed_out = true;
                    query_cancel.cancel();
                }
            }
        };

        if timed_out && !result.success {
            AggregationResult::failed(
                result.message_count,
                format!("timed out after {:?}", limit),
            )
        } else {
            result
        }
    }
}

/// Aggregate a message stream into a terminal result.
///
/// Stops at the first error or on cancellation; partial text from a failed
/// stream is not carried into the result.
pub async fn aggregate<S, O>(
    stream: S,
    cancel: &CancellationToken,
    observer: &mut O,
) -> AggregationResult
where
    S: Stream<Item = Result<Message, QueryError>>,
    O: TextObserver + ?Sized,
{
    let mut stream = pin!(stream);
    let mut text = String::new();
    let mut message_count = 0usize;
    let mut fragment_count = 0usize;

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!("Query cancelled after {} message(s)", message_count);
                return AggregationResult::failed(message_count, QueryError::Cancelled.to_string());
            }
            next = stream.next() => next,
        };

        match next {
            Some(Ok(message)) => {
                message_count += 1;
                for fragment in message.content().iter().filter_map(|b| b.as_text()) {
                    fragment_count += 1;
                    text.push_str(fragment);
                    observer.on_text(fragment);
                }
            }
            Some(Err(e)) => {
                warn!(
                    "Stream failed after {} message(s), {} fragment(s): {}",
                    message_count, fragment_count, e
                );
                return AggregationResult::failed(message_count, e.to_string());
            }
            None => break,
        }
    }

    debug!(
        "Stream closed: {} message(s), {} fragment(s), {} chars",
        message_count,
        fragment_count,
        text.chars().count()
    );

    let result = AggregationResult::completed(text, message_count);
    if !result.success {
        debug!("Stream completed without any text");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{MessageStream, ProcessQuery, QueryOptions};
    use crate::credentials::{preflight, Candidate};
    use crate::models::{AssistantBody, ContentBlock, Outcome};
    use futures::stream;

    /// What a scripted stream yields next.
    #[derive(Clone)]
    enum Event {
        Msg(Message),
        Fail(&'static str),
    }

    /// Source that replays the same events on every call.
    struct ScriptedSource {
        events: Vec<Event>,
    }

    impl QuerySource for ScriptedSource {
        fn query(&self, _request: QueryRequest, _cancel: CancellationToken) -> MessageStream {
            let items: Vec<Result<Message, QueryError>> = self
                .events
                .iter()
                .cloned()
                .map(|e| match e {
                    Event::Msg(m) => Ok(m),
                    Event::Fail(detail) => Err(QueryError::Io(std::io::Error::other(detail))),
                })
                .collect();
            Box::pin(stream::iter(items))
        }
    }

    fn credential() -> Credential {
        preflight(&[Candidate::new("CLAUDE_CODE_OAUTH_TOKEN", Some("token".to_string()))]).unwrap()
    }

    fn request(prompt: &str) -> QueryRequest {
        QueryRequest::new(prompt, QueryOptions::default())
    }

    fn tool_only() -> Message {
        Message::Assistant {
            message: AssistantBody {
                content: vec![ContentBlock::ToolUse {
                    id: "toolu_1".to_string(),
                    name: "Bash".to_string(),
                    input: serde_json::json!({"command": "ls"}),
                }],
                ..AssistantBody::default()
            },
            session_id: None,
        }
    }

    fn system_init() -> Message {
        Message::System {
            subtype: "init".to_string(),
            session_id: Some("s1".to_string()),
            model: None,
        }
    }

    async fn run(events: Vec<Event>) -> (AggregationResult, Vec<String>) {
        let aggregator = Aggregator::new(ScriptedSource { events });
        let mut seen = Vec::new();
        let result = aggregator
            .run(
                &credential(),
                request("ping"),
                CancellationToken::new(),
                &mut |t: &str| seen.push(t.to_string()),
            )
            .await;
        (result, seen)
    }

    #[tokio::test]
    async fn test_ping_pong() {
        let (result, seen) = run(vec![Event::Msg(Message::assistant_text(["pong"]))]).await;

        assert!(result.success);
        assert_eq!(result.text, "pong");
        assert_eq!(result.message_count, 1);
        assert_eq!(result.outcome, Outcome::Completed);
        assert_eq!(seen, vec!["pong"]);
    }

    #[tokio::test]
    async fn test_zero_messages_is_empty() {
        let (result, seen) = run(vec![]).await;

        assert!(!result.success);
        assert_eq!(result.text, "");
        assert_eq!(result.message_count, 0);
        assert_eq!(result.outcome, Outcome::Empty);
        assert_eq!(result.error, None);
        assert!(seen.is_empty());
    }

    #[tokio::test]
    async fn test_non_text_only_is_empty() {
        let (result, _) = run(vec![
            Event::Msg(system_init()),
            Event::Msg(tool_only()),
            Event::Msg(Message::Other),
        ])
        .await;

        assert!(!result.success);
        assert_eq!(result.text, "");
        assert_eq!(result.message_count, 3);
        assert_eq!(result.outcome, Outcome::Empty);
    }

    #[tokio::test]
    async fn test_concatenates_in_order_and_counts_messages() {
        let (result, seen) = run(vec![
            Event::Msg(system_init()),
            Event::Msg(Message::assistant_text(["Hel", "lo"])),
            Event::Msg(tool_only()),
            Event::Msg(Message::assistant_text([", world"])),
        ])
        .await;

        assert!(result.success);
        assert_eq!(result.text, "Hello, world");
        assert_eq!(result.message_count, 4);
        assert_eq!(seen, vec!["Hel", "lo", ", world"]);
    }

    #[tokio::test]
    async fn test_error_after_partial_text() {
        let (result, seen) = run(vec![
            Event::Msg(Message::assistant_text(["partial"])),
            Event::Fail("connection reset"),
            Event::Msg(Message::assistant_text(["never seen"])),
        ])
        .await;

        assert!(!result.success);
        assert_eq!(result.outcome, Outcome::Failed);
        assert_eq!(result.message_count, 1);
        assert!(result.text.is_empty());
        let detail = result.error.unwrap();
        assert!(detail.contains("connection reset"));
        // Fragments before the failure were still shown as they arrived.
        assert_eq!(seen, vec!["partial"]);
    }

    #[test]
    fn test_fresh_streams_give_identical_results() {
        let events = vec![
            Event::Msg(system_init()),
            Event::Msg(Message::assistant_text(["same", " answer"])),
        ];
        let aggregator = Aggregator::new(ScriptedSource { events });
        let cred = credential();

        let first = tokio_test::block_on(aggregator.run(
            &cred,
            request("ping"),
            CancellationToken::new(),
            &mut |_: &str| {},
        ));
        let second = tokio_test::block_on(aggregator.run(
            &cred,
            request("ping"),
            CancellationToken::new(),
            &mut |_: &str| {},
        ));

        assert_eq!(first, second);
        assert_eq!(first.text, "same answer");
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let aggregator = Aggregator::new(ScriptedSource {
            events: vec![Event::Msg(Message::assistant_text(["pong"]))],
        });
        let result = aggregator
            .run(&credential(), request("ping"), cancel, &mut |_: &str| {})
            .await;

        assert!(!result.success);
        assert_eq!(result.outcome, Outcome::Failed);
        assert_eq!(result.message_count, 0);
        assert_eq!(result.error.as_deref(), Some("query cancelled"));
    }

    #[tokio::test]
    async fn test_cancelled_mid_stream() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();

        // One message, then a stream that never closes on its own.
        let source = stream::iter(vec![Ok(Message::assistant_text(["first"]))])
            .chain(stream::pending());

        let result = aggregate(source, &cancel, &mut |_: &str| trigger.cancel()).await;

        assert!(!result.success);
        assert_eq!(result.outcome, Outcome::Failed);
        assert_eq!(result.message_count, 1);
        assert!(result.text.is_empty());
    }

    #[tokio::test]
    async fn test_empty_prompt_is_rejected() {
        let aggregator = Aggregator::new(ScriptedSource {
            events: vec![Event::Msg(Message::assistant_text(["pong"]))],
        });
        let result = aggregator
            .run(&credential(), request("   "), CancellationToken::new(), &mut |_: &str| {})
            .await;

        assert_eq!(result.outcome, Outcome::Failed);
        assert_eq!(result.message_count, 0);
    }

    /// Source that sends its events and then stays open forever.
    struct StalledSource {
        events: Vec<Message>,
    }

    impl QuerySource for StalledSource {
        fn query(&self, _request: QueryRequest, _cancel: CancellationToken) -> MessageStream {
            let items: Vec<Result<Message, QueryError>> =
                self.events.iter().cloned().map(Ok).collect();
            Box::pin(stream::iter(items).chain(stream::pending()))
        }
    }

    #[tokio::test]
    async fn test_deadline_keeps_message_count() {
        let aggregator = Aggregator::new(StalledSource {
            events: vec![system_init(), Message::assistant_text(["partial"])],
        });
        let mut seen = Vec::new();

        let result = aggregator
            .run_with_deadline(
                &credential(),
                request("ping"),
                CancellationToken::new(),
                &mut |t: &str| seen.push(t.to_string()),
                Some(Duration::from_millis(50)),
            )
            .await;

        assert!(!result.success);
        assert_eq!(result.outcome, Outcome::Failed);
        assert_eq!(result.message_count, 2);
        assert!(result.text.is_empty());
        assert_eq!(result.error.as_deref(), Some("timed out after 50ms"));
        assert_eq!(seen, vec!["partial"]);
    }

    #[tokio::test]
    async fn test_deadline_with_no_messages() {
        let aggregator = Aggregator::new(StalledSource { events: vec![] });
        let result = aggregator
            .run_with_deadline(
                &credential(),
                request("ping"),
                CancellationToken::new(),
                &mut |_: &str| {},
                Some(Duration::from_secs(1)),
            )
            .await;

        assert_eq!(result.outcome, Outcome::Failed);
        assert_eq!(result.message_count, 0);
        assert!(result.error.unwrap().contains("timed out after 1s"));
    }

    #[tokio::test]
    async fn test_deadline_not_reached() {
        let aggregator = Aggregator::new(ScriptedSource {
            events: vec![Event::Msg(Message::assistant_text(["pong"]))],
        });
        let result = aggregator
            .run_with_deadline(
                &credential(),
                request("ping"),
                CancellationToken::new(),
                &mut |_: &str| {},
                Some(Duration::from_secs(30)),
            )
            .await;

        assert!(result.success);
        assert_eq!(result.text, "pong");
    }

    #[tokio::test]
    async fn test_cancel_before_deadline_is_not_a_timeout() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let aggregator = Aggregator::new(StalledSource { events: vec![] });

        let result = aggregator
            .run_with_deadline(
                &credential(),
                request("ping"),
                cancel,
                &mut |_: &str| {},
                Some(Duration::from_secs(30)),
            )
            .await;

        assert_eq!(result.error.as_deref(), Some("query cancelled"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_aggregates_agent_transcript() {
        let fixture = format!("{}/fixtures/tool_use.jsonl", env!("CARGO_MANIFEST_DIR"));
        let source = ProcessQuery::new("sh").with_executable_args(vec![
            "-c".to_string(),
            r#"cat "$0""#.to_string(),
            fixture,
        ]);
        let aggregator = Aggregator::new(source);

        let mut seen = String::new();
        let result = aggregator
            .run(
                &credential(),
                request("Hello!"),
                CancellationToken::new(),
                &mut |t: &str| seen.push_str(t),
            )
            .await;

        assert!(result.success);
        assert_eq!(result.text, "Let me check. Authentication successful");
        assert_eq!(result.message_count, 5);
        assert_eq!(seen, result.text);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_agent_error_result_fails() {
        let fixture = format!("{}/fixtures/auth_error.jsonl", env!("CARGO_MANIFEST_DIR"));
        let source = ProcessQuery::new("sh").with_executable_args(vec![
            "-c".to_string(),
            r#"cat "$0""#.to_string(),
            fixture,
        ]);

        let result = Aggregator::new(source)
            .run(&credential(), request("Hello!"), CancellationToken::new(), &mut |_: &str| {})
            .await;

        assert_eq!(result.outcome, Outcome::Failed);
        assert_eq!(result.message_count, 2);
        assert!(result.error.unwrap().contains("Invalid API key"));
    }
}
