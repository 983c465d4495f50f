// Interactive chat: owns the conversation history and drives the pipeline
// one line of user input at a time.

use anyhow::Result;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info};

use crate::pipeline::{ExchangeEvent, ExchangeOutcome, ExchangePipeline, StepStatus};
use crate::report::ThreatReport;
use crate::{ConversationHistory, Message};

pub struct ChatSession {
    pipeline: ExchangePipeline,
    history: ConversationHistory,
}

impl ChatSession {
    pub fn new(pipeline: ExchangePipeline) -> Self {
        let history = ConversationHistory::new(pipeline.config().max_history);
        Self { pipeline, history }
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    /// Runs one exchange and commits it to the history if, and only if, the
    /// reply was delivered.
    pub async fn submit(&mut self, user_text: &str) -> ExchangeOutcome {
        let outcome = self.pipeline.run_exchange(user_text, &self.history).await;
        if let ExchangeOutcome::Delivered(reply) = &outcome {
            self.history.push(Message::user(user_text.trim()));
            self.history.push(Message::assistant(reply.clone()));
            debug!(history_len = self.history.len(), "Exchange committed to history");
        }
        outcome
    }
}

pub fn render_event(event: &ExchangeEvent) -> String {
    let tr = event
        .tr_id
        .as_deref()
        .map(|id| format!(" [{}]", id))
        .unwrap_or_default();
    let status = match &event.status {
        StepStatus::Rejected(reason) => format!("rejected: {}", reason),
        StepStatus::Allowed(category) => format!("allowed ({})", category),
        StepStatus::Alerted(category) => format!("ALERT ({}), continuing", category),
        StepStatus::Blocked(category) => format!("BLOCKED ({})", category),
        StepStatus::Replied { chars } => format!("reply received ({} chars)", chars),
        StepStatus::Failed(error) => format!("failed: {}", error),
    };
    format!("[{}]{} {}", event.step, tr, status)
}

pub fn render_outcome(outcome: &ExchangeOutcome) -> String {
    match outcome {
        ExchangeOutcome::Delivered(reply) => format!("AI: {}", reply),
        ExchangeOutcome::BlockedAtInput(verdict) => format!(
            "Message blocked by security policy. Please modify your message and try again.\n{}",
            ThreatReport::from_verdict(verdict).render()
        ),
        ExchangeOutcome::BlockedAtOutput(verdict) => format!(
            "The AI response was withheld by security policy.\n{}",
            ThreatReport::from_verdict(verdict).render()
        ),
        ExchangeOutcome::Failed(error) => format!("Unable to complete the request: {}", error),
    }
}

/// Reads lines from `input` until EOF or `exit`, writing events and outcomes
/// to `output`.
pub async fn run_chat_loop<R, W>(
    session: &mut ChatSession,
    input: R,
    output: &mut W,
    mut events: Option<UnboundedReceiver<ExchangeEvent>>,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    output.write_all(b"Type a message, or 'exit' to quit.\n").await?;

    loop {
        output.write_all(b"You: ").await?;
        output.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.eq_ignore_ascii_case("exit") {
            break;
        }
        if line.is_empty() {
            output.write_all(b"Please enter a non-empty message.\n").await?;
            continue;
        }

        let outcome = session.submit(line).await;

        if let Some(rx) = events.as_mut() {
            while let Ok(event) = rx.try_recv() {
                output.write_all(format!("{}\n", render_event(&event)).as_bytes()).await?;
            }
        }
        output.write_all(format!("{}\n", render_outcome(&outcome)).as_bytes()).await?;
    }

    output.write_all(b"Session terminated. Goodbye!\n").await?;
    output.flush().await?;
    info!(history_len = session.history().len(), "Chat session finished");
    Ok(())
}
