//! The exchange pipeline: pre-scan, completion, post-scan.
//!
//! Every exchange is a strict chain of awaited calls. A reply reaches the
//! caller only when neither scan blocks; any scan failure withholds it.

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;
use tracing::{error, info, instrument, warn};

use crate::completion::CompletionClient;
use crate::config::PipelineConfig;
use crate::error::{ExchangeError, ScanError};
use crate::scan::{Action, Category, ScanClient, ScanContent, ScanRequest, ScanVerdict};
use crate::{ConversationHistory, Message};

#[derive(Debug, Clone, PartialEq)]
pub enum ExchangeOutcome {
    Delivered(String),
    BlockedAtInput(ScanVerdict),
    BlockedAtOutput(ScanVerdict),
    Failed(ExchangeError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutcomeKind {
    Delivered,
    BlockedAtInput,
    BlockedAtOutput,
    Failed,
}

impl ExchangeOutcome {
    pub fn kind(&self) -> OutcomeKind {
        match self {
            ExchangeOutcome::Delivered(_) => OutcomeKind::Delivered,
            ExchangeOutcome::BlockedAtInput(_) => OutcomeKind::BlockedAtInput,
            ExchangeOutcome::BlockedAtOutput(_) => OutcomeKind::BlockedAtOutput,
            ExchangeOutcome::Failed(_) => OutcomeKind::Failed,
        }
    }

    pub fn reply(&self) -> Option<&str> {
        match self {
            ExchangeOutcome::Delivered(text) => Some(text),
            _ => None,
        }
    }

    pub fn verdict(&self) -> Option<&ScanVerdict> {
        match self {
            ExchangeOutcome::BlockedAtInput(v) | ExchangeOutcome::BlockedAtOutput(v) => Some(v),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExchangeStep {
    Validate,
    PreScan,
    Completion,
    PostScan,
}

impl fmt::Display for ExchangeStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExchangeStep::Validate => "validate",
            ExchangeStep::PreScan => "pre_scan",
            ExchangeStep::Completion => "completion",
            ExchangeStep::PostScan => "post_scan",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepStatus {
    Rejected(String),
    Allowed(Category),
    Alerted(Category),
    Blocked(Category),
    Replied { chars: usize },
    Failed(String),
}

/// Step-level record sent to the caller for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeEvent {
    pub step: ExchangeStep,
    pub tr_id: Option<String>,
    pub status: StepStatus,
}

#[derive(Clone)]
pub struct ExchangePipeline {
    scanner: Arc<dyn ScanClient>,
    completer: Arc<dyn CompletionClient>,
    config: Arc<PipelineConfig>,
    events: Option<UnboundedSender<ExchangeEvent>>,
}

impl ExchangePipeline {
    pub fn new(scanner: Arc<dyn ScanClient>, completer: Arc<dyn CompletionClient>, config: PipelineConfig) -> Self {
        Self {
            scanner,
            completer,
            config: Arc::new(config),
            events: None,
        }
    }

    /// Sends an [`ExchangeEvent`] per step to `tx`.
    pub fn with_events(mut self, tx: UnboundedSender<ExchangeEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn emit(&self, step: ExchangeStep, tr_id: Option<&str>, status: StepStatus) {
        if let Some(tx) = &self.events {
            // A dropped receiver only means nobody is rendering.
            let _ = tx.send(ExchangeEvent {
                step,
                tr_id: tr_id.map(str::to_string),
                status,
            });
        }
    }

    fn scan_request(&self, content: ScanContent) -> ScanRequest {
        ScanRequest::new(&self.config.profile_name, content, self.config.metadata.clone())
    }

    async fn scan_step(&self, step: ExchangeStep, request: &ScanRequest) -> Result<ScanVerdict, ScanError> {
        match self.scanner.scan(request, self.config.timeout).await {
            Ok(verdict) => {
                let status = if verdict.is_blocking(self.config.alert_policy) {
                    warn!(%step, tr_id = %request.tr_id, category = %verdict.category, action = %verdict.action, "Content blocked");
                    StepStatus::Blocked(verdict.category.clone())
                } else if verdict.action == Action::Alert {
                    warn!(%step, tr_id = %request.tr_id, category = %verdict.category, "Scan raised an alert, continuing");
                    StepStatus::Alerted(verdict.category.clone())
                } else {
                    info!(%step, tr_id = %request.tr_id, category = %verdict.category, "Content allowed");
                    StepStatus::Allowed(verdict.category.clone())
                };
                self.emit(step, Some(&request.tr_id), status);
                Ok(verdict)
            }
            Err(e) => {
                error!(%step, tr_id = %request.tr_id, kind = %e.kind, error = %e.message, "Scan failed");
                self.emit(step, Some(&request.tr_id), StepStatus::Failed(e.to_string()));
                Err(e)
            }
        }
    }

    /// Runs one exchange for `user_text` against the caller's `history`.
    /// The history is only read; appending the delivered turn is up to the
    /// caller.
    #[instrument(skip_all, fields(scanner = self.scanner.name(), completer = self.completer.name()))]
    pub async fn run_exchange(&self, user_text: &str, history: &ConversationHistory) -> ExchangeOutcome {
        let text = user_text.trim();
        if text.is_empty() {
            self.emit(ExchangeStep::Validate, None, StepStatus::Rejected("message is empty".to_string()));
            return ExchangeOutcome::Failed(ExchangeError::Validation("message is empty".to_string()));
        }

        let input_request = self.scan_request(ScanContent::Prompt(text.to_string()));
        let input_verdict = match self.scan_step(ExchangeStep::PreScan, &input_request).await {
            Ok(verdict) => verdict,
            Err(e) => return ExchangeOutcome::Failed(e.into()),
        };
        if input_verdict.is_blocking(self.config.alert_policy) {
            return ExchangeOutcome::BlockedAtInput(input_verdict);
        }

        // The completion has no transaction of its own; it is tagged with the
        // prompt's scan transaction.
        let step = ExchangeStep::Completion;
        let tr_id = input_request.tr_id.as_str();
        let candidate = Message::user(text);
        let reply = match self.completer.complete(history, &candidate, self.config.timeout).await {
            Ok(reply) => {
                info!(%step, tr_id, chars = reply.len(), "Completion received");
                self.emit(step, Some(tr_id), StepStatus::Replied { chars: reply.len() });
                reply
            }
            Err(e) => {
                error!(%step, tr_id, kind = %e.kind, error = %e.message, "Completion failed");
                self.emit(step, Some(tr_id), StepStatus::Failed(e.to_string()));
                return ExchangeOutcome::Failed(e.into());
            }
        };

        let output_request = self.scan_request(ScanContent::Response(reply.clone()));
        let output_verdict = match self.scan_step(ExchangeStep::PostScan, &output_request).await {
            Ok(verdict) => verdict,
            Err(e) => return ExchangeOutcome::Failed(e.into()),
        };
        if output_verdict.is_blocking(self.config.alert_policy) {
            return ExchangeOutcome::BlockedAtOutput(output_verdict);
        }

        ExchangeOutcome::Delivered(reply)
    }
}
