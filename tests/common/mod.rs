#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use guardchat::completion::CompletionClient;
use guardchat::config::PipelineConfig;
use guardchat::scan::{Action, Category, Detection, ScanClient, ScanRequest, ScanStage, ScanVerdict};
use guardchat::{CompletionError, ConversationHistory, ExchangePipeline, Message, ScanError};

pub fn verdict(category: Category, action: Action) -> ScanVerdict {
    ScanVerdict {
        tr_id: "fixed".to_string(),
        category,
        action,
        detections: Vec::new(),
        report_id: None,
        scan_id: None,
        raw: serde_json::Value::Null,
    }
}

pub fn allow() -> ScanVerdict {
    verdict(Category::Benign, Action::Allow)
}

pub fn block(category: Category, threat: &str, stage: ScanStage) -> ScanVerdict {
    let mut v = verdict(category, Action::Block);
    v.detections.push(Detection { stage, threat: threat.to_string() });
    v
}

/// Scanner double answering by stage and recording every request.
pub struct ScriptedScanner {
    on_prompt: Result<ScanVerdict, ScanError>,
    on_response: Result<ScanVerdict, ScanError>,
    pub requests: Mutex<Vec<ScanRequest>>,
}

impl ScriptedScanner {
    pub fn new(on_prompt: Result<ScanVerdict, ScanError>, on_response: Result<ScanVerdict, ScanError>) -> Arc<Self> {
        Arc::new(Self {
            on_prompt,
            on_response,
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn allowing() -> Arc<Self> {
        Self::new(Ok(allow()), Ok(allow()))
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn stages(&self) -> Vec<ScanStage> {
        self.requests.lock().unwrap().iter().map(|r| r.stage()).collect()
    }
}

#[async_trait]
impl ScanClient for ScriptedScanner {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn scan(&self, request: &ScanRequest, _timeout: Duration) -> Result<ScanVerdict, ScanError> {
        self.requests.lock().unwrap().push(request.clone());
        match request.stage() {
            ScanStage::Prompt => self.on_prompt.clone(),
            ScanStage::Response => self.on_response.clone(),
        }
    }
}

/// Completion double with a fixed answer and a call counter.
pub struct ScriptedCompleter {
    answer: Result<String, CompletionError>,
    calls: AtomicUsize,
    pub contexts: Mutex<Vec<Vec<String>>>,
}

impl ScriptedCompleter {
    pub fn new(answer: Result<String, CompletionError>) -> Arc<Self> {
        Arc::new(Self {
            answer,
            calls: AtomicUsize::new(0),
            contexts: Mutex::new(Vec::new()),
        })
    }

    pub fn replying(text: &str) -> Arc<Self> {
        Self::new(Ok(text.to_string()))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionClient for ScriptedCompleter {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn complete(
        &self,
        history: &ConversationHistory,
        new_message: &Message,
        _timeout: Duration,
    ) -> Result<String, CompletionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let context = history
            .iter()
            .chain(std::iter::once(new_message))
            .map(|m| m.content().to_string())
            .collect();
        self.contexts.lock().unwrap().push(context);
        self.answer.clone()
    }
}

pub fn pipeline(scanner: Arc<ScriptedScanner>, completer: Arc<ScriptedCompleter>) -> ExchangePipeline {
    ExchangePipeline::new(scanner, completer, PipelineConfig::new("test-profile"))
}

pub fn pipeline_with(
    scanner: Arc<ScriptedScanner>,
    completer: Arc<ScriptedCompleter>,
    config: PipelineConfig,
) -> ExchangePipeline {
    ExchangePipeline::new(scanner, completer, config)
}
