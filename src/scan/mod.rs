//! Content-security scanning.
//!
//! [`ScanClient`] is the single capability the exchange pipeline depends on.
//! Two HTTP backends implement it: [`ApiScanClient`] posts hand-built JSON to
//! the sync scan endpoint, [`SdkScanClient`] is initialized once from
//! [`SdkSettings`] and sends typed request models with backoff retries.

pub mod api;
pub mod sdk;
mod wire;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::{ScanBackend, ScanSettings};
use crate::error::ScanError;

pub use api::ApiScanClient;
pub use sdk::{SdkScanClient, SdkSettings};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStage {
    Prompt,
    Response,
}

impl fmt::Display for ScanStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanStage::Prompt => f.write_str("prompt"),
            ScanStage::Response => f.write_str("response"),
        }
    }
}

/// Text submitted for scanning. A request never carries both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanContent {
    Prompt(String),
    Response(String),
}

impl ScanContent {
    pub fn stage(&self) -> ScanStage {
        match self {
            ScanContent::Prompt(_) => ScanStage::Prompt,
            ScanContent::Response(_) => ScanStage::Response,
        }
    }

    pub fn text(&self) -> &str {
        match self {
            ScanContent::Prompt(text) | ScanContent::Response(text) => text,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRequest {
    pub tr_id: String,
    pub profile_name: String,
    pub content: ScanContent,
    pub metadata: BTreeMap<String, String>,
}

impl ScanRequest {
    pub fn new(profile_name: impl Into<String>, content: ScanContent, metadata: BTreeMap<String, String>) -> Self {
        Self {
            tr_id: Uuid::new_v4().to_string(),
            profile_name: profile_name.into(),
            content,
            metadata,
        }
    }

    pub fn prompt(profile_name: impl Into<String>, text: impl Into<String>, metadata: BTreeMap<String, String>) -> Self {
        Self::new(profile_name, ScanContent::Prompt(text.into()), metadata)
    }

    pub fn response(profile_name: impl Into<String>, text: impl Into<String>, metadata: BTreeMap<String, String>) -> Self {
        Self::new(profile_name, ScanContent::Response(text.into()), metadata)
    }

    pub fn stage(&self) -> ScanStage {
        self.content.stage()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Allow,
    Block,
    Alert,
}

impl Action {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "allow" => Some(Action::Allow),
            "block" => Some(Action::Block),
            "alert" => Some(Action::Alert),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Action::Allow => "allow",
            Action::Block => "block",
            Action::Alert => "alert",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Category {
    Benign,
    Malicious,
    PromptInjection,
    MaliciousCode,
    MaliciousUrl,
    ToxicContent,
    SensitiveDataLeak,
    Other(String),
}

impl Category {
    /// Maps the vendor's top-level classification.
    pub fn from_vendor(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "benign" => Category::Benign,
            "malicious" => Category::Malicious,
            "prompt_injection" | "injection" => Category::PromptInjection,
            "malicious_code" => Category::MaliciousCode,
            "malicious_url" | "url_cats" => Category::MaliciousUrl,
            "toxic_content" | "toxicity" => Category::ToxicContent,
            "sensitive_data_leak" | "dlp" => Category::SensitiveDataLeak,
            other => Category::Other(other.to_string()),
        }
    }

    /// Maps a detection flag name (`url_cats`, `dlp`, ...) to a category.
    pub fn from_detection(flag: &str) -> Self {
        match Self::from_vendor(flag) {
            Category::Benign | Category::Malicious => Category::Other(flag.to_string()),
            category => category,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Category::Benign => "benign",
            Category::Malicious => "malicious",
            Category::PromptInjection => "prompt_injection",
            Category::MaliciousCode => "malicious_code",
            Category::MaliciousUrl => "malicious_url",
            Category::ToxicContent => "toxic_content",
            Category::SensitiveDataLeak => "sensitive_data_leak",
            Category::Other(name) => name,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    pub stage: ScanStage,
    pub threat: String,
}

/// How an `alert` recommendation is treated by the pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertPolicy {
    /// Log the alert and let the content through.
    #[default]
    Allow,
    Block,
}

impl std::str::FromStr for AlertPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "allow" => Ok(AlertPolicy::Allow),
            "block" => Ok(AlertPolicy::Block),
            other => Err(format!("expected 'allow' or 'block', got '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScanVerdict {
    pub tr_id: String,
    pub category: Category,
    pub action: Action,
    pub detections: Vec<Detection>,
    pub report_id: Option<String>,
    pub scan_id: Option<String>,
    /// Response body as returned by the service, kept for logging.
    pub raw: serde_json::Value,
}

impl ScanVerdict {
    pub fn is_blocking(&self, policy: AlertPolicy) -> bool {
        match self.action {
            Action::Block => true,
            Action::Alert => policy == AlertPolicy::Block,
            Action::Allow => false,
        }
    }
}

#[async_trait]
pub trait ScanClient: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &'static str;

    /// Scans one request synchronously. Each network attempt is bounded by
    /// `timeout`; retries resend the same transaction id.
    async fn scan(&self, request: &ScanRequest, timeout: Duration) -> Result<ScanVerdict, ScanError>;
}

pub fn build_client(backend: ScanBackend, settings: &ScanSettings) -> Result<Arc<dyn ScanClient>, ScanError> {
    let client: Arc<dyn ScanClient> = match backend {
        ScanBackend::Api => Arc::new(ApiScanClient::new(settings)?),
        ScanBackend::Sdk => Arc::new(SdkScanClient::init(SdkSettings::from(settings))?),
    };
    Ok(client)
}
