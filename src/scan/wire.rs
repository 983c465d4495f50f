// Sync scan endpoint payloads and response mapping shared by both backends.

use std::collections::BTreeMap;

use reqwest::Response;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error};

use super::{Action, Category, Detection, ScanContent, ScanRequest, ScanStage, ScanVerdict};
use crate::error::{ScanError, ScanErrorKind};

// Detection flags in the order they decide the verdict category.
const CATEGORY_PRIORITY: &[&str] = &[
    "injection",
    "prompt_injection",
    "malicious_code",
    "url_cats",
    "dlp",
    "toxic_content",
    "toxicity",
];

#[derive(Debug, Serialize)]
pub(crate) struct ScanRequestBody<'a> {
    pub tr_id: &'a str,
    pub ai_profile: AiProfile<'a>,
    #[serde(skip_serializing_if = "no_metadata")]
    pub metadata: &'a BTreeMap<String, String>,
    pub contents: Vec<ContentItem<'a>>,
}

fn no_metadata(metadata: &&BTreeMap<String, String>) -> bool {
    metadata.is_empty()
}

#[derive(Debug, Serialize)]
pub(crate) struct AiProfile<'a> {
    pub profile_name: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct ContentItem<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<&'a str>,
}

impl<'a> From<&'a ScanRequest> for ScanRequestBody<'a> {
    fn from(request: &'a ScanRequest) -> Self {
        let item = match &request.content {
            ScanContent::Prompt(text) => ContentItem { prompt: Some(text.as_str()), response: None },
            ScanContent::Response(text) => ContentItem { prompt: None, response: Some(text.as_str()) },
        };
        Self {
            tr_id: &request.tr_id,
            ai_profile: AiProfile { profile_name: &request.profile_name },
            metadata: &request.metadata,
            contents: vec![item],
        }
    }
}

#[derive(Debug, Deserialize)]
struct ScanResponseBody {
    action: Option<String>,
    category: Option<String>,
    tr_id: Option<String>,
    report_id: Option<String>,
    scan_id: Option<String>,
    #[serde(default)]
    prompt_detected: BTreeMap<String, Value>,
    #[serde(default)]
    response_detected: BTreeMap<String, Value>,
}

fn detected_flags(stage: ScanStage, flags: &BTreeMap<String, Value>) -> impl Iterator<Item = Detection> + '_ {
    flags
        .iter()
        .filter(|(_, detected)| detected.as_bool().unwrap_or(false))
        .map(move |(threat, _)| Detection { stage, threat: threat.clone() })
}

fn derive_category(vendor: Option<&str>, detections: &[Detection]) -> Category {
    let prioritized = CATEGORY_PRIORITY
        .iter()
        .find(|flag| detections.iter().any(|d| d.threat == **flag))
        .map(|flag| Category::from_detection(flag));

    prioritized
        .or_else(|| detections.first().map(|d| Category::from_detection(&d.threat)))
        .or_else(|| vendor.map(Category::from_vendor))
        .unwrap_or_else(|| Category::Other("unknown".to_string()))
}

/// Maps a decoded response body into a verdict. A missing or unknown action
/// is malformed: the content can't be confirmed safe.
pub(crate) fn verdict_from_value(raw: Value, request_tr_id: &str) -> Result<ScanVerdict, ScanError> {
    let body: ScanResponseBody = serde_json::from_value(raw.clone())
        .map_err(|e| ScanError::new(ScanErrorKind::Malformed, format!("unexpected scan response shape: {}", e)))?;

    let action_str = body
        .action
        .as_deref()
        .ok_or_else(|| ScanError::new(ScanErrorKind::Malformed, "scan response has no action"))?;
    let action = Action::parse(action_str).ok_or_else(|| {
        ScanError::new(ScanErrorKind::Malformed, format!("unknown scan action '{}'", action_str))
    })?;

    let detections: Vec<Detection> = detected_flags(ScanStage::Prompt, &body.prompt_detected)
        .chain(detected_flags(ScanStage::Response, &body.response_detected))
        .collect();
    let category = derive_category(body.category.as_deref(), &detections);

    Ok(ScanVerdict {
        tr_id: body.tr_id.unwrap_or_else(|| request_tr_id.to_string()),
        category,
        action,
        detections,
        report_id: body.report_id,
        scan_id: body.scan_id,
        raw,
    })
}

/// Classifies the HTTP status and decodes the body of a scan response.
pub(crate) async fn read_verdict(response: Response, request_tr_id: &str) -> Result<ScanVerdict, ScanError> {
    let status = response.status();
    if !status.is_success() {
        let error_body = response
            .text()
            .await
            .unwrap_or_else(|_| "Failed to read error body".to_string());
        let kind = ScanErrorKind::from_status(status);
        error!(%status, %error_body, tr_id = request_tr_id, %kind, "Scan API request failed");
        return Err(ScanError::new(
            kind,
            format!("scan API returned {}: {}", status, error_body),
        ));
    }

    let raw = response.json::<Value>().await.map_err(|e| {
        let kind = if e.is_timeout() { ScanErrorKind::Timeout } else { ScanErrorKind::Malformed };
        ScanError::new(kind, format!("failed to parse scan response: {}", e))
    })?;
    debug!(tr_id = request_tr_id, response = %raw, "Received scan response");

    verdict_from_value(raw, request_tr_id)
}
