use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::Client;
use serde_json::json;
use tracing::{debug, info, instrument};

use super::wire::read_verdict;
use super::{ScanClient, ScanContent, ScanRequest, ScanVerdict};
use crate::config::ScanSettings;
use crate::constants::{SCAN_SYNC_PATH, SCAN_TOKEN_HEADER};
use crate::error::{ScanError, ScanErrorKind};
use crate::retry::{retry_with_backoff, RetryPolicy};

/// Raw request/response client for the sync scan endpoint.
///
/// Retries once, immediately, when the service can't be reached. The retry
/// resends the same body, transaction id included.
#[derive(Debug, Clone)]
pub struct ApiScanClient {
    http: Client,
    url: String,
    token: HeaderValue,
    retry: RetryPolicy,
}

impl ApiScanClient {
    pub fn new(settings: &ScanSettings) -> Result<Self, ScanError> {
        if settings.api_key.expose().is_empty() {
            return Err(ScanError::new(ScanErrorKind::AuthFailed, "scan API key is empty"));
        }
        let mut token = HeaderValue::from_str(settings.api_key.expose()).map_err(|_| {
            ScanError::new(ScanErrorKind::AuthFailed, "scan API key is not a valid header value")
        })?;
        token.set_sensitive(true);

        Ok(Self {
            http: Client::new(),
            url: format!("{}{}", settings.endpoint.trim_end_matches('/'), SCAN_SYNC_PATH),
            token,
            retry: RetryPolicy::immediate(1),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn send_once(&self, request: &ScanRequest, timeout: Duration) -> Result<ScanVerdict, ScanError> {
        let content = match &request.content {
            ScanContent::Prompt(text) => json!({ "prompt": text }),
            ScanContent::Response(text) => json!({ "response": text }),
        };
        let payload = json!({
            "tr_id": request.tr_id,
            "ai_profile": { "profile_name": request.profile_name },
            "metadata": request.metadata,
            "contents": [content],
        });

        let response = self
            .http
            .post(&self.url)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json")
            .header(SCAN_TOKEN_HEADER, self.token.clone())
            .timeout(timeout)
            .json(&payload)
            .send()
            .await
            .map_err(ScanError::from_reqwest)?;

        read_verdict(response, &request.tr_id).await
    }
}

#[async_trait]
impl ScanClient for ApiScanClient {
    fn name(&self) -> &'static str {
        "api"
    }

    #[instrument(skip_all, fields(tr_id = %request.tr_id, stage = %request.stage()))]
    async fn scan(&self, request: &ScanRequest, timeout: Duration) -> Result<ScanVerdict, ScanError> {
        debug!(chars = request.content.text().len(), url = %self.url, "Scanning content via API");
        let started = Instant::now();

        let verdict = retry_with_backoff(
            "scan",
            self.retry,
            |e: &ScanError| e.kind == ScanErrorKind::Unreachable,
            || self.send_once(request, timeout),
        )
        .await?;

        info!(
            category = %verdict.category,
            action = %verdict.action,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Scan completed"
        );
        Ok(verdict)
    }
}
