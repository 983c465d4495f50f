use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::{Client, Url};
use tracing::{debug, info, instrument};

use super::wire::{read_verdict, ScanRequestBody};
use super::{ScanClient, ScanRequest, ScanVerdict};
use crate::config::{ApiKey, ScanSettings};
use crate::constants::{CLIENT_USER_AGENT, DEFAULT_SCAN_ENDPOINT, DEFAULT_SCAN_RETRIES, DEFAULT_SDK_BACKOFF, SCAN_SYNC_PATH, SCAN_TOKEN_HEADER};
use crate::error::{ScanError, ScanErrorKind};
use crate::retry::{retry_with_backoff, RetryPolicy};

/// Client-wide settings, fixed when the client is initialized.
#[derive(Debug, Clone)]
pub struct SdkSettings {
    pub api_key: ApiKey,
    pub api_endpoint: String,
    pub num_retries: u32,
    /// Delay before the first retry; doubles on each further attempt.
    pub backoff: Duration,
}

impl SdkSettings {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: ApiKey::new(api_key),
            api_endpoint: DEFAULT_SCAN_ENDPOINT.to_string(),
            num_retries: DEFAULT_SCAN_RETRIES,
            backoff: DEFAULT_SDK_BACKOFF,
        }
    }
}

impl From<&ScanSettings> for SdkSettings {
    fn from(settings: &ScanSettings) -> Self {
        Self {
            api_key: settings.api_key.clone(),
            api_endpoint: settings.endpoint.clone(),
            num_retries: settings.num_retries,
            backoff: settings.backoff,
        }
    }
}

/// Scan client modelled on the vendor SDK: authentication and identification
/// are baked into the HTTP client at init, requests are typed models, and
/// transient failures are retried with exponential backoff.
#[derive(Debug, Clone)]
pub struct SdkScanClient {
    http: Client,
    scan_url: Url,
    settings: SdkSettings,
}

impl SdkScanClient {
    pub fn init(settings: SdkSettings) -> Result<Self, ScanError> {
        if settings.api_key.expose().is_empty() {
            return Err(ScanError::new(ScanErrorKind::AuthFailed, "scan API key is empty"));
        }

        let base = settings.api_endpoint.trim_end_matches('/');
        let scan_url = Url::parse(&format!("{}{}", base, SCAN_SYNC_PATH)).map_err(|e| {
            ScanError::new(
                ScanErrorKind::Unreachable,
                format!("invalid scan endpoint '{}': {}", settings.api_endpoint, e),
            )
        })?;

        let mut token = HeaderValue::from_str(settings.api_key.expose()).map_err(|_| {
            ScanError::new(ScanErrorKind::AuthFailed, "scan API key is not a valid header value")
        })?;
        token.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(SCAN_TOKEN_HEADER, token);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let http = Client::builder()
            .user_agent(CLIENT_USER_AGENT.as_str())
            .default_headers(headers)
            .build()
            .map_err(|e| ScanError::new(ScanErrorKind::Unreachable, format!("failed to build HTTP client: {}", e)))?;

        info!(endpoint = %scan_url, retries = settings.num_retries, "Scan SDK client initialized");
        Ok(Self { http, scan_url, settings })
    }

    pub fn settings(&self) -> &SdkSettings {
        &self.settings
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::exponential(self.settings.num_retries, self.settings.backoff)
    }

    async fn execute(&self, request: &ScanRequest, timeout: Duration) -> Result<ScanVerdict, ScanError> {
        let body = ScanRequestBody::from(request);
        let response = self
            .http
            .post(self.scan_url.clone())
            .timeout(timeout)
            .json(&body)
            .send()
            .await
            .map_err(ScanError::from_reqwest)?;

        read_verdict(response, &request.tr_id).await
    }
}

#[async_trait]
impl ScanClient for SdkScanClient {
    fn name(&self) -> &'static str {
        "sdk"
    }

    #[instrument(skip_all, fields(tr_id = %request.tr_id, stage = %request.stage()))]
    async fn scan(&self, request: &ScanRequest, timeout: Duration) -> Result<ScanVerdict, ScanError> {
        debug!(profile = %request.profile_name, chars = request.content.text().len(), "SDK scan starting");
        let started = Instant::now();

        let verdict = retry_with_backoff(
            "sdk_scan",
            self.retry_policy(),
            |e: &ScanError| e.kind.is_transient(),
            || self.execute(request, timeout),
        )
        .await?;

        info!(
            category = %verdict.category,
            action = %verdict.action,
            scan_time_ms = started.elapsed().as_millis() as u64,
            report_id = verdict.report_id.as_deref().unwrap_or("-"),
            "SDK scan completed"
        );
        Ok(verdict)
    }
}
