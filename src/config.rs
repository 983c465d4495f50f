//! Process-wide configuration, loaded once at startup and passed explicitly
//! to the clients and the pipeline.
//!
//! Values come from environment variables (a `.env` file is loaded by
//! `main` through `dotenvy`). Every loader takes a lookup function so the
//! same parsing serves the real environment, an explicit env file and tests.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::constants::{
    DEFAULT_APP_NAME, DEFAULT_AZURE_API_VERSION, DEFAULT_MAX_HISTORY, DEFAULT_SCAN_ENDPOINT, DEFAULT_SCAN_RETRIES,
    DEFAULT_SDK_BACKOFF, DEFAULT_SYSTEM_PROMPT, DEFAULT_TIMEOUT,
};
use crate::error::ConfigError;
use crate::scan::AlertPolicy;

/// Credential wrapper that never prints its value.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    /// First and last two characters, the rest starred.
    pub fn masked(&self) -> String {
        let chars: Vec<char> = self.0.chars().collect();
        if chars.len() <= 4 {
            return "*".repeat(chars.len());
        }
        let head: String = chars[..2].iter().collect();
        let tail: String = chars[chars.len() - 2..].iter().collect();
        format!("{}{}{}", head, "*".repeat(chars.len() - 4), tail)
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ApiKey({})", self.masked())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum ScanBackend {
    /// Raw HTTP calls against the scan endpoint.
    #[default]
    Api,
    /// SDK-style client with exponential backoff retries.
    Sdk,
}

impl fmt::Display for ScanBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanBackend::Api => f.write_str("api"),
            ScanBackend::Sdk => f.write_str("sdk"),
        }
    }
}

impl FromStr for ScanBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "api" => Ok(ScanBackend::Api),
            "sdk" => Ok(ScanBackend::Sdk),
            other => Err(format!("expected 'api' or 'sdk', got '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScanSettings {
    pub api_key: ApiKey,
    pub profile_name: String,
    pub endpoint: String,
    pub num_retries: u32,
    pub backoff: Duration,
}

#[derive(Debug, Clone)]
pub struct CompletionSettings {
    pub endpoint: String,
    pub api_key: ApiKey,
    pub deployment: String,
    pub api_version: String,
    pub system_prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: f32,
}

impl CompletionSettings {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>, deployment: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: ApiKey::new(api_key),
            deployment: deployment.into(),
            api_version: DEFAULT_AZURE_API_VERSION.to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            temperature: 0.7,
            max_tokens: 800,
            top_p: 0.95,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub profile_name: String,
    /// Bound applied to every scan and completion call.
    pub timeout: Duration,
    pub max_history: usize,
    pub alert_policy: AlertPolicy,
    /// Attached to every scan request.
    pub metadata: BTreeMap<String, String>,
}

impl PipelineConfig {
    pub fn new(profile_name: impl Into<String>) -> Self {
        let mut metadata = BTreeMap::new();
        metadata.insert("app_name".to_string(), DEFAULT_APP_NAME.to_string());
        Self {
            profile_name: profile_name.into(),
            timeout: DEFAULT_TIMEOUT,
            max_history: DEFAULT_MAX_HISTORY,
            alert_policy: AlertPolicy::Allow,
            metadata,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub scan: ScanSettings,
    pub completion: CompletionSettings,
    pub pipeline: PipelineConfig,
}

fn non_empty<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn required<F>(lookup: &F, key: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    non_empty(lookup, key).ok_or(ConfigError::Missing(key))
}

fn parsed<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: fmt::Display,
{
    match non_empty(lookup, key) {
        None => Ok(default),
        Some(value) => value.parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            value,
            reason: e.to_string(),
        }),
    }
}

impl ScanSettings {
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            api_key: ApiKey::new(required(&lookup, "PANW_AI_SEC_API_KEY")?),
            profile_name: required(&lookup, "PANW_AI_SEC_PROFILE_NAME")?,
            endpoint: non_empty(&lookup, "PANW_AI_SEC_API_ENDPOINT").unwrap_or_else(|| DEFAULT_SCAN_ENDPOINT.to_string()),
            num_retries: parsed(&lookup, "GUARDCHAT_SCAN_RETRIES", DEFAULT_SCAN_RETRIES)?,
            backoff: Duration::from_millis(parsed(
                &lookup,
                "GUARDCHAT_SCAN_BACKOFF_MS",
                DEFAULT_SDK_BACKOFF.as_millis() as u64,
            )?),
        })
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }
}

impl CompletionSettings {
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let endpoint = match non_empty(&lookup, "AZURE_ENDPOINT") {
            Some(endpoint) => endpoint,
            None => format!("https://{}.openai.azure.com", required(&lookup, "AZURE_PROJECT")?),
        };
        let mut settings = Self::new(
            endpoint,
            required(&lookup, "AZURE_KEY")?,
            required(&lookup, "AZURE_DEPLOY")?,
        );
        if let Some(version) = non_empty(&lookup, "AZURE_API_VERSION") {
            settings.api_version = version;
        }
        if let Some(prompt) = non_empty(&lookup, "GUARDCHAT_SYSTEM_PROMPT") {
            settings.system_prompt = prompt;
        }
        Ok(settings)
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }
}

impl PipelineConfig {
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::new(required(&lookup, "PANW_AI_SEC_PROFILE_NAME")?);
        config.timeout = Duration::from_secs(parsed(&lookup, "GUARDCHAT_TIMEOUT_SECS", DEFAULT_TIMEOUT.as_secs())?);
        config.max_history = parsed(&lookup, "GUARDCHAT_MAX_HISTORY", DEFAULT_MAX_HISTORY)?;
        config.alert_policy = parsed(&lookup, "GUARDCHAT_ALERT_POLICY", AlertPolicy::Allow)?;
        if let Some(app_name) = non_empty(&lookup, "GUARDCHAT_APP_NAME") {
            config.metadata.insert("app_name".to_string(), app_name);
        }
        if let Some(app_user) = non_empty(&lookup, "GUARDCHAT_APP_USER") {
            config.metadata.insert("app_user".to_string(), app_user);
        }
        if config.timeout.is_zero() {
            return Err(ConfigError::Invalid {
                key: "GUARDCHAT_TIMEOUT_SECS",
                value: "0".to_string(),
                reason: "timeout must be at least one second".to_string(),
            });
        }
        Ok(config)
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }
}

impl AppConfig {
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            scan: ScanSettings::from_lookup(&lookup)?,
            completion: CompletionSettings::from_lookup(&lookup)?,
            pipeline: PipelineConfig::from_lookup(&lookup)?,
        })
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads settings from the given env file only, ignoring the process
    /// environment.
    pub fn from_env_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let vars = dotenvy::from_path_iter(path.as_ref())?.collect::<Result<HashMap<String, String>, _>>()?;
        Self::from_lookup(|key| vars.get(key).cloned())
    }
}
