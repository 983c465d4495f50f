// Defaults for the configuration layer and the threat label table.

use std::collections::HashMap;
use std::time::Duration;

pub const DEFAULT_SCAN_ENDPOINT: &str = "https://service.api.aisecurity.paloaltonetworks.com";
pub const SCAN_SYNC_PATH: &str = "/v1/scan/sync/request";
pub const SCAN_TOKEN_HEADER: &str = "x-pan-token";

pub const DEFAULT_AZURE_API_VERSION: &str = "2024-02-15-preview";
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful, knowledgeable, and professional assistant.";

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_HISTORY: usize = 20;
pub const DEFAULT_SCAN_RETRIES: u32 = 3;
pub const DEFAULT_SDK_BACKOFF: Duration = Duration::from_secs(1);
pub const DEFAULT_APP_NAME: &str = "guardchat";

lazy_static::lazy_static! {
    pub static ref CLIENT_USER_AGENT: String = format!("guardchat-scan-sdk/{}", env!("CARGO_PKG_VERSION"));

    // Display names for the vendor's detection flags.
    pub static ref THREAT_LABELS: HashMap<&'static str, &'static str> = {
        let mut m = HashMap::new();
        m.insert("prompt_injection", "Prompt Injection Attack");
        m.insert("injection", "Prompt Injection Attack");
        m.insert("jailbreak", "Jailbreak Attempt");
        m.insert("agent", "AI Agent Manipulation");
        m.insert("malicious_code", "Malicious Code Generation");
        m.insert("sensitive_data", "Sensitive Data Exposure");
        m.insert("toxicity", "Toxic Content");
        m.insert("toxic_content", "Toxic Content");
        m.insert("bias", "Bias Detection");
        m.insert("harmful_content", "Harmful Content");
        m.insert("url_cats", "Malicious URL Detection");
        m.insert("malware", "Malware Detection");
        m.insert("db_security", "Database Security Threat");
        m.insert("dlp", "Data Loss Prevention");
        m.insert("pii", "Personal Identifiable Information");
        m.insert("financial_data", "Financial Data Exposure");
        m.insert("intellectual_property", "Intellectual Property Risk");
        m.insert("code_injection", "Code Injection");
        m.insert("resource_overload", "Resource Overload/DoS");
        m.insert("hallucination", "AI Hallucination");
        m
    };

    // Guidance shown for threats found in a user prompt.
    pub static ref PROMPT_RECOMMENDATIONS: HashMap<&'static str, &'static str> = {
        let mut m = HashMap::new();
        m.insert("injection", "Rephrase without command-like language");
        m.insert("prompt_injection", "Rephrase without command-like language");
        m.insert("agent", "Remove role-playing or identity claims");
        m.insert("toxicity", "Use respectful, appropriate language");
        m.insert("toxic_content", "Use respectful, appropriate language");
        m.insert("url_cats", "Remove suspicious links");
        m.insert("dlp", "Remove personal/confidential information");
        m
    };
}
