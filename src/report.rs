// Plain-text threat breakdown of a scan verdict.

use std::fmt::Write as _;

use crate::constants::{PROMPT_RECOMMENDATIONS, THREAT_LABELS};
use crate::scan::{Category, ScanStage, ScanVerdict};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreatLine {
    pub stage: Option<ScanStage>,
    pub label: String,
    pub recommendation: Option<&'static str>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreatReport {
    pub category: String,
    pub action: String,
    pub report_id: Option<String>,
    pub lines: Vec<ThreatLine>,
}

/// `url_cats` -> "Url Cats" for flags without a known label.
fn title_case(flag: &str) -> String {
    flag.split('_')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn threat_label(flag: &str) -> String {
    THREAT_LABELS
        .get(flag)
        .map(|label| label.to_string())
        .unwrap_or_else(|| title_case(flag))
}

impl ThreatReport {
    pub fn from_verdict(verdict: &ScanVerdict) -> Self {
        let mut lines: Vec<ThreatLine> = verdict
            .detections
            .iter()
            .map(|d| ThreatLine {
                stage: Some(d.stage),
                label: threat_label(&d.threat),
                recommendation: match d.stage {
                    ScanStage::Prompt => PROMPT_RECOMMENDATIONS.get(d.threat.as_str()).copied(),
                    ScanStage::Response => None,
                },
            })
            .collect();

        if lines.is_empty() && verdict.category == Category::Malicious {
            lines.push(ThreatLine {
                stage: None,
                label: "General security violation".to_string(),
                recommendation: None,
            });
        }

        Self {
            category: verdict.category.to_string(),
            action: verdict.action.to_string(),
            report_id: verdict.report_id.clone(),
            lines,
        }
    }

    pub fn is_clean(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Classification: {}", self.category);
        let _ = writeln!(out, "Recommended action: {}", self.action);
        if let Some(report_id) = &self.report_id {
            let _ = writeln!(out, "Report ID: {}", report_id);
        }
        if self.lines.is_empty() {
            let _ = writeln!(out, "No specific threats detected");
        }
        for line in &self.lines {
            match line.stage {
                Some(stage) => {
                    let _ = writeln!(out, "- {} threat: {}", stage, line.label);
                }
                None => {
                    let _ = writeln!(out, "- {}", line.label);
                }
            }
            if let Some(rec) = line.recommendation {
                let _ = writeln!(out, "  Recommendation: {}", rec);
            }
        }
        out
    }
}
