use anyhow::{Result, bail};
use serde::Deserialize;
use std::sync::Arc;
use tracing::warn;

use crate::core::config::{AlertMode, AnomalyThreshold};
use crate::core::llm::ReasoningBackend;

const JUDGE_SYSTEM_PROMPT: &str =
    "You are an anomaly detection analyst. Analyze data and identify issues.";
const JUDGE_MAX_TOKENS: u32 = 300;
// Low temperature: the judgment should be as consistent as an LLM call gets.
const JUDGE_TEMPERATURE: f32 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    fn label(&self) -> &'static str {
        match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
        }
    }
}

fn default_severity() -> Severity {
    Severity::Low
}

/// Structured judgment returned by the reasoning backend. Every field is
/// defaulted: a sparse verdict must still deserialize.
#[derive(Debug, Clone, Deserialize)]
pub struct AnomalyVerdict {
    #[serde(default)]
    pub anomaly_detected: bool,
    #[serde(default)]
    pub reason: String,
    #[serde(default = "default_severity")]
    pub severity: Severity,
    #[serde(default)]
    pub alert_message: String,
}

/// Decides, per query result, whether an alert fires and with what reason.
pub struct AlertDecider {
    llm: Arc<dyn ReasoningBackend>,
}

impl AlertDecider {
    pub fn new(llm: Arc<dyn ReasoningBackend>) -> Self {
        Self { llm }
    }

    /// Automatic mode always alerts. Anomaly mode delegates to the judge
    /// and fails closed: any error or unparseable verdict means no alert.
    pub async fn decide(
        &self,
        result_text: &str,
        alert_mode: AlertMode,
        threshold: &AnomalyThreshold,
    ) -> (bool, String) {
        match alert_mode {
            AlertMode::Automatic => (true, "Automatic alert (always notifies)".to_string()),
            AlertMode::Anomaly => match self.judge(result_text, threshold).await {
                Ok(verdict) if verdict.anomaly_detected => (true, alert_reason(&verdict)),
                Ok(_) => (false, String::new()),
                Err(e) => {
                    warn!("anomaly judgment failed, not alerting: {e:#}");
                    (false, String::new())
                }
            },
        }
    }

    async fn judge(
        &self,
        result_text: &str,
        threshold: &AnomalyThreshold,
    ) -> Result<AnomalyVerdict> {
        let prompt = judge_prompt(result_text, threshold);
        let raw = self
            .llm
            .complete(JUDGE_SYSTEM_PROMPT, &prompt, JUDGE_MAX_TOKENS, JUDGE_TEMPERATURE)
            .await?;
        parse_verdict(&raw)
    }
}

fn judge_prompt(result_text: &str, threshold: &AnomalyThreshold) -> String {
    format!(
        r#"Analyze this data query result for anomalies.

Result: {result_text}

Anomaly Detection Rules:
- Threshold Type: {kind}
- Threshold Value: {percent}%

Look for:
- Significant percentage changes (above threshold)
- Unusual spikes or drops
- Concerning trends
- Data quality issues

Respond in JSON format:
{{
    "anomaly_detected": true/false,
    "reason": "brief explanation of what's anomalous",
    "severity": "low/medium/high",
    "alert_message": "clear, actionable message for the user"
}}

If no anomaly detected, set anomaly_detected to false and leave other fields empty."#,
        kind = threshold.kind,
        percent = threshold.value * 100.0,
    )
}

/// Parse a verdict out of model output that may be wrapped in markdown
/// fences or surrounded by commentary.
fn parse_verdict(raw: &str) -> Result<AnomalyVerdict> {
    let cleaned = raw
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    if let Ok(verdict) = serde_json::from_str::<AnomalyVerdict>(cleaned) {
        return Ok(verdict);
    }
    if let (Some(start), Some(end)) = (cleaned.find('{'), cleaned.rfind('}'))
        && end > start
        && let Ok(verdict) = serde_json::from_str::<AnomalyVerdict>(&cleaned[start..=end])
    {
        return Ok(verdict);
    }
    bail!("unparseable anomaly verdict: {raw}");
}

fn alert_reason(verdict: &AnomalyVerdict) -> String {
    let message = if !verdict.alert_message.is_empty() {
        verdict.alert_message.as_str()
    } else if !verdict.reason.is_empty() {
        verdict.reason.as_str()
    } else {
        "Unknown anomaly"
    };
    format!(
        "🚨 ANOMALY DETECTED ({}): {}",
        verdict.severity.label(),
        message
    )
}
