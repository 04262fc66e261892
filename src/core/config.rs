use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::warn;

pub const DEFAULT_REASONING_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_WAREHOUSE_API_URL: &str = "https://app.vanna.ai/api/v2/chat_sse";
pub const DEFAULT_QUESTION_PREFIX: &str = "warehouse";
const DEFAULT_CURIOSITY_CADENCE_HOURS: f64 = 1.0;
const DEFAULT_TASK_CADENCE_HOURS: f64 = 24.0;

/// How a task's results translate into alerts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertMode {
    /// Every result notifies, no analysis.
    Automatic,
    /// An LLM judgment decides whether the result is noteworthy.
    Anomaly,
}

/// Advisory threshold handed to the anomaly judge as prompt context.
/// `value` is a fractional proportion (0.05 = 5%).
#[derive(Debug, Clone, Deserialize)]
pub struct AnomalyThreshold {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: f64,
}

impl Default for AnomalyThreshold {
    fn default() -> Self {
        Self {
            kind: "general".to_string(),
            value: 0.05,
        }
    }
}

/// A fixed, named, periodically repeated question from tasks.yaml.
#[derive(Debug, Clone, Deserialize)]
pub struct StructuredTask {
    pub name: String,
    pub question: String,
    #[serde(default = "default_task_cadence")]
    pub cadence_hours: f64,
    #[serde(default = "default_alert_mode")]
    pub alert_mode: AlertMode,
    #[serde(default)]
    pub anomaly_threshold: AnomalyThreshold,
}

/// Settings for the exploratory question stream.
#[derive(Debug, Clone, Deserialize)]
pub struct CuriositySettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_curiosity_cadence")]
    pub cadence_hours: f64,
    #[serde(default = "default_alert_mode")]
    pub alert_mode: AlertMode,
    #[serde(default)]
    pub anomaly_threshold: AnomalyThreshold,
}

impl Default for CuriositySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            cadence_hours: DEFAULT_CURIOSITY_CADENCE_HOURS,
            alert_mode: AlertMode::Anomaly,
            anomaly_threshold: AnomalyThreshold::default(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_alert_mode() -> AlertMode {
    AlertMode::Anomaly
}

fn default_task_cadence() -> f64 {
    DEFAULT_TASK_CADENCE_HOURS
}

fn default_curiosity_cadence() -> f64 {
    DEFAULT_CURIOSITY_CADENCE_HOURS
}

/// The monitoring plan: structured tasks plus the curiosity stream.
/// Immutable for the process lifetime.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TasksConfig {
    #[serde(default)]
    pub structured_tasks: Vec<StructuredTask>,
    #[serde(default)]
    pub curiosity: CuriositySettings,
}

impl TasksConfig {
    /// Load tasks.yaml. A missing file is not an error: the agent runs in
    /// curiosity-only mode with defaults. An invalid cadence is fatal.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!(
                "{} not found, running in curiosity-only mode",
                path.display()
            );
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("invalid task configuration {}", path.display()))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let config: TasksConfig = serde_yaml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        for task in &self.structured_tasks {
            // `!(x > 0.0)` also rejects NaN
            if !(task.cadence_hours > 0.0) {
                bail!(
                    "task '{}' has cadence_hours {} (must be > 0)",
                    task.name,
                    task.cadence_hours
                );
            }
        }
        if self.curiosity.enabled && !(self.curiosity.cadence_hours > 0.0) {
            bail!(
                "curiosity cadence_hours {} (must be > 0)",
                self.curiosity.cadence_hours
            );
        }
        Ok(())
    }
}

/// Identity and endpoint of the text-to-SQL Q&A service.
#[derive(Debug, Clone)]
pub struct WarehouseSettings {
    pub api_key: String,
    pub api_url: String,
    pub user_email: String,
    pub agent_id: String,
    pub structured_prefix: String,
    pub exploratory_prefix: String,
}

/// Twilio WhatsApp alert channel credentials.
#[derive(Debug, Clone)]
pub struct TwilioSettings {
    pub enabled: bool,
    pub account_sid: String,
    pub auth_token: String,
    pub from_number: String,
    pub to_number: String,
}

/// Everything the agent needs, built once from the environment at startup
/// and passed by reference. No ambient globals.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub data_dir: PathBuf,
    pub reasoning_api_key: String,
    pub reasoning_model: String,
    pub warehouse: WarehouseSettings,
    pub twilio: TwilioSettings,
}

fn require_env(name: &str) -> Result<String> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => bail!("required environment variable {} is not set", name),
    }
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

impl AgentConfig {
    pub fn from_env() -> Result<Self> {
        let data_dir = PathBuf::from(env_or("WARDEN_DATA_DIR", "."));

        let warehouse = WarehouseSettings {
            api_key: require_env("VANNA_API_KEY")?,
            api_url: env_or("VANNA_API_URL", DEFAULT_WAREHOUSE_API_URL),
            user_email: require_env("VANNA_USER_EMAIL")?,
            agent_id: require_env("VANNA_AGENT_ID")?,
            structured_prefix: env_or("VANNA_STRUCTURED_PREFIX", DEFAULT_QUESTION_PREFIX),
            exploratory_prefix: env_or("VANNA_EXPLORATORY_PREFIX", DEFAULT_QUESTION_PREFIX),
        };

        let mut twilio = TwilioSettings {
            enabled: env_or("TWILIO_ENABLED", "false").to_lowercase() == "true",
            account_sid: env_or("TWILIO_ACCOUNT_SID", ""),
            auth_token: env_or("TWILIO_AUTH_TOKEN", ""),
            from_number: env_or("TWILIO_WHATSAPP_FROM", "whatsapp:+14155238886"),
            to_number: env_or("TWILIO_WHATSAPP_TO", ""),
        };
        if twilio.enabled
            && (twilio.account_sid.is_empty()
                || twilio.auth_token.is_empty()
                || twilio.to_number.is_empty())
        {
            warn!("TWILIO_ENABLED is set but credentials are incomplete, alerts disabled");
            twilio.enabled = false;
        }

        Ok(Self {
            data_dir,
            reasoning_api_key: require_env("OPENAI_API_KEY")?,
            reasoning_model: env_or("WARDEN_MODEL", DEFAULT_REASONING_MODEL),
            warehouse,
            twilio,
        })
    }

    pub fn questions_db_path(&self) -> PathBuf {
        self.data_dir.join("questions.db")
    }

    pub fn schema_path(&self) -> PathBuf {
        self.data_dir.join("schema.json")
    }

    pub fn training_data_path(&self) -> PathBuf {
        self.data_dir.join("training_data.json")
    }

    pub fn tasks_path(&self) -> PathBuf {
        self.data_dir.join("tasks.yaml")
    }
}
