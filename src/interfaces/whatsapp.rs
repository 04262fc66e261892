use reqwest::Client;
use tracing::{info, warn};

use crate::core::config::TwilioSettings;
use crate::core::queue::TaskType;

/// Outbound alert channel over the Twilio WhatsApp Messages API.
/// Send failures are logged and swallowed; the monitoring loop never
/// stalls or crashes because an alert did not go out.
pub struct WhatsAppAlerts {
    enabled: bool,
    account_sid: String,
    auth_token: String,
    from_number: String,
    to_number: String,
    client: Client,
}

impl WhatsAppAlerts {
    pub fn from_config(settings: &TwilioSettings) -> Self {
        Self {
            enabled: settings.enabled,
            account_sid: settings.account_sid.trim().to_string(),
            auth_token: settings.auth_token.trim().to_string(),
            from_number: settings.from_number.trim().to_string(),
            to_number: settings.to_number.trim().to_string(),
            client: Client::new(),
        }
    }

    /// A channel that never sends. Used when Twilio is unconfigured.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            account_sid: String::new(),
            auth_token: String::new(),
            from_number: String::new(),
            to_number: String::new(),
            client: Client::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Send one alert. Returns true only when Twilio accepted the message.
    pub async fn dispatch(
        &self,
        task_name: &str,
        task_type: TaskType,
        reason: &str,
        question: &str,
    ) -> bool {
        if !self.enabled {
            return false;
        }

        let url = format!(
            "https://api.twilio.com/2010-04-01/Accounts/{}/Messages.json",
            self.account_sid
        );
        let from = ensure_whatsapp_prefix(&self.from_number);
        let to = ensure_whatsapp_prefix(&self.to_number);
        let body = format_alert_body(task_name, task_type, reason, question);

        match self
            .client
            .post(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[
                ("From", from.as_str()),
                ("To", to.as_str()),
                ("Body", body.as_str()),
            ])
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => {
                info!(task = task_name, "WhatsApp alert sent");
                true
            }
            Ok(resp) => {
                let status = resp.status();
                let detail = resp.text().await.unwrap_or_default();
                warn!("WhatsApp alert failed ({status}): {detail}");
                false
            }
            Err(e) => {
                warn!("WhatsApp alert failed: {e}");
                false
            }
        }
    }
}

// Twilio expects the WhatsApp prefix on both numbers
fn ensure_whatsapp_prefix(number: &str) -> String {
    if number.starts_with("whatsapp:") {
        number.to_string()
    } else {
        format!("whatsapp:{number}")
    }
}

fn format_alert_body(task_name: &str, task_type: TaskType, reason: &str, question: &str) -> String {
    format!(
        "🔔 MONITORING ALERT\n\n\
         Task: {}\n\
         Type: {}\n\n\
         {}\n\n\
         Question: {}\n\n\
         Time: {}",
        task_name.to_uppercase(),
        task_type.as_str(),
        reason,
        question,
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    )
}
