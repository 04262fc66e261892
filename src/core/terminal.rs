use console::{Emoji, style};

use crate::core::config::{AlertMode, TasksConfig};
use crate::core::queue::QueueItem;
use crate::core::warehouse::QueryResult;

pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "");
pub static SUCCESS_ICON: Emoji<'_, '_> = Emoji("✅ ", "");
pub static ERROR_ICON: Emoji<'_, '_> = Emoji("❌ ", "");
pub static CHART: Emoji<'_, '_> = Emoji("📊 ", "");
pub static CLIPBOARD: Emoji<'_, '_> = Emoji("📋 ", "");
pub static THINKING: Emoji<'_, '_> = Emoji("🤔 ", "");
pub static BELL: Emoji<'_, '_> = Emoji("🔔 ", "");
pub static STOP_SIGN: Emoji<'_, '_> = Emoji("🛑 ", "");
pub static HOURGLASS: Emoji<'_, '_> = Emoji("⏳ ", "");

const RULE_WIDTH: usize = 60;

fn rule() -> String {
    "=".repeat(RULE_WIDTH)
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", ERROR_ICON, style(msg).red().bold());
}

pub fn print_banner() {
    println!("{} {}", ROCKET, style("Starting warden...").bold());
    println!("{}", rule());
}

fn alert_mode_label(mode: AlertMode) -> &'static str {
    match mode {
        AlertMode::Automatic => "automatic",
        AlertMode::Anomaly => "anomaly",
    }
}

/// Render a cadence the way an operator thinks about it.
pub fn cadence_display(hours: f64) -> String {
    if hours >= 168.0 {
        format!("{:.1} weeks", hours / 168.0)
    } else if hours >= 24.0 {
        format!("{:.1} days", hours / 24.0)
    } else {
        format!("{hours} hours")
    }
}

pub fn print_startup_summary(stored_questions: u64, tasks: &TasksConfig, alerts_enabled: bool) {
    println!("{} Questions in database: {}", CHART, stored_questions);
    println!(
        "{} Structured tasks loaded: {}",
        CLIPBOARD,
        tasks.structured_tasks.len()
    );
    println!(
        "{} Exploratory mode: {}",
        THINKING,
        if tasks.curiosity.enabled {
            "enabled"
        } else {
            "disabled"
        }
    );
    println!(
        "{} WhatsApp alerts: {}",
        BELL,
        if alerts_enabled { "enabled" } else { "disabled" }
    );

    if !tasks.structured_tasks.is_empty() {
        println!("\n{} Scheduled tasks:", CLIPBOARD);
        for task in &tasks.structured_tasks {
            println!(
                "   - {}: every {} (alert: {})",
                style(&task.name).bold(),
                cadence_display(task.cadence_hours),
                alert_mode_label(task.alert_mode)
            );
        }
    }
    if tasks.curiosity.enabled {
        println!(
            "\n{} Exploratory agent: every {} (alert: {})",
            THINKING,
            cadence_display(tasks.curiosity.cadence_hours),
            alert_mode_label(tasks.curiosity.alert_mode)
        );
    }
    println!("{}", rule());
    println!("Press Ctrl+C to stop\n");
}

pub fn print_structured_fire(task_name: &str, prefix: &str, question: &str) {
    println!(
        "{} [{} {}] {}: {}",
        CLIPBOARD,
        style(task_name.to_uppercase()).bold(),
        chrono::Local::now().format("%H:%M:%S"),
        prefix,
        question
    );
}

pub fn print_exploratory_fire(prefix: &str, question: &str) {
    println!(
        "{} [EXPLORATORY {}] {}: {}",
        THINKING,
        chrono::Local::now().format("%H:%M:%S"),
        prefix,
        question
    );
}

pub fn print_result_block(result: &QueryResult) {
    println!("\n{}", rule());
    println!(
        "{} RESULT [{}: {}]",
        SUCCESS_ICON,
        result.task_type.as_str().to_uppercase(),
        result.task_name
    );
    println!("Question: {}", result.question);
    println!("Result:\n{}", result.result_text);
    println!("{}\n", rule());
}

pub fn print_alert_block(item: &QueueItem, reason: &str) {
    let banner = "🔔".repeat(30);
    println!("\n{banner}");
    println!(
        "{} ALERT: {}",
        BELL,
        style(item.task_name.to_uppercase()).bold().red()
    );
    println!("Type: {}", item.task_type.as_str());
    println!("Reason: {reason}");
    println!("Question: {}", item.question);
    println!(
        "Timestamp: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    println!("{banner}\n");
}

pub fn print_drain_notice(remaining: usize) {
    println!("\n{}", rule());
    println!("{} Stopping warden...", STOP_SIGN);
    println!(
        "{} Waiting for {} remaining item(s) in the queue...",
        HOURGLASS, remaining
    );
}

pub fn print_shutdown_report(generated_this_session: u64, total: u64) {
    println!(
        "{} Exploratory questions generated this session: {}",
        CHART, generated_this_session
    );
    println!("{} Total questions in database: {}", CHART, total);
    println!("{}", rule());
}
