use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::core::config::{AgentConfig, StructuredTask, TasksConfig};
use crate::core::curiosity::CuriosityEngine;
use crate::core::judge::AlertDecider;
use crate::core::knowledge::Knowledge;
use crate::core::llm::{OpenAiReasoner, ReasoningBackend};
use crate::core::queue::{QueueItem, TaskType, WorkQueue, work_queue};
use crate::core::scheduler::{Fire, POLL_INTERVAL, Scheduler, SystemClock};
use crate::core::store::QuestionStore;
use crate::core::terminal;
use crate::core::warehouse::{QueryBackend, WarehouseClient};
use crate::core::worker::spawn_worker;
use crate::interfaces::whatsapp::WhatsAppAlerts;
use crate::logging;

fn enqueue_structured(queue: &WorkQueue, config: &AgentConfig, task: &StructuredTask) {
    terminal::print_structured_fire(
        &task.name,
        &config.warehouse.structured_prefix,
        &task.question,
    );
    let accepted = queue.push(QueueItem {
        question: task.question.clone(),
        task_name: task.name.clone(),
        task_type: TaskType::Structured,
        alert_mode: task.alert_mode,
        threshold: task.anomaly_threshold.clone(),
    });
    if !accepted {
        warn!(task = %task.name, "execution queue is closed, dropping fire");
    }
}

/// Boot the agent and run it until interrupted: load configuration and
/// knowledge (fatal on error), start the worker, fire everything once,
/// then poll cadence timers until ctrl-c, drain, and report.
pub async fn run_main() -> Result<()> {
    logging::init();
    terminal::print_banner();

    let config = AgentConfig::from_env()?;
    let knowledge = Arc::new(
        Knowledge::load(&config.schema_path(), &config.training_data_path())
            .context("knowledge sources missing or malformed")?,
    );
    let tasks = TasksConfig::load(&config.tasks_path())?;

    let store = QuestionStore::open(&config.questions_db_path())
        .context("failed to open question store")?;
    let initial_count = store.count().await?;

    let llm: Arc<dyn ReasoningBackend> = Arc::new(OpenAiReasoner::new(
        config.reasoning_api_key.clone(),
        config.reasoning_model.clone(),
    ));
    let backend: Arc<dyn QueryBackend> =
        Arc::new(WarehouseClient::new(config.warehouse.clone()));
    let alerts = WhatsAppAlerts::from_config(&config.twilio);
    let alerts_enabled = alerts.is_enabled();

    let (queue, rx) = work_queue();
    let worker = spawn_worker(rx, backend, AlertDecider::new(llm.clone()), alerts);

    let curiosity = CuriosityEngine::new(
        llm,
        store.clone(),
        knowledge,
        config.warehouse.exploratory_prefix.clone(),
    );
    let mut scheduler = Scheduler::new(SystemClock, &tasks);

    terminal::print_startup_summary(initial_count, &tasks, alerts_enabled);

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(true);
        }
    });

    // The startup pass and every later cadence fire go through the same
    // timers: fresh timers are due immediately.
    loop {
        for fire in scheduler.due_fires() {
            match fire {
                Fire::Structured(task) => enqueue_structured(&queue, &config, &task),
                Fire::Curiosity(settings) => {
                    // Runs inline on the poll loop; a slow generation call
                    // delays the next schedule check by its duration.
                    if let Err(e) = curiosity.run_cycle(&settings, &queue).await {
                        warn!("exploratory cycle failed: {e:#}");
                    }
                }
            }
        }

        tokio::select! {
            _ = shutdown_rx.changed() => break,
            _ = tokio::time::sleep(POLL_INTERVAL) => {}
        }
    }

    // Graceful drain: no new fires, but everything already queued is
    // processed before we report and exit.
    terminal::print_drain_notice(queue.depth());
    queue.join().await;
    drop(queue);
    if let Err(e) = worker.await {
        warn!("execution worker ended abnormally: {e}");
    }

    let final_count = store.count().await?;
    info!("shutdown complete");
    terminal::print_shutdown_report(final_count.saturating_sub(initial_count), final_count);
    Ok(())
}
