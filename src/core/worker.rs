use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::core::judge::AlertDecider;
use crate::core::queue::{QueueItem, WorkReceiver};
use crate::core::terminal;
use crate::core::warehouse::QueryBackend;
use crate::interfaces::whatsapp::WhatsAppAlerts;

/// Spawn the single execution worker. It drains the queue strictly in
/// order, one backend call in flight at a time, and exits once every
/// producer handle is dropped and the queue is empty.
pub fn spawn_worker(
    mut rx: WorkReceiver,
    backend: Arc<dyn QueryBackend>,
    decider: AlertDecider,
    alerts: WhatsAppAlerts,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("execution worker started");
        while let Some(item) = rx.next().await {
            process_item(backend.as_ref(), &decider, &alerts, &item).await;
            rx.task_done();
        }
        info!("execution worker drained, stopping");
    })
}

/// One item end to end: query, decide, dispatch. A failed query is
/// dropped (not retried, not requeued) so the queue never stalls.
async fn process_item(
    backend: &dyn QueryBackend,
    decider: &AlertDecider,
    alerts: &WhatsAppAlerts,
    item: &QueueItem,
) {
    let result = match backend
        .ask(&item.question, &item.task_name, item.task_type)
        .await
    {
        Ok(result) => result,
        Err(e) => {
            warn!(
                task = %item.task_name,
                "warehouse query failed, dropping item: {e:#}"
            );
            return;
        }
    };

    terminal::print_result_block(&result);

    let (should_alert, reason) = decider
        .decide(&result.result_text, item.alert_mode, &item.threshold)
        .await;
    if should_alert {
        terminal::print_alert_block(item, &reason);
        alerts
            .dispatch(&item.task_name, item.task_type, &reason, &item.question)
            .await;
    }
}
