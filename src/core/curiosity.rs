use anyhow::Result;
use std::sync::Arc;
use tracing::{info, warn};

use crate::core::config::CuriositySettings;
use crate::core::knowledge::Knowledge;
use crate::core::llm::ReasoningBackend;
use crate::core::queue::{QueueItem, TaskType, WorkQueue};
use crate::core::store::QuestionStore;
use crate::core::terminal;

/// Skip the whole cycle when more than this many items are already queued.
/// Soft production-side throttle, not a queue capacity limit.
pub const BACKLOG_LIMIT: usize = 10;
/// How many prior questions steer the generator away from repeats.
pub const RECENT_CONTEXT_LIMIT: usize = 10;
const PROMPT_EXAMPLE_LIMIT: usize = 5;
const GENERATION_MAX_TOKENS: u32 = 100;
// High temperature on purpose: identical prompts should keep yielding
// different questions.
const GENERATION_TEMPERATURE: f32 = 0.8;
const GENERATION_SYSTEM_PROMPT: &str =
    "You are a data analyst generating insightful database questions.";

/// The exploratory path: one novel question per cycle, deduplicated
/// against the store, enqueued with the curiosity alert settings.
pub struct CuriosityEngine {
    llm: Arc<dyn ReasoningBackend>,
    store: QuestionStore,
    knowledge: Arc<Knowledge>,
    display_prefix: String,
}

impl CuriosityEngine {
    pub fn new(
        llm: Arc<dyn ReasoningBackend>,
        store: QuestionStore,
        knowledge: Arc<Knowledge>,
        display_prefix: String,
    ) -> Self {
        Self {
            llm,
            store,
            knowledge,
            display_prefix,
        }
    }

    /// Run one generation cycle. Returns the enqueued question text, or
    /// None when the cycle ended without enqueueing (backlog, generation
    /// failure, duplicate). Only a successful cycle touches the store.
    pub async fn run_cycle(
        &self,
        settings: &CuriositySettings,
        queue: &WorkQueue,
    ) -> Result<Option<String>> {
        let depth = queue.depth();
        if depth > BACKLOG_LIMIT {
            info!(depth, "queue backlog too deep, skipping exploratory cycle");
            return Ok(None);
        }

        let recent = self.store.recent(RECENT_CONTEXT_LIMIT).await?;
        let Some(question) = self.generate(&recent).await else {
            return Ok(None);
        };

        if self.store.exists(&question).await? {
            info!("skipping duplicate exploratory question: {question}");
            return Ok(None);
        }
        if !self.store.save(&question).await? {
            // Lost the insert race; treat exactly like a duplicate
            info!("exploratory question already recorded: {question}");
            return Ok(None);
        }

        terminal::print_exploratory_fire(&self.display_prefix, &question);
        queue.push(QueueItem {
            question: question.clone(),
            task_name: "exploratory".to_string(),
            task_type: TaskType::Exploratory,
            alert_mode: settings.alert_mode,
            threshold: settings.anomaly_threshold.clone(),
        });
        Ok(Some(question))
    }

    async fn generate(&self, recent: &[String]) -> Option<String> {
        let prompt = build_generation_prompt(&self.knowledge, recent);
        match self
            .llm
            .complete(
                GENERATION_SYSTEM_PROMPT,
                &prompt,
                GENERATION_MAX_TOKENS,
                GENERATION_TEMPERATURE,
            )
            .await
        {
            Ok(raw) => {
                let question = raw.trim().trim_matches(['"', '\'']).trim().to_string();
                if question.is_empty() {
                    warn!("question generation returned empty output");
                    None
                } else {
                    Some(question)
                }
            }
            Err(e) => {
                warn!("question generation failed: {e:#}");
                None
            }
        }
    }
}

fn build_generation_prompt(knowledge: &Knowledge, recent: &[String]) -> String {
    let mut schema_summary = format!("Dataset: {}\n\nTables:\n", knowledge.schema.dataset_id);
    for table in &knowledge.schema.tables {
        let columns: Vec<String> = table
            .columns
            .iter()
            .map(|col| format!("{} ({})", col.name, col.column_type))
            .collect();
        schema_summary.push_str(&format!("- {}: {}\n", table.table_name, columns.join(", ")));
    }

    let mut examples_text = String::from("Example questions from training data:\n");
    for (i, pair) in knowledge.examples.iter().take(PROMPT_EXAMPLE_LIMIT).enumerate() {
        examples_text.push_str(&format!("{}. {}\n", i + 1, pair.question));
    }

    let mut recent_text = String::new();
    if !recent.is_empty() {
        recent_text.push_str("\n\nRecently generated questions (DON'T repeat these):\n");
        for (i, question) in recent.iter().enumerate() {
            recent_text.push_str(&format!("{}. {}\n", i + 1, question));
        }
    }

    format!(
        r#"You are a curious data analyst exploring an e-commerce database. Generate ONE specific, measurable question that would be insightful to ask.

{schema_summary}

{examples_text}
{recent_text}

Guidelines:
- Generate questions similar in style to the training examples
- Focus on business metrics: sales, users, products, orders, inventory
- Include time comparisons (today vs yesterday, this week vs last week, etc.)
- Ask about trends, top performers, anomalies
- Be specific and measurable
- DON'T repeat recent questions - create variations or explore new angles

Generate ONE question only, no explanation needed."#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::knowledge::Knowledge;
    use crate::core::queue::work_queue;
    use crate::core::store::test_store;
    use anyhow::{Result, anyhow};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedBackend {
        responses: Mutex<Vec<Result<String>>>,
        calls: AtomicUsize,
        last_prompt: Mutex<String>,
    }

    impl ScriptedBackend {
        fn new(responses: Vec<Result<String>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses),
                calls: AtomicUsize::new(0),
                last_prompt: Mutex::new(String::new()),
            })
        }
    }

    #[async_trait]
    impl ReasoningBackend for ScriptedBackend {
        async fn complete(
            &self,
            _system: &str,
            user: &str,
            _max_tokens: u32,
            _temperature: f32,
        ) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_prompt.lock().unwrap() = user.to_string();
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                return Err(anyhow!("no scripted response left"));
            }
            responses.remove(0)
        }
    }

    fn test_knowledge() -> Arc<Knowledge> {
        let schema = r#"{
            "dataset_id": "ecommerce",
            "tables": [
                {"table_name": "orders", "columns": [
                    {"name": "id", "type": "INTEGER"},
                    {"name": "total", "type": "FLOAT"}
                ]}
            ]
        }"#;
        let training = r#"[
            {"question": "How many orders were placed today?", "sql": "SELECT COUNT(*) FROM orders"}
        ]"#;
        Arc::new(Knowledge::parse(schema, training).unwrap())
    }

    fn engine(backend: Arc<ScriptedBackend>, store: QuestionStore) -> CuriosityEngine {
        CuriosityEngine::new(backend, store, test_knowledge(), "warehouse".to_string())
    }

    fn dummy_item(i: usize) -> QueueItem {
        QueueItem {
            question: format!("filler {i}"),
            task_name: "filler".to_string(),
            task_type: TaskType::Structured,
            alert_mode: crate::core::config::AlertMode::Anomaly,
            threshold: Default::default(),
        }
    }

    #[tokio::test]
    async fn successful_cycle_saves_and_enqueues() {
        let (store, _dir) = test_store();
        let backend = ScriptedBackend::new(vec![Ok("What was revenue today?".to_string())]);
        let eng = engine(backend.clone(), store.clone());
        let (queue, mut rx) = work_queue();

        let enqueued = eng
            .run_cycle(&CuriositySettings::default(), &queue)
            .await
            .unwrap();
        assert_eq!(enqueued.as_deref(), Some("What was revenue today?"));
        assert!(store.exists("What was revenue today?").await.unwrap());

        let item = rx.next().await.unwrap();
        assert_eq!(item.task_type, TaskType::Exploratory);
        assert_eq!(item.task_name, "exploratory");
        assert_eq!(item.question, "What was revenue today?");
    }

    #[tokio::test]
    async fn backlog_guard_skips_cycle_entirely() {
        let (store, _dir) = test_store();
        let backend = ScriptedBackend::new(vec![Ok("should never be asked".to_string())]);
        let eng = engine(backend.clone(), store.clone());
        let (queue, _rx) = work_queue();
        for i in 0..11 {
            queue.push(dummy_item(i));
        }

        let enqueued = eng
            .run_cycle(&CuriositySettings::default(), &queue)
            .await
            .unwrap();
        assert!(enqueued.is_none());
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0, "no generation call");
        assert_eq!(store.count().await.unwrap(), 0);
        assert_eq!(queue.depth(), 11);
    }

    #[tokio::test]
    async fn backlog_of_exactly_ten_still_runs() {
        let (store, _dir) = test_store();
        let backend = ScriptedBackend::new(vec![Ok("fresh question".to_string())]);
        let eng = engine(backend.clone(), store.clone());
        let (queue, _rx) = work_queue();
        for i in 0..10 {
            queue.push(dummy_item(i));
        }

        let enqueued = eng
            .run_cycle(&CuriositySettings::default(), &queue)
            .await
            .unwrap();
        assert!(enqueued.is_some());
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn duplicate_generation_is_discarded() {
        let (store, _dir) = test_store();
        let backend = ScriptedBackend::new(vec![
            Ok("How many orders today?".to_string()),
            Ok("How many orders today?".to_string()),
        ]);
        let eng = engine(backend, store.clone());
        let (queue, _rx) = work_queue();
        let settings = CuriositySettings::default();

        assert!(eng.run_cycle(&settings, &queue).await.unwrap().is_some());
        assert!(eng.run_cycle(&settings, &queue).await.unwrap().is_none());
        assert_eq!(store.count().await.unwrap(), 1);
        assert_eq!(queue.depth(), 1, "second cycle must not enqueue");
    }

    #[tokio::test]
    async fn store_grows_by_at_most_one_per_cycle() {
        let (store, _dir) = test_store();
        let backend = ScriptedBackend::new(vec![Ok("q1".to_string())]);
        let eng = engine(backend, store.clone());
        let (queue, _rx) = work_queue();

        let before = store.count().await.unwrap();
        eng.run_cycle(&CuriositySettings::default(), &queue)
            .await
            .unwrap();
        let after = store.count().await.unwrap();
        assert!(after - before <= 1);
    }

    #[tokio::test]
    async fn generation_failure_has_no_side_effects() {
        let (store, _dir) = test_store();
        let backend = ScriptedBackend::new(vec![Err(anyhow!("rate limited"))]);
        let eng = engine(backend, store.clone());
        let (queue, _rx) = work_queue();

        let enqueued = eng
            .run_cycle(&CuriositySettings::default(), &queue)
            .await
            .unwrap();
        assert!(enqueued.is_none());
        assert_eq!(store.count().await.unwrap(), 0);
        assert_eq!(queue.depth(), 0);
    }

    #[tokio::test]
    async fn empty_generation_is_discarded() {
        let (store, _dir) = test_store();
        let backend = ScriptedBackend::new(vec![Ok("  \"\"  ".to_string())]);
        let eng = engine(backend, store.clone());
        let (queue, _rx) = work_queue();

        let enqueued = eng
            .run_cycle(&CuriositySettings::default(), &queue)
            .await
            .unwrap();
        assert!(enqueued.is_none());
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn surrounding_quotes_are_stripped() {
        let (store, _dir) = test_store();
        let backend =
            ScriptedBackend::new(vec![Ok("\"What are the top 5 products this week?\"".to_string())]);
        let eng = engine(backend, store.clone());
        let (queue, _rx) = work_queue();

        let enqueued = eng
            .run_cycle(&CuriositySettings::default(), &queue)
            .await
            .unwrap();
        assert_eq!(
            enqueued.as_deref(),
            Some("What are the top 5 products this week?")
        );
    }

    #[tokio::test]
    async fn prompt_carries_schema_examples_and_recent_questions() {
        let (store, _dir) = test_store();
        store.save("What was yesterday's revenue?").await.unwrap();
        let backend = ScriptedBackend::new(vec![Ok("new question".to_string())]);
        let eng = engine(backend.clone(), store);
        let (queue, _rx) = work_queue();

        eng.run_cycle(&CuriositySettings::default(), &queue)
            .await
            .unwrap();
        let prompt = backend.last_prompt.lock().unwrap().clone();
        assert!(prompt.contains("Dataset: ecommerce"));
        assert!(prompt.contains("orders: id (INTEGER), total (FLOAT)"));
        assert!(prompt.contains("How many orders were placed today?"));
        assert!(prompt.contains("DON'T repeat these"));
        assert!(prompt.contains("What was yesterday's revenue?"));
    }
}
