use anyhow::{Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::core::config::WarehouseSettings;
use crate::core::queue::TaskType;

/// One answered question, handed straight to the decision engine.
#[derive(Debug, Clone)]
pub struct QueryResult {
    pub question: String,
    pub task_name: String,
    pub task_type: TaskType,
    pub result_text: String,
    pub timestamp: chrono::DateTime<chrono::Local>,
}

/// The text-to-SQL Q&A service. Errors mean "no result" to the worker:
/// logged, dropped, never retried.
#[async_trait]
pub trait QueryBackend: Send + Sync {
    async fn ask(
        &self,
        question: &str,
        task_name: &str,
        task_type: TaskType,
    ) -> Result<QueryResult>;
}

#[derive(Serialize)]
struct ChatSseRequest<'a> {
    message: &'a str,
    user_email: &'a str,
    agent_id: &'a str,
    acceptable_responses: [&'a str; 2],
}

#[derive(Deserialize)]
struct StreamFragment {
    text: Option<String>,
}

pub struct WarehouseClient {
    settings: WarehouseSettings,
    client: Client,
}

impl WarehouseClient {
    pub fn new(settings: WarehouseSettings) -> Self {
        Self {
            settings,
            client: Client::new(),
        }
    }

    fn prefix_for(&self, task_type: TaskType) -> &str {
        match task_type {
            TaskType::Structured => &self.settings.structured_prefix,
            TaskType::Exploratory => &self.settings.exploratory_prefix,
        }
    }
}

/// Concatenate the `text` fields of `data:` fragments in arrival order.
/// A fragment that fails to parse is skipped, not fatal; a read error
/// aborts the whole call (malformed stream = no result).
async fn read_sse_text<R: AsyncBufRead + Unpin>(mut reader: R) -> Result<String> {
    let mut line = String::new();
    let mut result_text = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => break,
            Ok(_) => {
                let Some(data) = line.trim().strip_prefix("data:") else {
                    continue;
                };
                match serde_json::from_str::<StreamFragment>(data.trim()) {
                    Ok(fragment) => {
                        if let Some(text) = fragment.text {
                            result_text.push_str(&text);
                        }
                    }
                    Err(_) => continue,
                }
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(result_text)
}

#[async_trait]
impl QueryBackend for WarehouseClient {
    async fn ask(
        &self,
        question: &str,
        task_name: &str,
        task_type: TaskType,
    ) -> Result<QueryResult> {
        let prefixed = format!("{}: {}", self.prefix_for(task_type), question);
        let payload = ChatSseRequest {
            message: &prefixed,
            user_email: &self.settings.user_email,
            agent_id: &self.settings.agent_id,
            acceptable_responses: ["text", "dataframe"],
        };

        let res = self
            .client
            .post(&self.settings.api_url)
            .header("VANNA-API-KEY", &self.settings.api_key)
            .json(&payload)
            .send()
            .await?;
        if !res.status().is_success() {
            return Err(anyhow!("warehouse API error: {}", res.status()));
        }

        use tokio_stream::StreamExt;
        let stream = res.bytes_stream();
        let reader =
            tokio_util::io::StreamReader::new(stream.map(|r| r.map_err(std::io::Error::other)));
        let result_text = read_sse_text(tokio::io::BufReader::new(reader)).await?;

        Ok(QueryResult {
            question: question.to_string(),
            task_name: task_name.to_string(),
            task_type,
            result_text,
            timestamp: chrono::Local::now(),
        })
    }
}
