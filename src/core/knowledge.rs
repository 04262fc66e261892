use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Training pairs loaded beyond this are dropped; only the head is useful
/// as prompt context anyway.
pub const MAX_TRAINING_PAIRS: usize = 20;

/// Warehouse schema document produced by the external extraction step.
#[derive(Debug, Clone, Deserialize)]
pub struct WarehouseSchema {
    #[serde(default)]
    pub project_id: String,
    pub dataset_id: String,
    pub tables: Vec<TableSchema>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TableSchema {
    pub table_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub num_rows: u64,
    pub columns: Vec<ColumnSchema>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: String,
    #[serde(default)]
    pub mode: String,
    #[serde(default)]
    pub description: String,
}

/// A question/SQL pair used as a style guide for generation.
#[derive(Debug, Clone, Deserialize)]
pub struct ExamplePair {
    pub question: String,
    pub sql: String,
}

/// Read-only context for the question generator: the schema plus the first
/// [`MAX_TRAINING_PAIRS`] training examples.
#[derive(Debug, Clone)]
pub struct Knowledge {
    pub schema: WarehouseSchema,
    pub examples: Vec<ExamplePair>,
}

impl Knowledge {
    pub fn load(schema_path: &Path, training_path: &Path) -> Result<Self> {
        let schema_raw = std::fs::read_to_string(schema_path).with_context(|| {
            format!(
                "{} not found, run the schema extraction step first",
                schema_path.display()
            )
        })?;
        let training_raw = std::fs::read_to_string(training_path).with_context(|| {
            format!("training data {} not found", training_path.display())
        })?;
        Self::parse(&schema_raw, &training_raw)
    }

    pub fn parse(schema_raw: &str, training_raw: &str) -> Result<Self> {
        let schema: WarehouseSchema =
            serde_json::from_str(schema_raw).context("malformed warehouse schema document")?;
        let mut examples: Vec<ExamplePair> =
            serde_json::from_str(training_raw).context("malformed training data document")?;
        examples.truncate(MAX_TRAINING_PAIRS);
        Ok(Self { schema, examples })
    }
}
