use anyhow::Result;
use rusqlite::{Connection, params};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Durable log of every exploratory question ever asked. The UNIQUE
/// constraint on the question text is the authoritative dedup gate.
/// Grows monotonically; nothing here ever prunes it.
#[derive(Clone)]
pub struct QuestionStore {
    db: Arc<Mutex<Connection>>,
}

impl QuestionStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(dir) = path.parent()
            && !dir.as_os_str().is_empty()
        {
            std::fs::create_dir_all(dir)?;
        }
        let db = Connection::open(path)?;
        db.execute(
            "CREATE TABLE IF NOT EXISTS generated_questions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                question TEXT UNIQUE NOT NULL,
                timestamp DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
        })
    }

    /// Exact-string membership test.
    pub async fn exists(&self, question: &str) -> Result<bool> {
        let db = self.db.lock().await;
        let count: i64 = db.query_row(
            "SELECT COUNT(*) FROM generated_questions WHERE question = ?1",
            params![question],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Insert if absent. Returns false when the question is already present
    /// (the unique constraint makes this atomic, so racing callers never
    /// both succeed). Other failures propagate.
    pub async fn save(&self, question: &str) -> Result<bool> {
        let db = self.db.lock().await;
        match db.execute(
            "INSERT INTO generated_questions (question) VALUES (?1)",
            params![question],
        ) {
            Ok(_) => Ok(true),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Most-recent-first question texts, used as "do not repeat" context
    /// for the generator. Ordered by insertion id, which is stable even
    /// when several rows share a timestamp second.
    pub async fn recent(&self, limit: usize) -> Result<Vec<String>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(
            "SELECT question FROM generated_questions ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| row.get::<_, String>(0))?;

        let mut questions = Vec::new();
        for row in rows {
            questions.push(row?);
        }
        Ok(questions)
    }

    pub async fn count(&self) -> Result<u64> {
        let db = self.db.lock().await;
        let count: i64 =
            db.query_row("SELECT COUNT(*) FROM generated_questions", [], |row| {
                row.get(0)
            })?;
        Ok(count as u64)
    }
}

/// Open a store backed by a throwaway directory. The TempDir guard must
/// outlive the store.
#[cfg(test)]
pub fn test_store() -> (QuestionStore, tempfile::TempDir) {
    let dir = tempfile::tempdir().expect("create temp dir");
    let store = QuestionStore::open(&dir.path().join("questions.db")).expect("open test store");
    (store, dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_then_exists() {
        let (store, _dir) = test_store();
        assert!(!store.exists("How many orders today?").await.unwrap());
        assert!(store.save("How many orders today?").await.unwrap());
        assert!(store.exists("How many orders today?").await.unwrap());
    }

    #[tokio::test]
    async fn second_save_is_rejected_without_duplicating() {
        let (store, _dir) = test_store();
        assert!(store.save("q").await.unwrap());
        assert!(!store.save("q").await.unwrap());
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn dedup_is_exact_match() {
        let (store, _dir) = test_store();
        store.save("How many orders today?").await.unwrap();
        // Different string, even if semantically close, is a new entry
        assert!(store.save("How many orders today ?").await.unwrap());
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn recent_is_most_recent_first() {
        let (store, _dir) = test_store();
        for i in 0..5 {
            store.save(&format!("question {i}")).await.unwrap();
        }
        let recent = store.recent(3).await.unwrap();
        assert_eq!(recent, vec!["question 4", "question 3", "question 2"]);
    }

    #[tokio::test]
    async fn recent_is_idempotent_without_writes() {
        let (store, _dir) = test_store();
        for i in 0..12 {
            store.save(&format!("q{i}")).await.unwrap();
        }
        let first = store.recent(10).await.unwrap();
        let second = store.recent(10).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 10);
    }

    #[tokio::test]
    async fn reopen_preserves_questions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("questions.db");
        {
            let store = QuestionStore::open(&path).unwrap();
            store.save("persisted").await.unwrap();
        }
        let store = QuestionStore::open(&path).unwrap();
        assert!(store.exists("persisted").await.unwrap());
        assert_eq!(store.count().await.unwrap(), 1);
    }
}
