// src/storage/journal.rs
use async_trait::async_trait;
use log::debug;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::errors::RecommenderError;
use crate::models::profile::FeedbackEntry;
use crate::utils::db_connect::PgPool;

/// Append-only sink for raw feedback entries. Entries are never rewritten
/// or deleted by the core; the journal is the replay source for both profile
/// reconciliation and offline bandit training.
#[async_trait]
pub trait JournalSink: Send + Sync {
    async fn append(&self, email: &str, entry: &FeedbackEntry)
        -> Result<Uuid, RecommenderError>;
}

/// Postgres-backed journal: one row per entry in `journals`.
pub struct PgJournalSink {
    pool: PgPool,
}

impl PgJournalSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JournalSink for PgJournalSink {
    async fn append(
        &self,
        email: &str,
        entry: &FeedbackEntry,
    ) -> Result<Uuid, RecommenderError> {
        let conn = self
            .pool
            .get()
            .await
            .map_err(|e| RecommenderError::Store(format!("failed to get connection: {}", e)))?;

        let id = Uuid::new_v4();
        let entry_json = serde_json::to_value(entry)
            .map_err(|e| RecommenderError::Store(format!("entry serialization failed: {}", e)))?;

        conn.execute(
            "INSERT INTO journals (id, user_email, entry, created_at)
             VALUES ($1, $2, $3, CURRENT_TIMESTAMP)",
            &[&id, &email, &entry_json],
        )
        .await
        .map_err(|e| RecommenderError::Store(format!("journal insert failed: {}", e)))?;

        debug!("Journaled feedback {} for '{}'", id, email);
        Ok(id)
    }
}

/// In-memory journal for tests.
#[derive(Default)]
pub struct MemoryJournal {
    entries: RwLock<Vec<(String, FeedbackEntry)>>,
}

impl MemoryJournal {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn entries(&self) -> Vec<(String, FeedbackEntry)> {
        self.entries.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait]
impl JournalSink for MemoryJournal {
    async fn append(
        &self,
        email: &str,
        entry: &FeedbackEntry,
    ) -> Result<Uuid, RecommenderError> {
        self.entries
            .write()
            .await
            .push((email.to_string(), entry.clone()));
        Ok(Uuid::new_v4())
    }
}
