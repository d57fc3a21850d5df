// src/rl/feedback_processor.rs
use chrono::Utc;
use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use uuid::Uuid;

use crate::errors::{PartialWriteWarning, RecommenderError, WriteStage};
use crate::models::profile::{insert_unique, FeedbackEntry, FeedbackSign, UserProfile};
use crate::rl::reinforcement;
use crate::storage::{JournalSink, ProfileStore};

const PROFILE_UPDATE_CHANNEL_CAPACITY: usize = 64;

/// Emitted after a profile write lands, so callers can refresh cached
/// views instead of polling.
#[derive(Debug, Clone)]
pub struct ProfileUpdated {
    pub email: String,
    pub strain: String,
}

/// Result of logging one feedback entry. `warnings` is non-empty when the
/// journal append and the profile update did not both land.
#[derive(Debug)]
pub struct FeedbackReceipt {
    pub journal_id: Option<Uuid>,
    pub profile: UserProfile,
    pub warnings: Vec<PartialWriteWarning>,
}

impl FeedbackReceipt {
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// Validates and applies feedback events: journals the raw entry, folds it
/// into the user's profile, and (separately, on explicit request) adjusts
/// the reinforcement tally.
///
/// All persisted read-modify-write cycles for one user are serialized
/// through a per-user mutex, so interleaved events for the same (user,
/// strain) never lose an update.
pub struct FeedbackProcessor {
    store: Arc<dyn ProfileStore>,
    journal: Arc<dyn JournalSink>,
    user_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    updates_tx: broadcast::Sender<ProfileUpdated>,
}

impl FeedbackProcessor {
    pub fn new(store: Arc<dyn ProfileStore>, journal: Arc<dyn JournalSink>) -> Self {
        let (updates_tx, _) = broadcast::channel(PROFILE_UPDATE_CHANNEL_CAPACITY);
        Self {
            store,
            journal,
            user_locks: Mutex::new(HashMap::new()),
            updates_tx,
        }
    }

    /// Subscribes to profile-update events.
    pub fn subscribe(&self) -> broadcast::Receiver<ProfileUpdated> {
        self.updates_tx.subscribe()
    }

    async fn user_lock(&self, email: &str) -> Arc<Mutex<()>> {
        let mut locks = self.user_locks.lock().await;
        locks
            .entry(email.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Logs one feedback entry for an existing user.
    ///
    /// Stamps the timestamp if absent, appends the raw entry to the journal,
    /// folds the strain and felt effects into the profile history (deduped),
    /// and persists the profile. Logging never touches the reinforcement
    /// tally; that is `adjust_reinforcement`'s job and stays a separate,
    /// explicit call.
    ///
    /// A failed journal append does not abort the fold; each failed write is
    /// reported as a `PartialWriteWarning` on the receipt and logged.
    pub async fn log_feedback(
        &self,
        mut entry: FeedbackEntry,
        email: &str,
    ) -> Result<FeedbackReceipt, RecommenderError> {
        if entry.timestamp.is_none() {
            entry.timestamp = Some(Utc::now());
        }

        let lock = self.user_lock(email).await;
        let _guard = lock.lock().await;

        // The profile must already exist via prior lookup/creation; feedback
        // for an unknown user is an error, not an implicit signup.
        let mut profile = self
            .store
            .get(email)
            .await?
            .ok_or_else(|| RecommenderError::UserNotFound(email.to_string()))?;

        let mut warnings = Vec::new();

        let journal_id = match self.journal.append(email, &entry).await {
            Ok(id) => Some(id),
            Err(e) => {
                let warning = PartialWriteWarning {
                    stage: WriteStage::Journal,
                    detail: e.to_string(),
                };
                warn!("{} (user '{}', strain '{}')", warning, email, entry.strain);
                warnings.push(warning);
                None
            }
        };

        insert_unique(&mut profile.past_strains, &entry.strain);
        for effect in &entry.effects_felt {
            insert_unique(&mut profile.logged_effects, effect);
        }

        match self.store.put(email, &profile).await {
            Ok(()) => {
                let _ = self.updates_tx.send(ProfileUpdated {
                    email: email.to_string(),
                    strain: entry.strain.clone(),
                });
            }
            Err(e) => {
                let warning = PartialWriteWarning {
                    stage: WriteStage::Profile,
                    detail: e.to_string(),
                };
                warn!("{} (user '{}', strain '{}')", warning, email, entry.strain);
                warnings.push(warning);
            }
        }

        info!(
            "Logged {:?} feedback for '{}' on '{}' ({} warning(s))",
            entry.feedback,
            email,
            entry.strain,
            warnings.len()
        );

        Ok(FeedbackReceipt {
            journal_id,
            profile,
            warnings,
        })
    }

    /// Applies one signed feedback event to the user's persisted
    /// reinforcement tally and returns the new score.
    ///
    /// The load-adjust-store cycle runs under the per-user lock, so two
    /// interleaved events for the same (user, strain) serialize instead of
    /// losing an update. A failed store write propagates; the adjustment is
    /// never silently dropped.
    pub async fn adjust_reinforcement(
        &self,
        email: &str,
        strain_name: &str,
        sign: FeedbackSign,
    ) -> Result<f64, RecommenderError> {
        let lock = self.user_lock(email).await;
        let _guard = lock.lock().await;

        let mut profile = self
            .store
            .get(email)
            .await?
            .ok_or_else(|| RecommenderError::UserNotFound(email.to_string()))?;

        let new_score = reinforcement::adjust_score(&mut profile, strain_name, sign);
        self.store.put(email, &profile).await?;

        let _ = self.updates_tx.send(ProfileUpdated {
            email: email.to_string(),
            strain: strain_name.to_string(),
        });

        debug!(
            "Adjusted reinforcement for ('{}', '{}') to {:.2}",
            email, strain_name, new_score
        );
        Ok(new_score)
    }
}

#[derive(Debug)]
struct JournalRecord {
    id: Uuid,
    entry_json: serde_json::Value,
}

async fn fetch_unprocessed_journal_entries(
    client: &tokio_postgres::Client,
) -> anyhow::Result<Vec<JournalRecord>> {
    let rows = client.query(
        "SELECT id, entry FROM journals WHERE processed_for_bandit_update_at IS NULL ORDER BY created_at ASC LIMIT 1000",
        &[],
    ).await?;
    Ok(rows
        .into_iter()
        .map(|row| JournalRecord {
            id: row.get("id"),
            entry_json: row.get("entry"),
        })
        .collect())
}

async fn mark_journal_entry_as_processed(
    client: &tokio_postgres::Client,
    entry_id: Uuid,
) -> anyhow::Result<()> {
    client.execute(
        "UPDATE journals SET processed_for_bandit_update_at = CURRENT_TIMESTAMP WHERE id = $1",
        &[&entry_id],
    ).await?;
    Ok(())
}

/// Number of journal entries waiting for a training cycle.
pub async fn count_unprocessed_journal_entries(
    pool: &crate::utils::db_connect::PgPool,
) -> anyhow::Result<i64> {
    use anyhow::Context;
    let client = pool.get().await.context("Failed to get DB connection")?;
    let row = client
        .query_one(
            "SELECT COUNT(*) FROM journals WHERE processed_for_bandit_update_at IS NULL",
            &[],
        )
        .await?;
    Ok(row.get(0))
}

/// Replays unprocessed journal entries into the bandit and marks them
/// processed. One bad entry is skipped and counted, never aborting the
/// cycle.
pub async fn process_journal_for_bandit(
    pool: &crate::utils::db_connect::PgPool,
    orchestrator: &crate::rl::orchestrator::RlOrchestrator,
) -> anyhow::Result<crate::models::stats_models::TrainingCycleStats> {
    use anyhow::Context;
    use crate::models::stats_models::TrainingCycleStats;

    info!("Starting journal replay cycle for the bandit");
    let client = pool.get().await.context("Failed to get DB connection")?;
    let journal_items = fetch_unprocessed_journal_entries(&client).await?;

    let mut stats = TrainingCycleStats::default();
    if journal_items.is_empty() {
        info!("No new journal entries to process.");
        return Ok(stats);
    }

    for record in journal_items {
        let entry: FeedbackEntry = match serde_json::from_value(record.entry_json.clone()) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(
                    "Failed to deserialize journal entry {}: {}. Skipping.",
                    record.id, e
                );
                stats.error_count += 1;
                continue;
            }
        };

        let query_embedding = match &entry.query_embedding {
            Some(embedding) if !embedding.is_empty() => embedding.clone(),
            _ => {
                debug!(
                    "Journal entry {} has no query embedding snapshot. Skipping for training.",
                    record.id
                );
                stats.skipped_no_embedding += 1;
                // Still mark it so the backlog drains.
                if let Err(e) = mark_journal_entry_as_processed(&client, record.id).await {
                    warn!("Failed to mark entry {} as processed: {}", record.id, e);
                    stats.error_count += 1;
                }
                continue;
            }
        };

        if let Err(e) = orchestrator
            .apply_reward(&entry.strain, entry.feedback, &query_embedding)
            .await
        {
            warn!(
                "Failed to apply reward for journal entry {}: {}",
                record.id, e
            );
            stats.error_count += 1;
            continue;
        }

        if let Err(e) = mark_journal_entry_as_processed(&client, record.id).await {
            warn!("Failed to mark entry {} as processed: {}", record.id, e);
            stats.error_count += 1;
        } else {
            stats.processed_count += 1;
        }
    }

    info!(
        "Journal replay complete. Processed: {}, skipped (no embedding): {}, errors: {}.",
        stats.processed_count, stats.skipped_no_embedding, stats.error_count
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryJournal, MemoryProfileStore};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct FailingJournal;

    #[async_trait]
    impl JournalSink for FailingJournal {
        async fn append(
            &self,
            _email: &str,
            _entry: &FeedbackEntry,
        ) -> Result<Uuid, RecommenderError> {
            Err(RecommenderError::Store("journal sink unavailable".into()))
        }
    }

    /// Memory store whose writes can be toggled off, for partial-write tests.
    struct RejectingPutStore {
        inner: MemoryProfileStore,
        fail_puts: AtomicBool,
    }

    impl RejectingPutStore {
        fn new() -> Self {
            Self {
                inner: MemoryProfileStore::new(),
                fail_puts: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl ProfileStore for RejectingPutStore {
        async fn get(&self, email: &str) -> Result<Option<UserProfile>, RecommenderError> {
            self.inner.get(email).await
        }

        async fn put(&self, email: &str, profile: &UserProfile) -> Result<(), RecommenderError> {
            if self.fail_puts.load(Ordering::SeqCst) {
                return Err(RecommenderError::Store("profile store unavailable".into()));
            }
            self.inner.put(email, profile).await
        }
    }

    async fn processor_with_user(
        email: &str,
    ) -> (FeedbackProcessor, Arc<MemoryProfileStore>, Arc<MemoryJournal>) {
        let store = Arc::new(MemoryProfileStore::new());
        let journal = Arc::new(MemoryJournal::new());
        store.fetch_or_create(email).await.unwrap();
        let processor = FeedbackProcessor::new(store.clone(), journal.clone());
        (processor, store, journal)
    }

    fn entry_with_effects(strain: &str, effects: &[&str]) -> FeedbackEntry {
        let mut entry = FeedbackEntry::new(strain, FeedbackSign::Positive);
        entry.effects_felt = effects.iter().map(|s| s.to_string()).collect();
        entry
    }

    #[tokio::test]
    async fn test_unknown_user_is_rejected() {
        let store = Arc::new(MemoryProfileStore::new());
        let journal = Arc::new(MemoryJournal::new());
        let processor = FeedbackProcessor::new(store, journal.clone());

        let err = processor
            .log_feedback(FeedbackEntry::new("Blue Dream", FeedbackSign::Positive), "ghost@example.com")
            .await
            .unwrap_err();
        assert!(matches!(err, RecommenderError::UserNotFound(_)));

        let err = processor
            .adjust_reinforcement("ghost@example.com", "Blue Dream", FeedbackSign::Positive)
            .await
            .unwrap_err();
        assert!(matches!(err, RecommenderError::UserNotFound(_)));

        // Nothing journaled for the rejected event.
        assert_eq!(journal.len().await, 0);
    }

    #[tokio::test]
    async fn test_log_feedback_stamps_journals_and_folds() {
        let (processor, store, journal) = processor_with_user("user@example.com").await;

        let receipt = processor
            .log_feedback(
                entry_with_effects("Blue Dream", &["Relaxed", "Sleepy"]),
                "user@example.com",
            )
            .await
            .unwrap();

        assert!(receipt.is_clean());
        assert!(receipt.journal_id.is_some());
        assert_eq!(journal.len().await, 1);
        assert!(journal.entries().await[0].1.timestamp.is_some());

        let profile = store.get("user@example.com").await.unwrap().unwrap();
        assert_eq!(profile.past_strains, vec!["Blue Dream"]);
        assert_eq!(profile.logged_effects, vec!["Relaxed", "Sleepy"]);
        // Logging alone never touches the tally.
        assert!(profile.reinforcement.is_empty());
    }

    #[tokio::test]
    async fn test_repeated_feedback_dedups_history_but_journals_every_event() {
        let (processor, store, journal) = processor_with_user("user@example.com").await;

        for _ in 0..3 {
            processor
                .log_feedback(
                    entry_with_effects("Blue Dream", &["Relaxed"]),
                    "user@example.com",
                )
                .await
                .unwrap();
        }

        assert_eq!(journal.len().await, 3);
        let profile = store.get("user@example.com").await.unwrap().unwrap();
        assert_eq!(profile.past_strains, vec!["Blue Dream"]);
        assert_eq!(profile.logged_effects, vec!["Relaxed"]);
    }

    #[tokio::test]
    async fn test_journal_failure_is_surfaced_but_fold_continues() {
        let store = Arc::new(MemoryProfileStore::new());
        store.fetch_or_create("user@example.com").await.unwrap();
        let processor = FeedbackProcessor::new(store.clone(), Arc::new(FailingJournal));

        let receipt = processor
            .log_feedback(
                entry_with_effects("Blue Dream", &["Relaxed"]),
                "user@example.com",
            )
            .await
            .unwrap();

        assert_eq!(receipt.warnings.len(), 1);
        assert_eq!(receipt.warnings[0].stage, WriteStage::Journal);
        assert!(receipt.journal_id.is_none());

        // Profile fold still landed.
        let profile = store.get("user@example.com").await.unwrap().unwrap();
        assert_eq!(profile.past_strains, vec!["Blue Dream"]);
    }

    #[tokio::test]
    async fn test_profile_write_failure_is_surfaced() {
        let store = Arc::new(RejectingPutStore::new());
        store.inner.fetch_or_create("user@example.com").await.unwrap();
        let journal = Arc::new(MemoryJournal::new());
        let processor = FeedbackProcessor::new(store.clone(), journal.clone());

        store.fail_puts.store(true, Ordering::SeqCst);
        let receipt = processor
            .log_feedback(
                entry_with_effects("Blue Dream", &["Relaxed"]),
                "user@example.com",
            )
            .await
            .unwrap();

        assert_eq!(receipt.warnings.len(), 1);
        assert_eq!(receipt.warnings[0].stage, WriteStage::Profile);
        // Journal write landed even though the profile update did not.
        assert_eq!(journal.len().await, 1);
    }

    #[tokio::test]
    async fn test_adjust_reinforcement_sequence() {
        let (processor, _store, _journal) = processor_with_user("user@example.com").await;

        let signs = [
            FeedbackSign::Positive,
            FeedbackSign::Positive,
            FeedbackSign::Negative,
        ];
        let mut scores = Vec::new();
        for sign in signs {
            scores.push(
                processor
                    .adjust_reinforcement("user@example.com", "Blue Dream", sign)
                    .await
                    .unwrap(),
            );
        }
        assert_eq!(scores, vec![1.0, 2.0, 1.0]);

        let untouched = processor
            .adjust_reinforcement("user@example.com", "OG Kush", FeedbackSign::Positive)
            .await
            .unwrap();
        assert_eq!(untouched, 1.0);
    }

    #[tokio::test]
    async fn test_concurrent_adjustments_lose_no_updates() {
        let (processor, store, _journal) = processor_with_user("user@example.com").await;
        let processor = Arc::new(processor);

        let mut handles = Vec::new();
        for i in 0..12 {
            let processor = processor.clone();
            let sign = if i % 4 == 3 {
                FeedbackSign::Negative
            } else {
                FeedbackSign::Positive
            };
            handles.push(tokio::spawn(async move {
                processor
                    .adjust_reinforcement("user@example.com", "Blue Dream", sign)
                    .await
                    .unwrap()
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        // 9 positive, 3 negative: net +6 regardless of interleaving.
        let profile = store.get("user@example.com").await.unwrap().unwrap();
        assert_eq!(profile.reinforcement["Blue Dream"], 6.0);
    }

    #[tokio::test]
    async fn test_subscribers_observe_profile_updates() {
        let (processor, _store, _journal) = processor_with_user("user@example.com").await;
        let mut updates = processor.subscribe();

        processor
            .log_feedback(
                entry_with_effects("Blue Dream", &[]),
                "user@example.com",
            )
            .await
            .unwrap();

        let event = updates.recv().await.unwrap();
        assert_eq!(event.email, "user@example.com");
        assert_eq!(event.strain, "Blue Dream");
    }
}
