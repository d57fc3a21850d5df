// src/storage/profile_store.rs
use async_trait::async_trait;
use chrono::Utc;
use log::{debug, info};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::errors::RecommenderError;
use crate::models::profile::UserProfile;
use crate::utils::db_connect::PgPool;

/// External per-user profile store, injected into the components that need
/// it. Implementations must offer at-least atomic single-record `put`.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn get(&self, email: &str) -> Result<Option<UserProfile>, RecommenderError>;

    async fn put(&self, email: &str, profile: &UserProfile) -> Result<(), RecommenderError>;

    /// Returns the stored profile, or creates a zero-valued default on
    /// first access.
    async fn fetch_or_create(&self, email: &str) -> Result<UserProfile, RecommenderError> {
        if let Some(profile) = self.get(email).await? {
            return Ok(profile);
        }
        let profile = UserProfile::new(email);
        self.put(email, &profile).await?;
        info!("Created default profile for '{}'", email);
        Ok(profile)
    }
}

/// Postgres-backed store. One row per user in `user_profiles`, the full
/// profile serialized into the `data` JSONB column.
pub struct PgProfileStore {
    pool: PgPool,
}

impl PgProfileStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProfileStore for PgProfileStore {
    async fn get(&self, email: &str) -> Result<Option<UserProfile>, RecommenderError> {
        let conn = self
            .pool
            .get()
            .await
            .map_err(|e| RecommenderError::Store(format!("failed to get connection: {}", e)))?;

        let row_opt = conn
            .query_opt(
                "SELECT data FROM user_profiles WHERE email = $1",
                &[&email],
            )
            .await
            .map_err(|e| RecommenderError::Store(format!("profile query failed: {}", e)))?;

        match row_opt {
            Some(row) => {
                let data: serde_json::Value = row.get("data");
                let profile = serde_json::from_value(data).map_err(|e| {
                    RecommenderError::Store(format!("stored profile is malformed: {}", e))
                })?;
                Ok(Some(profile))
            }
            None => Ok(None),
        }
    }

    async fn put(&self, email: &str, profile: &UserProfile) -> Result<(), RecommenderError> {
        let conn = self
            .pool
            .get()
            .await
            .map_err(|e| RecommenderError::Store(format!("failed to get connection: {}", e)))?;

        let mut stamped = profile.clone();
        stamped.updated_at = Some(Utc::now());
        let data = serde_json::to_value(&stamped)
            .map_err(|e| RecommenderError::Store(format!("profile serialization failed: {}", e)))?;

        conn.execute(
            "INSERT INTO user_profiles (email, data, created_at, updated_at)
             VALUES ($1, $2, CURRENT_TIMESTAMP, CURRENT_TIMESTAMP)
             ON CONFLICT (email) DO UPDATE SET data = EXCLUDED.data, updated_at = CURRENT_TIMESTAMP",
            &[&email, &data],
        )
        .await
        .map_err(|e| RecommenderError::Store(format!("profile upsert failed: {}", e)))?;

        debug!("Persisted profile for '{}'", email);
        Ok(())
    }
}

/// In-memory store for tests and single-process use.
#[derive(Default)]
pub struct MemoryProfileStore {
    profiles: RwLock<HashMap<String, UserProfile>>,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn get(&self, email: &str) -> Result<Option<UserProfile>, RecommenderError> {
        Ok(self.profiles.read().await.get(email).cloned())
    }

    async fn put(&self, email: &str, profile: &UserProfile) -> Result<(), RecommenderError> {
        self.profiles
            .write()
            .await
            .insert(email.to_string(), profile.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_round_trip() {
        let store = MemoryProfileStore::new();
        let mut profile = UserProfile::new("user@example.com");
        profile.reinforcement.insert("A".to_string(), 1.5);
        profile.reinforcement.insert("B".to_string(), -0.5);

        store.put("user@example.com", &profile).await.unwrap();
        let loaded = store.get("user@example.com").await.unwrap().unwrap();
        assert_eq!(loaded.reinforcement, profile.reinforcement);
        assert_eq!(loaded, profile);
    }

    #[tokio::test]
    async fn test_fetch_or_create_defaults() {
        let store = MemoryProfileStore::new();
        assert!(store.get("new@example.com").await.unwrap().is_none());

        let profile = store.fetch_or_create("new@example.com").await.unwrap();
        assert_eq!(profile.email, "new@example.com");
        assert!(profile.desired_effects.is_empty());
        assert!(profile.reinforcement.is_empty());

        // Second call returns the stored record, not a fresh default.
        assert!(store.get("new@example.com").await.unwrap().is_some());
    }
}
