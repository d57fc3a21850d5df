// src/rl/orchestrator.rs
use anyhow::Result;
use log::{info, warn};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::errors::RecommenderError;
use crate::models::profile::FeedbackSign;
use crate::retrieval::corpus::StrainCorpus;
use crate::rl::bandit::LinUcbBandit;
use crate::utils::constants::DEFAULT_BANDIT_ALPHA;
use crate::utils::db_connect::PgPool;

/// Binds the LinUCB bandit to the strain corpus: arm index = corpus index,
/// context = the query embedding each arm scores through its own model.
///
/// The bandit sits behind a readers-writer lock: `score_for_query` takes a
/// read guard so parallel queries never block each other, while reward
/// application takes the exclusive write guard.
pub struct RlOrchestrator {
    corpus: Arc<StrainCorpus>,
    bandit: RwLock<LinUcbBandit>,
}

impl RlOrchestrator {
    pub fn new(corpus: Arc<StrainCorpus>, alpha: f64) -> Self {
        let bandit = LinUcbBandit::new(corpus.len(), corpus.dimension(), alpha);
        Self {
            corpus,
            bandit: RwLock::new(bandit),
        }
    }

    /// Loads the persisted bandit, falling back to a fresh model when none
    /// exists or loading fails.
    pub async fn load(pool: &PgPool, corpus: Arc<StrainCorpus>) -> Result<Self> {
        let bandit = match LinUcbBandit::load_from_db(
            pool,
            corpus.len(),
            corpus.dimension(),
            DEFAULT_BANDIT_ALPHA,
        )
        .await
        {
            Ok(bandit) => {
                info!("Bandit ready: {}", bandit.get_stats_display());
                bandit
            }
            Err(e) => {
                warn!("Could not load bandit model: {}. Creating new one.", e);
                LinUcbBandit::new(corpus.len(), corpus.dimension(), DEFAULT_BANDIT_ALPHA)
            }
        };
        Ok(Self {
            corpus,
            bandit: RwLock::new(bandit),
        })
    }

    /// UCB score per corpus strain for one query embedding.
    pub async fn score_for_query(
        &self,
        query_embedding: &[f32],
    ) -> Result<Vec<f64>, RecommenderError> {
        let context: Vec<f64> = query_embedding.iter().map(|v| *v as f64).collect();
        let bandit = self.bandit.read().await;
        bandit.score_shared(&context)
    }

    /// Applies one observed reward for a strain, resolving the arm by name.
    pub async fn apply_reward(
        &self,
        strain_name: &str,
        sign: FeedbackSign,
        query_embedding: &[f32],
    ) -> Result<(), RecommenderError> {
        let arm = self.corpus.index_of_name(strain_name).ok_or_else(|| {
            RecommenderError::Bandit(format!("strain '{}' is not in the corpus", strain_name))
        })?;
        let context: Vec<f64> = query_embedding.iter().map(|v| *v as f64).collect();
        let mut bandit = self.bandit.write().await;
        bandit.update(arm, sign.reward(), &context)
    }

    /// Saves the bandit model, bumping its version.
    pub async fn save_model(&self, pool: &PgPool) -> Result<()> {
        let mut bandit = self.bandit.write().await;
        info!("Saving {}", bandit.get_stats_display());
        let model_id = bandit.save_to_db(pool).await?;
        info!(
            "Saved bandit model v{} (record id base: {})",
            bandit.version, model_id
        );
        Ok(())
    }

    pub async fn stats_display(&self) -> String {
        self.bandit.read().await.get_stats_display()
    }

    pub fn corpus(&self) -> &Arc<StrainCorpus> {
        &self.corpus
    }
}
