// src/engine.rs
use log::{debug, info};
use std::sync::Arc;
use std::time::Instant;

use crate::embedding::Embedder;
use crate::errors::RecommenderError;
use crate::models::stats_models::QueryStats;
use crate::models::strain::RankedCandidate;
use crate::ranking;
use crate::retrieval::VectorRetriever;
use crate::rl::orchestrator::RlOrchestrator;
use crate::storage::ProfileStore;

/// One query's output: the ranked list plus the query embedding (callers
/// snapshot it into feedback entries) and timing counters.
#[derive(Debug)]
pub struct Recommendations {
    pub query_embedding: Vec<f32>,
    pub ranked: Vec<RankedCandidate>,
    pub stats: QueryStats,
}

/// Query-side orchestration: embed the question, retrieve nearest strains,
/// fuse scores against the user's profile.
///
/// Read-only per query; safe to share across concurrent sessions.
pub struct RecommendationEngine {
    retriever: VectorRetriever,
    embedder: Arc<dyn Embedder>,
    profile_store: Arc<dyn ProfileStore>,
    bandit: Option<Arc<RlOrchestrator>>,
}

impl RecommendationEngine {
    pub fn new(
        retriever: VectorRetriever,
        embedder: Arc<dyn Embedder>,
        profile_store: Arc<dyn ProfileStore>,
    ) -> Self {
        Self {
            retriever,
            embedder,
            profile_store,
            bandit: None,
        }
    }

    /// Attaches a bandit orchestrator for explore/exploit scoring.
    pub fn with_bandit(mut self, bandit: Arc<RlOrchestrator>) -> Self {
        self.bandit = Some(bandit);
        self
    }

    pub fn retriever(&self) -> &VectorRetriever {
        &self.retriever
    }

    /// Embeds the query text and recommends for the given user. The profile
    /// is created with defaults on first access.
    pub async fn recommend(
        &self,
        query: &str,
        email: &str,
        k: usize,
    ) -> Result<Recommendations, RecommenderError> {
        let total_start = Instant::now();

        let embed_start = Instant::now();
        let query_embedding = self.embedder.embed(query).await?;
        let embed_time = embed_start.elapsed();

        let mut result = self
            .recommend_with_embedding(&query_embedding, email, k)
            .await?;
        result.stats.embed_time = embed_time;
        result.stats.total_time = total_start.elapsed();

        info!(
            "Recommended {} strains for '{}' in {:.2?} (embed {:.2?}, search {:.2?}, rank {:.2?})",
            result.stats.candidates_returned,
            email,
            result.stats.total_time,
            result.stats.embed_time,
            result.stats.search_time,
            result.stats.rank_time,
        );
        Ok(result)
    }

    /// Recommends from an already-embedded query vector.
    pub async fn recommend_with_embedding(
        &self,
        query_embedding: &[f32],
        email: &str,
        k: usize,
    ) -> Result<Recommendations, RecommenderError> {
        let total_start = Instant::now();
        let mut stats = QueryStats::default();

        let search_start = Instant::now();
        let candidates = self.retriever.search(query_embedding, k)?;
        stats.search_time = search_start.elapsed();
        stats.candidates_retrieved = candidates.len();

        let profile = self.profile_store.fetch_or_create(email).await?;

        let rank_start = Instant::now();
        let ranked = ranking::rank(&candidates, &profile);
        stats.rank_time = rank_start.elapsed();
        stats.candidates_returned = ranked.len();
        stats.total_time = total_start.elapsed();

        debug!(
            "Query for '{}': {} candidates retrieved, top: {:?}",
            email,
            stats.candidates_retrieved,
            ranked.first().map(|c| c.strain.name.as_str())
        );

        Ok(Recommendations {
            query_embedding: query_embedding.to_vec(),
            ranked,
            stats,
        })
    }

    /// Per-arm UCB scores for the query, when a bandit is attached.
    pub async fn bandit_scores(
        &self,
        query_embedding: &[f32],
    ) -> Result<Option<Vec<f64>>, RecommenderError> {
        match &self.bandit {
            Some(orchestrator) => Ok(Some(orchestrator.score_for_query(query_embedding).await?)),
            None => Ok(None),
        }
    }
}
