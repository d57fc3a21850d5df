// src/rl/bandit.rs
use anyhow::{Context, Result};
use log::{debug, info, warn};
use nalgebra::{Cholesky, DMatrix, DVector};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use uuid::Uuid;

use crate::errors::RecommenderError;
use crate::utils::db_connect::PgPool;

/// One arm's linear model: the D×D design matrix `a` (identity-initialized)
/// and reward vector `b` (zero-initialized).
///
/// `a` only ever receives rank-1 positive-semidefinite additions, so it stays
/// symmetric positive-definite and the Cholesky solve below cannot fail for
/// state produced through `update`.
#[derive(Serialize, Deserialize, Debug, Clone)]
struct ArmState {
    a: DMatrix<f64>,
    b: DVector<f64>,
    trials: usize,
}

impl ArmState {
    fn new(dim: usize) -> Self {
        Self {
            a: DMatrix::identity(dim, dim),
            b: DVector::zeros(dim),
            trials: 0,
        }
    }

    fn cholesky(&self) -> Result<Cholesky<f64, nalgebra::Dyn>, RecommenderError> {
        self.a.clone().cholesky().ok_or_else(|| {
            RecommenderError::Bandit(
                "arm covariance matrix lost positive-definiteness".to_string(),
            )
        })
    }

    /// UCB score for this arm given a context vector.
    fn ucb(&self, x: &DVector<f64>, alpha: f64) -> Result<f64, RecommenderError> {
        let chol = self.cholesky()?;
        let theta = chol.solve(&self.b);
        let mean = theta.dot(x);
        let variance = x.dot(&chol.solve(x));
        Ok(mean + alpha * variance.max(0.0).sqrt())
    }
}

/// Disjoint-model LinUCB over a fixed set of arms.
///
/// State accumulates for the lifetime of the process unless persisted and
/// reloaded; there is no decay and no reset short of reinitialization.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LinUcbBandit {
    arms: Vec<ArmState>,
    dim: usize,
    alpha: f64,
    pub version: u32,
}

impl LinUcbBandit {
    pub fn new(n_arms: usize, dim: usize, alpha: f64) -> Self {
        Self {
            arms: (0..n_arms).map(|_| ArmState::new(dim)).collect(),
            dim,
            alpha,
            version: 1,
        }
    }

    pub fn n_arms(&self) -> usize {
        self.arms.len()
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    fn check_context(&self, context: &[f64]) -> Result<DVector<f64>, RecommenderError> {
        if context.len() != self.dim {
            return Err(RecommenderError::DimensionMismatch {
                expected: self.dim,
                got: context.len(),
            });
        }
        Ok(DVector::from_column_slice(context))
    }

    /// UCB value per arm, one context vector per arm.
    pub fn score(&self, contexts: &[Vec<f64>]) -> Result<Vec<f64>, RecommenderError> {
        if contexts.len() != self.arms.len() {
            return Err(RecommenderError::Bandit(format!(
                "expected {} context vectors, got {}",
                self.arms.len(),
                contexts.len()
            )));
        }
        let mut scores = Vec::with_capacity(self.arms.len());
        for (arm, context) in self.arms.iter().zip(contexts) {
            let x = self.check_context(context)?;
            scores.push(arm.ucb(&x, self.alpha)?);
        }
        Ok(scores)
    }

    /// UCB value per arm with one shared context (the usual query-vector
    /// case: every arm scores the same observation through its own model).
    pub fn score_shared(&self, context: &[f64]) -> Result<Vec<f64>, RecommenderError> {
        let x = self.check_context(context)?;
        self.arms
            .iter()
            .map(|arm| arm.ucb(&x, self.alpha))
            .collect()
    }

    /// Rank-1 update for one observed reward: `A += x·xᵀ`, `b += reward·x`.
    pub fn update(
        &mut self,
        arm: usize,
        reward: f64,
        context: &[f64],
    ) -> Result<(), RecommenderError> {
        let x = self.check_context(context)?;
        let n_arms = self.arms.len();
        let state = self.arms.get_mut(arm).ok_or_else(|| {
            RecommenderError::Bandit(format!("arm {} out of range (n_arms={})", arm, n_arms))
        })?;
        state.a += &x * x.transpose();
        state.b += &x * reward;
        state.trials += 1;
        debug!(
            "LinUcbBandit (v{}): updated arm {} with reward {:.1} (trials={})",
            self.version, arm, reward, state.trials
        );
        Ok(())
    }

    /// Saves the full bandit state as a versioned model row, alongside a
    /// metadata row describing the hyperparameters.
    pub async fn save_to_db(&mut self, pool: &PgPool) -> Result<String> {
        let conn = pool.get().await.context("Failed to get DB connection")?;
        self.version += 1;
        let model_json = serde_json::to_value(&*self).context("Failed to serialize LinUcbBandit")?;

        let id_prefix = "linucb_bandit";
        let latest_model_row = conn
            .query_opt(
                "SELECT id FROM recommender_metadata.bandit_models WHERE model_type = $1 ORDER BY version DESC LIMIT 1",
                &[&id_prefix],
            )
            .await
            .context("Failed to query for latest bandit model ID")?;

        let model_id = latest_model_row.map_or_else(
            || format!("{}_{}", id_prefix, Uuid::new_v4()),
            |row| row.get(0),
        );

        let parameters = json!({
            "model_type": "LinUcb",
            "alpha": self.alpha,
            "n_arms": self.arms.len(),
            "dim": self.dim,
        });

        let total_trials: usize = self.arms.iter().map(|arm| arm.trials).sum();
        let trained_arms = self.arms.iter().filter(|arm| arm.trials > 0).count();
        let metrics: JsonValue = json!({
            "total_trials": total_trials,
            "trained_arms": trained_arms,
        });

        let binary_model_id = format!("{}_binary", model_id);

        // Save metadata
        conn.execute(
            "INSERT INTO recommender_metadata.bandit_models (id, model_type, parameters, metrics, version, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, CURRENT_TIMESTAMP, CURRENT_TIMESTAMP)
             ON CONFLICT (id) DO UPDATE SET parameters = EXCLUDED.parameters, metrics = EXCLUDED.metrics, version = EXCLUDED.version, updated_at = CURRENT_TIMESTAMP",
            &[&model_id, &id_prefix, &parameters, &metrics, &(self.version as i32)],
        ).await?;

        // Save full model
        conn.execute(
            "INSERT INTO recommender_metadata.bandit_models (id, model_type, parameters, version)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (id) DO UPDATE SET parameters = EXCLUDED.parameters, version = EXCLUDED.version",
            &[&binary_model_id, &format!("{}_binary", id_prefix), &model_json, &(self.version as i32)],
        ).await?;

        Ok(model_id)
    }

    /// Loads the latest persisted bandit, or builds a fresh one when no row
    /// exists or the stored shape no longer matches the corpus.
    pub async fn load_from_db(
        pool: &PgPool,
        n_arms: usize,
        dim: usize,
        alpha: f64,
    ) -> Result<Self> {
        let conn = pool.get().await.context("Failed to get DB connection")?;
        let binary_model_type = "linucb_bandit_binary";

        let binary_row_opt = conn
            .query_opt(
                "SELECT parameters FROM recommender_metadata.bandit_models WHERE model_type = $1 ORDER BY version DESC LIMIT 1",
                &[&binary_model_type],
            )
            .await?;

        if let Some(binary_row) = binary_row_opt {
            let model_json: JsonValue = binary_row.get(0);
            let loaded: LinUcbBandit = serde_json::from_value(model_json)?;

            if loaded.arms.len() != n_arms || loaded.dim != dim {
                warn!(
                    "Loaded LinUcbBandit (v{}) has shape {}x{}, corpus needs {}x{}. Creating a fresh model.",
                    loaded.version, loaded.arms.len(), loaded.dim, n_arms, dim
                );
                Ok(Self::new(n_arms, dim, alpha))
            } else {
                info!("Loaded LinUcbBandit (v{}) from database.", loaded.version);
                Ok(loaded)
            }
        } else {
            info!("No existing LinUcbBandit model found. Creating new model.");
            Ok(Self::new(n_arms, dim, alpha))
        }
    }

    pub fn get_stats_display(&self) -> String {
        let total_trials: usize = self.arms.iter().map(|arm| arm.trials).sum();
        let trained_arms = self.arms.iter().filter(|arm| arm.trials > 0).count();
        format!(
            "LinUcbBandit (v{}): {} arms (dim={}, alpha={:.2}), {} trained arms, {} total updates",
            self.version,
            self.arms.len(),
            self.dim,
            self.alpha,
            trained_arms,
            total_trials
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_bandit_scores_alpha_times_norm() {
        let bandit = LinUcbBandit::new(3, 2, 0.3);
        let context = vec![3.0, 4.0];
        let scores = bandit.score_shared(&context).unwrap();
        // theta is zero and A is identity, so ucb = alpha * sqrt(x.x) = 0.3 * 5
        for score in scores {
            assert!((score - 1.5).abs() < 1e-9);
        }
    }

    #[test]
    fn test_score_with_per_arm_contexts() {
        let bandit = LinUcbBandit::new(2, 2, 0.3);
        let contexts = vec![vec![1.0, 0.0], vec![0.0, 2.0]];
        let scores = bandit.score(&contexts).unwrap();
        assert!((scores[0] - 0.3).abs() < 1e-9);
        assert!((scores[1] - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_update_raises_rewarded_arm() {
        let mut bandit = LinUcbBandit::new(2, 2, 0.3);
        let context = vec![1.0, 0.0];
        bandit.update(0, 1.0, &context).unwrap();

        let scores = bandit.score_shared(&context).unwrap();
        // Arm 0: A = [[2,0],[0,1]], b = [1,0] => theta = [0.5, 0],
        // mean = 0.5, variance = 0.5.
        let expected_arm0 = 0.5 + 0.3 * 0.5f64.sqrt();
        assert!((scores[0] - expected_arm0).abs() < 1e-9);
        // Arm 1 untouched: mean 0, variance 1.
        assert!((scores[1] - 0.3).abs() < 1e-9);
        assert!(scores[0] > scores[1]);
    }

    #[test]
    fn test_covariance_stays_symmetric_positive_definite() {
        let mut bandit = LinUcbBandit::new(1, 3, 0.3);
        let contexts = [
            vec![1.0, 2.0, -1.0],
            vec![0.5, -0.5, 3.0],
            vec![-2.0, 0.0, 1.0],
        ];
        for (i, context) in contexts.iter().enumerate() {
            bandit.update(0, if i % 2 == 0 { 1.0 } else { 0.0 }, context).unwrap();
        }
        let a = &bandit.arms[0].a;
        assert_eq!(a, &a.transpose());
        assert!(a.clone().cholesky().is_some());
    }

    #[test]
    fn test_dimension_mismatch_is_rejected() {
        let mut bandit = LinUcbBandit::new(2, 3, 0.3);
        assert!(matches!(
            bandit.score_shared(&[1.0, 0.0]),
            Err(RecommenderError::DimensionMismatch {
                expected: 3,
                got: 2
            })
        ));
        assert!(matches!(
            bandit.update(0, 1.0, &[1.0]),
            Err(RecommenderError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_unknown_arm_is_rejected() {
        let mut bandit = LinUcbBandit::new(2, 2, 0.3);
        assert!(matches!(
            bandit.update(5, 1.0, &[1.0, 0.0]),
            Err(RecommenderError::Bandit(_))
        ));
    }

    #[test]
    fn test_state_round_trips_through_serde() {
        let mut bandit = LinUcbBandit::new(2, 2, 0.3);
        bandit.update(1, 1.0, &[0.5, 0.5]).unwrap();
        let value = serde_json::to_value(&bandit).unwrap();
        let back: LinUcbBandit = serde_json::from_value(value).unwrap();
        assert_eq!(back.n_arms(), 2);
        assert_eq!(
            back.score_shared(&[0.5, 0.5]).unwrap(),
            bandit.score_shared(&[0.5, 0.5]).unwrap()
        );
    }
}
