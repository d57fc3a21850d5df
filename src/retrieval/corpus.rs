// src/retrieval/corpus.rs
use anyhow::{Context, Result};
use log::{info, warn};
use std::collections::HashMap;
use std::sync::Arc;

use crate::models::strain::Strain;
use crate::utils::db_connect::PgPool;

/// The immutable item corpus: strains with precomputed embeddings, read at
/// startup and never mutated afterwards.
pub struct StrainCorpus {
    strains: Vec<Arc<Strain>>,
    by_name: HashMap<String, usize>,
    dimension: usize,
}

impl StrainCorpus {
    /// Builds a corpus from in-memory strains, skipping entries whose
    /// embedding is empty or disagrees with the corpus dimension.
    pub fn from_strains(strains: Vec<Strain>) -> Result<Self> {
        let mut kept: Vec<Arc<Strain>> = Vec::with_capacity(strains.len());
        let mut by_name = HashMap::new();
        let mut dimension = 0usize;

        for strain in strains {
            if strain.embedding.is_empty() {
                warn!("Strain '{}' has no embedding, skipping.", strain.name);
                continue;
            }
            if dimension == 0 {
                dimension = strain.embedding.len();
            } else if strain.embedding.len() != dimension {
                warn!(
                    "Strain '{}' embedding has dimension {}, expected {}. Skipping.",
                    strain.name,
                    strain.embedding.len(),
                    dimension
                );
                continue;
            }
            let idx = kept.len();
            by_name.insert(strain.name.to_lowercase(), idx);
            kept.push(Arc::new(strain));
        }

        Ok(Self {
            strains: kept,
            by_name,
            dimension,
        })
    }

    /// Loads the corpus from the `strains` table.
    pub async fn load_from_db(pool: &PgPool) -> Result<Self> {
        let conn = pool
            .get()
            .await
            .context("Corpus: failed to get DB connection")?;

        let rows = conn
            .query(
                "SELECT strain_id, strain_name, content, effects, dominant_terpene, leafly_url, embedding
                 FROM strains
                 ORDER BY strain_id",
                &[],
            )
            .await
            .context("Corpus: failed to query strains")?;

        let mut strains = Vec::with_capacity(rows.len());
        for row in &rows {
            let embedding_pgvector: Option<pgvector::Vector> = row.get("embedding");
            let embedding = embedding_pgvector.map(|v| v.to_vec()).unwrap_or_default();
            strains.push(Strain {
                id: row.get("strain_id"),
                name: row.get("strain_name"),
                content: row
                    .get::<_, Option<String>>("content")
                    .unwrap_or_default(),
                effects: row.get("effects"),
                dominant_terpene: row.get("dominant_terpene"),
                leafly_url: row.get("leafly_url"),
                embedding,
            });
        }

        let corpus = Self::from_strains(strains)?;
        info!(
            "Loaded strain corpus: {} strains, embedding dimension {}",
            corpus.len(),
            corpus.dimension()
        );
        Ok(corpus)
    }

    pub fn get(&self, idx: usize) -> Option<Arc<Strain>> {
        self.strains.get(idx).cloned()
    }

    /// Case-insensitive lookup of a strain's corpus index by name.
    pub fn index_of_name(&self, name: &str) -> Option<usize> {
        self.by_name.get(&name.to_lowercase()).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Strain>> {
        self.strains.iter()
    }

    pub fn len(&self) -> usize {
        self.strains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strains.is_empty()
    }

    /// Embedding dimension shared by every strain in the corpus.
    /// Zero only for an empty corpus.
    pub fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strain(name: &str, embedding: Vec<f32>) -> Strain {
        Strain {
            id: name.to_lowercase().replace(' ', "-"),
            name: name.to_string(),
            content: String::new(),
            effects: None,
            dominant_terpene: None,
            leafly_url: None,
            embedding,
        }
    }

    #[test]
    fn test_corpus_skips_bad_embeddings() {
        let corpus = StrainCorpus::from_strains(vec![
            strain("Blue Dream", vec![1.0, 0.0]),
            strain("No Embedding", vec![]),
            strain("Wrong Dim", vec![1.0, 0.0, 0.0]),
            strain("OG Kush", vec![0.0, 1.0]),
        ])
        .unwrap();

        assert_eq!(corpus.len(), 2);
        assert_eq!(corpus.dimension(), 2);
        assert_eq!(corpus.index_of_name("og kush"), Some(1));
        assert_eq!(corpus.index_of_name("OG Kush"), Some(1));
        assert_eq!(corpus.index_of_name("Wrong Dim"), None);
    }

    #[test]
    fn test_empty_corpus() {
        let corpus = StrainCorpus::from_strains(Vec::new()).unwrap();
        assert!(corpus.is_empty());
        assert_eq!(corpus.dimension(), 0);
        assert!(corpus.get(0).is_none());
    }
}
