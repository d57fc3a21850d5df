// src/retrieval/index.rs
use anyhow::{Context, Result};
use arroy::distances::Euclidean;
use arroy::{Database as ArroyDatabase, Reader, Writer};
use heed::EnvOpenOptions;
use log::info;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::num::NonZeroUsize;
use std::time::Instant;
use tempfile::TempDir;

use crate::errors::RecommenderError;
use crate::retrieval::corpus::StrainCorpus;

const ARROY_DB_MAP_SIZE_MIB: usize = 1024;
const NUM_ARROY_TREES: usize = 10;
const ARROY_SEARCH_MULTIPLIER: usize = 15;

/// Fixed seed so a given corpus always builds the identical index, which
/// keeps `search` deterministic across process restarts.
const INDEX_BUILD_SEED: u64 = 42;

/// ANN index over the corpus embeddings. Item ids are corpus indices.
///
/// The LMDB environment lives in a tempdir for the process lifetime; the
/// corpus is immutable, so the index is built once at startup and only ever
/// read afterwards.
pub struct VectorIndex {
    env: heed::Env,
    db: ArroyDatabase<Euclidean>,
    dimension: usize,
    item_count: usize,
    _index_dir: TempDir,
}

impl VectorIndex {
    /// Builds the index from every strain in the corpus.
    pub fn build(corpus: &StrainCorpus) -> Result<Self> {
        let build_start = Instant::now();
        let index_dir = TempDir::new().context("Failed to create index directory")?;

        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(ARROY_DB_MAP_SIZE_MIB * 1024 * 1024)
                .open(index_dir.path())
        }
        .context("Failed to open LMDB environment for vector index")?;

        let mut wtxn = env
            .write_txn()
            .context("Failed to start index write transaction")?;
        let db: ArroyDatabase<Euclidean> = env
            .create_database(&mut wtxn, None)
            .context("Failed to create arroy database")?;

        let dimension = corpus.dimension();
        let item_count = corpus.len();

        if item_count > 0 {
            let writer = Writer::<Euclidean>::new(db, 0, dimension);
            for (idx, strain) in corpus.iter().enumerate() {
                writer
                    .add_item(&mut wtxn, idx as u32, &strain.embedding)
                    .with_context(|| {
                        format!("Failed to add strain '{}' to index", strain.name)
                    })?;
            }

            let mut rng = StdRng::seed_from_u64(INDEX_BUILD_SEED);
            writer
                .builder(&mut rng)
                .n_trees(NUM_ARROY_TREES)
                .build(&mut wtxn)
                .context("Failed to build arroy index")?;
        }

        wtxn.commit()
            .context("Failed to commit index transaction")?;

        info!(
            "Vector index built with {} items (dim={}) in {:.2?}",
            item_count,
            dimension,
            build_start.elapsed()
        );

        Ok(Self {
            env,
            db,
            dimension,
            item_count,
            _index_dir: index_dir,
        })
    }

    pub fn len(&self) -> usize {
        self.item_count
    }

    pub fn is_empty(&self) -> bool {
        self.item_count == 0
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Returns up to `k` (item id, distance) pairs ascending by distance.
    pub fn search(
        &self,
        query_embedding: &[f32],
        k: usize,
    ) -> Result<Vec<(u32, f32)>, RecommenderError> {
        if k == 0 {
            return Err(RecommenderError::Retrieval(
                "requested candidate count must be positive".to_string(),
            ));
        }
        if self.item_count == 0 {
            return Err(RecommenderError::Retrieval(
                "vector index is empty".to_string(),
            ));
        }
        if query_embedding.len() != self.dimension {
            return Err(RecommenderError::DimensionMismatch {
                expected: self.dimension,
                got: query_embedding.len(),
            });
        }

        let rtxn = self.env.read_txn().map_err(|e| {
            RecommenderError::Retrieval(format!("failed to start read transaction: {}", e))
        })?;
        let reader = Reader::<Euclidean>::open(&rtxn, 0, self.db)
            .map_err(|e| RecommenderError::Retrieval(format!("failed to open reader: {}", e)))?;

        let mut query = reader.nns(k);
        if let Some(search_k) = NonZeroUsize::new(k * NUM_ARROY_TREES * ARROY_SEARCH_MULTIPLIER) {
            query.search_k(search_k);
        }

        query
            .by_vector(&rtxn, query_embedding)
            .map_err(|e| RecommenderError::Retrieval(format!("nearest-neighbor query failed: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::strain::Strain;

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
    fn test_build_and_search_small_index() {
        let corpus = StrainCorpus::from_strains(vec![
            strain("A", vec![1.0, 0.0]),
            strain("B", vec![0.0, 1.0]),
            strain("C", vec![-1.0, 0.0]),
        ])
        .unwrap();
        let index = VectorIndex::build(&corpus).unwrap();
        assert_eq!(index.len(), 3);

        let results = index.search(&[0.9, 0.1], 2).unwrap();
        assert!(results.len() <= 2);
        assert_eq!(results[0].0, 0);
        for pair in results.windows(2) {
            assert!(pair[0].1 <= pair[1].1);
        }
    }

    #[test]
    fn test_empty_index_fails_search_not_build() {
        let corpus = StrainCorpus::from_strains(Vec::new()).unwrap();
        let index = VectorIndex::build(&corpus).unwrap();
        assert!(index.is_empty());
        assert!(matches!(
            index.search(&[1.0], 1),
            Err(RecommenderError::Retrieval(_))
        ));
    }
}
