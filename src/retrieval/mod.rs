// src/retrieval/mod.rs
pub mod corpus;
pub mod index;

use std::sync::Arc;

use crate::errors::RecommenderError;
use crate::models::strain::RetrievedCandidate;
use self::corpus::StrainCorpus;
use self::index::VectorIndex;

/// Nearest-neighbor retrieval over the immutable strain corpus.
///
/// Read-only once built; queries may run fully in parallel.
pub struct VectorRetriever {
    corpus: Arc<StrainCorpus>,
    index: VectorIndex,
}

impl VectorRetriever {
    pub fn new(corpus: Arc<StrainCorpus>, index: VectorIndex) -> Self {
        Self { corpus, index }
    }

    /// Builds the ANN index for the given corpus and wraps both.
    pub fn build(corpus: Arc<StrainCorpus>) -> anyhow::Result<Self> {
        let index = VectorIndex::build(&corpus)?;
        Ok(Self { corpus, index })
    }

    pub fn corpus(&self) -> &Arc<StrainCorpus> {
        &self.corpus
    }

    /// Returns up to `k` candidates ascending by raw distance.
    ///
    /// Deterministic for a fixed index and query. Fails when the index is
    /// empty, `k` is zero, or the query dimension does not match the corpus.
    pub fn search(
        &self,
        query_embedding: &[f32],
        k: usize,
    ) -> Result<Vec<RetrievedCandidate>, RecommenderError> {
        let neighbors = self.index.search(query_embedding, k)?;
        let mut candidates = Vec::with_capacity(neighbors.len());
        for (item_id, distance) in neighbors {
            match self.corpus.get(item_id as usize) {
                Some(strain) => candidates.push(RetrievedCandidate { strain, distance }),
                None => {
                    return Err(RecommenderError::Retrieval(format!(
                        "index returned unknown item id {}",
                        item_id
                    )))
                }
            }
        }
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::strain::Strain;

    fn strain(id: &str, name: &str, embedding: Vec<f32>) -> Strain {
        Strain {
            id: id.to_string(),
            name: name.to_string(),
            content: String::new(),
            effects: None,
            dominant_terpene: None,
            leafly_url: None,
            embedding,
        }
    }

    fn small_corpus() -> Arc<StrainCorpus> {
        let strains = vec![
            strain("s1", "Blue Dream", vec![1.0, 0.0, 0.0]),
            strain("s2", "OG Kush", vec![0.0, 1.0, 0.0]),
            strain("s3", "Sour Diesel", vec![0.0, 0.0, 1.0]),
        ];
        Arc::new(StrainCorpus::from_strains(strains).unwrap())
    }

    #[test]
    fn test_search_returns_nearest_first() {
        let retriever = VectorRetriever::build(small_corpus()).unwrap();
        let results = retriever.search(&[0.9, 0.1, 0.0], 3).unwrap();
        assert!(!results.is_empty());
        assert_eq!(results[0].strain.name, "Blue Dream");
        for pair in results.windows(2) {
            assert!(pair[0].distance <= pair[1].distance);
        }
    }

    #[test]
    fn test_search_is_deterministic() {
        let retriever = VectorRetriever::build(small_corpus()).unwrap();
        let query = [0.4, 0.4, 0.2];
        let first = retriever.search(&query, 3).unwrap();
        let second = retriever.search(&query, 3).unwrap();
        let ids = |r: &[RetrievedCandidate]| {
            r.iter().map(|c| c.strain.id.clone()).collect::<Vec<_>>()
        };
        assert_eq!(ids(&first), ids(&second));
        for (a, b) in first.iter().zip(second.iter()) {
            assert_eq!(a.distance, b.distance);
        }
    }

    #[test]
    fn test_search_rejects_zero_k() {
        let retriever = VectorRetriever::build(small_corpus()).unwrap();
        let err = retriever.search(&[1.0, 0.0, 0.0], 0).unwrap_err();
        assert!(matches!(err, RecommenderError::Retrieval(_)));
    }

    #[test]
    fn test_search_rejects_empty_index() {
        let corpus = Arc::new(StrainCorpus::from_strains(Vec::new()).unwrap());
        let retriever = VectorRetriever::build(corpus).unwrap();
        let err = retriever.search(&[1.0, 0.0, 0.0], 3).unwrap_err();
        assert!(matches!(err, RecommenderError::Retrieval(_)));
    }

    #[test]
    fn test_search_rejects_dimension_mismatch() {
        let retriever = VectorRetriever::build(small_corpus()).unwrap();
        let err = retriever.search(&[1.0, 0.0], 3).unwrap_err();
        assert!(matches!(
            err,
            RecommenderError::DimensionMismatch {
                expected: 3,
                got: 2
            }
        ));
    }
}
