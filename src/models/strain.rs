// src/models/strain.rs
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One immutable corpus entry. Created at index-build time, read-only for
/// the process lifetime.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Strain {
    pub id: String,
    pub name: String,
    /// Chunked description text the fusion stage matches preference tags
    /// against. May be empty for sparsely-scraped strains.
    pub content: String,
    /// Top-effect summary, e.g. "Relaxed (55%), Happy (48%)".
    pub effects: Option<String>,
    pub dominant_terpene: Option<String>,
    pub leafly_url: Option<String>,
    /// Precomputed embedding. All strains in a corpus share one dimension.
    pub embedding: Vec<f32>,
}

impl Strain {
    /// Reference URL for the strain, falling back to a slug built from the
    /// name when the corpus row carried none.
    pub fn reference_url(&self) -> String {
        match &self.leafly_url {
            Some(url) if !url.is_empty() => url.clone(),
            _ => generate_leafly_url(&self.name),
        }
    }
}

/// Builds a leafly.com slug URL from a strain name.
pub fn generate_leafly_url(name: &str) -> String {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return "https://www.leafly.com/strains".to_string();
    }
    let slug = trimmed.to_lowercase().replace(' ', "-").replace('\'', "");
    format!("https://www.leafly.com/strains/{}", slug)
}

/// A candidate returned by the vector retriever, before score fusion.
#[derive(Debug, Clone)]
pub struct RetrievedCandidate {
    pub strain: Arc<Strain>,
    /// Raw distance from the ANN index, ascending = closer.
    pub distance: f32,
}

/// A fused, ranked result. Produced fresh per query and discarded after
/// the response.
#[derive(Debug, Clone)]
pub struct RankedCandidate {
    pub strain: Arc<Strain>,
    pub distance: f32,
    pub adjusted_score: f64,
}
