// src/utils/constants.rs

/// Weight applied per desired-effect tag found in a strain's description.
pub const EFFECT_MATCH_WEIGHT: f64 = 0.5;

/// Weight applied per preferred-aroma tag found in a strain's description.
pub const AROMA_MATCH_WEIGHT: f64 = 0.3;

/// Number of candidates pulled from the vector index per query.
pub const DEFAULT_TOP_K: usize = 5;

/// LinUCB exploration constant. Larger values favor uncertain arms.
pub const DEFAULT_BANDIT_ALPHA: f64 = 0.3;

/// Embedding model the corpus was built with. Query embeddings must come
/// from the same model or the distances are meaningless.
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// Profile used when no user is signed in.
pub const DEFAULT_EMAIL: &str = "default_user@example.com";
