// src/lib.rs
pub mod embedding;
pub mod engine;
pub mod errors;
pub mod models;
pub mod ranking;
pub mod retrieval;
pub mod rl;
pub mod storage;
pub mod utils;

pub use engine::RecommendationEngine;
pub use errors::{PartialWriteWarning, RecommenderError};
pub use models::profile::{FeedbackEntry, FeedbackSign, UserProfile};
pub use models::strain::{RankedCandidate, Strain};
