// src/rl/mod.rs
pub mod bandit;
pub mod feedback_processor;
pub mod orchestrator;
pub mod reinforcement;

pub use bandit::LinUcbBandit;
pub use feedback_processor::{FeedbackProcessor, FeedbackReceipt, ProfileUpdated};
pub use orchestrator::RlOrchestrator;
