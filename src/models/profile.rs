// src/models/profile.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Per-user preference and history record.
///
/// Stored as one JSON document per user in the profile store. The tag lists
/// are sets semantically: ordered sequences that never hold duplicates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserProfile {
    pub email: String,
    #[serde(default)]
    pub desired_effects: Vec<String>,
    #[serde(default)]
    pub preferred_aromas: Vec<String>,
    #[serde(default)]
    pub past_strains: Vec<String>,
    #[serde(default)]
    pub logged_effects: Vec<String>,
    /// strain name -> accumulated feedback tally. Keys only appear once a
    /// feedback event for that strain has been scored.
    #[serde(default)]
    pub reinforcement: HashMap<String, f64>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl UserProfile {
    /// Zero-valued default profile for first access.
    pub fn new(email: &str) -> Self {
        Self {
            email: email.to_string(),
            desired_effects: Vec::new(),
            preferred_aromas: Vec::new(),
            past_strains: Vec::new(),
            logged_effects: Vec::new(),
            reinforcement: HashMap::new(),
            notes: None,
            created_at: Some(Utc::now()),
            updated_at: None,
        }
    }
}

/// Appends `value` to the list only if it is not already present,
/// preserving insertion order.
pub fn insert_unique(list: &mut Vec<String>, value: &str) {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return;
    }
    if !list.iter().any(|existing| existing == trimmed) {
        list.push(trimmed.to_string());
    }
}

/// Signed outcome of a feedback event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackSign {
    Positive,
    Negative,
}

impl FeedbackSign {
    /// Reinforcement tally delta.
    pub fn delta(&self) -> f64 {
        match self {
            FeedbackSign::Positive => 1.0,
            FeedbackSign::Negative => -1.0,
        }
    }

    /// Bandit reward: correct recommendation = 1.0, incorrect = 0.0.
    pub fn reward(&self) -> f64 {
        match self {
            FeedbackSign::Positive => 1.0,
            FeedbackSign::Negative => 0.0,
        }
    }
}

/// A single feedback event. Transient: folded into the profile and appended
/// to the journal, never stored as its own aggregate by the core.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedbackEntry {
    /// Stamped by the feedback processor when absent.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    pub strain: String,
    pub feedback: FeedbackSign,
    #[serde(default)]
    pub effects_felt: Vec<String>,
    #[serde(default)]
    pub question: Option<String>,
    #[serde(default)]
    pub answer: Option<String>,
    /// Snapshot of the query embedding that produced the recommendation,
    /// kept so the bandit can be trained offline from the journal.
    #[serde(default)]
    pub query_embedding: Option<Vec<f32>>,
}

impl FeedbackEntry {
    pub fn new(strain: &str, feedback: FeedbackSign) -> Self {
        Self {
            timestamp: None,
            strain: strain.to_string(),
            feedback,
            effects_felt: Vec::new(),
            question: None,
            answer: None,
            query_embedding: None,
        }
    }
}
