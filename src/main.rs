use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::info;
use std::sync::Arc;

use recommender_lib::embedding::{CachingEmbedder, Embedder, OpenAiEmbedder};
use recommender_lib::models::profile::{FeedbackEntry, FeedbackSign};
use recommender_lib::retrieval::corpus::StrainCorpus;
use recommender_lib::retrieval::VectorRetriever;
use recommender_lib::rl::feedback_processor::FeedbackProcessor;
use recommender_lib::rl::orchestrator::RlOrchestrator;
use recommender_lib::storage::{PgJournalSink, PgProfileStore, ProfileStore};
use recommender_lib::utils::constants::{DEFAULT_EMAIL, DEFAULT_TOP_K};
use recommender_lib::utils::db_connect::{connect, get_pool_status};
use recommender_lib::utils::env::load_env;
use recommender_lib::utils::get_memory_usage;
use recommender_lib::RecommendationEngine;

#[derive(Parser)]
#[command(author, version, about = "Strain recommendation pipeline", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Embed a question and print the ranked strain recommendations
    Query {
        /// The question to recommend against
        query: String,

        /// User the ranking is personalized for
        #[arg(long, default_value = DEFAULT_EMAIL)]
        email: String,

        /// Number of candidates to retrieve
        #[arg(long, default_value_t = DEFAULT_TOP_K)]
        top_k: usize,

        /// Also print LinUCB scores for the retrieved strains
        #[arg(long)]
        with_bandit: bool,
    },

    /// Journal a feedback event and update the reinforcement tally
    Feedback {
        /// Strain the feedback is about
        strain: String,

        /// positive or negative
        #[arg(long)]
        feedback: String,

        #[arg(long, default_value = DEFAULT_EMAIL)]
        email: String,

        /// Effects felt, comma-separated
        #[arg(long)]
        effects: Option<String>,

        /// The question that produced the recommendation; embedded and
        /// snapshotted so the bandit can train on this event later
        #[arg(long)]
        query: Option<String>,

        /// Journal the event without adjusting the ranking weight
        #[arg(long)]
        skip_score: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    load_env();

    let cli = Cli::parse();
    match cli.command {
        Command::Query {
            query,
            email,
            top_k,
            with_bandit,
        } => run_query(&query, &email, top_k, with_bandit).await,
        Command::Feedback {
            strain,
            feedback,
            email,
            effects,
            query,
            skip_score,
        } => run_feedback(&strain, &feedback, &email, effects, query, skip_score).await,
    }
}

fn phase_bar(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap(),
    );
    pb.set_message(message.to_string());
    pb
}

async fn run_query(query: &str, email: &str, top_k: usize, with_bandit: bool) -> Result<()> {
    info!("Starting strain recommendation query pipeline");
    let pool = connect().await.context("Failed to connect to database")?;

    let pb = phase_bar("Loading strain corpus...");
    let corpus = Arc::new(
        StrainCorpus::load_from_db(&pool)
            .await
            .context("Failed to load strain corpus")?,
    );
    pb.finish_with_message(format!("Corpus loaded: {} strains", corpus.len()));

    let pb = phase_bar("Building vector index...");
    let retriever =
        VectorRetriever::build(corpus.clone()).context("Failed to build vector index")?;
    pb.finish_with_message("Vector index ready");

    let (pool_size, pool_idle) = get_pool_status(&pool);
    info!(
        "Memory: {} MB, DB pool: {}/{} (used/total)",
        get_memory_usage().await,
        pool_size - pool_idle,
        pool_size
    );

    let embedder: Arc<dyn Embedder> = Arc::new(CachingEmbedder::new(Arc::new(
        OpenAiEmbedder::from_env().context("Failed to configure embedding client")?,
    )));
    let profile_store: Arc<dyn ProfileStore> = Arc::new(PgProfileStore::new(pool.clone()));

    let mut engine = RecommendationEngine::new(retriever, embedder, profile_store.clone());
    let bandit = if with_bandit {
        let orchestrator = Arc::new(
            RlOrchestrator::load(&pool, corpus.clone())
                .await
                .context("Failed to load bandit model")?,
        );
        engine = engine.with_bandit(orchestrator.clone());
        Some(orchestrator)
    } else {
        None
    };

    let result = engine
        .recommend(query, email, top_k)
        .await
        .context("Recommendation query failed")?;

    let profile = profile_store
        .fetch_or_create(email)
        .await
        .context("Failed to load profile")?;

    let bandit_scores = match (&bandit, with_bandit) {
        (Some(_), true) => engine.bandit_scores(&result.query_embedding).await?,
        _ => None,
    };

    println!("\nRecommendations for \"{}\":\n", query);
    for (position, candidate) in result.ranked.iter().enumerate() {
        let strain = &candidate.strain;
        let tried = if profile.past_strains.iter().any(|s| s == &strain.name) {
            " (tried before)"
        } else {
            ""
        };
        println!(
            "{}. {}{} — score {:.2}, distance {:.4}",
            position + 1,
            strain.name,
            tried,
            candidate.adjusted_score,
            candidate.distance
        );
        if let Some(terpene) = &strain.dominant_terpene {
            println!("   Dominant terpene: {}", terpene);
        }
        if let Some(effects) = &strain.effects {
            println!("   Effects: {}", effects);
        }
        if let (Some(scores), Some(arm)) = (
            bandit_scores.as_ref(),
            engine.retriever().corpus().index_of_name(&strain.name),
        ) {
            println!("   Bandit UCB: {:.3}", scores[arm]);
        }
        println!("   {}", strain.reference_url());
    }

    Ok(())
}

fn parse_sign(raw: &str) -> Result<FeedbackSign> {
    match raw.to_lowercase().as_str() {
        "positive" | "up" | "+" => Ok(FeedbackSign::Positive),
        "negative" | "down" | "-" => Ok(FeedbackSign::Negative),
        other => anyhow::bail!("feedback must be 'positive' or 'negative', got '{}'", other),
    }
}

async fn run_feedback(
    strain: &str,
    feedback: &str,
    email: &str,
    effects: Option<String>,
    query: Option<String>,
    skip_score: bool,
) -> Result<()> {
    let sign = parse_sign(feedback)?;
    let pool = connect().await.context("Failed to connect to database")?;

    let profile_store: Arc<dyn ProfileStore> = Arc::new(PgProfileStore::new(pool.clone()));
    let journal = Arc::new(PgJournalSink::new(pool.clone()));
    let processor = FeedbackProcessor::new(profile_store, journal);

    let mut entry = FeedbackEntry::new(strain, sign);
    if let Some(effects) = effects {
        entry.effects_felt = effects
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
    }
    if let Some(question) = query {
        let embedder = OpenAiEmbedder::from_env()
            .context("Failed to configure embedding client for query snapshot")?;
        entry.query_embedding = Some(
            embedder
                .embed(&question)
                .await
                .context("Failed to embed query for snapshot")?,
        );
        entry.question = Some(question);
    }

    let receipt = processor
        .log_feedback(entry, email)
        .await
        .context("Failed to log feedback")?;
    for warning in &receipt.warnings {
        eprintln!("warning: {}", warning);
    }
    println!("Logged {} feedback for '{}'.", feedback, strain);

    // Scoring is a separate, explicit step: journaling an entry does not
    // imply it should shift the ranking.
    if !skip_score {
        let new_score = processor
            .adjust_reinforcement(email, strain, sign)
            .await
            .context("Failed to adjust reinforcement score")?;
        println!("Reinforcement score for '{}' is now {:.2}.", strain, new_score);
    }

    Ok(())
}
