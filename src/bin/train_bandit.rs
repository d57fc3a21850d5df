// src/bin/train_bandit.rs
use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use std::sync::Arc;

use recommender_lib::retrieval::corpus::StrainCorpus;
use recommender_lib::rl::feedback_processor::{
    count_unprocessed_journal_entries, process_journal_for_bandit,
};
use recommender_lib::rl::orchestrator::RlOrchestrator;
use recommender_lib::utils::db_connect::connect;
use recommender_lib::utils::env::load_env;

#[derive(Parser)]
#[command(author, version, about = "Replay journaled feedback into the bandit model", long_about = None)]
struct TrainArgs {
    /// Report what would be trained without saving the model
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    load_env();
    let args = TrainArgs::parse();

    info!("Starting bandit training cycle");
    let pool = connect().await.context("Failed to connect to database")?;

    let corpus = Arc::new(
        StrainCorpus::load_from_db(&pool)
            .await
            .context("Failed to load strain corpus")?,
    );
    if corpus.is_empty() {
        anyhow::bail!("Strain corpus is empty; nothing to train against");
    }

    let orchestrator = RlOrchestrator::load(&pool, corpus)
        .await
        .context("Failed to load bandit model")?;

    if args.dry_run {
        let pending = count_unprocessed_journal_entries(&pool)
            .await
            .context("Failed to count pending journal entries")?;
        println!(
            "Dry run: {} journal entries pending. Nothing applied, nothing saved.",
            pending
        );
        println!("{}", orchestrator.stats_display().await);
        return Ok(());
    }

    let stats = process_journal_for_bandit(&pool, &orchestrator)
        .await
        .context("Journal replay failed")?;

    println!(
        "Training cycle done: {} entries applied, {} skipped (no query snapshot), {} errors.",
        stats.processed_count, stats.skipped_no_embedding, stats.error_count
    );
    println!("{}", orchestrator.stats_display().await);

    if stats.processed_count > 0 {
        orchestrator
            .save_model(&pool)
            .await
            .context("Failed to save bandit model")?;
    } else {
        info!("No updates applied; keeping the existing model version.");
    }

    Ok(())
}
