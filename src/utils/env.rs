// src/utils/env.rs
use log::{debug, info};

/// Loads variables from a `.env` file into the process environment.
/// Missing file is fine; system environment always wins.
pub fn load_env() {
    match dotenv::dotenv() {
        Ok(path) => info!("Loaded environment from {}", path.display()),
        Err(_) => debug!("No .env file found; using system environment variables."),
    }
}
