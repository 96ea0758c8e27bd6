use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Worker configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub openai_api_key: Option<String>,
    pub openai_model: Option<String>,
    pub object_store_root: PathBuf,
    pub job_store_dir: PathBuf,
    pub database_url: Option<String>,
    pub metadata_url: String,
    pub webhook_url: String,
    pub memory_ceiling_bytes: Option<u64>,
    pub poll_interval: Duration,
    pub classifier_rps: u32,
    pub worker_id: Option<String>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Ok(Self {
            openai_api_key: env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty()),
            openai_model: env::var("OPENAI_MODEL").ok(),
            object_store_root: env::var("OBJECT_STORE_ROOT")
                .context("OBJECT_STORE_ROOT must be set")?
                .into(),
            job_store_dir: env::var("JOB_STORE_DIR")
                .unwrap_or_else(|_| "./rfi-jobs".to_string())
                .into(),
            database_url: env::var("DATABASE_URL").ok(),
            metadata_url: env::var("METADATA_URL").context("METADATA_URL must be set")?,
            webhook_url: env::var("WEBHOOK_URL").context("WEBHOOK_URL must be set")?,
            memory_ceiling_bytes: env::var("MEMORY_CEILING_MB")
                .ok()
                .map(|mb| mb.parse::<u64>())
                .transpose()
                .context("MEMORY_CEILING_MB must be a valid number")?
                .map(|mb| mb * 1024 * 1024),
            poll_interval: Duration::from_secs(
                env::var("POLL_INTERVAL_SECS")
                    .unwrap_or_else(|_| "30".to_string())
                    .parse()
                    .context("POLL_INTERVAL_SECS must be a valid number")?,
            ),
            classifier_rps: env::var("CLASSIFIER_RPS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .context("CLASSIFIER_RPS must be a valid number")?,
            worker_id: env::var("WORKER_ID").ok(),
        })
    }
}
