//! Configuration for exposure-daemon.

use clap::Parser;
use std::path::PathBuf;

/// exposure-daemon - trigger adapter and retention sweeper for the
/// exposure-notification propagation engine.
#[derive(Parser, Debug, Clone)]
#[command(name = "exposure-daemon")]
#[command(about = "Polls pending reports, runs propagation, and sweeps retention")]
pub struct Config {
    /// Data directory for the persistent sled store
    #[arg(short, long, default_value = "./data/exposure-daemon")]
    pub data_dir: PathBuf,

    /// How often to poll `reports` for newly-created `pending` documents,
    /// standing in for the platform's on-create trigger delivery
    #[arg(long, default_value = "2")]
    pub poll_interval_secs: u64,

    /// Retention sweep interval in seconds (spec.md §4.11 names a daily
    /// `0 3 * * *` schedule; this is the daemon's internal tick, not a cron
    /// expression)
    #[arg(long, default_value = "3600")]
    pub retention_interval_secs: u64,

    /// Retention horizon in days
    #[arg(long, default_value = "180")]
    pub retention_days: i64,

    /// Page size for retention-sweep deletions
    #[arg(long, default_value = "500")]
    pub retention_page_size: usize,

    /// FCM v1 `:send` endpoint, e.g.
    /// `https://fcm.googleapis.com/v1/projects/<project>/messages:send`.
    /// When absent, pushes are logged and dropped rather than sent.
    #[arg(long, env = "EXPOSURE_FCM_ENDPOINT")]
    pub fcm_endpoint: Option<String>,

    /// Bearer token for the FCM endpoint (already-minted OAuth2 access
    /// token; minting it is outside this crate's scope)
    #[arg(long, env = "EXPOSURE_FCM_TOKEN")]
    pub fcm_token: Option<String>,

    /// Log format (json or pretty)
    #[arg(long, default_value = "pretty")]
    pub log_format: String,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.poll_interval_secs == 0 {
            anyhow::bail!("poll-interval-secs must be positive");
        }
        if self.retention_interval_secs == 0 {
            anyhow::bail!("retention-interval-secs must be positive");
        }
        if self.fcm_token.is_some() != self.fcm_endpoint.is_some() {
            anyhow::bail!("fcm-endpoint and fcm-token must be set together");
        }
        Ok(())
    }
}
