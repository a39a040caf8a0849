//! CLI for this application
//!
use crate::error::Result;
use crate::settings;

#[derive(Clone, Debug, clap::Parser)]
#[clap(name = settings::APP_NAME, version = settings::APP_VERSION)]
pub struct Cli {
    // Delivery worker pool size
    #[clap(
        long,
        default_value = settings::DEFAULT_WORKERS,
        env("TREECAST_WORKERS"),
        help = "Number of concurrent delivery workers"
    )]
    pub workers: usize,

    // Retry backoff
    #[clap(
        long,
        default_value = settings::DEFAULT_RETRY_DELAY_MS,
        env("TREECAST_RETRY_DELAY_MS"),
        help = "Milliseconds to wait between failed send attempts"
    )]
    pub retry_delay_ms: u64,

    // Retry cap
    #[clap(
        long,
        env("TREECAST_MAX_ATTEMPTS"),
        help = "Give up on a destination after this many attempts. Retries forever if unset."
    )]
    pub max_attempts: Option<u32>,

    // Forwarding queue bound
    #[clap(
        long,
        default_value = settings::DEFAULT_QUEUE_CAPACITY,
        env("TREECAST_QUEUE_CAPACITY"),
        help = "Maximum number of queued forwarding tasks"
    )]
    pub queue_capacity: usize,

    // Tree shape
    #[clap(
        long,
        default_value = settings::DEFAULT_BRANCHING_FACTOR,
        env("TREECAST_BRANCHING_FACTOR"),
        help = "Children per node in the broadcast tree"
    )]
    pub branching_factor: usize,

    // Per-send acknowledgement timeout
    #[clap(
        long,
        default_value = settings::DEFAULT_RPC_TIMEOUT_MS,
        env("TREECAST_RPC_TIMEOUT_MS"),
        help = "Milliseconds to wait for a peer to acknowledge a forwarded broadcast"
    )]
    pub rpc_timeout_ms: u64,

    #[clap(long, env("TREECAST_LOG_JSON"), help = "Write logs to stderr as JSON")]
    pub log_json: bool,
}

impl Cli {
    pub fn into_settings(self) -> Result<settings::Settings> {
        let settings = settings::Settings {
            workers: self.workers,
            retry_delay_ms: self.retry_delay_ms,
            max_attempts: self.max_attempts,
            queue_capacity: self.queue_capacity,
            branching_factor: self.branching_factor,
            rpc_timeout_ms: self.rpc_timeout_ms,
            log_json: self.log_json,
        };
        settings.validate()?;
        Ok(settings)
    }
}
