//! Treecast application settings
use std::time::Duration;

use crate::config_error;
use crate::error::Result;

pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const STANDARD_WORKERS: usize = 10;
pub const DEFAULT_WORKERS: &str = "10";
pub const STANDARD_RETRY_DELAY_MS: u64 = 2;
pub const DEFAULT_RETRY_DELAY_MS: &str = "2";
pub const STANDARD_QUEUE_CAPACITY: usize = 1024;
pub const DEFAULT_QUEUE_CAPACITY: &str = "1024";
pub const STANDARD_BRANCHING_FACTOR: usize = 4;
pub const DEFAULT_BRANCHING_FACTOR: &str = "4";
pub const STANDARD_RPC_TIMEOUT_MS: u64 = 1000;
pub const DEFAULT_RPC_TIMEOUT_MS: &str = "1000";

/// Settings for the delivery worker pool
#[derive(Clone, Debug)]
pub struct BroadcasterSettings {
    pub workers: usize,
    pub queue_capacity: usize,
    pub retry_delay: Duration,
    // None retries forever
    pub max_attempts: Option<u32>,
}

impl Default for BroadcasterSettings {
    fn default() -> Self {
        Self {
            workers: STANDARD_WORKERS,
            queue_capacity: STANDARD_QUEUE_CAPACITY,
            retry_delay: Duration::from_millis(STANDARD_RETRY_DELAY_MS),
            max_attempts: None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Settings {
    // Number of delivery workers
    pub workers: usize,

    // Pause between failed send attempts
    pub retry_delay_ms: u64,

    // Give up on a destination after this many attempts (unset: never)
    pub max_attempts: Option<u32>,

    // Bound on queued forwarding tasks
    pub queue_capacity: usize,

    // Children per node in the broadcast tree
    pub branching_factor: usize,

    // How long a send waits for the peer's acknowledgement
    pub rpc_timeout_ms: u64,

    // Emit logs as JSON
    pub log_json: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            workers: STANDARD_WORKERS,
            retry_delay_ms: STANDARD_RETRY_DELAY_MS,
            max_attempts: None,
            queue_capacity: STANDARD_QUEUE_CAPACITY,
            branching_factor: STANDARD_BRANCHING_FACTOR,
            rpc_timeout_ms: STANDARD_RPC_TIMEOUT_MS,
            log_json: false,
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(config_error!("workers must be at least 1"));
        }
        if self.queue_capacity == 0 {
            return Err(config_error!("queue capacity must be at least 1"));
        }
        if self.branching_factor == 0 {
            return Err(config_error!("branching factor must be at least 1"));
        }
        if self.rpc_timeout_ms == 0 {
            return Err(config_error!("rpc timeout must be at least 1ms"));
        }
        if self.max_attempts == Some(0) {
            return Err(config_error!("max attempts must be at least 1 when set"));
        }
        Ok(())
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }

    pub fn broadcaster_settings(&self) -> BroadcasterSettings {
        BroadcasterSettings {
            workers: self.workers,
            queue_capacity: self.queue_capacity,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
            max_attempts: self.max_attempts,
        }
    }
}
