use envconfig::Envconfig;
use std::net::SocketAddr;
use std::time::Duration;

use crate::rate_limiter::AdmissionMode;

#[derive(Debug, Envconfig, Clone)]
pub struct Config {
    /// Server bind address
    #[envconfig(from = "BIND_ADDR", default = "127.0.0.1:3000")]
    pub bind_addr: SocketAddr,

    /// Model API endpoint
    #[envconfig(from = "MODEL_API_URL", default = "https://api.openai.com/v1/responses")]
    pub model_api_url: String,

    /// Request timeout for a single model call, in seconds
    #[envconfig(from = "MODEL_TIMEOUT_SECS", default = "300")]
    pub model_timeout_secs: u64,

    /// Per-credential requests-per-minute ceiling (headroom under the
    /// vendor's published 500)
    #[envconfig(from = "MODEL_RPM_PER_KEY", default = "480")]
    pub rpm_per_key: u32,

    /// Reject immediately with 429 when the window is full instead of
    /// blocking until a slot frees up
    #[envconfig(from = "MODEL_RPM_FAIL_FAST", default = "false")]
    pub rpm_fail_fast: bool,

    /// Advisory cap on total blocking wait in milliseconds; exceeding it
    /// logs a warning but never aborts the wait
    #[envconfig(from = "MODEL_RPM_MAX_DELAY_MS", default = "3600000")]
    pub rpm_max_delay_ms: u64,

    /// Cap on simultaneous in-flight model calls per credential; 0 disables
    #[envconfig(from = "MODEL_MAX_CONCURRENCY_PER_KEY", default = "20")]
    pub max_concurrency_per_key: u32,

    /// Maximum accepted upload size in bytes
    #[envconfig(from = "MAX_FILE_SIZE", default = "5242880")]
    pub max_file_size: usize,

    /// Maximum concurrently active jobs per owner
    #[envconfig(from = "MAX_JOBS_PER_USER", default = "1")]
    pub max_jobs_per_user: u32,

    /// Maximum concurrently active jobs per credential
    #[envconfig(from = "MAX_JOBS_PER_API_KEY", default = "20")]
    pub max_jobs_per_api_key: u32,

    /// Terminal jobs older than this many minutes are removed by cleanup
    #[envconfig(from = "JOB_CLEANUP_MINUTES", default = "60")]
    pub job_cleanup_minutes: u64,

    /// Cleanup task interval in seconds
    #[envconfig(from = "CLEANUP_INTERVAL_SECS", default = "3600")]
    pub cleanup_interval_secs: u64,

    /// Directory holding prompt template files
    #[envconfig(from = "PROMPTS_DIR", default = "prompts")]
    pub prompts_dir: String,

    /// Launch stagger between prompts in a batch extraction, in milliseconds
    #[envconfig(from = "PARALLEL_STAGGER_MS", default = "250")]
    pub parallel_stagger_ms: u64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, envconfig::Error> {
        Config::init_from_env()
    }

    pub fn admission_mode(&self) -> AdmissionMode {
        if self.rpm_fail_fast {
            AdmissionMode::FailFast
        } else {
            AdmissionMode::Block
        }
    }

    pub fn model_timeout(&self) -> Duration {
        Duration::from_secs(self.model_timeout_secs)
    }

    pub fn rpm_max_delay(&self) -> Duration {
        Duration::from_millis(self.rpm_max_delay_ms)
    }

    pub fn parallel_stagger(&self) -> Duration {
        Duration::from_millis(self.parallel_stagger_ms)
    }
}
