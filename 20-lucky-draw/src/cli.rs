use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;

use crate::keys::DEFAULT_PREFIX;
use crate::profile::GithubProvider;

/// Process configuration. Every flag can also be set through its environment variable.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Run the lucky draw service", long_about = None)]
pub struct Config {
    /// Socket address the HTTP API binds to. Use port 0 for an ephemeral port.
    #[arg(long, env = "LUCKY_DRAW_LISTEN", default_value = "127.0.0.1:8080")]
    pub listen: SocketAddr,

    /// Redis connection URL, e.g. redis://:password@localhost:6379/. Without
    /// it the draw is kept in process memory.
    #[arg(long, env = "REDIS_URL", hide_env_values = true)]
    pub redis_url: Option<String>,

    /// Password admins present as a bearer token. Admin routes stay closed when unset.
    #[arg(long, env = "PRIZE_DRAW_PASSWORD", hide_env_values = true)]
    pub admin_password: Option<String>,

    /// Prefix shared by every store key.
    #[arg(long, env = "LUCKY_DRAW_KEY_PREFIX", default_value = DEFAULT_PREFIX)]
    pub key_prefix: String,

    /// Base URL of the GitHub API used to resolve participants.
    #[arg(long, env = "GITHUB_API_URL", default_value = GithubProvider::DEFAULT_BASE_URL)]
    pub github_api: String,

    /// Optional GitHub token; raises the API rate limit.
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub github_token: Option<String>,

    /// Timeout for a single profile lookup, in milliseconds.
    #[arg(long, env = "PROVIDER_TIMEOUT_MS", default_value_t = 5_000)]
    pub provider_timeout_ms: u64,

    /// How long fetched profiles stay cached, in seconds.
    #[arg(long, env = "PROFILE_TTL_SECS", default_value_t = 3_600)]
    pub profile_ttl_secs: u64,

    /// Deadline for a whole HTTP request, in seconds.
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value_t = 10)]
    pub request_timeout_secs: u64,
}

impl Config {
    pub fn provider_timeout(&self) -> Duration {
        Duration::from_millis(self.provider_timeout_ms)
    }

    pub fn profile_ttl(&self) -> Duration {
        Duration::from_secs(self.profile_ttl_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
