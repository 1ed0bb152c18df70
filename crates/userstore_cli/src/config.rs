use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use userstore_api::DEFAULT_DEACTIVATE_DOMAIN;

#[derive(Parser, Debug, Clone)]
#[command(name = "userstore", version, about = "CRUD and stats HTTP service over users")]
pub struct Cli {
    /// TCP port to listen on.
    #[arg(long, default_value_t = 3001, env = "USERSTORE_PORT")]
    pub port: u16,

    /// SQLite database file, or `:memory:`.
    #[arg(long, default_value = "userstore.db", env = "USERSTORE_DB_PATH")]
    pub db_path: PathBuf,

    /// trace|debug|info|warn|error. Defaults by build mode.
    #[arg(long, env = "USERSTORE_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Absolute directory for rotated log files; stderr only when unset.
    #[arg(long, env = "USERSTORE_LOG_DIR")]
    pub log_dir: Option<String>,

    /// Email domain deactivated by `PUT /users/batch`.
    #[arg(long, default_value = DEFAULT_DEACTIVATE_DOMAIN, env = "USERSTORE_DEACTIVATE_DOMAIN")]
    pub deactivate_domain: String,

    /// Per-request store call timeout in milliseconds.
    #[arg(long, default_value_t = 5000, env = "USERSTORE_REQUEST_TIMEOUT_MS")]
    pub request_timeout_ms: u64,
}

impl Cli {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}
