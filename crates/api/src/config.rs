use imgproc_core::env;
use imgproc_core::upload::DEFAULT_MAX_UPLOAD_BYTES;

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `8080`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Deadline for draining the processing service on shutdown (default: `30`).
    pub shutdown_timeout_secs: u64,
    /// Upper bound on an upload request body (default: 10 MiB).
    pub max_upload_bytes: usize,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                 | Default                 |
    /// |-------------------------|-------------------------|
    /// | `HOST`                  | `0.0.0.0`               |
    /// | `PORT`                  | `8080`                  |
    /// | `CORS_ORIGINS`          | `http://localhost:5173` |
    /// | `REQUEST_TIMEOUT_SECS`  | `30`                    |
    /// | `SHUTDOWN_TIMEOUT_SECS` | `30`                    |
    /// | `MAX_UPLOAD_BYTES`      | `10485760`              |
    pub fn from_env() -> Self {
        Self {
            host: env::var_or("HOST", "0.0.0.0"),
            port: env::parse_or("PORT", 8080u16),
            cors_origins: env::list_or("CORS_ORIGINS", "http://localhost:5173"),
            request_timeout_secs: env::parse_or("REQUEST_TIMEOUT_SECS", 30u64),
            shutdown_timeout_secs: env::parse_or("SHUTDOWN_TIMEOUT_SECS", 30u64),
            max_upload_bytes: env::parse_or("MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            cors_origins: vec!["http://localhost:5173".to_string()],
            request_timeout_secs: 30,
            shutdown_timeout_secs: 30,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}
