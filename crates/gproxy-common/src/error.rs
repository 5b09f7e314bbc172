use std::path::PathBuf;

/// Startup-time failures. These abort the process with a non-zero exit
/// before any listener is bound.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path} as {format}: {message}")]
    Parse {
        path: PathBuf,
        format: &'static str,
        message: String,
    },
    #[error("config has no providers")]
    NoProviders,
    #[error("invalid rate limit string {0:?}")]
    BadRateLimit(String),
}
