use clap::Parser;

/// CLI > ENV > default precedence via clap's `env` attribute, same pattern
/// as the teacher's `CliArgs` (`gproxy-core/src/bootstrap/mod.rs`).
#[derive(Debug, Clone, Parser)]
#[command(name = "gproxy", version, about = "Unifying reverse proxy for LLM and image-generation providers")]
pub struct CliArgs {
    /// Path to the providers/api_keys config file (JSON or YAML).
    #[arg(long, env = "GPROXY_CONFIG", default_value = "config.json")]
    pub config: String,

    #[arg(long, env = "GPROXY_HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, env = "GPROXY_PORT", default_value_t = 8787)]
    pub port: u16,

    #[arg(long, env = "GPROXY_STATS_FILE", default_value = "stats.json")]
    pub stats_file: String,

    #[arg(long, env = "GPROXY_STATS_SAVE_INTERVAL_SECS", default_value_t = 3600)]
    pub stats_save_interval: u64,
}

/// `TIMEOUT` is read directly rather than through clap, matching spec.md
/// §6's literal environment-variable interface.
pub fn read_timeout_override() -> std::time::Duration {
    std::env::var("TIMEOUT")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .map(std::time::Duration::from_secs)
        .unwrap_or(std::time::Duration::from_secs(20))
}
