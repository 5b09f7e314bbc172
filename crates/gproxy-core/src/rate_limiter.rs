//! 4.A Rate Limiter: sliding-window per-key admission.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use gproxy_common::ConfigError;

/// Process-local sliding-window limiter. No external store, no cross-process
/// coordination (spec.md §9 "Single-instance rate limiter & stats").
#[derive(Debug, Default)]
pub struct RateLimiter {
    requests: Mutex<HashMap<String, Vec<f64>>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// `is_rate_limited(k, N, T)` at time `t`: drop stale entries, admit iff
    /// fewer than `limit` remain in the window, recording the admission.
    /// Never fails; over-limit is a reported boolean (spec.md §4.A).
    pub fn is_rate_limited(&self, key: &str, limit: u32, period_secs: u64) -> bool {
        self.is_rate_limited_at(key, limit, period_secs, now_secs())
    }

    fn is_rate_limited_at(&self, key: &str, limit: u32, period_secs: u64, now: f64) -> bool {
        let mut guard = self.requests.lock().expect("rate limiter mutex poisoned");
        let entry = guard.entry(key.to_string()).or_default();
        let cutoff = now - period_secs as f64;
        entry.retain(|&t| t > cutoff);
        if entry.len() as u32 >= limit {
            return true;
        }
        entry.push(now);
        false
    }
}

fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs_f64()
}

/// Parses `RATE_LIMIT` strings of the form `<count>/<unit>`. Carries the
/// original reference's full unit table (singular and plural forms beyond
/// spec.md's glossary) so an otherwise-valid existing config doesn't regress
/// into a `BadConfig` abort (see SPEC_FULL.md §11).
pub fn parse_rate_limit(raw: &str) -> Result<(u32, u64), ConfigError> {
    let (count_str, unit) = raw
        .split_once('/')
        .ok_or_else(|| ConfigError::BadRateLimit(raw.to_string()))?;
    let count: u32 = count_str
        .parse()
        .map_err(|_| ConfigError::BadRateLimit(raw.to_string()))?;
    let seconds = unit_seconds(unit).ok_or_else(|| ConfigError::BadRateLimit(raw.to_string()))?;
    Ok((count, seconds))
}

fn unit_seconds(unit: &str) -> Option<u64> {
    Some(match unit {
        "s" | "sec" | "second" | "seconds" => 1,
        "m" | "min" | "minute" | "minutes" => 60,
        "h" | "hr" | "hour" | "hours" => 3_600,
        "d" | "day" | "days" => 86_400,
        "mo" | "month" | "months" => 2_592_000,
        "y" | "year" | "years" => 31_536_000,
        _ => return None,
    })
}

/// Builds the rate-limiter key per spec.md §6: `"<client_ip>:<token>"`, or
/// bare `client_ip` if there is no token.
pub fn rate_limit_key(client_ip: &str, token: Option<&str>) -> String {
    match token {
        Some(token) => format!("{client_ip}:{token}"),
        None => client_ip.to_string(),
    }
}
