//! 4.B Stats Recorder.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;
use time::OffsetDateTime;
use tokio::time::Instant as TokioInstant;

const RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Default)]
struct StatsState {
    request_counts: HashMap<String, u64>,
    request_times: HashMap<String, f64>,
    ip_counts: HashMap<String, HashMap<String, u64>>,
    request_arrivals: HashMap<String, Vec<OffsetDateTime>>,
    channel_success_counts: HashMap<String, u64>,
    channel_failure_counts: HashMap<String, u64>,
}

/// Wraps every request (excluding `exclude_paths`) and every dispatched
/// upstream attempt. A single mutex guards all four per-endpoint maps plus
/// the two channel counters, matching spec.md §3's invariant that they are
/// updated under one critical section.
pub struct StatsRecorder {
    state: Mutex<StatsState>,
    exclude_paths: Vec<String>,
    filename: PathBuf,
    save_interval: Duration,
    last_saved: Mutex<Option<TokioInstant>>,
}

#[derive(Debug, Serialize)]
pub struct StatsSnapshot {
    pub request_counts: HashMap<String, u64>,
    pub request_times: HashMap<String, f64>,
    pub ip_counts: HashMap<String, HashMap<String, u64>>,
    #[serde(with = "arrivals_as_rfc3339")]
    pub request_arrivals: HashMap<String, Vec<OffsetDateTime>>,
    pub channel_success_counts: HashMap<String, u64>,
    pub channel_failure_counts: HashMap<String, u64>,
    pub channel_success_percentages: Vec<(String, f64)>,
    pub channel_failure_percentages: Vec<(String, f64)>,
}

mod arrivals_as_rfc3339 {
    use super::*;
    use serde::Serializer;
    use serde::ser::SerializeMap;

    pub fn serialize<S: Serializer>(
        value: &HashMap<String, Vec<OffsetDateTime>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(value.len()))?;
        for (endpoint, timestamps) in value {
            let rendered: Vec<String> = timestamps
                .iter()
                .map(|t| {
                    t.format(&time::format_description::well_known::Rfc3339)
                        .unwrap_or_default()
                })
                .collect();
            map.serialize_entry(endpoint, &rendered)?;
        }
        map.end()
    }
}

impl StatsRecorder {
    pub fn new(filename: impl Into<PathBuf>, save_interval: Duration) -> Self {
        Self {
            state: Mutex::new(StatsState::default()),
            exclude_paths: vec!["/stats".to_string(), "/generate-api-key".to_string()],
            filename: filename.into(),
            save_interval,
            last_saved: Mutex::new(None),
        }
    }

    /// Records one client-HTTP request. `process_time` is wall time spent
    /// inside the handler, measured by the caller around the suspension
    /// points per spec.md §5.
    pub fn record_request(
        &self,
        method: &str,
        path: &str,
        client_ip: &str,
        process_time: Duration,
        arrival: OffsetDateTime,
    ) {
        if self.exclude_paths.iter().any(|p| p == path) {
            return;
        }
        let endpoint = format!("{method} {path}");
        let mut state = self.state.lock().expect("stats mutex poisoned");
        *state.request_counts.entry(endpoint.clone()).or_default() += 1;
        *state.request_times.entry(endpoint.clone()).or_default() += process_time.as_secs_f64();
        *state
            .ip_counts
            .entry(endpoint.clone())
            .or_default()
            .entry(client_ip.to_string())
            .or_default() += 1;
        state
            .request_arrivals
            .entry(endpoint)
            .or_default()
            .push(arrival);
    }

    /// Updated by the Dispatch Loop, not by the request wrapper, so these
    /// reflect upstream outcomes rather than client-HTTP outcomes.
    pub fn record_channel_success(&self, provider: &str) {
        let mut state = self.state.lock().expect("stats mutex poisoned");
        *state
            .channel_success_counts
            .entry(provider.to_string())
            .or_default() += 1;
    }

    pub fn record_channel_failure(&self, provider: &str) {
        let mut state = self.state.lock().expect("stats mutex poisoned");
        *state
            .channel_failure_counts
            .entry(provider.to_string())
            .or_default() += 1;
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let state = self.state.lock().expect("stats mutex poisoned");
        build_snapshot(&state)
    }

    /// Persists the snapshot atomically (write-temp-then-rename) so readers
    /// never observe a partial file.
    pub async fn persist(&self) -> std::io::Result<()> {
        let snapshot = self.snapshot();
        let body = serde_json::to_string_pretty(&snapshot).unwrap_or_default();
        write_atomic(&self.filename, &body).await
    }

    /// Drops timestamps older than 24h from `request_arrivals`; when an
    /// endpoint's arrival list becomes empty, deletes it from all four maps
    /// in one critical section (spec.md §3 invariant).
    pub fn cleanup(&self, now: OffsetDateTime) {
        let cutoff = now - RETENTION;
        let mut state = self.state.lock().expect("stats mutex poisoned");
        let mut to_delete = Vec::new();
        for (endpoint, arrivals) in state.request_arrivals.iter_mut() {
            arrivals.retain(|t| *t > cutoff);
            if arrivals.is_empty() {
                to_delete.push(endpoint.clone());
            }
        }
        for endpoint in to_delete {
            state.request_arrivals.remove(&endpoint);
            state.request_counts.remove(&endpoint);
            state.request_times.remove(&endpoint);
            state.ip_counts.remove(&endpoint);
        }
    }

    /// Periodic task body: sleep, then guard-and-persist-and-cleanup. The
    /// guard tolerates scheduler jitter — if a prior save landed less than
    /// `save_interval` ago, this tick is skipped entirely.
    pub async fn run_periodic(&self) {
        loop {
            tokio::time::sleep(self.save_interval).await;
            self.save_if_due().await;
            self.cleanup(OffsetDateTime::now_utc());
        }
    }

    async fn save_if_due(&self) {
        let now = TokioInstant::now();
        {
            let mut last = self.last_saved.lock().expect("stats mutex poisoned");
            if let Some(prev) = *last
                && now.duration_since(prev) < self.save_interval
            {
                return;
            }
            *last = Some(now);
        }
        if let Err(err) = self.persist().await {
            tracing::warn!(event = "stats_persist_failed", error = %err, "failed to persist stats snapshot");
            return;
        }
        tracing::info!(event = "stats_snapshot_persisted", file = %self.filename.display());
    }

    /// Invoked once on shutdown regardless of the periodic guard.
    pub async fn persist_final(&self) {
        if let Err(err) = self.persist().await {
            tracing::warn!(event = "stats_persist_failed", error = %err, "failed final stats persist");
        }
    }
}

fn build_snapshot(state: &StatsState) -> StatsSnapshot {
    StatsSnapshot {
        request_counts: state.request_counts.clone(),
        request_times: state.request_times.clone(),
        ip_counts: state.ip_counts.clone(),
        request_arrivals: state.request_arrivals.clone(),
        channel_success_counts: state.channel_success_counts.clone(),
        channel_failure_counts: state.channel_failure_counts.clone(),
        channel_success_percentages: percentages(
            &state.channel_success_counts,
            &state.channel_failure_counts,
        ),
        channel_failure_percentages: percentages(
            &state.channel_failure_counts,
            &state.channel_success_counts,
        ),
    }
}

fn percentages(primary: &HashMap<String, u64>, other: &HashMap<String, u64>) -> Vec<(String, f64)> {
    let mut out: Vec<(String, f64)> = primary
        .iter()
        .map(|(channel, count)| {
            let total = count + other.get(channel).copied().unwrap_or(0);
            let pct = if total > 0 {
                *count as f64 / total as f64 * 100.0
            } else {
                0.0
            };
            (channel.clone(), pct)
        })
        .collect();
    out.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    out
}

async fn write_atomic(path: &Path, contents: &str) -> std::io::Result<()> {
    let tmp_path = path.with_extension("json.tmp");
    tokio::fs::write(&tmp_path, contents).await?;
    tokio::fs::rename(&tmp_path, path).await
}
