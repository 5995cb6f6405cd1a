//! Process statistics for the callback sampler.
//!
//! Reads resident memory and open file descriptors from `/proc` (Linux
//! only; elsewhere those series are simply absent) and reports uptime.

use std::time::Instant;

use pulse::Observation;

/// Returns a sampling callback reporting this process's statistics.
pub fn process_sampler() -> impl Fn(u64) -> Vec<Observation> + Send + Sync + 'static {
    let started = Instant::now();
    move |now| {
        let mut observations = Vec::with_capacity(3);
        if let Some(rss) = read_rss_bytes() {
            observations.push(Observation::new(now, "process_rss_bytes", rss));
        }
        if let Some(fds) = read_open_fds() {
            observations.push(Observation::new(now, "process_open_fds", fds));
        }
        observations.push(Observation::new(
            now,
            "process_uptime_seconds",
            started.elapsed().as_secs_f64(),
        ));
        observations
    }
}

/// Reads the resident set size from `/proc/self/status`.
fn read_rss_bytes() -> Option<f64> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    let rest = status.lines().find_map(|line| line.strip_prefix("VmRSS:"))?;
    let kb: f64 = rest.trim().trim_end_matches("kB").trim().parse().ok()?;
    Some(kb * 1024.0)
}

/// Counts open file descriptors via `/proc/self/fd`.
#[allow(clippy::cast_precision_loss)]
fn read_open_fds() -> Option<f64> {
    let count = std::fs::read_dir("/proc/self/fd").ok()?.count();
    Some(count as f64)
}
