//! Demo process for the pulse telemetry pipeline.
//!
//! Starts a publisher, instruments itself (process statistics, HTTP
//! request count and latency), and serves the retained series over HTTP:
//!
//! ```text
//! pulse --port 8888 --interval 1s --window 1m --window 5m --log
//! curl localhost:8888/
//! curl 'localhost:8888/series?q=process_rss_bytes&q=process_rss_bytes:1M_AVG'
//! ```
//!
//! Log verbosity follows `RUST_LOG` (default `info`); diagnostics go to
//! stderr so `--log` output on stdout stays machine-readable.

mod http;
mod stats;

use std::net::TcpListener;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use pulse::{Factory, LogSink, PipelineConfig, Publisher};
use tracing_subscriber::EnvFilter;

/// pulse — In-process telemetry pipeline demo.
#[derive(Parser)]
#[command(name = "pulse", version, about)]
struct Cli {
    /// Port for the HTTP query API.
    #[arg(long, default_value = "8888")]
    port: u16,

    /// JSON configuration file. Flags below override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Sampling interval (e.g. "1s", "500ms"); "0s" disables sampling.
    #[arg(long, value_parser = parse_duration)]
    interval: Option<Duration>,

    /// Summarizer window (e.g. "1m"); repeat for several windows.
    #[arg(long = "window", value_parser = parse_duration)]
    windows: Vec<Duration>,

    /// Observations kept per series.
    #[arg(long)]
    keep: Option<usize>,

    /// Also write every observation to stdout.
    #[arg(long)]
    log: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(&cli) {
        tracing::error!("pulse failed: {e}");
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = build_config(cli)?;

    let publisher = Publisher::new(config.publisher())?;
    let sink = if cli.log { Some(LogSink::stdout()?) } else { None };

    let mut factory = Factory::new(&config)?.with_receiver(&publisher);
    if let Some(sink) = &sink {
        factory.add_receiver(sink);
    }

    let _process = factory.callback_sampler("process", stats::process_sampler())?;
    let api = http::Api::new(
        publisher.client(),
        factory.counter("pulse_http_requests")?,
        factory.recorder("pulse_http_latency_ms")?,
    );

    let listener = TcpListener::bind(("0.0.0.0", cli.port))?;
    tracing::info!(
        port = cli.port,
        interval = ?config.sampling_interval,
        windows = ?config.summarizer_windows,
        keep = config.retention_keep,
        "serving series at {}",
        config.base_url
    );
    api.serve(&listener);
    Ok(())
}

/// Loads the config file (or defaults) and applies command-line overrides.
fn build_config(cli: &Cli) -> pulse::Result<PipelineConfig> {
    let mut config = match &cli.config {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };

    if let Some(interval) = cli.interval {
        config.sampling_interval = interval;
    }
    if !cli.windows.is_empty() {
        config.summarizer_windows.clone_from(&cli.windows);
    }
    if let Some(keep) = cli.keep {
        config.retention_keep = keep;
    }
    if config.base_url.is_empty() {
        config.base_url = format!("http://localhost:{}", cli.port);
    }

    config.validate()?;
    Ok(config)
}

/// Parses a human-readable duration such as "250ms", "30s", "5m", "1h".
fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    let split = s
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| format!("missing unit in '{s}'. Use ms, s, m, or h."))?;
    let (num_str, unit) = s.split_at(split);
    let num: u64 = num_str
        .parse()
        .map_err(|e| format!("invalid number in '{s}': {e}"))?;

    match unit {
        "ms" => Ok(Duration::from_millis(num)),
        "s" => Ok(Duration::from_secs(num)),
        "m" => Ok(Duration::from_secs(num.saturating_mul(60))),
        "h" => Ok(Duration::from_secs(num.saturating_mul(3600))),
        _ => Err(format!("unknown duration unit '{unit}'. Use ms, s, m, or h.")),
    }
}
