//! # Query Registry Workload Runner
//!
//! Drives a simulated workload through the registry using the scripted
//! executor, then prints the final state of every query.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin query-registry -- --queries 20 --rows 50 --delay-ms 200
//!
//! # Every 4th query fails, small row cap, JSON trace output to a file
//! QR_TRACE=1 QR_TRACE_JSON=1 QR_TRACE_FILE=qr.log \
//!     cargo run --bin query-registry -- --fail-every 4 --max-inline-rows 10
//! ```

use std::env;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use query_registry::config::LoggingConfig;
use query_registry::executor::numbered_rows;
use query_registry::{
    Config, ExecutorError, Pruner, QueryOptions, QueryRegistry, Script, ScriptedExecutor,
};

static TRACE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "query-registry", about = "Run a simulated query workload")]
struct Args {
    /// Configuration file (defaults to query-registry.toml + local overrides)
    #[arg(long)]
    config: Option<String>,

    /// Number of queries to submit
    #[arg(long, default_value_t = 10)]
    queries: usize,

    /// Rows produced by each query
    #[arg(long, default_value_t = 25)]
    rows: usize,

    /// Simulated executor latency before the first row
    #[arg(long, default_value_t = 100)]
    delay_ms: u64,

    /// Make every Nth query fail (0 = never)
    #[arg(long, default_value_t = 0)]
    fail_every: usize,

    /// Per-query executor timeout in seconds
    #[arg(long)]
    timeout_secs: Option<f64>,

    /// Per-query row buffer cap
    #[arg(long)]
    max_inline_rows: Option<usize>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("failed to load configuration from {path}"))?,
        None => Config::load().unwrap_or_else(|_| {
            eprintln!("Using default configuration");
            Config::default()
        }),
    };
    init_tracing(&config.logging);

    let executor = Arc::new(build_executor(&args));
    let registry = Arc::new(
        QueryRegistry::new(config.registry.clone(), executor.clone())
            .context("failed to create query registry")?,
    );
    let pruner = Pruner::from_config(Arc::clone(&registry));

    let options = QueryOptions {
        query_timeout: args.timeout_secs,
        max_inline_rows: args.max_inline_rows,
        poll_interval: None,
    };
    let mut ids = Vec::with_capacity(args.queries);
    for i in 0..args.queries {
        let id = registry
            .execute_query(&format!("SELECT {i}"), options.clone())
            .with_context(|| format!("failed to submit query {i}"))?;
        ids.push(id);
    }
    println!("Submitted {} queries", ids.len());

    // Poll until every submitted query has settled, honouring the advisory interval
    loop {
        let snapshots = registry.list_queries(None);
        let running = snapshots.iter().filter(|s| !s.status.is_terminal()).count();
        if running == 0 {
            break;
        }
        let wait = snapshots
            .iter()
            .map(|s| s.poll_interval_secs)
            .fold(f64::INFINITY, f64::min);
        println!("{running} running...");
        tokio::time::sleep(Duration::from_secs_f64(wait.clamp(0.01, 60.0))).await;
    }

    println!();
    for snapshot in registry.list_queries(None) {
        let error = snapshot
            .error
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default();
        println!(
            "{:<36}  {:<12} {:<10} rows={:<6} truncated={:<5} {}",
            snapshot.query_id,
            snapshot.sql,
            snapshot.status,
            snapshot.row_count,
            snapshot.truncated,
            error
        );
    }

    let stats = registry.stats();
    println!();
    println!(
        "total={} completed={} failed={} cancelled={} running={}",
        stats.total_queries, stats.completed, stats.failed, stats.cancelled, stats.running
    );
    println!("executor calls={} rows pulled={}", executor.executions(), executor.rows_pulled());

    if let Some(pruner) = pruner {
        pruner.shutdown().await;
    }
    registry.close().await;
    Ok(())
}

fn build_executor(args: &Args) -> ScriptedExecutor {
    let delay = Duration::from_millis(args.delay_ms);
    let executor = ScriptedExecutor::new();
    for i in 0..args.queries {
        let sql = format!("SELECT {i}");
        let script = if args.fail_every > 0 && (i + 1) % args.fail_every == 0 {
            Script::failing(ExecutorError::Operational(format!(
                "simulated failure for query {i}"
            )))
        } else {
            Script::rows(numbered_rows(args.rows))
        };
        executor.set_script(&sql, script.with_delay(delay));
    }
    executor
}

fn init_tracing(logging_config: &LoggingConfig) {
    // Environment variables take precedence over config file values
    let enabled = env::var("QR_TRACE").ok().is_some_and(|v| v != "0");
    if !enabled {
        return;
    }

    // Use QR_TRACE_JSON env var if set, otherwise fall back to config.logging.format
    let json = env::var("QR_TRACE_JSON")
        .ok()
        .map_or_else(|| logging_config.format == "json", |v| v != "0");

    // Use QR_TRACE_LEVEL env var if set, otherwise fall back to config.logging.level
    let level = env::var("QR_TRACE_LEVEL")
        .ok()
        .unwrap_or_else(|| logging_config.level.clone());

    let (non_blocking, guard) = match env::var("QR_TRACE_FILE") {
        Ok(log_path) => {
            let file = match std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&log_path)
            {
                Ok(f) => f,
                Err(e) => {
                    eprintln!("ERROR: Unable to open QR_TRACE_FILE '{log_path}': {e}");
                    return;
                }
            };
            tracing_appender::non_blocking(file)
        }
        Err(_) => tracing_appender::non_blocking(std::io::stderr()),
    };
    let _ = TRACE_GUARD.set(guard);

    let filter = tracing_subscriber::EnvFilter::try_new(level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let base = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_thread_names(true)
        .with_writer(non_blocking)
        .with_timer(tracing_subscriber::fmt::time::SystemTime);

    let subscriber: Box<dyn tracing::Subscriber + Send + Sync> = if json {
        Box::new(base.json().finish())
    } else {
        Box::new(base.compact().finish())
    };

    let _ = tracing::subscriber::set_global_default(subscriber);
}
