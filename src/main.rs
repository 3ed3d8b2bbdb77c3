//! pgcb - compare PostgreSQL client libraries on the same database.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pg_client_bench::bench::run_benchmarks;
use pg_client_bench::client::Library;
use pg_client_bench::config::persistence::ResultsStorage;
use pg_client_bench::config::{BenchmarkConfig, ConfigFile, MAX_ITERATIONS};
use pg_client_bench::error::{exit_code, user_friendly_message, EXIT_CASE_FAILED, EXIT_OK};
use pg_client_bench::report::{render, OutputFormat};
use pg_client_bench::workload::WorkloadKind;
use pg_client_bench::Result;

/// Benchmark sqlx and deadpool-postgres against the same PostgreSQL server
#[derive(Parser, Debug)]
#[command(name = "pgcb", version, about)]
struct Args {
    /// PostgreSQL connection URL
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    database_url: Option<String>,

    /// TOML config file (defaults to the user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Only run cases whose id contains this substring (repeatable)
    #[arg(short, long)]
    filter: Vec<String>,

    /// Iteration budget per case
    #[arg(short = 'n', long)]
    iterations: Option<u64>,

    /// Wall-clock limit per case, e.g. "30s"
    #[arg(short, long, value_parser = humantime::parse_duration)]
    duration: Option<Duration>,

    /// Concurrency levels for the concurrent workloads
    #[arg(long, value_delimiter = ',')]
    concurrency: Option<Vec<usize>>,

    /// Untimed invocations before each case
    #[arg(long)]
    warmup: Option<u64>,

    /// Maximum connections per library
    #[arg(long)]
    pool_size: Option<u32>,

    /// Server-side delay of the latency_read workload, e.g. "10ms"
    #[arg(long, value_parser = humantime::parse_duration)]
    latency_delay: Option<Duration>,

    /// Library to benchmark: sqlx or deadpool (repeatable)
    #[arg(short, long)]
    library: Vec<Library>,

    /// Report format: table, json or jsonl
    #[arg(long, default_value = "table")]
    format: OutputFormat,

    /// Write the report to a file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Append the report to the local history
    #[arg(long)]
    save: bool,

    /// Print the summaries of the last N saved runs and exit
    #[arg(long, value_name = "N")]
    history: Option<usize>,

    /// List the selected cases without connecting
    #[arg(long)]
    list: bool,

    /// Disable progress bars
    #[arg(long)]
    no_progress: bool,
}

impl Args {
    /// Defaults, then the config file, then the environment, then flags
    fn into_config(self) -> Result<BenchmarkConfig> {
        let file = match &self.config {
            Some(path) => Some(ConfigFile::read(path)?),
            None => ConfigFile::read_default()?,
        };
        let iterations_in_file = file.as_ref().is_some_and(|f| f.sets("iterations"));
        let mut config = file
            .map(|f| f.config)
            .unwrap_or_default()
            .apply_env();

        if let Some(url) = self.database_url {
            config = config.with_database_url(url);
        }
        if !self.filter.is_empty() {
            config = config.with_filter(self.filter);
        }
        if let Some(duration) = self.duration {
            config = config.with_duration(Some(duration));
            // An unset budget lets the deadline govern
            if self.iterations.is_none() && !iterations_in_file {
                config = config.with_iterations(MAX_ITERATIONS);
            }
        }
        if let Some(iterations) = self.iterations {
            config = config.with_iterations(iterations);
        }
        if let Some(levels) = self.concurrency {
            config = config.with_concurrency_levels(levels);
        }
        if let Some(warmup) = self.warmup {
            config = config.with_warmup_iterations(warmup);
        }
        if let Some(size) = self.pool_size {
            config = config.with_pool_size(size);
        }
        if let Some(delay) = self.latency_delay {
            config = config.with_latency_delay(delay);
        }
        if !self.library.is_empty() {
            config = config.with_libraries(self.library);
        }
        if self.no_progress {
            config = config.with_progress(false);
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pg_client_bench=info,pgcb=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let code = match run(Args::parse()).await {
        Ok(code) => code,
        Err(err) => {
            tracing::error!(error = %err, "benchmark run failed");
            eprintln!("{}", user_friendly_message(&err));
            exit_code(&err)
        }
    };
    ExitCode::from(code as u8)
}

async fn run(args: Args) -> Result<i32> {
    if let Some(count) = args.history {
        return print_history(count);
    }

    let format = args.format;
    let output = args.output.clone();
    let save = args.save;
    let list = args.list;
    let config = args.into_config()?;

    if list {
        for id in planned_case_ids(&config) {
            println!("{}", id);
        }
        return Ok(EXIT_OK);
    }

    config.validate()?;
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        database = %config.redacted_database_url(),
        libraries = ?config.libraries,
        iterations = config.iterations,
        duration = ?config.duration,
        "starting benchmark"
    );

    let report = run_benchmarks(config).await?;

    let rendered = render(&report, format)?;
    match output {
        Some(path) => {
            std::fs::write(&path, rendered)?;
            tracing::info!(path = %path.display(), "report written");
        }
        None => print!("{}", rendered),
    }

    if save {
        let storage = ResultsStorage::new()?;
        storage.append_result(report.clone())?;
        tracing::info!(path = %storage.get_results_path().display(), "report saved");
    }

    if report.has_failures() {
        Ok(EXIT_CASE_FAILED)
    } else {
        Ok(EXIT_OK)
    }
}

fn planned_case_ids(config: &BenchmarkConfig) -> Vec<String> {
    config
        .libraries
        .iter()
        .flat_map(|library| {
            WorkloadKind::all().iter().flat_map(move |kind| {
                kind.modes(&config.concurrency_levels)
                    .into_iter()
                    .map(move |mode| format!("{}/{}/{}", library, kind, mode))
            })
        })
        .filter(|id| config.selects_case(id))
        .collect()
}

fn print_history(count: usize) -> Result<i32> {
    let storage = ResultsStorage::new()?;
    let reports = storage.get_recent_results(count)?;
    if reports.is_empty() {
        println!("No saved runs in {}", storage.get_results_path().display());
        return Ok(EXIT_OK);
    }
    for report in reports {
        println!("{}", report.summary());
    }
    Ok(EXIT_OK)
}
