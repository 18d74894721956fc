use anyhow::{Context, Result};
use clap::Parser;
use libeventlog::{log_critical, LogLevel, LogOptions, LogRegistry};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Exercise a shared event log from several threads
#[derive(Parser, Debug)]
#[command(name = "eventlog_demo")]
struct Args {
    /// TOML file with an [eventlog] section
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log name, overrides the config file
    #[arg(short, long)]
    name: Option<String>,

    /// Output directory, overrides the config file
    #[arg(short, long)]
    directory: Option<PathBuf>,

    /// Number of writer threads
    #[arg(short, long, default_value_t = 10)]
    threads: usize,
}

fn load_options(args: &Args) -> Result<LogOptions> {
    let mut options = match &args.config {
        Some(path) => LogOptions::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => LogOptions::named("SimpleLog_Test.log"),
    };
    if let Some(name) = &args.name {
        options.name = name.clone();
    }
    if let Some(directory) = &args.directory {
        options.directory = directory.clone();
    }
    Ok(options)
}

// Each call takes its own reference to the same log and gives it back on return
fn nested_open(registry: &LogRegistry, options: &LogOptions, n: usize) -> Result<()> {
    let log = registry.acquire(options)?;
    log_critical!(log, "Single Test Success {}.", n);
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let options = load_options(&args)?;
    let registry = LogRegistry::new()?;

    let log = registry.acquire(&options)?;
    log.set_min_level(LogLevel::Warn);
    info!(path = ?log.current_path(), "writing to log");

    for n in 1..=4 {
        nested_open(&registry, &options, n)?;
    }

    let workers: Vec<_> = (0..args.threads)
        .map(|n| {
            let registry = registry.clone();
            let options = options.clone();
            thread::spawn(move || -> libeventlog::Result<()> {
                let log = registry.acquire(&options)?;
                // Stagger the threads so they finish out of order
                thread::sleep(Duration::from_millis(((n * 37) % 10 * 100) as u64));
                log_critical!(log, "Multi Test Success {}.", n);
                Ok(())
            })
        })
        .collect();

    for worker in workers {
        match worker.join() {
            Ok(result) => result?,
            Err(_) => anyhow::bail!("writer thread panicked"),
        }
    }

    log.critical("Logging Test Success.");
    drop(log);

    registry.close_all(true);
    info!("all logs closed");
    Ok(())
}
