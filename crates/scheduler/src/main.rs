#![forbid(unsafe_code)]

use cms_engine::config::env_var;
use cms_engine::{AppConfig, CancellationToken, PublishEngine, StaticContentTypes, SystemClock};
use cms_scheduler::SchedulerRunner;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Default)]
struct CliArgs {
    config: Option<PathBuf>,
    storage_dir: Option<PathBuf>,
    poll_ms: Option<u64>,
    once: bool,
}

fn usage() -> &'static str {
    "cms_scheduler: run due publish/unpublish schedule entries\n\n\
USAGE:\n\
  cms_scheduler [--config PATH] [--storage-dir DIR] [--poll-ms MS] [--once]\n\n\
NOTES:\n\
  - config is YAML; CMS_* environment variables override it, flags override both.\n\
  - `--once` runs a single tick and exits.\n\
  - log filter: RUST_LOG, else `log_level` from the config.\n"
}

fn parse_args() -> Result<CliArgs, String> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    if args.iter().any(|a| a == "-h" || a == "--help") {
        print!("{}", usage());
        std::process::exit(0);
    }

    let mut out = CliArgs {
        config: env_var("CMS_CONFIG").map(PathBuf::from),
        ..CliArgs::default()
    };
    let mut i = 0usize;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                i += 1;
                let v = args.get(i).ok_or("--config requires PATH")?;
                out.config = Some(PathBuf::from(v));
            }
            "--storage-dir" => {
                i += 1;
                let v = args.get(i).ok_or("--storage-dir requires DIR")?;
                out.storage_dir = Some(PathBuf::from(v));
            }
            "--poll-ms" => {
                i += 1;
                let v = args.get(i).ok_or("--poll-ms requires MS")?;
                out.poll_ms = Some(
                    v.parse::<u64>()
                        .map_err(|_| "--poll-ms must be an integer (milliseconds)")?,
                );
            }
            "--once" => out.once = true,
            other => return Err(format!("unknown argument: {other}\n\n{}", usage())),
        }
        i += 1;
    }
    Ok(out)
}

fn load_config(args: &CliArgs) -> Result<AppConfig, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };
    config.apply_env()?;
    if let Some(dir) = &args.storage_dir {
        config.storage_dir = dir.clone();
    }
    if let Some(poll_ms) = args.poll_ms {
        config.scheduler.poll_ms = poll_ms;
    }
    config.validate()?;
    Ok(config)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = match parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(2);
        }
    };
    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("cms_scheduler: {e}");
            std::process::exit(2);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str())),
        )
        .with_writer(std::io::stderr)
        .init();

    let content_types = StaticContentTypes::from_config(&config)?;
    let engine = PublishEngine::open(
        &config.storage_dir,
        config.engine.clone(),
        Arc::new(content_types),
        Arc::new(SystemClock),
    )?;
    let runner = SchedulerRunner::new(Arc::new(engine), &config.scheduler);
    tracing::info!(
        storage_dir = %config.storage_dir.display(),
        poll_ms = config.scheduler.poll_ms,
        once = args.once,
        "scheduler started"
    );

    let cancel = CancellationToken::new();
    if args.once {
        runner.tick(&cancel)?;
        return Ok(());
    }
    runner.run(Duration::from_millis(config.scheduler.poll_ms), &cancel);
    Ok(())
}
