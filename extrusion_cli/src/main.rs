mod analyze;
mod cli;
mod error_fmt;
mod predict;

use std::fs;
use std::path::Path;

use clap::Parser;
use extrusion_config::{Config, Logging};
use extrusion_core::error::AnalyticsError;
use extrusion_core::{AnnotatedReading, Settings, build_runner};
use extrusion_store::{JsonlStore, MemoryStore};
use serde_json::json;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use crate::cli::{Cli, Commands, FILE_GUARD, JSON_MODE};
use crate::error_fmt::{exit_code_for_error, format_error_json, humanize};

fn main() {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);
    let _ = color_eyre::install();

    if let Err(err) = run(cli) {
        if JSON_MODE.get().copied().unwrap_or(false) {
            eprintln!("{}", format_error_json(&err));
        } else {
            eprintln!("{}", humanize(&err));
        }
        tracing::debug!(error = ?err, "command failed");
        std::process::exit(exit_code_for_error(&err));
    }
}

fn run(cli: Cli) -> eyre::Result<()> {
    let cfg = load_config(cli.config.as_deref())?;
    init_tracing(&cfg.logging, cli.log_level.as_deref(), cli.json);
    let settings = Settings::from(&cfg);

    match cli.cmd {
        Commands::Analyze {
            input,
            store,
            batch_size,
            persist,
        } => {
            let mut settings = settings;
            settings.runner.persist |= persist;
            let batch_size = batch_size.unwrap_or(cfg.runner.batch_size);
            let docs = analyze::load_input(&input)?;
            let summary = if let Some(path) = store {
                let runner = build_runner(JsonlStore::<AnnotatedReading>::open(path), settings)?;
                analyze::run_analyze(&runner, docs, batch_size, cli.json)?
            } else {
                let runner = build_runner(MemoryStore::<AnnotatedReading>::new(), settings)?;
                analyze::run_analyze(&runner, docs, batch_size, cli.json)?
            };
            if cli.json {
                println!("{}", summary.to_json());
            } else {
                println!("{summary}");
            }
        }
        Commands::Predict {
            equipment,
            readings,
        } => {
            let out = predict::run_predict(settings.maintenance, &equipment, readings.as_deref())?;
            predict::print_assessments(&out, cli.json)?;
        }
        Commands::SelfCheck => {
            let runner = build_runner(MemoryStore::<AnnotatedReading>::new(), settings)?;
            let s = runner.settings();
            if cli.json {
                println!(
                    "{}",
                    json!({
                        "status": "ok",
                        "anomaly": {
                            "z_threshold": s.anomaly.z_threshold,
                            "mad_threshold": s.anomaly.mad_threshold,
                            "min_history": s.anomaly.min_history,
                            "outlier_quorum": s.anomaly.outlier_quorum,
                            "parameters": s.anomaly.parameters.len(),
                        },
                        "history": {
                            "capacity": s.history.capacity,
                            "fetch_limit": s.history.fetch_limit,
                            "in_flight_capacity": s.history.in_flight_capacity,
                        },
                        "runner": { "workers": s.runner.workers, "batch_size": cfg.runner.batch_size },
                        "maintenance": { "horizon_days": s.maintenance.horizon_days },
                    })
                );
            } else {
                println!("config ok");
                println!(
                    "anomaly: z {} / mad {} (ceiling {}), quorum {}, {} parameters, min history {}",
                    s.anomaly.z_threshold,
                    s.anomaly.mad_threshold,
                    s.anomaly.mad_ceiling,
                    s.anomaly.outlier_quorum,
                    s.anomaly.parameters.len(),
                    s.anomaly.min_history,
                );
                println!(
                    "history: capacity {}, fetch limit {}, in-flight {}",
                    s.history.capacity, s.history.fetch_limit, s.history.in_flight_capacity
                );
                println!(
                    "runner: {} workers, batch size {}; maintenance horizon {} days",
                    s.runner.workers, cfg.runner.batch_size, s.maintenance.horizon_days
                );
            }
        }
        Commands::Health => {
            build_runner(MemoryStore::<AnnotatedReading>::new(), settings)?;
            if cli.json {
                println!("{}", json!({ "status": "ok" }));
            } else {
                println!("ok");
            }
        }
    }
    Ok(())
}

/// Read, parse and validate the TOML config. Every failure is reported as a
/// configuration error so the exit code stays stable.
fn load_config(path: Option<&Path>) -> eyre::Result<Config> {
    let Some(path) = path else {
        return Ok(Config::default());
    };
    let text = fs::read_to_string(path)
        .map_err(|e| AnalyticsError::Config(format!("read {}: {e}", path.display())))?;
    let cfg: Config = toml::from_str(&text)
        .map_err(|e| AnalyticsError::Config(format!("parse {}: {e}", path.display())))?;
    cfg.validate()
        .map_err(|e| AnalyticsError::Config(e.to_string()))?;
    Ok(cfg)
}

/// Console logs go to stderr so stdout stays parseable in `--json` mode.
/// `RUST_LOG` wins over `--log-level`, which wins over `[logging].level`.
fn init_tracing(logging: &Logging, cli_level: Option<&str>, json: bool) {
    let level = cli_level
        .or(logging.level.as_deref())
        .unwrap_or("info")
        .to_string();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| level.into());

    let json_console = json.then(|| fmt::layer().json().with_writer(std::io::stderr));
    let text_console = (!json).then(|| fmt::layer().with_target(false).with_writer(std::io::stderr));

    let file_layer = logging.file.as_deref().map(|file| {
        let path = Path::new(file);
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let name = path
            .file_name()
            .map_or_else(|| "extrusion.log".into(), std::ffi::OsStr::to_os_string);
        let appender = match logging.rotation.as_deref() {
            Some("daily") => tracing_appender::rolling::daily(dir, name),
            Some("hourly") => tracing_appender::rolling::hourly(dir, name),
            _ => tracing_appender::rolling::never(dir, name),
        };
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let _ = FILE_GUARD.set(guard);
        fmt::layer().json().with_ansi(false).with_writer(writer)
    });

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(json_console)
        .with(text_console)
        .with(file_layer)
        .try_init();
}
