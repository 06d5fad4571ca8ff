//! # Pricewatch Main Entry Point
//!
//! Batch invocation: load configuration, build the engine, run the
//! pipeline once, write the artifacts, and exit with the contract
//! code.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use pricewatch::config::{AppConfig, ConfigLoader};
use pricewatch::error::{EXIT_CONFIG, EXIT_INTERNAL, EXIT_OK, PipelineError};
use pricewatch::pipeline::{Engine, fetch_summary};
use pricewatch::report::write_json;
use pricewatch::telemetry;

#[derive(Parser)]
#[command(name = "pricewatch")]
#[command(about = "B2B vendor pricing-intelligence pipeline")]
struct Cli {
    /// Path to the JSON configuration file.
    #[arg(short, long, default_value = "pricewatch.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline once and write the report artifacts (default).
    Run,
    /// Validate the configuration, dictionary, and keyword files.
    CheckConfig,
    /// Print the effective configuration as JSON.
    PrintConfig,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let env = match ConfigLoader::new().load() {
        Ok(env) => env,
        Err(err) => {
            eprintln!("pricewatch: {err}");
            return ExitCode::from(PipelineError::Config(err).exit_code() as u8);
        }
    };
    // A bad log filter is an operator input problem, same as any
    // other configuration error.
    if let Err(err) = telemetry::init_tracing(&env) {
        eprintln!("pricewatch: {err}");
        return ExitCode::from(EXIT_CONFIG as u8);
    }

    let config = if cli.config.exists() {
        match AppConfig::from_path(&cli.config) {
            Ok(config) => config,
            Err(err) => {
                eprintln!("pricewatch: {err}");
                return ExitCode::from(PipelineError::Config(err).exit_code() as u8);
            }
        }
    } else {
        info!(path = %cli.config.display(), "config file absent, using defaults");
        AppConfig::default()
    };

    match cli.command.unwrap_or(Commands::Run) {
        Commands::PrintConfig => match config.to_pretty_json() {
            Ok(json) => {
                println!("{json}");
                ExitCode::from(EXIT_OK as u8)
            }
            Err(err) => {
                eprintln!("pricewatch: {err}");
                ExitCode::from(EXIT_INTERNAL as u8)
            }
        },
        Commands::CheckConfig => match Engine::new(config, env) {
            Ok(_) => {
                println!("configuration ok");
                ExitCode::from(EXIT_OK as u8)
            }
            Err(err) => {
                eprintln!("pricewatch: {err}");
                ExitCode::from(err.exit_code() as u8)
            }
        },
        Commands::Run => run_once(config, env).await,
    }
}

async fn run_once(config: AppConfig, env: pricewatch::config::RuntimeEnv) -> ExitCode {
    let output_dir = config.report.output_dir.clone();
    let engine = match Engine::new(config, env) {
        Ok(engine) => engine,
        Err(err) => {
            eprintln!("pricewatch: {err}");
            return ExitCode::from(err.exit_code() as u8);
        }
    };

    // Ctrl-C propagates as cancellation; no artifacts on cancel.
    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            error!("interrupt received, cancelling run");
            signal_cancel.cancel();
        }
    });

    match engine.run(cancel).await {
        Ok(report) => {
            info!(
                sources = %fetch_summary(&report.run_stats),
                selected = report.run_stats.items_selected,
                llm_failed = report.run_stats.llm_failed,
                duration_ms = report.run_stats.duration_ms,
                "run complete"
            );
            match write_json(&report, &output_dir) {
                Ok(path) => {
                    println!("report written to {}", path.display());
                    ExitCode::from(EXIT_OK as u8)
                }
                Err(err) => {
                    let err = PipelineError::from(err);
                    eprintln!("pricewatch: {err}");
                    ExitCode::from(err.exit_code() as u8)
                }
            }
        }
        Err(err) => {
            eprintln!("pricewatch: {err}");
            ExitCode::from(err.exit_code() as u8)
        }
    }
}
