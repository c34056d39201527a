//! access-mysql-migrate CLI - migrate MS Access files to MySQL.

use access_mysql_migrate::{Config, MigrateError, Orchestrator, RunTier};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{info, Level};

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

#[derive(Parser)]
#[command(name = "access-mysql-migrate")]
#[command(about = "Migrate legacy MS Access database files to MySQL")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the migration
    Run {
        /// Override the source root directory
        #[arg(long)]
        source_root: Option<PathBuf>,

        /// Override rows per chunk
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Override the per-table row ceiling
        #[arg(long)]
        row_ceiling: Option<u64>,

        /// Disable the periodic status renderer
        #[arg(long)]
        no_status: bool,

        /// Print the JSON report to stdout when done
        #[arg(long)]
        output_json: bool,
    },

    /// List the source files a run would pick up
    Discover {
        /// Override the source root directory
        #[arg(long)]
        source_root: Option<PathBuf>,
    },

    /// Test the MySQL connection
    HealthCheck,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(RunTier::Failure.exit_code())
        }
    }
}

async fn run() -> Result<ExitCode, MigrateError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format);

    let mut config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    match cli.command {
        Commands::Run {
            source_root,
            chunk_size,
            row_ceiling,
            no_status,
            output_json,
        } => {
            if let Some(root) = source_root {
                config.source.root_dir = root;
            }
            if let Some(size) = chunk_size {
                config.migration.chunk_size = size;
            }
            if let Some(ceiling) = row_ceiling {
                config.migration.row_ceiling = ceiling;
            }
            if no_status {
                config.migration.status_renderer = false;
            }
            config.validate()?;

            let cancel = setup_signal_handler();
            let orchestrator = Orchestrator::new(config).await?;
            let report = orchestrator.run(cancel).await?;

            if output_json {
                println!("{}", report.to_json()?);
            } else {
                println!("\n{}", report.render_summary());
            }

            Ok(ExitCode::from(report.tier().exit_code()))
        }

        Commands::Discover { source_root } => {
            if let Some(root) = source_root {
                config.source.root_dir = root;
            }
            let files = Orchestrator::discover_source_files(
                &config.source.root_dir,
                &config.source.extensions,
            );
            println!(
                "Found {} source files under {}",
                files.len(),
                config.source.root_dir.display()
            );
            for file in files {
                println!("  {}", file.display());
            }
            Ok(ExitCode::SUCCESS)
        }

        Commands::HealthCheck => {
            let orchestrator = Orchestrator::new(config).await?;
            drop(orchestrator);
            println!("MySQL connection OK");
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn setup_logging(verbosity: &str, format: &str) {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

/// Setup signal handlers for graceful shutdown.
/// Handles both SIGINT (Ctrl-C) and SIGTERM; the returned token is
/// cancelled when either fires and the pipeline stops between chunks.
#[cfg(unix)]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();

    let token_int = cancel_token.clone();
    tokio::spawn(async move {
        let mut sigint = signal(SignalKind::interrupt()).expect("Failed to setup SIGINT handler");
        sigint.recv().await;
        eprintln!("\nReceived SIGINT. Shutting down gracefully...");
        token_int.cancel();
    });

    let token_term = cancel_token.clone();
    tokio::spawn(async move {
        let mut sigterm = signal(SignalKind::terminate()).expect("Failed to setup SIGTERM handler");
        sigterm.recv().await;
        eprintln!("\nReceived SIGTERM. Shutting down gracefully...");
        token_term.cancel();
    });

    cancel_token
}

/// Setup signal handler for Windows (only Ctrl-C).
#[cfg(not(unix))]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to setup Ctrl-C handler");
        eprintln!("\nReceived Ctrl-C. Shutting down gracefully...");
        token.cancel();
    });

    cancel_token
}
