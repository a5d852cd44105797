//! certsvc - certificate record service entry point

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use certsvc_common::SystemClock;
use certsvc_config::{validate, Config, ValidationOpts, ValidationResult, ValidationWarning};
use certsvc_server::{http, App};

/// certsvc - short-lived certificate records for domain names
#[derive(Parser, Debug)]
#[command(name = "certsvc")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path
    #[arg(short = 'c', long = "config", env = "CERTSVC_CONFIG")]
    config: Option<String>,

    /// Test configuration and exit
    #[arg(short = 't', long = "test")]
    test: bool,

    /// Enable verbose logging (debug level)
    #[arg(long = "verbose")]
    verbose: bool,

    /// Log output format
    #[arg(long = "log-format", env = "CERTSVC_LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,

    /// Listen address, overriding the configuration file
    #[arg(long = "listen", env = "CERTSVC_LISTEN")]
    listen: Option<String>,

    /// Backend URL, overriding the configuration file
    #[arg(long = "backend-url", env = "CERTSVC_BACKEND_URL")]
    backend_url: Option<String>,

    /// Issuance delay in seconds, overriding the configuration file
    #[arg(long = "issue-delay-secs", env = "CERTSVC_ISSUE_DELAY_SECS")]
    issue_delay_secs: Option<u64>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate configuration and exit
    Test {
        /// Also check that the backend host accepts connections
        #[arg(long = "network")]
        network: bool,
    },
    /// Run the service (default)
    Run,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Pretty,
    Json,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_format);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;

    match cli.command {
        Some(Commands::Test { network }) => runtime.block_on(test_config(&cli, network)),
        _ if cli.test => runtime.block_on(test_config(&cli, false)),
        Some(Commands::Run) | None => runtime.block_on(run_server(&cli)),
    }
}

fn init_logging(verbose: bool, format: LogFormat) {
    let log_level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    match format {
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
    }
}

/// Load the configuration file (or defaults) and apply CLI overrides.
fn load_config(cli: &Cli) -> Result<(Config, Vec<String>)> {
    let (mut config, unknown) = match &cli.config {
        Some(path) => Config::from_file_with_unknown(path)
            .with_context(|| format!("Failed to load configuration file {}", path))?,
        None => {
            info!("No configuration specified, using defaults");
            (Config::default(), Vec::new())
        }
    };

    if let Some(listen) = &cli.listen {
        config.server.listen = listen.clone();
    }
    if let Some(url) = &cli.backend_url {
        config.backend.url = url.clone();
    }
    if let Some(delay) = cli.issue_delay_secs {
        config.issuance.issue_delay_secs = delay;
    }

    Ok((config, unknown))
}

fn report(result: &ValidationResult) {
    for warning in &result.warnings {
        warn!("{}", warning);
    }
    for error in &result.errors {
        error!("{}", error);
    }
}

fn with_unknown_nodes(mut result: ValidationResult, unknown: &[String]) -> ValidationResult {
    for name in unknown {
        result.add_warning(ValidationWarning::new(format!(
            "Unknown configuration node '{}' ignored",
            name
        )));
    }
    result
}

/// Validate configuration and exit
async fn test_config(cli: &Cli, network: bool) -> Result<()> {
    let (config, unknown) = load_config(cli)?;

    let result = validate::validate(&config, ValidationOpts { network }).await;
    let result = with_unknown_nodes(result, &unknown);
    report(&result);

    if result.has_errors() {
        anyhow::bail!(
            "Configuration validation failed with {} error(s)",
            result.errors.len()
        );
    }

    info!("Configuration test successful:");
    info!("  - listen {}", config.server.listen);
    info!("  - backend {}", config.backend.url);
    info!(
        "  - ttl {}s, issue delay {}s, identity {}",
        config.issuance.ttl_secs, config.issuance.issue_delay_secs, config.issuance.identity_domain
    );

    println!(
        "certsvc: configuration {} test is successful",
        cli.config.as_deref().unwrap_or("(defaults)")
    );
    println!("{}", config.to_json_pretty()?);

    Ok(())
}

/// Run the service until shutdown or identity renewal failure
async fn run_server(cli: &Cli) -> Result<()> {
    let (config, unknown) = load_config(cli)?;

    let result = config
        .validate()
        .context("Configuration validation failed")?;
    report(&with_unknown_nodes(result, &unknown));

    let app = App::from_config(&config, Arc::new(SystemClock::new()))
        .context("Failed to assemble certificate service")?;

    let mut renewal = app
        .renewer()
        .start()
        .await
        .context("Failed to issue identity certificate")?;

    let listener = TcpListener::bind(&config.server.listen)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.listen))?;

    let stop = CancellationToken::new();
    let server = tokio::spawn(http::serve(
        listener,
        app.router(),
        stop.clone().cancelled_owned(),
    ));

    let outcome = tokio::select! {
        _ = shutdown_signal() => {
            info!("Shutdown signal received");
            Ok(())
        }
        result = renewal.wait() => {
            error!("Identity renewal stopped, shutting down");
            result.context("Identity certificate renewal failed")
        }
    };

    stop.cancel();
    renewal
        .shutdown()
        .await
        .context("Identity renewal did not stop cleanly")?;

    match server.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => return Err(e).context("HTTP server failed"),
        Err(e) => return Err(e).context("HTTP server task failed"),
    }

    app.service.store().pool().close();
    info!("certsvc stopped");
    outcome
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
