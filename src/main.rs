#![forbid(unsafe_code)]

//! `mcp-probe` — stdio tool-server client and smoke-check driver.
//!
//! Spawns the configured server, runs the handshake, lists the available
//! tools, executes the configured check suite, and reports per-call
//! pass/fail plus an aggregate success count.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use mcp_probe::client::session::McpSession;
use mcp_probe::config::ProbeConfig;
use mcp_probe::{runner, AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "mcp-probe",
    about = "Stdio tool-server client and smoke-check driver",
    version,
    long_about = None
)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Server executable to spawn (overrides the config file).
    #[arg(long)]
    server: Option<String>,

    /// Argument passed to the server; repeatable.
    #[arg(long = "server-arg")]
    server_args: Vec<String>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Only list the server's tools; skip the check suite.
    #[arg(long)]
    list_only: bool,
}

fn main() -> ExitCode {
    let args = Cli::parse();
    if let Err(err) = init_tracing(args.log_format) {
        eprintln!("{err}");
        return ExitCode::FAILURE;
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(err) => {
            error!(%err, "failed to build tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(args)) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            error!(%err, "probe run failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Cli) -> Result<bool> {
    // ── Load configuration ──────────────────────────────
    let config = load_config(&args)?;
    info!(server = config.server.command, "configuration loaded");

    // ── Spawn and handshake ─────────────────────────────
    let mut session = McpSession::start(&config).await?;
    info!("session ready");

    // ── Drive the suite, then tear down either way ──────
    let outcome = drive(&mut session, &config, args.list_only).await;
    let teardown = shutdown_session(&mut session).await;

    match outcome {
        Ok(all_passed) => {
            teardown?;
            Ok(all_passed)
        }
        Err(err) => {
            if let Err(teardown_err) = teardown {
                error!(%teardown_err, "teardown failed after session error");
            }
            Err(err)
        }
    }
}

/// List tools, then run the configured checks and render the report.
async fn drive(session: &mut McpSession, config: &ProbeConfig, list_only: bool) -> Result<bool> {
    let tools = session.list_tools().await?;
    info!(count = tools.len(), "server reported its tools");
    for tool in &tools {
        println!(
            "{} — {}",
            tool.name,
            tool.description.as_deref().unwrap_or("no description")
        );
    }

    if list_only {
        return Ok(true);
    }

    let report = runner::run_checks(session, &config.checks).await?;
    print!("{}", report.render());
    Ok(report.all_passed())
}

/// Graceful teardown; a hung server is reported, then killed explicitly.
async fn shutdown_session(session: &mut McpSession) -> Result<()> {
    match session.shutdown().await {
        Ok(()) => Ok(()),
        Err(AppError::Liveness(msg)) => {
            error!(%msg, "server ignored the stop request; forcing kill");
            session.force_kill().await
        }
        Err(err) => Err(err),
    }
}

fn load_config(args: &Cli) -> Result<ProbeConfig> {
    let mut config = if let Some(path) = &args.config {
        let text = std::fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("cannot read config: {err}")))?;
        ProbeConfig::from_toml_str(&text)?
    } else if let Some(server) = &args.server {
        ProbeConfig::for_command(server.clone(), args.server_args.clone())
    } else {
        return Err(AppError::Config(
            "either --config or --server is required".into(),
        ));
    };

    // CLI overrides win over the config file.
    if args.config.is_some() {
        if let Some(server) = &args.server {
            config.server.command.clone_from(server);
        }
        if !args.server_args.is_empty() {
            config.server.args.clone_from(&args.server_args);
        }
    }

    Ok(config)
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter).with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
