//! fleetctl - CLI entry point for the phone-fleet orchestrator.

use anyhow::{Context, Result};
use autophoned::buildcache::StubBuildCacheClient;
use autophoned::config::Config;
use autophoned::constants::{DEFAULT_CONFIG_PATH, DEFAULT_JOB_STORE_FILE, DEFAULT_LOG_LEVEL};
use autophoned::device_agent::{DeviceAgent, LoggingDeviceAgent};
use autophoned::mailer::{LoggingMailer, Mailer};
use autophoned::store::{JobStore, SqliteJobStore};
use autophoned::supervisor::Supervisor;
use autophoned::test_case::TestCase;
use autophoned::utils::setup_logger;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(
    name = "fleetctl",
    version,
    about = "Drives a fleet of physical Android phones through successive builds"
)]
struct Cli {
    /// Path to the fleet configuration file.
    #[arg(long, env = "FLEETCTL_CONFIG", default_value_t = DEFAULT_CONFIG_PATH.to_string())]
    config: String,

    /// Path to the job store's SQLite database.
    #[arg(long, env = "FLEETCTL_JOB_STORE", default_value_t = DEFAULT_JOB_STORE_FILE.to_string())]
    job_store: String,

    /// Log level, e.g. error/warn/info/debug/trace. Overridden by `RUST_LOG`.
    #[arg(long, default_value_t = DEFAULT_LOG_LEVEL.to_string())]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Starts the supervisor and every configured worker, blocking until Ctrl-C.
    Run,
    /// Enqueues a build for one phone, or every phone if `--phone` is omitted.
    Enqueue {
        build_url: String,
        #[arg(long)]
        phone: Option<String>,
    },
    /// Reboots a phone.
    Reboot { phone: String },
    /// Disables a phone (no automatic recovery until `enable`).
    Disable { phone: String },
    /// Re-enables a previously disabled phone.
    Enable { phone: String },
    /// Sets a phone's on-device debug/log verbosity.
    Debug { phone: String, level: u8 },
    /// Requests an opportunistic health probe of a phone.
    Ping { phone: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logger(&cli.log_level).context("failed to initialize logging")?;

    let config = Config::load(&cli.config)
        .with_context(|| format!("failed to load fleet configuration from {}", cli.config))?;

    let mailer: Arc<dyn Mailer> = Arc::new(LoggingMailer);
    let store: Arc<dyn JobStore> = Arc::new(
        SqliteJobStore::open(&cli.job_store, mailer.clone())
            .await
            .with_context(|| format!("failed to open job store at {}", cli.job_store))?,
    );
    let build_cache = Arc::new(StubBuildCacheClient);
    // Test bodies are supplied by whatever embeds this crate; the standalone
    // binary runs with none configured, so every job is dropped as
    // unselected (§4.F's per-device test-selection filter).
    let tests: Vec<Arc<dyn TestCase>> = Vec::new();

    let device_factory = |phone_cfg: &autophoned::config::PhoneConfig| {
        Arc::new(LoggingDeviceAgent::new(phone_cfg.phone_id.clone())) as Arc<dyn DeviceAgent>
    };

    let mut supervisor = Supervisor::start(
        &config,
        store,
        build_cache,
        mailer,
        tests,
        device_factory,
    );

    match cli.command {
        Command::Run => {
            log::info!("fleetctl: supervising {} phone(s)", config.phones.len());
            loop {
                tokio::select! {
                    status = supervisor.recv_status() => match status {
                        Some(status) => log::info!("{}", serde_json::to_string(&status)?),
                        None => break,
                    },
                    _ = tokio::signal::ctrl_c() => {
                        log::info!("fleetctl: received Ctrl-C, stopping workers");
                        break;
                    }
                }
            }
            supervisor.stop().await;
        }
        Command::Enqueue { build_url, phone } => {
            supervisor
                .new_job(&build_url, phone.as_deref())
                .await
                .context("failed to enqueue job")?;
            await_status(&mut supervisor).await;
            supervisor.stop().await;
        }
        Command::Reboot { phone } => {
            supervisor.reboot(&phone);
            await_status(&mut supervisor).await;
            supervisor.stop().await;
        }
        Command::Disable { phone } => {
            supervisor.disable(&phone);
            await_status(&mut supervisor).await;
            supervisor.stop().await;
        }
        Command::Enable { phone } => {
            supervisor.enable(&phone);
            await_status(&mut supervisor).await;
            supervisor.stop().await;
        }
        Command::Debug { phone, level } => {
            supervisor.debug(&phone, level);
            supervisor.stop().await;
        }
        Command::Ping { phone } => {
            supervisor.ping(&phone);
            await_status(&mut supervisor).await;
            supervisor.stop().await;
        }
    }

    Ok(())
}

/// Waits briefly for the status update an administrative command produced,
/// printing it if one arrives in time. Used only by the standalone
/// single-shot admin subcommands, not by `run`.
async fn await_status(supervisor: &mut Supervisor) {
    match tokio::time::timeout(Duration::from_secs(5), supervisor.recv_status()).await {
        Ok(Some(status)) => match serde_json::to_string_pretty(&status) {
            Ok(json) => println!("{json}"),
            Err(e) => log::warn!("failed to serialize status: {e}"),
        },
        Ok(None) => log::warn!("status channel closed before a status arrived"),
        Err(_) => log::warn!("timed out waiting for a status update"),
    }
}
