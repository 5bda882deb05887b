//! testbedd - CAN testbed daemon
//!
//! Usage:
//!   testbedd [OPTIONS]
//!
//! Driver commands are read from stdin, one per line (see `controls`).
//! Ctrl-C stops the channel tasks, then kills the ECUs and relays.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::Ordering;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use rand::rngs::OsRng;
use testbed_can::{create_transport, CanLogger};
use testbed_core::EcuRole;
use testbed_serial::ChannelEndpoint;
use testbedd::{
    DriverCommand, EncryptionKey, Orchestrator, StageContext, StartupError, StartupStage,
    Supervisor, TestbedConfig,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// How long each channel task gets to stop on shutdown
const JOIN_GRACE: Duration = Duration::from_secs(2);

#[derive(Parser)]
#[command(name = "testbedd")]
#[command(author, version, about = "CAN security testbed daemon")]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long, env = "TESTBED_CONFIG")]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Enable payload encryption between ECUs
    #[arg(long)]
    encryption: bool,

    /// Run the observer ECU
    #[arg(long)]
    observer: bool,

    /// Run the gateway ECU
    #[arg(long)]
    gateway: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{:#}", e);
            return ExitCode::from(StartupStage::Config.exit_code());
        }
    };

    if let Err(e) = init_logging(args.verbose, &config) {
        eprintln!("{:#}", e);
        return ExitCode::from(StartupStage::Config.exit_code());
    }

    tracing::info!("Starting testbedd");
    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(stage = %e.stage, error = %e, "Startup aborted");
            ExitCode::from(e.exit_code())
        }
    }
}

fn load_config(args: &Args) -> anyhow::Result<TestbedConfig> {
    let mut config = TestbedConfig::load(args.config.as_deref())?;
    config.mitigations.encryption |= args.encryption;
    config.mitigations.observer |= args.observer;
    config.mitigations.gateway |= args.gateway;
    config.validate()?;
    Ok(config)
}

fn init_logging(verbose: bool, config: &TestbedConfig) -> anyhow::Result<()> {
    let default_filter = if verbose {
        "testbedd=debug,testbed_serial=debug,testbed_can=debug,testbed_core=debug"
    } else {
        "testbedd=info,testbed_serial=info,testbed_can=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into());

    let file_layer = match &config.log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file: {}", path.display()))?;
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .init();
    Ok(())
}

async fn run(config: TestbedConfig) -> Result<(), StartupError> {
    let roles = config.active_roles();
    let mut supervisor = Supervisor::new();

    // Relays: host end for us, ECU end for the process
    let mut endpoints: Vec<(EcuRole, String, Option<String>)> = Vec::with_capacity(roles.len());
    for &role in &roles {
        if config.spawn_relays {
            let pair = supervisor.start_relay(role).stage(StartupStage::Relays)?;
            endpoints.push((role, pair.host_end, Some(pair.ecu_end)));
        } else {
            let path = config
                .channels
                .get(role)
                .with_context(|| format!("No channel path for {role}"))
                .stage(StartupStage::Relays)?;
            endpoints.push((role, path.to_string(), None));
        }
    }
    if endpoints.len() != roles.len() {
        return Err(anyhow::anyhow!(
            "Expected {} relays, got {}",
            roles.len(),
            endpoints.len()
        ))
        .stage(StartupStage::Relays);
    }

    // ECU processes; pre-existing relays are served by externally started ECUs
    let key = config
        .mitigations
        .encryption
        .then(|| EncryptionKey::generate(&mut OsRng));
    if key.is_some() {
        tracing::info!("Generated encryption key for the ECUs");
    }
    for (role, _, ecu_end) in &endpoints {
        if let Some(ecu_end) = ecu_end {
            supervisor
                .start_ecu(&config.ecu_binary, *role, ecu_end, key.as_ref())
                .stage(StartupStage::Ecus)?;
        }
    }

    // Channel tasks
    let channels = endpoints.into_iter().map(|(role, host_end, _)| {
        (
            role,
            ChannelEndpoint::open_serial(role.name(), &host_end, config.baud_rate),
        )
    });
    let mut orchestrator = Orchestrator::from_config(&config)
        .attach_all(channels, JOIN_GRACE)
        .await
        .stage(StartupStage::Channels)?;
    if orchestrator.channel_count() != roles.len() {
        let attached = orchestrator.channel_count();
        orchestrator.shutdown(JOIN_GRACE).await;
        return Err(anyhow::anyhow!(
            "Expected {} channels, attached {}",
            roles.len(),
            attached
        ))
        .stage(StartupStage::Channels);
    }

    // Raw CAN log; a missing interface only ends the logger
    let logger = config.logger.enabled.then(|| {
        let logger = CanLogger::new(&config.logger.path);
        let running = logger.running_flag();
        let transport_config = config.logger.transport.clone();
        let handle = tokio::spawn(async move {
            match create_transport(&transport_config).await {
                Ok(transport) => {
                    if let Err(e) = logger.run(transport).await {
                        tracing::error!(error = %e, "CAN logger failed");
                    }
                }
                Err(e) => tracing::error!(
                    interface = transport_config.interface(),
                    error = %e,
                    "CAN logger could not open its interface. Is the CAN interface up?"
                ),
            }
        });
        (running, handle)
    });

    let commands = spawn_stdin_commands();

    tracing::info!(ecus = roles.len(), fps = config.fps, "Car running, Ctrl-C to stop");
    orchestrator
        .run(config.tick_interval(), commands, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            }
        })
        .await;

    tracing::info!("Shutting down");
    orchestrator.shutdown(JOIN_GRACE).await;
    if let Some((running, handle)) = logger {
        running.store(false, Ordering::SeqCst);
        if tokio::time::timeout(JOIN_GRACE, handle).await.is_err() {
            tracing::warn!("CAN logger did not stop in time");
        }
    }
    supervisor.kill_all();
    tracing::info!("Stopped");
    Ok(())
}

/// Forward parsed stdin lines to the main loop
fn spawn_stdin_commands() -> mpsc::Receiver<DriverCommand> {
    let (tx, rx) = mpsc::channel(32);
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) if line.trim().is_empty() => continue,
                Ok(Some(line)) => match line.parse::<DriverCommand>() {
                    Ok(command) => {
                        if tx.send(command).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => tracing::warn!("{}", e),
                },
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "stdin read failed");
                    break;
                }
            }
        }
    });
    rx
}
