//! ycabled daemon entry point.
//!
//! Runs the Y-cable controller on its own, following module transitions
//! through STATE_DB TRANSCEIVER_STATUS as written by xcvrd.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use sonic_xcvr_common::config::DEFAULT_CONFIG_PATH;
use sonic_xcvr_common::daemon::spawn_signal_handler;
use sonic_xcvr_common::logging::{follow_logger_table, init_logging, LogHandle};
use sonic_xcvr_common::platform::load_platform;
use sonic_xcvr_common::redis_store::connect_all;
use sonic_xcvr_common::{
    DaemonExit, PortMapping, SystemdNotifier, Table, TableHelper, XcvrError, XcvrTable, XcvrdConfig,
};
use sonic_ycabled::spawn_status_follower;

const DAEMON_NAME: &str = "ycabled";

#[derive(Debug, Parser)]
#[command(name = "ycabled", version, about = "Y-cable mux controller for dual-ToR SONiC switches")]
struct Args {
    /// Daemon configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log filter, overrides the configured level
    #[arg(short, long)]
    log_level: Option<String>,
}

fn exit_code(exit: DaemonExit) -> ExitCode {
    ExitCode::from(u8::try_from(exit.code()).unwrap_or(1))
}

fn exit_for(err: &anyhow::Error) -> DaemonExit {
    err.downcast_ref::<XcvrError>()
        .map(DaemonExit::from_error)
        .unwrap_or(DaemonExit::PlatformLoad)
}

async fn run(config: XcvrdConfig, log: LogHandle) -> anyhow::Result<DaemonExit> {
    if !config.ycable.enabled {
        info!("Y-cable support disabled, nothing to do");
        return Ok(DaemonExit::Normal);
    }

    let connections = connect_all(&config.database)
        .await
        .context("connecting to databases")?;
    let mapping = Arc::new(
        PortMapping::load(&config.ports.port_config).context("loading port configuration")?,
    );
    let chassis = load_platform(&config.platform).context("loading platform")?;
    info!(platform = chassis.name(), ports = mapping.logicals().len(), "Platform loaded");

    let stop = CancellationToken::new();
    let signals = spawn_signal_handler(DAEMON_NAME, stop.clone())?;

    if config.logging.follow_logger_table {
        if let Some((_, conns)) = connections.first() {
            let logger = Table::new(conns.config.clone(), XcvrTable::ConfigLogger.name());
            tokio::spawn(follow_logger_table(logger, DAEMON_NAME.to_string(), log, stop.clone()));
        }
    }

    let tables = || TableHelper::new(connections.iter().map(|(asic, conns)| (*asic, conns)));
    let ycable = sonic_ycabled::start(&config, mapping.clone(), chassis, tables(), &stop)
        .await
        .context("starting Y-cable controller")?;
    let follower = spawn_status_follower(&tables(), mapping, ycable.event_sink(), stop.clone())
        .await
        .context("following TRANSCEIVER_STATUS")?;

    let notifier = SystemdNotifier::new();
    if let Err(e) = notifier.notify_ready() {
        warn!(error = %e, "systemd ready notification failed");
    }

    let mut heartbeat = tokio::time::interval(config.heartbeat());
    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            _ = heartbeat.tick() => {
                debug!("Heartbeat");
                if let Err(e) = notifier.notify_watchdog() {
                    warn!(error = %e, "systemd watchdog notification failed");
                }
            }
        }
    }

    info!("Stopping");
    if let Err(e) = notifier.notify_stopping() {
        debug!(error = %e, "systemd stopping notification failed");
    }
    ycable.stop().await;
    if let Err(e) = follower.await {
        warn!(error = %e, "Status follower failed");
    }

    let signal = signals.await.ok().flatten();
    Ok(DaemonExit::Normal.with_signal(signal))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();

    let config = match XcvrdConfig::load_or_default(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}: {}", DAEMON_NAME, e);
            return exit_code(DaemonExit::PortConfig);
        }
    };
    let level = args.log_level.unwrap_or_else(|| config.logging.level.clone());
    let log = match init_logging(&level) {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("{}: {}", DAEMON_NAME, e);
            return exit_code(DaemonExit::PortConfig);
        }
    };

    info!("--- Starting {} ---", DAEMON_NAME);
    let exit = match run(config, log).await {
        Ok(exit) => exit,
        Err(e) => {
            error!("{:#}", e);
            exit_for(&e)
        }
    };
    info!(code = exit.code(), "{} exiting", DAEMON_NAME);
    exit_code(exit)
}
