//! xcvrd daemon entry point.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use sonic_xcvr_common::config::DEFAULT_CONFIG_PATH;
use sonic_xcvr_common::daemon::spawn_signal_handler;
use sonic_xcvr_common::logging::{follow_logger_table, init_logging, LogHandle};
use sonic_xcvr_common::platform::load_platform;
use sonic_xcvr_common::redis_store::connect_all;
use sonic_xcvr_common::{DaemonExit, PortMapping, Table, XcvrError, XcvrTable, XcvrdConfig};
use sonic_xcvrd::Supervisor;

const DAEMON_NAME: &str = "xcvrd";

#[derive(Debug, Parser)]
#[command(name = "xcvrd", version, about = "Transceiver monitoring daemon for SONiC")]
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
    let chassis = load_platform(&config.platform).context("loading platform")?;
    let mapping = Arc::new(
        PortMapping::load(&config.ports.port_config).context("loading port configuration")?,
    );
    let connections = connect_all(&config.database)
        .await
        .context("connecting to databases")?;
    info!(
        platform = chassis.name(),
        ports = mapping.logicals().len(),
        namespaces = connections.len(),
        "Initialized"
    );

    let stop = CancellationToken::new();
    let signals = spawn_signal_handler(DAEMON_NAME, stop.clone())?;

    if config.logging.follow_logger_table {
        if let Some((_, conns)) = connections.first() {
            let logger = Table::new(conns.config.clone(), XcvrTable::ConfigLogger.name());
            tokio::spawn(follow_logger_table(logger, DAEMON_NAME.to_string(), log, stop.clone()));
        }
    }

    let exit = Supervisor::new(config, mapping, chassis, connections)
        .run(stop.clone())
        .await
        .context("running supervisor")?;

    // the handler yields None when the supervisor stopped on its own
    stop.cancel();
    let signal = signals.await.ok().flatten();
    Ok(exit.with_signal(signal))
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
