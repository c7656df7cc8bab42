//! Process integration shared by xcvrd and ycabled: exit codes, signal
//! handling and systemd notifications.

use crate::error::{Result, XcvrError};
use tokio::signal::unix::{signal, SignalKind};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How the daemon ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonExit {
    /// Clean shutdown.
    Normal,
    /// The platform (or another init dependency) could not be loaded.
    PlatformLoad,
    /// Port or daemon configuration missing or malformed.
    PortConfig,
    /// The platform lacks a capability the daemon cannot run without.
    NotImplemented,
    /// The change-event source kept failing.
    SfpError,
    /// Stopped by a signal.
    Signal(i32),
}

impl DaemonExit {
    /// Process exit status.
    pub fn code(&self) -> i32 {
        match self {
            DaemonExit::Normal => 0,
            DaemonExit::PlatformLoad => 1,
            DaemonExit::PortConfig => 2,
            DaemonExit::NotImplemented => 3,
            DaemonExit::SfpError => 4,
            DaemonExit::Signal(signo) => 128 + signo,
        }
    }

    /// Exit for an initialization-fatal error.
    pub fn from_error(err: &XcvrError) -> Self {
        match err {
            XcvrError::PortConfig { .. } | XcvrError::Config(_) => DaemonExit::PortConfig,
            XcvrError::NotImplemented(_) => DaemonExit::NotImplemented,
            _ => DaemonExit::PlatformLoad,
        }
    }

    /// Folds in the signal that stopped the daemon. Only a clean shutdown
    /// takes the signal's status; a fatal exit keeps its own.
    pub fn with_signal(self, signal: Option<i32>) -> Self {
        match (self, signal) {
            (DaemonExit::Normal, Some(signo)) => DaemonExit::Signal(signo),
            (exit, _) => exit,
        }
    }
}

pub const SIGHUP: i32 = 1;
pub const SIGINT: i32 = 2;
pub const SIGTERM: i32 = 15;

/// Spawns the signal handler.
///
/// SIGHUP is logged and ignored. SIGINT/SIGTERM cancel `stop`; the task then
/// yields the signal number. SIGUSR1/SIGUSR2 are logged as unhandled. The task
/// yields `None` if `stop` is cancelled by someone else.
pub fn spawn_signal_handler(daemon: &'static str, stop: CancellationToken) -> Result<JoinHandle<Option<i32>>> {
    let mut hup = signal(SignalKind::hangup())?;
    let mut int = signal(SignalKind::interrupt())?;
    let mut term = signal(SignalKind::terminate())?;
    let mut usr1 = signal(SignalKind::user_defined1())?;
    let mut usr2 = signal(SignalKind::user_defined2())?;

    Ok(tokio::spawn(async move {
        loop {
            let signo = tokio::select! {
                _ = stop.cancelled() => return None,
                _ = hup.recv() => {
                    info!(daemon, "Caught SIGHUP - ignoring...");
                    continue;
                }
                _ = int.recv() => SIGINT,
                _ = term.recv() => SIGTERM,
                _ = usr1.recv() => {
                    warn!(daemon, signal = "SIGUSR1", "Caught unhandled signal");
                    continue;
                }
                _ = usr2.recv() => {
                    warn!(daemon, signal = "SIGUSR2", "Caught unhandled signal");
                    continue;
                }
            };
            info!(daemon, signal = signo, "Caught signal - exiting...");
            stop.cancel();
            return Some(signo);
        }
    }))
}

/// Systemd notification for notify-on-ready and watchdog.
///
/// Enabled when run under systemd with Type=notify (NOTIFY_SOCKET set).
#[derive(Clone, Debug)]
pub struct SystemdNotifier {
    enabled: bool,
}

impl SystemdNotifier {
    pub fn new() -> Self {
        let enabled = std::env::var("NOTIFY_SOCKET").is_ok();
        if enabled {
            debug!("Systemd notification socket detected");
        }
        Self { enabled }
    }

    /// A notifier that never sends.
    pub fn disabled() -> Self {
        Self { enabled: false }
    }

    fn send(&self, state: &[sd_notify::NotifyState<'_>], what: &str) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        sd_notify::notify(false, state)
            .map_err(|e| XcvrError::Platform(format!("failed to send {} notification: {}", what, e)))
    }

    /// Initialization complete.
    pub fn notify_ready(&self) -> Result<()> {
        self.send(&[sd_notify::NotifyState::Ready], "READY")
    }

    /// Watchdog keepalive.
    pub fn notify_watchdog(&self) -> Result<()> {
        self.send(&[sd_notify::NotifyState::Watchdog], "WATCHDOG")
    }

    /// Shutdown started.
    pub fn notify_stopping(&self) -> Result<()> {
        self.send(&[sd_notify::NotifyState::Stopping], "STOPPING")
    }

    /// Free-form status line shown by systemctl.
    pub fn notify_status(&self, message: &str) -> Result<()> {
        self.send(&[sd_notify::NotifyState::Status(message)], "STATUS")
    }
}

impl Default for SystemdNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_exit_codes() {
        assert_eq!(DaemonExit::Normal.code(), 0);
        assert_eq!(DaemonExit::PlatformLoad.code(), 1);
        assert_eq!(DaemonExit::PortConfig.code(), 2);
        assert_eq!(DaemonExit::NotImplemented.code(), 3);
        assert_eq!(DaemonExit::SfpError.code(), 4);
        assert_eq!(DaemonExit::Signal(SIGTERM).code(), 143);
        assert_eq!(DaemonExit::Signal(SIGINT).code(), 130);
    }

    #[test]
    fn test_exit_from_error() {
        assert_eq!(
            DaemonExit::from_error(&XcvrError::port_config("/x", "bad")),
            DaemonExit::PortConfig
        );
        assert_eq!(
            DaemonExit::from_error(&XcvrError::Platform("no driver".to_string())),
            DaemonExit::PlatformLoad
        );
        assert_eq!(
            DaemonExit::from_error(&XcvrError::NotImplemented("get_change_event".to_string())),
            DaemonExit::NotImplemented
        );
    }

    #[test]
    fn test_exit_after_signal() {
        let term = DaemonExit::Normal.with_signal(Some(SIGTERM));
        assert_eq!(term, DaemonExit::Signal(SIGTERM));
        assert_eq!(term.code(), 143);
        assert_eq!(DaemonExit::Normal.with_signal(Some(SIGINT)).code(), 130);
        assert_eq!(DaemonExit::Normal.with_signal(None), DaemonExit::Normal);

        // a fatal exit is not masked by the signal that followed it
        assert_eq!(DaemonExit::SfpError.with_signal(Some(SIGTERM)).code(), 4);
        assert_eq!(DaemonExit::NotImplemented.with_signal(Some(SIGINT)).code(), 3);
    }

    #[test]
    fn test_other_errors_exit_platform_load() {
        for err in [
            XcvrError::database("connect", "refused"),
            XcvrError::rpc("peer gone"),
            XcvrError::Io(std::io::Error::other("disk")),
        ] {
            assert_eq!(DaemonExit::from_error(&err).code(), 1, "{}", err);
        }
        assert_eq!(DaemonExit::from_error(&XcvrError::Config("bad".to_string())).code(), 2);
        assert_eq!(
            DaemonExit::from_error(&XcvrError::NotImplemented("get_change_event".to_string())).code(),
            3
        );
    }

    #[test]
    fn test_disabled_notifier() {
        let notifier = SystemdNotifier::disabled();
        assert!(notifier.notify_ready().is_ok());
        assert!(notifier.notify_status("running").is_ok());
    }

    #[tokio::test]
    async fn test_signal_handler_stops_on_cancel() {
        let stop = CancellationToken::new();
        let handler = spawn_signal_handler("test", stop.clone()).unwrap();
        stop.cancel();
        let result = tokio::time::timeout(Duration::from_secs(1), handler)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result, None);
    }
}
