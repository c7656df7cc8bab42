//! VDM freeze coordinator.
//!
//! VDM statistics are only coherent while the module holds them frozen:
//! request a freeze, wait `tVDMF`, poll until the module confirms, read,
//! then request an unfreeze and confirm that too. The unfreeze is issued on
//! every exit path, including a panic inside the read region.

use sonic_xcvr_common::config::VdmConfig;
use sonic_xcvr_common::{Capability, DiagDict, Sfp, VdmLevel};
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, warn};

/// Freeze protocol timings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreezeTimings {
    /// Minimum wait after a freeze or unfreeze request (`tVDMF`).
    pub settle: Duration,
    pub poll_interval: Duration,
    pub confirm_timeout: Duration,
}

impl Default for FreezeTimings {
    fn default() -> Self {
        Self {
            settle: Duration::from_millis(10),
            poll_interval: Duration::from_millis(1),
            confirm_timeout: Duration::from_millis(1000),
        }
    }
}

impl From<&VdmConfig> for FreezeTimings {
    fn from(config: &VdmConfig) -> Self {
        Self {
            settle: Duration::from_millis(config.settle_ms),
            poll_interval: Duration::from_millis(config.poll_interval_ms.max(1)),
            confirm_timeout: Duration::from_millis(config.confirm_timeout_ms),
        }
    }
}

/// Runs VDM reads inside a freeze region.
#[derive(Debug, Clone, Default)]
pub struct VdmFreezeCoordinator {
    timings: FreezeTimings,
}

impl VdmFreezeCoordinator {
    pub fn new(timings: FreezeTimings) -> Self {
        Self { timings }
    }

    /// Polls `status` until it reports done or the confirm timeout expires.
    async fn confirm<F>(&self, status: F) -> bool
    where
        F: Fn() -> Capability<bool>,
    {
        let deadline = Instant::now() + self.timings.confirm_timeout;
        loop {
            match status() {
                Capability::Value(true) => return true,
                Capability::NotImplemented => return false,
                Capability::Value(false) => {}
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(self.timings.poll_interval).await;
        }
    }

    async fn unfreeze(&self, port: u32, sfp: &dyn Sfp) {
        match sfp.unfreeze_vdm_stats() {
            Capability::Value(true) => {
                tokio::time::sleep(self.timings.settle).await;
                if !self.confirm(|| sfp.get_vdm_unfreeze_status()).await {
                    warn!(port, "VDM unfreeze not confirmed");
                }
            }
            Capability::Value(false) => warn!(port, "VDM unfreeze request refused"),
            Capability::NotImplemented => debug!(port, "VDM unfreeze not implemented"),
        }
    }

    /// Runs `region` with the module's VDM statistics frozen.
    ///
    /// `region` receives whether the freeze was confirmed; an unconfirmed
    /// freeze still samples. A refused or unimplemented freeze request skips
    /// the region and yields `None`. A panic inside the region is re-raised
    /// once the unfreeze has been issued.
    pub async fn with_frozen<F, T>(&self, port: u32, sfp: &dyn Sfp, region: F) -> Option<T>
    where
        F: FnOnce(bool) -> T,
    {
        let accepted = match sfp.freeze_vdm_stats() {
            Capability::Value(true) => true,
            Capability::Value(false) => {
                warn!(port, "VDM freeze request refused");
                false
            }
            Capability::NotImplemented => {
                debug!(port, "VDM freeze not implemented");
                false
            }
        };
        if !accepted {
            self.unfreeze(port, sfp).await;
            return None;
        }

        tokio::time::sleep(self.timings.settle).await;
        let frozen = self.confirm(|| sfp.get_vdm_freeze_status()).await;
        if !frozen {
            error!(port, timeout = ?self.timings.confirm_timeout, "VDM freeze not confirmed, sampling unfrozen");
        }

        let result = panic::catch_unwind(AssertUnwindSafe(|| region(frozen)));
        self.unfreeze(port, sfp).await;
        match result {
            Ok(value) => Some(value),
            Err(payload) => panic::resume_unwind(payload),
        }
    }
}

/// Splits a VDM flag or threshold dictionary into its four levels by key
/// marker. Fields without a marker are dropped.
pub fn split_by_level(dict: &DiagDict) -> BTreeMap<VdmLevel, DiagDict> {
    let mut levels: BTreeMap<VdmLevel, DiagDict> = BTreeMap::new();
    for (field, value) in dict {
        match VdmLevel::of_key(field) {
            Some(level) => {
                levels
                    .entry(level)
                    .or_default()
                    .insert(field.clone(), value.clone());
            }
            None => debug!(field = %field, "VDM field without level marker"),
        }
    }
    levels
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sonic_xcvr_common::diag_dict;
    use sonic_xcvr_common::platform::sim::{SfpCall, SimDiag, SimPortDescription, SimSfp};
    use std::sync::{Arc, Mutex};

    fn module() -> SimSfp {
        SimSfp::from_description(&SimPortDescription {
            index: 7,
            present: true,
            vdm_supported: true,
            vdm_real_value: Some(diag_dict! { "laser_temperature_media1" => 45.0 }),
            ..Default::default()
        })
    }

    fn freezes_match(sfp: &SimSfp) -> bool {
        sfp.call_count(SfpCall::Freeze) == sfp.call_count(SfpCall::Unfreeze)
    }

    #[tokio::test(start_paused = true)]
    async fn test_region_runs_frozen() {
        let sfp = module();
        let coordinator = VdmFreezeCoordinator::default();

        let sampled = coordinator
            .with_frozen(7, &sfp, |frozen| (frozen, sfp.get_transceiver_vdm_real_value()))
            .await;
        let (frozen, read) = sampled.unwrap();
        assert!(frozen);
        assert!(read.is_implemented());
        assert_eq!(
            sfp.calls(),
            vec![
                SfpCall::Freeze,
                SfpCall::Read(SimDiag::VdmRealValue),
                SfpCall::Unfreeze
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_confirm_timeout_still_samples() {
        let sfp = module();
        sfp.set_freeze_completes(false);
        let coordinator = VdmFreezeCoordinator::default();

        let start = Instant::now();
        let frozen = coordinator.with_frozen(7, &sfp, |frozen| frozen).await;
        assert_eq!(frozen, Some(false));
        assert!(start.elapsed() >= Duration::from_millis(1010));
        assert!(freezes_match(&sfp));
    }

    #[derive(Clone, Default)]
    struct LogCapture(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for LogCapture {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl LogCapture {
        fn lines(&self) -> Vec<String> {
            let bytes = self.0.lock().unwrap().clone();
            String::from_utf8(bytes)
                .unwrap()
                .lines()
                .map(str::to_string)
                .collect()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_confirm_timeout_logs_one_error() {
        let capture = LogCapture::default();
        let writer = capture.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .without_time()
            .with_max_level(tracing::Level::DEBUG)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let sfp = module();
        sfp.set_freeze_completes(false);
        let coordinator = VdmFreezeCoordinator::default();
        assert_eq!(coordinator.with_frozen(7, &sfp, |frozen| frozen).await, Some(false));

        let errors: Vec<String> = capture
            .lines()
            .into_iter()
            .filter(|line| line.starts_with("ERROR"))
            .collect();
        assert_eq!(errors.len(), 1, "{:?}", errors);
        assert!(errors[0].contains("port=7"), "{}", errors[0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refused_freeze_skips_region() {
        let sfp = module();
        let coordinator = VdmFreezeCoordinator::default();

        sfp.set_freeze_accepts(Some(false));
        assert_eq!(coordinator.with_frozen(7, &sfp, |_| ()).await, None);
        sfp.set_freeze_accepts(None);
        assert_eq!(coordinator.with_frozen(7, &sfp, |_| ()).await, None);

        assert!(freezes_match(&sfp));
        assert_eq!(sfp.call_count(SfpCall::Read(SimDiag::VdmRealValue)), 0);
    }

    #[test]
    fn test_unfreeze_issued_when_region_panics() {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .start_paused(true)
            .build()
            .unwrap();
        let sfp = module();
        sfp.set_panic_on_vdm_read(true);
        let coordinator = VdmFreezeCoordinator::default();

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            rt.block_on(coordinator.with_frozen(7, &sfp, |_| sfp.get_transceiver_vdm_real_value()))
        }));
        assert!(result.is_err());
        assert_eq!(sfp.calls().last(), Some(&SfpCall::Unfreeze));
        assert!(freezes_match(&sfp));
    }

    #[test]
    fn test_split_by_level() {
        let dict = diag_dict! {
            "laser_temperature_media_halarm1" => 75.0,
            "laser_temperature_media_lalarm1" => -5.0,
            "esnr_media_input_hwarn1" => 30.0,
            "esnr_media_input_lwarn1" => 18.0,
            "prefec_ber_avg_media_input1" => 0.0,
        };
        let levels = split_by_level(&dict);
        assert_eq!(levels.len(), 4);
        assert_eq!(
            levels[&VdmLevel::HighAlarm],
            diag_dict! { "laser_temperature_media_halarm1" => 75.0 }
        );
        assert_eq!(
            levels[&VdmLevel::LowWarn],
            diag_dict! { "esnr_media_input_lwarn1" => 18.0 }
        );
    }

    #[test]
    fn test_timings_from_config() {
        let config = VdmConfig {
            settle_ms: 20,
            poll_interval_ms: 0,
            confirm_timeout_ms: 500,
        };
        assert_eq!(
            FreezeTimings::from(&config),
            FreezeTimings {
                settle: Duration::from_millis(20),
                poll_interval: Duration::from_millis(1),
                confirm_timeout: Duration::from_millis(500),
            }
        );
    }
}
