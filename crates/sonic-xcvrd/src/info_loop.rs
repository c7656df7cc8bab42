//! Info update loop.
//!
//! Walks every logical port once per period and refreshes its diagnostic
//! tables. A cycle is best effort: a port that fails is logged and counted,
//! the walk goes on.

use crate::flags::FlagMetadataEngine;
use crate::publisher::{is_flat_memory, read_cached, write_row, DiagCache, DiagPublisher, PublishOptions, PublishOutcome};
use crate::vdm::{split_by_level, FreezeTimings, VdmFreezeCoordinator};
use sonic_xcvr_common::status::status_blocks_sampling;
use sonic_xcvr_common::tables::fields;
use sonic_xcvr_common::{
    epoch_seconds, AsicId, Capability, Chassis, DiagDict, DiagKind, FlagGroup, ModuleState,
    PortChangeEvent, PortMapping, Sfp, TableHelper, XcvrTable, XcvrdConfig,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Accounting of one cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Logical ports visited
    pub walked: usize,
    /// Ports skipped: absent or in a blocking error state
    pub skipped: usize,
    /// Rows written
    pub written: usize,
    /// Publishes that failed
    pub failed: usize,
}

impl CycleReport {
    fn account(&mut self, outcome: PublishOutcome) {
        match outcome {
            PublishOutcome::Written => self.written += 1,
            o if o.is_failure() => self.failed += 1,
            _ => {}
        }
    }
}

/// Per-cycle caches, one per publisher.
#[derive(Debug, Default)]
struct CycleCaches {
    caches: HashMap<DiagKind, DiagCache>,
}

impl CycleCaches {
    fn get(&mut self, kind: DiagKind) -> &mut DiagCache {
        self.caches.entry(kind).or_default()
    }
}

fn reader_for(kind: DiagKind) -> fn(&dyn Sfp) -> Capability<DiagDict> {
    match kind {
        DiagKind::TransceiverInfo => |s| s.get_transceiver_info(),
        DiagKind::DomSensor => |s| s.get_transceiver_dom_real_value(),
        DiagKind::DomFlag => |s| s.get_transceiver_dom_flags(),
        DiagKind::DomThreshold => |s| s.get_transceiver_dom_thresholds(),
        DiagKind::Status => |s| s.get_transceiver_status(),
        DiagKind::StatusFlag => |s| s.get_transceiver_status_flags(),
        DiagKind::VdmRealValue => |s| s.get_transceiver_vdm_real_value(),
        DiagKind::VdmFlag => |s| s.get_transceiver_vdm_flags(),
        DiagKind::VdmThreshold => |s| s.get_transceiver_vdm_thresholds(),
    }
}

/// The periodic diagnostic walker.
pub struct InfoUpdateLoop {
    mapping: Arc<PortMapping>,
    tables: TableHelper,
    publisher: DiagPublisher,
    flags: FlagMetadataEngine,
    vdm: VdmFreezeCoordinator,
    publishers: Vec<DiagKind>,
    period: Duration,
    module_events: Option<mpsc::UnboundedReceiver<PortChangeEvent>>,
}

impl InfoUpdateLoop {
    pub fn new(
        config: &XcvrdConfig,
        mapping: Arc<PortMapping>,
        chassis: Arc<dyn Chassis>,
        tables: TableHelper,
    ) -> Self {
        Self {
            publisher: DiagPublisher::new(mapping.clone(), chassis),
            mapping,
            tables,
            flags: FlagMetadataEngine::new(),
            vdm: VdmFreezeCoordinator::new(FreezeTimings::from(&config.vdm)),
            publishers: config.info_loop.publishers.clone(),
            period: config.info_period(),
            module_events: None,
        }
    }

    /// Module transitions from the state event loop; removals reset flag
    /// history.
    pub fn with_module_events(mut self, events: mpsc::UnboundedReceiver<PortChangeEvent>) -> Self {
        self.module_events = Some(events);
        self
    }

    pub fn flags(&self) -> &FlagMetadataEngine {
        &self.flags
    }

    fn drain_module_events(&mut self) {
        let Some(events) = self.module_events.as_mut() else {
            return;
        };
        while let Ok(event) = events.try_recv() {
            if event.state == ModuleState::Absent {
                for logical in self.mapping.logicals_of(event.physical) {
                    debug!(port = %logical, "Module removed, forgetting flag history");
                    self.flags.forget_port(logical);
                }
            }
        }
    }

    async fn sampling_blocked(&self, asic: AsicId, logical: &str) -> bool {
        let Some(status) = self.tables.get(asic, XcvrTable::Status) else {
            return false;
        };
        match status.hget(logical, fields::STATUS).await {
            Ok(Some(code)) => status_blocks_sampling(&code),
            Ok(None) => false,
            Err(e) => {
                warn!(port = logical, error = %e, "Cannot read module status");
                false
            }
        }
    }

    /// Runs one walk over every logical port.
    #[instrument(skip(self))]
    pub async fn run_cycle(&mut self) -> CycleReport {
        self.drain_module_events();
        let mut report = CycleReport::default();
        let mut caches = CycleCaches::default();
        let logicals: Vec<String> = self.mapping.logicals().to_vec();

        for logical in &logicals {
            report.walked += 1;
            let Some(asic) = self.mapping.asic_of(logical) else {
                continue;
            };
            if self.sampling_blocked(asic, logical).await {
                debug!(port = %logical, "Module in error state, not sampling");
                report.skipped += 1;
                continue;
            }
            let Some((physical, sfp)) = self.publisher.resolve(logical) else {
                warn!(port = %logical, "No module for port");
                report.failed += 1;
                continue;
            };
            if sfp.get_presence() == Capability::Value(false) {
                report.skipped += 1;
                continue;
            }
            self.sample_port(asic, logical, physical, sfp, &mut caches, &mut report)
                .await;
        }
        report
    }

    async fn sample_port(
        &mut self,
        asic: AsicId,
        logical: &str,
        physical: u32,
        sfp: Arc<dyn Sfp>,
        caches: &mut CycleCaches,
        report: &mut CycleReport,
    ) {
        let flat = is_flat_memory(sfp.as_ref());
        let vdm_capable = !flat && sfp.is_vdm_supported() == Capability::Value(true);
        let mut vdm_sampled = false;

        for kind in self.publishers.clone() {
            match kind {
                DiagKind::TransceiverInfo
                | DiagKind::DomSensor
                | DiagKind::DomThreshold
                | DiagKind::Status => {
                    let table = match kind {
                        DiagKind::TransceiverInfo => XcvrTable::TransceiverInfo,
                        DiagKind::DomSensor => XcvrTable::DomSensor,
                        DiagKind::DomThreshold => XcvrTable::DomThreshold,
                        _ => XcvrTable::Status,
                    };
                    let Some(table) = self.tables.get(asic, table) else {
                        continue;
                    };
                    let options = PublishOptions {
                        cache: Some(caches.get(kind)),
                        flat_memory_guard: kind == DiagKind::DomThreshold,
                        beautify: kind != DiagKind::Status,
                    };
                    let outcome = self
                        .publisher
                        .publish(logical, table, reader_for(kind), options)
                        .await;
                    report.account(outcome);
                }
                DiagKind::DomFlag | DiagKind::StatusFlag => {
                    let group = if kind == DiagKind::DomFlag {
                        FlagGroup::Dom
                    } else {
                        FlagGroup::Status
                    };
                    let read = read_cached(Some(caches.get(kind)), physical, sfp.as_ref(), reader_for(kind));
                    if let Capability::Value(dict) = read {
                        let outcome = self
                            .flags
                            .publish_flags(&self.tables, asic, group, logical, &dict, epoch_seconds())
                            .await;
                        report.account(outcome);
                    }
                }
                DiagKind::VdmRealValue | DiagKind::VdmFlag => {
                    if vdm_capable && !vdm_sampled {
                        vdm_sampled = true;
                        self.sample_vdm(asic, logical, physical, sfp.as_ref(), caches, report)
                            .await;
                    }
                }
                DiagKind::VdmThreshold => {
                    if !vdm_capable {
                        continue;
                    }
                    let read = read_cached(Some(caches.get(kind)), physical, sfp.as_ref(), reader_for(kind));
                    if let Capability::Value(dict) = read {
                        let now = epoch_seconds();
                        for (level, dict) in split_by_level(&dict) {
                            if let Some(table) = self.tables.get(asic, XcvrTable::VdmThreshold(level)) {
                                report.account(write_row(table, logical, &dict, true, now).await);
                            }
                        }
                    }
                }
            }
        }
    }

    /// VDM real values and flags, read together inside one freeze region.
    async fn sample_vdm(
        &mut self,
        asic: AsicId,
        logical: &str,
        physical: u32,
        sfp: &dyn Sfp,
        caches: &mut CycleCaches,
        report: &mut CycleReport,
    ) {
        let want_real = self.publishers.contains(&DiagKind::VdmRealValue);
        let want_flags = self.publishers.contains(&DiagKind::VdmFlag);
        let need_real = want_real && !caches.get(DiagKind::VdmRealValue).contains_key(&physical);
        let need_flags = want_flags && !caches.get(DiagKind::VdmFlag).contains_key(&physical);

        if need_real || need_flags {
            let sampled = self
                .vdm
                .with_frozen(physical, sfp, |frozen| {
                    debug!(port = logical, frozen, "Sampling VDM");
                    let real = need_real.then(|| sfp.get_transceiver_vdm_real_value());
                    let flags = need_flags.then(|| sfp.get_transceiver_vdm_flags());
                    (real, flags)
                })
                .await;
            let Some((real, flags)) = sampled else {
                return;
            };
            if let Some(Capability::Value(dict)) = real {
                caches.get(DiagKind::VdmRealValue).insert(physical, dict);
            }
            if let Some(Capability::Value(dict)) = flags {
                caches.get(DiagKind::VdmFlag).insert(physical, dict);
            }
        }

        let now = epoch_seconds();
        if want_real {
            if let (Some(dict), Some(table)) = (
                caches.get(DiagKind::VdmRealValue).get(&physical).cloned(),
                self.tables.get(asic, XcvrTable::VdmRealValue),
            ) {
                report.account(write_row(table, logical, &dict, true, now).await);
            }
        }
        if want_flags {
            if let Some(dict) = caches.get(DiagKind::VdmFlag).get(&physical).cloned() {
                for (level, dict) in split_by_level(&dict) {
                    let outcome = self
                        .flags
                        .publish_flags(&self.tables, asic, FlagGroup::Vdm(level), logical, &dict, now)
                        .await;
                    report.account(outcome);
                }
            }
        }
    }

    /// Runs a cycle every period until cancelled.
    pub async fn run(mut self, cancel: CancellationToken) {
        info!(period = ?self.period, publishers = self.publishers.len(), "Info update loop started");
        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let report = self.run_cycle().await;
                    if report.failed > 0 {
                        warn!(?report, "Info update cycle finished with failures");
                    } else {
                        debug!(?report, "Info update cycle finished");
                    }
                }
            }
        }
        info!("Info update loop stopped");
    }
}
