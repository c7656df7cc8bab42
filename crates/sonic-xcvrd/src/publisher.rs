//! Diagnostic publisher.
//!
//! Reads one diagnostic dictionary of a port's module and writes it as one
//! row keyed by the logical port name, stamped with `last_update_time`.

use crate::beautify::to_field_values;
use sonic_xcvr_common::tables::fields;
use sonic_xcvr_common::{epoch_seconds, Capability, Chassis, DiagDict, PortMapping, Sfp, Table};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Dictionaries already read this cycle, by physical port.
pub type DiagCache = HashMap<u32, DiagDict>;

/// How one publish call behaves.
#[derive(Debug, Default)]
pub struct PublishOptions<'a> {
    /// Serve and store reads per physical port.
    pub cache: Option<&'a mut DiagCache>,
    /// Skip modules that only expose the lower page.
    pub flat_memory_guard: bool,
    /// Strip units from sensor fields.
    pub beautify: bool,
}

/// What one publish call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Written,
    NoPhysicalPort,
    FlatMemory,
    NotImplemented,
    Empty,
    WriteFailed,
}

impl PublishOutcome {
    /// True for outcomes worth counting as a failure.
    pub fn is_failure(&self) -> bool {
        matches!(self, PublishOutcome::NoPhysicalPort | PublishOutcome::WriteFailed)
    }
}

/// Reads through the cache: a hit never touches the module, a miss stores
/// what was read.
pub fn read_cached<R>(
    cache: Option<&mut DiagCache>,
    physical: u32,
    sfp: &dyn Sfp,
    reader: R,
) -> Capability<DiagDict>
where
    R: FnOnce(&dyn Sfp) -> Capability<DiagDict>,
{
    match cache {
        Some(cache) => {
            if let Some(dict) = cache.get(&physical) {
                return Capability::Value(dict.clone());
            }
            let read = reader(sfp);
            if let Capability::Value(dict) = &read {
                cache.insert(physical, dict.clone());
            }
            read
        }
        None => reader(sfp),
    }
}

/// True for flat-memory modules. Unknown counts as paged.
pub fn is_flat_memory(sfp: &dyn Sfp) -> bool {
    sfp.is_flat_memory().value().unwrap_or(false)
}

/// Writes `dict` as the row of `logical`, stamped `last_update_time = now`.
/// An empty dictionary writes nothing.
pub async fn write_row(
    table: &Table,
    logical: &str,
    dict: &DiagDict,
    beautify: bool,
    now: i64,
) -> PublishOutcome {
    if dict.is_empty() {
        return PublishOutcome::Empty;
    }
    let mut fvs = to_field_values(dict, beautify);
    fvs.push((fields::LAST_UPDATE_TIME.to_string(), now.to_string()));

    match table.set(logical, &fvs).await {
        Ok(()) => PublishOutcome::Written,
        Err(e) => {
            warn!(port = logical, table = table.name(), error = %e, "Failed to write diagnostics");
            PublishOutcome::WriteFailed
        }
    }
}

/// Resolves logical ports to modules and publishes their dictionaries.
#[derive(Clone)]
pub struct DiagPublisher {
    mapping: Arc<PortMapping>,
    chassis: Arc<dyn Chassis>,
}

impl DiagPublisher {
    pub fn new(mapping: Arc<PortMapping>, chassis: Arc<dyn Chassis>) -> Self {
        Self { mapping, chassis }
    }

    /// Physical port and module of a logical port. Ganged ports resolve to
    /// their first physical port.
    pub fn resolve(&self, logical: &str) -> Option<(u32, Arc<dyn Sfp>)> {
        let physical = *self.mapping.physicals_of(logical).first()?;
        let sfp = self.chassis.get_sfp(physical)?;
        Some((physical, sfp))
    }

    /// Reads one dictionary for `logical` and writes it to `table`.
    pub async fn publish<R>(
        &self,
        logical: &str,
        table: &Table,
        reader: R,
        options: PublishOptions<'_>,
    ) -> PublishOutcome
    where
        R: FnOnce(&dyn Sfp) -> Capability<DiagDict>,
    {
        let Some((physical, sfp)) = self.resolve(logical) else {
            warn!(port = logical, table = table.name(), "No physical port, not publishing");
            return PublishOutcome::NoPhysicalPort;
        };
        if options.flat_memory_guard && is_flat_memory(sfp.as_ref()) {
            debug!(port = logical, table = table.name(), "Flat memory module, skipped");
            return PublishOutcome::FlatMemory;
        }

        match read_cached(options.cache, physical, sfp.as_ref(), reader) {
            Capability::Value(dict) => {
                write_row(table, logical, &dict, options.beautify, epoch_seconds()).await
            }
            Capability::NotImplemented => PublishOutcome::NotImplemented,
        }
    }
}
