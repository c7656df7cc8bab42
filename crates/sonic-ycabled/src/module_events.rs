//! Module transitions for a standalone ycabled.
//!
//! Inside xcvrd the state event loop hands transitions straight to the
//! controller. Run on its own, ycabled learns them from the rows xcvrd writes
//! to STATE_DB TRANSCEIVER_STATUS.

use sonic_xcvr_common::tables::fields;
use sonic_xcvr_common::{
    ChangeEventSink, KeyOpFieldsValues, ModuleState, Operation, PortChangeEvent, PortMapping, Result,
    TableHelper, XcvrTable,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Turns TRANSCEIVER_STATUS writes into module transitions, one per change.
#[derive(Debug)]
pub struct StatusFollower {
    mapping: Arc<PortMapping>,
    last: HashMap<u32, ModuleState>,
}

impl StatusFollower {
    pub fn new(mapping: Arc<PortMapping>) -> Self {
        Self {
            mapping,
            last: HashMap::new(),
        }
    }

    /// The transition carried by one row change, if it is new.
    pub fn on_status(&mut self, entry: &KeyOpFieldsValues) -> Option<PortChangeEvent> {
        if entry.op == Operation::Del {
            return None;
        }
        let state = ModuleState::from_raw(entry.get_field(fields::STATUS)?)?;
        let physical = *self.mapping.physicals_of(&entry.key).first()?;
        if self.last.insert(physical, state) == Some(state) {
            return None;
        }
        Some(PortChangeEvent { physical, state })
    }
}

/// Follows TRANSCEIVER_STATUS on every namespace until cancelled.
pub async fn spawn_status_follower(
    tables: &TableHelper,
    mapping: Arc<PortMapping>,
    sink: mpsc::UnboundedSender<PortChangeEvent>,
    cancel: CancellationToken,
) -> Result<JoinHandle<()>> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    for asic in tables.namespaces() {
        let Some(table) = tables.get(*asic, XcvrTable::Status) else {
            continue;
        };
        let mut subscription = table.subscribe().await?;
        let tx = tx.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    entry = subscription.recv() => match entry {
                        Some(entry) => if tx.send(entry).is_err() { break },
                        None => break,
                    },
                }
            }
        });
    }
    drop(tx);

    let mut follower = StatusFollower::new(mapping);
    Ok(tokio::spawn(async move {
        loop {
            let entry = tokio::select! {
                _ = cancel.cancelled() => break,
                entry = rx.recv() => match entry {
                    Some(entry) => entry,
                    None => {
                        warn!("TRANSCEIVER_STATUS subscriptions closed");
                        break;
                    }
                },
            };
            if let Some(event) = follower.on_status(&entry) {
                debug!(physical = event.physical, state = %event.state, "Module transition");
                sink.notify(event);
            }
        }
    }))
}
