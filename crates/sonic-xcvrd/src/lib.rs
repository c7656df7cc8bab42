//! Transceiver monitoring daemon for SONiC.
//!
//! Samples every pluggable module through the platform driver and mirrors
//! what it reads into STATE_DB, one row per logical port:
//!
//! | Table | Written by |
//! |-------|------------|
//! | `TRANSCEIVER_STATUS` (`status`, `error`) | [`state_loop`] on every module transition |
//! | `TRANSCEIVER_INFO`, `TRANSCEIVER_DOM_THRESHOLD` | [`state_loop`] on insertion, [`info_loop`] every cycle |
//! | `TRANSCEIVER_DOM_SENSOR`, `TRANSCEIVER_STATUS` (module fields) | [`info_loop`] |
//! | `TRANSCEIVER_{DOM,STATUS}_FLAG*` | [`info_loop`] through [`flags`] |
//! | `TRANSCEIVER_VDM_*` | [`info_loop`] inside a [`vdm`] freeze region |
//!
//! The Y-cable controller from `sonic-ycabled` runs in-process and receives
//! module transitions from the state event loop.

pub mod beautify;
pub mod daemon;
pub mod flags;
pub mod info_loop;
pub mod publisher;
pub mod state_loop;
pub mod vdm;

pub use daemon::Supervisor;
pub use flags::{FlagMetadataEngine, FlagRecord};
pub use info_loop::{CycleReport, InfoUpdateLoop};
pub use publisher::{DiagPublisher, PublishOptions, PublishOutcome};
pub use state_loop::{InsertionSoak, StateEventLoop, StateLoopExit, StateLoopHandle};
pub use vdm::{FreezeTimings, VdmFreezeCoordinator};
