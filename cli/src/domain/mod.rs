//! Domain layer: pure business logic, types, and validation.
//!
//! This module has zero imports from `crate::infra`, `crate::commands`,
//! `crate::application`, `tokio`, `std::fs`, `std::process`, or `std::net`.
//! All functions are synchronous and take data in, returning data out.

pub mod config;
pub mod database;
pub mod diagnose;
pub mod error;
pub mod guest;
pub mod inventory;
pub mod plan;
pub mod recovery;
pub mod synth;
pub mod validate;
pub mod volumes;

pub use config::{HangarConfig, MigrationTuning};
pub use error::{
    LockError, MigrateError, Step, TimedOut, TroubleshootError, ValidationError, is_aborted,
    is_already_locked, is_timeout,
};
pub use inventory::{GroupCounts, Snapshot};
pub use recovery::{Milestone, RecoveryLog, RecoveryState, RollbackAction};
pub use volumes::MigratedVolume;
