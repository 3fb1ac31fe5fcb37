//! Application services: use-case orchestration.
//!
//! Each service module implements a single use-case by composing domain logic
//! with port trait calls. Services import only from `crate::domain` and
//! `crate::application::ports`, never from `crate::infra`, `crate::commands`,
//! or `crate::output`.

pub mod database;
pub mod inventory;
pub mod lease;
pub mod migrator;
pub mod poll;
pub mod scale_down;
pub mod target_units;
pub mod troubleshooter;
pub mod volume_migrator;
