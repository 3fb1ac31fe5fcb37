//! Infrastructure layer: concrete implementations of application port traits.
//!
//! This module contains all I/O-performing code: HTTP calls to the control
//! plane, the fleet API and database peers, plus local config files.
//!
//! Imports from `crate::domain` and `crate::application::ports` are allowed.
//! Imports from `crate::commands` or `crate::output` are forbidden.

pub mod app_config;
pub mod config;
pub mod control_plane;
pub mod db_peer;
pub mod fleet;
pub mod http;
