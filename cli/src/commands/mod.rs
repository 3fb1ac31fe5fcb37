//! Command implementations

pub mod config;
pub mod migrate;
pub mod troubleshoot;
pub mod version;
