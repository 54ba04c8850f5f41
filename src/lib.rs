//! Islandable microgrid simulator: storage energy accounting and per-step
//! dispatch reconciliation.

/// TOML scenario configuration and presets.
pub mod config;
pub mod devices;
pub mod formula;
pub mod io;
pub mod logging;
pub mod profile;
pub mod scenario;
/// Dispatch engine, actions, ledgers and drivers.
pub mod sim;
