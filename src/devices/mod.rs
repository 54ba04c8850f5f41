//! Storage devices and the dispatchable generator.

pub mod error;
/// Backup generator model.
pub mod genset;
/// Single storage device model.
pub mod storage;
/// Storage fleet owned by the dispatch engine.
pub mod suite;
/// Device-behaviour table loading.
pub mod table;
pub mod technology;

pub use error::StorageError;
pub use genset::Genset;
pub use storage::{
    ChargeOutcome, ChargeRequest, CostAccumulator, DeviceSnapshot, DischargeOutcome,
    DischargeRequest, Sizing, StorageDevice,
};
pub use suite::{SocResetPolicy, StorageSuite};
pub use table::{DeviceSpec, DeviceTable};
pub use technology::{PerTechnology, Technology};
