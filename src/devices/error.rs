//! Storage-layer errors.

use std::path::PathBuf;

use super::technology::Technology;
use crate::formula::FormulaError;

/// Errors raised while building or operating storage devices.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A discharge request exceeds the peak ceiling, or exceeds the continuous
    /// rating with no peak-burst budget left.
    #[error(
        "{technology}: requested {requested_kw:.3} kW exceeds the {limit_kw:.3} kW discharge limit"
    )]
    PeakPowerExceeded {
        technology: Technology,
        requested_kw: f64,
        limit_kw: f64,
    },

    /// A behaviour formula in the device table did not parse.
    #[error("{technology}: column {column}: {source}")]
    Formula {
        technology: Technology,
        column: &'static str,
        #[source]
        source: FormulaError,
    },

    /// A required behaviour curve is empty.
    #[error("{technology}: column {column} must not be empty")]
    MissingCurve {
        technology: Technology,
        column: &'static str,
    },

    /// A table row holds out-of-range scalar values.
    #[error("{technology}: {message}")]
    InvalidRow {
        technology: Technology,
        message: String,
    },

    /// The table has no row for a technology.
    #[error("device table has no row for {0}")]
    MissingTechnology(Technology),

    /// The table has two rows for the same technology.
    #[error("device table has more than one row for {0}")]
    DuplicateTechnology(Technology),

    /// Capacity or power given for a device is unusable.
    #[error("{technology}: invalid sizing: {message}")]
    InvalidSizing {
        technology: Technology,
        message: String,
    },

    #[error("cannot read device table \"{}\": {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("device table: {0}")]
    Csv(#[from] csv::Error),
}
