/// Discrete actions and their mapping onto control intents.
pub mod action;
pub mod balance;
/// Episode clock.
pub mod clock;
pub mod engine;
pub mod error;
/// Main-grid connection limits.
pub mod grid;
pub mod kpi;
pub mod ledger;
/// Built-in drivers and the episode loop.
pub mod policy;
pub mod series;
pub mod types;

pub use action::{Action, SplitPolicy};
pub use engine::{Architecture, Microgrid, ResetMode};
pub use error::DispatchError;
pub use grid::Grid;
pub use kpi::KpiReport;
pub use series::{ExogenousSeries, GridSeries};
pub use types::{ControlIntent, CostParams, Observation, SimConfig, StepOutcome};
