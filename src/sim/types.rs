//! Core simulation types: configuration, control intents, ledger rows and
//! step outcomes.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::action::SplitPolicy;
use crate::devices::{PerTechnology, SocResetPolicy, Technology};

/// Default reward normalization: one unit of reward per 4000 cost units.
pub const DEFAULT_REWARD_SCALE: f64 = 1.0 / 4000.0;

/// Tolerance (kWh-equivalent power) under which a step counts as balanced.
pub const BALANCE_TOLERANCE: f64 = 1e-3;

/// Centralized simulation configuration.
///
/// The engine and every driver read timing, horizon and seed from here; no
/// component keeps its own copy of `dt_hours` or a global RNG.
///
/// # Examples
///
/// ```
/// use mgrid_sim::sim::types::SimConfig;
///
/// let cfg = SimConfig::new(0.25, 96, 42);
/// assert_eq!(cfg.horizon, 96);
/// assert_eq!(cfg.hours(), 24.0);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct SimConfig {
    /// Duration of one timestep in hours.
    pub dt_hours: f64,
    /// Maximum number of steps per episode.
    pub horizon: usize,
    /// Master random seed, passed explicitly to profiles and drivers.
    pub seed: u64,
    /// Multiplier turning step cost into (negated) reward.
    pub reward_scale: f64,
    /// SOC handling on episode reset.
    pub soc_reset: SocResetPolicy,
    /// How combined actions split power across devices.
    pub split_policy: SplitPolicy,
    /// Apply device self-discharge after every step.
    pub self_discharge: bool,
}

impl SimConfig {
    /// Creates a configuration with default policies.
    ///
    /// # Panics
    ///
    /// Panics if `dt_hours` is not a positive finite number.
    pub fn new(dt_hours: f64, horizon: usize, seed: u64) -> Self {
        assert!(
            dt_hours.is_finite() && dt_hours > 0.0,
            "dt_hours must be > 0"
        );
        Self {
            dt_hours,
            horizon,
            seed,
            reward_scale: DEFAULT_REWARD_SCALE,
            soc_reset: SocResetPolicy::default(),
            split_policy: SplitPolicy::default(),
            self_discharge: true,
        }
    }

    /// Simulated hours covered by a full-horizon episode.
    pub fn hours(&self) -> f64 {
        self.horizon as f64 * self.dt_hours
    }
}

/// Unit costs applied when recording a step.
///
/// Quantities are energies: a power held for one step is multiplied by
/// `dt_hours` before pricing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostParams {
    /// Cost per kWh of unserved load.
    pub cost_loss_load: f64,
    /// Cost per kWh of overgeneration.
    pub cost_overgeneration: f64,
    /// Cost per kWh of curtailed PV.
    pub cost_curtailment: f64,
    /// Cost per kg of CO2.
    pub cost_co2: f64,
    /// Add storage operating cost to the step total.
    pub include_storage_marginal: bool,
}

impl Default for CostParams {
    fn default() -> Self {
        Self {
            cost_loss_load: 10.0,
            cost_overgeneration: 1.0,
            cost_curtailment: 0.0,
            cost_co2: 0.1,
            include_storage_marginal: false,
        }
    }
}

/// Commanded or realized power of one storage device for one step (kW).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StorageCommand {
    pub charge_kw: f64,
    pub discharge_kw: f64,
}

impl StorageCommand {
    pub fn charge(kw: f64) -> Self {
        Self {
            charge_kw: kw,
            discharge_kw: 0.0,
        }
    }

    pub fn discharge(kw: f64) -> Self {
        Self {
            charge_kw: 0.0,
            discharge_kw: kw,
        }
    }
}

/// Desired power flows for one step, produced by
/// [`Microgrid::actions_agent`](super::engine::Microgrid::actions_agent) or
/// by a driver directly.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ControlIntent {
    pub load_kw: f64,
    pub pv_kw: f64,
    pub pv_consumed_kw: f64,
    pub storage: PerTechnology<StorageCommand>,
    pub grid_import_kw: f64,
    pub grid_export_kw: f64,
    pub genset_kw: f64,
}

/// How a step's residual PV requirement was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepClass {
    Balanced,
    LossOfLoad,
    Curtailment,
    Overgeneration,
}

impl fmt::Display for StepClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Balanced => "balanced",
            Self::LossOfLoad => "loss-of-load",
            Self::Curtailment => "curtailment",
            Self::Overgeneration => "overgeneration",
        })
    }
}

/// The action ledger row: the intent exactly as commanded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActionRow {
    pub timestep: usize,
    pub intent: ControlIntent,
}

/// The production ledger row: what was physically realized (kW).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProductionRow {
    pub timestep: usize,
    pub load_kw: f64,
    pub pv_kw: f64,
    pub pv_consumed_kw: f64,
    pub pv_curtailed_kw: f64,
    pub storage: PerTechnology<StorageCommand>,
    /// Energy lost to self-discharge after the dispatch (kWh).
    pub self_discharge_kwh: PerTechnology<f64>,
    pub grid_import_kw: f64,
    pub grid_export_kw: f64,
    pub genset_kw: f64,
    pub loss_load_kw: f64,
    pub overgeneration_kw: f64,
    pub class: StepClass,
}

impl ProductionRow {
    /// Total delivered power of all sources, PV included.
    pub fn sources_kw(&self) -> f64 {
        self.pv_consumed_kw
            + self.storage.0.iter().map(|s| s.discharge_kw).sum::<f64>()
            + self.grid_import_kw
            + self.genset_kw
            + self.loss_load_kw
    }

    /// Total absorbed power of all sinks, overgeneration included.
    pub fn sinks_kw(&self) -> f64 {
        self.load_kw
            + self.storage.0.iter().map(|s| s.charge_kw).sum::<f64>()
            + self.grid_export_kw
            + self.overgeneration_kw
    }
}

/// The cost ledger row. Every term is a cost for the step; export revenue is
/// negative.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CostRow {
    pub timestep: usize,
    pub loss_load: f64,
    pub overgeneration: f64,
    pub curtailment: f64,
    pub genset: f64,
    pub grid_import: f64,
    pub grid_export: f64,
    pub co2: f64,
    /// Storage operating cost; part of `total` only when configured.
    pub storage: f64,
    pub total: f64,
}

/// The CO2 ledger row (kg).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Co2Row {
    pub timestep: usize,
    pub genset: f64,
    pub grid: f64,
    pub total: f64,
}

/// Per-device part of the state vector.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StorageObservation {
    pub soc: f64,
    pub charge_headroom_kw: f64,
    pub discharge_headroom_kw: f64,
    /// Device sits on its SOC floor; not part of [`Observation::to_vec`].
    pub at_floor: bool,
}

/// Grid part of the state vector.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GridObservation {
    pub status: bool,
    pub price_import: f64,
    pub price_export: f64,
    pub co2_per_kwh: f64,
}

/// The externally visible state vector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    pub timestep: usize,
    pub load_kw: f64,
    pub pv_kw: f64,
    pub storage: PerTechnology<StorageObservation>,
    pub grid: Option<GridObservation>,
}

impl Observation {
    /// Net load (load minus PV); positive means deficit.
    pub fn net_load_kw(&self) -> f64 {
        self.load_kw - self.pv_kw
    }

    /// Flattens the observation in its fixed field order.
    pub fn to_vec(&self) -> Vec<f64> {
        let mut out = vec![self.load_kw, self.pv_kw];
        for s in &self.storage.0 {
            out.extend([s.soc, s.charge_headroom_kw, s.discharge_headroom_kw]);
        }
        if let Some(g) = self.grid {
            out.extend([
                if g.status { 1.0 } else { 0.0 },
                g.price_import,
                g.price_export,
                g.co2_per_kwh,
            ]);
        }
        out
    }

    /// Labels matching [`Observation::to_vec`].
    pub fn field_names(with_grid: bool) -> Vec<String> {
        let mut names = vec!["load".to_string(), "pv".to_string()];
        for tech in Technology::ALL {
            let p = tech.column_prefix();
            names.push(format!("{p}_soc"));
            names.push(format!("{p}_charge_headroom"));
            names.push(format!("{p}_discharge_headroom"));
        }
        if with_grid {
            names.extend(
                ["grid_status", "price_import", "price_export", "grid_co2"]
                    .map(String::from),
            );
        }
        names
    }
}

/// Result of one call to [`Microgrid::run`](super::engine::Microgrid::run).
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    /// State after the step (next exogenous values, updated devices).
    pub observation: Observation,
    /// Negated, scaled cost of the step.
    pub reward: f64,
    /// True once the episode has reached its horizon or the end of the data.
    pub done: bool,
}

impl fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let o = &self.observation;
        write!(
            f,
            "t={:>4} load={:>7.2} pv={:>7.2} soc=[{:.3} {:.3} {:.3}] reward={:>9.5}{}",
            o.timestep,
            o.load_kw,
            o.pv_kw,
            o.storage.0[0].soc,
            o.storage.0[1].soc,
            o.storage.0[2].soc,
            self.reward,
            if self.done { " done" } else { "" }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observation_names_match_values() {
        let obs = Observation {
            timestep: 0,
            load_kw: 1.0,
            pv_kw: 2.0,
            storage: PerTechnology::default(),
            grid: Some(GridObservation::default()),
        };
        assert_eq!(obs.to_vec().len(), Observation::field_names(true).len());

        let islanded = Observation { grid: None, ..obs };
        assert_eq!(islanded.to_vec().len(), 11);
        assert_eq!(Observation::field_names(false)[2], "li_ion_soc");
    }

    #[test]
    fn test_production_row_balance_helpers() {
        let row = ProductionRow {
            timestep: 0,
            load_kw: 10.0,
            pv_kw: 4.0,
            pv_consumed_kw: 4.0,
            pv_curtailed_kw: 0.0,
            storage: PerTechnology([
                StorageCommand::discharge(3.0),
                StorageCommand::charge(1.0),
                StorageCommand::default(),
            ]),
            self_discharge_kwh: PerTechnology::default(),
            grid_import_kw: 4.0,
            grid_export_kw: 0.0,
            genset_kw: 0.0,
            loss_load_kw: 0.0,
            overgeneration_kw: 0.0,
            class: StepClass::Balanced,
        };
        assert_eq!(row.sources_kw(), 11.0);
        assert_eq!(row.sinks_kw(), 11.0);
    }
}
