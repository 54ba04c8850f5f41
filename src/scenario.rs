//! Builds a ready-to-run [`Microgrid`] from a [`ScenarioConfig`].

use tracing::info;

use crate::config::{ConfigError, ScenarioConfig};
use crate::devices::{
    DeviceTable, Genset, PerTechnology, Sizing, StorageError, StorageSuite, Technology,
};
use crate::profile::synthesize;
use crate::sim::series::{ExogenousSeries, GridSeries, SeriesError};
use crate::sim::types::{CostParams, SimConfig};
use crate::sim::{Architecture, DispatchError, Grid, Microgrid};

/// Errors raised while assembling a scenario.
#[derive(Debug, thiserror::Error)]
pub enum ScenarioError {
    /// The configuration failed validation; every problem is listed.
    #[error("invalid scenario: {}", join(.0))]
    Invalid(Vec<ConfigError>),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Series(#[from] SeriesError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

fn join(errors: &[ConfigError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Average energy the site consumes per day (kWh).
fn daily_load_kwh(series: &ExogenousSeries) -> f64 {
    let len = series.len();
    if len == 0 {
        return 0.0;
    }
    let mean_kw = series.load_kw[..len].iter().sum::<f64>() / len as f64;
    mean_kw * 24.0
}

/// Loads or generates the exogenous series and aligns its grid signals with
/// the configured architecture.
fn load_series(cfg: &ScenarioConfig) -> Result<ExogenousSeries, SeriesError> {
    let s = &cfg.simulation;
    let mut series = match &cfg.data.series {
        Some(path) => {
            info!(path = %path.display(), "loading exogenous series");
            ExogenousSeries::from_path(path)?
        }
        None => synthesize(&cfg.profile, &cfg.grid, s.dt_hours, s.seed),
    };
    if series.is_empty() {
        return Err(SeriesError::Empty);
    }

    let g = &cfg.grid;
    match (g.enabled, series.has_grid()) {
        (true, false) => {
            let len = series.len();
            series = series.with_grid(GridSeries::constant(
                len,
                g.price_import,
                g.price_export,
                g.co2_per_kwh,
            ));
        }
        (false, true) => series.grid = None,
        _ => {}
    }
    Ok(series)
}

/// Assembles the engine described by `cfg`.
///
/// Unset storage capacities are sized from the load; unset genset and grid
/// ratings are sized from the peak load.
///
/// # Errors
///
/// Returns [`ScenarioError::Invalid`] when validation fails, and the
/// underlying error when the device table or series cannot be loaded.
pub fn build_microgrid(cfg: &ScenarioConfig) -> Result<Microgrid, ScenarioError> {
    let errors = cfg.validate();
    if !errors.is_empty() {
        return Err(ScenarioError::Invalid(errors));
    }

    let s = &cfg.simulation;
    let table = match &cfg.data.device_table {
        Some(path) => DeviceTable::from_path(path)?,
        None => DeviceTable::builtin()?,
    };
    let series = load_series(cfg)?;

    let share_kwh = daily_load_kwh(&series) / 3.0;
    let st = &cfg.storage;
    let sizes = PerTechnology::from_fn(|tech| {
        let configured = match tech {
            Technology::LiIon => st.li_ion_kwh,
            Technology::Flow => st.flow_kwh,
            Technology::Flywheel => st.flywheel_kwh,
        };
        Sizing {
            capacity_kwh: configured.unwrap_or(share_kwh),
            power_kw: st.power_kw,
        }
    });
    let suite = StorageSuite::from_table(&table, &sizes, s.dt_hours)?;

    let peak = series.peak_load_kw();
    let genset = cfg.genset.enabled.then(|| Genset {
        rated_kw: cfg
            .genset
            .rated_kw
            .unwrap_or_else(|| Genset::rated_for_peak(peak)),
        p_min: cfg.genset.p_min,
        p_max: cfg.genset.p_max,
        fuel_cost: cfg.genset.fuel_cost,
        co2_per_kwh: cfg.genset.co2_per_kwh,
    });
    let grid = cfg.grid.enabled.then(|| {
        Grid::new(
            cfg.grid
                .rated_kw
                .unwrap_or_else(|| Grid::rated_for_peak(peak)),
        )
    });

    let mut sim = SimConfig::new(s.dt_hours, s.horizon, s.seed);
    sim.reward_scale = s.reward_scale;
    sim.soc_reset = s.soc_reset;
    sim.split_policy = s.split_policy;
    sim.self_discharge = s.self_discharge;

    let c = &cfg.costs;
    let costs = CostParams {
        cost_loss_load: c.loss_load,
        cost_overgeneration: c.overgeneration,
        cost_curtailment: c.curtailment,
        cost_co2: c.co2,
        include_storage_marginal: c.include_storage_marginal,
    };

    info!(
        steps = series.len(),
        peak_load_kw = peak,
        li_ion_kwh = sizes[Technology::LiIon].capacity_kwh,
        flow_kwh = sizes[Technology::Flow].capacity_kwh,
        flywheel_kwh = sizes[Technology::Flywheel].capacity_kwh,
        genset_kw = genset.as_ref().map(|g| g.rated_kw),
        grid_kw = grid.as_ref().map(Grid::max_import_kw),
        "scenario assembled"
    );

    let mut mg = Microgrid::new(sim, table, suite, series, Architecture { genset, grid }, costs)?;
    if let Some(fraction) = s.train_fraction {
        mg.train_test_split(fraction)?;
        mg.reset();
    }
    Ok(mg)
}
