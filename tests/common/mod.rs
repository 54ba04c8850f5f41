//! Shared test fixtures for integration tests.
#![allow(dead_code)]

use mgrid_sim::devices::{DeviceTable, Genset, StorageSuite};
use mgrid_sim::sim::series::{ExogenousSeries, GridSeries};
use mgrid_sim::sim::types::{CostParams, ProductionRow, SimConfig};
use mgrid_sim::sim::{Architecture, Grid, Microgrid};

/// Tolerance used for the bus balance checks.
pub const EPS: f64 = 1e-3;

pub fn table() -> DeviceTable {
    DeviceTable::builtin().expect("builtin table")
}

/// Hourly steps, no self-discharge so SOC only moves on dispatch.
pub fn hourly_config(horizon: usize) -> SimConfig {
    let mut cfg = SimConfig::new(1.0, horizon, 42);
    cfg.self_discharge = false;
    cfg
}

/// Default genset (100 kW, 5-90 % loading, fuel 0.4, 2 kg CO2/kWh).
pub fn default_genset() -> Genset {
    Genset {
        rated_kw: 100.0,
        p_min: 0.05,
        p_max: 0.9,
        fuel_cost: 0.4,
        co2_per_kwh: 2.0,
    }
}

/// Islanded site with a genset; each device sized to 100 kWh.
pub fn islanded(load: Vec<f64>, pv: Vec<f64>, costs: CostParams) -> Microgrid {
    let table = table();
    let cfg = hourly_config(load.len());
    let suite = StorageSuite::with_baseline(&table, 300.0, cfg.dt_hours).expect("suite");
    Microgrid::new(
        cfg,
        table,
        suite,
        ExogenousSeries::new(load, pv),
        Architecture {
            genset: Some(default_genset()),
            grid: None,
        },
        costs,
    )
    .expect("valid microgrid")
}

/// Grid-connected site without genset; `status` gives the grid state per step.
pub fn connected(load: Vec<f64>, pv: Vec<f64>, status: Vec<bool>, costs: CostParams) -> Microgrid {
    let table = table();
    let cfg = hourly_config(load.len());
    let suite = StorageSuite::with_baseline(&table, 300.0, cfg.dt_hours).expect("suite");
    let mut grid = GridSeries::constant(load.len(), 0.11, 0.05, 0.4);
    grid.status = status;
    Microgrid::new(
        cfg,
        table,
        suite,
        ExogenousSeries::new(load, pv).with_grid(grid),
        Architecture {
            genset: None,
            grid: Some(Grid::new(200.0)),
        },
        costs,
    )
    .expect("valid microgrid")
}

/// Costs that only price curtailed PV.
pub fn curtailment_only_costs() -> CostParams {
    CostParams {
        cost_loss_load: 0.0,
        cost_overgeneration: 0.0,
        cost_curtailment: 1.0,
        cost_co2: 0.0,
        include_storage_marginal: false,
    }
}

/// Imbalance between everything feeding the bus and everything it feeds.
pub fn residual(p: &ProductionRow) -> f64 {
    p.sources_kw() - p.sinks_kw()
}
