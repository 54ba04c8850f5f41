//! Post-hoc KPI computation from an episode's ledgers.

use std::fmt;

use super::ledger::History;
use super::types::{ActionRow, ProductionRow, StepClass};
use crate::devices::{PerTechnology, Technology};

/// Aggregate indicators derived from a complete episode.
///
/// Computed from the ledgers after the fact so reported numbers always agree
/// with the recorded steps.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KpiReport {
    pub steps: usize,
    pub total_cost: f64,
    /// Total CO2 (kg).
    pub total_co2: f64,
    /// Unserved energy (kWh).
    pub loss_load_kwh: f64,
    pub pv_curtailed_kwh: f64,
    pub overgeneration_kwh: f64,
    pub genset_kwh: f64,
    pub grid_import_kwh: f64,
    pub grid_export_kwh: f64,
    /// Energy moved in and out of each device across the bus (kWh).
    pub storage_throughput_kwh: PerTechnology<f64>,
    pub self_discharge_kwh: f64,
    /// Steps per outcome: balanced, loss of load, curtailment, overgeneration.
    pub class_counts: [usize; 4],
    /// Sum over steps of |commanded - realized| (kW).
    pub total_penalty: f64,
}

/// Sum of |commanded - realized| over every flow of one step (kW).
pub(crate) fn step_penalty(action: &ActionRow, prod: &ProductionRow) -> f64 {
    let intent = &action.intent;
    let storage: f64 = Technology::ALL
        .iter()
        .map(|&t| {
            (intent.storage[t].charge_kw - prod.storage[t].charge_kw).abs()
                + (intent.storage[t].discharge_kw - prod.storage[t].discharge_kw).abs()
        })
        .sum();
    storage
        + (intent.grid_import_kw - prod.grid_import_kw).abs()
        + (intent.grid_export_kw - prod.grid_export_kw).abs()
        + (intent.genset_kw - prod.genset_kw).abs()
        + (intent.pv_consumed_kw - prod.pv_consumed_kw).abs()
}

impl KpiReport {
    /// Computes all KPIs from an episode's ledgers.
    ///
    /// # Arguments
    ///
    /// * `history` - Ledgers of the episode
    /// * `dt_hours` - Timestep duration in hours
    pub fn from_history(history: &History, dt_hours: f64) -> Self {
        let mut report = Self {
            steps: history.len(),
            total_cost: history.total_cost(),
            total_co2: history.total_co2(),
            ..Self::default()
        };

        for (action, p) in history.actions().iter().zip(history.production()) {
            report.loss_load_kwh += p.loss_load_kw * dt_hours;
            report.pv_curtailed_kwh += p.pv_curtailed_kw * dt_hours;
            report.overgeneration_kwh += p.overgeneration_kw * dt_hours;
            report.genset_kwh += p.genset_kw * dt_hours;
            report.grid_import_kwh += p.grid_import_kw * dt_hours;
            report.grid_export_kwh += p.grid_export_kw * dt_hours;
            for tech in Technology::ALL {
                let s = p.storage[tech];
                report.storage_throughput_kwh[tech] += (s.charge_kw + s.discharge_kw) * dt_hours;
            }
            report.self_discharge_kwh += p.self_discharge_kwh.0.iter().sum::<f64>();
            let idx = match p.class {
                StepClass::Balanced => 0,
                StepClass::LossOfLoad => 1,
                StepClass::Curtailment => 2,
                StepClass::Overgeneration => 3,
            };
            report.class_counts[idx] += 1;
            report.total_penalty += step_penalty(action, p);
        }

        report
    }
}

impl fmt::Display for KpiReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- KPI Report ---")?;
        writeln!(f, "Steps:                 {}", self.steps)?;
        writeln!(f, "Total cost:            {:.3}", self.total_cost)?;
        writeln!(f, "Total CO2:             {:.2} kg", self.total_co2)?;
        writeln!(f, "Loss of load:          {:.2} kWh", self.loss_load_kwh)?;
        writeln!(f, "Curtailed PV:          {:.2} kWh", self.pv_curtailed_kwh)?;
        writeln!(f, "Overgeneration:        {:.2} kWh", self.overgeneration_kwh)?;
        writeln!(f, "Genset energy:         {:.2} kWh", self.genset_kwh)?;
        writeln!(
            f,
            "Grid import / export:  {:.2} / {:.2} kWh",
            self.grid_import_kwh, self.grid_export_kwh
        )?;
        for (tech, kwh) in self.storage_throughput_kwh.iter() {
            writeln!(f, "{:<22} {:.2} kWh", format!("{tech} throughput:"), kwh)?;
        }
        writeln!(f, "Self-discharge:        {:.3} kWh", self.self_discharge_kwh)?;
        let [b, l, c, o] = self.class_counts;
        writeln!(
            f,
            "Outcomes:              {b} balanced, {l} loss-of-load, {c} curtailment, {o} overgeneration"
        )?;
        write!(f, "Dispatch penalty:      {:.3} kW", self.total_penalty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::types::{Co2Row, ControlIntent, CostRow, StorageCommand};

    fn record(h: &mut History, t: usize, p: ProductionRow, commanded_import: f64) {
        let intent = ControlIntent {
            grid_import_kw: commanded_import,
            ..ControlIntent::default()
        };
        h.record(
            ActionRow {
                timestep: t,
                intent,
            },
            ProductionRow { timestep: t, ..p },
            CostRow {
                timestep: t,
                total: 1.5,
                ..CostRow::default()
            },
            Co2Row {
                timestep: t,
                total: 0.5,
                ..Co2Row::default()
            },
        );
    }

    fn production(class: StepClass) -> ProductionRow {
        ProductionRow {
            timestep: 0,
            load_kw: 10.0,
            pv_kw: 0.0,
            pv_consumed_kw: 0.0,
            pv_curtailed_kw: 0.0,
            storage: PerTechnology([
                StorageCommand::discharge(4.0),
                StorageCommand::default(),
                StorageCommand::charge(2.0),
            ]),
            self_discharge_kwh: PerTechnology([0.1, 0.0, 0.2]),
            grid_import_kw: 8.0,
            grid_export_kw: 0.0,
            genset_kw: 0.0,
            loss_load_kw: 0.0,
            overgeneration_kw: 0.0,
            class,
        }
    }

    #[test]
    fn test_empty_history() {
        let report = KpiReport::from_history(&History::new(), 0.25);
        assert_eq!(report, KpiReport::default());
    }

    #[test]
    fn test_aggregates_energies() {
        let mut h = History::new();
        record(&mut h, 0, production(StepClass::Balanced), 8.0);
        let mut lol = production(StepClass::LossOfLoad);
        lol.loss_load_kw = 2.0;
        record(&mut h, 1, lol, 10.0);

        let r = KpiReport::from_history(&h, 0.5);
        assert_eq!(r.steps, 2);
        assert_eq!(r.total_cost, 3.0);
        assert_eq!(r.total_co2, 1.0);
        assert_eq!(r.loss_load_kwh, 1.0);
        assert_eq!(r.grid_import_kwh, 8.0);
        assert_eq!(r.storage_throughput_kwh[Technology::LiIon], 4.0);
        assert_eq!(r.storage_throughput_kwh[Technology::Flywheel], 2.0);
        assert!((r.self_discharge_kwh - 0.6).abs() < 1e-12);
        assert_eq!(r.class_counts, [1, 1, 0, 0]);
        // storage commands were not requested: 4 + 2 per step, plus 2 kW of
        // import that was not realized in the second step
        assert!((r.total_penalty - 14.0).abs() < 1e-12);
    }

    #[test]
    fn test_display_mentions_every_device() {
        let text = KpiReport::default().to_string();
        for tech in Technology::ALL {
            assert!(text.contains(tech.tag()));
        }
    }
}
