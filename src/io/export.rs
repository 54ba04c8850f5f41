//! CSV export of an episode's ledgers.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use crate::devices::Technology;
use crate::sim::ledger::History;

/// Columns before the per-device block.
const LEAD: &[&str] = &[
    "timestep",
    "time_hr",
    "load_kw",
    "pv_kw",
    "pv_consumed_kw",
    "pv_curtailed_kw",
];

/// Columns after the per-device block.
const TRAIL: &[&str] = &[
    "grid_import_kw",
    "grid_export_kw",
    "genset_kw",
    "loss_load_kw",
    "overgeneration_kw",
    "class",
    "cost",
    "co2_kg",
];

/// Full header: lead columns, charge/discharge/self-discharge per device in
/// tag order, then trailing columns.
pub fn header() -> Vec<String> {
    let mut cols: Vec<String> = LEAD.iter().map(ToString::to_string).collect();
    for tech in Technology::ALL {
        let p = tech.column_prefix();
        cols.push(format!("{p}_charge_kw"));
        cols.push(format!("{p}_discharge_kw"));
        cols.push(format!("{p}_self_discharge_kwh"));
    }
    cols.extend(TRAIL.iter().map(ToString::to_string));
    cols
}

/// Exports the ledgers to a CSV file at the given path.
///
/// # Arguments
///
/// * `history` - Ledgers of one episode
/// * `dt_hours` - Step duration, for the `time_hr` column
/// * `path` - Output file path
///
/// # Errors
///
/// Returns an `io::Error` if file creation or writing fails.
pub fn export_csv(history: &History, dt_hours: f64, path: &Path) -> io::Result<()> {
    let file = File::create(path)?;
    let buf = io::BufWriter::new(file);
    write_csv(history, dt_hours, buf)
}

/// Writes the ledgers as CSV to any writer, one row per recorded step.
///
/// Output is deterministic for identical ledgers.
///
/// # Errors
///
/// Returns an `io::Error` if writing fails.
pub fn write_csv(history: &History, dt_hours: f64, writer: impl Write) -> io::Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);
    wtr.write_record(header())?;

    let rows = history
        .production()
        .iter()
        .zip(history.cost())
        .zip(history.co2());
    for ((p, cost), co2) in rows {
        let mut rec = vec![
            p.timestep.to_string(),
            format!("{:.2}", p.timestep as f64 * dt_hours),
            format!("{:.4}", p.load_kw),
            format!("{:.4}", p.pv_kw),
            format!("{:.4}", p.pv_consumed_kw),
            format!("{:.4}", p.pv_curtailed_kw),
        ];
        for tech in Technology::ALL {
            rec.push(format!("{:.4}", p.storage[tech].charge_kw));
            rec.push(format!("{:.4}", p.storage[tech].discharge_kw));
            rec.push(format!("{:.6}", p.self_discharge_kwh[tech]));
        }
        rec.extend([
            format!("{:.4}", p.grid_import_kw),
            format!("{:.4}", p.grid_export_kw),
            format!("{:.4}", p.genset_kw),
            format!("{:.4}", p.loss_load_kw),
            format!("{:.4}", p.overgeneration_kw),
            p.class.to_string(),
            format!("{:.6}", cost.total),
            format!("{:.6}", co2.total),
        ]);
        wtr.write_record(&rec)?;
    }

    wtr.flush()?;
    Ok(())
}
