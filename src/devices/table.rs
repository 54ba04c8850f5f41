//! Device-behaviour table: one typed record per storage technology.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::Deserialize;

use super::error::StorageError;
use super::technology::Technology;
use crate::formula::{Formula, VAR_X, VAR_XY};

/// Built-in behaviour table used when no file is supplied.
///
/// Curves over `x` are functions of state of charge, except
/// `max_cont_discharge` (capacity in kWh). `max_peak_discharge` takes
/// capacity `x` and continuous power `y`; `capital_cost` takes capacity and
/// power in MWh / MW.
pub const BUILTIN_TABLE: &str = "\
type,max_charge,min_charge,max_cont_discharge,max_peak_discharge,eff_charge,eff_discharge,self_discharge,capital_cost,marginal_cost,resp_time,peak_time
li-ion,1.0,0.1,x*0.5,y*2,0.97 - 0.04*x,0.96 - 0.02*(1-x),0.05,300000*x + 150000*y,0.01,0.2,4
flow,1.0,0.15,x/4,y*1.2,0.85,0.83 - 0.05*(1-x),0.02,400000*x + 600000*y,0.02,1.0,2
flywheel,1.0,0.05,x*4,y*1.5,0.95,0.95,2 + 8*x**2,2000000*x + 300000*y,0.005,0.01,8
";

#[derive(Debug, Deserialize)]
struct DeviceRow {
    #[serde(rename = "type")]
    technology: Technology,
    max_charge: f64,
    min_charge: f64,
    max_cont_discharge: String,
    max_peak_discharge: String,
    eff_charge: String,
    eff_discharge: String,
    self_discharge: String,
    capital_cost: String,
    marginal_cost: f64,
    resp_time: f64,
    peak_time: u32,
}

/// Parsed, validated behaviour of one storage technology.
#[derive(Debug, Clone)]
pub struct DeviceSpec {
    pub technology: Technology,
    /// Maximum state of charge (fraction of capacity).
    pub max_soc: f64,
    /// Minimum state of charge (fraction of capacity).
    pub min_soc: f64,
    /// Continuous power rating (kW) as a function of capacity `x` (kWh).
    pub max_cont_discharge: Formula,
    /// Peak discharge ceiling (kW) over capacity `x` and power `y`.
    pub max_peak_discharge: Formula,
    /// Charge efficiency as a function of SOC.
    pub eff_charge: Formula,
    /// Discharge efficiency as a function of SOC.
    pub eff_discharge: Formula,
    /// Self-discharge in per-mille of capacity per step, as a function of SOC.
    pub self_discharge: Formula,
    /// Capital cost over capacity (MWh) and power (MW).
    pub capital_cost: Formula,
    /// Operating cost per kWh moved across the bus.
    pub marginal_cost: f64,
    /// Response time (s).
    pub resp_time_s: f64,
    /// Consecutive steps the device may discharge above its continuous rating.
    pub peak_time: u32,
}

impl DeviceSpec {
    fn from_row(row: DeviceRow) -> Result<Self, StorageError> {
        let tech = row.technology;
        let parse = |column: &'static str, src: &str, vars: &[&str]| {
            Formula::parse(src, vars).map_err(|source| StorageError::Formula {
                technology: tech,
                column,
                source,
            })
        };
        let required = |column: &'static str, formula: Formula| {
            if formula.is_empty() {
                Err(StorageError::MissingCurve {
                    technology: tech,
                    column,
                })
            } else {
                Ok(formula)
            }
        };

        if !(0.0..=1.0).contains(&row.min_charge)
            || !(0.0..=1.0).contains(&row.max_charge)
            || row.min_charge >= row.max_charge
        {
            return Err(StorageError::InvalidRow {
                technology: tech,
                message: format!(
                    "need 0 <= min_charge < max_charge <= 1, got {} and {}",
                    row.min_charge, row.max_charge
                ),
            });
        }
        if row.marginal_cost < 0.0 || row.resp_time < 0.0 {
            return Err(StorageError::InvalidRow {
                technology: tech,
                message: "marginal_cost and resp_time must be >= 0".to_string(),
            });
        }

        Ok(Self {
            technology: tech,
            max_soc: row.max_charge,
            min_soc: row.min_charge,
            max_cont_discharge: required(
                "max_cont_discharge",
                parse("max_cont_discharge", &row.max_cont_discharge, VAR_X)?,
            )?,
            max_peak_discharge: parse("max_peak_discharge", &row.max_peak_discharge, VAR_XY)?,
            eff_charge: required("eff_charge", parse("eff_charge", &row.eff_charge, VAR_X)?)?,
            eff_discharge: required(
                "eff_discharge",
                parse("eff_discharge", &row.eff_discharge, VAR_X)?,
            )?,
            self_discharge: parse("self_discharge", &row.self_discharge, VAR_X)?,
            capital_cost: parse("capital_cost", &row.capital_cost, VAR_XY)?,
            marginal_cost: row.marginal_cost,
            resp_time_s: row.resp_time,
            peak_time: row.peak_time,
        })
    }
}

/// The complete behaviour table, one [`DeviceSpec`] per technology.
#[derive(Debug, Clone)]
pub struct DeviceTable {
    specs: BTreeMap<Technology, DeviceSpec>,
}

impl DeviceTable {
    /// Parses the built-in table.
    ///
    /// # Errors
    ///
    /// Only fails if [`BUILTIN_TABLE`] itself is broken.
    pub fn builtin() -> Result<Self, StorageError> {
        Self::from_reader(BUILTIN_TABLE.as_bytes())
    }

    /// Loads a table from a CSV file.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if the file cannot be read, a row is
    /// malformed, or a technology is missing or repeated.
    pub fn from_path(path: &Path) -> Result<Self, StorageError> {
        let file = File::open(path).map_err(|source| StorageError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_reader(file)
    }

    /// Loads a table from any CSV source with a header row.
    ///
    /// Columns not used by the simulator are ignored. A UTF-8 byte-order mark
    /// on the header is tolerated.
    ///
    /// # Errors
    ///
    /// See [`DeviceTable::from_path`].
    pub fn from_reader(reader: impl Read) -> Result<Self, StorageError> {
        let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);

        let headers = rdr.headers()?.clone();
        let cleaned: csv::StringRecord = headers
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}'))
            .collect();
        rdr.set_headers(cleaned);

        let mut specs = BTreeMap::new();
        for record in rdr.deserialize::<DeviceRow>() {
            let spec = DeviceSpec::from_row(record?)?;
            let tech = spec.technology;
            if specs.insert(tech, spec).is_some() {
                return Err(StorageError::DuplicateTechnology(tech));
            }
        }

        for tech in Technology::ALL {
            if !specs.contains_key(&tech) {
                return Err(StorageError::MissingTechnology(tech));
            }
        }

        Ok(Self { specs })
    }

    /// Returns the spec for `technology`.
    pub fn spec(&self, technology: Technology) -> &DeviceSpec {
        // every technology is present after construction
        &self.specs[&technology]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "type,max_charge,min_charge,max_cont_discharge,max_peak_discharge,eff_charge,eff_discharge,self_discharge,capital_cost,marginal_cost,resp_time,peak_time\n";

    fn table_with(li_row: &str) -> Result<DeviceTable, StorageError> {
        let src = format!(
            "{HEADER}{li_row}\nflow,1,0.1,x/4,y,0.8,0.8,,x+y,0,1,2\nflywheel,1,0.05,x*4,y*1.5,0.95,0.95,2,x,0,0.01,8\n"
        );
        DeviceTable::from_reader(src.as_bytes())
    }

    #[test]
    fn builtin_table_parses() {
        let table = DeviceTable::builtin().expect("builtin table should parse");
        for tech in Technology::ALL {
            assert_eq!(table.spec(tech).technology, tech);
        }
        assert_eq!(table.spec(Technology::LiIon).peak_time, 4);
        assert_eq!(table.spec(Technology::Flow).min_soc, 0.15);
    }

    #[test]
    fn empty_self_discharge_is_allowed() {
        let table = table_with("li-ion,1,0.1,x,y*2,0.9,0.9,0.1,x,0,0.2,4").expect("should parse");
        assert!(table.spec(Technology::Flow).self_discharge.is_empty());
    }

    #[test]
    fn malformed_formula_aborts_loading() {
        let err = table_with("li-ion,1,0.1,x,y*2,0.9,sqrt(x),0.1,x,0,0.2,4");
        assert!(matches!(
            err,
            Err(StorageError::Formula {
                column: "eff_discharge",
                ..
            })
        ));
    }

    #[test]
    fn wrong_placeholder_is_rejected() {
        // efficiency curves take only the state of charge
        let err = table_with("li-ion,1,0.1,x,y*2,0.9 + y,0.9,0.1,x,0,0.2,4");
        assert!(matches!(err, Err(StorageError::Formula { .. })));
    }

    #[test]
    fn empty_efficiency_is_rejected() {
        let err = table_with("li-ion,1,0.1,x,y*2,,0.9,0.1,x,0,0.2,4");
        assert!(matches!(
            err,
            Err(StorageError::MissingCurve {
                column: "eff_charge",
                ..
            })
        ));
    }

    #[test]
    fn soc_bounds_are_validated() {
        let err = table_with("li-ion,0.2,0.5,x,y*2,0.9,0.9,0.1,x,0,0.2,4");
        assert!(matches!(err, Err(StorageError::InvalidRow { .. })));
    }

    #[test]
    fn missing_technology_is_rejected() {
        let src = format!("{HEADER}li-ion,1,0.1,x,y*2,0.9,0.9,0.1,x,0,0.2,4\n");
        let err = DeviceTable::from_reader(src.as_bytes());
        assert!(matches!(err, Err(StorageError::MissingTechnology(_))));
    }

    #[test]
    fn duplicate_technology_is_rejected() {
        let err = table_with(
            "li-ion,1,0.1,x,y*2,0.9,0.9,0.1,x,0,0.2,4\nli-ion,1,0.1,x,y*2,0.9,0.9,0.1,x,0,0.2,4",
        );
        assert!(matches!(
            err,
            Err(StorageError::DuplicateTechnology(Technology::LiIon))
        ));
    }

    #[test]
    fn unknown_technology_is_a_csv_error() {
        let err = table_with("lead-acid,1,0.1,x,y*2,0.9,0.9,0.1,x,0,0.2,4");
        assert!(matches!(err, Err(StorageError::Csv(_))));
    }

    #[test]
    fn byte_order_mark_is_tolerated() {
        let src = format!("\u{feff}{HEADER}li-ion,1,0.1,x,y*2,0.9,0.9,0.1,x,0,0.2,4\nflow,1,0.1,x/4,y,0.8,0.8,,x+y,0,1,2\nflywheel,1,0.05,x*4,y*1.5,0.95,0.95,2,x,0,0.01,8\n");
        assert!(DeviceTable::from_reader(src.as_bytes()).is_ok());
    }
}
