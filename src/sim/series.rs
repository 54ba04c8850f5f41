//! Pre-loaded exogenous time series: load, PV and grid signals.

use std::fs::File;
use std::io::Read;
use std::ops::Range;
use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Errors raised while loading or slicing exogenous series.
#[derive(Debug, thiserror::Error)]
pub enum SeriesError {
    #[error("cannot read series \"{}\": {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("series: {0}")]
    Csv(#[from] csv::Error),

    /// A row carries some grid columns but not all of them.
    #[error("series row {row}: grid columns must be all present or all empty")]
    PartialGridRow { row: usize },

    /// A value is negative or not finite.
    #[error("series row {row}: invalid {column} value {value}")]
    InvalidValue {
        row: usize,
        column: &'static str,
        value: f64,
    },

    #[error("series is empty")]
    Empty,

    #[error("train fraction must be in (0, 1), got {0}")]
    InvalidFraction(f64),
}

/// Grid signals, one value per step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GridSeries {
    /// `true` while the grid is connected.
    pub status: Vec<bool>,
    /// Import price per kWh.
    pub price_import: Vec<f64>,
    /// Export price per kWh.
    pub price_export: Vec<f64>,
    /// Grid carbon intensity (kg CO2 per kWh).
    pub co2_per_kwh: Vec<f64>,
}

impl GridSeries {
    /// A grid that is always up with flat prices and carbon intensity.
    pub fn constant(len: usize, price_import: f64, price_export: f64, co2_per_kwh: f64) -> Self {
        Self {
            status: vec![true; len],
            price_import: vec![price_import; len],
            price_export: vec![price_export; len],
            co2_per_kwh: vec![co2_per_kwh; len],
        }
    }

    fn len(&self) -> usize {
        self.status
            .len()
            .min(self.price_import.len())
            .min(self.price_export.len())
            .min(self.co2_per_kwh.len())
    }
}

/// Grid signals at one step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridSample {
    pub status: bool,
    pub price_import: f64,
    pub price_export: f64,
    pub co2_per_kwh: f64,
}

/// Exogenous values at one step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Exogenous {
    pub load_kw: f64,
    pub pv_kw: f64,
    pub grid: Option<GridSample>,
}

/// Training and testing windows over a series.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataSplit {
    pub train: Range<usize>,
    pub test: Range<usize>,
}

/// The exogenous inputs of a microgrid, loaded once before simulation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExogenousSeries {
    /// Load demand (kW).
    pub load_kw: Vec<f64>,
    /// Available PV (kW).
    pub pv_kw: Vec<f64>,
    /// Grid signals when a grid is installed.
    pub grid: Option<GridSeries>,
}

#[derive(Debug, Deserialize)]
struct SeriesRow {
    load: f64,
    pv: f64,
    #[serde(default)]
    grid_status: Option<f64>,
    #[serde(default)]
    price_import: Option<f64>,
    #[serde(default)]
    price_export: Option<f64>,
    #[serde(default)]
    grid_co2: Option<f64>,
}

fn check(row: usize, column: &'static str, value: f64) -> Result<f64, SeriesError> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(SeriesError::InvalidValue { row, column, value })
    }
}

impl ExogenousSeries {
    /// Islanded series: load and PV only.
    pub fn new(load_kw: Vec<f64>, pv_kw: Vec<f64>) -> Self {
        Self {
            load_kw,
            pv_kw,
            grid: None,
        }
    }

    pub fn with_grid(mut self, grid: GridSeries) -> Self {
        self.grid = Some(grid);
        self
    }

    /// Length of the shortest series.
    pub fn len(&self) -> usize {
        let base = self.load_kw.len().min(self.pv_kw.len());
        match &self.grid {
            Some(g) => base.min(g.len()),
            None => base,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn has_grid(&self) -> bool {
        self.grid.is_some()
    }

    /// Highest load in the series (kW).
    pub fn peak_load_kw(&self) -> f64 {
        self.load_kw.iter().copied().fold(0.0, f64::max)
    }

    /// Values at absolute index `t`, `None` past the end.
    pub fn at(&self, t: usize) -> Option<Exogenous> {
        if t >= self.len() {
            return None;
        }
        let grid = self.grid.as_ref().map(|g| GridSample {
            status: g.status[t],
            price_import: g.price_import[t],
            price_export: g.price_export[t],
            co2_per_kwh: g.co2_per_kwh[t],
        });
        Some(Exogenous {
            load_kw: self.load_kw[t],
            pv_kw: self.pv_kw[t],
            grid,
        })
    }

    /// Splits the series into a training prefix of `ceil(len × fraction)`
    /// steps and a testing suffix.
    ///
    /// # Errors
    ///
    /// Returns [`SeriesError::InvalidFraction`] unless `0 < fraction < 1`.
    pub fn split(&self, fraction: f64) -> Result<DataSplit, SeriesError> {
        if !(fraction > 0.0 && fraction < 1.0) {
            return Err(SeriesError::InvalidFraction(fraction));
        }
        let len = self.len();
        let cut = ((len as f64) * fraction).ceil() as usize;
        let cut = cut.min(len);
        Ok(DataSplit {
            train: 0..cut,
            test: cut..len,
        })
    }

    /// Loads series from a CSV file.
    ///
    /// # Errors
    ///
    /// See [`ExogenousSeries::from_reader`].
    pub fn from_path(path: &Path) -> Result<Self, SeriesError> {
        let file = File::open(path).map_err(|source| SeriesError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_reader(file)
    }

    /// Loads series from CSV with header `load,pv` and, for grid-connected
    /// sites, `grid_status,price_import,price_export,grid_co2`.
    ///
    /// A grid is installed when the first row carries grid values; every
    /// other row must then carry them too.
    ///
    /// # Errors
    ///
    /// Returns a [`SeriesError`] on malformed CSV, negative or non-finite
    /// values, inconsistent grid columns or an empty file.
    pub fn from_reader(reader: impl Read) -> Result<Self, SeriesError> {
        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut out = Self::default();
        let mut grid = GridSeries::default();
        let mut has_grid = None;

        for (i, record) in rdr.deserialize::<SeriesRow>().enumerate() {
            let row = record?;
            let n = i + 1;
            out.load_kw.push(check(n, "load", row.load)?);
            out.pv_kw.push(check(n, "pv", row.pv)?);

            let cols = [
                row.grid_status,
                row.price_import,
                row.price_export,
                row.grid_co2,
            ];
            let present = cols.iter().filter(|c| c.is_some()).count();
            let row_has_grid = match present {
                0 => false,
                4 => true,
                _ => return Err(SeriesError::PartialGridRow { row: n }),
            };
            if *has_grid.get_or_insert(row_has_grid) != row_has_grid {
                return Err(SeriesError::PartialGridRow { row: n });
            }

            if let [Some(status), Some(pi), Some(pe), Some(co2)] = cols {
                grid.status.push(status > 0.5);
                grid.price_import.push(check(n, "price_import", pi)?);
                grid.price_export.push(check(n, "price_export", pe)?);
                grid.co2_per_kwh.push(check(n, "grid_co2", co2)?);
            }
        }

        if out.load_kw.is_empty() {
            return Err(SeriesError::Empty);
        }
        if has_grid == Some(true) {
            out.grid = Some(grid);
        }
        Ok(out)
    }
}
