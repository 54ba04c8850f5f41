//! TOML-based scenario configuration and preset definitions.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::devices::SocResetPolicy;
use crate::sim::SplitPolicy;
use crate::sim::policy::PolicyKind;
use crate::sim::types::DEFAULT_REWARD_SCALE;

/// Top-level scenario configuration parsed from TOML.
///
/// All fields have defaults matching the baseline scenario. Load from
/// TOML with [`ScenarioConfig::from_toml_file`] or use
/// [`ScenarioConfig::baseline`] for the built-in default.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioConfig {
    /// Timing, episodes and engine policies.
    #[serde(default)]
    pub simulation: SimulationConfig,
    /// Synthetic load and PV profile used when no series file is given.
    #[serde(default)]
    pub profile: ProfileConfig,
    /// External data files.
    #[serde(default)]
    pub data: DataConfig,
    /// Storage fleet sizing.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Backup generator.
    #[serde(default)]
    pub genset: GensetConfig,
    /// Main-grid connection.
    #[serde(default)]
    pub grid: GridConfig,
    /// Unit costs.
    #[serde(default)]
    pub costs: CostConfig,
}

/// Timing, episodes and engine policies.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationConfig {
    /// Timestep duration in hours (must be > 0).
    pub dt_hours: f64,
    /// Maximum steps per episode (must be > 0).
    pub horizon: usize,
    /// Number of episodes to run.
    pub episodes: usize,
    /// Master random seed.
    pub seed: u64,
    /// Multiplier turning step cost into reward.
    pub reward_scale: f64,
    /// SOC handling on reset: `"carry"`, `"full"` or `{ baseline = <soc> }`.
    pub soc_reset: SocResetPolicy,
    /// Combined-action split: `"even"` or `"headroom"`.
    pub split_policy: SplitPolicy,
    /// Apply device self-discharge after every step.
    pub self_discharge: bool,
    /// Built-in driver: `"rule"` or `"random"`.
    pub policy: PolicyKind,
    /// Fraction of the series used for training; unset runs on the full series.
    pub train_fraction: Option<f64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            dt_hours: 0.25,
            horizon: 96,
            episodes: 1,
            seed: 42,
            reward_scale: DEFAULT_REWARD_SCALE,
            soc_reset: SocResetPolicy::default(),
            split_policy: SplitPolicy::default(),
            self_discharge: true,
            policy: PolicyKind::default(),
            train_fraction: None,
        }
    }
}

/// Synthetic load and PV profile parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProfileConfig {
    /// Days of data to generate (must be > 0).
    pub days: usize,
    /// Mean load (kW).
    pub load_base_kw: f64,
    /// Daily sinusoidal amplitude of the load (kW).
    pub load_amp_kw: f64,
    /// Phase offset of the load curve (radians).
    pub load_phase_rad: f64,
    /// Gaussian noise standard deviation on the load (kW).
    pub load_noise_std: f64,
    /// PV peak output (kW).
    pub pv_peak_kw: f64,
    /// Hour of sunrise (inclusive).
    pub sunrise_hour: f64,
    /// Hour of sunset (exclusive).
    pub sunset_hour: f64,
    /// Multiplicative noise on PV output, as a fraction.
    pub pv_noise_std: f64,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            days: 1,
            load_base_kw: 40.0,
            load_amp_kw: 15.0,
            load_phase_rad: 4.2,
            load_noise_std: 2.0,
            pv_peak_kw: 60.0,
            sunrise_hour: 6.0,
            sunset_hour: 19.0,
            pv_noise_std: 0.05,
        }
    }
}

/// External data files. Paths are relative to the working directory.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DataConfig {
    /// Device-behaviour table; the built-in table is used when unset.
    pub device_table: Option<PathBuf>,
    /// Exogenous series CSV; the synthetic profile is used when unset.
    pub series: Option<PathBuf>,
}

/// Storage fleet sizing.
///
/// Capacities left unset are sized from the load: each device gets a third of
/// the average daily load energy.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    pub li_ion_kwh: Option<f64>,
    pub flow_kwh: Option<f64>,
    pub flywheel_kwh: Option<f64>,
    /// Continuous power of every device (kW); the table curve is used when unset.
    pub power_kw: Option<f64>,
}

/// Backup generator.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GensetConfig {
    pub enabled: bool,
    /// Nameplate power (kW); sized from the peak load when unset.
    pub rated_kw: Option<f64>,
    /// Minimum loading as a fraction of rated power.
    pub p_min: f64,
    /// Maximum loading as a fraction of rated power.
    pub p_max: f64,
    /// Fuel cost per kWh.
    pub fuel_cost: f64,
    /// kg CO2 per kWh.
    pub co2_per_kwh: f64,
}

impl Default for GensetConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            rated_kw: None,
            p_min: 0.05,
            p_max: 0.9,
            fuel_cost: 0.4,
            co2_per_kwh: 2.0,
        }
    }
}

/// Main-grid connection and its synthetic signals.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GridConfig {
    pub enabled: bool,
    /// Rated power (kW); sized from the peak load when unset.
    pub rated_kw: Option<f64>,
    /// Import price per kWh.
    pub price_import: f64,
    /// Export price per kWh.
    pub price_export: f64,
    /// kg CO2 per imported kWh.
    pub co2_per_kwh: f64,
    /// First step of a scheduled outage.
    pub outage_start: Option<usize>,
    /// Outage length in steps.
    pub outage_steps: usize,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            rated_kw: None,
            price_import: 0.11,
            price_export: 0.05,
            co2_per_kwh: 0.4,
            outage_start: None,
            outage_steps: 0,
        }
    }
}

/// Unit costs.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CostConfig {
    pub loss_load: f64,
    pub overgeneration: f64,
    pub curtailment: f64,
    pub co2: f64,
    pub include_storage_marginal: bool,
}

impl Default for CostConfig {
    fn default() -> Self {
        Self {
            loss_load: 10.0,
            overgeneration: 1.0,
            curtailment: 0.0,
            co2: 0.1,
            include_storage_marginal: false,
        }
    }
}

/// A configuration validation error with the offending field path.
#[derive(Debug, Clone)]
pub struct ConfigError {
    /// Dotted path to the invalid field (e.g. `"simulation.dt_hours"`).
    pub field: String,
    /// Human-readable description of the problem.
    pub message: String,
}

impl ConfigError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ConfigError {}

impl ScenarioConfig {
    /// Returns the baseline preset: grid-connected with genset backup.
    pub fn baseline() -> Self {
        Self {
            simulation: SimulationConfig::default(),
            profile: ProfileConfig::default(),
            data: DataConfig::default(),
            storage: StorageConfig::default(),
            genset: GensetConfig::default(),
            grid: GridConfig::default(),
            costs: CostConfig::default(),
        }
    }

    /// Returns the weak-grid preset: undersized connection with an afternoon
    /// outage, over two days.
    pub fn weak_grid() -> Self {
        Self {
            simulation: SimulationConfig {
                horizon: 192,
                ..SimulationConfig::default()
            },
            profile: ProfileConfig {
                days: 2,
                ..ProfileConfig::default()
            },
            grid: GridConfig {
                rated_kw: Some(30.0),
                price_import: 0.25,
                outage_start: Some(56),
                outage_steps: 16,
                ..GridConfig::default()
            },
            ..Self::baseline()
        }
    }

    /// Returns the islanded preset: no grid, storage and genset only.
    pub fn islanded() -> Self {
        Self {
            profile: ProfileConfig {
                pv_peak_kw: 80.0,
                ..ProfileConfig::default()
            },
            grid: GridConfig {
                enabled: false,
                ..GridConfig::default()
            },
            ..Self::baseline()
        }
    }

    /// Available preset names.
    pub const PRESETS: &[&str] = &["baseline", "weak_grid", "islanded"];

    /// Loads a scenario from a named preset.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the preset name is unknown.
    pub fn from_preset(name: &str) -> Result<Self, ConfigError> {
        match name {
            "baseline" => Ok(Self::baseline()),
            "weak_grid" => Ok(Self::weak_grid()),
            "islanded" => Ok(Self::islanded()),
            _ => Err(ConfigError::new(
                "preset",
                format!(
                    "unknown preset \"{name}\", available: {}",
                    Self::PRESETS.join(", ")
                ),
            )),
        }
    }

    /// Parses a scenario from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be read or the TOML is invalid.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| {
            ConfigError::new("scenario", format!("cannot read \"{}\": {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses a scenario from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the TOML is invalid or contains unknown fields.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError::new("toml", e.to_string()))
    }

    /// Validates all fields and returns a list of errors.
    ///
    /// Returns an empty vector if configuration is valid.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        let s = &self.simulation;

        if !(s.dt_hours.is_finite() && s.dt_hours > 0.0) {
            errors.push(ConfigError::new("simulation.dt_hours", "must be > 0"));
        }
        if s.horizon == 0 {
            errors.push(ConfigError::new("simulation.horizon", "must be > 0"));
        }
        if s.episodes == 0 {
            errors.push(ConfigError::new("simulation.episodes", "must be > 0"));
        }
        if s.reward_scale < 0.0 {
            errors.push(ConfigError::new("simulation.reward_scale", "must be >= 0"));
        }
        if let SocResetPolicy::Baseline(soc) = s.soc_reset {
            if !(0.0..=1.0).contains(&soc) {
                errors.push(ConfigError::new(
                    "simulation.soc_reset",
                    "baseline SOC must be in [0.0, 1.0]",
                ));
            }
        }
        if let Some(frac) = s.train_fraction {
            if !(frac > 0.0 && frac < 1.0) {
                errors.push(ConfigError::new(
                    "simulation.train_fraction",
                    "must be in (0.0, 1.0)",
                ));
            }
        }

        let p = &self.profile;
        if p.days == 0 {
            errors.push(ConfigError::new("profile.days", "must be > 0"));
        }
        if p.load_base_kw < 0.0 {
            errors.push(ConfigError::new("profile.load_base_kw", "must be >= 0"));
        }
        if p.pv_peak_kw < 0.0 {
            errors.push(ConfigError::new("profile.pv_peak_kw", "must be >= 0"));
        }
        if p.sunrise_hour >= p.sunset_hour {
            errors.push(ConfigError::new(
                "profile.sunrise_hour",
                "must be < profile.sunset_hour",
            ));
        }
        if p.sunrise_hour < 0.0 || p.sunset_hour > 24.0 {
            errors.push(ConfigError::new(
                "profile.sunset_hour",
                "daylight must lie within [0, 24] hours",
            ));
        }

        let st = &self.storage;
        for (field, value) in [
            ("storage.li_ion_kwh", st.li_ion_kwh),
            ("storage.flow_kwh", st.flow_kwh),
            ("storage.flywheel_kwh", st.flywheel_kwh),
        ] {
            if value.is_some_and(|kwh| kwh <= 0.0) {
                errors.push(ConfigError::new(field, "must be > 0"));
            }
        }
        if st.power_kw.is_some_and(|kw| kw <= 0.0) {
            errors.push(ConfigError::new("storage.power_kw", "must be > 0"));
        }

        let g = &self.genset;
        if g.enabled {
            if !(0.0..=1.0).contains(&g.p_min) || !(0.0..=1.0).contains(&g.p_max) {
                errors.push(ConfigError::new(
                    "genset.p_min",
                    "loading fractions must be in [0.0, 1.0]",
                ));
            }
            if g.p_min > g.p_max {
                errors.push(ConfigError::new("genset.p_min", "must be <= genset.p_max"));
            }
            if g.rated_kw.is_some_and(|kw| kw <= 0.0) {
                errors.push(ConfigError::new("genset.rated_kw", "must be > 0"));
            }
        }

        let gr = &self.grid;
        if gr.enabled {
            if gr.rated_kw.is_some_and(|kw| kw < 0.0) {
                errors.push(ConfigError::new("grid.rated_kw", "must be >= 0"));
            }
            if gr.price_import < 0.0 || gr.price_export < 0.0 {
                errors.push(ConfigError::new("grid.price_import", "prices must be >= 0"));
            }
            if gr.outage_start.is_some() && gr.outage_steps == 0 {
                errors.push(ConfigError::new(
                    "grid.outage_steps",
                    "must be > 0 when grid.outage_start is set",
                ));
            }
        }

        let c = &self.costs;
        if c.loss_load < 0.0 || c.overgeneration < 0.0 || c.curtailment < 0.0 || c.co2 < 0.0 {
            errors.push(ConfigError::new("costs", "unit costs must be >= 0"));
        }

        errors
    }
}
