use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use mgrid_sim::config::ScenarioConfig;
use mgrid_sim::sim::policy::PolicyKind;

/// Islandable microgrid storage dispatch simulator.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Load scenario from a TOML config file
    #[arg(long, conflicts_with = "preset")]
    pub scenario: Option<PathBuf>,

    /// Use a built-in preset (baseline, weak_grid, islanded)
    #[arg(long)]
    pub preset: Option<String>,

    /// Override the random seed
    #[arg(long)]
    pub seed: Option<u64>,

    /// Override the episode horizon in steps
    #[arg(long)]
    pub horizon: Option<usize>,

    /// Override the number of episodes
    #[arg(long)]
    pub episodes: Option<usize>,

    /// Override the driver
    #[arg(long, value_enum)]
    pub policy: Option<PolicyArg>,

    /// Device-behaviour table CSV
    #[arg(long)]
    pub device_table: Option<PathBuf>,

    /// Exogenous series CSV (load, pv and optional grid columns)
    #[arg(long)]
    pub series: Option<PathBuf>,

    /// Export the last episode's ledgers to CSV
    #[arg(long)]
    pub telemetry_out: Option<PathBuf>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyArg {
    Random,
    Rule,
}

impl From<PolicyArg> for PolicyKind {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::Random => Self::Random,
            PolicyArg::Rule => Self::Rule,
        }
    }
}

impl Cli {
    /// Applies command-line overrides on top of a loaded scenario.
    pub fn apply(&self, cfg: &mut ScenarioConfig) {
        let s = &mut cfg.simulation;
        if let Some(seed) = self.seed {
            s.seed = seed;
        }
        if let Some(horizon) = self.horizon {
            s.horizon = horizon;
        }
        if let Some(episodes) = self.episodes {
            s.episodes = episodes;
        }
        if let Some(policy) = self.policy {
            s.policy = policy.into();
        }
        if let Some(path) = &self.device_table {
            cfg.data.device_table = Some(path.clone());
        }
        if let Some(path) = &self.series {
            cfg.data.series = Some(path.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_scenario_and_overrides() {
        let cli = Cli::try_parse_from([
            "mgrid-sim",
            "--scenario",
            "site.toml",
            "--seed",
            "9",
            "--policy",
            "random",
        ])
        .expect("parse should succeed");
        assert_eq!(cli.scenario, Some(PathBuf::from("site.toml")));
        assert_eq!(cli.seed, Some(9));
        assert_eq!(cli.policy, Some(PolicyArg::Random));
    }

    #[test]
    fn scenario_and_preset_conflict() {
        let res = Cli::try_parse_from([
            "mgrid-sim",
            "--scenario",
            "site.toml",
            "--preset",
            "islanded",
        ]);
        assert!(res.is_err());
    }

    #[test]
    fn apply_overrides_config() {
        let cli = Cli::try_parse_from([
            "mgrid-sim",
            "--horizon",
            "12",
            "--episodes",
            "3",
            "--series",
            "data.csv",
        ])
        .expect("parse should succeed");
        let mut cfg = ScenarioConfig::baseline();
        cli.apply(&mut cfg);
        assert_eq!(cfg.simulation.horizon, 12);
        assert_eq!(cfg.simulation.episodes, 3);
        assert_eq!(cfg.data.series, Some(PathBuf::from("data.csv")));
        assert_eq!(cfg.simulation.seed, 42);
    }
}
