//! Microgrid dispatch simulator entry point: CLI wiring and config-driven
//! engine construction.

mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use mgrid_sim::config::ScenarioConfig;
use mgrid_sim::io::export::export_csv;
use mgrid_sim::logging::init_tracing;
use mgrid_sim::scenario::build_microgrid;
use mgrid_sim::sim::ResetMode;
use mgrid_sim::sim::kpi::KpiReport;
use mgrid_sim::sim::policy::{Policy, run_episode};

use cli::Cli;

fn load_scenario(cli: &Cli) -> Result<ScenarioConfig> {
    // --scenario takes priority, then --preset, then the baseline default
    let mut cfg = if let Some(path) = &cli.scenario {
        ScenarioConfig::from_toml_file(path)
            .with_context(|| format!("loading scenario {}", path.display()))?
    } else if let Some(name) = &cli.preset {
        ScenarioConfig::from_preset(name)?
    } else {
        ScenarioConfig::baseline()
    };
    cli.apply(&mut cfg);
    Ok(cfg)
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let cfg = load_scenario(&cli)?;

    let mut mg = build_microgrid(&cfg).context("building microgrid")?;
    let mut policy = cfg.simulation.policy.build(cfg.simulation.seed);
    info!(
        policy = policy.name(),
        capital_cost = mg.total_capital_cost(),
        "starting simulation"
    );

    let dt = mg.config().dt_hours;
    let episodes = cfg.simulation.episodes;
    for episode in 0..episodes {
        if episode > 0 {
            mg.reset();
        }
        let run = run_episode(&mut mg, policy.as_mut())
            .with_context(|| format!("running episode {episode}"))?;
        info!(episode, reward = run.total_reward, "episode finished");
        println!("\nEpisode {episode} ({:?})", mg.data_slice());
        println!("{}", KpiReport::from_history(mg.history(), dt));
    }

    if cfg.simulation.train_fraction.is_some() {
        mg.reset_with(ResetMode::Testing);
        let run = run_episode(&mut mg, policy.as_mut()).context("running test episode")?;
        info!(reward = run.total_reward, "test episode finished");
        println!("\nTest episode");
        println!("{}", KpiReport::from_history(mg.history(), dt));
    }

    if let Some(path) = &cli.telemetry_out {
        export_csv(mg.history(), dt, path)
            .with_context(|| format!("writing telemetry to {}", path.display()))?;
        eprintln!("Telemetry written to {}", path.display());
    }

    Ok(())
}
