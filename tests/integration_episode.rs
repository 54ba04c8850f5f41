//! Integration tests for whole episodes: drivers, resets, splits, KPIs and export.

mod common;

use std::fs;
use std::path::PathBuf;

use mgrid_sim::config::ScenarioConfig;
use mgrid_sim::devices::{SocResetPolicy, Technology};
use mgrid_sim::io::export::write_csv;
use mgrid_sim::scenario::{ScenarioError, build_microgrid};
use mgrid_sim::sim::kpi::KpiReport;
use mgrid_sim::sim::ledger::DataSlice;
use mgrid_sim::sim::policy::{Policy, PolicyKind, RandomPolicy, RuleBasedPolicy, run_episode};
use mgrid_sim::sim::types::CostParams;
use mgrid_sim::sim::{Microgrid, ResetMode};

fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("mgrid-sim-{}-{name}", std::process::id()))
}

fn assert_soc_within_bounds(mg: &Microgrid) {
    for (tech, device) in mg.suite().devices() {
        let soc = device.soc();
        assert!(
            soc >= device.min_soc() - 1e-9 && soc <= device.max_soc() + 1e-9,
            "{tech} SOC {soc} outside bounds"
        );
    }
}

#[test]
fn rule_policy_runs_full_baseline_day() {
    let mut mg = build_microgrid(&ScenarioConfig::baseline()).expect("baseline builds");
    let mut policy = RuleBasedPolicy;
    let run = run_episode(&mut mg, &mut policy).expect("episode runs");

    assert_eq!(run.actions.len(), 96);
    assert!(mg.is_done());
    assert_eq!(mg.history().len(), 96);
    assert!(run.outcomes.last().is_some_and(|o| o.done));
    let reward_from_cost = -mg.current_cost() * mg.config().reward_scale;
    assert!((run.total_reward - reward_from_cost).abs() < 1e-9);
}

#[test]
fn random_policy_keeps_invariants_every_step() {
    for preset in ScenarioConfig::PRESETS {
        let cfg = ScenarioConfig::from_preset(preset).expect("preset");
        let mut mg = build_microgrid(&cfg).expect("preset builds");
        let mut policy = RandomPolicy::new(3);
        let obs = mg.observation();
        let expected = if mg.architecture().grid.is_some() { 15 } else { 11 };
        assert_eq!(obs.to_vec().len(), expected);

        while !mg.is_done() {
            let action = policy.choose(&mg.observation());
            mg.step(action.index()).expect("step");
            assert_soc_within_bounds(&mg);
        }
        for row in mg.history().production() {
            assert!(
                common::residual(row).abs() < common::EPS,
                "{preset} step {}: residual {}",
                row.timestep,
                common::residual(row)
            );
        }
    }
}

#[test]
fn same_seed_same_episode() {
    let run = || {
        let cfg = ScenarioConfig::baseline();
        let mut mg = build_microgrid(&cfg).expect("baseline builds");
        let mut policy = PolicyKind::Random.build(cfg.simulation.seed);
        run_episode(&mut mg, policy.as_mut()).expect("episode runs");
        (mg.current_cost(), mg.current_co2(), mg.history().production().to_vec())
    };
    assert_eq!(run(), run());
}

#[test]
fn reset_policies_control_soc() {
    let mut mg = common::islanded(vec![60.0; 4], vec![0.0; 4], CostParams::default());
    mg.step(1).expect("discharge li-ion");
    let drained = mg.suite().device(Technology::LiIon).soc();
    assert!(drained < 1.0);

    // default carries SOC over
    mg.reset();
    assert_eq!(mg.suite().device(Technology::LiIon).soc(), drained);
    assert_eq!(mg.episode_summaries().len(), 1);
}

#[test]
fn full_reset_refills_devices() {
    let mut cfg = ScenarioConfig::islanded();
    cfg.simulation.soc_reset = SocResetPolicy::Full;
    cfg.simulation.self_discharge = false;
    let mut mg = build_microgrid(&cfg).expect("islanded builds");
    let mut policy = RuleBasedPolicy;
    run_episode(&mut mg, &mut policy).expect("episode runs");

    mg.reset();
    for (_, device) in mg.suite().devices() {
        assert_eq!(device.soc(), device.max_soc());
        assert_eq!(device.peak_time_left(), device.peak_time());
    }
}

#[test]
fn split_runs_training_then_testing() {
    let mut cfg = ScenarioConfig::baseline();
    cfg.simulation.train_fraction = Some(0.75);
    let mut mg = build_microgrid(&cfg).expect("baseline builds");
    assert_eq!(mg.data_slice(), DataSlice::Training);
    assert_eq!(mg.episode_len(), 72);

    let mut policy = RuleBasedPolicy;
    run_episode(&mut mg, &mut policy).expect("training episode");
    let first_test_load = mg.series().load_kw[72];

    let obs = mg.reset_with(ResetMode::Testing);
    assert_eq!(mg.data_slice(), DataSlice::Testing);
    assert_eq!(mg.episode_len(), 24);
    assert_eq!(obs.load_kw, first_test_load);
    run_episode(&mut mg, &mut policy).expect("testing episode");

    mg.reset();
    let summaries = mg.episode_summaries();
    assert_eq!(summaries.len(), 2);
    assert_eq!(summaries[0].slice, DataSlice::Training);
    assert_eq!(summaries[0].window, 0..72);
    assert_eq!(summaries[1].slice, DataSlice::Testing);
    assert_eq!(summaries[1].window, 72..96);
    assert_eq!(summaries[1].steps, 24);
}

#[test]
fn kpi_report_agrees_with_ledgers() {
    let mut mg = build_microgrid(&ScenarioConfig::weak_grid()).expect("weak grid builds");
    let mut policy = RuleBasedPolicy;
    run_episode(&mut mg, &mut policy).expect("episode runs");

    let dt = mg.config().dt_hours;
    let kpi = KpiReport::from_history(mg.history(), dt);
    assert_eq!(kpi.steps, mg.history().len());
    assert!((kpi.total_cost - mg.current_cost()).abs() < 1e-9);
    assert!((kpi.total_co2 - mg.current_co2()).abs() < 1e-9);
    assert_eq!(kpi.class_counts.iter().sum::<usize>(), kpi.steps);

    let import: f64 = mg
        .history()
        .production()
        .iter()
        .map(|p| p.grid_import_kw * dt)
        .sum();
    assert!((kpi.grid_import_kwh - import).abs() < 1e-9);

    // no import during the outage window
    for p in &mg.history().production()[56..72] {
        assert_eq!(p.grid_import_kw, 0.0);
        assert_eq!(p.grid_export_kw, 0.0);
    }
}

#[test]
fn scenario_reads_series_file_and_exports_ledgers() {
    let series_path = temp_path("series.csv");
    let mut src = String::from("load,pv\n");
    for t in 0..24 {
        let pv = if (8..16).contains(&t) { 50.0 } else { 0.0 };
        src.push_str(&format!("{},{}\n", 30 + t, pv));
    }
    fs::write(&series_path, src).expect("write series");

    let mut cfg = ScenarioConfig::islanded();
    cfg.simulation.dt_hours = 1.0;
    cfg.data.series = Some(series_path.clone());
    let mut mg = build_microgrid(&cfg).expect("scenario builds");
    fs::remove_file(&series_path).ok();

    assert_eq!(mg.series().len(), 24);
    assert_eq!(mg.episode_len(), 24);
    let mut policy = RuleBasedPolicy;
    run_episode(&mut mg, &mut policy).expect("episode runs");

    let mut buf = Vec::new();
    write_csv(mg.history(), 1.0, &mut buf).expect("export");
    let text = String::from_utf8(buf).expect("utf8");
    assert_eq!(text.lines().count(), 25);
    assert!(text.lines().next().is_some_and(|h| h.contains("flow_discharge_kw")));
}

#[test]
fn missing_series_file_is_reported() {
    let mut cfg = ScenarioConfig::baseline();
    cfg.data.series = Some(temp_path("does-not-exist.csv"));
    assert!(matches!(build_microgrid(&cfg), Err(ScenarioError::Series(_))));
}
