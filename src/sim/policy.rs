//! Simple drivers that pick one action per step.
//!
//! Neither driver forecasts or learns; they exist to exercise the engine end
//! to end.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::action::Action;
use super::engine::Microgrid;
use super::error::DispatchError;
use super::types::{Observation, StepOutcome};
use crate::devices::Technology;

/// A driver choosing a discrete action from the current state vector.
pub trait Policy {
    /// Short name used in logs and reports.
    fn name(&self) -> &'static str;

    /// Picks the action for the step described by `obs`.
    fn choose(&mut self, obs: &Observation) -> Action;
}

/// Which built-in driver to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PolicyKind {
    Random,
    #[default]
    Rule,
}

impl PolicyKind {
    /// Builds the driver, seeding the random one with `seed`.
    pub fn build(self, seed: u64) -> Box<dyn Policy> {
        match self {
            Self::Random => Box::new(RandomPolicy::new(seed)),
            Self::Rule => Box::new(RuleBasedPolicy),
        }
    }
}

/// Uniformly random actions from a seeded generator.
#[derive(Debug, Clone)]
pub struct RandomPolicy {
    rng: StdRng,
}

impl RandomPolicy {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Policy for RandomPolicy {
    fn name(&self) -> &'static str {
        "random"
    }

    fn choose(&mut self, _obs: &Observation) -> Action {
        Action::ALL[self.rng.random_range(0..Action::COUNT)]
    }
}

/// Greedy rule: use storage first, then the grid, then the genset.
#[derive(Debug, Default, Clone, Copy)]
pub struct RuleBasedPolicy;

impl RuleBasedPolicy {
    /// Device with the largest headroom; ties go to the earlier technology.
    fn best(headroom: impl Fn(Technology) -> f64) -> (Technology, f64) {
        Technology::ALL
            .into_iter()
            .map(|t| (t, headroom(t)))
            .fold((Technology::LiIon, f64::NEG_INFINITY), |acc, cur| {
                if cur.1 > acc.1 { cur } else { acc }
            })
    }
}

impl Policy for RuleBasedPolicy {
    fn name(&self) -> &'static str {
        "rule"
    }

    fn choose(&mut self, obs: &Observation) -> Action {
        let net = obs.net_load_kw();
        let grid_up = obs.grid.is_some_and(|g| g.status);

        if net < 0.0 {
            let (tech, room) = Self::best(|t| obs.storage[t].charge_headroom_kw);
            if room > 0.0 {
                Action::Charge(tech)
            } else if grid_up {
                Action::Export
            } else {
                Action::Charge(Technology::LiIon)
            }
        } else if net > 0.0 {
            let (tech, room) = Self::best(|t| obs.storage[t].discharge_headroom_kw);
            let total_room: f64 = obs.storage.0.iter().map(|s| s.discharge_headroom_kw).sum();
            if room >= net {
                Action::Discharge(tech)
            } else if grid_up {
                Action::Import
            } else if total_room > 0.0 && total_room >= net {
                Action::DischargeAllExport
            } else if let Some(empty) = Technology::ALL
                .into_iter()
                .find(|&t| obs.storage[t].at_floor)
            {
                // discharging an empty device commits the genset
                Action::Discharge(empty)
            } else {
                // drain storage until a device reaches its floor
                Action::DischargeAllExport
            }
        } else {
            Action::Export
        }
    }
}

/// Everything a driver produced over one episode.
#[derive(Debug, Clone, Default)]
pub struct EpisodeRun {
    pub actions: Vec<Action>,
    pub outcomes: Vec<StepOutcome>,
    pub total_reward: f64,
}

/// Drives `mg` with `policy` until the episode terminates.
///
/// # Errors
///
/// Propagates the first [`DispatchError`] from the engine.
pub fn run_episode(
    mg: &mut Microgrid,
    policy: &mut dyn Policy,
) -> Result<EpisodeRun, DispatchError> {
    let mut run = EpisodeRun::default();
    while !mg.is_done() {
        let obs = mg.observation();
        let action = policy.choose(&obs);
        let intent = mg.intent(action)?;
        let outcome = mg.run(&intent)?;
        run.total_reward += outcome.reward;
        run.actions.push(action);
        run.outcomes.push(outcome);
    }
    Ok(run)
}
