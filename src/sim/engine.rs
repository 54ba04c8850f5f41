//! Dispatch engine: maps actions to intents, reconciles each step against the
//! storage fleet and the bus balance, and keeps the ledgers.

use std::ops::Range;

use tracing::{debug, info, warn};

use crate::devices::{
    ChargeRequest, CostAccumulator, DeviceSnapshot, DeviceTable, DischargeRequest, Genset,
    PerTechnology, Sizing, StorageSuite, Technology,
};

use super::action::{Action, DispatchContext, intent_for};
use super::balance::reconcile;
use super::clock::Clock;
use super::error::DispatchError;
use super::grid::Grid;
use super::kpi::step_penalty;
use super::ledger::{DataSlice, EpisodeSummary, History};
use super::series::{DataSplit, Exogenous, ExogenousSeries, SeriesError};
use super::types::{
    ActionRow, Co2Row, ControlIntent, CostParams, CostRow, GridObservation, Observation,
    ProductionRow, SimConfig, StepOutcome, StorageCommand, StorageObservation,
};

/// Clamping below this much (kW) is not worth a warning.
const CLAMP_WARN_KW: f64 = 1e-6;

/// Installed non-storage resources.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Architecture {
    pub genset: Option<Genset>,
    pub grid: Option<Grid>,
}

/// Which data an episode should run on after a reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResetMode {
    /// Training slice when a split is active, the full series otherwise.
    #[default]
    Default,
    /// Testing slice for one episode when a split is active.
    Testing,
}

/// An intent after limit enforcement, ready to apply.
#[derive(Debug, Clone, Copy)]
struct Validated {
    storage: PerTechnology<StorageCommand>,
    grid_import_kw: f64,
    grid_export_kw: f64,
    genset_kw: f64,
}

/// One islandable microgrid: storage fleet, optional genset and grid, and the
/// exogenous series it runs over.
///
/// The engine exclusively owns its [`StorageSuite`]. Independent simulations
/// need independent engines.
#[derive(Debug, Clone)]
pub struct Microgrid {
    config: SimConfig,
    table: DeviceTable,
    suite: StorageSuite,
    arch: Architecture,
    costs: CostParams,
    series: ExogenousSeries,
    split: Option<DataSplit>,
    slice: DataSlice,
    window: Range<usize>,
    clock: Clock,
    current: Exogenous,
    done: bool,
    history: History,
    episode: usize,
    episodes: Vec<EpisodeSummary>,
}

impl Microgrid {
    /// Creates an engine positioned on the first step of the full series.
    ///
    /// # Arguments
    ///
    /// * `config` - Timing, horizon and policies
    /// * `table` - Device-behaviour table, kept for resizing
    /// * `suite` - Storage fleet built from `table`
    /// * `series` - Exogenous series
    /// * `arch` - Installed genset and grid
    /// * `costs` - Unit costs
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::GridMismatch`] when a grid is installed
    /// without grid series or the other way round, and
    /// [`DispatchError::Series`] when the series is empty.
    pub fn new(
        config: SimConfig,
        table: DeviceTable,
        suite: StorageSuite,
        series: ExogenousSeries,
        arch: Architecture,
        costs: CostParams,
    ) -> Result<Self, DispatchError> {
        let installed = arch.grid.is_some();
        if installed != series.has_grid() {
            return Err(DispatchError::GridMismatch {
                installed,
                in_series: series.has_grid(),
            });
        }
        let current = series
            .at(0)
            .ok_or(DispatchError::Series(SeriesError::Empty))?;

        let window = 0..series.len();
        let clock = Clock::new(config.horizon.min(window.len()));
        let done = clock.is_done();

        Ok(Self {
            config,
            table,
            suite,
            arch,
            costs,
            series,
            split: None,
            slice: DataSlice::Full,
            window,
            clock,
            current,
            done,
            history: History::new(),
            episode: 0,
            episodes: Vec::new(),
        })
    }

    fn grid_up(&self) -> bool {
        self.arch.grid.is_some() && self.current.grid.is_some_and(|g| g.status)
    }

    fn dispatch_context(&self) -> DispatchContext {
        DispatchContext {
            load_kw: self.current.load_kw,
            pv_kw: self.current.pv_kw,
            grid_up: self.grid_up(),
            charge_headroom_kw: PerTechnology::from_fn(|t| {
                self.suite.device(t).charge_headroom_kw()
            }),
            discharge_headroom_kw: PerTechnology::from_fn(|t| {
                self.suite.device(t).discharge_headroom_kw()
            }),
            at_floor: PerTechnology::from_fn(|t| self.suite.device(t).at_floor()),
            genset_max_kw: self.arch.genset.as_ref().map(Genset::max_output_kw),
            split_policy: self.config.split_policy,
        }
    }

    /// Maps an action index onto a control intent for the current step.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::UnknownAction`] for an index outside the
    /// action set and [`DispatchError::EpisodeComplete`] after termination.
    pub fn actions_agent(&self, action: usize) -> Result<ControlIntent, DispatchError> {
        let action = Action::from_index(action).ok_or(DispatchError::UnknownAction(action))?;
        self.intent(action)
    }

    /// Typed variant of [`Microgrid::actions_agent`].
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::EpisodeComplete`] after termination.
    pub fn intent(&self, action: Action) -> Result<ControlIntent, DispatchError> {
        if self.done {
            return Err(DispatchError::EpisodeComplete);
        }
        Ok(intent_for(action, &self.dispatch_context()))
    }

    /// Enforces device, genset and grid limits without touching any state.
    fn validate(&self, intent: &ControlIntent) -> Result<Validated, DispatchError> {
        let mut storage = PerTechnology::<StorageCommand>::default();
        for tech in Technology::ALL {
            let cmd = intent.storage[tech];
            let charge = cmd.charge_kw.max(0.0);
            let discharge = cmd.discharge_kw.max(0.0);
            if charge > 0.0 && discharge > 0.0 {
                return Err(DispatchError::ConflictingStorageCommand(tech));
            }
            self.suite.check_discharge(tech, discharge)?;
            storage[tech] = StorageCommand {
                charge_kw: charge,
                discharge_kw: discharge,
            };
        }

        let genset_kw = match &self.arch.genset {
            Some(g) => g.clamp_output(intent.genset_kw),
            None => 0.0,
        };

        let (grid_import_kw, grid_export_kw) = match &self.arch.grid {
            Some(grid) if self.grid_up() => {
                let import = grid.clamp_import(intent.grid_import_kw);
                let export = grid.clamp_export(intent.grid_export_kw);
                if intent.grid_import_kw - import > CLAMP_WARN_KW
                    || intent.grid_export_kw - export > CLAMP_WARN_KW
                {
                    warn!(
                        import_kw = intent.grid_import_kw,
                        export_kw = intent.grid_export_kw,
                        max_import_kw = grid.max_import_kw(),
                        max_export_kw = grid.max_export_kw(),
                        "grid command clamped to rated limits"
                    );
                }
                (import, export)
            }
            _ => (0.0, 0.0),
        };

        Ok(Validated {
            storage,
            grid_import_kw,
            grid_export_kw,
            genset_kw,
        })
    }

    /// Applies one control intent and advances the episode by one step.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::ConflictingStorageCommand`] or a
    /// [`DispatchError::Storage`] peak-power error for infeasible storage
    /// commands, and [`DispatchError::EpisodeComplete`] after termination.
    /// On error no device, counter or ledger has changed.
    pub fn run(&mut self, intent: &ControlIntent) -> Result<StepOutcome, DispatchError> {
        if self.done {
            return Err(DispatchError::EpisodeComplete);
        }
        let checked = self.validate(intent)?;
        let t = self.clock.current();
        let dt = self.config.dt_hours;
        let now = self.current;

        // storage
        let mut marginal = CostAccumulator::new();
        let mut realized = PerTechnology::<StorageCommand>::default();
        for tech in Technology::ALL {
            let cmd = checked.storage[tech];
            if cmd.charge_kw > 0.0 {
                let out = self.suite.charge(
                    tech,
                    ChargeRequest::Drawn(cmd.charge_kw),
                    Some(&mut marginal),
                );
                realized[tech].charge_kw = out.drawn_kw;
            } else if cmd.discharge_kw > 0.0 {
                let out = self.suite.discharge(
                    tech,
                    DischargeRequest::Delivered(cmd.discharge_kw),
                    Some(&mut marginal),
                )?;
                realized[tech].discharge_kw = out.delivered_kw;
            }
        }

        // bus balance
        let sources = realized.0.iter().map(|s| s.discharge_kw).sum::<f64>()
            + checked.grid_import_kw
            + checked.genset_kw;
        let sinks = now.load_kw
            + realized.0.iter().map(|s| s.charge_kw).sum::<f64>()
            + checked.grid_export_kw;
        let balance = reconcile(sources, sinks, now.pv_kw);

        let self_discharge_kwh = if self.config.self_discharge {
            self.suite.self_discharge_all()
        } else {
            PerTechnology::default()
        };

        // CO2 and cost
        let (genset_co2, fuel_cost) = match &self.arch.genset {
            Some(g) => (
                checked.genset_kw * dt * g.co2_per_kwh,
                checked.genset_kw * dt * g.fuel_cost,
            ),
            None => (0.0, 0.0),
        };
        let grid_sample = now.grid.filter(|_| self.arch.grid.is_some());
        let grid_co2 = grid_sample.map_or(0.0, |g| checked.grid_import_kw * dt * g.co2_per_kwh);
        let co2 = Co2Row {
            timestep: t,
            genset: genset_co2,
            grid: grid_co2,
            total: genset_co2 + grid_co2,
        };

        let mut cost = CostRow {
            timestep: t,
            loss_load: balance.loss_load_kw * dt * self.costs.cost_loss_load,
            overgeneration: balance.overgeneration_kw * dt * self.costs.cost_overgeneration,
            curtailment: balance.pv_curtailed_kw * dt * self.costs.cost_curtailment,
            genset: fuel_cost,
            grid_import: grid_sample.map_or(0.0, |g| checked.grid_import_kw * dt * g.price_import),
            grid_export: grid_sample
                .map_or(0.0, |g| -checked.grid_export_kw * dt * g.price_export),
            co2: self.costs.cost_co2 * co2.total,
            storage: marginal.total(),
            total: 0.0,
        };
        cost.total = cost.loss_load
            + cost.overgeneration
            + cost.curtailment
            + cost.genset
            + cost.grid_import
            + cost.grid_export
            + cost.co2;
        if self.costs.include_storage_marginal {
            cost.total += cost.storage;
        }

        let production = ProductionRow {
            timestep: t,
            load_kw: now.load_kw,
            pv_kw: now.pv_kw,
            pv_consumed_kw: balance.pv_consumed_kw,
            pv_curtailed_kw: balance.pv_curtailed_kw,
            storage: realized,
            self_discharge_kwh,
            grid_import_kw: checked.grid_import_kw,
            grid_export_kw: checked.grid_export_kw,
            genset_kw: checked.genset_kw,
            loss_load_kw: balance.loss_load_kw,
            overgeneration_kw: balance.overgeneration_kw,
            class: balance.class,
        };
        self.history.record(
            ActionRow {
                timestep: t,
                intent: *intent,
            },
            production,
            cost,
            co2,
        );

        // advance
        self.clock.tick();
        if self.clock.is_done() {
            self.done = true;
        } else if let Some(next) = self.series.at(self.window.start + self.clock.current()) {
            self.current = next;
        } else {
            self.done = true;
        }

        let reward = -cost.total * self.config.reward_scale;
        debug!(
            timestep = t,
            class = %balance.class,
            cost = cost.total,
            co2 = co2.total,
            reward,
            "step recorded"
        );
        if self.done {
            info!(
                episode = self.episode,
                steps = self.history.len(),
                total_cost = self.history.total_cost(),
                "episode terminated"
            );
        }

        Ok(StepOutcome {
            observation: self.observation(),
            reward,
            done: self.done,
        })
    }

    /// Maps an action index and runs it in one call.
    ///
    /// # Errors
    ///
    /// See [`Microgrid::actions_agent`] and [`Microgrid::run`].
    pub fn step(&mut self, action: usize) -> Result<StepOutcome, DispatchError> {
        let intent = self.actions_agent(action)?;
        self.run(&intent)
    }

    /// Starts a new episode on the default data slice.
    pub fn reset(&mut self) -> Observation {
        self.reset_with(ResetMode::Default)
    }

    /// Starts a new episode.
    ///
    /// Per-episode ledgers are cleared; a summary of the finished episode is
    /// kept when it ran at least one step. Device SOC follows the configured
    /// [`SocResetPolicy`](crate::devices::SocResetPolicy).
    pub fn reset_with(&mut self, mode: ResetMode) -> Observation {
        if !self.history.is_empty() {
            let summary = EpisodeSummary {
                episode: self.episode,
                slice: self.slice,
                window: self.window.clone(),
                steps: self.history.len(),
                total_cost: self.history.total_cost(),
                total_co2: self.history.total_co2(),
            };
            info!(
                episode = summary.episode,
                steps = summary.steps,
                total_cost = summary.total_cost,
                total_co2 = summary.total_co2,
                "episode closed"
            );
            self.episodes.push(summary);
        }
        self.history.clear();
        self.episode += 1;

        let (slice, window) = match (&self.split, mode) {
            (Some(split), ResetMode::Testing) => (DataSlice::Testing, split.test.clone()),
            (Some(split), ResetMode::Default) => (DataSlice::Training, split.train.clone()),
            (None, _) => (DataSlice::Full, 0..self.series.len()),
        };
        self.slice = slice;
        self.window = window;
        self.clock.rewind(self.config.horizon.min(self.window.len()));
        match self.series.at(self.window.start) {
            Some(first) if !self.window.is_empty() => {
                self.current = first;
                self.done = self.clock.is_done();
            }
            _ => self.done = true,
        }

        self.suite.reset_soc_all(self.config.soc_reset);
        self.observation()
    }

    /// Discrepancy between the last commanded and realized flows, times `coef`.
    ///
    /// Zero before the first step of an episode.
    pub fn penalty(&self, coef: f64) -> f64 {
        let (Some(action), Some(prod)) = (
            self.history.actions().last(),
            self.history.production().last(),
        ) else {
            return 0.0;
        };
        step_penalty(action, prod) * coef
    }

    /// Changes the episode horizon. Takes effect immediately.
    pub fn set_horizon(&mut self, horizon: usize) {
        self.config.horizon = horizon;
        self.clock.set_total(horizon.min(self.window.len()));
        let was_done = self.done;
        self.done = self.clock.is_done();
        if was_done && !self.done {
            // the sample for the resumed step was never loaded
            match self.series.at(self.window.start + self.clock.current()) {
                Some(next) => self.current = next,
                None => self.done = true,
            }
        }
    }

    /// Changes the carbon price.
    pub fn set_cost_co2(&mut self, cost_co2: f64) {
        self.costs.cost_co2 = cost_co2;
    }

    /// Splits the data into training and testing slices. Episodes started by
    /// later resets run on the training slice unless asked for testing.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Series`] unless `0 < fraction < 1`.
    pub fn train_test_split(&mut self, fraction: f64) -> Result<(), DispatchError> {
        let split = self.series.split(fraction)?;
        info!(train = ?split.train, test = ?split.test, "data split");
        self.split = Some(split);
        Ok(())
    }

    /// Drops the train/test split; later episodes use the full series.
    pub fn cancel_split(&mut self) {
        self.split = None;
    }

    /// Rebuilds the named storage devices with new sizes.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Storage`] if a sizing is unusable; nothing is
    /// replaced in that case.
    pub fn replace(
        &mut self,
        sizes: impl IntoIterator<Item = (Technology, Sizing)>,
    ) -> Result<(), DispatchError> {
        self.suite.replace(&self.table, sizes)?;
        Ok(())
    }

    /// The current state vector.
    pub fn observation(&self) -> Observation {
        let grid = if self.arch.grid.is_some() {
            self.current.grid.map(|g| GridObservation {
                status: g.status,
                price_import: g.price_import,
                price_export: g.price_export,
                co2_per_kwh: g.co2_per_kwh,
            })
        } else {
            None
        };
        Observation {
            timestep: self.clock.current(),
            load_kw: self.current.load_kw,
            pv_kw: self.current.pv_kw,
            storage: PerTechnology::from_fn(|t| {
                let d = self.suite.device(t);
                StorageObservation {
                    soc: d.soc(),
                    charge_headroom_kw: d.charge_headroom_kw(),
                    discharge_headroom_kw: d.discharge_headroom_kw(),
                    at_floor: d.at_floor(),
                }
            }),
            grid,
        }
    }

    pub fn total_capital_cost(&self) -> f64 {
        self.suite.total_capital_cost()
    }

    /// Cost accumulated in the current episode.
    pub fn current_cost(&self) -> f64 {
        self.history.total_cost()
    }

    /// CO2 accumulated in the current episode (kg).
    pub fn current_co2(&self) -> f64 {
        self.history.total_co2()
    }

    pub fn snapshot(&self) -> PerTechnology<DeviceSnapshot> {
        self.suite.snapshot()
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    /// Summaries of every finished episode.
    pub fn episode_summaries(&self) -> &[EpisodeSummary] {
        &self.episodes
    }

    pub fn suite(&self) -> &StorageSuite {
        &self.suite
    }

    pub fn architecture(&self) -> &Architecture {
        &self.arch
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn costs(&self) -> &CostParams {
        &self.costs
    }

    pub fn series(&self) -> &ExogenousSeries {
        &self.series
    }

    /// Steps completed in the current episode.
    pub fn timestep(&self) -> usize {
        self.clock.current()
    }

    /// Steps the current episode will run in total.
    pub fn episode_len(&self) -> usize {
        self.clock.total()
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Data slice of the current episode.
    pub fn data_slice(&self) -> DataSlice {
        self.slice
    }
}
