//! Per-episode ledgers and multi-episode bookkeeping.

use std::ops::Range;

use super::types::{ActionRow, Co2Row, CostRow, ProductionRow};

/// The four time-indexed ledgers of one episode.
///
/// Rows are appended together, one of each per step, and never rewritten.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct History {
    actions: Vec<ActionRow>,
    production: Vec<ProductionRow>,
    cost: Vec<CostRow>,
    co2: Vec<Co2Row>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one row to every ledger.
    ///
    /// # Panics
    ///
    /// Panics if the rows do not share the next timestep.
    pub fn record(
        &mut self,
        action: ActionRow,
        production: ProductionRow,
        cost: CostRow,
        co2: Co2Row,
    ) {
        let t = self.len();
        assert!(
            action.timestep == t
                && production.timestep == t
                && cost.timestep == t
                && co2.timestep == t,
            "ledger rows must carry timestep {t}"
        );
        self.actions.push(action);
        self.production.push(production);
        self.cost.push(cost);
        self.co2.push(co2);
    }

    /// Number of recorded steps.
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn clear(&mut self) {
        self.actions.clear();
        self.production.clear();
        self.cost.clear();
        self.co2.clear();
    }

    pub fn actions(&self) -> &[ActionRow] {
        &self.actions
    }

    pub fn production(&self) -> &[ProductionRow] {
        &self.production
    }

    pub fn cost(&self) -> &[CostRow] {
        &self.cost
    }

    pub fn co2(&self) -> &[Co2Row] {
        &self.co2
    }

    /// Sum of the per-step total cost.
    pub fn total_cost(&self) -> f64 {
        self.cost.iter().map(|c| c.total).sum()
    }

    /// Sum of the per-step CO2 (kg).
    pub fn total_co2(&self) -> f64 {
        self.co2.iter().map(|c| c.total).sum()
    }
}

/// Which part of the data an episode ran on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSlice {
    /// The whole series (no split active).
    Full,
    Training,
    Testing,
}

/// Bookkeeping kept across resets for one finished episode.
#[derive(Debug, Clone, PartialEq)]
pub struct EpisodeSummary {
    /// Zero-based episode index.
    pub episode: usize,
    pub slice: DataSlice,
    /// Absolute data indices the episode covered.
    pub window: Range<usize>,
    pub steps: usize,
    pub total_cost: f64,
    pub total_co2: f64,
}
