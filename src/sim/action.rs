//! Discrete action set and its mapping onto control intents.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::types::{ControlIntent, StorageCommand};
use crate::devices::{PerTechnology, Technology};

/// The closed set of discrete actions a driver may choose from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// Charge one device from surplus PV; the rest is exported.
    Charge(Technology),
    /// Discharge one device into the deficit; the genset backs it up when the
    /// device is empty.
    Discharge(Technology),
    /// Cover the deficit from the grid.
    Import,
    /// Export the surplus to the grid.
    Export,
    /// Charge every device from the surplus and import any deficit.
    ChargeAllImport,
    /// Discharge every device into the deficit and export any surplus.
    DischargeAllExport,
}

impl Action {
    /// Number of actions.
    pub const COUNT: usize = 10;

    /// Every action, in index order.
    pub const ALL: [Self; Self::COUNT] = [
        Self::Charge(Technology::LiIon),
        Self::Discharge(Technology::LiIon),
        Self::Charge(Technology::Flow),
        Self::Discharge(Technology::Flow),
        Self::Charge(Technology::Flywheel),
        Self::Discharge(Technology::Flywheel),
        Self::Import,
        Self::Export,
        Self::ChargeAllImport,
        Self::DischargeAllExport,
    ];

    /// Looks an action up by index, `None` outside `0..COUNT`.
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Position of this action in [`Action::ALL`].
    pub fn index(self) -> usize {
        match self {
            Self::Charge(t) => 2 * t.index(),
            Self::Discharge(t) => 2 * t.index() + 1,
            Self::Import => 6,
            Self::Export => 7,
            Self::ChargeAllImport => 8,
            Self::DischargeAllExport => 9,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Charge(t) => write!(f, "charge-{t}"),
            Self::Discharge(t) => write!(f, "discharge-{t}"),
            Self::Import => f.write_str("import"),
            Self::Export => f.write_str("export"),
            Self::ChargeAllImport => f.write_str("charge-all-import"),
            Self::DischargeAllExport => f.write_str("discharge-all-export"),
        }
    }
}

/// How the combined actions share power across the three devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SplitPolicy {
    /// One third each, capped by each device's headroom.
    #[default]
    Even,
    /// In proportion to each device's headroom.
    Headroom,
}

impl SplitPolicy {
    /// Splits `amount_kw` across devices with the given headrooms.
    ///
    /// Each share is capped at its device's headroom, so the shares never
    /// add up to more than `amount_kw`.
    pub fn split(self, amount_kw: f64, headroom: &PerTechnology<f64>) -> PerTechnology<f64> {
        match self {
            Self::Even => PerTechnology::from_fn(|t| (amount_kw / 3.0).min(headroom[t])),
            Self::Headroom => {
                let total: f64 = headroom.0.iter().sum();
                if total <= 0.0 {
                    return PerTechnology::default();
                }
                PerTechnology::from_fn(|t| (amount_kw * headroom[t] / total).min(headroom[t]))
            }
        }
    }
}

/// Everything the action mapping needs to know about the current step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DispatchContext {
    pub load_kw: f64,
    pub pv_kw: f64,
    /// Grid availability; `false` also when no grid is installed.
    pub grid_up: bool,
    pub charge_headroom_kw: PerTechnology<f64>,
    pub discharge_headroom_kw: PerTechnology<f64>,
    pub at_floor: PerTechnology<bool>,
    /// Highest genset output, `None` without a genset.
    pub genset_max_kw: Option<f64>,
    pub split_policy: SplitPolicy,
}

impl DispatchContext {
    fn surplus_kw(&self) -> f64 {
        (self.pv_kw - self.load_kw).max(0.0)
    }

    fn deficit_kw(&self) -> f64 {
        (self.load_kw - self.pv_kw).max(0.0)
    }

    fn status(&self) -> f64 {
        if self.grid_up { 1.0 } else { 0.0 }
    }
}

/// Maps a discrete action onto a control intent.
///
/// At most one of charge/discharge is set per device, and grid flows are zero
/// while the grid is down.
pub fn intent_for(action: Action, ctx: &DispatchContext) -> ControlIntent {
    let surplus = ctx.surplus_kw();
    let deficit = ctx.deficit_kw();
    let status = ctx.status();

    let mut intent = ControlIntent {
        load_kw: ctx.load_kw,
        pv_kw: ctx.pv_kw,
        pv_consumed_kw: ctx.pv_kw.min(ctx.load_kw),
        ..ControlIntent::default()
    };

    match action {
        Action::Charge(tech) => {
            let charge = surplus.min(ctx.charge_headroom_kw[tech]);
            intent.storage[tech] = StorageCommand::charge(charge);
            intent.grid_export_kw = (surplus - charge) * status;
        }
        Action::Discharge(tech) => {
            let discharge = deficit.min(ctx.discharge_headroom_kw[tech]);
            intent.storage[tech] = StorageCommand::discharge(discharge);
            intent.grid_export_kw = surplus * status;
            if ctx.at_floor[tech] {
                if let Some(max_kw) = ctx.genset_max_kw {
                    intent.genset_kw = deficit.min(max_kw);
                }
            }
        }
        Action::Import => {
            intent.grid_import_kw = deficit * status;
        }
        Action::Export => {
            intent.grid_export_kw = surplus * status;
        }
        Action::ChargeAllImport => {
            let shares = ctx.split_policy.split(surplus, &ctx.charge_headroom_kw);
            for tech in Technology::ALL {
                intent.storage[tech] = StorageCommand::charge(shares[tech]);
            }
            intent.grid_import_kw = deficit * status;
        }
        Action::DischargeAllExport => {
            let shares = ctx.split_policy.split(deficit, &ctx.discharge_headroom_kw);
            for tech in Technology::ALL {
                intent.storage[tech] = StorageCommand::discharge(shares[tech]);
            }
            intent.grid_export_kw = surplus * status;
        }
    }

    intent
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(load_kw: f64, pv_kw: f64, grid_up: bool) -> DispatchContext {
        DispatchContext {
            load_kw,
            pv_kw,
            grid_up,
            charge_headroom_kw: PerTechnology([5.0, 10.0, 30.0]),
            discharge_headroom_kw: PerTechnology([5.0, 10.0, 30.0]),
            at_floor: PerTechnology([false; 3]),
            genset_max_kw: Some(90.0),
            split_policy: SplitPolicy::Even,
        }
    }

    #[test]
    fn index_round_trip() {
        for (i, action) in Action::ALL.into_iter().enumerate() {
            assert_eq!(action.index(), i);
            assert_eq!(Action::from_index(i), Some(action));
        }
        assert_eq!(Action::from_index(10), None);
    }

    #[test]
    fn charge_exports_what_the_device_cannot_take() {
        let intent = intent_for(Action::Charge(Technology::LiIon), &ctx(10.0, 18.0, true));
        assert_eq!(intent.storage[Technology::LiIon].charge_kw, 5.0);
        assert_eq!(intent.grid_export_kw, 3.0);
        assert_eq!(intent.pv_consumed_kw, 10.0);
    }

    #[test]
    fn grid_down_zeroes_every_grid_flow() {
        for action in Action::ALL {
            for (load, pv) in [(10.0, 30.0), (30.0, 10.0)] {
                let intent = intent_for(action, &ctx(load, pv, false));
                assert_eq!(intent.grid_export_kw, 0.0, "{action}");
                assert_eq!(intent.grid_import_kw, 0.0, "{action}");
            }
        }
    }

    #[test]
    fn discharge_at_floor_commits_genset() {
        let mut c = ctx(50.0, 10.0, false);
        c.at_floor[Technology::Flow] = true;
        c.discharge_headroom_kw[Technology::Flow] = 0.0;
        let intent = intent_for(Action::Discharge(Technology::Flow), &c);
        assert_eq!(intent.storage[Technology::Flow].discharge_kw, 0.0);
        assert_eq!(intent.genset_kw, 40.0);

        c.genset_max_kw = None;
        let intent = intent_for(Action::Discharge(Technology::Flow), &c);
        assert_eq!(intent.genset_kw, 0.0);
    }

    #[test]
    fn never_charges_and_discharges_one_device() {
        for action in Action::ALL {
            let intent = intent_for(action, &ctx(20.0, 20.0, true));
            for (_, cmd) in intent.storage.iter() {
                assert!(cmd.charge_kw == 0.0 || cmd.discharge_kw == 0.0);
            }
        }
    }

    #[test]
    fn even_split_is_capped_by_headroom() {
        let intent = intent_for(Action::DischargeAllExport, &ctx(40.0, 10.0, true));
        let got: Vec<f64> = intent.storage.0.iter().map(|s| s.discharge_kw).collect();
        assert_eq!(got, vec![5.0, 10.0, 10.0]);
        assert_eq!(intent.grid_export_kw, 0.0);
    }

    #[test]
    fn headroom_split_is_proportional() {
        let mut c = ctx(10.0, 19.0, true);
        c.split_policy = SplitPolicy::Headroom;
        let intent = intent_for(Action::ChargeAllImport, &c);
        let got: Vec<f64> = intent.storage.0.iter().map(|s| s.charge_kw).collect();
        assert_eq!(got, vec![1.0, 2.0, 6.0]);
        assert_eq!(intent.grid_import_kw, 0.0);
    }

    #[test]
    fn headroom_split_with_no_headroom_is_zero() {
        let shares = SplitPolicy::Headroom.split(10.0, &PerTechnology::default());
        assert_eq!(shares, PerTechnology([0.0; 3]));
    }
}
