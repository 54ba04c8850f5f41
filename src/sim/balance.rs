//! Bus balance: reconciling realized sources and sinks against available PV.

use super::types::{BALANCE_TOLERANCE, StepClass};

/// How PV and the unbalanced remainder were accounted for in one step (kW).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Balance {
    pub pv_consumed_kw: f64,
    pub pv_curtailed_kw: f64,
    pub loss_load_kw: f64,
    pub overgeneration_kw: f64,
    pub class: StepClass,
}

/// Classifies a step from its non-PV sources and sinks.
///
/// `sources_kw` is storage discharge plus grid import plus genset output;
/// `sinks_kw` is load plus storage charge plus grid export. The PV the bus
/// needs is `sinks - sources`. Exactly one of loss of load, curtailment and
/// overgeneration is non-zero, and
/// `pv_consumed + sources + loss_load == sinks + overgeneration`
/// holds within [`BALANCE_TOLERANCE`].
///
/// # Arguments
///
/// * `sources_kw` - Realized non-PV sources
/// * `sinks_kw` - Realized sinks, load included
/// * `pv_available_kw` - PV available this step
pub fn reconcile(sources_kw: f64, sinks_kw: f64, pv_available_kw: f64) -> Balance {
    let required = sinks_kw - sources_kw;
    let pv = pv_available_kw.max(0.0);

    if (required - pv).abs() < BALANCE_TOLERANCE {
        Balance {
            pv_consumed_kw: required.clamp(0.0, pv),
            pv_curtailed_kw: 0.0,
            loss_load_kw: 0.0,
            overgeneration_kw: 0.0,
            class: StepClass::Balanced,
        }
    } else if required > pv {
        Balance {
            pv_consumed_kw: pv,
            pv_curtailed_kw: 0.0,
            loss_load_kw: required - pv,
            overgeneration_kw: 0.0,
            class: StepClass::LossOfLoad,
        }
    } else if required >= 0.0 {
        Balance {
            pv_consumed_kw: required,
            pv_curtailed_kw: pv - required,
            loss_load_kw: 0.0,
            overgeneration_kw: 0.0,
            class: StepClass::Curtailment,
        }
    } else {
        Balance {
            pv_consumed_kw: 0.0,
            pv_curtailed_kw: 0.0,
            loss_load_kw: 0.0,
            overgeneration_kw: -required,
            class: StepClass::Overgeneration,
        }
    }
}
