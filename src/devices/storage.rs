use super::error::StorageError;
use super::table::DeviceSpec;
use super::technology::Technology;

/// Lower bound applied to evaluated efficiency curves.
const EFF_FLOOR: f64 = 1e-6;

/// SOC slack under which a device counts as sitting on its floor.
const SOC_EPS: f64 = 1e-9;

/// Capacity and optional explicit power rating of a device.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sizing {
    /// Rated energy capacity in kWh.
    pub capacity_kwh: f64,
    /// Continuous power rating in kW; derived from the table when `None`.
    pub power_kw: Option<f64>,
}

impl Sizing {
    /// Sizing with the power rating derived from the device table.
    pub fn capacity(capacity_kwh: f64) -> Self {
        Self {
            capacity_kwh,
            power_kw: None,
        }
    }
}

/// A charge command. Exactly one side of the conversion is given.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ChargeRequest {
    /// Power taken from the bus, in kW.
    Drawn(f64),
    /// Power landing in storage, in kW.
    Stored(f64),
}

/// A discharge command. Exactly one side of the conversion is given.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DischargeRequest {
    /// Power delivered to the bus, in kW.
    Delivered(f64),
    /// Power taken out of storage, in kW.
    Drawn(f64),
}

/// Realized charge: `(drawn from bus, stored)` in kW.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ChargeOutcome {
    pub drawn_kw: f64,
    pub stored_kw: f64,
}

/// Realized discharge: `(delivered to bus, drawn from storage)` in kW.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DischargeOutcome {
    pub delivered_kw: f64,
    pub drawn_kw: f64,
}

/// Running operating cost supplied by the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CostAccumulator {
    total: f64,
}

impl CostAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, amount: f64) {
        self.total += amount;
    }

    pub fn total(&self) -> f64 {
        self.total
    }
}

/// Read-only view of one device's dynamic state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviceSnapshot {
    pub technology: Technology,
    pub soc: f64,
    pub stored_kwh: f64,
    /// Charge efficiency at the current SOC.
    pub eff_charge: f64,
    /// Discharge efficiency at the current SOC.
    pub eff_discharge: f64,
    /// Self-discharge rate at the current SOC (per-mille of capacity per step).
    pub self_discharge: f64,
    pub peak_time_left: u32,
}

/// A storage device built from one row of the device table.
///
/// `StorageDevice` keeps energy bookkeeping in kWh and exposes a power (kW)
/// interface: a power held for one step of `dt_hours` moves
/// `power × dt_hours` kWh. The state of charge is always recomputed from the
/// stored energy after a mutation.
///
/// Capacity, power rating, peak ceiling and capital cost are fixed at
/// construction. Resizing means building a new device.
#[derive(Debug, Clone)]
pub struct StorageDevice {
    spec: DeviceSpec,
    capacity_kwh: f64,
    power_kw: f64,
    peak_kw: f64,
    capital_cost: f64,
    soc: f64,
    stored_kwh: f64,
    peak_time_left: u32,
    dt_hours: f64,
}

impl StorageDevice {
    /// Creates a full device (`soc == max_soc`).
    ///
    /// # Arguments
    ///
    /// * `spec` - Behaviour record for the technology
    /// * `sizing` - Capacity and optional explicit power rating
    /// * `dt_hours` - Duration of one timestep in hours
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidSizing`] if the capacity is not positive,
    /// or if the power rating is negative or not finite.
    pub fn new(spec: &DeviceSpec, sizing: Sizing, dt_hours: f64) -> Result<Self, StorageError> {
        let technology = spec.technology;
        let invalid = |message: String| StorageError::InvalidSizing {
            technology,
            message,
        };

        if !(sizing.capacity_kwh.is_finite() && sizing.capacity_kwh > 0.0) {
            return Err(invalid(format!(
                "capacity must be > 0 kWh, got {}",
                sizing.capacity_kwh
            )));
        }
        if !(dt_hours.is_finite() && dt_hours > 0.0) {
            return Err(invalid(format!("dt_hours must be > 0, got {dt_hours}")));
        }

        let power_kw = match sizing.power_kw {
            Some(p) => p,
            None => spec
                .max_cont_discharge
                .eval1(sizing.capacity_kwh)
                .unwrap_or(0.0),
        };
        if !(power_kw.is_finite() && power_kw >= 0.0) {
            return Err(invalid(format!("power must be >= 0 kW, got {power_kw}")));
        }

        let peak_kw = spec
            .max_peak_discharge
            .eval(&[sizing.capacity_kwh, power_kw])
            .filter(|p| p.is_finite())
            .unwrap_or(power_kw)
            .max(power_kw);
        let capital_cost = spec
            .capital_cost
            .eval(&[sizing.capacity_kwh / 1000.0, power_kw / 1000.0])
            .unwrap_or(0.0);

        Ok(Self {
            spec: spec.clone(),
            capacity_kwh: sizing.capacity_kwh,
            power_kw,
            peak_kw,
            capital_cost,
            soc: spec.max_soc,
            stored_kwh: spec.max_soc * sizing.capacity_kwh,
            peak_time_left: spec.peak_time,
            dt_hours,
        })
    }

    pub fn technology(&self) -> Technology {
        self.spec.technology
    }

    pub fn capacity_kwh(&self) -> f64 {
        self.capacity_kwh
    }

    /// Continuous power rating in kW.
    pub fn continuous_power_kw(&self) -> f64 {
        self.power_kw
    }

    /// Instantaneous discharge ceiling in kW.
    pub fn peak_discharge_kw(&self) -> f64 {
        self.peak_kw
    }

    pub fn capital_cost(&self) -> f64 {
        self.capital_cost
    }

    pub fn marginal_cost(&self) -> f64 {
        self.spec.marginal_cost
    }

    pub fn soc(&self) -> f64 {
        self.soc
    }

    pub fn stored_kwh(&self) -> f64 {
        self.stored_kwh
    }

    pub fn min_soc(&self) -> f64 {
        self.spec.min_soc
    }

    pub fn max_soc(&self) -> f64 {
        self.spec.max_soc
    }

    pub fn peak_time_left(&self) -> u32 {
        self.peak_time_left
    }

    pub fn peak_time(&self) -> u32 {
        self.spec.peak_time
    }

    /// True when the device cannot discharge any further.
    pub fn at_floor(&self) -> bool {
        self.soc <= self.spec.min_soc + SOC_EPS
    }

    fn min_kwh(&self) -> f64 {
        self.spec.min_soc * self.capacity_kwh
    }

    fn max_kwh(&self) -> f64 {
        self.spec.max_soc * self.capacity_kwh
    }

    fn eff_charge(&self) -> f64 {
        efficiency(self.spec.eff_charge.eval1(self.soc))
    }

    fn eff_discharge(&self) -> f64 {
        efficiency(self.spec.eff_discharge.eval1(self.soc))
    }

    fn self_discharge_rate(&self) -> f64 {
        self.spec
            .self_discharge
            .eval1(self.soc)
            .filter(|r| r.is_finite())
            .unwrap_or(0.0)
            .max(0.0)
    }

    /// Bus-side power that would fill the device in one step, capped by the
    /// continuous rating.
    pub fn charge_headroom_kw(&self) -> f64 {
        ((self.max_kwh() - self.stored_kwh).max(0.0) / self.dt_hours).min(self.power_kw)
    }

    /// Power that would drain the device to its floor in one step, capped by
    /// the continuous rating.
    pub fn discharge_headroom_kw(&self) -> f64 {
        ((self.stored_kwh - self.min_kwh()).max(0.0) / self.dt_hours).min(self.power_kw)
    }

    fn update_soc(&mut self) {
        self.soc = (self.stored_kwh / self.capacity_kwh).clamp(self.spec.min_soc, self.spec.max_soc);
    }

    /// Charges the device.
    ///
    /// The efficiency is taken at the SOC before the call. When the request
    /// would overfill the device, the device is filled exactly and both sides
    /// of the outcome equal the remaining headroom over one step.
    ///
    /// Negative requests are treated as zero.
    pub fn charge(
        &mut self,
        request: ChargeRequest,
        cost: Option<&mut CostAccumulator>,
    ) -> ChargeOutcome {
        let eff = self.eff_charge();
        let (mut drawn_kw, mut stored_kw) = match request {
            ChargeRequest::Drawn(p) => {
                let p = p.max(0.0);
                (p, p * eff)
            }
            ChargeRequest::Stored(p) => {
                let p = p.max(0.0);
                (p / eff, p)
            }
        };

        let headroom_kwh = (self.max_kwh() - self.stored_kwh).max(0.0);
        if stored_kw * self.dt_hours > headroom_kwh {
            stored_kw = headroom_kwh / self.dt_hours;
            drawn_kw = stored_kw;
            self.stored_kwh = self.max_kwh();
        } else {
            self.stored_kwh += stored_kw * self.dt_hours;
        }
        self.update_soc();

        if let Some(acc) = cost {
            acc.add(self.spec.marginal_cost * drawn_kw * self.dt_hours);
        }

        ChargeOutcome {
            drawn_kw,
            stored_kw,
        }
    }

    /// Checks a discharge of `delivered_kw` against the peak ceiling and the
    /// peak-burst budget without touching any state.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::PeakPowerExceeded`] when `delivered_kw` is above
    /// the peak ceiling, or above the continuous rating with no budget left.
    /// A device already on its floor never fails.
    pub fn check_discharge(&self, delivered_kw: f64) -> Result<(), StorageError> {
        if self.at_floor() {
            return Ok(());
        }
        let limit_kw = if self.peak_time_left == 0 {
            self.power_kw
        } else {
            self.peak_kw
        };
        if delivered_kw > limit_kw {
            return Err(StorageError::PeakPowerExceeded {
                technology: self.spec.technology,
                requested_kw: delivered_kw,
                limit_kw,
            });
        }
        Ok(())
    }

    /// Discharges the device.
    ///
    /// A device on its floor returns a zero outcome. A request that would
    /// drain below the floor is clamped so the device lands exactly on it,
    /// with both sides of the outcome equal to the available energy over one
    /// step. Delivering above the continuous rating spends one unit of the
    /// peak-burst budget; any other step recovers one unit.
    ///
    /// # Errors
    ///
    /// See [`StorageDevice::check_discharge`]. The device is unchanged on error.
    pub fn discharge(
        &mut self,
        request: DischargeRequest,
        cost: Option<&mut CostAccumulator>,
    ) -> Result<DischargeOutcome, StorageError> {
        if self.at_floor() {
            return Ok(DischargeOutcome::default());
        }

        let eff = self.eff_discharge();
        let (mut delivered_kw, mut drawn_kw) = match request {
            DischargeRequest::Delivered(p) => {
                let p = p.max(0.0);
                (p, p / eff)
            }
            DischargeRequest::Drawn(p) => {
                let p = p.max(0.0);
                (p * eff, p)
            }
        };
        self.check_discharge(delivered_kw)?;

        let available_kwh = (self.stored_kwh - self.min_kwh()).max(0.0);
        if drawn_kw * self.dt_hours > available_kwh {
            drawn_kw = available_kwh / self.dt_hours;
            delivered_kw = drawn_kw;
            self.stored_kwh = self.min_kwh();
        } else {
            self.stored_kwh -= drawn_kw * self.dt_hours;
        }
        self.update_soc();

        if delivered_kw > self.power_kw {
            self.peak_time_left = self.peak_time_left.saturating_sub(1);
        } else if self.peak_time_left < self.spec.peak_time {
            self.peak_time_left += 1;
        }

        if let Some(acc) = cost {
            acc.add(self.spec.marginal_cost * delivered_kw * self.dt_hours);
        }

        Ok(DischargeOutcome {
            delivered_kw,
            drawn_kw,
        })
    }

    /// Applies one step of self-discharge and returns the energy lost in kWh.
    ///
    /// The loss never takes the device below its floor, so a device on its
    /// floor loses nothing.
    pub fn self_discharge(&mut self) -> f64 {
        let rate = self.self_discharge_rate();
        let room = (self.stored_kwh - self.min_kwh()).max(0.0);
        let lost = (rate * 1e-3 * self.capacity_kwh).min(room);
        if lost > 0.0 {
            self.stored_kwh -= lost;
            self.update_soc();
        }
        lost
    }

    /// Sets the SOC (clamped to the device bounds) and restores the full
    /// peak-burst budget.
    pub fn reset_soc(&mut self, soc: f64) {
        let soc = soc.clamp(self.spec.min_soc, self.spec.max_soc);
        self.stored_kwh = soc * self.capacity_kwh;
        self.soc = soc;
        self.peak_time_left = self.spec.peak_time;
    }

    /// Refills the peak-burst budget without touching SOC.
    pub fn restore_peak_budget(&mut self) {
        self.peak_time_left = self.spec.peak_time;
    }

    pub fn snapshot(&self) -> DeviceSnapshot {
        DeviceSnapshot {
            technology: self.spec.technology,
            soc: self.soc,
            stored_kwh: self.stored_kwh,
            eff_charge: self.eff_charge(),
            eff_discharge: self.eff_discharge(),
            self_discharge: self.self_discharge_rate(),
            peak_time_left: self.peak_time_left,
        }
    }
}

fn efficiency(value: Option<f64>) -> f64 {
    match value {
        Some(v) if v.is_finite() => v.clamp(EFF_FLOOR, 1.0),
        _ => 1.0,
    }
}
