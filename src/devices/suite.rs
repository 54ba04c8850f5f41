use serde::{Deserialize, Serialize};
use tracing::info;

use super::error::StorageError;
use super::storage::{
    ChargeOutcome, ChargeRequest, CostAccumulator, DeviceSnapshot, DischargeOutcome,
    DischargeRequest, Sizing, StorageDevice,
};
use super::table::DeviceTable;
use super::technology::{PerTechnology, Technology};

/// What happens to device SOC when an episode is reset.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SocResetPolicy {
    /// Devices keep the SOC they ended the previous episode with.
    #[default]
    Carry,
    /// Devices are refilled to their maximum SOC.
    Full,
    /// Devices are set to the given SOC, clamped to their bounds.
    Baseline(f64),
}

/// The storage fleet: exactly one device per [`Technology`].
///
/// The suite is the only way to reach a device mutably. Devices are replaced
/// wholesale when resized; the set of technologies never changes.
#[derive(Debug, Clone)]
pub struct StorageSuite {
    devices: PerTechnology<StorageDevice>,
    dt_hours: f64,
}

impl StorageSuite {
    /// Builds one device per technology from the table.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidSizing`] if any sizing is unusable.
    pub fn from_table(
        table: &DeviceTable,
        sizes: &PerTechnology<Sizing>,
        dt_hours: f64,
    ) -> Result<Self, StorageError> {
        let [li_ion, flow, flywheel] = Technology::ALL
            .map(|tech| StorageDevice::new(table.spec(tech), sizes[tech], dt_hours));
        Ok(Self {
            devices: PerTechnology([li_ion?, flow?, flywheel?]),
            dt_hours,
        })
    }

    /// Builds the baseline fleet: each device sized to a third of `load_kwh`.
    ///
    /// # Errors
    ///
    /// See [`StorageSuite::from_table`].
    pub fn with_baseline(
        table: &DeviceTable,
        load_kwh: f64,
        dt_hours: f64,
    ) -> Result<Self, StorageError> {
        let sizes = PerTechnology::from_fn(|_| Sizing::capacity(load_kwh / 3.0));
        Self::from_table(table, &sizes, dt_hours)
    }

    pub fn device(&self, tech: Technology) -> &StorageDevice {
        &self.devices[tech]
    }

    pub fn devices(&self) -> impl Iterator<Item = (Technology, &StorageDevice)> {
        self.devices.iter()
    }

    pub fn dt_hours(&self) -> f64 {
        self.dt_hours
    }

    /// Charges the device for `tech`.
    pub fn charge(
        &mut self,
        tech: Technology,
        request: ChargeRequest,
        cost: Option<&mut CostAccumulator>,
    ) -> ChargeOutcome {
        self.devices[tech].charge(request, cost)
    }

    /// Discharges the device for `tech`.
    ///
    /// # Errors
    ///
    /// Propagates [`StorageError::PeakPowerExceeded`] from the device.
    pub fn discharge(
        &mut self,
        tech: Technology,
        request: DischargeRequest,
        cost: Option<&mut CostAccumulator>,
    ) -> Result<DischargeOutcome, StorageError> {
        self.devices[tech].discharge(request, cost)
    }

    /// Checks a discharge against the device limits without mutating it.
    ///
    /// # Errors
    ///
    /// See [`StorageDevice::check_discharge`].
    pub fn check_discharge(&self, tech: Technology, delivered_kw: f64) -> Result<(), StorageError> {
        self.devices[tech].check_discharge(delivered_kw)
    }

    /// Applies self-discharge to every device and returns the energy lost (kWh).
    pub fn self_discharge_all(&mut self) -> PerTechnology<f64> {
        PerTechnology::from_fn(|tech| self.devices[tech].self_discharge())
    }

    /// Rebuilds the named devices with new sizes. Other devices are untouched.
    ///
    /// Either every named device is replaced or none is.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidSizing`] if any new sizing is unusable.
    pub fn replace(
        &mut self,
        table: &DeviceTable,
        sizes: impl IntoIterator<Item = (Technology, Sizing)>,
    ) -> Result<(), StorageError> {
        let rebuilt = sizes
            .into_iter()
            .map(|(tech, sizing)| {
                StorageDevice::new(table.spec(tech), sizing, self.dt_hours).map(|d| (tech, d))
            })
            .collect::<Result<Vec<_>, _>>()?;

        for (tech, device) in rebuilt {
            info!(
                technology = %tech,
                capacity_kwh = device.capacity_kwh(),
                power_kw = device.continuous_power_kw(),
                "storage device replaced"
            );
            self.devices[tech] = device;
        }
        Ok(())
    }

    pub fn total_capital_cost(&self) -> f64 {
        self.devices.iter().map(|(_, d)| d.capital_cost()).sum()
    }

    /// Read-only state of every device, in [`Technology::ALL`] order.
    pub fn snapshot(&self) -> PerTechnology<DeviceSnapshot> {
        PerTechnology::from_fn(|tech| self.devices[tech].snapshot())
    }

    /// Applies an episode-reset SOC policy to every device.
    pub fn reset_soc_all(&mut self, policy: SocResetPolicy) {
        for tech in Technology::ALL {
            let device = &mut self.devices[tech];
            match policy {
                SocResetPolicy::Carry => device.restore_peak_budget(),
                SocResetPolicy::Full => device.reset_soc(device.max_soc()),
                SocResetPolicy::Baseline(soc) => device.reset_soc(soc),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn suite() -> (DeviceTable, StorageSuite) {
        let table = DeviceTable::builtin().expect("builtin table");
        let suite = StorageSuite::with_baseline(&table, 300.0, 0.25).expect("baseline suite");
        (table, suite)
    }

    #[test]
    fn test_baseline_sizes_each_device_to_a_third() {
        let (_, suite) = suite();
        for (_, device) in suite.devices() {
            assert!((device.capacity_kwh() - 100.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_routes_to_named_device() {
        let (_, mut suite) = suite();
        suite
            .discharge(Technology::Flow, DischargeRequest::Delivered(5.0), None)
            .expect("within rating");
        assert!(suite.device(Technology::Flow).soc() < 1.0);
        assert_eq!(suite.device(Technology::LiIon).soc(), 1.0);
        assert_eq!(suite.device(Technology::Flywheel).soc(), 1.0);
    }

    #[test]
    fn test_errors_propagate_unchanged() {
        let (_, mut suite) = suite();
        // flow: 25 kW continuous, 30 kW peak
        let err = suite.discharge(Technology::Flow, DischargeRequest::Delivered(31.0), None);
        assert!(matches!(
            err,
            Err(StorageError::PeakPowerExceeded {
                technology: Technology::Flow,
                ..
            })
        ));
    }

    #[test]
    fn test_replace_only_touches_named_devices() {
        let (table, mut suite) = suite();
        suite
            .discharge(Technology::LiIon, DischargeRequest::Delivered(10.0), None)
            .expect("within rating");
        let li_soc = suite.device(Technology::LiIon).soc();
        let before = suite.total_capital_cost();

        suite
            .replace(&table, [(Technology::Flow, Sizing::capacity(400.0))])
            .expect("valid sizing");
        assert_eq!(suite.device(Technology::Flow).capacity_kwh(), 400.0);
        assert_eq!(suite.device(Technology::LiIon).soc(), li_soc);
        assert!(suite.total_capital_cost() > before);
    }

    #[test]
    fn test_replace_is_all_or_nothing() {
        let (table, mut suite) = suite();
        let err = suite.replace(
            &table,
            [
                (Technology::Flow, Sizing::capacity(400.0)),
                (Technology::Flywheel, Sizing::capacity(-1.0)),
            ],
        );
        assert!(err.is_err());
        assert_eq!(suite.device(Technology::Flow).capacity_kwh(), 100.0);
    }

    #[test]
    fn test_total_capital_cost_sums_devices() {
        let (_, suite) = suite();
        let sum: f64 = Technology::ALL
            .iter()
            .map(|&t| suite.device(t).capital_cost())
            .sum();
        assert_eq!(suite.total_capital_cost(), sum);
    }

    #[test]
    fn test_self_discharge_all_reports_losses() {
        let (_, mut suite) = suite();
        let lost = suite.self_discharge_all();
        // li-ion: 0.05 per-mille of 100 kWh
        assert!((lost[Technology::LiIon] - 0.005).abs() < 1e-12);
        assert!(lost[Technology::Flywheel] > lost[Technology::Flow]);
    }

    #[test]
    fn test_reset_policies() {
        let (_, mut suite) = suite();
        suite
            .discharge(Technology::LiIon, DischargeRequest::Delivered(40.0), None)
            .expect("within rating");
        let carried = suite.device(Technology::LiIon).soc();

        suite.reset_soc_all(SocResetPolicy::Carry);
        assert_eq!(suite.device(Technology::LiIon).soc(), carried);

        suite.reset_soc_all(SocResetPolicy::Baseline(0.05));
        assert_eq!(suite.device(Technology::LiIon).soc(), 0.1);
        assert_eq!(suite.device(Technology::Flywheel).soc(), 0.05);

        suite.reset_soc_all(SocResetPolicy::Full);
        for snap in suite.snapshot().0 {
            assert_eq!(snap.soc, 1.0);
        }
    }

    #[test]
    fn test_carry_reset_restores_peak_budget() {
        let (_, mut suite) = suite();
        // 80 kW is above li-ion's 50 kW continuous rating
        suite
            .discharge(Technology::LiIon, DischargeRequest::Delivered(80.0), None)
            .expect("within peak rating");
        let device = suite.device(Technology::LiIon);
        assert_eq!(device.peak_time_left(), device.peak_time() - 1);
        let carried = device.soc();

        suite.reset_soc_all(SocResetPolicy::Carry);
        let device = suite.device(Technology::LiIon);
        assert_eq!(device.peak_time_left(), device.peak_time());
        assert_eq!(device.soc(), carried);
    }

    #[test]
    fn test_soc_reset_policy_from_toml() {
        #[derive(Deserialize)]
        struct Wrapper {
            soc_reset: SocResetPolicy,
        }
        let w: Wrapper = toml::from_str("soc_reset = \"full\"").expect("unit variant");
        assert_eq!(w.soc_reset, SocResetPolicy::Full);
        let w: Wrapper = toml::from_str("soc_reset = { baseline = 0.6 }").expect("baseline");
        assert_eq!(w.soc_reset, SocResetPolicy::Baseline(0.6));
    }
}
