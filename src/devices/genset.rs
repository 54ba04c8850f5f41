use tracing::warn;

/// Commands at or below this power count as "genset off".
pub const GENSET_OFF_EPS_KW: f64 = 1e-3;

/// A dispatchable backup generator.
///
/// Output is bounded to `[p_min, p_max] × rated_kw`. Commands between zero and
/// the minimum loading are raised to the minimum rather than dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct Genset {
    /// Nameplate power in kW.
    pub rated_kw: f64,
    /// Minimum loading as a fraction of rated power.
    pub p_min: f64,
    /// Maximum loading as a fraction of rated power.
    pub p_max: f64,
    /// Fuel cost per kWh produced.
    pub fuel_cost: f64,
    /// CO2 per kWh produced (kg).
    pub co2_per_kwh: f64,
}

impl Genset {
    /// Rated power sized for a peak load: the genset covers the peak at
    /// 90 % loading, rounded up to a whole kW.
    pub fn rated_for_peak(peak_load_kw: f64) -> f64 {
        (peak_load_kw / 0.9).ceil()
    }

    /// Highest realizable output in kW.
    pub fn max_output_kw(&self) -> f64 {
        self.rated_kw * self.p_max
    }

    /// Lowest non-zero output in kW.
    pub fn min_output_kw(&self) -> f64 {
        self.rated_kw * self.p_min
    }

    /// Maps a commanded output onto what the genset can actually produce.
    pub fn clamp_output(&self, command_kw: f64) -> f64 {
        if !command_kw.is_finite() || command_kw <= GENSET_OFF_EPS_KW {
            return 0.0;
        }
        let min_kw = self.min_output_kw();
        let max_kw = self.max_output_kw();
        if command_kw < min_kw {
            warn!(
                command_kw,
                min_kw, "genset command below minimum loading, raised"
            );
            min_kw
        } else {
            command_kw.min(max_kw)
        }
    }
}
