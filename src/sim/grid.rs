/// Main-grid connection with independent import and export limits.
///
/// Flows are always non-negative magnitudes: import brings power onto the
/// microgrid bus, export sends it out.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    max_import_kw: f64,
    max_export_kw: f64,
}

impl Grid {
    /// Creates a grid connection rated at `rated_kw` in both directions.
    pub fn new(rated_kw: f64) -> Self {
        Self::with_limits(rated_kw, rated_kw)
    }

    /// Creates a grid connection with separate import and export limits.
    ///
    /// # Panics
    ///
    /// Panics if `max_import_kw` or `max_export_kw` is negative.
    pub fn with_limits(max_import_kw: f64, max_export_kw: f64) -> Self {
        assert!(max_import_kw >= 0.0);
        assert!(max_export_kw >= 0.0);

        Self {
            max_import_kw,
            max_export_kw,
        }
    }

    /// Rated power sized for a peak load: twice the peak.
    pub fn rated_for_peak(peak_load_kw: f64) -> f64 {
        (peak_load_kw * 2.0).floor()
    }

    /// Returns the maximum import limit in kW.
    pub fn max_import_kw(&self) -> f64 {
        self.max_import_kw
    }

    /// Returns the maximum export limit in kW.
    pub fn max_export_kw(&self) -> f64 {
        self.max_export_kw
    }

    /// Floors a commanded import at zero and caps it at the import limit.
    pub fn clamp_import(&self, kw: f64) -> f64 {
        kw.max(0.0).min(self.max_import_kw)
    }

    /// Floors a commanded export at zero and caps it at the export limit.
    pub fn clamp_export(&self, kw: f64) -> f64 {
        kw.max(0.0).min(self.max_export_kw)
    }
}
