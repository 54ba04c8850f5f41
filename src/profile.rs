//! Deterministic synthetic load and PV profiles.
//!
//! Used by presets and scenarios that do not point at a series file. Every
//! generator owns its own seeded RNG; the same seed always yields the same
//! profile.

use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::config::{GridConfig, ProfileConfig};
use crate::sim::series::{ExogenousSeries, GridSeries};

/// Seed offset for the PV generator so its noise is not correlated with the load.
const PV_SEED_OFFSET: u64 = 31;

/// Zero-mean Gaussian noise via the Box-Muller transform.
///
/// # Arguments
///
/// * `rng` - Random number generator
/// * `std_dev` - Standard deviation of the noise
pub fn gaussian_noise(rng: &mut StdRng, std_dev: f64) -> f64 {
    if std_dev <= 0.0 {
        return 0.0;
    }

    let u1: f64 = rng.random::<f64>().clamp(1e-12, 1.0);
    let u2: f64 = rng.random::<f64>();
    let z0 = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
    z0 * std_dev
}

/// Daily load curve: a sinusoid around a base value plus Gaussian noise.
///
/// # Examples
///
/// ```
/// use mgrid_sim::profile::LoadProfile;
///
/// let mut load = LoadProfile::new(40.0, 10.0, 0.0, 0.0, 24, 42);
/// assert!((load.demand_kw(0) - 40.0).abs() < 1e-9);
/// ```
#[derive(Debug, Clone)]
pub struct LoadProfile {
    pub base_kw: f64,
    pub amp_kw: f64,
    pub phase_rad: f64,
    pub noise_std: f64,
    steps_per_day: usize,
    rng: StdRng,
}

impl LoadProfile {
    /// Creates a load generator.
    ///
    /// # Arguments
    ///
    /// * `base_kw` - Mean demand
    /// * `amp_kw` - Amplitude of the daily sinusoid
    /// * `phase_rad` - Phase offset in radians
    /// * `noise_std` - Standard deviation of additive noise (kW)
    /// * `steps_per_day` - Steps per simulated day
    /// * `seed` - Random seed
    pub fn new(
        base_kw: f64,
        amp_kw: f64,
        phase_rad: f64,
        noise_std: f64,
        steps_per_day: usize,
        seed: u64,
    ) -> Self {
        Self {
            base_kw,
            amp_kw,
            phase_rad,
            noise_std: noise_std.max(0.0),
            steps_per_day: steps_per_day.max(1),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Demand at `timestep`, never negative.
    pub fn demand_kw(&mut self, timestep: usize) -> f64 {
        let day_pos = (timestep % self.steps_per_day) as f64 / self.steps_per_day as f64;
        let angle = 2.0 * std::f64::consts::PI * day_pos + self.phase_rad;
        let noise = gaussian_noise(&mut self.rng, self.noise_std);
        (self.base_kw + self.amp_kw * angle.sin() + noise).max(0.0)
    }
}

/// Half-cosine PV curve between sunrise and sunset with multiplicative noise.
#[derive(Debug, Clone)]
pub struct PvProfile {
    pub peak_kw: f64,
    pub noise_std: f64,
    steps_per_day: usize,
    sunrise_idx: usize,
    sunset_idx: usize,
    rng: StdRng,
}

impl PvProfile {
    /// Creates a PV generator.
    ///
    /// # Panics
    ///
    /// Panics if `sunrise_idx >= sunset_idx` or `sunset_idx > steps_per_day`.
    pub fn new(
        peak_kw: f64,
        sunrise_idx: usize,
        sunset_idx: usize,
        noise_std: f64,
        steps_per_day: usize,
        seed: u64,
    ) -> Self {
        assert!(sunrise_idx < sunset_idx && sunset_idx <= steps_per_day);
        Self {
            peak_kw: peak_kw.max(0.0),
            noise_std: noise_std.max(0.0),
            steps_per_day,
            sunrise_idx,
            sunset_idx,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Position in the daylight window mapped onto a half cosine; 0 at night.
    fn daylight_frac(&self, t: usize) -> f64 {
        let day_t = t % self.steps_per_day;
        if day_t < self.sunrise_idx || day_t >= self.sunset_idx {
            return 0.0;
        }
        let span = (self.sunset_idx - self.sunrise_idx) as f64;
        let x = (day_t - self.sunrise_idx) as f64 + 0.5;
        (std::f64::consts::PI * (x / span - 0.5)).cos().max(0.0)
    }

    /// Generation at `timestep`, never negative.
    pub fn output_kw(&mut self, timestep: usize) -> f64 {
        let frac = self.daylight_frac(timestep);
        if frac <= 0.0 {
            return 0.0;
        }
        let noise_mult = 1.0 + gaussian_noise(&mut self.rng, self.noise_std);
        (self.peak_kw * frac * noise_mult).max(0.0)
    }
}

/// Generates a complete exogenous series for a scenario.
///
/// Grid signals are attached when `grid.enabled`; an outage window, if
/// configured, sets the status to down for its steps.
///
/// # Arguments
///
/// * `profile` - Load and PV shape
/// * `grid` - Grid prices, carbon intensity and outage window
/// * `dt_hours` - Step duration
/// * `seed` - Master seed
pub fn synthesize(
    profile: &ProfileConfig,
    grid: &GridConfig,
    dt_hours: f64,
    seed: u64,
) -> ExogenousSeries {
    let steps_per_day = ((24.0 / dt_hours).round() as usize).max(1);
    let len = steps_per_day * profile.days;

    let mut load = LoadProfile::new(
        profile.load_base_kw,
        profile.load_amp_kw,
        profile.load_phase_rad,
        profile.load_noise_std,
        steps_per_day,
        seed,
    );
    let sunrise_idx = ((profile.sunrise_hour / dt_hours).floor() as usize).min(steps_per_day - 1);
    let sunset_idx = ((profile.sunset_hour / dt_hours).ceil() as usize)
        .clamp(sunrise_idx + 1, steps_per_day);
    let mut pv = PvProfile::new(
        profile.pv_peak_kw,
        sunrise_idx,
        sunset_idx,
        profile.pv_noise_std,
        steps_per_day,
        seed.wrapping_add(PV_SEED_OFFSET),
    );

    let load_kw = (0..len).map(|t| load.demand_kw(t)).collect();
    let pv_kw = (0..len).map(|t| pv.output_kw(t)).collect();
    let series = ExogenousSeries::new(load_kw, pv_kw);
    if !grid.enabled {
        return series;
    }

    let mut signals =
        GridSeries::constant(len, grid.price_import, grid.price_export, grid.co2_per_kwh);
    if let Some(start) = grid.outage_start {
        let end = start.saturating_add(grid.outage_steps).min(len);
        for status in signals.status.iter_mut().take(end).skip(start) {
            *status = false;
        }
    }
    series.with_grid(signals)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gaussian_noise_zero_std() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(gaussian_noise(&mut rng, 0.0), 0.0);
    }

    #[test]
    fn load_is_deterministic_for_a_seed() {
        let mut a = LoadProfile::new(40.0, 15.0, 1.0, 2.0, 96, 7);
        let mut b = LoadProfile::new(40.0, 15.0, 1.0, 2.0, 96, 7);
        for t in 0..96 {
            assert_eq!(a.demand_kw(t), b.demand_kw(t));
        }
    }

    #[test]
    fn load_never_negative() {
        let mut load = LoadProfile::new(0.5, 5.0, 0.0, 1.0, 24, 3);
        assert!((0..240).all(|t| load.demand_kw(t) >= 0.0));
    }

    #[test]
    fn pv_zero_at_night_and_peaks_midday() {
        let mut pv = PvProfile::new(10.0, 6, 18, 0.0, 24, 0);
        assert_eq!(pv.output_kw(0), 0.0);
        assert_eq!(pv.output_kw(5), 0.0);
        assert_eq!(pv.output_kw(18), 0.0);
        let noon = pv.output_kw(12);
        let morning = pv.output_kw(7);
        assert!(noon > morning);
        assert!(noon <= 10.0);
    }

    #[test]
    fn synthesize_sizes_series_and_grid() {
        let profile = ProfileConfig {
            days: 2,
            ..ProfileConfig::default()
        };
        let series = synthesize(&profile, &GridConfig::default(), 0.25, 42);
        assert_eq!(series.len(), 192);
        assert!(series.has_grid());
        assert!(series.pv_kw.iter().any(|&kw| kw > 0.0));
    }

    #[test]
    fn synthesize_applies_outage_window() {
        let grid = GridConfig {
            outage_start: Some(10),
            outage_steps: 4,
            ..GridConfig::default()
        };
        let series = synthesize(&ProfileConfig::default(), &grid, 1.0, 42);
        let status = &series.grid.as_ref().unwrap().status;
        assert!(status[9]);
        assert!(status[10..14].iter().all(|&up| !up));
        assert!(status[14]);
    }

    #[test]
    fn synthesize_without_grid() {
        let grid = GridConfig {
            enabled: false,
            ..GridConfig::default()
        };
        let series = synthesize(&ProfileConfig::default(), &grid, 1.0, 42);
        assert!(!series.has_grid());
        assert_eq!(series.len(), 24);
    }
}
