// Closest Approach Scanner - fixed-step analytic ephemeris scan
// Degrees in, distances out in AU and km. Fast, but an encounter shorter
// than one step can fall between samples.

use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::detector::{ClosestApproachDetector, ClosestApproachRecord, Sample};
use crate::ephemeris::{EarthEphemeris, PrecessingEarth};
use crate::error::{ImpactError, Result};
use crate::physics_engine::{KeplerMethod, OrbitalElements, Vector3};
use crate::units::{AuScale, Degrees, DAYS_PER_YEAR};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ScanConfig {
    /// Scan step (days)
    pub step_days: f64,
    /// Scan window (days)
    pub horizon_days: f64,
    /// Separation below which the approach counts as an impact (km)
    pub impact_threshold_km: f64,
    pub au_scale: AuScale,
    /// Upper bound on the number of scan steps a single request may take
    pub max_steps: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            step_days: 10.0,
            horizon_days: 365.0 * 100.0,
            impact_threshold_km: 150_000.0,
            au_scale: AuScale::Legacy,
            max_steps: 1_000_000,
        }
    }
}

pub struct ClosestApproachScanner<E = PrecessingEarth> {
    config: ScanConfig,
    earth: E,
    epoch: DateTime<Utc>,
    kepler: KeplerMethod,
}

impl ClosestApproachScanner<PrecessingEarth> {
    pub fn new(config: ScanConfig, epoch: DateTime<Utc>) -> Self {
        Self::with_earth(config, PrecessingEarth::default(), epoch)
    }
}

impl<E: EarthEphemeris> ClosestApproachScanner<E> {
    pub fn with_earth(config: ScanConfig, earth: E, epoch: DateTime<Utc>) -> Self {
        Self {
            config,
            earth,
            epoch,
            kepler: KeplerMethod::NewtonRaphson,
        }
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Scan with the configured step and horizon.
    pub fn scan_configured(&self, elements: &OrbitalElements<Degrees>) -> Result<ClosestApproachRecord> {
        self.scan(elements, self.config.step_days, self.config.horizon_days)
    }

    /// Step through `[0, horizon_days)` every `step_days` and report the
    /// closest approach, stopping at the first sample inside the impact
    /// threshold.
    pub fn scan(
        &self,
        elements: &OrbitalElements<Degrees>,
        step_days: f64,
        horizon_days: f64,
    ) -> Result<ClosestApproachRecord> {
        elements.validate()?;
        let steps = self.step_count(step_days, horizon_days)?;

        // Kepler's third law: P = a^1.5 years
        let mean_motion_per_day = 360.0 / (elements.semi_major_axis.powf(1.5) * DAYS_PER_YEAR);
        let m0 = elements.mean_anomaly.0;
        let threshold_au = self.config.au_scale.km_to_au(self.config.impact_threshold_km);

        debug!(
            "scan: a={} e={} steps={} step={}d threshold={}km",
            elements.semi_major_axis, elements.eccentricity, steps, step_days, self.config.impact_threshold_km
        );

        let samples = (0..steps).map(|k| -> Result<Sample<Vector3>> {
            let day = k as f64 * step_days;
            let earth = self.earth.position(day / DAYS_PER_YEAR);
            let mean_anomaly = Degrees((m0 + day * mean_motion_per_day).rem_euclid(360.0));
            let asteroid = elements.with_mean_anomaly(mean_anomaly).position(self.kepler)?;
            Ok(Sample::new(day, asteroid.distance_to(&earth), asteroid))
        });

        let approach = ClosestApproachDetector::new(|d| d < threshold_au)
            .run(samples)?
            .ok_or_else(|| ImpactError::parameter("horizon_days", "scan window produced no samples"))?;

        let record = ClosestApproachRecord::new(
            approach.distance,
            approach.time,
            approach.crossed.then_some(&approach.payload),
            self.epoch,
            self.config.au_scale,
        );

        if record.impact {
            info!(
                "scan: impact at day {} ({:?}), {:.2} km",
                record.time_days, record.impact_date, record.distance_km
            );
        } else {
            debug!(
                "scan: no impact in {} samples, closest {:.2} km at day {}",
                approach.samples_seen, record.distance_km, record.time_days
            );
        }
        Ok(record)
    }

    fn step_count(&self, step_days: f64, horizon_days: f64) -> Result<usize> {
        if !step_days.is_finite() || step_days <= 0.0 {
            return Err(ImpactError::parameter(
                "step_days",
                format!("must be a positive number of days, got {step_days}"),
            ));
        }
        if !horizon_days.is_finite() || horizon_days <= 0.0 {
            return Err(ImpactError::parameter(
                "horizon_days",
                format!("must be a positive number of days, got {horizon_days}"),
            ));
        }

        let steps = (horizon_days / step_days).ceil();
        if steps > self.config.max_steps as f64 {
            return Err(ImpactError::parameter(
                "step_days",
                format!(
                    "{steps} steps exceed the budget of {} for a {horizon_days}-day horizon",
                    self.config.max_steps
                ),
            ));
        }
        Ok(steps as usize)
    }
}

/// Scan with the default configuration (10-day legacy AU scale, 150 000 km threshold).
pub fn scan_closest_approach(
    elements: &OrbitalElements<Degrees>,
    step_days: f64,
    horizon_days: f64,
    epoch: DateTime<Utc>,
) -> Result<ClosestApproachRecord> {
    ClosestApproachScanner::new(ScanConfig::default(), epoch).scan(elements, step_days, horizon_days)
}
