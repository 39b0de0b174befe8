// Trajectory Integrator - Sun + Earth perturbation, adaptive Dormand-Prince 5(4)
// State is (position, velocity) in AU and AU/year; time in Julian years.

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use crate::detector::{ClosestApproachDetector, ClosestApproachRecord, Sample};
use crate::ephemeris::{EarthEphemeris, EccentricEarth};
use crate::error::{ImpactError, Result};
use crate::physics_engine::{
    KeplerMethod, OrbitalElements, StateVector, Vector3, EARTH_MASS_RATIO, MU_SUN, R_EARTH_KM,
    SOFTENING,
};
use crate::units::{AuScale, Radians, DAYS_PER_YEAR};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IntegratorSettings {
    /// Length of the integration window (years)
    pub total_time_years: f64,
    /// Number of evenly spaced output samples, endpoints included
    pub sample_count: usize,
    /// Largest `sample_count` a single request may ask for
    pub max_samples: usize,
    pub mu: f64,
    /// Scale of Earth's pull relative to the Sun's
    pub earth_mass_ratio: f64,
    pub softening: f64,
    pub rtol: f64,
    pub atol: f64,
    pub initial_step_years: f64,
    pub min_step_years: f64,
    /// Step attempts (accepted or rejected) allowed between two output samples
    pub max_steps_per_sample: usize,
    /// Wall-clock limit for a whole integration
    pub time_budget: Option<Duration>,
    pub kepler: KeplerMethod,
    pub au_scale: AuScale,
}

impl Default for IntegratorSettings {
    fn default() -> Self {
        Self {
            total_time_years: 4.0,
            sample_count: 2000,
            max_samples: 1_000_000,
            mu: MU_SUN,
            earth_mass_ratio: EARTH_MASS_RATIO,
            softening: SOFTENING,
            rtol: 1.0e-9,
            atol: 1.0e-12,
            initial_step_years: 1.0e-3,
            min_step_years: 1.0e-12,
            max_steps_per_sample: 5000,
            time_budget: None,
            kepler: KeplerMethod::FixedPoint,
            au_scale: AuScale::Iau2012,
        }
    }
}

/// Starting point of an integration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InitialCondition {
    Elements(OrbitalElements<Radians>),
    State(StateVector),
}

impl From<OrbitalElements<Radians>> for InitialCondition {
    fn from(elements: OrbitalElements<Radians>) -> Self {
        InitialCondition::Elements(elements)
    }
}

impl From<StateVector> for InitialCondition {
    fn from(state: StateVector) -> Self {
        InitialCondition::State(state)
    }
}

/// Sampled trajectories up to the end of the window or the first collision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationResult {
    pub asteroid_positions: Vec<Vector3>,
    pub earth_positions: Vec<Vector3>,
    pub times_years: Vec<f64>,
    pub closest_approach: ClosestApproachRecord,
}

impl SimulationResult {
    pub fn len(&self) -> usize {
        self.times_years.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times_years.is_empty()
    }
}

pub struct TrajectoryIntegrator<E = EccentricEarth> {
    settings: IntegratorSettings,
    earth: E,
    collision_radius_au: f64,
    epoch: DateTime<Utc>,
}

impl TrajectoryIntegrator<EccentricEarth> {
    pub fn new(settings: IntegratorSettings, epoch: DateTime<Utc>) -> Self {
        Self::with_earth(settings, EccentricEarth::default(), R_EARTH_KM, epoch)
    }
}

impl<E: EarthEphemeris> TrajectoryIntegrator<E> {
    pub fn with_earth(
        settings: IntegratorSettings,
        earth: E,
        earth_radius_km: f64,
        epoch: DateTime<Utc>,
    ) -> Self {
        let collision_radius_au = settings.au_scale.km_to_au(earth_radius_km);
        Self {
            settings,
            earth,
            collision_radius_au,
            epoch,
        }
    }

    pub fn settings(&self) -> &IntegratorSettings {
        &self.settings
    }

    pub fn collision_radius_au(&self) -> f64 {
        self.collision_radius_au
    }

    /// Integrate from `initial` over the configured window.
    ///
    /// Sampling stops at the first sample closer to Earth than the collision
    /// radius; that sample is the last one in every returned series.
    pub fn integrate(&self, initial: &InitialCondition) -> Result<SimulationResult> {
        self.validate_settings()?;
        let state = self.initial_state(initial)?;

        let n = self.settings.sample_count;
        let total = self.settings.total_time_years;

        debug!(
            "integrate: r0={:.6} AU, {} samples over {} years",
            state.position.magnitude(),
            n,
            total
        );

        let mut asteroid_positions = Vec::new();
        let mut earth_positions = Vec::new();
        let mut times_years = Vec::new();

        let radius = self.collision_radius_au;
        let samples = TrajectorySamples::new(self, state).inspect(|sample| {
            if let Ok(s) = sample {
                asteroid_positions.push(s.payload.0);
                earth_positions.push(s.payload.1);
                times_years.push(s.time);
            }
        });

        let approach = ClosestApproachDetector::new(|d| d < radius)
            .run(samples)?
            .ok_or_else(|| ImpactError::simulation("integration produced no samples"))?;

        let closest_approach = ClosestApproachRecord::new(
            approach.distance,
            approach.time * DAYS_PER_YEAR,
            approach.crossed.then_some(&approach.payload.0),
            self.epoch,
            self.settings.au_scale,
        );

        if closest_approach.impact {
            info!(
                "integrate: collision at t={:.4} years ({:?})",
                approach.time, closest_approach.impact_date
            );
        } else {
            debug!(
                "integrate: closest approach {:.6} AU at t={:.4} years",
                approach.distance, approach.time
            );
        }

        Ok(SimulationResult {
            asteroid_positions,
            earth_positions,
            times_years,
            closest_approach,
        })
    }

    fn validate_settings(&self) -> Result<()> {
        let s = &self.settings;
        if s.sample_count < 2 {
            return Err(ImpactError::parameter(
                "sample_count",
                format!("need at least 2 samples, got {}", s.sample_count),
            ));
        }
        if s.sample_count > s.max_samples {
            return Err(ImpactError::parameter(
                "sample_count",
                format!("{} samples exceed the budget of {}", s.sample_count, s.max_samples),
            ));
        }
        if !s.total_time_years.is_finite() || s.total_time_years <= 0.0 {
            return Err(ImpactError::parameter(
                "total_time_years",
                format!("must be positive, got {}", s.total_time_years),
            ));
        }
        if !(s.initial_step_years > 0.0 && s.min_step_years > 0.0) {
            return Err(ImpactError::parameter("initial_step_years", "step sizes must be positive"));
        }
        if !(s.rtol > 0.0 || s.atol > 0.0) {
            return Err(ImpactError::parameter("rtol", "at least one tolerance must be positive"));
        }
        Ok(())
    }

    fn initial_state(&self, initial: &InitialCondition) -> Result<StateVector> {
        match initial {
            InitialCondition::Elements(elements) => {
                elements.to_state_vector(self.settings.mu, self.settings.kepler)
            }
            InitialCondition::State(state) if state.is_finite() => Ok(*state),
            InitialCondition::State(_) => {
                Err(ImpactError::simulation("initial state contains non-finite components"))
            }
        }
    }

    /// Time derivative of `[r, v]`.
    fn derivative(&self, t: f64, y: &[f64; 6]) -> [f64; 6] {
        let mu = self.settings.mu;
        let eps = self.settings.softening;

        let r = Vector3::new(y[0], y[1], y[2]);
        let rel = r.sub(&self.earth.position(t));

        let sun = r.scale(-mu / (r.magnitude().powi(3) + eps));
        let earth = rel.scale(-mu * self.settings.earth_mass_ratio / (rel.magnitude().powi(3) + eps));
        let a = sun.add(&earth);

        [y[3], y[4], y[5], a.x, a.y, a.z]
    }

    /// One Dormand-Prince trial step: fifth-order solution and scaled RMS error.
    fn dormand_prince_step(&self, t: f64, y: &[f64; 6], h: f64) -> ([f64; 6], f64) {
        let mut k = [[0.0; 6]; 7];
        k[0] = self.derivative(t, y);

        let mut y_next = *y;
        for s in 1..7 {
            let mut stage = *y;
            for (j, kj) in k.iter().enumerate().take(s) {
                for (out, slope) in stage.iter_mut().zip(kj) {
                    *out += h * DP_A[s][j] * slope;
                }
            }
            k[s] = self.derivative(t + DP_C[s] * h, &stage);
            // Row 7 of the tableau holds the fifth-order weights, so the last stage is y(t + h)
            if s == 6 {
                y_next = stage;
            }
        }

        let mut sum_sq = 0.0;
        for d in 0..6 {
            let err: f64 = h * (0..7).map(|j| DP_E[j] * k[j][d]).sum::<f64>();
            let scale = self.settings.atol + self.settings.rtol * y[d].abs().max(y_next[d].abs());
            sum_sq += (err / scale).powi(2);
        }
        (y_next, (sum_sq / 6.0).sqrt())
    }
}

// =============================================================================
// DORMAND-PRINCE 5(4) TABLEAU
// =============================================================================

const DP_C: [f64; 7] = [0.0, 1.0 / 5.0, 3.0 / 10.0, 4.0 / 5.0, 8.0 / 9.0, 1.0, 1.0];

const DP_A: [[f64; 6]; 7] = [
    [0.0; 6],
    [1.0 / 5.0, 0.0, 0.0, 0.0, 0.0, 0.0],
    [3.0 / 40.0, 9.0 / 40.0, 0.0, 0.0, 0.0, 0.0],
    [44.0 / 45.0, -56.0 / 15.0, 32.0 / 9.0, 0.0, 0.0, 0.0],
    [19372.0 / 6561.0, -25360.0 / 2187.0, 64448.0 / 6561.0, -212.0 / 729.0, 0.0, 0.0],
    [9017.0 / 3168.0, -355.0 / 33.0, 46732.0 / 5247.0, 49.0 / 176.0, -5103.0 / 18656.0, 0.0],
    [35.0 / 384.0, 0.0, 500.0 / 1113.0, 125.0 / 192.0, -2187.0 / 6784.0, 11.0 / 84.0],
];

/// Fifth-order minus fourth-order weights
const DP_E: [f64; 7] = [
    71.0 / 57600.0,
    0.0,
    -71.0 / 16695.0,
    71.0 / 1920.0,
    -17253.0 / 339200.0,
    22.0 / 525.0,
    -1.0 / 40.0,
];

const SAFETY: f64 = 0.9;
const MIN_FACTOR: f64 = 0.2;
const MAX_FACTOR: f64 = 5.0;

// =============================================================================
// LAZY SAMPLE STREAM
// =============================================================================

/// Integrates forward on demand, yielding one sample per grid time.
/// Fuses after the first error.
struct TrajectorySamples<'a, E> {
    integrator: &'a TrajectoryIntegrator<E>,
    index: usize,
    t: f64,
    y: [f64; 6],
    h: f64,
    started: Instant,
    failed: bool,
}

impl<'a, E: EarthEphemeris> TrajectorySamples<'a, E> {
    fn new(integrator: &'a TrajectoryIntegrator<E>, state: StateVector) -> Self {
        let p = state.position;
        let v = state.velocity;
        Self {
            integrator,
            index: 0,
            t: 0.0,
            y: [p.x, p.y, p.z, v.x, v.y, v.z],
            h: integrator.settings.initial_step_years,
            started: Instant::now(),
            failed: false,
        }
    }

    fn advance_to(&mut self, target: f64) -> Result<()> {
        let settings = &self.integrator.settings;
        let mut attempts = 0usize;

        while self.t < target {
            if attempts >= settings.max_steps_per_sample {
                return Err(ImpactError::simulation(format!(
                    "step budget of {} exhausted before t={target:.6} years (reached t={:.6})",
                    settings.max_steps_per_sample, self.t
                )));
            }
            if let Some(budget) = settings.time_budget {
                if self.started.elapsed() >= budget {
                    return Err(ImpactError::simulation(format!(
                        "time budget of {budget:?} exhausted at t={:.6} years",
                        self.t
                    )));
                }
            }
            attempts += 1;

            let remaining = target - self.t;
            let lands = self.h >= remaining;
            let h = if lands { remaining } else { self.h };

            let (y_next, err) = self.integrator.dormand_prince_step(self.t, &self.y, h);
            if !err.is_finite() || y_next.iter().any(|c| !c.is_finite()) {
                return Err(ImpactError::simulation(format!(
                    "non-finite state near t={:.6} years",
                    self.t
                )));
            }

            let factor = if err == 0.0 {
                MAX_FACTOR
            } else {
                (SAFETY * err.powf(-0.2)).clamp(MIN_FACTOR, MAX_FACTOR)
            };

            if err <= 1.0 {
                self.t = if lands { target } else { (self.t + h).min(target) };
                self.y = y_next;
                // A shortened landing step says nothing about the natural step size
                if !lands {
                    self.h = h * factor;
                }
            } else {
                let shrunk = h * factor;
                if shrunk < settings.min_step_years {
                    return Err(ImpactError::simulation(format!(
                        "step size {shrunk:e} years fell below the minimum {:e} at t={:.6}",
                        settings.min_step_years, self.t
                    )));
                }
                self.h = shrunk;
            }
        }
        Ok(())
    }

    /// `t_k = T·k/(n−1)`, `None` past the last sample.
    fn grid_time(&self, k: usize) -> Option<f64> {
        let settings = &self.integrator.settings;
        let n = settings.sample_count;
        (k < n).then(|| settings.total_time_years * k as f64 / (n - 1) as f64)
    }

    fn current_sample(&self) -> Sample<(Vector3, Vector3)> {
        let asteroid = Vector3::new(self.y[0], self.y[1], self.y[2]);
        let earth = self.integrator.earth.position(self.t);
        Sample::new(self.t, asteroid.distance_to(&earth), (asteroid, earth))
    }
}

impl<E: EarthEphemeris> Iterator for TrajectorySamples<'_, E> {
    type Item = Result<Sample<(Vector3, Vector3)>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let target = self.grid_time(self.index)?;
        self.index += 1;

        match self.advance_to(target) {
            Ok(()) => Some(Ok(self.current_sample())),
            Err(e) => {
                warn!("integrate: {e}");
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

/// Integrate with default settings (eccentric-radius Earth, IAU AU) from now.
pub fn integrate_trajectory(
    initial: impl Into<InitialCondition>,
    total_time_years: f64,
    sample_count: usize,
) -> Result<SimulationResult> {
    let settings = IntegratorSettings {
        total_time_years,
        sample_count,
        ..IntegratorSettings::default()
    };
    TrajectoryIntegrator::new(settings, Utc::now()).integrate(&initial.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::{NaiveDate, TimeZone};
    use std::f64::consts::PI;

    fn epoch() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 10, 4, 12, 0, 0).unwrap()
    }

    fn rad(a: f64, e: f64, i: f64, node: f64, peri: f64, m: f64) -> OrbitalElements<Radians> {
        OrbitalElements::new(a, e, Radians(i), Radians(node), Radians(peri), Radians(m))
    }

    #[test]
    fn test_earth_elements_collide_immediately() {
        let earth = EccentricEarth::default();
        let integrator = TrajectoryIntegrator::new(IntegratorSettings::default(), epoch());
        let result = integrator.integrate(&earth.elements().into()).unwrap();

        let record = &result.closest_approach;
        assert!(record.impact);
        assert_eq!(record.time_days, 0.0);
        assert!(record.distance_km < 1e-6);
        assert_eq!(record.impact_date, NaiveDate::from_ymd_opt(2025, 10, 4));
        assert_eq!(result.len(), 1);
        assert_eq!(result.asteroid_positions.len(), 1);
        assert_eq!(result.earth_positions.len(), 1);
    }

    #[test]
    fn test_distant_asteroid_runs_full_window() {
        let result = integrate_trajectory(rad(3.0, 0.1, 0.2, 1.0, 0.5, 0.3), 4.0, 2000).unwrap();

        assert!(!result.closest_approach.impact);
        assert!(result.closest_approach.impact_site.is_none());
        assert!(result.closest_approach.distance_au > 1.5);
        assert_eq!(result.asteroid_positions.len(), 2000);
        assert_eq!(result.earth_positions.len(), 2000);
        assert_eq!(result.times_years.len(), 2000);
        assert_eq!(result.times_years[0], 0.0);
        assert_eq!(*result.times_years.last().unwrap(), 4.0);
    }

    #[test]
    fn test_two_body_orbit_returns_after_one_period() {
        let a: f64 = 2.0;
        let e = 0.3;
        let settings = IntegratorSettings {
            earth_mass_ratio: 0.0,
            total_time_years: a.powf(1.5),
            sample_count: 200,
            ..IntegratorSettings::default()
        };
        let result = TrajectoryIntegrator::new(settings, epoch())
            .integrate(&rad(a, e, 0.1, 0.4, 1.3, 0.0).into())
            .unwrap();

        let first = result.asteroid_positions[0];
        let last = *result.asteroid_positions.last().unwrap();
        assert!(first.distance_to(&last) < 1e-5, "drift {}", first.distance_to(&last));

        for p in &result.asteroid_positions {
            let r = p.magnitude();
            assert!(r >= a * (1.0 - e) - 1e-6 && r <= a * (1.0 + e) + 1e-6, "r={r}");
        }
    }

    #[test]
    fn test_state_and_elements_start_identically() {
        let elements = rad(1.5, 0.2, 0.05, 2.0, 0.7, PI / 3.0);
        let state = elements
            .to_state_vector(MU_SUN, KeplerMethod::FixedPoint)
            .unwrap();

        let from_elements = integrate_trajectory(elements, 0.5, 20).unwrap();
        let from_state = integrate_trajectory(state, 0.5, 20).unwrap();
        for (p, q) in from_elements
            .asteroid_positions
            .iter()
            .zip(&from_state.asteroid_positions)
        {
            assert_relative_eq!(p.distance_to(q), 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_earth_series_follows_model() {
        let result = integrate_trajectory(rad(2.5, 0.1, 0.0, 0.0, 0.0, 1.0), 1.0, 5).unwrap();
        let model = EccentricEarth::default();
        for (t, p) in result.times_years.iter().zip(&result.earth_positions) {
            assert_eq!(*p, model.position(*t));
        }
        assert_eq!(result.times_years, vec![0.0, 0.25, 0.5, 0.75, 1.0]);
    }

    #[test]
    fn test_step_budget_exhaustion_is_failure() {
        let settings = IntegratorSettings {
            max_steps_per_sample: 1,
            ..IntegratorSettings::default()
        };
        let err = TrajectoryIntegrator::new(settings, epoch())
            .integrate(&rad(3.0, 0.1, 0.0, 0.0, 0.0, 0.0).into())
            .unwrap_err();
        assert!(matches!(err, ImpactError::SimulationFailure { .. }));
    }

    #[test]
    fn test_time_budget_exhaustion_is_failure() {
        let settings = IntegratorSettings {
            time_budget: Some(Duration::ZERO),
            ..IntegratorSettings::default()
        };
        let err = TrajectoryIntegrator::new(settings, epoch())
            .integrate(&rad(3.0, 0.1, 0.0, 0.0, 0.0, 0.0).into())
            .unwrap_err();
        assert_eq!(err.kind(), "simulation_failure");
    }

    #[test]
    fn test_invalid_parameters_rejected() {
        let elements = rad(2.0, 0.1, 0.0, 0.0, 0.0, 0.0);
        assert!(matches!(
            integrate_trajectory(elements, 4.0, 1),
            Err(ImpactError::InvalidParameter { name: "sample_count", .. })
        ));
        assert!(matches!(
            integrate_trajectory(elements, 0.0, 100),
            Err(ImpactError::InvalidParameter { name: "total_time_years", .. })
        ));
        assert!(matches!(
            integrate_trajectory(rad(2.0, 1.5, 0.0, 0.0, 0.0, 0.0), 1.0, 10),
            Err(ImpactError::InvalidElements { .. })
        ));

        let nan_state = StateVector::new(Vector3::new(f64::NAN, 0.0, 0.0), Vector3::zero());
        assert!(matches!(
            integrate_trajectory(nan_state, 1.0, 10),
            Err(ImpactError::SimulationFailure { .. })
        ));
    }

    #[test]
    fn test_oversized_sample_count_rejected() {
        let elements = rad(2.0, 0.1, 0.0, 0.0, 0.0, 0.0);
        assert!(matches!(
            integrate_trajectory(elements, 1.0, usize::MAX),
            Err(ImpactError::InvalidParameter { name: "sample_count", .. })
        ));

        let settings = IntegratorSettings {
            sample_count: 101,
            max_samples: 100,
            ..IntegratorSettings::default()
        };
        let err = TrajectoryIntegrator::new(settings, epoch())
            .integrate(&elements.into())
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_parameter");
    }

    #[test]
    fn test_collision_radius_follows_au_scale() {
        let iau = TrajectoryIntegrator::new(IntegratorSettings::default(), epoch());
        assert_relative_eq!(iau.collision_radius_au(), 6371.0 / 149_597_870.7);

        let legacy = TrajectoryIntegrator::new(
            IntegratorSettings {
                au_scale: AuScale::Legacy,
                ..IntegratorSettings::default()
            },
            epoch(),
        );
        assert_relative_eq!(legacy.collision_radius_au(), 6371.0 / 1.496e8);
    }
}
