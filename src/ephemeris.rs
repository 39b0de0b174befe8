// Earth Ephemeris - Analytic approximations of Earth's heliocentric position
// Two models are kept apart: the scan uses the precessing mean longitude,
// the integrator uses the eccentric-radius circle.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::physics_engine::{OrbitalElements, StateVector, Vector3};
use crate::units::Radians;

/// Earth's heliocentric position as a function of elapsed time (Julian years).
pub trait EarthEphemeris: Send + Sync {
    fn position(&self, t_years: f64) -> Vector3;

    fn sample(&self, t_years: f64) -> EphemerisSample {
        EphemerisSample {
            time: t_years,
            state: StateVector::at_rest(self.position(t_years)),
        }
    }

    /// Sample the model on every point of a time grid.
    fn ephemeris(&self, times_years: &[f64]) -> Vec<EphemerisSample> {
        times_years.iter().map(|&t| self.sample(t)).collect()
    }
}

/// A time offset paired with a state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct EphemerisSample {
    pub time: f64,
    pub state: StateVector,
}

// =============================================================================
// PRECESSING-ELEMENT MODEL (scan path)
// =============================================================================

/// Circular orbit of radius `a0` at mean longitude `L(t) = L0 + L̇·t`.
///
/// Defaults are the J2000 mean elements (JPL approximate planetary
/// positions), with the per-century longitude rate expressed per year.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PrecessingEarth {
    pub semi_major_axis_au: f64,
    pub mean_longitude_deg: f64,
    /// Defaults to the J2000 rate of 35999.37244981°/century as 359.9937244981°/year.
    /// Set 35999.37244981 to reproduce scans that applied the per-century value per year.
    pub mean_longitude_rate_deg_per_year: f64,
}

impl Default for PrecessingEarth {
    fn default() -> Self {
        Self {
            semi_major_axis_au: 1.000_002_61,
            mean_longitude_deg: 100.464_571_66,
            mean_longitude_rate_deg_per_year: 359.993_724_498_1,
        }
    }
}

impl PrecessingEarth {
    /// Mean longitude in degrees, wrapped into [0, 360)
    pub fn mean_longitude(&self, t_years: f64) -> f64 {
        (self.mean_longitude_deg + self.mean_longitude_rate_deg_per_year * t_years).rem_euclid(360.0)
    }
}

impl EarthEphemeris for PrecessingEarth {
    fn position(&self, t_years: f64) -> Vector3 {
        let angle = self.mean_longitude(t_years).to_radians();
        Vector3::new(
            self.semi_major_axis_au * angle.cos(),
            self.semi_major_axis_au * angle.sin(),
            0.0,
        )
    }
}

// =============================================================================
// ECCENTRIC-RADIUS MODEL (integration path)
// =============================================================================

/// `r(t) = a(1 − e·cos ωt)` on the direction `(cos ωt, sin ωt, 0)`, `ω = 2π/period`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct EccentricEarth {
    pub semi_major_axis_au: f64,
    pub eccentricity: f64,
    pub period_years: f64,
}

impl Default for EccentricEarth {
    fn default() -> Self {
        Self {
            semi_major_axis_au: 1.0,
            eccentricity: 0.0167,
            period_years: 1.0,
        }
    }
}

impl EccentricEarth {
    pub fn angular_rate(&self) -> f64 {
        2.0 * PI / self.period_years
    }

    /// Osculating elements matching this model at t = 0 (at perihelion).
    pub fn elements(&self) -> OrbitalElements<Radians> {
        OrbitalElements::new(
            self.semi_major_axis_au,
            self.eccentricity,
            Radians(0.0),
            Radians(0.0),
            Radians(0.0),
            Radians(0.0),
        )
    }
}

impl EarthEphemeris for EccentricEarth {
    fn position(&self, t_years: f64) -> Vector3 {
        let wt = self.angular_rate() * t_years;
        let r = self.semi_major_axis_au * (1.0 - self.eccentricity * wt.cos());
        Vector3::new(r * wt.cos(), r * wt.sin(), 0.0)
    }
}
