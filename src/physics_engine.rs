// Physics Engine - Orbital Mechanics Core
// Implements Kepler's equation, element-to-position and element-to-state conversion

use log::debug;
use serde::{Deserialize, Serialize};
use std::f64::consts::{PI, TAU};

use crate::error::{ImpactError, Result};
use crate::units::{AngleUnit, Degrees, Radians};

// =============================================================================
// PHYSICAL CONSTANTS (AU / year / solar-mass units)
// =============================================================================

/// Sun's gravitational parameter μ = 4π² (AU³ / (M_sun · year²))
pub const MU_SUN: f64 = 4.0 * PI * PI;

/// Gravitational constant (m³/(kg·s²))
pub const G: f64 = 6.67430e-11;

/// Earth's mean radius (km)
pub const R_EARTH_KM: f64 = 6371.0;

/// Earth/Sun mass ratio used to scale the Earth perturbation term
pub const EARTH_MASS_RATIO: f64 = 3.0e-6;

/// Regularization added to |r|³ so coincident positions never divide by zero
pub const SOFTENING: f64 = 1.0e-10;

/// Residual tolerance for both Kepler solvers (radians)
pub const KEPLER_TOLERANCE: f64 = 1.0e-12;

/// Eccentricities closer than this to 1 are treated as numerically parabolic
const PARABOLIC_MARGIN: f64 = 1.0e-12;

/// Below this Newton-Raphson derivative the solver bisects instead
const DERIVATIVE_FLOOR: f64 = 1.0e-12;

const NEWTON_MAX_ITERATIONS: usize = 100;
const FIXED_POINT_MAX_ITERATIONS: usize = 1000;

// =============================================================================
// 3D VECTOR MATHEMATICS
// =============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn zero() -> Self {
        Self::default()
    }

    pub fn magnitude(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    pub fn dot(&self, other: &Vector3) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn cross(&self, other: &Vector3) -> Vector3 {
        Vector3 {
            x: self.y * other.z - self.z * other.y,
            y: self.z * other.x - self.x * other.z,
            z: self.x * other.y - self.y * other.x,
        }
    }

    pub fn scale(&self, s: f64) -> Self {
        Self {
            x: self.x * s,
            y: self.y * s,
            z: self.z * s,
        }
    }

    pub fn add(&self, other: &Vector3) -> Vector3 {
        Vector3 {
            x: self.x + other.x,
            y: self.y + other.y,
            z: self.z + other.z,
        }
    }

    pub fn sub(&self, other: &Vector3) -> Vector3 {
        Vector3 {
            x: self.x - other.x,
            y: self.y - other.y,
            z: self.z - other.z,
        }
    }

    /// Euclidean distance between two points
    pub fn distance_to(&self, other: &Vector3) -> f64 {
        self.sub(other).magnitude()
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    pub fn to_array(self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }

    pub fn from_array(v: [f64; 3]) -> Self {
        Self::new(v[0], v[1], v[2])
    }
}

// =============================================================================
// STATE VECTOR (Position + Velocity)
// =============================================================================

/// Heliocentric inertial state. Lengths in AU, velocity in AU/year.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct StateVector {
    pub position: Vector3,
    pub velocity: Vector3,
}

impl StateVector {
    pub fn new(position: Vector3, velocity: Vector3) -> Self {
        Self { position, velocity }
    }

    /// Position-only state (velocity left at zero)
    pub fn at_rest(position: Vector3) -> Self {
        Self {
            position,
            velocity: Vector3::zero(),
        }
    }

    /// Specific orbital energy v²/2 − μ/r
    pub fn specific_energy(&self, mu: f64) -> f64 {
        let v = self.velocity.magnitude();
        v * v / 2.0 - mu / self.position.magnitude()
    }

    /// Semi-major axis recovered through vis-viva
    pub fn semi_major_axis(&self, mu: f64) -> f64 {
        -mu / (2.0 * self.specific_energy(mu))
    }

    pub fn is_finite(&self) -> bool {
        self.position.is_finite() && self.velocity.is_finite()
    }
}

// =============================================================================
// KEPLERIAN ORBITAL ELEMENTS
// =============================================================================

/// Classical orbital elements with every angle in the unit `A`.
///
/// `OrbitalElements<Degrees>` feeds the ephemeris scan and
/// `OrbitalElements<Radians>` feeds the integrator; converting between
/// the two is always an explicit call.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct OrbitalElements<A> {
    /// Semi-major axis (AU)
    pub semi_major_axis: f64,
    /// Eccentricity, 0 <= e < 1
    pub eccentricity: f64,
    pub inclination: A,
    /// Longitude of ascending node Ω
    pub longitude_ascending_node: A,
    /// Argument of perihelion ω
    pub argument_perihelion: A,
    /// Mean anomaly at epoch
    pub mean_anomaly: A,
}

impl<A: AngleUnit> OrbitalElements<A> {
    pub fn new(
        semi_major_axis: f64,
        eccentricity: f64,
        inclination: A,
        longitude_ascending_node: A,
        argument_perihelion: A,
        mean_anomaly: A,
    ) -> Self {
        Self {
            semi_major_axis,
            eccentricity,
            inclination,
            longitude_ascending_node,
            argument_perihelion,
            mean_anomaly,
        }
    }

    /// Reject elements that cannot describe a bound elliptical orbit.
    pub fn validate(&self) -> Result<()> {
        let a = self.semi_major_axis;
        let e = self.eccentricity;

        if !a.is_finite() || a <= 0.0 {
            return Err(ImpactError::invalid_elements(format!(
                "semi-major axis must be positive, got {a}"
            )));
        }
        if !e.is_finite() || !(0.0..1.0).contains(&e) {
            return Err(ImpactError::invalid_elements(format!(
                "eccentricity must lie in [0, 1), got {e}"
            )));
        }

        let angles = [
            ("inclination", self.inclination),
            ("longitude of ascending node", self.longitude_ascending_node),
            ("argument of perihelion", self.argument_perihelion),
            ("mean anomaly", self.mean_anomaly),
        ];
        for (name, angle) in angles {
            if !angle.value().is_finite() {
                return Err(ImpactError::invalid_elements(format!(
                    "{name} is not finite ({} {})",
                    angle.value(),
                    A::LABEL
                )));
            }
        }
        Ok(())
    }

    /// Same orbit, different position along it.
    pub fn with_mean_anomaly(&self, mean_anomaly: A) -> Self {
        Self {
            mean_anomaly,
            ..*self
        }
    }

    pub fn to_radians(&self) -> OrbitalElements<Radians> {
        self.convert()
    }

    pub fn to_degrees(&self) -> OrbitalElements<Degrees> {
        self.convert()
    }

    fn convert<B: AngleUnit>(&self) -> OrbitalElements<B> {
        OrbitalElements {
            semi_major_axis: self.semi_major_axis,
            eccentricity: self.eccentricity,
            inclination: B::from_radians(self.inclination.to_radians()),
            longitude_ascending_node: B::from_radians(self.longitude_ascending_node.to_radians()),
            argument_perihelion: B::from_radians(self.argument_perihelion.to_radians()),
            mean_anomaly: B::from_radians(self.mean_anomaly.to_radians()),
        }
    }

    /// Heliocentric position (AU) via the direct 3-1-3 rotation formulas.
    pub fn position(&self, kepler: KeplerMethod) -> Result<Vector3> {
        self.validate()?;
        let a = self.semi_major_axis;
        let e = self.eccentricity;

        let eccentric_anomaly = kepler.solve(self.mean_anomaly.to_radians(), e)?;

        // Position in orbital plane (perifocal frame)
        let x_orb = a * (eccentric_anomaly.cos() - e);
        let y_orb = a * (1.0 - e * e).sqrt() * eccentric_anomaly.sin();

        let cos_omega = self.longitude_ascending_node.to_radians().cos();
        let sin_omega = self.longitude_ascending_node.to_radians().sin();
        let cos_w = self.argument_perihelion.to_radians().cos();
        let sin_w = self.argument_perihelion.to_radians().sin();
        let cos_i = self.inclination.to_radians().cos();
        let sin_i = self.inclination.to_radians().sin();

        let r11 = cos_omega * cos_w - sin_omega * sin_w * cos_i;
        let r12 = -cos_omega * sin_w - sin_omega * cos_w * cos_i;
        let r21 = sin_omega * cos_w + cos_omega * sin_w * cos_i;
        let r22 = -sin_omega * sin_w + cos_omega * cos_w * cos_i;
        let r31 = sin_w * sin_i;
        let r32 = cos_w * sin_i;

        let position = Vector3::new(
            r11 * x_orb + r12 * y_orb,
            r21 * x_orb + r22 * y_orb,
            r31 * x_orb + r32 * y_orb,
        );
        ensure_finite(position, "position-only element conversion")
    }

    /// Heliocentric position and velocity via the perifocal frame.
    ///
    /// `mu` fixes the velocity units: with `MU_SUN` lengths are AU and
    /// velocities AU/year.
    pub fn to_state_vector(&self, mu: f64, kepler: KeplerMethod) -> Result<StateVector> {
        self.validate()?;
        let a = self.semi_major_axis;
        let e = self.eccentricity;

        let eccentric_anomaly = kepler.solve(self.mean_anomaly.to_radians(), e)?;

        let true_anomaly = 2.0
            * ((1.0 + e).sqrt() * (eccentric_anomaly / 2.0).sin())
                .atan2((1.0 - e).sqrt() * (eccentric_anomaly / 2.0).cos());
        let r = a * (1.0 - e * eccentric_anomaly.cos());

        let cos_nu = true_anomaly.cos();
        let sin_nu = true_anomaly.sin();
        let perifocal_position = Vector3::new(r * cos_nu, r * sin_nu, 0.0);

        // √(μ/p), p = a(1 − e²) = h²/μ
        let sqrt_mu_p = (mu / (a * (1.0 - e * e))).sqrt();
        let perifocal_velocity = Vector3::new(-sqrt_mu_p * sin_nu, sqrt_mu_p * (e + cos_nu), 0.0);

        let rotation = Matrix3::rotation_z(self.longitude_ascending_node.to_radians())
            .mul(&Matrix3::rotation_x(self.inclination.to_radians()))
            .mul(&Matrix3::rotation_z(self.argument_perihelion.to_radians()));

        let position = ensure_finite(rotation.apply(&perifocal_position), "state-vector position")?;
        let velocity = ensure_finite(rotation.apply(&perifocal_velocity), "state-vector velocity")?;
        Ok(StateVector { position, velocity })
    }
}

fn ensure_finite(v: Vector3, context: &str) -> Result<Vector3> {
    if v.is_finite() {
        Ok(v)
    } else {
        Err(ImpactError::instability(format!("{context}: non-finite result")))
    }
}

// =============================================================================
// ROTATION MATRICES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix3(pub [[f64; 3]; 3]);

impl Matrix3 {
    pub fn rotation_z(angle: f64) -> Self {
        let (s, c) = angle.sin_cos();
        Matrix3([[c, -s, 0.0], [s, c, 0.0], [0.0, 0.0, 1.0]])
    }

    pub fn rotation_x(angle: f64) -> Self {
        let (s, c) = angle.sin_cos();
        Matrix3([[1.0, 0.0, 0.0], [0.0, c, -s], [0.0, s, c]])
    }

    pub fn mul(&self, other: &Matrix3) -> Matrix3 {
        let mut out = [[0.0; 3]; 3];
        for (row, out_row) in out.iter_mut().enumerate() {
            for (col, cell) in out_row.iter_mut().enumerate() {
                *cell = (0..3).map(|k| self.0[row][k] * other.0[k][col]).sum();
            }
        }
        Matrix3(out)
    }

    pub fn apply(&self, v: &Vector3) -> Vector3 {
        let m = &self.0;
        Vector3::new(
            m[0][0] * v.x + m[0][1] * v.y + m[0][2] * v.z,
            m[1][0] * v.x + m[1][1] * v.y + m[1][2] * v.z,
            m[2][0] * v.x + m[2][1] * v.y + m[2][2] * v.z,
        )
    }
}

// =============================================================================
// KEPLER'S EQUATION
// =============================================================================

/// Root-finding strategy for M = E − e·sin(E).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum KeplerMethod {
    /// E ← E − (E − e·sin E − M) / (1 − e·cos E), from E₀ = M + e·sin M,
    /// bisecting whenever a step leaves [M − e, M + e]
    #[default]
    NewtonRaphson,
    /// E ← M + e·sin E
    FixedPoint,
}

impl KeplerMethod {
    /// Solve for the eccentric anomaly (radians).
    ///
    /// Both strategies run a bounded loop with a step tolerance and report
    /// `NumericInstability` instead of returning an unconverged value. Fixed
    /// point hands over to Newton-Raphson when substitution is too slow.
    pub fn solve(self, mean_anomaly: f64, eccentricity: f64) -> Result<f64> {
        check_kepler_inputs(mean_anomaly, eccentricity)?;

        // Circular orbit: no anomaly correction
        if eccentricity == 0.0 {
            return Ok(mean_anomaly);
        }

        match self {
            KeplerMethod::NewtonRaphson => solve_newton_raphson(mean_anomaly, eccentricity),
            KeplerMethod::FixedPoint => solve_fixed_point(mean_anomaly, eccentricity),
        }
    }
}

fn check_kepler_inputs(mean_anomaly: f64, eccentricity: f64) -> Result<()> {
    if !eccentricity.is_finite() || !(0.0..1.0).contains(&eccentricity) {
        return Err(ImpactError::invalid_elements(format!(
            "eccentricity must lie in [0, 1), got {eccentricity}"
        )));
    }
    if 1.0 - eccentricity < PARABOLIC_MARGIN {
        return Err(ImpactError::instability(format!(
            "Kepler solver: eccentricity {eccentricity} is numerically parabolic"
        )));
    }
    if !mean_anomaly.is_finite() {
        return Err(ImpactError::instability(format!(
            "Kepler solver: mean anomaly {mean_anomaly} is not finite"
        )));
    }
    Ok(())
}

fn solve_newton_raphson(mean_anomaly: f64, eccentricity: f64) -> Result<f64> {
    // Solve on M in [0, 2π) and shift the root back by the same whole turns
    let m = mean_anomaly.rem_euclid(TAU);
    let e_anom = bracketed_newton(m, eccentricity, m + eccentricity * m.sin())?;
    Ok(e_anom + (mean_anomaly - m))
}

/// Newton-Raphson kept inside `[M − e, M + e]`, where the root always lies.
///
/// A Newton step that leaves the bracket, or that fails to halve the
/// previous step, is replaced by bisection.
fn bracketed_newton(m: f64, eccentricity: f64, guess: f64) -> Result<f64> {
    let mut lo = m - eccentricity;
    let mut hi = m + eccentricity;
    let mut e_anom = guess.clamp(lo, hi);
    let mut last_step = hi - lo;

    for _ in 0..NEWTON_MAX_ITERATIONS {
        let f = e_anom - eccentricity * e_anom.sin() - m;
        if f == 0.0 {
            return Ok(e_anom);
        }
        // f is increasing in E
        if f < 0.0 {
            lo = e_anom;
        } else {
            hi = e_anom;
        }

        let f_prime = 1.0 - eccentricity * e_anom.cos();
        let newton = e_anom - f / f_prime;
        let next = if f_prime > DERIVATIVE_FLOOR
            && newton > lo
            && newton < hi
            && (2.0 * f).abs() <= (last_step * f_prime).abs()
        {
            newton
        } else {
            0.5 * (lo + hi)
        };

        let step = (next - e_anom).abs();
        e_anom = next;
        last_step = step;
        if !e_anom.is_finite() {
            return Err(ImpactError::instability("Newton-Raphson produced a non-finite anomaly"));
        }
        if step < KEPLER_TOLERANCE || hi - lo < KEPLER_TOLERANCE {
            return Ok(e_anom);
        }
    }

    Err(ImpactError::instability(format!(
        "Newton-Raphson did not converge in {NEWTON_MAX_ITERATIONS} iterations (M = {m}, e = {eccentricity})"
    )))
}

fn solve_fixed_point(mean_anomaly: f64, eccentricity: f64) -> Result<f64> {
    let mut e_anom = mean_anomaly;

    for _ in 0..FIXED_POINT_MAX_ITERATIONS {
        let next = mean_anomaly + eccentricity * e_anom.sin();
        let step = (next - e_anom).abs();
        e_anom = next;
        if step < KEPLER_TOLERANCE {
            return Ok(e_anom);
        }
    }

    // Each pass contracts by e·|cos E|, which stalls near perihelion as e → 1
    debug!(
        "fixed-point iteration unconverged after {FIXED_POINT_MAX_ITERATIONS} passes (M = {mean_anomaly}, e = {eccentricity}), finishing with Newton-Raphson"
    );
    solve_newton_raphson(mean_anomaly, eccentricity)
}

// =============================================================================
// TESTS
// =============================================================================
