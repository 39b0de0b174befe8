// Units - Typed angles and length scales
// Keeps degree-based and radian-based element sets from being mixed by accident

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Days per Julian year
pub const DAYS_PER_YEAR: f64 = 365.25;

// =============================================================================
// ANGLES
// =============================================================================

/// An angle expressed in degrees.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct Degrees(pub f64);

/// An angle expressed in radians.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct Radians(pub f64);

/// Common behaviour of the two angle representations.
///
/// Element sets are generic over this trait so the scan path (degrees) and
/// the integration path (radians) are distinct types at compile time.
pub trait AngleUnit: Copy + std::fmt::Debug + Send + Sync + 'static {
    /// Short unit label used in log and error messages.
    const LABEL: &'static str;

    fn from_radians(value: f64) -> Self;
    fn to_radians(self) -> f64;
    fn value(self) -> f64;
}

impl AngleUnit for Degrees {
    const LABEL: &'static str = "deg";

    fn from_radians(value: f64) -> Self {
        Degrees(value * 180.0 / PI)
    }

    fn to_radians(self) -> f64 {
        self.0 * PI / 180.0
    }

    fn value(self) -> f64 {
        self.0
    }
}

impl AngleUnit for Radians {
    const LABEL: &'static str = "rad";

    fn from_radians(value: f64) -> Self {
        Radians(value)
    }

    fn to_radians(self) -> f64 {
        self.0
    }

    fn value(self) -> f64 {
        self.0
    }
}

impl Degrees {
    /// Wrap into [0, 360).
    pub fn normalized(self) -> Self {
        Degrees(self.0.rem_euclid(360.0))
    }
}

impl Radians {
    pub fn normalized(self) -> Self {
        Radians(self.0.rem_euclid(2.0 * PI))
    }
}

impl From<Degrees> for Radians {
    fn from(d: Degrees) -> Self {
        Radians(d.to_radians())
    }
}

impl From<Radians> for Degrees {
    fn from(r: Radians) -> Self {
        Degrees::from_radians(r.0)
    }
}

// =============================================================================
// ASTRONOMICAL UNIT SCALE
// =============================================================================

/// Kilometres per astronomical unit.
///
/// The scan path historically reported distances with the rounded legacy
/// constant while the integration path used the IAU 2012 definition; both
/// are kept selectable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuScale {
    /// 1 AU = 149 597 870.7 km
    #[default]
    Iau2012,
    /// 1 AU = 1.496e8 km
    Legacy,
}

impl AuScale {
    pub fn km_per_au(self) -> f64 {
        match self {
            AuScale::Iau2012 => 149_597_870.7,
            AuScale::Legacy => 1.496e8,
        }
    }

    pub fn au_to_km(self, au: f64) -> f64 {
        au * self.km_per_au()
    }

    pub fn km_to_au(self, km: f64) -> f64 {
        km / self.km_per_au()
    }

    /// Parse the short names used in environment configuration.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "iau" | "iau2012" => Some(AuScale::Iau2012),
            "legacy" => Some(AuScale::Legacy),
            _ => None,
        }
    }
}
