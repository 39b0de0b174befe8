// Asteroid Catalog - name lookup of stored orbital elements and physical data

use log::debug;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::error::{ImpactError, Result};
use crate::physics_engine::{OrbitalElements, G};
use crate::units::Degrees;

/// One catalog row. Angles are degrees, `a` is AU.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CatalogEntry {
    pub full_name: String,
    pub a: f64,
    pub e: f64,
    pub i: f64,
    #[serde(alias = "om")]
    pub node: f64,
    #[serde(alias = "w")]
    pub peri: f64,
    #[serde(alias = "M", alias = "ma")]
    pub mean_anomaly: f64,
    #[serde(default, alias = "diameter")]
    pub diameter_km: Option<f64>,
    /// Gravitational parameter (km³/s²)
    #[serde(default, alias = "GM")]
    pub gm_km3_s2: Option<f64>,
}

/// Derived bulk properties; each is absent when its inputs are.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PhysicalProperties {
    pub mass_kg: Option<f64>,
    pub radius_km: Option<f64>,
    pub density_kg_m3: Option<f64>,
}

impl CatalogEntry {
    pub fn elements(&self) -> OrbitalElements<Degrees> {
        OrbitalElements::new(
            self.a,
            self.e,
            Degrees(self.i),
            Degrees(self.node),
            Degrees(self.peri),
            Degrees(self.mean_anomaly),
        )
    }

    pub fn physical_properties(&self) -> PhysicalProperties {
        // km³/s² -> m³/s² before dividing by G
        let mass_kg = self
            .gm_km3_s2
            .filter(|gm| *gm > 0.0)
            .map(|gm| gm * 1.0e9 / G);
        let radius_km = self.diameter_km.filter(|d| *d > 0.0).map(|d| d / 2.0);

        let density_kg_m3 = match (mass_kg, radius_km) {
            (Some(mass), Some(radius)) => {
                let radius_m = radius * 1000.0;
                let volume = (4.0 / 3.0) * PI * radius_m.powi(3);
                Some(mass / volume)
            }
            _ => None,
        };

        PhysicalProperties {
            mass_kg,
            radius_km,
            density_kg_m3,
        }
    }
}

/// Name lookup used by the impact service.
pub trait CatalogProvider: Send + Sync {
    /// Best match for `name`, if any.
    fn lookup(&self, name: &str) -> Option<CatalogEntry>;

    /// `lookup`, with a miss reported as `DataUnavailable`.
    fn require(&self, name: &str) -> Result<CatalogEntry> {
        self.lookup(name).ok_or_else(|| ImpactError::DataUnavailable {
            query: name.to_string(),
        })
    }
}

/// Catalog held in memory, matched by case-insensitive substring in
/// insertion order.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    entries: Vec<CatalogEntry>,
}

impl InMemoryCatalog {
    pub fn new(entries: Vec<CatalogEntry>) -> Self {
        Self { entries }
    }

    /// Parse a JSON array of entries.
    pub fn from_json(json: &str) -> Result<Self> {
        let entries: Vec<CatalogEntry> = serde_json::from_str(json).map_err(|e| ImpactError::Config {
            key: "catalog".to_string(),
            reason: e.to_string(),
        })?;
        debug!("catalog: loaded {} entries", entries.len());
        Ok(Self::new(entries))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn insert(&mut self, entry: CatalogEntry) {
        self.entries.push(entry);
    }
}

impl CatalogProvider for InMemoryCatalog {
    fn lookup(&self, name: &str) -> Option<CatalogEntry> {
        let query = name.trim().to_lowercase();
        if query.is_empty() {
            return None;
        }
        self.entries
            .iter()
            .find(|entry| entry.full_name.to_lowercase().contains(&query))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const CATALOG_JSON: &str = r#"[
        {"full_name": "     1 Ceres (A801 AA)", "a": 2.7691, "e": 0.0760, "i": 10.59,
         "om": 80.30, "w": 73.60, "ma": 77.37, "diameter": 939.4, "GM": 62.6284},
        {"full_name": "     4 Vesta (A807 FA)", "a": 2.3615, "e": 0.0887, "i": 7.14,
         "om": 103.81, "w": 151.20, "ma": 20.86, "diameter": 525.4, "GM": 17.288},
        {"full_name": "101955 Bennu (1999 RQ36)", "a": 1.1264, "e": 0.2037, "i": 6.03,
         "node": 2.06, "peri": 66.22, "mean_anomaly": 101.70}
    ]"#;

    fn catalog() -> InMemoryCatalog {
        InMemoryCatalog::from_json(CATALOG_JSON).unwrap()
    }

    #[test]
    fn test_lookup_case_insensitive_substring() {
        let catalog = catalog();
        assert_eq!(catalog.len(), 3);

        let entry = catalog.lookup("  BENNU ").unwrap();
        assert_eq!(entry.full_name, "101955 Bennu (1999 RQ36)");
        assert_eq!(entry.elements().mean_anomaly, Degrees(101.70));
        assert!(entry.gm_km3_s2.is_none());
    }

    #[test]
    fn test_first_match_wins() {
        // "(A8" occurs in both the Ceres and Vesta designations
        let entry = catalog().lookup("(A8").unwrap();
        assert!(entry.full_name.contains("Ceres"));
    }

    #[test]
    fn test_miss_is_data_unavailable() {
        let catalog = catalog();
        assert!(catalog.lookup("Apophis").is_none());
        assert!(catalog.lookup("   ").is_none());
        let err = catalog.require("Apophis").unwrap_err();
        assert_eq!(
            err,
            ImpactError::DataUnavailable {
                query: "Apophis".into()
            }
        );
    }

    #[test]
    fn test_physical_properties_from_gm_and_diameter() {
        let ceres = catalog().lookup("ceres").unwrap();
        let props = ceres.physical_properties();

        let mass = props.mass_kg.unwrap();
        assert_relative_eq!(mass, 62.6284e9 / G, max_relative = 1e-12);
        assert_relative_eq!(props.radius_km.unwrap(), 469.7);
        // Ceres bulk density is close to 2.16 g/cm³
        let density = props.density_kg_m3.unwrap();
        assert!((2000.0..2300.0).contains(&density), "density {density}");
    }

    #[test]
    fn test_missing_physical_data_stays_absent() {
        let bennu = catalog().lookup("bennu").unwrap();
        let props = bennu.physical_properties();
        assert!(props.mass_kg.is_none());
        assert!(props.radius_km.is_none());
        assert!(props.density_kg_m3.is_none());
    }

    #[test]
    fn test_malformed_json_is_config_error() {
        let err = InMemoryCatalog::from_json("{not json").unwrap_err();
        assert_eq!(err.kind(), "config");
    }
}
