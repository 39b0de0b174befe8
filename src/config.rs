// Configuration - immutable process settings passed at construction
// Loaded from defaults, a `.env` file, and NEO_IMPACT_* environment variables

use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;

use crate::ephemeris::{EccentricEarth, PrecessingEarth};
use crate::error::{ImpactError, Result};
use crate::integrator::IntegratorSettings;
use crate::physics_engine::R_EARTH_KM;
use crate::scanner::ScanConfig;
use crate::units::AuScale;

const ENV_PREFIX: &str = "NEO_IMPACT_";

const NEOWS_BASE_URL: &str = "https://api.nasa.gov/neo/rest/v1";

/// Live feed client settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedConfig {
    #[serde(skip_serializing, default)]
    pub api_key: Option<String>,
    pub base_url: String,
    /// Stop after this many usable records
    pub max_records: usize,
    /// Widest accepted start/end date range
    pub max_range_days: i64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: NEOWS_BASE_URL.to_string(),
            max_records: 10,
            max_range_days: 7,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    pub scan: ScanConfig,
    pub integration: IntegratorSettings,
    pub precessing_earth: PrecessingEarth,
    pub eccentric_earth: EccentricEarth,
    pub earth_radius_km: EarthRadius,
    pub feed: FeedConfig,
}

/// Collision radius used by the integrator (km).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct EarthRadius(pub f64);

impl Default for EarthRadius {
    fn default() -> Self {
        EarthRadius(R_EARTH_KM)
    }
}

impl Config {
    /// Defaults overridden by `.env` and the process environment.
    pub fn from_env() -> Result<Self> {
        if let Err(e) = dotenv::dotenv() {
            log::debug!("no .env file loaded: {}", e);
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each NEO_IMPACT_* key.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();
        let get = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        if let Some(v) = parse_var::<f64>(&get, "STEP_DAYS")? {
            config.scan.step_days = v;
        }
        if let Some(v) = parse_var::<f64>(&get, "HORIZON_DAYS")? {
            config.scan.horizon_days = v;
        }
        if let Some(v) = parse_var::<f64>(&get, "IMPACT_THRESHOLD_KM")? {
            config.scan.impact_threshold_km = v;
        }
        if let Some(raw) = get("AU_SCALE") {
            let scale = AuScale::parse(&raw).ok_or_else(|| ImpactError::Config {
                key: format!("{ENV_PREFIX}AU_SCALE"),
                reason: format!("expected 'iau' or 'legacy', got '{raw}'"),
            })?;
            config.scan.au_scale = scale;
            config.integration.au_scale = scale;
        }
        if let Some(v) = parse_var::<usize>(&get, "SAMPLE_COUNT")? {
            config.integration.sample_count = v;
        }
        if let Some(v) = parse_var::<f64>(&get, "TOTAL_TIME_YEARS")? {
            config.integration.total_time_years = v;
        }
        if let Some(v) = parse_var::<usize>(&get, "MAX_STEPS_PER_SAMPLE")? {
            config.integration.max_steps_per_sample = v;
        }
        if let Some(key) = get("API_KEY").filter(|k| !k.trim().is_empty()) {
            config.feed.api_key = Some(key);
        }
        if let Some(url) = get("FEED_BASE_URL") {
            config.feed.base_url = url.trim_end_matches('/').to_string();
        }

        Ok(config)
    }
}

fn parse_var<T>(get: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: Display,
{
    match get(name) {
        None => Ok(None),
        Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|e| ImpactError::Config {
            key: format!("{ENV_PREFIX}{name}"),
            reason: format!("'{raw}': {e}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_match_reference_constants() {
        let config = Config::default();
        assert_eq!(config.scan.step_days, 10.0);
        assert_eq!(config.scan.horizon_days, 36_500.0);
        assert_eq!(config.scan.impact_threshold_km, 150_000.0);
        assert_eq!(config.scan.au_scale, AuScale::Legacy);
        assert_eq!(config.integration.sample_count, 2000);
        assert_eq!(config.integration.au_scale, AuScale::Iau2012);
        assert_eq!(config.earth_radius_km.0, 6371.0);
        assert!(config.feed.api_key.is_none());
    }

    #[test]
    fn test_overrides_from_lookup() {
        let config = Config::from_lookup(lookup(&[
            ("NEO_IMPACT_STEP_DAYS", "1.5"),
            ("NEO_IMPACT_AU_SCALE", "iau"),
            ("NEO_IMPACT_SAMPLE_COUNT", "500"),
            ("NEO_IMPACT_API_KEY", "DEMO_KEY"),
            ("NEO_IMPACT_FEED_BASE_URL", "http://localhost:9000/neo/"),
        ]))
        .unwrap();

        assert_eq!(config.scan.step_days, 1.5);
        assert_eq!(config.scan.au_scale, AuScale::Iau2012);
        assert_eq!(config.integration.sample_count, 500);
        assert_eq!(config.feed.api_key.as_deref(), Some("DEMO_KEY"));
        assert_eq!(config.feed.base_url, "http://localhost:9000/neo");
    }

    #[test]
    fn test_malformed_value_is_config_error() {
        let err = Config::from_lookup(lookup(&[("NEO_IMPACT_HORIZON_DAYS", "forever")])).unwrap_err();
        match err {
            ImpactError::Config { key, .. } => assert_eq!(key, "NEO_IMPACT_HORIZON_DAYS"),
            other => panic!("unexpected error {other:?}"),
        }

        let err = Config::from_lookup(lookup(&[("NEO_IMPACT_AU_SCALE", "parsec")])).unwrap_err();
        assert_eq!(err.kind(), "config");
    }

    #[test]
    fn test_api_key_not_serialized() {
        let mut config = Config::default();
        config.feed.api_key = Some("secret".into());
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("secret"));
    }
}
