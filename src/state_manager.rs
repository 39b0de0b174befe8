// State Manager - Shared configuration and providers behind the prediction entry points
// Every request builds its own scanner or integrator; nothing mutable is shared
// except the feed cache.

use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::thread;

use crate::api_client::{CacheManager, FeedAsteroid, NeoWsClient};
use crate::catalog::{CatalogEntry, CatalogProvider, PhysicalProperties};
use crate::config::Config;
use crate::detector::ClosestApproachRecord;
use crate::ephemeris::{EccentricEarth, PrecessingEarth};
use crate::error::{ImpactError, Result};
use crate::integrator::{InitialCondition, SimulationResult, TrajectoryIntegrator};
use crate::physics_engine::OrbitalElements;
use crate::scanner::ClosestApproachScanner;
use crate::units::{Degrees, Radians};

/// Catalog lookup joined with its scan outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImpactPrediction {
    pub asteroid: CatalogEntry,
    pub physical: PhysicalProperties,
    pub closest_approach: ClosestApproachRecord,
}

pub struct ImpactService {
    config: Arc<Config>,
    catalog: Arc<dyn CatalogProvider>,
    cache: Arc<CacheManager>,
    epoch: DateTime<Utc>,
}

impl ImpactService {
    /// Service whose elapsed times are counted from now.
    pub fn new(config: Config, catalog: impl CatalogProvider + 'static) -> Self {
        Self {
            config: Arc::new(config),
            catalog: Arc::new(catalog),
            cache: Arc::new(CacheManager::default()),
            epoch: Utc::now(),
        }
    }

    pub fn with_epoch(mut self, epoch: DateTime<Utc>) -> Self {
        self.epoch = epoch;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn epoch(&self) -> DateTime<Utc> {
        self.epoch
    }

    pub fn scanner(&self) -> ClosestApproachScanner<PrecessingEarth> {
        ClosestApproachScanner::with_earth(self.config.scan, self.config.precessing_earth, self.epoch)
    }

    pub fn integrator(&self) -> TrajectoryIntegrator<EccentricEarth> {
        build_integrator(&self.config, self.epoch)
    }

    // =========================================================================
    // CATALOG REQUESTS
    // =========================================================================

    /// Look `name` up in the catalog and scan its orbit.
    pub fn predict_impact(&self, name: &str) -> Result<ImpactPrediction> {
        let asteroid = self.catalog.require(name)?;
        debug!("predict_impact: '{name}' matched '{}'", asteroid.full_name.trim());

        let closest_approach = self.scanner().scan_configured(&asteroid.elements())?;
        Ok(ImpactPrediction {
            physical: asteroid.physical_properties(),
            asteroid,
            closest_approach,
        })
    }

    /// Look `name` up in the catalog and integrate its trajectory.
    pub fn simulate(&self, name: &str) -> Result<SimulationResult> {
        let asteroid = self.catalog.require(name)?;
        let elements = asteroid.elements().to_radians();
        self.integrator().integrate(&elements.into())
    }

    // =========================================================================
    // BATCH AND BACKGROUND REQUESTS
    // =========================================================================

    /// Scan every element set, spreading the batch over scoped worker threads.
    /// Results keep the order of `requests`.
    pub fn predict_many(&self, requests: &[OrbitalElements<Degrees>]) -> Vec<Result<ClosestApproachRecord>> {
        if requests.is_empty() {
            return Vec::new();
        }
        let workers = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
            .min(requests.len());
        let chunk_size = requests.len().div_ceil(workers);
        let scanner = &self.scanner();

        debug!("predict_many: {} requests on {} workers", requests.len(), workers);

        thread::scope(|s| {
            let handles: Vec<_> = requests
                .chunks(chunk_size)
                .map(|chunk| {
                    s.spawn(move || {
                        chunk
                            .iter()
                            .map(|elements| scanner.scan_configured(elements))
                            .collect::<Vec<_>>()
                    })
                })
                .collect();

            handles
                .into_iter()
                .flat_map(|handle| match handle.join() {
                    Ok(results) => results,
                    Err(panic) => std::panic::resume_unwind(panic),
                })
                .collect()
        })
    }

    /// Run the integrator on the blocking pool so async callers are not stalled.
    pub async fn simulate_async(&self, initial: impl Into<InitialCondition>) -> Result<SimulationResult> {
        let config = Arc::clone(&self.config);
        let epoch = self.epoch;
        let initial = initial.into();

        tokio::task::spawn_blocking(move || build_integrator(&config, epoch).integrate(&initial))
            .await
            .map_err(|e| ImpactError::simulation(format!("integration task failed: {e}")))?
    }

    /// Convenience for radian element sets coming straight from the feed.
    pub async fn simulate_feed_asteroid(&self, asteroid: &FeedAsteroid) -> Result<SimulationResult> {
        let elements: OrbitalElements<Radians> = asteroid.elements;
        self.simulate_async(elements).await
    }

    // =========================================================================
    // LIVE FEED
    // =========================================================================

    /// Fetch a date range from the feed and replace the cached batch.
    pub async fn refresh_feed(&self, client: &NeoWsClient, start_date: &str, end_date: &str) -> Result<usize> {
        let asteroids = client.fetch_feed(start_date, end_date).await?;
        let count = asteroids.len();
        self.cache.set_asteroids(asteroids);
        info!("refresh_feed: cached {count} asteroids");
        Ok(count)
    }

    pub fn cached_feed(&self) -> Vec<FeedAsteroid> {
        self.cache.get_asteroids()
    }

    pub fn feed_is_fresh(&self) -> bool {
        self.cache.is_cache_valid()
    }

    pub fn cache(&self) -> &CacheManager {
        &self.cache
    }
}

fn build_integrator(config: &Config, epoch: DateTime<Utc>) -> TrajectoryIntegrator<EccentricEarth> {
    TrajectoryIntegrator::with_earth(
        config.integration.clone(),
        config.eccentric_earth,
        config.earth_radius_km.0,
        epoch,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::InMemoryCatalog;
    use crate::integrator::IntegratorSettings;
    use crate::scanner::ScanConfig;
    use chrono::TimeZone;

    fn test_config() -> Config {
        Config {
            scan: ScanConfig {
                horizon_days: 3650.0,
                ..ScanConfig::default()
            },
            integration: IntegratorSettings {
                total_time_years: 1.0,
                sample_count: 50,
                ..IntegratorSettings::default()
            },
            ..Config::default()
        }
    }

    fn entry(name: &str, a: f64, e: f64, m: f64) -> CatalogEntry {
        CatalogEntry {
            full_name: name.to_string(),
            a,
            e,
            i: 5.0,
            node: 30.0,
            peri: 60.0,
            mean_anomaly: m,
            diameter_km: Some(1.0),
            gm_km3_s2: Some(1.0e-7),
        }
    }

    fn service() -> ImpactService {
        let catalog = InMemoryCatalog::new(vec![
            entry("433 Eros (A898 PA)", 1.458, 0.223, 110.0),
            entry("2 Pallas (A802 FA)", 2.772, 0.230, 40.0),
        ]);
        ImpactService::new(test_config(), catalog)
            .with_epoch(Utc.with_ymd_and_hms(2025, 10, 4, 0, 0, 0).unwrap())
    }

    #[test]
    fn test_predict_impact_by_name() {
        let prediction = service().predict_impact("pallas").unwrap();
        assert_eq!(prediction.asteroid.full_name, "2 Pallas (A802 FA)");
        assert!(!prediction.closest_approach.impact);
        assert!(prediction.closest_approach.distance_au > 0.5);
        assert!(prediction.physical.density_kg_m3.is_some());
    }

    #[test]
    fn test_unknown_name_is_data_unavailable() {
        let err = service().predict_impact("Apophis").unwrap_err();
        assert_eq!(err.kind(), "data_unavailable");
        let err = service().simulate("Apophis").unwrap_err();
        assert_eq!(err.kind(), "data_unavailable");
    }

    #[test]
    fn test_simulate_by_name_uses_configured_window() {
        let result = service().simulate("eros").unwrap();
        assert_eq!(result.len(), 50);
        assert_eq!(result.asteroid_positions.len(), result.earth_positions.len());
        assert_eq!(*result.times_years.last().unwrap(), 1.0);
    }

    #[test]
    fn test_predict_many_matches_sequential_scans() {
        let service = service();
        let requests: Vec<OrbitalElements<Degrees>> = (0..9)
            .map(|k| {
                OrbitalElements::new(
                    1.2 + 0.3 * k as f64,
                    0.1,
                    Degrees(2.0),
                    Degrees(10.0 * k as f64),
                    Degrees(45.0),
                    Degrees(20.0 * k as f64),
                )
            })
            .collect();

        let parallel = service.predict_many(&requests);
        assert_eq!(parallel.len(), requests.len());
        for (elements, result) in requests.iter().zip(&parallel) {
            let sequential = service.scanner().scan_configured(elements).unwrap();
            assert_eq!(result.as_ref().unwrap(), &sequential);
        }
    }

    #[test]
    fn test_predict_many_keeps_per_request_errors() {
        let good = OrbitalElements::new(2.0, 0.1, Degrees(0.0), Degrees(0.0), Degrees(0.0), Degrees(0.0));
        let bad = OrbitalElements { eccentricity: 1.3, ..good };
        let results = service().predict_many(&[good, bad, good]);
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(ImpactError::InvalidElements { .. })));
        assert!(results[2].is_ok());
        assert!(service().predict_many(&[]).is_empty());
    }

    #[tokio::test]
    async fn test_simulate_async_matches_blocking_call() {
        let service = service();
        let elements =
            OrbitalElements::new(1.8, 0.15, Radians(0.1), Radians(0.5), Radians(1.0), Radians(2.0));

        let background = service.simulate_async(elements).await.unwrap();
        let direct = service.integrator().integrate(&elements.into()).unwrap();
        assert_eq!(background.asteroid_positions, direct.asteroid_positions);
        assert_eq!(background.closest_approach, direct.closest_approach);
    }

    #[test]
    fn test_feed_cache_starts_empty() {
        let service = service();
        assert!(service.cached_feed().is_empty());
        assert!(!service.feed_is_fresh());

        service.cache().set_asteroids(Vec::new());
        assert!(service.feed_is_fresh());
    }
}
