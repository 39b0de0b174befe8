// neo-impact - Asteroid close-approach and Earth impact prediction
// Two prediction paths share one detector: a fast analytic ephemeris scan
// and an adaptive Sun + Earth trajectory integration.

pub mod api_client;
pub mod catalog;
pub mod config;
pub mod detector;
pub mod ephemeris;
pub mod error;
pub mod integrator;
pub mod physics_engine;
pub mod scanner;
pub mod state_manager;
pub mod units;

pub use api_client::{AngleKind, CacheManager, FeedAsteroid, FeedRecord, NeoWsClient};
pub use catalog::{CatalogEntry, CatalogProvider, InMemoryCatalog, PhysicalProperties};
pub use config::{Config, FeedConfig};
pub use detector::{ClosestApproachDetector, ClosestApproachRecord, ImpactSite};
pub use ephemeris::{EarthEphemeris, EccentricEarth, EphemerisSample, PrecessingEarth};
pub use error::{ImpactError, Result};
pub use integrator::{
    integrate_trajectory, InitialCondition, IntegratorSettings, SimulationResult, TrajectoryIntegrator,
};
pub use physics_engine::{KeplerMethod, OrbitalElements, StateVector, Vector3};
pub use scanner::{scan_closest_approach, ClosestApproachScanner, ScanConfig};
pub use state_manager::{ImpactPrediction, ImpactService};
pub use units::{AuScale, Degrees, Radians};
