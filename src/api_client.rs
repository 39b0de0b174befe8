// NASA NeoWs API Client
// Fetches near-Earth objects for a date range and normalizes their orbital elements

use chrono::NaiveDate;
use log::{debug, info, warn};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::FeedConfig;
use crate::error::{ImpactError, Result};
use crate::physics_engine::OrbitalElements;
use crate::units::{Degrees, Radians};

const DATE_FORMAT: &str = "%Y-%m-%d";
const DEMO_KEY: &str = "DEMO_KEY";

// =============================================================================
// API RESPONSE TYPES
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedResponse {
    pub element_count: Option<i32>,
    /// Objects grouped by close-approach date (YYYY-MM-DD)
    #[serde(default)]
    pub near_earth_objects: BTreeMap<String, Vec<NeoObject>>,
}

impl FeedResponse {
    /// Object ids in date order, first occurrence only.
    pub fn object_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = Vec::new();
        for neo in self.near_earth_objects.values().flatten() {
            if !neo.id.is_empty() && !ids.contains(&neo.id) {
                ids.push(neo.id.clone());
            }
        }
        ids
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NeoObject {
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub is_potentially_hazardous_asteroid: Option<bool>,
    pub orbital_data: Option<OrbitalData>,
}

/// NeoWs reports every element as a decimal string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrbitalData {
    pub epoch_osculation: Option<String>,
    pub eccentricity: Option<String>,
    pub semi_major_axis: Option<String>,
    pub inclination: Option<String>,
    pub ascending_node_longitude: Option<String>,
    pub perihelion_argument: Option<String>,
    pub mean_anomaly: Option<String>,
}

// =============================================================================
// NORMALIZED RECORDS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AngleKind {
    Degrees,
    Radians,
}

/// Raw orbital elements for one object as a provider reports them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedRecord {
    pub id: String,
    pub name: String,
    pub a: f64,
    pub e: f64,
    pub i: f64,
    /// Argument of perihelion ω
    pub omega: f64,
    /// Longitude of ascending node Ω
    pub node: f64,
    pub mean_anomaly: f64,
    pub angles: AngleKind,
}

impl FeedRecord {
    /// Radian elements, accepted only for a bound orbit (0 <= e < 1, a > 0).
    pub fn normalize(&self) -> Result<OrbitalElements<Radians>> {
        let elements = match self.angles {
            AngleKind::Degrees => OrbitalElements::new(
                self.a,
                self.e,
                Degrees(self.i),
                Degrees(self.node),
                Degrees(self.omega),
                Degrees(self.mean_anomaly),
            )
            .to_radians(),
            AngleKind::Radians => OrbitalElements::new(
                self.a,
                self.e,
                Radians(self.i),
                Radians(self.node),
                Radians(self.omega),
                Radians(self.mean_anomaly),
            ),
        };
        elements.validate()?;
        Ok(elements)
    }
}

impl NeoObject {
    /// Parse the string elements; `None` when any of the six is missing or malformed.
    pub fn to_record(&self) -> Option<FeedRecord> {
        let orb = self.orbital_data.as_ref()?;
        let parse = |field: &Option<String>| field.as_deref().and_then(|s| s.trim().parse::<f64>().ok());

        Some(FeedRecord {
            id: self.id.clone(),
            name: self.name.clone(),
            a: parse(&orb.semi_major_axis)?,
            e: parse(&orb.eccentricity)?,
            i: parse(&orb.inclination)?,
            omega: parse(&orb.perihelion_argument)?,
            node: parse(&orb.ascending_node_longitude)?,
            mean_anomaly: parse(&orb.mean_anomaly)?,
            angles: AngleKind::Degrees,
        })
    }
}

/// A feed object whose elements passed normalization.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedAsteroid {
    pub id: String,
    pub name: String,
    pub elements: OrbitalElements<Radians>,
    pub is_potentially_hazardous: bool,
}

impl FeedAsteroid {
    pub fn from_neo(neo: &NeoObject) -> Result<Self> {
        let record = neo.to_record().ok_or_else(|| {
            ImpactError::invalid_elements(format!("object {} has incomplete orbital data", neo.id))
        })?;
        Ok(Self {
            id: record.id.clone(),
            name: record.name.clone(),
            elements: record.normalize()?,
            is_potentially_hazardous: neo.is_potentially_hazardous_asteroid.unwrap_or(false),
        })
    }
}

/// Parse both dates and check `0 <= end - start <= max_range_days`.
pub fn validate_date_range(start: &str, end: &str, max_range_days: i64) -> Result<(NaiveDate, NaiveDate)> {
    let start_date = NaiveDate::parse_from_str(start, DATE_FORMAT).map_err(|_| {
        ImpactError::parameter("start_date", format!("'{start}' is not a YYYY-MM-DD date"))
    })?;
    let end_date = NaiveDate::parse_from_str(end, DATE_FORMAT)
        .map_err(|_| ImpactError::parameter("end_date", format!("'{end}' is not a YYYY-MM-DD date")))?;

    let span = (end_date - start_date).num_days();
    if span < 0 {
        return Err(ImpactError::parameter("end_date", format!("{end} is before {start}")));
    }
    if span > max_range_days {
        return Err(ImpactError::parameter(
            "end_date",
            format!("date range cannot exceed {max_range_days} days (got {span})"),
        ));
    }
    Ok((start_date, end_date))
}

// =============================================================================
// API CLIENT
// =============================================================================

pub struct NeoWsClient {
    api_key: String,
    base_url: String,
    max_records: usize,
    max_range_days: i64,
    client: reqwest::Client,
}

impl NeoWsClient {
    pub fn new(config: &FeedConfig) -> Self {
        Self {
            api_key: config.api_key.clone().unwrap_or_else(|| DEMO_KEY.to_string()),
            base_url: config.base_url.clone(),
            max_records: config.max_records,
            max_range_days: config.max_range_days,
            client: reqwest::Client::new(),
        }
    }

    /// Objects approaching Earth between `start_date` and `end_date`, with
    /// elements taken from each object's detail record.
    ///
    /// Objects whose details cannot be fetched or whose elements do not
    /// describe a bound orbit are skipped.
    pub async fn fetch_feed(&self, start_date: &str, end_date: &str) -> Result<Vec<FeedAsteroid>> {
        validate_date_range(start_date, end_date, self.max_range_days)?;

        let url = format!("{}/feed", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("start_date", start_date),
                ("end_date", end_date),
                ("api_key", self.api_key.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ImpactError::Feed(format!("API returned status: {}", response.status())));
        }
        let feed: FeedResponse = response.json().await?;
        let ids = feed.object_ids();
        debug!("feed {start_date}..{end_date}: {} objects listed", ids.len());

        let mut asteroids = Vec::new();
        for id in ids {
            if asteroids.len() >= self.max_records {
                break;
            }
            let neo = match self.fetch_neo_object(&id).await {
                Ok(neo) => neo,
                Err(e) => {
                    warn!("feed: skipping {id}: {e}");
                    continue;
                }
            };
            match FeedAsteroid::from_neo(&neo) {
                Ok(asteroid) => asteroids.push(asteroid),
                Err(e) => warn!("feed: skipping {id}: {e}"),
            }
        }

        info!("feed {start_date}..{end_date}: {} usable objects", asteroids.len());
        Ok(asteroids)
    }

    /// Fetch a specific NEO by ID
    pub async fn fetch_neo(&self, neo_id: &str) -> Result<FeedAsteroid> {
        let neo = self.fetch_neo_object(neo_id).await?;
        FeedAsteroid::from_neo(&neo)
    }

    async fn fetch_neo_object(&self, neo_id: &str) -> Result<NeoObject> {
        let url = format!("{}/neo/{}", self.base_url, neo_id);
        let response = self
            .client
            .get(&url)
            .query(&[("api_key", self.api_key.as_str())])
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ImpactError::DataUnavailable {
                query: neo_id.to_string(),
            });
        }
        if !response.status().is_success() {
            return Err(ImpactError::Feed(format!("API returned status: {}", response.status())));
        }

        let mut neo: NeoObject = response.json().await?;
        if neo.id.is_empty() {
            neo.id = neo_id.to_string();
        }
        Ok(neo)
    }
}

// =============================================================================
// CACHE MANAGER
// =============================================================================

/// Last normalized feed batch with a freshness window.
pub struct CacheManager {
    asteroids: Arc<RwLock<Vec<FeedAsteroid>>>,
    last_fetch: Arc<RwLock<Option<Instant>>>,
    cache_duration: Duration,
}

impl CacheManager {
    pub fn new(cache_duration: Duration) -> Self {
        Self {
            asteroids: Arc::new(RwLock::new(Vec::new())),
            last_fetch: Arc::new(RwLock::new(None)),
            cache_duration,
        }
    }

    pub fn get_asteroids(&self) -> Vec<FeedAsteroid> {
        self.asteroids.read().clone()
    }

    pub fn set_asteroids(&self, asteroids: Vec<FeedAsteroid>) {
        *self.asteroids.write() = asteroids;
        *self.last_fetch.write() = Some(Instant::now());
    }

    pub fn is_cache_valid(&self) -> bool {
        match *self.last_fetch.read() {
            Some(last) => last.elapsed() < self.cache_duration,
            None => false,
        }
    }

    pub fn asteroid_count(&self) -> usize {
        self.asteroids.read().len()
    }
}

impl Default for CacheManager {
    fn default() -> Self {
        Self::new(Duration::from_secs(3600)) // 1 hour cache
    }
}
