// Closest Approach Detector - running minimum with threshold short-circuit
// Shared by the ephemeris scan and the integrated trajectory

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::physics_engine::Vector3;
use crate::units::{AuScale, DAYS_PER_YEAR};

/// One point of a (time, distance) series, with whatever the caller needs
/// to keep alongside the minimum.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample<T> {
    pub time: f64,
    pub distance: f64,
    pub payload: T,
}

impl<T> Sample<T> {
    pub fn new(time: f64, distance: f64, payload: T) -> Self {
        Self {
            time,
            distance,
            payload,
        }
    }
}

/// Minimum found over a series.
#[derive(Debug, Clone, PartialEq)]
pub struct Approach<T> {
    /// Position of the minimum in the series
    pub index: usize,
    pub time: f64,
    pub distance: f64,
    pub payload: T,
    /// True when the threshold predicate fired (the reported sample is the crossing)
    pub crossed: bool,
    /// Samples consumed before stopping
    pub samples_seen: usize,
}

pub struct ClosestApproachDetector<F> {
    threshold: F,
}

impl ClosestApproachDetector<fn(f64) -> bool> {
    /// Track the minimum over the whole series without early exit.
    pub fn unbounded() -> Self {
        fn never(_: f64) -> bool {
            false
        }
        Self { threshold: never }
    }
}

impl<F> ClosestApproachDetector<F>
where
    F: Fn(f64) -> bool,
{
    /// `threshold` is evaluated on every distance; the first `true` stops consumption.
    pub fn new(threshold: F) -> Self {
        Self { threshold }
    }

    /// Consume `samples` once.
    ///
    /// A strictly smaller distance replaces the running minimum. Errors from
    /// the series abort consumption and are returned unchanged. An empty
    /// series yields `Ok(None)`.
    pub fn run<T, I>(&self, samples: I) -> Result<Option<Approach<T>>>
    where
        I: IntoIterator<Item = Result<Sample<T>>>,
    {
        let mut best: Option<Approach<T>> = None;
        let mut seen = 0usize;

        for (index, sample) in samples.into_iter().enumerate() {
            let sample = sample?;
            seen += 1;

            let crossed = (self.threshold)(sample.distance);
            let improves = best
                .as_ref()
                .map_or(true, |b| sample.distance < b.distance);

            if improves || crossed {
                best = Some(Approach {
                    index,
                    time: sample.time,
                    distance: sample.distance,
                    payload: sample.payload,
                    crossed,
                    samples_seen: seen,
                });
            }
            if crossed {
                break;
            }
        }

        Ok(best.map(|b| Approach {
            samples_seen: seen,
            ..b
        }))
    }
}

// =============================================================================
// CLOSEST APPROACH RECORD
// =============================================================================

/// Latitude/longitude projected from a heliocentric position vector.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ImpactSite {
    pub latitude_deg: f64,
    /// In (−180°, 180°]
    pub longitude_deg: f64,
}

impl ImpactSite {
    pub fn from_position(p: &Vector3) -> Self {
        Self {
            latitude_deg: p.z.atan2((p.x * p.x + p.y * p.y).sqrt()).to_degrees(),
            longitude_deg: p.y.atan2(p.x).to_degrees(),
        }
    }
}

/// Single reduced outcome of a scan or an integration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClosestApproachRecord {
    pub distance_au: f64,
    pub distance_km: f64,
    /// Elapsed time of the minimum (or of the impact)
    pub time_days: f64,
    pub time_years: f64,
    pub impact: bool,
    pub impact_site: Option<ImpactSite>,
    pub impact_date: Option<NaiveDate>,
}

impl ClosestApproachRecord {
    /// `impact_position` is the asteroid position at the crossing sample, if any.
    pub(crate) fn new(
        distance_au: f64,
        time_days: f64,
        impact_position: Option<&Vector3>,
        epoch: DateTime<Utc>,
        au_scale: AuScale,
    ) -> Self {
        let impact_date = impact_position.and_then(|_| calendar_date(epoch, time_days));
        Self {
            distance_au,
            distance_km: au_scale.au_to_km(distance_au),
            time_days,
            time_years: time_days / DAYS_PER_YEAR,
            impact: impact_position.is_some(),
            impact_site: impact_position.map(ImpactSite::from_position),
            impact_date,
        }
    }
}

/// Calendar date `days` after `epoch`.
pub fn calendar_date(epoch: DateTime<Utc>, days: f64) -> Option<NaiveDate> {
    if !days.is_finite() {
        return None;
    }
    let offset = Duration::milliseconds((days * 86_400_000.0).round() as i64);
    epoch.checked_add_signed(offset).map(|t| t.date_naive())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ImpactError;

    fn series(distances: &[f64]) -> Vec<Result<Sample<usize>>> {
        distances
            .iter()
            .enumerate()
            .map(|(i, &d)| Ok(Sample::new(i as f64 * 10.0, d, i)))
            .collect()
    }

    #[test]
    fn test_tracks_minimum() {
        let approach = ClosestApproachDetector::unbounded()
            .run(series(&[5.0, 3.0, 4.0, 1.5, 2.0]))
            .unwrap()
            .unwrap();
        assert_eq!(approach.index, 3);
        assert_eq!(approach.time, 30.0);
        assert_eq!(approach.distance, 1.5);
        assert_eq!(approach.payload, 3);
        assert!(!approach.crossed);
        assert_eq!(approach.samples_seen, 5);
    }

    #[test]
    fn test_first_minimum_wins_on_ties() {
        let approach = ClosestApproachDetector::unbounded()
            .run(series(&[2.0, 1.0, 1.0]))
            .unwrap()
            .unwrap();
        assert_eq!(approach.index, 1);
    }

    #[test]
    fn test_threshold_short_circuits() {
        let samples = vec![1.0, 0.5, 0.05, 0.01, 0.0];
        let mut pulled = 0;
        let iter = samples.iter().enumerate().map(|(i, &d)| {
            pulled += 1;
            Ok(Sample::new(i as f64, d, ()))
        });

        let approach = ClosestApproachDetector::new(|d| d < 0.1)
            .run(iter)
            .unwrap()
            .unwrap();
        assert!(approach.crossed);
        assert_eq!(approach.index, 2);
        assert_eq!(approach.samples_seen, 3);
        assert_eq!(pulled, 3);
    }

    #[test]
    fn test_empty_series() {
        let approach = ClosestApproachDetector::unbounded()
            .run(Vec::<Result<Sample<()>>>::new())
            .unwrap();
        assert!(approach.is_none());
    }

    #[test]
    fn test_impact_site_projection() {
        let site = ImpactSite::from_position(&Vector3::new(-1.0, 0.0, 0.0));
        assert!((site.longitude_deg - 180.0).abs() < 1e-12);
        assert_eq!(site.latitude_deg, 0.0);

        let site = ImpactSite::from_position(&Vector3::new(1.0, -1.0, 2.0_f64.sqrt()));
        assert!((site.longitude_deg + 45.0).abs() < 1e-12);
        assert!((site.latitude_deg - 45.0).abs() < 1e-12);
    }

    #[test]
    fn test_record_without_impact_has_no_site() {
        let epoch = chrono::Utc::now();
        let record = ClosestApproachRecord::new(0.5, 365.25, None, epoch, AuScale::Legacy);
        assert!(!record.impact);
        assert!(record.impact_site.is_none());
        assert!(record.impact_date.is_none());
        assert_eq!(record.distance_km, 0.748e8);
        assert_eq!(record.time_years, 1.0);
    }

    #[test]
    fn test_record_impact_date() {
        use chrono::TimeZone;
        let epoch = chrono::Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let hit = Vector3::new(1.0, 0.0, 0.0);
        let record = ClosestApproachRecord::new(1e-4, 40.0, Some(&hit), epoch, AuScale::Iau2012);
        assert!(record.impact);
        assert_eq!(record.impact_date, NaiveDate::from_ymd_opt(2025, 2, 10));
        assert_eq!(record.impact_site.unwrap().longitude_deg, 0.0);
    }

    #[test]
    fn test_error_aborts() {
        let items: Vec<Result<Sample<()>>> = vec![
            Ok(Sample::new(0.0, 3.0, ())),
            Err(ImpactError::instability("boom")),
            Ok(Sample::new(2.0, 0.0, ())),
        ];
        let err = ClosestApproachDetector::new(|d| d < 1.0).run(items).unwrap_err();
        assert!(matches!(err, ImpactError::NumericInstability { .. }));
    }
}
