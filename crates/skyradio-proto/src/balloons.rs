//! Hourly balloon position snapshots.
//!
//! The snapshot endpoint serves `<hh>.json` in one of two shapes: an array of
//! `[lat, lng, alt, ...]` tuples, or an object keyed by balloon id.  The body
//! is classified once into [`BalloonSnapshot`] and then transformed.
//!
//! When the snapshot cannot be fetched or decoded the loader returns a fixed
//! set of placeholder balloons, flagged as [`BalloonSource::Fallback`] so
//! callers can tell them apart from live data.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::geo::LatLng;

pub const GENRES: &[&str] = &[
    "Pop",
    "Rock",
    "Classical",
    "Jazz",
    "News",
    "Talk",
    "Electronic",
    "Country",
    "Hip-Hop",
    "R&B",
    "Soul",
    "Blues",
    "Reggae",
    "World",
];

pub const FREQUENCY_MIN_MHZ: f64 = 88.1;
pub const FREQUENCY_MAX_MHZ: f64 = 107.9;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct BalloonRecord {
    pub id: String,
    pub lat: f64,
    pub lng: f64,
    pub altitude: Option<f64>,
    pub time: Option<String>,
    pub callsign: Option<String>,
    pub frequency_mhz: Option<f64>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl BalloonRecord {
    pub fn position(&self) -> LatLng {
        LatLng::new(self.lat, self.lng)
    }

    pub fn display_name(&self) -> &str {
        self.callsign.as_deref().unwrap_or(&self.id)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BalloonError {
    #[error("hour must be 0..=23, got {0}")]
    InvalidHour(u8),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("HTTP {0}")]
    Status(reqwest::StatusCode),
    #[error("invalid JSON: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("snapshot is neither an array nor an object")]
    UnexpectedShape,
}

/// Raw snapshot, classified by shape.
#[derive(Debug, Clone, PartialEq)]
pub enum BalloonSnapshot {
    Tuples(Vec<Value>),
    Keyed(Map<String, Value>),
}

impl BalloonSnapshot {
    pub fn decode(value: Value) -> Result<Self, BalloonError> {
        match value {
            Value::Array(items) => Ok(Self::Tuples(items)),
            Value::Object(map) => Ok(Self::Keyed(map)),
            _ => Err(BalloonError::UnexpectedShape),
        }
    }

    pub fn from_slice(body: &[u8]) -> Result<Self, BalloonError> {
        Self::decode(serde_json::from_slice(body)?)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BalloonSource {
    Live,
    Fallback { reason: String },
}

impl BalloonSource {
    pub fn is_fallback(&self) -> bool {
        matches!(self, BalloonSource::Fallback { .. })
    }
}

#[derive(Debug, Clone)]
pub struct BalloonLoad {
    pub hour: u8,
    pub balloons: Vec<BalloonRecord>,
    pub source: BalloonSource,
}

pub fn snapshot_url(base_url: &str, hour: u8) -> Result<String, BalloonError> {
    if hour > 23 {
        return Err(BalloonError::InvalidHour(hour));
    }
    Ok(format!("{}/{:02}.json", base_url.trim_end_matches('/'), hour))
}

/// Turn a snapshot into balloon records, filling absent fields from `rng`.
pub fn extract_balloons_with_rng<R: Rng + ?Sized>(
    snapshot: &BalloonSnapshot,
    rng: &mut R,
) -> Vec<BalloonRecord> {
    let mut balloons = Vec::new();

    match snapshot {
        BalloonSnapshot::Tuples(items) => {
            for (index, item) in items.iter().enumerate() {
                match balloon_from_tuple(index, item, rng) {
                    Some(b) => balloons.push(b),
                    None => debug!("skipping malformed balloon tuple #{}: {}", index, item),
                }
            }
        }
        BalloonSnapshot::Keyed(map) => {
            for (key, value) in map {
                match balloon_from_object(key, value, rng) {
                    Some(b) => balloons.push(b),
                    None => debug!("skipping malformed balloon entry '{}'", key),
                }
            }
        }
    }

    balloons
}

pub fn extract_balloons(snapshot: &BalloonSnapshot) -> Vec<BalloonRecord> {
    extract_balloons_with_rng(snapshot, &mut rand::thread_rng())
}

fn balloon_from_tuple<R: Rng + ?Sized>(
    index: usize,
    item: &Value,
    rng: &mut R,
) -> Option<BalloonRecord> {
    let fields = item.as_array()?;
    if fields.len() < 3 {
        return None;
    }
    let lat = fields[0].as_f64()?;
    let lng = fields[1].as_f64()?;

    Some(BalloonRecord {
        // Rounded coordinates: two balloons at the same rounded spot share an id.
        id: format!("balloon_{:.4}_{:.4}", lat, lng),
        lat,
        lng,
        altitude: fields[2].as_f64(),
        time: None,
        callsign: Some(format!("Balloon-{}", index)),
        frequency_mhz: Some(random_frequency(rng)),
        tags: random_tags(rng),
    })
}

fn balloon_from_object<R: Rng + ?Sized>(
    key: &str,
    value: &Value,
    rng: &mut R,
) -> Option<BalloonRecord> {
    let obj = value.as_object()?;
    let lat = obj.get("lat")?.as_f64()?;
    let lng = obj.get("lng")?.as_f64()?;

    let callsign = obj
        .get("callsign")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("Balloon-{}", key));
    let frequency = obj
        .get("frequency")
        .and_then(Value::as_f64)
        .filter(|f| *f != 0.0)
        .unwrap_or_else(|| random_frequency(rng));
    let tags = obj
        .get("tags")
        .and_then(Value::as_array)
        .map(|tags| {
            let mut out: Vec<String> = Vec::new();
            for tag in tags.iter().filter_map(Value::as_str) {
                if !out.iter().any(|t| t == tag) {
                    out.push(tag.to_string());
                }
            }
            out
        })
        .unwrap_or_else(|| random_tags(rng));

    Some(BalloonRecord {
        id: key.to_string(),
        lat,
        lng,
        altitude: obj.get("alt").and_then(Value::as_f64),
        time: obj.get("time").and_then(Value::as_str).map(str::to_string),
        callsign: Some(callsign),
        frequency_mhz: Some(frequency),
        tags,
    })
}

fn random_frequency<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    rng.gen_range(FREQUENCY_MIN_MHZ..=FREQUENCY_MAX_MHZ)
}

/// One to three distinct genres.
fn random_tags<R: Rng + ?Sized>(rng: &mut R) -> Vec<String> {
    let count = rng.gen_range(1..=3);
    GENRES
        .choose_multiple(rng, count)
        .map(|g| g.to_string())
        .collect()
}

/// Placeholder balloons shown when the snapshot is unavailable.
pub fn fallback_balloons() -> Vec<BalloonRecord> {
    let fixed = |id: &str, lat, lng, alt, callsign: &str, freq, tags: [&str; 2]| BalloonRecord {
        id: id.to_string(),
        lat,
        lng,
        altitude: Some(alt),
        time: None,
        callsign: Some(callsign.to_string()),
        frequency_mhz: Some(freq),
        tags: tags.iter().map(|t| t.to_string()).collect(),
    };

    vec![
        fixed("fallback-1", 40.7128, -74.006, 9000.0, "NYC-Balloon", 91.3, ["Jazz", "News"]),
        fixed("fallback-2", 51.5074, -0.1278, 8500.0, "London-FM", 103.5, ["Pop", "Talk"]),
        fixed("fallback-3", 35.6762, 139.6503, 7800.0, "Tokyo-Radio", 98.7, ["Electronic", "World"]),
        fixed("fallback-4", -33.8688, 151.2093, 8200.0, "Sydney-Air", 88.9, ["Rock", "Classical"]),
        fixed("fallback-5", 37.7749, -122.4194, 9200.0, "SF-Waves", 105.7, ["Hip-Hop", "Soul"]),
    ]
}

pub async fn fetch_snapshot(
    client: &reqwest::Client,
    url: &str,
) -> Result<BalloonSnapshot, BalloonError> {
    let response = client.get(url).send().await?;
    if !response.status().is_success() {
        return Err(BalloonError::Status(response.status()));
    }
    let body = response.bytes().await?;
    BalloonSnapshot::from_slice(&body)
}

/// Load the snapshot for `hour`.  Only an out-of-range hour is an error;
/// transport and decode failures yield the fallback set.
pub async fn load_balloons(
    client: &reqwest::Client,
    base_url: &str,
    hour: u8,
) -> Result<BalloonLoad, BalloonError> {
    let url = snapshot_url(base_url, hour)?;
    info!("Loading balloon snapshot {}", url);

    match fetch_snapshot(client, &url).await {
        Ok(snapshot) => {
            let balloons = extract_balloons(&snapshot);
            info!("Loaded {} balloons for {:02}:00", balloons.len(), hour);
            Ok(BalloonLoad {
                hour,
                balloons,
                source: BalloonSource::Live,
            })
        }
        Err(e) => {
            warn!("Failed to fetch balloon data ({}), using fallback data", e);
            Ok(BalloonLoad {
                hour,
                balloons: fallback_balloons(),
                source: BalloonSource::Fallback {
                    reason: e.to_string(),
                },
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use serde_json::json;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    #[test]
    fn test_snapshot_url_pads_hour() {
        assert_eq!(snapshot_url("http://h/api/", 5).unwrap(), "http://h/api/05.json");
        assert_eq!(snapshot_url("http://h", 23).unwrap(), "http://h/23.json");
        assert!(matches!(snapshot_url("http://h", 24), Err(BalloonError::InvalidHour(24))));
    }

    #[test]
    fn test_decode_rejects_scalar() {
        assert!(matches!(
            BalloonSnapshot::decode(json!(42)),
            Err(BalloonError::UnexpectedShape)
        ));
    }

    #[test]
    fn test_tuple_too_short_is_skipped() {
        let snapshot = BalloonSnapshot::decode(json!([[1, 2], [1, 2, 3]])).unwrap();
        let balloons = extract_balloons_with_rng(&snapshot, &mut rng());
        assert_eq!(balloons.len(), 1);
        assert_eq!(balloons[0].altitude, Some(3.0));
        assert_eq!(balloons[0].lat, 1.0);
        assert_eq!(balloons[0].lng, 2.0);
    }

    #[test]
    fn test_tuple_id_and_callsign() {
        let snapshot =
            BalloonSnapshot::decode(json!(["junk", [12.345678, -45.6, 17000.5, 0.1]])).unwrap();
        let balloons = extract_balloons_with_rng(&snapshot, &mut rng());
        assert_eq!(balloons.len(), 1);
        let b = &balloons[0];
        assert_eq!(b.id, "balloon_12.3457_-45.6000");
        // index counts raw positions, including skipped ones
        assert_eq!(b.callsign.as_deref(), Some("Balloon-1"));
    }

    #[test]
    fn test_tuple_ids_collide_at_same_rounded_position() {
        let snapshot =
            BalloonSnapshot::decode(json!([[10.00001, 20.0, 1], [10.00002, 20.0, 2]])).unwrap();
        let balloons = extract_balloons_with_rng(&snapshot, &mut rng());
        assert_eq!(balloons.len(), 2);
        assert_eq!(balloons[0].id, balloons[1].id);
    }

    #[test]
    fn test_generated_fields_in_range() {
        let items: Vec<Value> = (0..50).map(|i| json!([i as f64, 0.0, 100.0])).collect();
        let snapshot = BalloonSnapshot::Tuples(items);
        for b in extract_balloons_with_rng(&snapshot, &mut rng()) {
            let f = b.frequency_mhz.unwrap();
            assert!((FREQUENCY_MIN_MHZ..=FREQUENCY_MAX_MHZ).contains(&f));
            assert!((1..=3).contains(&b.tags.len()));
            assert!(b.tags.iter().all(|t| GENRES.contains(&t.as_str())));
            let mut unique = b.tags.clone();
            unique.sort();
            unique.dedup();
            assert_eq!(unique.len(), b.tags.len());
        }
    }

    #[test]
    fn test_keyed_shape_uses_key_and_upstream_fields() {
        let snapshot = BalloonSnapshot::decode(json!({
            "zeta": {"lat": 1.5, "lng": 2.5, "alt": 900.0, "time": "2024-01-01T00:00:00Z",
                     "callsign": "WB-1", "frequency": 99.9, "tags": ["Jazz", "Jazz", "Soul"]},
            "alpha": {"lat": 3.0, "lng": 4.0},
            "broken": {"lat": "north", "lng": 4.0},
            "scalar": 12
        }))
        .unwrap();
        let balloons = extract_balloons_with_rng(&snapshot, &mut rng());
        assert_eq!(balloons.len(), 2);

        let zeta = &balloons[0];
        assert_eq!(zeta.id, "zeta");
        assert_eq!(zeta.altitude, Some(900.0));
        assert_eq!(zeta.time.as_deref(), Some("2024-01-01T00:00:00Z"));
        assert_eq!(zeta.callsign.as_deref(), Some("WB-1"));
        assert_eq!(zeta.frequency_mhz, Some(99.9));
        assert_eq!(zeta.tags, vec!["Jazz", "Soul"]);

        let alpha = &balloons[1];
        assert_eq!(alpha.id, "alpha");
        assert_eq!(alpha.callsign.as_deref(), Some("Balloon-alpha"));
        assert!(alpha.altitude.is_none());
        assert!(alpha.frequency_mhz.is_some());
        assert!(!alpha.tags.is_empty());
    }

    #[test]
    fn test_fallback_set_is_fixed() {
        let ids: Vec<String> = fallback_balloons().into_iter().map(|b| b.id).collect();
        assert_eq!(
            ids,
            vec!["fallback-1", "fallback-2", "fallback-3", "fallback-4", "fallback-5"]
        );
        let fallback = fallback_balloons();
        let first = &fallback[0];
        assert_eq!(first.callsign.as_deref(), Some("NYC-Balloon"));
        assert_eq!(first.frequency_mhz, Some(91.3));
        assert_eq!(first.tags, vec!["Jazz", "News"]);
    }
}
