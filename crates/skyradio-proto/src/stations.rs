//! Radio station catalog aggregation.
//!
//! Stations come from several radio-browser mirrors queried in parallel.
//! Each mirror is an independent source: a failing mirror contributes nothing
//! and never fails the whole aggregation.

use std::collections::HashSet;
use std::time::Duration;

use futures_util::future::join_all;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, info, warn};

use crate::config::StationsConfig;
use crate::geo::LatLng;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct StationRecord {
    pub uuid: String,
    pub name: String,
    pub stream_url: String,
    pub resolved_stream_url: String,
    pub favicon: String,
    pub country_code: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub click_count: i64,
    pub is_segmented_stream: bool,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl StationRecord {
    /// URL handed to the player: the resolved stream when the catalog has
    /// one, otherwise the raw stream URL.
    pub fn playable_url(&self) -> Option<&str> {
        let resolved = self.resolved_stream_url.trim();
        if !resolved.is_empty() {
            return Some(resolved);
        }
        let raw = self.stream_url.trim();
        if raw.is_empty() {
            None
        } else {
            Some(raw)
        }
    }

    pub fn position(&self) -> Option<LatLng> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lng)) => Some(LatLng::new(lat, lng)),
            _ => None,
        }
    }
}

/// Station object as returned by the radio-browser search endpoint.
#[derive(Debug, Deserialize)]
struct WireStation {
    stationuuid: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    url_resolved: Option<String>,
    #[serde(default)]
    favicon: Option<String>,
    #[serde(default)]
    countrycode: Option<String>,
    #[serde(default)]
    geo_lat: Option<f64>,
    #[serde(default)]
    geo_long: Option<f64>,
    #[serde(default)]
    tags: Option<String>,
    #[serde(default)]
    clickcount: Option<i64>,
    #[serde(default, deserialize_with = "de_flag")]
    hls: bool,
}

/// radio-browser encodes booleans as 0/1; tolerate real booleans too.
fn de_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Bool(b) => b,
        serde_json::Value::Number(n) => n.as_i64().unwrap_or(0) != 0,
        _ => false,
    })
}

impl From<WireStation> for StationRecord {
    fn from(w: WireStation) -> Self {
        let tags = w
            .tags
            .unwrap_or_default()
            .split(',')
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();

        Self {
            uuid: w.stationuuid,
            name: w.name,
            stream_url: w.url,
            resolved_stream_url: w.url_resolved.unwrap_or_default(),
            favicon: w.favicon.unwrap_or_default(),
            country_code: w.countrycode.unwrap_or_default(),
            latitude: w.geo_lat,
            longitude: w.geo_long,
            click_count: w.clickcount.unwrap_or(0),
            is_segmented_stream: w.hls,
            tags,
        }
    }
}

/// Decode a catalog body: a JSON array of station objects.
pub fn parse_catalog(body: &[u8]) -> Result<Vec<StationRecord>, serde_json::Error> {
    let wire: Vec<WireStation> = serde_json::from_slice(body)?;
    Ok(wire.into_iter().map(StationRecord::from).collect())
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("HTTP {0}")]
    Status(reqwest::StatusCode),
    #[error("unexpected catalog shape: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AggregateOutcome {
    /// At least one geolocated station was loaded.
    Loaded,
    /// Some sources answered but none of their stations had coordinates.
    NoGeolocatedStations,
    /// Every source failed.
    AllSourcesFailed,
}

#[derive(Debug, Clone)]
pub struct StationAggregate {
    pub stations: Vec<StationRecord>,
    pub sources_ok: usize,
    pub sources_failed: usize,
    pub outcome: AggregateOutcome,
}

impl StationAggregate {
    pub fn summary(&self) -> String {
        match self.outcome {
            AggregateOutcome::Loaded => format!(
                "Successfully loaded {} unique radio stations ({} of {} sources)",
                self.stations.len(),
                self.sources_ok,
                self.sources_ok + self.sources_failed
            ),
            AggregateOutcome::NoGeolocatedStations => {
                "Fetched station data, but none had valid location info".to_string()
            }
            AggregateOutcome::AllSourcesFailed => {
                "Failed to fetch any radio station data".to_string()
            }
        }
    }
}

/// Merge per-source results.  `None` marks a failed source.
///
/// Order of `results` is endpoint order; the first occurrence of a uuid wins.
pub fn merge_catalogs(results: Vec<Option<Vec<StationRecord>>>) -> StationAggregate {
    let mut sources_ok = 0usize;
    let mut sources_failed = 0usize;
    let mut seen: HashSet<String> = HashSet::new();
    let mut unique = Vec::new();

    for result in results {
        match result {
            Some(batch) => {
                sources_ok += 1;
                for station in batch {
                    if seen.insert(station.uuid.clone()) {
                        unique.push(station);
                    }
                }
            }
            None => sources_failed += 1,
        }
    }

    let before = unique.len();
    let stations: Vec<StationRecord> = unique
        .into_iter()
        .filter(|s| s.latitude.is_some() && s.longitude.is_some())
        .collect();
    debug!(
        "merge: {} unique, {} without coordinates dropped",
        before,
        before - stations.len()
    );

    let outcome = if !stations.is_empty() {
        AggregateOutcome::Loaded
    } else if sources_ok > 0 {
        AggregateOutcome::NoGeolocatedStations
    } else {
        AggregateOutcome::AllSourcesFailed
    };

    StationAggregate {
        stations,
        sources_ok,
        sources_failed,
        outcome,
    }
}

pub fn build_client(config: &StationsConfig) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(config.user_agent.clone())
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .build()
}

pub async fn fetch_catalog(
    client: &reqwest::Client,
    url: &str,
) -> Result<Vec<StationRecord>, SourceError> {
    let response = client
        .get(url)
        .header("Accept", "application/json")
        .send()
        .await?;
    if !response.status().is_success() {
        return Err(SourceError::Status(response.status()));
    }
    let body = response.bytes().await?;
    Ok(parse_catalog(&body)?)
}

/// Query every endpoint concurrently and merge whatever comes back.
pub async fn aggregate_stations(client: &reqwest::Client, endpoints: &[String]) -> StationAggregate {
    info!("Fetching radio stations from {} sources", endpoints.len());

    let fetches = endpoints.iter().map(|url| async move {
        match fetch_catalog(client, url).await {
            Ok(batch) => {
                debug!("catalog {} returned {} stations", url, batch.len());
                Some(batch)
            }
            Err(e) => {
                warn!("catalog {} failed: {}", url, e);
                None
            }
        }
    });
    let results = join_all(fetches).await;

    let aggregate = merge_catalogs(results);
    match aggregate.outcome {
        AggregateOutcome::Loaded => info!("{}", aggregate.summary()),
        _ => warn!("{}", aggregate.summary()),
    }
    aggregate
}

/// Report a station click to the catalog.  Fire-and-forget: the returned
/// handle may be dropped, failures are only logged.
pub fn log_station_click(
    client: reqwest::Client,
    base_url: &str,
    uuid: &str,
) -> tokio::task::JoinHandle<()> {
    let url = format!("{}/json/url/{}", base_url.trim_end_matches('/'), uuid);
    let uuid = uuid.to_string();
    tokio::spawn(async move {
        match client.post(&url).send().await {
            Ok(resp) if resp.status().is_success() => debug!("click logged for {}", uuid),
            Ok(resp) => warn!("click log for {} returned HTTP {}", uuid, resp.status()),
            Err(e) => warn!("Failed to log station click for {}: {}", uuid, e),
        }
    })
}
