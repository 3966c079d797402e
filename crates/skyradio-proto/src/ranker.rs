use serde::{Deserialize, Serialize};

use crate::balloons::BalloonRecord;
use crate::geo::haversine_km;
use crate::stations::StationRecord;

/// A station paired with its distance from the selected balloon.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RankedStation {
    #[serde(flatten)]
    pub station: StationRecord,
    pub distance_km: f64,
}

/// Stations within `radius_km` of the balloon, most clicked first.
///
/// Distance only filters; it is not a sort key.  Equal click counts keep the
/// order the stations had in `stations`.
pub fn rank_nearby(
    balloon: &BalloonRecord,
    stations: &[StationRecord],
    radius_km: f64,
    max_results: usize,
) -> Vec<RankedStation> {
    let origin = balloon.position();

    let mut nearby: Vec<RankedStation> = stations
        .iter()
        .filter_map(|station| {
            let position = station.position()?;
            let distance_km = haversine_km(origin, position);
            (distance_km <= radius_km).then(|| RankedStation {
                station: station.clone(),
                distance_km,
            })
        })
        .collect();

    // sort_by is stable
    nearby.sort_by(|a, b| b.station.click_count.cmp(&a.station.click_count));
    nearby.truncate(max_results);
    nearby
}

/// First ranked station that has something to play.
pub fn first_playable(ranked: &[RankedStation]) -> Option<&RankedStation> {
    ranked.iter().find(|r| r.station.playable_url().is_some())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn balloon_at(lat: f64, lng: f64) -> BalloonRecord {
        BalloonRecord {
            id: "b".to_string(),
            lat,
            lng,
            ..BalloonRecord::default()
        }
    }

    fn station(uuid: &str, lat: f64, lng: f64, clicks: i64) -> StationRecord {
        StationRecord {
            uuid: uuid.to_string(),
            stream_url: format!("http://stream/{uuid}"),
            latitude: Some(lat),
            longitude: Some(lng),
            click_count: clicks,
            ..StationRecord::default()
        }
    }

    #[test]
    fn test_distance_zero_at_same_point() {
        let ranked = rank_nearby(&balloon_at(0.0, 0.0), &[station("s", 0.0, 0.0, 1)], 500.0, 10);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].distance_km, 0.0);
    }

    #[test]
    fn test_filters_by_radius() {
        let stations = vec![
            station("near", 0.0, 1.0, 1),    // ~111 km
            station("far", 0.0, 10.0, 1000), // ~1112 km
        ];
        let ranked = rank_nearby(&balloon_at(0.0, 0.0), &stations, 500.0, 10);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].station.uuid, "near");
        assert!(ranked.iter().all(|r| r.distance_km <= 500.0));
    }

    #[test]
    fn test_excludes_missing_coordinates() {
        let mut no_geo = station("nogeo", 0.0, 0.0, 99);
        no_geo.longitude = None;
        let ranked = rank_nearby(&balloon_at(0.0, 0.0), &[no_geo], 500.0, 10);
        assert!(ranked.is_empty());
    }

    #[test]
    fn test_sorted_by_clicks_not_distance() {
        let stations = vec![
            station("close-quiet", 0.0, 0.1, 5),
            station("far-popular", 0.0, 3.0, 500),
            station("mid", 0.0, 1.0, 50),
        ];
        let ranked = rank_nearby(&balloon_at(0.0, 0.0), &stations, 500.0, 10);
        let order: Vec<&str> = ranked.iter().map(|r| r.station.uuid.as_str()).collect();
        assert_eq!(order, vec!["far-popular", "mid", "close-quiet"]);
    }

    #[test]
    fn test_stable_for_equal_clicks() {
        let stations = vec![
            station("first", 0.0, 2.0, 7),
            station("outside", 0.0, 20.0, 7),
            station("second", 0.0, 0.5, 7),
            station("third", 0.0, 1.0, 7),
        ];
        let ranked = rank_nearby(&balloon_at(0.0, 0.0), &stations, 500.0, 10);
        let order: Vec<&str> = ranked.iter().map(|r| r.station.uuid.as_str()).collect();
        assert_eq!(order, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_truncates_to_max_results() {
        let stations: Vec<StationRecord> = (0..25)
            .map(|i| station(&format!("s{i}"), 0.0, 0.01 * i as f64, i))
            .collect();
        let ranked = rank_nearby(&balloon_at(0.0, 0.0), &stations, 500.0, 10);
        assert_eq!(ranked.len(), 10);
        assert_eq!(ranked[0].station.uuid, "s24");
    }

    #[test]
    fn test_first_playable_skips_missing_url() {
        let mut silent = station("silent", 0.0, 0.0, 100);
        silent.stream_url.clear();
        let ranked = rank_nearby(
            &balloon_at(0.0, 0.0),
            &[silent, station("live", 0.0, 0.0, 1)],
            500.0,
            10,
        );
        assert_eq!(first_playable(&ranked).map(|r| r.station.uuid.as_str()), Some("live"));
    }
}
