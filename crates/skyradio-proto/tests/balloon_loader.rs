mod common;

use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use skyradio_proto::balloons::{load_balloons, BalloonError, BalloonSource, FREQUENCY_MAX_MHZ, FREQUENCY_MIN_MHZ};

fn snapshots() -> Router {
    Router::new()
        .route(
            "/treasure/03.json",
            get(|| async {
                "[[12.5, -45.25, 18000.0], [null, 3.0, 1.0], [1.0, 2.0], [-20.0, 100.0, 15000.0, 9]]"
            }),
        )
        .route(
            "/treasure/05.json",
            get(|| async {
                r#"{
                    "zeta": {"lat": 10.0, "lng": 20.0, "alt": 9000, "callsign": "Z-1",
                             "frequency": 99.9, "tags": ["Jazz", "Jazz", "News"]},
                    "alpha": {"lat": -5.0, "lng": 7.5},
                    "broken": {"lat": "north", "lng": 1.0}
                }"#
            }),
        )
        .route(
            "/treasure/06.json",
            get(|| async { (StatusCode::SERVICE_UNAVAILABLE, "busy") }),
        )
        .route("/treasure/07.json", get(|| async { "{\"truncated\": [" }))
        .route("/treasure/08.json", get(|| async { "[]" }))
}

#[tokio::test]
async fn tuple_snapshot_is_live() {
    let base = common::serve(snapshots()).await;
    let load = load_balloons(&common::client(), &format!("{base}/treasure"), 3)
        .await
        .unwrap();

    assert_eq!(load.source, BalloonSource::Live);
    assert_eq!(load.hour, 3);
    assert_eq!(load.balloons.len(), 2);
    assert_eq!(load.balloons[0].lat, 12.5);
    assert_eq!(load.balloons[0].altitude, Some(18000.0));
    assert_eq!(load.balloons[1].lng, 100.0);
    for balloon in &load.balloons {
        let freq = balloon.frequency_mhz.unwrap();
        assert!((FREQUENCY_MIN_MHZ..=FREQUENCY_MAX_MHZ).contains(&freq));
        assert!((1..=3).contains(&balloon.tags.len()));
    }
}

#[tokio::test]
async fn keyed_snapshot_keeps_key_order() {
    let base = common::serve(snapshots()).await;
    let load = load_balloons(&common::client(), &format!("{base}/treasure"), 5)
        .await
        .unwrap();

    assert_eq!(load.source, BalloonSource::Live);
    let ids: Vec<&str> = load.balloons.iter().map(|b| b.id.as_str()).collect();
    assert_eq!(ids, vec!["zeta", "alpha"]);

    let zeta = &load.balloons[0];
    assert_eq!(zeta.callsign.as_deref(), Some("Z-1"));
    assert_eq!(zeta.frequency_mhz, Some(99.9));
    assert_eq!(zeta.tags, vec!["Jazz".to_string(), "News".to_string()]);
    assert_eq!(load.balloons[1].callsign.as_deref(), Some("Balloon-alpha"));
}

#[tokio::test]
async fn empty_snapshot_is_live_and_empty() {
    let base = common::serve(snapshots()).await;
    let load = load_balloons(&common::client(), &format!("{base}/treasure"), 8)
        .await
        .unwrap();

    assert_eq!(load.source, BalloonSource::Live);
    assert!(load.balloons.is_empty());
}

#[tokio::test]
async fn unavailable_snapshot_falls_back() {
    let base = common::serve(snapshots()).await;
    let client = common::client();

    for hour in [6u8, 7, 12] {
        let load = load_balloons(&client, &format!("{base}/treasure"), hour)
            .await
            .unwrap();
        assert!(load.source.is_fallback(), "hour {hour} should fall back");
        assert_eq!(load.balloons.len(), 5);
        assert_eq!(load.balloons[0].callsign.as_deref(), Some("NYC-Balloon"));
    }

    let load = load_balloons(&client, &common::dead_url("/treasure"), 0)
        .await
        .unwrap();
    assert!(load.source.is_fallback());
}

#[tokio::test]
async fn out_of_range_hour_is_rejected() {
    let result = load_balloons(&common::client(), "http://127.0.0.1:9", 24).await;
    assert!(matches!(result, Err(BalloonError::InvalidHour(24))));
}
