#![allow(dead_code)]

use axum::Router;
use skyradio_proto::config::StationsConfig;

/// Serve `router` on an ephemeral local port and return its base URL.
pub async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind fixture listener");
    let addr = listener.local_addr().expect("fixture address");
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    format!("http://{}", addr)
}

pub fn client() -> reqwest::Client {
    let config = StationsConfig {
        request_timeout_secs: 5,
        ..StationsConfig::default()
    };
    skyradio_proto::stations::build_client(&config).expect("client should initialize")
}

/// A port nothing listens on.
pub fn dead_url(path: &str) -> String {
    format!("http://127.0.0.1:9{}", path)
}
