use crate::core::DaemonEvent;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Serialize;
use skyradio_proto::balloons::{BalloonRecord, BalloonSource};
use skyradio_proto::protocol::{Command, SkyState};
use skyradio_proto::ranker::RankedStation;
use skyradio_proto::state::StateManager;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

#[derive(Clone)]
struct HttpState {
    state_manager: StateManager,
    event_tx: mpsc::Sender<DaemonEvent>,
}

#[derive(Serialize)]
struct BalloonsResponse {
    hour: u8,
    loading: bool,
    source: Option<BalloonSource>,
    balloons: Vec<BalloonRecord>,
}

#[derive(Serialize)]
struct NearbyResponse {
    balloon: Option<BalloonRecord>,
    stations: Vec<RankedStation>,
}

pub fn router(state_manager: StateManager, event_tx: mpsc::Sender<DaemonEvent>) -> Router {
    Router::new()
        .route("/api/state", get(get_state))
        .route("/api/balloons", get(get_balloons))
        .route("/api/nearby", get(get_nearby))
        .route("/api/hour/:hour", post(load_hour))
        .route("/api/stations/refresh", post(refresh_stations))
        .route("/api/select/:id", post(select_balloon))
        .route("/api/deselect", post(deselect))
        .route("/api/play/:uuid", post(play_station))
        .route("/api/stop", post(stop))
        .route("/api/random-hop", post(random_hop))
        .layer(CorsLayer::permissive())
        .with_state(HttpState {
            state_manager,
            event_tx,
        })
}

pub fn start_server(
    bind_address: String,
    port: u16,
    state_manager: StateManager,
    event_tx: mpsc::Sender<DaemonEvent>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let app = router(state_manager, event_tx);

        let addr = format!("{}:{}", bind_address, port);
        let listener = match TcpListener::bind(&addr).await {
            Ok(l) => l,
            Err(e) => {
                error!("Failed to bind HTTP server to {}: {}", addr, e);
                return;
            }
        };

        info!("HTTP API server listening on http://{}", addr);

        if let Err(e) = axum::serve(listener, app).await {
            error!("HTTP server error: {}", e);
        }
    })
}

async fn forward(state: &HttpState, cmd: Command) -> StatusCode {
    info!("HTTP API: {:?}", cmd);
    if state
        .event_tx
        .send(DaemonEvent::ClientCommand(cmd))
        .await
        .is_err()
    {
        error!("Failed to forward command, core is gone");
        return StatusCode::INTERNAL_SERVER_ERROR;
    }
    StatusCode::ACCEPTED
}

async fn get_state(State(state): State<HttpState>) -> Json<SkyState> {
    Json(state.state_manager.get_state().await)
}

async fn get_balloons(State(state): State<HttpState>) -> Json<BalloonsResponse> {
    let sky = state.state_manager.get_state().await;
    Json(BalloonsResponse {
        hour: sky.hour,
        loading: sky.balloons_loading,
        source: sky.balloon_source,
        balloons: sky.balloons,
    })
}

async fn get_nearby(State(state): State<HttpState>) -> Json<NearbyResponse> {
    let sky = state.state_manager.get_state().await;
    Json(NearbyResponse {
        balloon: sky.selected_balloon,
        stations: sky.nearby,
    })
}

async fn load_hour(State(state): State<HttpState>, Path(hour): Path<u8>) -> StatusCode {
    if hour > 23 {
        return StatusCode::BAD_REQUEST;
    }
    forward(&state, Command::LoadHour { hour }).await
}

async fn refresh_stations(State(state): State<HttpState>) -> StatusCode {
    forward(&state, Command::RefreshStations).await
}

async fn select_balloon(State(state): State<HttpState>, Path(id): Path<String>) -> StatusCode {
    forward(&state, Command::SelectBalloon { id }).await
}

async fn deselect(State(state): State<HttpState>) -> StatusCode {
    forward(&state, Command::ClearSelection).await
}

async fn play_station(State(state): State<HttpState>, Path(uuid): Path<String>) -> StatusCode {
    forward(&state, Command::Play { uuid }).await
}

async fn stop(State(state): State<HttpState>) -> StatusCode {
    forward(&state, Command::Stop).await
}

async fn random_hop(State(state): State<HttpState>) -> StatusCode {
    forward(&state, Command::RandomHop).await
}
