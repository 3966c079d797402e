use crate::balloons::{BalloonLoad, BalloonRecord};
use crate::protocol::{Notice, PlaybackView, SkyState, StationsView};
use crate::ranker::RankedStation;
use crate::stations::StationAggregate;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Shared, read-mostly copy of the core's state.  The core is the only
/// writer; every setter bumps `rev`.
#[derive(Clone)]
pub struct StateManager {
    state: Arc<RwLock<SkyState>>,
}

impl StateManager {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(SkyState {
                rev: 1,
                ..SkyState::default()
            })),
        }
    }

    pub async fn get_state(&self) -> SkyState {
        self.state.read().await.clone()
    }

    pub async fn set_balloons_loading(&self, hour: u8) {
        let mut state = self.state.write().await;
        state.hour = hour;
        state.balloons_loading = true;
        state.rev += 1;
    }

    pub async fn set_balloons(&self, load: &BalloonLoad) {
        let mut state = self.state.write().await;
        state.hour = load.hour;
        state.balloons_loading = false;
        state.balloons = load.balloons.clone();
        state.balloon_source = Some(load.source.clone());
        state.rev += 1;
    }

    pub async fn set_stations_loading(&self) {
        let mut state = self.state.write().await;
        state.stations.loading = true;
        state.rev += 1;
    }

    pub async fn set_stations(&self, aggregate: &StationAggregate) {
        let mut state = self.state.write().await;
        state.stations = StationsView {
            loading: false,
            count: aggregate.stations.len(),
            sources_ok: aggregate.sources_ok,
            sources_failed: aggregate.sources_failed,
            outcome: Some(aggregate.outcome),
        };
        state.rev += 1;
    }

    pub async fn set_selection(&self, selected: Option<BalloonRecord>, nearby: Vec<RankedStation>) {
        let mut state = self.state.write().await;
        state.selected_balloon = selected;
        state.nearby = nearby;
        state.rev += 1;
    }

    pub async fn set_playback(&self, playback: PlaybackView) {
        let mut state = self.state.write().await;
        if state.playback != playback {
            state.playback = playback;
            state.rev += 1;
        }
    }

    pub async fn set_notice(&self, notice: impl Into<String>) {
        let mut state = self.state.write().await;
        state.last_notice = Some(Notice::now(notice));
        state.rev += 1;
    }
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}
