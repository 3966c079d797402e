/// DaemonCore: single-owner event loop for all mutable state.
///
/// The balloon list, the station set, the selection with its nearby ranking
/// and the playback controller live here and nowhere else.  HTTP handlers,
/// background refresh tasks and the mpv forwarder only ever send
/// `DaemonEvent`s into this loop.
///
/// Refreshes run as spawned tasks tagged with a `RefreshToken`; a result is
/// applied only if no newer refresh of the same resource was started since.
///
/// After each event the core republishes a `SkyState` snapshot through the
/// shared `StateManager`.
use rand::seq::SliceRandom;
use skyradio_proto::balloons::{load_balloons, BalloonLoad, BalloonRecord, BalloonSource};
use skyradio_proto::config::Config;
use skyradio_proto::playback::{PlaybackController, ToggleOutcome, Transport, TransportEvent};
use skyradio_proto::protocol::Command;
use skyradio_proto::ranker::{first_playable, rank_nearby, RankedStation};
use skyradio_proto::refresh::{RefreshSequencer, RefreshToken};
use skyradio_proto::state::StateManager;
use skyradio_proto::stations::{
    aggregate_stations, build_client, log_station_click, StationAggregate,
    StationRecord,
};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

// ── DaemonEvent ───────────────────────────────────────────────────────────────

/// All inputs into the DaemonCore loop.
#[derive(Debug)]
pub enum DaemonEvent {
    /// A command from the HTTP API.
    ClientCommand(Command),
    BalloonsLoaded {
        token: RefreshToken,
        load: BalloonLoad,
    },
    StationsLoaded {
        token: RefreshToken,
        aggregate: StationAggregate,
    },
    /// Progress or fault from the playback transport.
    Transport(TransportEvent),
    /// Periodic player liveness check.
    HeartbeatTick,
    Shutdown,
}

// ── DaemonCore ────────────────────────────────────────────────────────────────

pub struct DaemonCore<T: Transport> {
    config: Config,
    state_manager: StateManager,
    playback: PlaybackController<T>,
    client: reqwest::Client,
    event_tx: mpsc::Sender<DaemonEvent>,
    balloon_refresh: RefreshSequencer,
    station_refresh: RefreshSequencer,
    balloons: Vec<BalloonRecord>,
    stations: Vec<StationRecord>,
    stations_loading: bool,
    selected: Option<BalloonRecord>,
    nearby: Vec<RankedStation>,
    /// Random hop selected a balloon before stations arrived.
    hop_pending: bool,
}

impl<T: Transport> DaemonCore<T> {
    pub fn new(config: Config, transport: T, event_tx: mpsc::Sender<DaemonEvent>) -> anyhow::Result<Self> {
        let client = build_client(&config.stations)?;
        Ok(Self {
            config,
            state_manager: StateManager::new(),
            playback: PlaybackController::new(transport),
            client,
            event_tx,
            balloon_refresh: RefreshSequencer::new("balloons"),
            station_refresh: RefreshSequencer::new("stations"),
            balloons: Vec::new(),
            stations: Vec::new(),
            stations_loading: false,
            selected: None,
            nearby: Vec::new(),
            hop_pending: false,
        })
    }

    pub fn state_manager(&self) -> StateManager {
        self.state_manager.clone()
    }

    /// Run the core event loop.  Returns when a `Shutdown` event is received
    /// or every sender is gone.
    pub async fn run(mut self, mut event_rx: mpsc::Receiver<DaemonEvent>) -> anyhow::Result<()> {
        info!("DaemonCore: starting event loop");

        let heartbeat_tx = self.event_tx.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(tokio::time::Duration::from_secs(10)).await;
                if heartbeat_tx.send(DaemonEvent::HeartbeatTick).await.is_err() {
                    break;
                }
            }
        });

        self.start_balloon_refresh(0).await;
        self.start_station_refresh().await;

        while let Some(evt) = event_rx.recv().await {
            if !self.handle_event(evt).await {
                info!("DaemonCore: shutdown requested");
                break;
            }
        }

        self.playback.stop().await;
        self.sync_playback().await;
        info!("DaemonCore: stopped");
        Ok(())
    }

    /// Apply one event.  Returns `false` when the loop should exit.
    pub async fn handle_event(&mut self, evt: DaemonEvent) -> bool {
        match evt {
            DaemonEvent::Shutdown => return false,
            DaemonEvent::ClientCommand(cmd) => {
                info!("DaemonCore: command {:?}", cmd);
                if let Err(e) = self.handle_command(cmd).await {
                    error!("DaemonCore: command error: {}", e);
                    self.state_manager.set_notice(e.to_string()).await;
                }
            }
            DaemonEvent::BalloonsLoaded { token, load } => self.apply_balloons(token, load).await,
            DaemonEvent::StationsLoaded { token, aggregate } => {
                self.apply_stations(token, aggregate).await
            }
            DaemonEvent::Transport(evt) => self.playback.handle_event(evt).await,
            DaemonEvent::HeartbeatTick => self.playback.heartbeat().await,
        }
        self.sync_playback().await;
        true
    }

    // ── refreshes ─────────────────────────────────────────────────────────────

    pub async fn start_balloon_refresh(&mut self, hour: u8) -> RefreshToken {
        let token = self.balloon_refresh.begin();
        self.clear_selection().await;
        self.state_manager.set_balloons_loading(hour).await;

        let client = self.client.clone();
        let base_url = self.config.balloons.base_url.clone();
        let tx = self.event_tx.clone();
        tokio::spawn(async move {
            match load_balloons(&client, &base_url, hour).await {
                Ok(load) => {
                    let _ = tx.send(DaemonEvent::BalloonsLoaded { token, load }).await;
                }
                Err(e) => warn!("balloon refresh for hour {} failed: {}", hour, e),
            }
        });
        token
    }

    pub async fn start_station_refresh(&mut self) -> RefreshToken {
        let token = self.station_refresh.begin();
        self.stations_loading = true;
        self.state_manager.set_stations_loading().await;

        let client = self.client.clone();
        let endpoints = self.config.stations.endpoints.clone();
        let tx = self.event_tx.clone();
        tokio::spawn(async move {
            let aggregate = aggregate_stations(&client, &endpoints).await;
            let _ = tx.send(DaemonEvent::StationsLoaded { token, aggregate }).await;
        });
        token
    }

    async fn apply_balloons(&mut self, token: RefreshToken, load: BalloonLoad) {
        if !self.balloon_refresh.is_current(token) {
            return;
        }

        let notice = match &load.source {
            BalloonSource::Fallback { .. } => {
                "Could not load live balloon data, showing sample balloons".to_string()
            }
            BalloonSource::Live if load.balloons.is_empty() => {
                "No balloon data available for this time".to_string()
            }
            BalloonSource::Live => format!(
                "Loaded {} balloons for {:02}:00",
                load.balloons.len(),
                load.hour
            ),
        };

        self.state_manager.set_balloons(&load).await;
        self.balloons = load.balloons;
        self.state_manager.set_notice(notice).await;
    }

    async fn apply_stations(&mut self, token: RefreshToken, aggregate: StationAggregate) {
        if !self.station_refresh.is_current(token) {
            return;
        }

        self.stations_loading = false;
        self.state_manager.set_stations(&aggregate).await;
        self.state_manager.set_notice(aggregate.summary()).await;
        self.stations = aggregate.stations;
        self.publish_selection().await;

        if self.hop_pending {
            self.hop_pending = false;
            self.play_first_nearby().await;
        }
    }

    // ── selection ─────────────────────────────────────────────────────────────

    /// Recompute the nearby ranking for the current selection and publish it.
    async fn publish_selection(&mut self) {
        self.nearby = match &self.selected {
            Some(balloon) => rank_nearby(
                balloon,
                &self.stations,
                self.config.search.radius_km,
                self.config.search.max_results,
            ),
            None => Vec::new(),
        };
        if let Some(balloon) = &self.selected {
            debug!(
                "{} stations within {} km of {}",
                self.nearby.len(),
                self.config.search.radius_km,
                balloon.display_name()
            );
        }
        self.state_manager
            .set_selection(self.selected.clone(), self.nearby.clone())
            .await;
    }

    async fn clear_selection(&mut self) {
        self.hop_pending = false;
        if self.selected.take().is_some() || !self.nearby.is_empty() {
            self.publish_selection().await;
        }
    }

    fn find_station(&self, uuid: &str) -> Option<StationRecord> {
        self.nearby
            .iter()
            .map(|r| &r.station)
            .chain(self.stations.iter())
            .find(|s| s.uuid == uuid)
            .cloned()
    }

    // ── command handlers ──────────────────────────────────────────────────────

    async fn handle_command(&mut self, cmd: Command) -> anyhow::Result<()> {
        match cmd {
            Command::LoadHour { hour } => {
                if hour > 23 {
                    anyhow::bail!("Hour must be between 0 and 23, got {}", hour);
                }
                self.start_balloon_refresh(hour).await;
            }
            Command::RefreshStations => {
                self.start_station_refresh().await;
            }
            Command::SelectBalloon { id } => self.select_balloon(&id).await?,
            Command::ClearSelection => {
                self.clear_selection().await;
                self.playback.stop().await;
            }
            Command::Play { uuid } => self.play(&uuid).await?,
            Command::Stop => self.playback.stop().await,
            Command::RandomHop => self.random_hop().await,
        }
        Ok(())
    }

    async fn select_balloon(&mut self, id: &str) -> anyhow::Result<()> {
        self.hop_pending = false;
        if self.selected.as_ref().is_some_and(|b| b.id == id) {
            self.clear_selection().await;
            return Ok(());
        }
        let balloon = self
            .balloons
            .iter()
            .find(|b| b.id == id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("Unknown balloon {}", id))?;
        info!("Selected balloon {}", balloon.display_name());
        self.selected = Some(balloon);
        self.publish_selection().await;
        Ok(())
    }

    async fn play(&mut self, uuid: &str) -> anyhow::Result<()> {
        let station = self
            .find_station(uuid)
            .ok_or_else(|| anyhow::anyhow!("Unknown station {}", uuid))?;

        match self.playback.toggle(&station).await? {
            ToggleOutcome::Started => {
                info!("Playing station: {}", station.name);
                log_station_click(self.client.clone(), &self.config.stations.click_base_url, uuid);
            }
            ToggleOutcome::Stopped => info!("Stopped station: {}", station.name),
        }
        Ok(())
    }

    async fn random_hop(&mut self) {
        self.playback.stop().await;

        let Some(balloon) = self.balloons.choose(&mut rand::thread_rng()).cloned() else {
            self.state_manager.set_notice("No balloons available to hop to").await;
            return;
        };

        self.state_manager
            .set_notice(format!(
                "Hopped to {}! Searching stations...",
                balloon.display_name()
            ))
            .await;
        self.selected = Some(balloon);
        self.publish_selection().await;

        if self.nearby.is_empty() && self.stations_loading {
            debug!("random hop waiting for stations");
            self.hop_pending = true;
            return;
        }
        self.play_first_nearby().await;
    }

    async fn play_first_nearby(&mut self) {
        let Some(station) = first_playable(&self.nearby).map(|r| r.station.clone()) else {
            self.state_manager
                .set_notice("No playable station found for this balloon.")
                .await;
            return;
        };
        match self.playback.play(&station).await {
            Ok(()) => {
                info!("Random hop playing {}", station.name);
                log_station_click(
                    self.client.clone(),
                    &self.config.stations.click_base_url,
                    &station.uuid,
                );
            }
            Err(e) => self.state_manager.set_notice(e.to_string()).await,
        }
    }

    /// Publish playback status and any queued playback notices.
    async fn sync_playback(&mut self) {
        for notice in self.playback.drain_notices() {
            self.state_manager.set_notice(notice.message()).await;
        }
        self.state_manager.set_playback(self.playback.view()).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skyradio_proto::playback::{FaultKind, TransportError, TransportHandle, TransportKind};
    use skyradio_proto::protocol::PlaybackStatus;
    use skyradio_proto::stations::AggregateOutcome;

    #[derive(Default)]
    struct FakeTransport {
        next: u64,
        opened: Vec<String>,
        open_handles: usize,
    }

    impl Transport for FakeTransport {
        fn supports_segmented(&self) -> bool {
            false
        }

        async fn open(&mut self, url: &str, _kind: TransportKind) -> Result<TransportHandle, TransportError> {
            self.next += 1;
            self.opened.push(url.to_string());
            self.open_handles += 1;
            Ok(TransportHandle(self.next))
        }

        async fn close(&mut self, _handle: TransportHandle) {
            self.open_handles -= 1;
        }

        async fn reload(&mut self, _handle: TransportHandle) -> Result<(), TransportError> {
            Ok(())
        }

        async fn recover(&mut self, _handle: TransportHandle) -> Result<(), TransportError> {
            Ok(())
        }
    }

    fn test_config() -> Config {
        let mut config = Config::default();
        // nothing listens here; click logging fails quietly
        config.stations.click_base_url = "http://127.0.0.1:9".to_string();
        config.stations.endpoints = Vec::new();
        config.balloons.base_url = "http://127.0.0.1:9".to_string();
        config
    }

    fn core() -> (DaemonCore<FakeTransport>, mpsc::Receiver<DaemonEvent>) {
        let (tx, rx) = mpsc::channel(64);
        let core = DaemonCore::new(test_config(), FakeTransport::default(), tx).unwrap();
        (core, rx)
    }

    fn balloon(id: &str, lat: f64, lng: f64) -> BalloonRecord {
        BalloonRecord {
            id: id.to_string(),
            lat,
            lng,
            ..BalloonRecord::default()
        }
    }

    fn station(uuid: &str, lat: f64, lng: f64, clicks: i64) -> StationRecord {
        StationRecord {
            uuid: uuid.to_string(),
            name: uuid.to_uppercase(),
            stream_url: format!("http://radio/{uuid}"),
            latitude: Some(lat),
            longitude: Some(lng),
            click_count: clicks,
            ..StationRecord::default()
        }
    }

    fn live(hour: u8, balloons: Vec<BalloonRecord>) -> BalloonLoad {
        BalloonLoad {
            hour,
            balloons,
            source: BalloonSource::Live,
        }
    }

    fn loaded(stations: Vec<StationRecord>) -> StationAggregate {
        StationAggregate {
            stations,
            sources_ok: 1,
            sources_failed: 0,
            outcome: AggregateOutcome::Loaded,
        }
    }

    async fn seed(core: &mut DaemonCore<FakeTransport>) {
        let token = core.balloon_refresh.begin();
        core.handle_event(DaemonEvent::BalloonsLoaded {
            token,
            load: live(0, vec![balloon("b1", 0.0, 0.0), balloon("b2", 60.0, 60.0)]),
        })
        .await;
        let token = core.station_refresh.begin();
        core.handle_event(DaemonEvent::StationsLoaded {
            token,
            aggregate: loaded(vec![
                station("quiet", 0.0, 0.5, 5),
                station("popular", 0.0, 2.0, 900),
                station("far", 0.0, 40.0, 10_000),
            ]),
        })
        .await;
    }

    fn command(cmd: Command) -> DaemonEvent {
        DaemonEvent::ClientCommand(cmd)
    }

    #[tokio::test]
    async fn test_selection_ranks_nearby() {
        let (mut core, _rx) = core();
        seed(&mut core).await;

        core.handle_event(command(Command::SelectBalloon { id: "b1".into() })).await;
        let state = core.state_manager().get_state().await;
        assert_eq!(state.selected_balloon.as_ref().map(|b| b.id.as_str()), Some("b1"));
        let order: Vec<&str> = state.nearby.iter().map(|r| r.station.uuid.as_str()).collect();
        assert_eq!(order, vec!["popular", "quiet"]);

        // selecting it again deselects
        core.handle_event(command(Command::SelectBalloon { id: "b1".into() })).await;
        let state = core.state_manager().get_state().await;
        assert!(state.selected_balloon.is_none());
        assert!(state.nearby.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_balloon_sets_notice() {
        let (mut core, _rx) = core();
        seed(&mut core).await;
        core.handle_event(command(Command::SelectBalloon { id: "nope".into() })).await;
        let state = core.state_manager().get_state().await;
        assert!(state.selected_balloon.is_none());
        assert_eq!(state.last_notice.unwrap().message, "Unknown balloon nope");
    }

    #[tokio::test]
    async fn test_stale_station_refresh_is_discarded() {
        let (mut core, _rx) = core();
        let old = core.station_refresh.begin();
        let new = core.station_refresh.begin();

        core.handle_event(DaemonEvent::StationsLoaded {
            token: new,
            aggregate: loaded(vec![station("fresh", 0.0, 0.0, 1)]),
        })
        .await;
        core.handle_event(DaemonEvent::StationsLoaded {
            token: old,
            aggregate: loaded(vec![station("stale", 0.0, 0.0, 1), station("x", 1.0, 1.0, 1)]),
        })
        .await;

        assert_eq!(core.stations.len(), 1);
        assert_eq!(core.stations[0].uuid, "fresh");
        assert_eq!(core.state_manager().get_state().await.stations.count, 1);
    }

    #[tokio::test]
    async fn test_station_load_reports_summary() {
        let (mut core, _rx) = core();
        let token = core.station_refresh.begin();
        core.handle_event(DaemonEvent::StationsLoaded {
            token,
            aggregate: loaded(vec![station("a", 0.0, 0.0, 1), station("b", 1.0, 1.0, 2)]),
        })
        .await;
        let state = core.state_manager().get_state().await;
        assert_eq!(
            state.last_notice.unwrap().message,
            "Successfully loaded 2 unique radio stations (1 of 1 sources)"
        );

        let token = core.station_refresh.begin();
        core.handle_event(DaemonEvent::StationsLoaded {
            token,
            aggregate: StationAggregate {
                stations: Vec::new(),
                sources_ok: 0,
                sources_failed: 2,
                outcome: AggregateOutcome::AllSourcesFailed,
            },
        })
        .await;
        let state = core.state_manager().get_state().await;
        assert_eq!(
            state.last_notice.unwrap().message,
            "Failed to fetch any radio station data"
        );
    }

    #[tokio::test]
    async fn test_stale_balloon_refresh_is_discarded() {
        let (mut core, _rx) = core();
        let old = core.balloon_refresh.begin();
        let new = core.balloon_refresh.begin();

        core.handle_event(DaemonEvent::BalloonsLoaded {
            token: new,
            load: live(5, vec![balloon("new", 1.0, 1.0)]),
        })
        .await;
        core.handle_event(DaemonEvent::BalloonsLoaded {
            token: old,
            load: live(2, vec![balloon("old", 1.0, 1.0)]),
        })
        .await;

        let state = core.state_manager().get_state().await;
        assert_eq!(state.hour, 5);
        assert_eq!(state.balloons[0].id, "new");
    }

    #[tokio::test]
    async fn test_play_toggles_and_swaps() {
        let (mut core, _rx) = core();
        seed(&mut core).await;
        core.handle_event(command(Command::SelectBalloon { id: "b1".into() })).await;

        core.handle_event(command(Command::Play { uuid: "quiet".into() })).await;
        let state = core.state_manager().get_state().await;
        assert_eq!(state.playback.status, PlaybackStatus::Loading);
        assert_eq!(state.playback.active_url.as_deref(), Some("http://radio/quiet"));

        core.handle_event(command(Command::Play { uuid: "popular".into() })).await;
        assert_eq!(core.playback.transport().open_handles, 1);

        core.handle_event(command(Command::Play { uuid: "popular".into() })).await;
        let state = core.state_manager().get_state().await;
        assert_eq!(state.playback.status, PlaybackStatus::Idle);
        assert_eq!(core.playback.transport().open_handles, 0);
    }

    #[tokio::test]
    async fn test_transport_events_reach_playback() {
        let (mut core, _rx) = core();
        seed(&mut core).await;
        core.handle_event(command(Command::Play { uuid: "quiet".into() })).await;

        core.handle_event(DaemonEvent::Transport(TransportEvent::PlaybackStarted {
            handle: TransportHandle(1),
        }))
        .await;
        assert_eq!(
            core.state_manager().get_state().await.playback.status,
            PlaybackStatus::Playing
        );

        core.handle_event(DaemonEvent::Transport(TransportEvent::Fault {
            handle: TransportHandle(1),
            kind: FaultKind::Network,
            detail: "connection reset".into(),
        }))
        .await;
        let state = core.state_manager().get_state().await;
        assert_eq!(state.playback.status, PlaybackStatus::Idle);
        assert_eq!(
            state.last_notice.unwrap().message,
            "Failed to play station: connection reset"
        );
    }

    #[tokio::test]
    async fn test_clear_selection_stops_playback() {
        let (mut core, _rx) = core();
        seed(&mut core).await;
        core.handle_event(command(Command::SelectBalloon { id: "b1".into() })).await;
        core.handle_event(command(Command::Play { uuid: "quiet".into() })).await;

        core.handle_event(command(Command::ClearSelection)).await;
        let state = core.state_manager().get_state().await;
        assert!(state.selected_balloon.is_none());
        assert_eq!(state.playback.status, PlaybackStatus::Idle);
    }

    #[tokio::test]
    async fn test_random_hop_plays_most_popular_nearby() {
        let (mut core, _rx) = core();
        let token = core.balloon_refresh.begin();
        core.handle_event(DaemonEvent::BalloonsLoaded {
            token,
            load: live(0, vec![balloon("only", 0.0, 0.0)]),
        })
        .await;
        let token = core.station_refresh.begin();
        core.handle_event(DaemonEvent::StationsLoaded {
            token,
            aggregate: loaded(vec![station("quiet", 0.0, 0.5, 5), station("popular", 0.0, 2.0, 900)]),
        })
        .await;

        core.handle_event(command(Command::RandomHop)).await;
        let state = core.state_manager().get_state().await;
        assert_eq!(state.selected_balloon.unwrap().id, "only");
        assert_eq!(state.playback.active_station.as_deref(), Some("popular"));
        assert_eq!(core.playback.transport().opened, vec!["http://radio/popular".to_string()]);
    }

    #[tokio::test]
    async fn test_random_hop_without_balloons_is_a_notice() {
        let (mut core, _rx) = core();
        core.handle_event(command(Command::RandomHop)).await;
        let state = core.state_manager().get_state().await;
        assert!(state.selected_balloon.is_none());
        assert_eq!(
            state.last_notice.unwrap().message,
            "No balloons available to hop to"
        );
    }

    #[tokio::test]
    async fn test_random_hop_waits_for_stations() {
        let (mut core, _rx) = core();
        let token = core.balloon_refresh.begin();
        core.handle_event(DaemonEvent::BalloonsLoaded {
            token,
            load: live(0, vec![balloon("only", 0.0, 0.0)]),
        })
        .await;
        let token = core.start_station_refresh().await;

        core.handle_event(command(Command::RandomHop)).await;
        assert!(core.playback.transport().opened.is_empty());

        core.handle_event(DaemonEvent::StationsLoaded {
            token,
            aggregate: loaded(vec![station("late", 0.0, 0.1, 1)]),
        })
        .await;
        assert_eq!(core.playback.transport().opened, vec!["http://radio/late".to_string()]);
    }

    #[tokio::test]
    async fn test_random_hop_with_nothing_nearby() {
        let (mut core, _rx) = core();
        seed(&mut core).await;
        // b2 is far from every seeded station
        core.balloons.retain(|b| b.id == "b2");

        core.handle_event(command(Command::RandomHop)).await;
        let state = core.state_manager().get_state().await;
        assert_eq!(state.playback.status, PlaybackStatus::Idle);
        assert_eq!(
            state.last_notice.unwrap().message,
            "No playable station found for this balloon."
        );
    }

    #[tokio::test]
    async fn test_invalid_hour_is_rejected() {
        let (mut core, _rx) = core();
        core.handle_event(command(Command::LoadHour { hour: 30 })).await;
        let state = core.state_manager().get_state().await;
        assert!(!state.balloons_loading);
        assert_eq!(
            state.last_notice.unwrap().message,
            "Hour must be between 0 and 23, got 30"
        );
    }

    #[tokio::test]
    async fn test_load_hour_reports_through_channel() {
        let (mut core, mut rx) = core();
        core.handle_event(command(Command::LoadHour { hour: 7 })).await;
        assert!(core.state_manager().get_state().await.balloons_loading);

        // nothing listens on the configured base url, so the loader falls back
        let evt = tokio::time::timeout(std::time::Duration::from_secs(20), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(core.handle_event(evt).await);
        let state = core.state_manager().get_state().await;
        assert_eq!(state.hour, 7);
        assert!(state.balloon_source.unwrap().is_fallback());
        assert_eq!(state.balloons.len(), 5);
    }

    #[tokio::test]
    async fn test_shutdown_ends_loop() {
        let (mut core, _rx) = core();
        assert!(!core.handle_event(DaemonEvent::Shutdown).await);
    }
}
