//! Playback state machine.
//!
//! One [`PlaybackController`] owns the one [`PlaybackSession`] and the media
//! transport behind it.  Commands (`play`, `toggle`, `stop`) come from the
//! owner; transport progress and faults arrive as [`TransportEvent`]s fed in
//! through [`PlaybackController::handle_event`].  User-facing messages are
//! queued as [`PlaybackNotice`]s and drained by the owner.
//!
//! ```text
//!   Idle ──play──▶ Loading ──started──▶ Playing
//!    ▲                │  ▲                 │
//!    │                │  └──── play(new) ──┘
//!    └── stop / fatal fault (via Error) ◀──┘
//! ```

use std::collections::VecDeque;
use std::future::Future;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::protocol::{PlaybackStatus, PlaybackView};
use crate::stations::StationRecord;

/// In-place reload/recover attempts allowed before a fault becomes fatal.
/// The count resets once audio flows again.
pub const MAX_RECOVERY_ATTEMPTS: u32 = 3;

/// Opaque id of one opened transport.  Never reused by a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransportHandle(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportKind {
    /// A single continuous stream the player consumes as-is.
    Direct,
    /// Manifest-driven segmented stream (HLS).
    Segmented,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FaultKind {
    Network,
    Decoder,
    Fatal,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Segmented transports: the manifest was fetched and parsed.
    ManifestParsed { handle: TransportHandle },
    /// Audio is flowing.
    PlaybackStarted { handle: TransportHandle },
    Fault {
        handle: TransportHandle,
        kind: FaultKind,
        detail: String,
    },
}

impl TransportEvent {
    pub fn handle(&self) -> TransportHandle {
        match self {
            TransportEvent::ManifestParsed { handle }
            | TransportEvent::PlaybackStarted { handle }
            | TransportEvent::Fault { handle, .. } => *handle,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("player unavailable: {0}")]
    Unavailable(String),
    #[error("player command failed: {0}")]
    Command(String),
}

/// The media backend driven by the controller.
pub trait Transport {
    fn supports_segmented(&self) -> bool;

    fn open(
        &mut self,
        url: &str,
        kind: TransportKind,
    ) -> impl Future<Output = Result<TransportHandle, TransportError>> + Send;

    /// Release the handle and silence output.
    fn close(&mut self, handle: TransportHandle) -> impl Future<Output = ()> + Send;

    /// Re-fetch the source in place after a network fault.
    fn reload(
        &mut self,
        handle: TransportHandle,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Reset the decoder in place after a media fault.
    fn recover(
        &mut self,
        handle: TransportHandle,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Liveness probe, called periodically.  Returns a fault for the open
    /// handle when the backend went away underneath it.
    fn check_health(&mut self) -> Option<TransportEvent> {
        None
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum PlaybackError {
    #[error("Station URL is missing")]
    MissingUrl,
    #[error("This station needs HLS support, which the player does not have")]
    SegmentedUnsupported,
    #[error("Failed to play station: {0}")]
    Transport(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackNotice {
    Started { url: String },
    Recovering { url: String, kind: FaultKind },
    Failed { url: String, message: String },
}

impl PlaybackNotice {
    pub fn message(&self) -> String {
        match self {
            PlaybackNotice::Started { url } => format!("Playing {}", url),
            PlaybackNotice::Recovering { kind, .. } => match kind {
                FaultKind::Network => "Network error, reloading stream".to_string(),
                FaultKind::Decoder => "Media error, recovering".to_string(),
                FaultKind::Fatal => "Stream error".to_string(),
            },
            PlaybackNotice::Failed { message, .. } => format!("Failed to play station: {}", message),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    Started,
    Stopped,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaybackSession {
    pub active_url: Option<String>,
    pub station_uuid: Option<String>,
    pub is_playing: bool,
    pub transport: Option<TransportHandle>,
    pub kind: Option<TransportKind>,
    pub recovery_attempts: u32,
    manifest_ready: bool,
}

pub struct PlaybackController<T: Transport> {
    transport: T,
    session: PlaybackSession,
    status: PlaybackStatus,
    notices: VecDeque<PlaybackNotice>,
}

impl<T: Transport> PlaybackController<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            session: PlaybackSession::default(),
            status: PlaybackStatus::Idle,
            notices: VecDeque::new(),
        }
    }

    pub fn status(&self) -> PlaybackStatus {
        self.status
    }

    pub fn session(&self) -> &PlaybackSession {
        &self.session
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn view(&self) -> PlaybackView {
        PlaybackView {
            status: self.status,
            active_url: self.session.active_url.clone(),
            active_station: self.session.station_uuid.clone(),
        }
    }

    /// True when `station` is the one currently requested to play.
    pub fn is_active(&self, station: &StationRecord) -> bool {
        self.session.is_playing
            && station.playable_url().is_some()
            && self.session.active_url.as_deref() == station.playable_url()
    }

    pub fn drain_notices(&mut self) -> Vec<PlaybackNotice> {
        self.notices.drain(..).collect()
    }

    /// Start `station`, replacing whatever is playing.
    ///
    /// Rejected requests (`MissingUrl`, `SegmentedUnsupported`) leave the
    /// controller untouched.
    pub async fn play(&mut self, station: &StationRecord) -> Result<(), PlaybackError> {
        let url = station
            .playable_url()
            .ok_or(PlaybackError::MissingUrl)?
            .to_string();

        let kind = if station.is_segmented_stream {
            if !self.transport.supports_segmented() {
                return Err(PlaybackError::SegmentedUnsupported);
            }
            TransportKind::Segmented
        } else {
            TransportKind::Direct
        };

        self.teardown().await;
        self.set_status(PlaybackStatus::Loading);
        info!("playback: opening {:?} transport for {}", kind, url);

        match self.transport.open(&url, kind).await {
            Ok(handle) => {
                self.session = PlaybackSession {
                    active_url: Some(url),
                    station_uuid: Some(station.uuid.clone()),
                    is_playing: true,
                    transport: Some(handle),
                    kind: Some(kind),
                    recovery_attempts: 0,
                    manifest_ready: false,
                };
                Ok(())
            }
            Err(e) => {
                let message = e.to_string();
                self.fail(url, message.clone()).await;
                Err(PlaybackError::Transport(message))
            }
        }
    }

    /// Play/pause button semantics: stop the station if it is the active
    /// one, otherwise switch to it.
    pub async fn toggle(&mut self, station: &StationRecord) -> Result<ToggleOutcome, PlaybackError> {
        if self.is_active(station) {
            self.stop().await;
            Ok(ToggleOutcome::Stopped)
        } else {
            self.play(station).await?;
            Ok(ToggleOutcome::Started)
        }
    }

    pub async fn stop(&mut self) {
        self.teardown().await;
        self.set_status(PlaybackStatus::Idle);
    }

    pub async fn handle_event(&mut self, event: TransportEvent) {
        let Some(active) = self.session.transport else {
            debug!("playback: no active transport, dropping {:?}", event);
            return;
        };
        if event.handle() != active {
            debug!("playback: stale event for {:?}, dropping", event.handle());
            return;
        }
        let url = self.session.active_url.clone().unwrap_or_default();
        let kind = self.session.kind.unwrap_or(TransportKind::Direct);

        match event {
            TransportEvent::ManifestParsed { .. } => {
                debug!("playback: manifest parsed for {}", url);
                self.session.manifest_ready = true;
            }
            TransportEvent::PlaybackStarted { .. } => {
                if kind == TransportKind::Segmented && !self.session.manifest_ready {
                    debug!("playback: start before manifest for {}, waiting", url);
                    return;
                }
                self.session.recovery_attempts = 0;
                if self.status != PlaybackStatus::Playing {
                    self.set_status(PlaybackStatus::Playing);
                    self.notices.push_back(PlaybackNotice::Started { url });
                }
            }
            TransportEvent::Fault {
                kind: fault, detail, ..
            } if kind == TransportKind::Segmented
                && fault != FaultKind::Fatal
                && self.session.recovery_attempts >= MAX_RECOVERY_ATTEMPTS =>
            {
                warn!(
                    "playback: {:?} fault on {} after {} attempts, giving up: {}",
                    fault, url, self.session.recovery_attempts, detail
                );
                self.fail(url, detail).await;
            }
            TransportEvent::Fault {
                kind: fault, detail, ..
            } => match (kind, fault) {
                (TransportKind::Segmented, FaultKind::Network) => {
                    warn!("playback: network fault on {} ({}), reloading", url, detail);
                    self.session.recovery_attempts += 1;
                    self.notices.push_back(PlaybackNotice::Recovering {
                        url: url.clone(),
                        kind: fault,
                    });
                    if let Err(e) = self.transport.reload(active).await {
                        self.fail(url, e.to_string()).await;
                    }
                }
                (TransportKind::Segmented, FaultKind::Decoder) => {
                    warn!("playback: media fault on {} ({}), recovering", url, detail);
                    self.session.recovery_attempts += 1;
                    self.notices.push_back(PlaybackNotice::Recovering {
                        url: url.clone(),
                        kind: fault,
                    });
                    if let Err(e) = self.transport.recover(active).await {
                        self.fail(url, e.to_string()).await;
                    }
                }
                _ => {
                    warn!("playback: fatal {:?} fault on {}: {}", fault, url, detail);
                    self.fail(url, detail).await;
                }
            },
        }
    }

    /// Report the failure, then fall back to `Idle` through a full stop.
    async fn fail(&mut self, url: String, message: String) {
        self.set_status(PlaybackStatus::Error);
        self.notices.push_back(PlaybackNotice::Failed { url, message });
        self.stop().await;
    }

    /// Periodic liveness check of the transport.
    pub async fn heartbeat(&mut self) {
        if let Some(event) = self.transport.check_health() {
            self.handle_event(event).await;
        }
    }

    async fn teardown(&mut self) {
        if let Some(handle) = self.session.transport.take() {
            debug!("playback: closing {:?}", handle);
            self.transport.close(handle).await;
        }
        self.session = PlaybackSession::default();
    }

    fn set_status(&mut self, status: PlaybackStatus) {
        if self.status != status {
            info!("playback: {:?} → {:?}", self.status, status);
            self.status = status;
        }
    }
}
