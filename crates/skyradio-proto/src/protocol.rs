use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::balloons::{BalloonRecord, BalloonSource};
use crate::ranker::RankedStation;
use crate::stations::AggregateOutcome;

/// Requests accepted by the daemon core.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "cmd")]
pub enum Command {
    /// Reload balloons for an hour bucket (0..=23).
    LoadHour { hour: u8 },
    /// Re-run the station aggregation from scratch.
    RefreshStations,
    /// Select a balloon; selecting the current one clears the selection.
    SelectBalloon { id: String },
    /// Clear the selection and stop playback.
    ClearSelection,
    /// Play the station, or stop it if it is the one already playing.
    Play { uuid: String },
    Stop,
    /// Jump to a random balloon and start its first playable nearby station.
    RandomHop,
}

/// Playback state as seen by clients.
///
/// `Error` is transient: the controller reports it and falls back to `Idle`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum PlaybackStatus {
    #[default]
    Idle,
    Loading,
    Playing,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct PlaybackView {
    pub status: PlaybackStatus,
    pub active_url: Option<String>,
    pub active_station: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StationsView {
    pub loading: bool,
    pub count: usize,
    pub sources_ok: usize,
    pub sources_failed: usize,
    pub outcome: Option<AggregateOutcome>,
}

impl Default for StationsView {
    fn default() -> Self {
        Self {
            loading: true,
            count: 0,
            sources_ok: 0,
            sources_failed: 0,
            outcome: None,
        }
    }
}

/// User-facing message (errors, warnings, confirmations).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notice {
    pub message: String,
    pub at: DateTime<Local>,
}

impl Notice {
    pub fn now(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            at: Local::now(),
        }
    }
}

/// Snapshot of everything the core owns.  `rev` increases on every change.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SkyState {
    #[serde(default)]
    pub rev: u64,
    pub hour: u8,
    pub balloons_loading: bool,
    pub balloons: Vec<BalloonRecord>,
    pub balloon_source: Option<BalloonSource>,
    pub stations: StationsView,
    pub selected_balloon: Option<BalloonRecord>,
    pub nearby: Vec<RankedStation>,
    pub playback: PlaybackView,
    pub last_notice: Option<Notice>,
}
