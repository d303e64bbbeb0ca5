//! External player SDK contract.
//!
//! The decoding engine is third-party: it initialises asynchronously,
//! owns its internal state, and reports lifecycle changes out of band.
//! This module defines the slice of it the binding drives — an async
//! constructor, a cheaply cloneable command handle, and the unsolicited
//! event stream. Commands go one way; events come back on a channel.

use std::future::Future;

use anyhow::Result;
use tokio::sync::mpsc;

/// Lifecycle events pushed by the external player. Playback events name
/// the track they refer to, so a late event for a previous track can be
/// recognised and dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SdkEvent {
    /// The SDK finished loading and the handle accepts commands.
    Ready,
    Started { track_id: String },
    Paused { track_id: String },
    Ended { track_id: String },
    Error { code: SdkErrorCode },
}

/// Error codes as the external player reports them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdkErrorCode {
    /// The request was malformed (code 2).
    InvalidRequest,
    /// The player itself failed (code 5).
    PlaybackFailure,
    /// No such track at the source (code 100).
    TrackNotFound,
    /// The source refuses embedded playback (codes 101 and 150).
    NotEmbeddable,
    Other(i32),
}

impl SdkErrorCode {
    pub fn from_code(code: i32) -> Self {
        match code {
            2 => Self::InvalidRequest,
            5 => Self::PlaybackFailure,
            100 => Self::TrackNotFound,
            101 | 150 => Self::NotEmbeddable,
            other => Self::Other(other),
        }
    }
}

impl std::fmt::Display for SdkErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidRequest => write!(f, "the player rejected the request"),
            Self::PlaybackFailure => write!(f, "playback failed inside the player"),
            Self::TrackNotFound => write!(f, "track not found at the source"),
            Self::NotEmbeddable => write!(f, "this track cannot be played here"),
            Self::Other(code) => write!(f, "player error {code}"),
        }
    }
}

/// Command surface of a constructed player. Implementations are expected
/// to be cheap to clone — typically a channel sender in front of the real
/// engine.
pub trait PlayerHandle: Clone + Send + Sync + 'static {
    fn load_track(&self, track_id: &str) -> impl Future<Output = Result<()>> + Send;
    fn play(&self) -> impl Future<Output = Result<()>> + Send;
    fn pause(&self) -> impl Future<Output = Result<()>> + Send;
    fn seek_to(&self, seconds: f64) -> impl Future<Output = Result<()>> + Send;
    /// Volume in the SDK's unit, 0–100.
    fn set_volume(&self, percent: f64) -> impl Future<Output = Result<()>> + Send;
    fn position_secs(&self) -> impl Future<Output = Result<f64>> + Send;
    fn duration_secs(&self) -> impl Future<Output = Result<f64>> + Send;
    fn stop(&self) -> impl Future<Output = Result<()>> + Send;
    /// Tear the player down. The handle is unusable afterwards.
    fn dispose(&self) -> impl Future<Output = Result<()>> + Send;
}

/// Asynchronous constructor for the external player. `connect` is called
/// lazily, at most once per mounted session; events — `Ready` included —
/// arrive on `events` after it returns.
pub trait ExternalPlayer: Send + 'static {
    type Handle: PlayerHandle;

    fn connect(
        &mut self,
        initial_track_id: &str,
        events: mpsc::Sender<SdkEvent>,
    ) -> impl Future<Output = Result<Self::Handle>> + Send;
}
