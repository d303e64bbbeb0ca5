//! Playback state store — the single source of truth for what should be
//! playing.
//!
//! `PlayerStore` is the only way the rest of the app mutates playback
//! state. Commands update local state immediately and notify observers
//! over a broadcast channel; the external player catches up
//! asynchronously through the binding, which subscribes here and
//! reconciles from `snapshot()`. Nothing in this module talks to the
//! player itself.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

use crate::queue::{advance, Direction, Outcome, RepeatMode};
use crate::track::Track;

/// Authoritative, externally observable playback state. `rev` is a
/// monotonically increasing counter incremented on every change; clients
/// can use it to detect missed updates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackIntent {
    #[serde(default)]
    pub rev: u64,
    pub current_track: Option<Track>,
    pub wants_playing: bool,
    /// 0.0–1.0.
    pub volume: f32,
    pub repeat: RepeatMode,
    pub shuffle: bool,
    /// Insertion order is meaningful; duplicate ids are allowed.
    pub queue: Vec<Track>,
    pub position_secs: f64,
    /// Duration as reported by the external player, when it knows better
    /// than the track metadata.
    pub duration_secs: Option<f64>,
    /// Bumped every time playback of a track (re)starts. Lets observers
    /// distinguish a restart of the same track from a resume.
    #[serde(default)]
    pub play_session: u64,
}

impl Default for PlaybackIntent {
    fn default() -> Self {
        Self {
            rev: 1,
            current_track: None,
            wants_playing: false,
            volume: 0.7,
            repeat: RepeatMode::Off,
            shuffle: false,
            queue: Vec::new(),
            position_secs: 0.0,
            duration_secs: None,
            play_session: 0,
        }
    }
}

impl PlaybackIntent {
    /// Playback progress in [0, 1]. The player-reported duration wins over
    /// track metadata; with no usable duration the fraction is 0.
    pub fn progress_fraction(&self) -> f64 {
        let duration = self
            .duration_secs
            .filter(|d| *d > 0.0)
            .or_else(|| {
                self.current_track
                    .as_ref()
                    .map(|t| f64::from(t.duration_secs))
                    .filter(|d| *d > 0.0)
            });
        match duration {
            Some(d) => (self.position_secs / d).clamp(0.0, 1.0),
            None => 0.0,
        }
    }
}

/// Notification sent after a mutation. `Position` is the binding's own
/// poll write-back; the binding ignores it so no feedback loop forms.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StoreUpdate {
    /// Track / playing flag / queue / volume / mode changed.
    Intent,
    /// The user asked to seek; the binding performs the actual seek.
    SeekRequested(f64),
    /// Position/duration write-back from the polling loop.
    Position,
}

pub struct PlayerStore {
    state: Arc<RwLock<PlaybackIntent>>,
    updates: broadcast::Sender<StoreUpdate>,
}

impl PlayerStore {
    pub fn new(default_volume: f32) -> Self {
        let (updates, _) = broadcast::channel(64);
        let state = PlaybackIntent {
            volume: default_volume.clamp(0.0, 1.0),
            ..PlaybackIntent::default()
        };
        Self {
            state: Arc::new(RwLock::new(state)),
            updates,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreUpdate> {
        self.updates.subscribe()
    }

    pub async fn snapshot(&self) -> PlaybackIntent {
        self.state.read().await.clone()
    }

    /// Select `track` and (re)start it from the top. Re-selecting the
    /// current track restarts it, matching a user re-clicking the song.
    pub async fn play_track(&self, track: Track) {
        {
            let mut state = self.state.write().await;
            state.current_track = Some(track);
            state.wants_playing = true;
            state.position_secs = 0.0;
            state.duration_secs = None;
            state.play_session += 1;
            state.rev += 1;
        }
        self.notify(StoreUpdate::Intent);
    }

    pub async fn toggle_play(&self) {
        {
            let mut state = self.state.write().await;
            if state.current_track.is_none() {
                debug!("toggle_play ignored: no current track");
                return;
            }
            state.wants_playing = !state.wants_playing;
            state.rev += 1;
        }
        self.notify(StoreUpdate::Intent);
    }

    /// Reconcile the playing flag with what the player actually did,
    /// without toggling. Used by the binding when forwarding player
    /// events; with no current track this only ever clears the flag.
    pub async fn set_playing_explicit(&self, playing: bool) {
        {
            let mut state = self.state.write().await;
            let target = playing && state.current_track.is_some();
            if state.wants_playing == target {
                return;
            }
            state.wants_playing = target;
            state.rev += 1;
        }
        self.notify(StoreUpdate::Intent);
    }

    pub async fn enqueue(&self, track: Track) {
        {
            let mut state = self.state.write().await;
            state.queue.push(track);
            state.rev += 1;
        }
        self.notify(StoreUpdate::Intent);
    }

    /// Remove every queue entry with this id.
    pub async fn dequeue(&self, track_id: &str) {
        let id = track_id.trim();
        {
            let mut state = self.state.write().await;
            let before = state.queue.len();
            state.queue.retain(|t| t.id.trim() != id);
            if state.queue.len() == before {
                return;
            }
            state.rev += 1;
        }
        self.notify(StoreUpdate::Intent);
    }

    pub async fn clear_queue(&self) {
        {
            let mut state = self.state.write().await;
            if state.queue.is_empty() {
                return;
            }
            state.queue.clear();
            state.rev += 1;
        }
        self.notify(StoreUpdate::Intent);
    }

    pub async fn set_repeat(&self, repeat: RepeatMode) {
        {
            let mut state = self.state.write().await;
            if state.repeat == repeat {
                return;
            }
            state.repeat = repeat;
            state.rev += 1;
        }
        self.notify(StoreUpdate::Intent);
    }

    pub async fn set_shuffle(&self, shuffle: bool) {
        {
            let mut state = self.state.write().await;
            if state.shuffle == shuffle {
                return;
            }
            state.shuffle = shuffle;
            state.rev += 1;
        }
        self.notify(StoreUpdate::Intent);
    }

    pub async fn set_volume(&self, volume: f32) {
        let volume = volume.clamp(0.0, 1.0);
        {
            let mut state = self.state.write().await;
            if state.volume == volume {
                return;
            }
            state.volume = volume;
            state.rev += 1;
        }
        self.notify(StoreUpdate::Intent);
    }

    /// Record where playback should be. The actual seek on the external
    /// player is performed by the binding when it observes this request.
    pub async fn seek_intent(&self, seconds: f64) {
        let seconds = seconds.max(0.0);
        {
            let mut state = self.state.write().await;
            if state.current_track.is_none() {
                debug!("seek_intent ignored: no current track");
                return;
            }
            state.position_secs = seconds;
            state.rev += 1;
        }
        self.notify(StoreUpdate::SeekRequested(seconds));
    }

    /// Position/duration write-back from the binding's polling loop.
    pub async fn set_progress(&self, position_secs: f64, duration_secs: Option<f64>) {
        {
            let mut state = self.state.write().await;
            if state.current_track.is_none() {
                return;
            }
            state.position_secs = position_secs;
            state.duration_secs = duration_secs;
            state.rev += 1;
        }
        self.notify(StoreUpdate::Position);
    }

    /// Apply queue policy for an explicit skip or an auto-advance.
    /// Returns the outcome that was applied; navigation with an empty
    /// queue or no current track is a safe no-op.
    pub async fn advance(&self, direction: Direction) -> Outcome {
        let outcome = {
            let state = self.state.read().await;
            advance(
                direction,
                &state.queue,
                state.current_track.as_ref(),
                state.shuffle,
                state.repeat,
            )
        };
        match &outcome {
            Outcome::PlayTrack(track) => self.play_track(track.clone()).await,
            Outcome::RestartCurrent => {
                {
                    let mut state = self.state.write().await;
                    state.position_secs = 0.0;
                    state.wants_playing = true;
                    state.play_session += 1;
                    state.rev += 1;
                }
                self.notify(StoreUpdate::Intent);
            }
            Outcome::NoOp => {}
        }
        outcome
    }

    /// Dismiss the now-playing surface. The queue survives; the binding
    /// observes the cleared track and disposes the external player.
    pub async fn close(&self) {
        {
            let mut state = self.state.write().await;
            if state.current_track.is_none() && !state.wants_playing {
                return;
            }
            state.current_track = None;
            state.wants_playing = false;
            state.position_secs = 0.0;
            state.duration_secs = None;
            state.rev += 1;
        }
        self.notify(StoreUpdate::Intent);
    }

    fn notify(&self, update: StoreUpdate) {
        // No receivers is fine — nothing is mounted yet.
        let _ = self.updates.send(update);
    }
}
