//! Binding between the playback store and the external player.
//!
//! Architecture:
//!
//! ```text
//!   PlayerBinding::run()
//!         │  tokio::select! over three inputs, one logical owner
//!         ├── store updates      → reconcile intent onto the player
//!         ├── SDK events         → forward state back into the store
//!         └── 100 ms poll tick   → position/duration write-back
//! ```
//!
//! The external player initialises asynchronously and can silently not be
//! ready yet. Until its `Ready` event arrives, intent is buffered in the
//! store rather than dropped: reconcile is a no-op, and `Ready` applies
//! whatever the store says *at that moment*. Commands therefore never race
//! the SDK load — clicking play before the engine exists still ends in a
//! playing state.
//!
//! The binding owns the only `PlayerHandle`. The store never sees it.

use std::sync::Arc;
use std::time::Duration;

use encore_core::config::PlayerConfig;
use encore_core::queue::Direction;
use encore_core::state::{PlaybackIntent, PlayerStore, StoreUpdate};
use encore_core::track::{is_valid_track_id, Track};
use tokio::sync::{broadcast, mpsc};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::history::{PlayRecord, UserLibrary};
use crate::sdk::{ExternalPlayer, PlayerHandle, SdkEvent};

/// Transient, user-visible notifications. The hosting UI renders these as
/// toasts; playback state is unaffected beyond what the store already
/// shows.
#[derive(Debug, Clone)]
pub enum Notice {
    /// A track with a malformed source id was refused before reaching the
    /// SDK.
    InvalidTrack { title: String },
    /// The external player failed; playback stopped, the track stays
    /// selected so the user can retry.
    PlaybackError { message: String },
}

pub struct PlayerBinding<P: ExternalPlayer, L: UserLibrary> {
    store: Arc<PlayerStore>,
    sdk: P,
    library: Arc<L>,
    user_id: Option<String>,
    config: PlayerConfig,
    notices: broadcast::Sender<Notice>,
    store_updates: Option<broadcast::Receiver<StoreUpdate>>,
    sdk_tx: mpsc::Sender<SdkEvent>,
    sdk_rx: Option<mpsc::Receiver<SdkEvent>>,

    handle: Option<P::Handle>,
    /// False between `connect` returning and the SDK's `Ready` event.
    ready: bool,
    /// Trimmed id of the track the player currently holds.
    loaded_id: Option<String>,
    /// What the player was last told, so echoes of our own write-backs do
    /// not re-issue SDK calls.
    applied_playing: Option<bool>,
    applied_volume: Option<f32>,
    applied_session: Option<u64>,
    /// Play session already sent to the history collaborator.
    recorded_session: Option<u64>,
}

impl<P: ExternalPlayer, L: UserLibrary> PlayerBinding<P, L> {
    pub fn new(
        store: Arc<PlayerStore>,
        sdk: P,
        library: Arc<L>,
        user_id: Option<String>,
        config: PlayerConfig,
    ) -> Self {
        let (notices, _) = broadcast::channel(16);
        let (sdk_tx, sdk_rx) = mpsc::channel(64);
        // Subscribe now, not in run(): commands issued between
        // construction and the spawned loop's first poll must not be lost.
        let store_updates = store.subscribe();
        Self {
            store,
            sdk,
            library,
            user_id,
            config,
            notices,
            store_updates: Some(store_updates),
            sdk_tx,
            sdk_rx: Some(sdk_rx),
            handle: None,
            ready: false,
            loaded_id: None,
            applied_playing: None,
            applied_volume: None,
            applied_session: None,
            recorded_session: None,
        }
    }

    pub fn subscribe_notices(&self) -> broadcast::Receiver<Notice> {
        self.notices.subscribe()
    }

    /// Run the reconcile loop. Returns when the store is dropped; the
    /// external player is disposed on the way out.
    pub async fn run(mut self) {
        let (Some(mut updates), Some(mut sdk_rx)) =
            (self.store_updates.take(), self.sdk_rx.take())
        else {
            return;
        };

        info!("player binding: starting reconcile loop");
        let mut poll =
            tokio::time::interval(Duration::from_millis(self.config.poll_interval_ms.max(10)));
        poll.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            let polling = self.ready && self.handle.is_some() && self.loaded_id.is_some();
            tokio::select! {
                update = updates.recv() => match update {
                    Ok(StoreUpdate::Intent) => self.reconcile().await,
                    Ok(StoreUpdate::SeekRequested(seconds)) => self.apply_seek(seconds).await,
                    // Our own poll write-back.
                    Ok(StoreUpdate::Position) => {}
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!("player binding: missed {} store updates, resyncing", missed);
                        self.reconcile().await;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                Some(event) = sdk_rx.recv() => self.handle_sdk_event(event).await,
                _ = poll.tick(), if polling => self.poll_position().await,
            }
        }

        info!("player binding: store dropped, shutting down");
        self.dispose().await;
    }

    // ── intent reconciliation ─────────────────────────────────────────────────

    async fn reconcile(&mut self) {
        let snapshot = self.store.snapshot().await;
        let Some(track) = snapshot.current_track.clone() else {
            // Now-playing surface dismissed; the queue survives in the
            // store, the player does not.
            self.dispose().await;
            return;
        };

        let track_id = track.id.trim().to_string();
        if !is_valid_track_id(&track_id) {
            // A malformed id handed to the SDK surfaces as an opaque error
            // far from the root cause. Refuse it here.
            warn!("rejecting malformed track id {:?} ({})", track.id, track.title);
            if snapshot.wants_playing {
                self.notify(Notice::InvalidTrack {
                    title: track.title.clone(),
                });
            }
            self.store.set_playing_explicit(false).await;
            return;
        }

        if self.handle.is_none() {
            self.connect(&track_id).await;
            // Intent is applied when Ready fires, from the then-current
            // snapshot.
            return;
        }
        if !self.ready {
            return;
        }
        self.apply_intent(&snapshot, &track_id).await;
    }

    async fn connect(&mut self, initial_track_id: &str) {
        info!("constructing external player for track {}", initial_track_id);
        self.ready = false;
        match self.sdk.connect(initial_track_id, self.sdk_tx.clone()).await {
            Ok(handle) => {
                self.handle = Some(handle);
                self.loaded_id = Some(initial_track_id.to_string());
            }
            Err(err) => {
                error!("external player construction failed: {:#}", err);
                self.notify(Notice::PlaybackError {
                    message: "the player failed to load".to_string(),
                });
                self.store.set_playing_explicit(false).await;
            }
        }
    }

    /// Push the snapshot onto a ready player: swap the track if the id
    /// changed, restart it if the play session changed, then mirror volume
    /// and the play/pause flag.
    async fn apply_intent(&mut self, snapshot: &PlaybackIntent, track_id: &str) {
        let Some(handle) = self.handle.clone() else {
            return;
        };

        if self.loaded_id.as_deref() != Some(track_id) {
            debug!("swapping track {:?} -> {}", self.loaded_id, track_id);
            if let Err(err) = handle.load_track(track_id).await {
                warn!("load_track failed: {:#}", err);
                self.notify(Notice::PlaybackError {
                    message: "could not load this track".to_string(),
                });
                self.store.set_playing_explicit(false).await;
                return;
            }
            self.loaded_id = Some(track_id.to_string());
            self.applied_playing = None;
            self.applied_session = Some(snapshot.play_session);
        } else if self.applied_session != Some(snapshot.play_session) {
            // Same track, new session: restart from the top.
            if let Err(err) = handle.seek_to(0.0).await {
                warn!("restart seek failed: {:#}", err);
            }
            self.applied_session = Some(snapshot.play_session);
            self.applied_playing = None;
        }

        if self.applied_volume != Some(snapshot.volume) {
            let percent = (f64::from(snapshot.volume) * 100.0).clamp(0.0, 100.0).round();
            if let Err(err) = handle.set_volume(percent).await {
                warn!("set_volume failed: {:#}", err);
            }
            self.applied_volume = Some(snapshot.volume);
        }

        // Play/pause mirroring. The loaded id matches the current track at
        // this point, so the flip can never act on a stale target.
        if self.applied_playing != Some(snapshot.wants_playing) {
            let result = if snapshot.wants_playing {
                handle.play().await
            } else {
                handle.pause().await
            };
            if let Err(err) = result {
                warn!("play/pause failed: {:#}", err);
            }
            self.applied_playing = Some(snapshot.wants_playing);
        }
    }

    async fn apply_seek(&mut self, seconds: f64) {
        if !self.ready {
            return;
        }
        let Some(handle) = self.handle.clone() else {
            return;
        };
        // Only seek the track the user is looking at.
        let snapshot = self.store.snapshot().await;
        let current = snapshot
            .current_track
            .as_ref()
            .map(|t| t.id.trim().to_string());
        if current.as_deref() != self.loaded_id.as_deref() {
            return;
        }
        if let Err(err) = handle.seek_to(seconds).await {
            warn!("seek failed: {:#}", err);
        }
    }

    // ── SDK event forwarding ──────────────────────────────────────────────────

    async fn handle_sdk_event(&mut self, event: SdkEvent) {
        debug!("sdk event: {:?}", event);
        match event {
            SdkEvent::Ready => self.on_ready().await,
            SdkEvent::Started { track_id } => {
                let Some((track, session)) = self.match_current(&track_id).await else {
                    debug!("ignoring started event for stale track {}", track_id);
                    return;
                };
                self.applied_playing = Some(true);
                self.store.set_playing_explicit(true).await;
                self.record_play_once(track, session);
            }
            SdkEvent::Paused { track_id } => {
                if self.match_current(&track_id).await.is_none() {
                    debug!("ignoring paused event for stale track {}", track_id);
                    return;
                }
                self.applied_playing = Some(false);
                self.store.set_playing_explicit(false).await;
            }
            SdkEvent::Ended { track_id } => {
                if self.match_current(&track_id).await.is_none() {
                    debug!("ignoring ended event for stale track {}", track_id);
                    return;
                }
                info!("track {} ended, advancing", track_id);
                self.applied_playing = Some(false);
                self.store.set_playing_explicit(false).await;
                let outcome = self.store.advance(Direction::Next).await;
                debug!("auto-advance outcome: {:?}", outcome);
            }
            SdkEvent::Error { code } => {
                warn!("external player error: {}", code);
                self.applied_playing = Some(false);
                self.store.set_playing_explicit(false).await;
                self.notify(Notice::PlaybackError {
                    message: code.to_string(),
                });
            }
        }
    }

    async fn on_ready(&mut self) {
        info!("external player ready, applying buffered intent");
        self.ready = true;
        let snapshot = self.store.snapshot().await;
        let Some(track) = snapshot.current_track.clone() else {
            // The surface was closed while the SDK was still loading.
            self.dispose().await;
            return;
        };
        let track_id = track.id.trim().to_string();
        self.apply_intent(&snapshot, &track_id).await;
    }

    /// Returns the current track and play session when `track_id` refers
    /// to it; `None` marks the event as stale.
    async fn match_current(&self, track_id: &str) -> Option<(Track, u64)> {
        let snapshot = self.store.snapshot().await;
        let track = snapshot.current_track?;
        if track.id.trim() == track_id.trim() {
            Some((track, snapshot.play_session))
        } else {
            None
        }
    }

    fn record_play_once(&mut self, track: Track, session: u64) {
        // Repeated started events within one session (pause/resume,
        // buffering hiccups) must not re-record.
        if self.recorded_session == Some(session) {
            return;
        }
        self.recorded_session = Some(session);
        let Some(user_id) = self.user_id.clone() else {
            return;
        };
        let library = Arc::clone(&self.library);
        let record = PlayRecord::now(track);
        tokio::spawn(async move {
            if let Err(err) = library.record_play(&user_id, &record).await {
                warn!("failed to record play: {:#}", err);
            }
        });
    }

    // ── polling / disposal ────────────────────────────────────────────────────

    async fn poll_position(&mut self) {
        let Some(handle) = self.handle.clone() else {
            return;
        };
        let position = match handle.position_secs().await {
            Ok(p) => p,
            Err(err) => {
                // The player can be mid-load; try again next tick.
                debug!("position poll failed: {:#}", err);
                return;
            }
        };
        let duration = handle.duration_secs().await.ok().filter(|d| *d > 0.0);
        self.store.set_progress(position, duration).await;
    }

    async fn dispose(&mut self) {
        // Taking the handle first makes a second dispose a no-op and turns
        // the poll guard off before any further tick.
        let Some(handle) = self.handle.take() else {
            return;
        };
        info!("disposing external player");
        if let Err(err) = handle.stop().await {
            debug!("stop during dispose failed: {:#}", err);
        }
        if let Err(err) = handle.dispose().await {
            debug!("dispose failed: {:#}", err);
        }
        self.ready = false;
        self.loaded_id = None;
        self.applied_playing = None;
        self.applied_volume = None;
        self.applied_session = None;
        self.recorded_session = None;
    }

    fn notify(&self, notice: Notice) {
        // No subscribers is fine.
        let _ = self.notices.send(notice);
    }
}
