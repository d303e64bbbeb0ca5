//! Scripted doubles for the binding tests: a fake external player that
//! records every call and lets the test inject SDK events, plus an
//! in-memory user library.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Result};
use encore_core::state::{PlaybackIntent, PlayerStore};
use encore_core::track::Track;
use encore_player::history::{PlayRecord, UserLibrary};
use encore_player::sdk::{ExternalPlayer, PlayerHandle, SdkEvent};
use tokio::sync::mpsc;

/// Opt-in test logging: `RUST_LOG=debug cargo test -- --nocapture`.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub const TRACK_A: &str = "track-aaaa1";
pub const TRACK_B: &str = "track-bbbb2";
pub const TRACK_C: &str = "track-cccc3";

pub fn track(id: &str) -> Track {
    Track {
        id: id.to_string(),
        title: format!("title {id}"),
        artist: "artist".to_string(),
        thumbnail_url: String::new(),
        duration_secs: 180,
    }
}

/// Every call the binding makes, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum SdkCall {
    Connect(String),
    LoadTrack(String),
    Play,
    Pause,
    SeekTo(f64),
    SetVolume(f64),
    Stop,
    Dispose,
}

#[derive(Default)]
pub struct SdkSpy {
    calls: Mutex<Vec<SdkCall>>,
    events: Mutex<Option<mpsc::Sender<SdkEvent>>>,
    pub position: Mutex<f64>,
    pub duration: Mutex<f64>,
}

impl SdkSpy {
    fn record(&self, call: SdkCall) {
        self.calls.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<SdkCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn saw(&self, call: &SdkCall) -> bool {
        self.calls.lock().unwrap().contains(call)
    }

    pub fn count(&self, call: &SdkCall) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == call).count()
    }

    pub fn connected(&self) -> bool {
        self.events.lock().unwrap().is_some()
    }

    pub fn set_position(&self, position: f64, duration: f64) {
        *self.position.lock().unwrap() = position;
        *self.duration.lock().unwrap() = duration;
    }

    /// Inject an unsolicited SDK event, as the real engine would.
    pub async fn emit(&self, event: SdkEvent) {
        let tx = self
            .events
            .lock()
            .unwrap()
            .clone()
            .expect("sdk not connected yet");
        tx.send(event).await.expect("binding stopped listening");
    }
}

pub struct FakeSdk {
    spy: Arc<SdkSpy>,
    pub fail_connect: bool,
}

impl FakeSdk {
    pub fn new() -> (Self, Arc<SdkSpy>) {
        let spy = Arc::new(SdkSpy::default());
        (
            Self {
                spy: Arc::clone(&spy),
                fail_connect: false,
            },
            spy,
        )
    }
}

impl ExternalPlayer for FakeSdk {
    type Handle = FakeHandle;

    async fn connect(
        &mut self,
        initial_track_id: &str,
        events: mpsc::Sender<SdkEvent>,
    ) -> Result<FakeHandle> {
        if self.fail_connect {
            bail!("scripted connect failure");
        }
        self.spy.record(SdkCall::Connect(initial_track_id.to_string()));
        *self.spy.events.lock().unwrap() = Some(events);
        Ok(FakeHandle {
            spy: Arc::clone(&self.spy),
        })
    }
}

#[derive(Clone)]
pub struct FakeHandle {
    spy: Arc<SdkSpy>,
}

impl PlayerHandle for FakeHandle {
    async fn load_track(&self, track_id: &str) -> Result<()> {
        self.spy.record(SdkCall::LoadTrack(track_id.to_string()));
        Ok(())
    }
    async fn play(&self) -> Result<()> {
        self.spy.record(SdkCall::Play);
        Ok(())
    }
    async fn pause(&self) -> Result<()> {
        self.spy.record(SdkCall::Pause);
        Ok(())
    }
    async fn seek_to(&self, seconds: f64) -> Result<()> {
        self.spy.record(SdkCall::SeekTo(seconds));
        Ok(())
    }
    async fn set_volume(&self, percent: f64) -> Result<()> {
        self.spy.record(SdkCall::SetVolume(percent));
        Ok(())
    }
    async fn position_secs(&self) -> Result<f64> {
        Ok(*self.spy.position.lock().unwrap())
    }
    async fn duration_secs(&self) -> Result<f64> {
        Ok(*self.spy.duration.lock().unwrap())
    }
    async fn stop(&self) -> Result<()> {
        self.spy.record(SdkCall::Stop);
        Ok(())
    }
    async fn dispose(&self) -> Result<()> {
        self.spy.record(SdkCall::Dispose);
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeLibrary {
    pub plays: Mutex<Vec<(String, String)>>,
}

impl UserLibrary for FakeLibrary {
    async fn record_play(&self, user_id: &str, record: &PlayRecord) -> Result<()> {
        self.plays
            .lock()
            .unwrap()
            .push((user_id.to_string(), record.track.id.clone()));
        Ok(())
    }
    async fn recently_played(&self, _user_id: &str, _limit: usize) -> Result<Vec<Track>> {
        Ok(Vec::new())
    }
    async fn liked_tracks(&self, _user_id: &str) -> Result<Vec<Track>> {
        Ok(Vec::new())
    }
    async fn search_history(&self, _user_id: &str) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}

/// Poll `cond` until it holds or two seconds pass.
pub async fn wait_until(mut cond: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not met within 2s");
}

/// Poll the store until a snapshot satisfies `cond` or two seconds pass.
pub async fn wait_store(store: &PlayerStore, cond: impl Fn(&PlaybackIntent) -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if cond(&store.snapshot().await) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("store condition not met within 2s");
}
