//! End-to-end binding tests against a scripted external player.
//!
//! These drive the real `PlayerStore` + `PlayerBinding` pair and verify
//! the readiness buffering, stale-event immunity, auto-advance, error
//! and disposal behaviour the binding is responsible for.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use encore_core::config::PlayerConfig;
use encore_core::queue::RepeatMode;
use encore_core::state::PlayerStore;
use encore_player::binding::{Notice, PlayerBinding};
use encore_player::sdk::{SdkErrorCode, SdkEvent};
use tokio::sync::broadcast;

struct Harness {
    store: Arc<PlayerStore>,
    spy: Arc<SdkSpy>,
    library: Arc<FakeLibrary>,
    notices: broadcast::Receiver<Notice>,
}

fn config() -> PlayerConfig {
    PlayerConfig {
        default_volume: 0.7,
        poll_interval_ms: 20,
    }
}

fn spawn_binding(user_id: Option<&str>) -> Harness {
    spawn_binding_with(user_id, false)
}

fn spawn_binding_with(user_id: Option<&str>, fail_connect: bool) -> Harness {
    init_tracing();
    let store = Arc::new(PlayerStore::new(0.7));
    let (mut sdk, spy) = FakeSdk::new();
    sdk.fail_connect = fail_connect;
    let library = Arc::new(FakeLibrary::default());
    let binding = PlayerBinding::new(
        Arc::clone(&store),
        sdk,
        Arc::clone(&library),
        user_id.map(String::from),
        config(),
    );
    let notices = binding.subscribe_notices();
    tokio::spawn(binding.run());
    Harness {
        store,
        spy,
        library,
        notices,
    }
}

async fn recv_notice(rx: &mut broadcast::Receiver<Notice>) -> Notice {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("no notice within 2s")
        .expect("notice channel closed")
}

#[tokio::test]
async fn test_intent_before_ready_is_applied_on_ready() {
    let h = spawn_binding(None);
    h.store.play_track(track(TRACK_A)).await;

    wait_until(|| h.spy.connected()).await;
    assert!(h.spy.saw(&SdkCall::Connect(TRACK_A.to_string())));
    // Nothing may reach the player before it signals readiness.
    assert!(!h.spy.saw(&SdkCall::Play));

    h.spy.emit(SdkEvent::Ready).await;
    wait_until(|| h.spy.saw(&SdkCall::Play)).await;
    assert!(h.spy.saw(&SdkCall::SetVolume(70.0)));
    assert!(h.store.snapshot().await.wants_playing);
}

#[tokio::test]
async fn test_id_is_trimmed_before_reaching_the_sdk() {
    let h = spawn_binding(None);
    let mut padded = track(TRACK_A);
    padded.id = format!("  {TRACK_A} ");
    h.store.play_track(padded).await;

    wait_until(|| h.spy.connected()).await;
    assert!(h.spy.saw(&SdkCall::Connect(TRACK_A.to_string())));
}

#[tokio::test]
async fn test_invalid_id_never_reaches_the_sdk() {
    let mut h = spawn_binding(None);
    h.store.play_track(track("bad id!")).await;

    let notice = recv_notice(&mut h.notices).await;
    assert!(matches!(notice, Notice::InvalidTrack { .. }));
    assert!(!h.spy.connected());
    assert!(h.spy.calls().is_empty());
    let state = h.store.snapshot().await;
    assert!(!state.wants_playing);
    // The track stays selected so the UI can show what was refused.
    assert!(state.current_track.is_some());
}

#[tokio::test]
async fn test_connect_failure_stops_playback() {
    let mut h = spawn_binding_with(None, true);
    h.store.play_track(track(TRACK_A)).await;

    let notice = recv_notice(&mut h.notices).await;
    assert!(matches!(notice, Notice::PlaybackError { .. }));
    wait_store(&h.store, |s| !s.wants_playing).await;
    assert!(h.store.snapshot().await.current_track.is_some());
}

#[tokio::test]
async fn test_track_swap_loads_instead_of_reconnecting() {
    let h = spawn_binding(None);
    h.store.play_track(track(TRACK_A)).await;
    wait_until(|| h.spy.connected()).await;
    h.spy.emit(SdkEvent::Ready).await;
    wait_until(|| h.spy.saw(&SdkCall::Play)).await;

    h.store.play_track(track(TRACK_B)).await;
    wait_until(|| h.spy.saw(&SdkCall::LoadTrack(TRACK_B.to_string()))).await;
    assert_eq!(h.spy.count(&SdkCall::Connect(TRACK_A.to_string())), 1);
    assert!(!h.spy.saw(&SdkCall::Connect(TRACK_B.to_string())));
}

#[tokio::test]
async fn test_stale_started_event_is_ignored() {
    let h = spawn_binding(Some("user-1"));
    h.store.play_track(track(TRACK_A)).await;
    wait_until(|| h.spy.connected()).await;
    h.spy.emit(SdkEvent::Ready).await;
    wait_until(|| h.spy.saw(&SdkCall::Play)).await;

    h.store.play_track(track(TRACK_B)).await;
    wait_until(|| h.spy.saw(&SdkCall::LoadTrack(TRACK_B.to_string()))).await;
    h.store.toggle_play().await;
    wait_until(|| h.spy.saw(&SdkCall::Pause)).await;

    // A late "started" for the previous track arrives after the swap.
    h.spy
        .emit(SdkEvent::Started {
            track_id: TRACK_A.to_string(),
        })
        .await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let state = h.store.snapshot().await;
    assert_eq!(state.current_track.unwrap().id, TRACK_B);
    assert!(!state.wants_playing, "stale started must not resume playback");
    assert!(h.library.plays.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_ended_auto_advances_through_the_queue() {
    let h = spawn_binding(Some("user-1"));
    h.store.enqueue(track(TRACK_A)).await;
    h.store.enqueue(track(TRACK_B)).await;
    h.store.play_track(track(TRACK_A)).await;
    wait_until(|| h.spy.connected()).await;
    h.spy.emit(SdkEvent::Ready).await;
    wait_until(|| h.spy.saw(&SdkCall::Play)).await;
    h.spy
        .emit(SdkEvent::Started {
            track_id: TRACK_A.to_string(),
        })
        .await;

    h.spy
        .emit(SdkEvent::Ended {
            track_id: TRACK_A.to_string(),
        })
        .await;
    wait_until(|| h.spy.saw(&SdkCall::LoadTrack(TRACK_B.to_string()))).await;

    let state = h.store.snapshot().await;
    assert_eq!(state.current_track.unwrap().id, TRACK_B);
    assert!(state.wants_playing);
}

#[tokio::test]
async fn test_ended_at_end_of_queue_stops() {
    let h = spawn_binding(None);
    h.store.enqueue(track(TRACK_A)).await;
    h.store.enqueue(track(TRACK_B)).await;
    h.store.play_track(track(TRACK_B)).await;
    wait_until(|| h.spy.connected()).await;
    h.spy.emit(SdkEvent::Ready).await;
    wait_until(|| h.spy.saw(&SdkCall::Play)).await;

    h.spy
        .emit(SdkEvent::Ended {
            track_id: TRACK_B.to_string(),
        })
        .await;
    wait_store(&h.store, |s| !s.wants_playing).await;

    let state = h.store.snapshot().await;
    assert_eq!(state.current_track.unwrap().id, TRACK_B);
    assert!(!h.spy.saw(&SdkCall::LoadTrack(TRACK_A.to_string())));
}

#[tokio::test]
async fn test_repeat_one_restarts_and_rerecords() {
    let h = spawn_binding(Some("user-1"));
    h.store.enqueue(track(TRACK_A)).await;
    h.store.enqueue(track(TRACK_B)).await;
    h.store.set_repeat(RepeatMode::One).await;
    h.store.play_track(track(TRACK_A)).await;
    wait_until(|| h.spy.connected()).await;
    h.spy.emit(SdkEvent::Ready).await;
    wait_until(|| h.spy.saw(&SdkCall::Play)).await;
    h.spy
        .emit(SdkEvent::Started {
            track_id: TRACK_A.to_string(),
        })
        .await;
    wait_until(|| h.library.plays.lock().unwrap().len() == 1).await;

    h.spy
        .emit(SdkEvent::Ended {
            track_id: TRACK_A.to_string(),
        })
        .await;
    // Restart: seek back to the top of the same track and keep playing.
    wait_until(|| h.spy.count(&SdkCall::SeekTo(0.0)) >= 2).await;
    wait_store(&h.store, |s| s.wants_playing).await;
    assert_eq!(h.store.snapshot().await.current_track.unwrap().id, TRACK_A);

    h.spy
        .emit(SdkEvent::Started {
            track_id: TRACK_A.to_string(),
        })
        .await;
    wait_until(|| h.library.plays.lock().unwrap().len() == 2).await;
}

#[tokio::test]
async fn test_repeated_started_records_history_once_per_session() {
    let h = spawn_binding(Some("user-1"));
    h.store.play_track(track(TRACK_A)).await;
    wait_until(|| h.spy.connected()).await;
    h.spy.emit(SdkEvent::Ready).await;
    wait_until(|| h.spy.saw(&SdkCall::Play)).await;

    // Start, pause, resume: one play session, one record.
    h.spy
        .emit(SdkEvent::Started {
            track_id: TRACK_A.to_string(),
        })
        .await;
    h.spy
        .emit(SdkEvent::Paused {
            track_id: TRACK_A.to_string(),
        })
        .await;
    h.spy
        .emit(SdkEvent::Started {
            track_id: TRACK_A.to_string(),
        })
        .await;
    wait_until(|| h.library.plays.lock().unwrap().len() == 1).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.library.plays.lock().unwrap().len(), 1);

    // Re-clicking the song is a new session and records again.
    h.store.play_track(track(TRACK_A)).await;
    h.spy
        .emit(SdkEvent::Started {
            track_id: TRACK_A.to_string(),
        })
        .await;
    wait_until(|| h.library.plays.lock().unwrap().len() == 2).await;
}

#[tokio::test]
async fn test_error_stops_playback_but_keeps_selection() {
    let mut h = spawn_binding(None);
    h.store.play_track(track(TRACK_A)).await;
    wait_until(|| h.spy.connected()).await;
    h.spy.emit(SdkEvent::Ready).await;
    wait_until(|| h.spy.saw(&SdkCall::Play)).await;

    h.spy
        .emit(SdkEvent::Error {
            code: SdkErrorCode::TrackNotFound,
        })
        .await;
    wait_store(&h.store, |s| !s.wants_playing).await;
    assert!(h.store.snapshot().await.current_track.is_some());

    // One transient notice, no panic, nothing propagated.
    loop {
        if let Notice::PlaybackError { .. } = recv_notice(&mut h.notices).await {
            break;
        }
    }
}

#[tokio::test]
async fn test_volume_is_converted_to_sdk_units() {
    let h = spawn_binding(None);
    h.store.play_track(track(TRACK_A)).await;
    wait_until(|| h.spy.connected()).await;
    h.spy.emit(SdkEvent::Ready).await;
    wait_until(|| h.spy.saw(&SdkCall::SetVolume(70.0))).await;

    h.store.set_volume(0.25).await;
    wait_until(|| h.spy.saw(&SdkCall::SetVolume(25.0))).await;
}

#[tokio::test]
async fn test_seek_intent_reaches_the_player() {
    let h = spawn_binding(None);
    h.store.play_track(track(TRACK_A)).await;
    wait_until(|| h.spy.connected()).await;
    h.spy.emit(SdkEvent::Ready).await;
    wait_until(|| h.spy.saw(&SdkCall::Play)).await;

    h.store.seek_intent(42.5).await;
    wait_until(|| h.spy.saw(&SdkCall::SeekTo(42.5))).await;
}

#[tokio::test]
async fn test_position_polling_writes_back() {
    let h = spawn_binding(None);
    h.store.play_track(track(TRACK_A)).await;
    wait_until(|| h.spy.connected()).await;
    h.spy.set_position(12.5, 200.0);
    h.spy.emit(SdkEvent::Ready).await;

    wait_store(&h.store, |s| s.position_secs == 12.5).await;
    let state = h.store.snapshot().await;
    assert_eq!(state.duration_secs, Some(200.0));
    assert!((state.progress_fraction() - 0.0625).abs() < 1e-9);
}

#[tokio::test]
async fn test_close_disposes_player_and_stops_polling() {
    let h = spawn_binding(None);
    h.store.enqueue(track(TRACK_B)).await;
    h.store.play_track(track(TRACK_A)).await;
    wait_until(|| h.spy.connected()).await;
    h.spy.emit(SdkEvent::Ready).await;
    wait_until(|| h.spy.saw(&SdkCall::Play)).await;

    h.store.close().await;
    wait_until(|| h.spy.saw(&SdkCall::Dispose)).await;

    // Stop before release.
    let calls = h.spy.calls();
    let stop_at = calls.iter().position(|c| *c == SdkCall::Stop).unwrap();
    let dispose_at = calls.iter().position(|c| *c == SdkCall::Dispose).unwrap();
    assert!(stop_at < dispose_at);

    // The queue survives the close; playback state is cleared.
    let state = h.store.snapshot().await;
    assert!(state.current_track.is_none());
    assert!(!state.wants_playing);
    assert_eq!(state.queue.len(), 1);

    // No poll tick may land after disposal.
    h.spy.set_position(99.0, 200.0);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.store.snapshot().await.position_secs, 0.0);

    // A second close is harmless and does not dispose twice.
    h.store.close().await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.spy.count(&SdkCall::Dispose), 1);
}

#[tokio::test]
async fn test_close_while_loading_disposes_on_ready() {
    let h = spawn_binding(None);
    h.store.play_track(track(TRACK_A)).await;
    wait_until(|| h.spy.connected()).await;

    // The user dismisses the surface before the SDK ever became ready.
    h.store.close().await;
    h.spy.emit(SdkEvent::Ready).await;

    wait_until(|| h.spy.saw(&SdkCall::Dispose)).await;
    assert!(!h.spy.saw(&SdkCall::Play));
    assert_eq!(h.spy.count(&SdkCall::Dispose), 1);
}
