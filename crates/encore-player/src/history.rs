//! The user-scoped document store collaborator.
//!
//! History, likes and search history live in a hosted database owned by
//! the surrounding app. This core only defines the contract; the binding
//! fires `record_play` without awaiting the outcome, and the
//! recommendation assembler reads the rest.

use std::future::Future;

use anyhow::Result;
use chrono::{DateTime, Utc};
use encore_core::track::Track;
use serde::{Deserialize, Serialize};

/// One play, as handed to the history collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayRecord {
    pub track: Track,
    pub played_at: DateTime<Utc>,
}

impl PlayRecord {
    pub fn now(track: Track) -> Self {
        Self {
            track,
            played_at: Utc::now(),
        }
    }
}

pub trait UserLibrary: Send + Sync + 'static {
    /// Record that playback of a track started. Fire-and-forget from the
    /// caller's point of view: failures are logged, never surfaced to
    /// playback.
    fn record_play(
        &self,
        user_id: &str,
        record: &PlayRecord,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Most recent first.
    fn recently_played(
        &self,
        user_id: &str,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<Track>>> + Send;

    fn liked_tracks(&self, user_id: &str) -> impl Future<Output = Result<Vec<Track>>> + Send;

    /// Most recent first search queries.
    fn search_history(&self, user_id: &str) -> impl Future<Output = Result<Vec<String>>> + Send;
}
