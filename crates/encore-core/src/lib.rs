//! Shared domain crate for the encore playback core.
//!
//! Holds everything the orchestration layer and the embedding app agree
//! on: the `Track` record and its ingestion boundary, the playback state
//! store, the pure queue/navigation policy, the TTL + single-flight
//! request cache, and configuration.

pub mod cache;
pub mod config;
pub mod queue;
pub mod state;
pub mod track;

pub use queue::{Direction, Outcome, RepeatMode};
pub use state::{PlaybackIntent, PlayerStore, StoreUpdate};
pub use track::Track;
