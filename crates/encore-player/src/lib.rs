//! encore-player — drives the external playback engine from the playback
//! state store, and assembles recommendations through the cached search
//! path.

pub mod binding;
pub mod history;
pub mod recommend;
pub mod sdk;
pub mod search;

pub use binding::{Notice, PlayerBinding};
pub use sdk::{ExternalPlayer, PlayerHandle, SdkErrorCode, SdkEvent};
