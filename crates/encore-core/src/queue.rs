//! Queue/navigation policy.
//!
//! Pure decisions only: given the queue, the current track and the
//! shuffle/repeat flags, compute what an explicit skip or an auto-advance
//! should do. Applying the outcome (and any SDK traffic) is the store's
//! and the binding's business.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::track::Track;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepeatMode {
    #[default]
    Off,
    All,
    One,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Next,
    Previous,
}

/// What a skip should do. `RestartCurrent` means "seek the current track
/// to 0 and keep it playing"; `NoOp` means nothing changes (end of queue
/// with repeat off, or nothing sensible to do).
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    PlayTrack(Track),
    RestartCurrent,
    NoOp,
}

/// Compute the navigation outcome.
///
/// The current track need not be a member of the queue (ad-hoc plays);
/// in that case "next" starts from the top of the queue and "previous"
/// restarts the current track. The shuffle draw is uniform over the whole
/// queue and may land on the current track again.
pub fn advance(
    direction: Direction,
    queue: &[Track],
    current: Option<&Track>,
    shuffle: bool,
    repeat: RepeatMode,
) -> Outcome {
    let Some(current) = current else {
        return Outcome::NoOp;
    };
    if queue.is_empty() {
        return Outcome::NoOp;
    }

    let current_id = current.id.trim();
    let position = queue.iter().position(|t| t.id.trim() == current_id);

    match direction {
        Direction::Next => {
            if repeat == RepeatMode::One {
                return Outcome::RestartCurrent;
            }
            if shuffle {
                let idx = rand::thread_rng().gen_range(0..queue.len());
                return Outcome::PlayTrack(queue[idx].clone());
            }
            let next = position.map(|i| i + 1).unwrap_or(0);
            if next >= queue.len() {
                match repeat {
                    RepeatMode::All => Outcome::PlayTrack(queue[0].clone()),
                    _ => Outcome::NoOp,
                }
            } else {
                Outcome::PlayTrack(queue[next].clone())
            }
        }
        Direction::Previous => match position {
            // "Previous" near the start always does something useful:
            // back to the top of the current track, never a wrap.
            Some(i) if i > 0 => Outcome::PlayTrack(queue[i - 1].clone()),
            _ => Outcome::RestartCurrent,
        },
    }
}
