//! Recommendation assembly.
//!
//! Feeds the queue; never touches playback state. All provider traffic
//! goes through the cached search front so repeated assembly does not
//! hammer the search API, and every failure degrades to a smaller result
//! set instead of an error.

use std::collections::HashSet;

use encore_core::track::Track;
use rand::seq::SliceRandom;
use tracing::warn;

use crate::history::UserLibrary;
use crate::search::{CachedSearch, SearchError, SearchPage, SearchProvider};

/// Genre/mood queries used when nothing is known about the user.
const CATEGORIES: &[&str] = &[
    "pop hits",
    "top rock songs",
    "best hip hop",
    "electronic dance music",
    "jazz classics",
    "classical music",
    "country hits",
    "r&b soul",
    "reggae music",
    "blues music",
    "indie pop",
    "alternative rock",
    "edm hits",
    "latin music hits",
    "kpop hits",
    "metal music",
    "folk music",
    "soul classics",
    "funk music",
    "disco hits",
    "lofi beats",
    "chill music",
    "workout music",
    "party songs",
];

/// Few categories per assembly keeps provider traffic down; the cache
/// absorbs repeats.
const CATEGORY_SAMPLE: usize = 2;
const TRACKS_PER_CATEGORY: usize = 8;
const TRACKS_PER_QUERY: usize = 5;
const RECENT_SEED: usize = 10;
const LIKED_SEED: usize = 5;
const HISTORY_QUERIES: usize = 2;

/// Tracks from a random sample of categories. Used for signed-out users
/// and as the top-up source everywhere else.
pub async fn random_recommendations<P: SearchProvider>(
    search: &CachedSearch<P>,
    limit: usize,
) -> Vec<Track> {
    let categories: Vec<&str> = {
        let mut rng = rand::thread_rng();
        CATEGORIES
            .choose_multiple(&mut rng, CATEGORY_SAMPLE)
            .copied()
            .collect()
    };

    let mut tracks = Vec::new();
    let mut seen = HashSet::new();
    // Sequential on purpose: bursts of parallel queries are what trips the
    // provider's rate limit.
    for category in categories {
        let page = fetch_or_empty(search, category).await;
        for track in page.results.into_iter().take(TRACKS_PER_CATEGORY) {
            push_unique(&mut tracks, &mut seen, track);
        }
    }
    shuffle_and_truncate(tracks, limit)
}

/// Tracks seeded from the user's own history and likes, topped up from
/// the random pool. Falls back to `random_recommendations` entirely when
/// the user has no search history yet.
pub async fn personalized_recommendations<P, L>(
    search: &CachedSearch<P>,
    library: &L,
    user_id: &str,
    limit: usize,
) -> Vec<Track>
where
    P: SearchProvider,
    L: UserLibrary,
{
    if user_id.is_empty() {
        return random_recommendations(search, limit).await;
    }

    let history = match library.search_history(user_id).await {
        Ok(history) => history,
        Err(err) => {
            warn!("search history unavailable: {:#}", err);
            Vec::new()
        }
    };
    if history.is_empty() {
        return random_recommendations(search, limit).await;
    }

    let mut tracks = Vec::new();
    let mut seen = HashSet::new();

    match library.recently_played(user_id, RECENT_SEED).await {
        Ok(recent) => {
            for track in recent {
                push_unique(&mut tracks, &mut seen, track);
            }
        }
        Err(err) => warn!("recently played unavailable: {:#}", err),
    }
    match library.liked_tracks(user_id).await {
        Ok(liked) => {
            for track in liked.into_iter().take(LIKED_SEED) {
                push_unique(&mut tracks, &mut seen, track);
            }
        }
        Err(err) => warn!("liked tracks unavailable: {:#}", err),
    }

    for query in history.iter().take(HISTORY_QUERIES) {
        if tracks.len() >= limit {
            break;
        }
        let page = fetch_or_empty(search, query).await;
        for track in page.results.into_iter().take(TRACKS_PER_QUERY) {
            push_unique(&mut tracks, &mut seen, track);
        }
    }

    if tracks.len() < limit {
        for track in random_recommendations(search, limit - tracks.len()).await {
            push_unique(&mut tracks, &mut seen, track);
        }
    }

    shuffle_and_truncate(tracks, limit)
}

/// A failed or rate-limited query contributes nothing; assembly carries
/// on with the other sources.
async fn fetch_or_empty<P: SearchProvider>(search: &CachedSearch<P>, query: &str) -> SearchPage {
    match search.search(query, None).await {
        Ok(page) => page,
        Err(SearchError::RateLimited) => {
            warn!("search rate limited for '{}', skipping", query);
            SearchPage::default()
        }
        Err(err) => {
            warn!("search failed for '{}': {:#}", query, err);
            SearchPage::default()
        }
    }
}

fn push_unique(tracks: &mut Vec<Track>, seen: &mut HashSet<String>, track: Track) {
    if track.id.is_empty() {
        return;
    }
    if seen.insert(track.id.clone()) {
        tracks.push(track);
    }
}

fn shuffle_and_truncate(mut tracks: Vec<Track>, limit: usize) -> Vec<Track> {
    tracks.shuffle(&mut rand::thread_rng());
    tracks.truncate(limit);
    tracks
}
