//! Generation-keyed response cache.
//!
//! Cached responses live under a generation name. Exactly one generation is
//! current at a time: lookups and inserts touch only the current generation,
//! and [`CacheStore::activate`] deletes every other generation wholesale.
//! Bumping the generation name is therefore the cache invalidation story -
//! an upgraded client installs into a fresh generation and activates it,
//! and nothing from the previous generation survives.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use url::Url;

/// Current cache generation. Bump the suffix when cached shapes change.
pub const CACHE_GENERATION: &str = "commontable-v1";

/// A response snapshot stored by the cache and replayed on later fetches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl CachedResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).to_string()
    }
}

struct GenerationMap {
    current: String,
    generations: HashMap<String, HashMap<String, CachedResponse>>,
}

/// In-memory response cache bucketed by generation.
///
/// Mutations are serialized by the lock; lookups are cheap shared reads.
/// Request keys are normalized so two spellings of the same resource (with
/// and without a fragment) share an entry; query strings are kept because
/// they name distinct resources.
pub struct CacheStore {
    inner: RwLock<GenerationMap>,
}

impl CacheStore {
    pub fn new() -> Self {
        Self::with_generation(CACHE_GENERATION)
    }

    pub fn with_generation(generation: &str) -> Self {
        let mut generations = HashMap::new();
        generations.insert(generation.to_string(), HashMap::new());
        Self {
            inner: RwLock::new(GenerationMap {
                current: generation.to_string(),
                generations,
            }),
        }
    }

    /// Store a response under the current generation.
    pub fn insert(&self, url: &str, response: CachedResponse) {
        let key = normalize_key(url);
        let mut inner = self.inner.write().expect("response cache lock poisoned");
        let current = inner.current.clone();
        inner
            .generations
            .entry(current)
            .or_default()
            .insert(key, response);
    }

    /// Look a request up in the current generation only. Entries under any
    /// other generation are invisible even before they are evicted.
    pub fn lookup(&self, url: &str) -> Option<CachedResponse> {
        let key = normalize_key(url);
        let inner = self.inner.read().expect("response cache lock poisoned");
        inner
            .generations
            .get(&inner.current)
            .and_then(|entries| entries.get(&key))
            .cloned()
    }

    /// Switch the current generation, creating its bucket if absent.
    /// Existing generations are left in place until [`Self::activate`].
    pub fn set_generation(&self, generation: &str) {
        let mut inner = self.inner.write().expect("response cache lock poisoned");
        inner
            .generations
            .entry(generation.to_string())
            .or_default();
        inner.current = generation.to_string();
    }

    /// Delete every generation except the current one. Returns the evicted
    /// generation names for logging.
    pub fn activate(&self) -> Vec<String> {
        let mut inner = self.inner.write().expect("response cache lock poisoned");
        let current = inner.current.clone();
        let evicted: Vec<String> = inner
            .generations
            .keys()
            .filter(|name| **name != current)
            .cloned()
            .collect();
        inner.generations.retain(|name, _| *name == current);
        evicted
    }

    pub fn current_generation(&self) -> String {
        let inner = self.inner.read().expect("response cache lock poisoned");
        inner.current.clone()
    }

    pub fn generation_names(&self) -> Vec<String> {
        let inner = self.inner.read().expect("response cache lock poisoned");
        inner.generations.keys().cloned().collect()
    }

    /// Number of entries in the current generation.
    pub fn entry_count(&self) -> usize {
        let inner = self.inner.read().expect("response cache lock poisoned");
        inner
            .generations
            .get(&inner.current)
            .map(|entries| entries.len())
            .unwrap_or(0)
    }
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Normalize a request URL into a cache key: fragments never reach the
/// server, so they are stripped; everything else (path, query) is kept.
fn normalize_key(url: &str) -> String {
    match Url::parse(url) {
        Ok(mut parsed) => {
            parsed.set_fragment(None);
            parsed.to_string()
        }
        // Relative path (no scheme): strip any fragment by hand.
        Err(_) => match url.split_once('#') {
            Some((before_fragment, _)) => before_fragment.to_string(),
            None => url.to_string(),
        },
    }
}
