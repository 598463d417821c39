//! Permanent-redirect cache.
//!
//! Remembers where a 301 sent a request so later requests to the same URI
//! go straight to the new location. Entries live as long as the context.

use dashmap::DashMap;
use std::sync::Arc;
use url::Url;

#[derive(Debug, Clone, Default)]
pub struct RedirectCache {
    entries: Arc<DashMap<Url, Url>>,
}

fn normalize(uri: &Url) -> Url {
    let mut uri = uri.clone();
    uri.set_fragment(None);
    uri
}

impl RedirectCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Where `from` moved to, if a 301 said so.
    pub fn lookup(&self, from: &Url) -> Option<Url> {
        self.entries.get(&normalize(from)).map(|u| u.clone())
    }

    pub fn insert(&self, from: &Url, to: &Url) {
        let from = normalize(from);
        let to = normalize(to);
        if from == to {
            return;
        }
        tracing::debug!(from = %from, to = %to, "caching permanent redirect");
        self.entries.insert(from, to);
    }

    pub fn remove(&self, from: &Url) -> Option<Url> {
        self.entries.remove(&normalize(from)).map(|(_, to)| to)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}
