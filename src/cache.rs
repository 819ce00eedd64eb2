use std::sync::{Mutex, PoisonError};

/// Which anchor-text sources feed the virtual reference keyword set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeywordSources {
    /// Block names.
    pub names: bool,
    /// Comma-split block alias tokens.
    pub aliases: bool,
    /// Literal anchor texts from existing refs.
    pub anchors: bool,
    /// Document titles.
    pub doc_titles: bool,
}

impl Default for KeywordSources {
    fn default() -> Self {
        Self {
            names: true,
            aliases: true,
            anchors: true,
            doc_titles: true,
        }
    }
}

struct Generation {
    sources: KeywordSources,
    keywords: Vec<String>,
}

/// Process-wide cache of the virtual reference keyword set.
///
/// Holds at most one generation at a time, keyed by the source combination
/// that produced it: `get` with a different `KeywordSources` misses, so a
/// caller widening its source flags recomputes instead of receiving the
/// stale narrower set. The external mutation pipeline must call
/// `invalidate` after any change to names, aliases, ref anchor texts, or
/// document titles. No persistence; state is in-memory only.
#[derive(Default)]
pub struct VirtualKeywordCache {
    inner: Mutex<Option<Generation>>,
}

impl VirtualKeywordCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached keyword set, or `None` when the cache is empty or
    /// was populated for a different source combination.
    pub fn get(&self, sources: KeywordSources) -> Option<Vec<String>> {
        let guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        guard
            .as_ref()
            .filter(|generation| generation.sources == sources)
            .map(|generation| generation.keywords.clone())
    }

    /// Stores a keyword set for the given source combination, replacing any
    /// previous generation.
    pub fn set(&self, sources: KeywordSources, keywords: Vec<String>) {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        *guard = Some(Generation { sources, keywords });
    }

    /// Drops the cached generation. Idempotent.
    pub fn invalidate(&self) {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        *guard = None;
    }
}
