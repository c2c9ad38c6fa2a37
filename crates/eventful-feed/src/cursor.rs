//! Offset-style paging over forward-only store queries.
//!
//! The store can only answer "the next N records after token T". To serve
//! page `p` of size `n`, [`CursorWalker::fetch_page`] starts from no token
//! and walks `p` rounds of `n` records, keeping only the final round. That
//! is `p` round trips per call. A [`TokenCache`] can remember the token that
//! starts each round so repeated deep reads resume instead of re-walking.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use eventful_types::PageRequest;

use crate::store::{ContinuationToken, KeyQuery, PaginatedStore, Record, StoreError};

/// Default bound on the number of cached tokens.
const MAX_CACHED_TOKENS: usize = 10_000;

/// The records of one walked page.
#[derive(Debug, Clone, Default)]
pub struct WalkedPage {
    pub items: Vec<Record>,
    /// Whether the store reported more records after this page.
    pub has_more: bool,
}

/// Walks a [`PaginatedStore`] query round by round.
pub struct CursorWalker<'a, S: PaginatedStore + ?Sized> {
    store: &'a S,
    cache: Option<&'a TokenCache>,
}

impl<'a, S: PaginatedStore + ?Sized> CursorWalker<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store, cache: None }
    }

    /// Resumes from cached round tokens when available.
    pub fn with_cache(mut self, cache: Option<&'a TokenCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Returns page `page.page` of `query`, `page.limit` records per round.
    ///
    /// A round that ends the stream, or returns fewer than `page.limit`
    /// records, before the target round is reached ends the walk: the
    /// requested window lies past the end and the page is empty.
    ///
    /// # Errors
    ///
    /// Propagates any store failure; nothing is retried.
    pub async fn fetch_page(
        &self,
        query: &KeyQuery,
        page: PageRequest,
    ) -> Result<WalkedPage, StoreError> {
        let limit = (page.limit as usize).max(1);
        let target = page.page.max(1);
        let fingerprint = self.cache.map(|_| query.fingerprint());

        let (mut round, mut token) = match (self.cache, &fingerprint) {
            (Some(cache), Some(fingerprint)) => cache.resume_point(fingerprint, limit, target),
            _ => (1, None),
        };
        let first_round = round;

        loop {
            let result = self.store.query_by_key(query, limit, token.as_ref()).await?;
            tracing::debug!(
                collection = query.collection,
                index = query.index,
                round,
                target,
                returned = result.items.len(),
                "cursor round"
            );

            if round >= target {
                tracing::debug!(
                    index = query.index,
                    round_trips = target - first_round + 1,
                    "cursor walk reached target page"
                );
                return Ok(WalkedPage {
                    has_more: result.next_token.is_some(),
                    items: result.items,
                });
            }

            match result.next_token {
                Some(next) if result.items.len() >= limit => {
                    round += 1;
                    if let (Some(cache), Some(fingerprint)) = (self.cache, &fingerprint) {
                        cache.remember(fingerprint, limit, round, &next);
                    }
                    token = Some(next);
                }
                _ => {
                    tracing::debug!(
                        index = query.index,
                        round,
                        target,
                        "stream ended before target page"
                    );
                    return Ok(WalkedPage::default());
                }
            }
        }
    }

    /// Collects the first `max_items` records of `query` (all of them when
    /// `None`), requesting at most `batch_size` per round.
    ///
    /// Unlike [`fetch_page`](Self::fetch_page), a short round is not treated
    /// as the end; only a missing continuation token is.
    ///
    /// # Errors
    ///
    /// Propagates any store failure; nothing is retried.
    pub async fn collect_prefix(
        &self,
        query: &KeyQuery,
        max_items: Option<usize>,
        batch_size: usize,
    ) -> Result<Vec<Record>, StoreError> {
        let batch_size = batch_size.max(1);
        let mut items = Vec::new();
        let mut token: Option<ContinuationToken> = None;
        let mut rounds = 0usize;

        loop {
            let want = match max_items {
                Some(max) if items.len() >= max => break,
                Some(max) => (max - items.len()).min(batch_size),
                None => batch_size,
            };

            let result = self.store.query_by_key(query, want, token.as_ref()).await?;
            rounds += 1;
            items.extend(result.items);

            match result.next_token {
                Some(next) => token = Some(next),
                None => break,
            }
        }

        if let Some(max) = max_items {
            items.truncate(max);
        }

        tracing::debug!(
            collection = query.collection,
            index = query.index,
            rounds,
            collected = items.len(),
            "collected query prefix"
        );

        Ok(items)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    fingerprint: String,
    limit: usize,
    round: u32,
}

/// Short-lived memory of the tokens that start each round of a walk.
///
/// Keyed by (query fingerprint, page size, round). Owned by whoever owns
/// the walkers sharing it; entries expire after the configured TTL.
#[derive(Debug)]
pub struct TokenCache {
    ttl: Duration,
    max_entries: usize,
    entries: Mutex<HashMap<CacheKey, (ContinuationToken, Instant)>>,
}

impl TokenCache {
    pub fn new(ttl: Duration) -> Self {
        Self::with_max_entries(ttl, MAX_CACHED_TOKENS)
    }

    /// A cache holding at most `max_entries` tokens. Once full, expired
    /// tokens are evicted first, then the oldest live ones.
    pub fn with_max_entries(ttl: Duration, max_entries: usize) -> Self {
        Self {
            ttl,
            max_entries: max_entries.max(1),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Number of stored tokens, expired ones included.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the deepest cached round at or before `target` and the token
    /// that starts it, or `(1, None)` to walk from the beginning.
    fn resume_point(
        &self,
        fingerprint: &str,
        limit: usize,
        target: u32,
    ) -> (u32, Option<ContinuationToken>) {
        let entries = self.lock();
        let now = Instant::now();
        entries
            .iter()
            .filter(|(key, (_, stored_at))| {
                key.fingerprint == fingerprint
                    && key.limit == limit
                    && key.round <= target
                    && now.duration_since(*stored_at) <= self.ttl
            })
            .max_by_key(|(key, _)| key.round)
            .map(|(key, (token, _))| (key.round, Some(token.clone())))
            .unwrap_or((1, None))
    }

    fn remember(&self, fingerprint: &str, limit: usize, round: u32, token: &ContinuationToken) {
        let mut entries = self.lock();
        let now = Instant::now();
        if entries.len() >= self.max_entries {
            let ttl = self.ttl;
            entries.retain(|_, (_, stored_at)| now.duration_since(*stored_at) <= ttl);
        }
        if entries.len() >= self.max_entries {
            let mut by_age: Vec<(Instant, CacheKey)> = entries
                .iter()
                .map(|(key, (_, stored_at))| (*stored_at, key.clone()))
                .collect();
            by_age.sort_by_key(|(stored_at, _)| *stored_at);
            let excess = entries.len() + 1 - self.max_entries;
            for (_, key) in by_age.into_iter().take(excess) {
                entries.remove(&key);
            }
            tracing::debug!(evicted = excess, "token cache full, evicted oldest tokens");
        }
        entries.insert(
            CacheKey {
                fingerprint: fingerprint.to_string(),
                limit,
                round,
            },
            (token.clone(), now),
        );
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<CacheKey, (ContinuationToken, Instant)>> {
        self.entries.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("token cache lock poisoned, recovering with stale state");
            poisoned.into_inner()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::schema::{EVENTS, EVENTS_BY_OWNER, INVITATIONS, INVITATIONS_BY_RECIPIENT};
    use crate::store::MemoryStore;
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};
    use eventful_types::{Event, Invitation, InvitationStatus};

    fn seeded_store(count: usize) -> MemoryStore {
        let store = MemoryStore::new();
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        for i in 0..count {
            let event = Event::new(format!("e{i:02}"), "u1", base + ChronoDuration::hours(i as i64));
            store.insert_event(&event).unwrap();
        }
        store
    }

    fn owner_query() -> KeyQuery {
        KeyQuery::new(EVENTS, EVENTS_BY_OWNER, "u1").descending()
    }

    fn ids(items: &[Record]) -> Vec<String> {
        items
            .iter()
            .map(|record| record["id"].as_str().unwrap().to_string())
            .collect()
    }

    #[tokio::test]
    async fn fetch_page_walks_one_round_per_page() {
        let store = seeded_store(10);
        let walker = CursorWalker::new(&store);

        let page = walker
            .fetch_page(&owner_query(), PageRequest::new(3, 3))
            .await
            .unwrap();

        assert_eq!(ids(&page.items), vec!["e03", "e02", "e01"]);
        assert!(page.has_more);
        assert_eq!(store.query_calls(), 3, "page 3 costs three round trips");
    }

    #[tokio::test]
    async fn fetch_page_last_partial_page_has_no_more() {
        let store = seeded_store(10);
        let walker = CursorWalker::new(&store);

        let page = walker
            .fetch_page(&owner_query(), PageRequest::new(4, 3))
            .await
            .unwrap();

        assert_eq!(ids(&page.items), vec!["e00"]);
        assert!(!page.has_more);
    }

    #[tokio::test]
    async fn fetch_page_past_the_end_is_empty() {
        let store = seeded_store(4);
        let walker = CursorWalker::new(&store);

        let page = walker
            .fetch_page(&owner_query(), PageRequest::new(5, 2))
            .await
            .unwrap();

        assert!(page.items.is_empty());
        assert!(!page.has_more);
        assert_eq!(store.query_calls(), 2, "walk stops when the stream ends");
    }

    #[tokio::test]
    async fn short_intermediate_round_is_terminal() {
        let store = seeded_store(10).with_max_page_size(2);
        let walker = CursorWalker::new(&store);

        let page = walker
            .fetch_page(&owner_query(), PageRequest::new(2, 3))
            .await
            .unwrap();

        assert!(page.items.is_empty());
        assert!(!page.has_more);
        assert_eq!(store.query_calls(), 1);
    }

    #[tokio::test]
    async fn collect_prefix_follows_short_rounds() {
        let store = seeded_store(10).with_max_page_size(2);
        let walker = CursorWalker::new(&store);

        let items = walker
            .collect_prefix(&owner_query(), Some(5), 5)
            .await
            .unwrap();

        assert_eq!(ids(&items), vec!["e09", "e08", "e07", "e06", "e05"]);
        assert_eq!(store.query_calls(), 3);
    }

    #[tokio::test]
    async fn collect_prefix_unbounded_reads_everything() {
        let store = MemoryStore::new();
        for i in 0..7 {
            store
                .insert_invitation(&Invitation {
                    event_id: format!("e{i}"),
                    recipient_address: "a@example.com".to_string(),
                    status: InvitationStatus::Pending,
                })
                .unwrap();
        }
        let query = KeyQuery::new(INVITATIONS, INVITATIONS_BY_RECIPIENT, "a@example.com")
            .project(&["eventId"]);

        let items = CursorWalker::new(&store)
            .collect_prefix(&query, None, 3)
            .await
            .unwrap();

        assert_eq!(items.len(), 7);
        assert_eq!(store.query_calls(), 3);
    }

    #[tokio::test]
    async fn collect_prefix_of_zero_items_skips_the_store() {
        let store = seeded_store(3);
        let items = CursorWalker::new(&store)
            .collect_prefix(&owner_query(), Some(0), 10)
            .await
            .unwrap();

        assert!(items.is_empty());
        assert_eq!(store.query_calls(), 0);
    }

    #[tokio::test]
    async fn token_cache_turns_rewalk_into_resume() {
        let store = seeded_store(12);
        let cache = TokenCache::new(Duration::from_secs(30));
        let walker = CursorWalker::new(&store).with_cache(Some(&cache));

        let first = walker
            .fetch_page(&owner_query(), PageRequest::new(4, 2))
            .await
            .unwrap();
        assert_eq!(store.query_calls(), 4);
        assert_eq!(cache.len(), 3);

        store.reset_counters();
        let again = walker
            .fetch_page(&owner_query(), PageRequest::new(4, 2))
            .await
            .unwrap();
        assert_eq!(store.query_calls(), 1, "cached token resumes at round 4");
        assert_eq!(ids(&first.items), ids(&again.items));

        store.reset_counters();
        let deeper = walker
            .fetch_page(&owner_query(), PageRequest::new(5, 2))
            .await
            .unwrap();
        assert_eq!(store.query_calls(), 2, "resumes at round 4 then walks one more");
        assert_eq!(ids(&deeper.items), vec!["e03", "e02"]);
    }

    #[tokio::test]
    async fn expired_tokens_are_ignored() {
        let store = seeded_store(6);
        let cache = TokenCache::new(Duration::ZERO);
        let walker = CursorWalker::new(&store).with_cache(Some(&cache));

        walker
            .fetch_page(&owner_query(), PageRequest::new(3, 2))
            .await
            .unwrap();
        std::thread::sleep(Duration::from_millis(5));
        store.reset_counters();

        walker
            .fetch_page(&owner_query(), PageRequest::new(3, 2))
            .await
            .unwrap();
        assert_eq!(store.query_calls(), 3);
    }

    #[test]
    fn full_cache_evicts_oldest_live_tokens() {
        let cache = TokenCache::with_max_entries(Duration::from_secs(3600), 4);
        for round in 2..12u32 {
            cache.remember("fp", 2, round, &ContinuationToken::new(format!("t{round}")));
            std::thread::sleep(Duration::from_millis(1));
        }

        assert_eq!(cache.len(), 4);
        let (round, token) = cache.resume_point("fp", 2, 11);
        assert_eq!(round, 11);
        assert_eq!(token, Some(ContinuationToken::new("t11")));
        assert_eq!(cache.resume_point("fp", 2, 7), (1, None), "round 7 was evicted");
        assert_eq!(cache.resume_point("fp", 2, 8).0, 8);
    }
}
