//! In-process store with the same index semantics as the SQLite store.
//!
//! Used by tests and local tooling. Besides holding documents it can
//! simulate store behaviour the feed must tolerate: short pages, latency,
//! and outright failure. It also counts round trips and concurrent point
//! lookups so callers can check the cost and fan-out of a walk.

use std::cmp::Ordering as CmpOrdering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;
use eventful_types::{Event, Invitation, User};
use serde_json::Value;

use super::schema::{self, IndexSpec};
use super::{
    decode_user, project, ContinuationToken, KeyQuery, PaginatedStore, QueryPage, Record,
    StoreError, UserDirectory,
};

type Collections = HashMap<&'static str, Vec<Record>>;

/// A [`PaginatedStore`] over in-memory documents.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<Collections>,
    max_page_size: Option<usize>,
    latency: Option<Duration>,
    failing: AtomicBool,
    failing_queries: AtomicBool,
    failing_gets_after: Mutex<Option<usize>>,
    query_calls: AtomicUsize,
    get_calls: AtomicUsize,
    gets_in_flight: AtomicUsize,
    peak_gets_in_flight: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Caps every query round at `max` items regardless of the requested
    /// limit, the way a store with a response size ceiling behaves.
    pub fn with_max_page_size(mut self, max: usize) -> Self {
        self.max_page_size = Some(max.max(1));
        self
    }

    /// Delays every call by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Makes every subsequent call fail with [`StoreError::Unavailable`].
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Makes every subsequent `query_by_key` fail while point lookups keep
    /// working.
    pub fn set_failing_queries(&self, failing: bool) {
        self.failing_queries.store(failing, Ordering::SeqCst);
    }

    /// Lets the next `calls` point lookups succeed and fails every one after
    /// them. `None` removes the limit.
    pub fn fail_gets_after(&self, calls: Option<usize>) {
        let mut limit = self
            .failing_gets_after
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *limit = calls.map(|calls| self.get_calls() + calls);
    }

    /// Highest number of `get_by_id` calls observed in flight at once.
    pub fn peak_gets_in_flight(&self) -> usize {
        self.peak_gets_in_flight.load(Ordering::SeqCst)
    }

    /// Number of `query_by_key` calls served so far.
    pub fn query_calls(&self) -> usize {
        self.query_calls.load(Ordering::SeqCst)
    }

    /// Number of `get_by_id` calls served so far.
    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    pub fn reset_counters(&self) {
        self.query_calls.store(0, Ordering::SeqCst);
        self.get_calls.store(0, Ordering::SeqCst);
        self.peak_gets_in_flight.store(0, Ordering::SeqCst);
    }

    pub fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        let record = serde_json::to_value(user)?;
        self.upsert(schema::USERS, record, |a, b| field_str(a, "id") == field_str(b, "id"));
        Ok(())
    }

    pub fn insert_event(&self, event: &Event) -> Result<(), StoreError> {
        let record = serde_json::to_value(event)?;
        self.upsert(schema::EVENTS, record, |a, b| field_str(a, "id") == field_str(b, "id"));
        Ok(())
    }

    pub fn insert_invitation(&self, invitation: &Invitation) -> Result<(), StoreError> {
        let record = serde_json::to_value(invitation)?;
        self.upsert(schema::INVITATIONS, record, |a, b| {
            field_str(a, "eventId") == field_str(b, "eventId")
                && field_str(a, "recipientAddress") == field_str(b, "recipientAddress")
        });
        Ok(())
    }

    /// Deletes an event without touching invitations that reference it.
    pub fn remove_event(&self, event_id: &str) -> bool {
        let mut collections = self.write();
        let Some(events) = collections.get_mut(schema::EVENTS) else {
            return false;
        };
        let before = events.len();
        events.retain(|record| field_str(record, "id") != Some(event_id));
        events.len() != before
    }

    fn upsert(
        &self,
        collection: &'static str,
        record: Record,
        same_key: impl Fn(&Record, &Record) -> bool,
    ) {
        let mut collections = self.write();
        let records = collections.entry(collection).or_default();
        match records.iter().position(|existing| same_key(existing, &record)) {
            Some(index) => records[index] = record,
            None => records.push(record),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Collections> {
        self.collections.read().unwrap_or_else(|poisoned| {
            tracing::warn!("memory store lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn write(&self) -> RwLockWriteGuard<'_, Collections> {
        self.collections.write().unwrap_or_else(|poisoned| {
            tracing::warn!("memory store lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    async fn before_call(&self) -> Result<(), StoreError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store set to fail".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl PaginatedStore for MemoryStore {
    async fn query_by_key(
        &self,
        query: &KeyQuery,
        limit: usize,
        token: Option<&ContinuationToken>,
    ) -> Result<QueryPage, StoreError> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);
        self.before_call().await?;
        if self.failing_queries.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store queries set to fail".to_string()));
        }

        let spec = schema::lookup_index(query.collection, query.index)?;
        let fingerprint = query.fingerprint();
        let offset = match token {
            Some(token) => decode_offset(token, &fingerprint)?,
            None => 0,
        };

        let mut matching: Vec<Record> = self
            .read()
            .get(spec.collection)
            .map(|records| {
                records
                    .iter()
                    .filter(|record| field_str(record, spec.key.name) == Some(query.key.as_str()))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        matching.sort_by(|a, b| index_order(spec, query.descending, a, b));

        let round = self.max_page_size.map_or(limit, |cap| limit.min(cap));
        let total = matching.len();
        let end = offset.saturating_add(round).min(total);
        let items = matching
            .into_iter()
            .skip(offset)
            .take(round)
            .map(|record| project(record, query.projection.as_deref()))
            .collect();

        let next_token = (end < total).then(|| ContinuationToken::new(format!("{fingerprint}.{end}")));
        Ok(QueryPage { items, next_token })
    }

    async fn get_by_id(&self, collection: &str, id: &str) -> Result<Option<Record>, StoreError> {
        let call = self.get_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let _in_flight = InFlight::enter(&self.gets_in_flight, &self.peak_gets_in_flight);
        self.before_call().await?;
        let limit = *self
            .failing_gets_after
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if limit.is_some_and(|limit| call > limit) {
            return Err(StoreError::Unavailable("memory store lookups set to fail".to_string()));
        }

        let collection = schema::id_collection(collection)?;
        let found = self.read().get(collection).and_then(|records| {
            records
                .iter()
                .find(|record| field_str(record, "id") == Some(id))
                .cloned()
        });
        Ok(found)
    }
}

#[async_trait]
impl UserDirectory for MemoryStore {
    async fn find_user(&self, user_id: &str) -> Result<Option<User>, StoreError> {
        self.get_by_id(schema::USERS, user_id)
            .await?
            .map(decode_user)
            .transpose()
    }
}

/// Counts a call as in flight until dropped, tracking the high-water mark.
struct InFlight<'a> {
    current: &'a AtomicUsize,
}

impl<'a> InFlight<'a> {
    fn enter(current: &'a AtomicUsize, peak: &AtomicUsize) -> Self {
        let now = current.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
        Self { current }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }
}

fn field_str<'r>(record: &'r Record, field: &str) -> Option<&'r str> {
    record.get(field).and_then(Value::as_str)
}

fn index_order(spec: &IndexSpec, descending: bool, a: &Record, b: &Record) -> CmpOrdering {
    let by_sort = match spec.sort {
        Some(sort) => {
            let ord = field_str(a, sort.name).cmp(&field_str(b, sort.name));
            if descending {
                ord.reverse()
            } else {
                ord
            }
        }
        None => CmpOrdering::Equal,
    };
    by_sort.then_with(|| field_str(a, spec.tiebreak.name).cmp(&field_str(b, spec.tiebreak.name)))
}

fn decode_offset(token: &ContinuationToken, fingerprint: &str) -> Result<usize, StoreError> {
    let (owner, offset) = token.as_str().split_once('.').ok_or(StoreError::InvalidToken)?;
    if owner != fingerprint {
        return Err(StoreError::InvalidToken);
    }
    offset.parse().map_err(|_| StoreError::InvalidToken)
}
