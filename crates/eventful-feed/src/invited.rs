//! Events a user was invited to.
//!
//! The invitation index is keyed by recipient address and is not ordered by
//! event creation time, so this leg is a two-stage join:
//!
//! 1. collect every invited event ID for the address (projection `eventId`),
//! 2. hydrate each ID with a point lookup, with bounded concurrency,
//!
//! then drop events the requester hosts and sort in feed order. Any page of
//! this leg, however shallow, costs a full read of the user's invitations.

use std::collections::HashSet;

use eventful_types::{Event, PageRequest};
use futures_util::stream::{self, StreamExt};

use crate::cursor::CursorWalker;
use crate::error::FeedError;
use crate::hosting::decode_event;
use crate::merge::{feed_order, slice_page};
use crate::store::schema::{EVENTS, INVITATIONS, INVITATIONS_BY_RECIPIENT};
use crate::store::{KeyQuery, PaginatedStore};

/// Reads a user's invited events through the invitation index.
pub struct InvitedSource<'a, S: PaginatedStore + ?Sized> {
    store: &'a S,
    hydrate_concurrency: usize,
    batch_size: usize,
}

impl<'a, S: PaginatedStore + ?Sized> InvitedSource<'a, S> {
    pub fn new(store: &'a S, hydrate_concurrency: usize, batch_size: usize) -> Self {
        Self {
            store,
            hydrate_concurrency: hydrate_concurrency.max(1),
            batch_size: batch_size.max(1),
        }
    }

    /// The invitation index query for `address`, projected to event IDs.
    pub fn query(address: &str) -> KeyQuery {
        KeyQuery::new(INVITATIONS, INVITATIONS_BY_RECIPIENT, address).project(&["eventId"])
    }

    /// Every event ID invited to `address`, deduplicated, in index order.
    pub async fn invited_event_ids(&self, address: &str) -> Result<Vec<String>, FeedError> {
        let records = CursorWalker::new(self.store)
            .collect_prefix(&Self::query(address), None, self.batch_size)
            .await?;

        let mut seen = HashSet::with_capacity(records.len());
        let mut ids = Vec::with_capacity(records.len());
        for record in records {
            let id = record
                .get("eventId")
                .and_then(|v| v.as_str())
                .ok_or_else(|| FeedError::Malformed("invitation without eventId".to_string()))?;
            if seen.insert(id.to_string()) {
                ids.push(id.to_string());
            }
        }
        Ok(ids)
    }

    /// Fetches one invited event. A missing event is an inconsistent join.
    pub async fn hydrate_one(&self, event_id: String) -> Result<Event, FeedError> {
        match self.store.get_by_id(EVENTS, &event_id).await? {
            Some(record) => decode_event(record),
            None => Err(FeedError::InconsistentJoin { event_id }),
        }
    }

    /// Hydrates `ids` with at most `hydrate_concurrency` lookups in flight.
    ///
    /// IDs whose event is gone are skipped. Any other failure aborts the
    /// whole batch and drops the lookups still in flight. Output order is
    /// unspecified.
    pub async fn hydrate(&self, ids: Vec<String>) -> Result<Vec<Event>, FeedError> {
        let mut events = Vec::with_capacity(ids.len());
        let mut lookups = stream::iter(ids)
            .map(|id| self.hydrate_one(id))
            .buffer_unordered(self.hydrate_concurrency);

        while let Some(result) = lookups.next().await {
            match result {
                Ok(event) => events.push(event),
                Err(FeedError::InconsistentJoin { event_id }) => {
                    tracing::warn!(event_id = %event_id, "skipping invitation to missing event");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(events)
    }

    /// All invited events not hosted by `requester_id`, in feed order.
    pub async fn fetch_invited_sorted(
        &self,
        address: &str,
        requester_id: &str,
    ) -> Result<Vec<Event>, FeedError> {
        let ids = self.invited_event_ids(address).await?;
        let candidates = ids.len();

        let mut events = self.hydrate(ids).await?;
        events.retain(|event| event.owner_id != requester_id);
        events.sort_by(feed_order);

        tracing::debug!(
            candidates,
            kept = events.len(),
            "hydrated invited events"
        );
        Ok(events)
    }

    /// One page of invited events.
    pub async fn fetch_invited(
        &self,
        address: &str,
        requester_id: &str,
        page: PageRequest,
    ) -> Result<Vec<Event>, FeedError> {
        let events = self.fetch_invited_sorted(address, requester_id).await?;
        Ok(slice_page(events, page))
    }

    /// The first `max_items` invited events, for merging with the hosting leg.
    pub async fn fetch_invited_prefix(
        &self,
        address: &str,
        requester_id: &str,
        max_items: usize,
    ) -> Result<Vec<Event>, FeedError> {
        let mut events = self.fetch_invited_sorted(address, requester_id).await?;
        events.truncate(max_items);
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::{TimeZone, Utc};
    use eventful_types::{Invitation, InvitationStatus};

    const ADDRESS: &str = "u1@example.com";

    fn invite(store: &MemoryStore, event_id: &str) {
        store
            .insert_invitation(&Invitation {
                event_id: event_id.to_string(),
                recipient_address: ADDRESS.to_string(),
                status: InvitationStatus::Pending,
            })
            .unwrap();
    }

    fn add_event(store: &MemoryStore, id: &str, owner: &str, day: u32) {
        let created = Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap();
        store.insert_event(&Event::new(id, owner, created)).unwrap();
    }

    fn ids(events: &[Event]) -> Vec<&str> {
        events.iter().map(|e| e.id.as_str()).collect()
    }

    #[tokio::test]
    async fn invited_events_are_resorted_by_creation_time() {
        let store = MemoryStore::new();
        // Index order is by event ID; creation order is the reverse.
        for (id, day) in [("a", 1), ("b", 2), ("c", 3)] {
            add_event(&store, id, "u2", day);
            invite(&store, id);
        }

        let source = InvitedSource::new(&store, 2, 10);
        let events = source.fetch_invited_sorted(ADDRESS, "u1").await.unwrap();
        assert_eq!(ids(&events), vec!["c", "b", "a"]);
    }

    #[tokio::test]
    async fn self_hosted_and_missing_events_are_dropped() {
        let store = MemoryStore::new();
        add_event(&store, "mine", "u1", 5);
        add_event(&store, "theirs", "u2", 4);
        invite(&store, "mine");
        invite(&store, "theirs");
        invite(&store, "deleted");

        let source = InvitedSource::new(&store, 4, 10);
        let events = source.fetch_invited_sorted(ADDRESS, "u1").await.unwrap();
        assert_eq!(ids(&events), vec!["theirs"]);
        assert_eq!(store.get_calls(), 3);
    }

    #[tokio::test]
    async fn ids_are_collected_across_short_rounds() {
        let store = MemoryStore::new().with_max_page_size(2);
        for i in 0..5 {
            let id = format!("e{i}");
            add_event(&store, &id, "u2", i + 1);
            invite(&store, &id);
        }

        let source = InvitedSource::new(&store, 3, 4);
        let ids = source.invited_event_ids(ADDRESS).await.unwrap();
        assert_eq!(ids, vec!["e0", "e1", "e2", "e3", "e4"]);
        assert_eq!(store.query_calls(), 3);
    }

    #[tokio::test]
    async fn pages_and_prefixes_slice_the_sorted_leg() {
        let store = MemoryStore::new();
        for i in 0..5 {
            let id = format!("e{i}");
            add_event(&store, &id, "u2", i + 1);
            invite(&store, &id);
        }

        let source = InvitedSource::new(&store, 2, 10);
        let page = source
            .fetch_invited(ADDRESS, "u1", PageRequest::new(2, 2))
            .await
            .unwrap();
        assert_eq!(ids(&page), vec!["e2", "e1"]);

        let prefix = source.fetch_invited_prefix(ADDRESS, "u1", 3).await.unwrap();
        assert_eq!(ids(&prefix), vec!["e4", "e3", "e2"]);
    }

    #[tokio::test]
    async fn store_failure_during_hydration_aborts() {
        let store = MemoryStore::new();
        add_event(&store, "e1", "u2", 1);
        invite(&store, "e1");

        let source = InvitedSource::new(&store, 2, 10);
        let ids = source.invited_event_ids(ADDRESS).await.unwrap();
        store.set_failing(true);

        let err = source.hydrate(ids).await.unwrap_err();
        assert!(matches!(err, FeedError::StoreUnavailable(_)));
    }

    #[tokio::test]
    async fn hydration_fan_out_is_bounded() {
        let store = MemoryStore::new().with_latency(std::time::Duration::from_millis(5));
        let ids: Vec<String> = (0..20).map(|i| format!("e{i:02}")).collect();
        for (i, id) in ids.iter().enumerate() {
            add_event(&store, id, "u2", 1 + (i as u32 % 28));
        }

        let source = InvitedSource::new(&store, 3, 10);
        let events = source.hydrate(ids).await.unwrap();

        assert_eq!(events.len(), 20);
        let peak = store.peak_gets_in_flight();
        assert!(peak <= 3, "at most 3 lookups in flight, saw {peak}");
        assert!(peak > 1, "lookups should overlap, saw {peak}");
    }
}
