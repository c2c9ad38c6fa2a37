//! Events hosted by a user, read straight off the owner index.

use eventful_types::{Event, PageRequest};

use crate::cursor::{CursorWalker, TokenCache};
use crate::error::FeedError;
use crate::store::schema::{EVENTS, EVENTS_BY_OWNER};
use crate::store::{KeyQuery, PaginatedStore, Record};

/// Reads a user's hosted events, newest first.
pub struct HostingSource<'a, S: PaginatedStore + ?Sized> {
    store: &'a S,
    cache: Option<&'a TokenCache>,
}

impl<'a, S: PaginatedStore + ?Sized> HostingSource<'a, S> {
    pub fn new(store: &'a S, cache: Option<&'a TokenCache>) -> Self {
        Self { store, cache }
    }

    /// The owner index query for `owner_id`.
    pub fn query(owner_id: &str) -> KeyQuery {
        KeyQuery::new(EVENTS, EVENTS_BY_OWNER, owner_id).descending()
    }

    /// One page of hosted events. The index order is already the feed order.
    pub async fn fetch_owned(
        &self,
        owner_id: &str,
        page: PageRequest,
    ) -> Result<Vec<Event>, FeedError> {
        let walked = CursorWalker::new(self.store)
            .with_cache(self.cache)
            .fetch_page(&Self::query(owner_id), page)
            .await?;
        decode_events(walked.items)
    }

    /// The first `max_items` hosted events, for merging with the invited leg.
    pub async fn fetch_owned_prefix(
        &self,
        owner_id: &str,
        max_items: usize,
        batch_size: usize,
    ) -> Result<Vec<Event>, FeedError> {
        let items = CursorWalker::new(self.store)
            .collect_prefix(&Self::query(owner_id), Some(max_items), batch_size)
            .await?;
        decode_events(items)
    }
}

pub(crate) fn decode_event(record: Record) -> Result<Event, FeedError> {
    serde_json::from_value(record).map_err(|e| FeedError::Malformed(format!("event: {e}")))
}

pub(crate) fn decode_events(records: Vec<Record>) -> Result<Vec<Event>, FeedError> {
    records.into_iter().map(decode_event).collect()
}
