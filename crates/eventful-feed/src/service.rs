//! The feed entry point.

use std::sync::Arc;
use std::time::{Duration, Instant};

use eventful_types::{Event, PageRequest, User, ViewMode};
use futures_util::future::try_join;
use serde::Serialize;

use crate::cursor::TokenCache;
use crate::error::FeedError;
use crate::guests::{Guest, GuestList};
use crate::hosting::{decode_event, HostingSource};
use crate::invited::InvitedSource;
use crate::merge::merge_and_page;
use crate::store::schema::EVENTS;
use crate::store::{PaginatedStore, UserDirectory};

/// Tunables for a [`FeedService`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedSettings {
    /// Largest accepted `limit`.
    pub max_page_size: u32,
    /// Maximum concurrent point lookups while hydrating invitations.
    pub hydrate_concurrency: usize,
    /// Records requested per round when reading invitation IDs.
    pub invitation_batch_size: usize,
    /// Deadline for a whole feed request. `None` disables it.
    pub request_timeout: Option<Duration>,
    /// Lifetime of cached continuation tokens. `None` disables the cache.
    pub cursor_cache_ttl: Option<Duration>,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            max_page_size: 100,
            hydrate_concurrency: 8,
            invitation_batch_size: 100,
            request_timeout: Some(Duration::from_secs(10)),
            cursor_cache_ttl: None,
        }
    }
}

/// An event together with the display name of its host.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDetail {
    #[serde(flatten)]
    pub event: Event,
    pub host_name: Option<String>,
}

/// Serves paged feeds and event lookups over a store and a user directory.
///
/// Stateless per request apart from the optional token cache, which only
/// ever shortens a walk.
pub struct FeedService<S: ?Sized, U: ?Sized> {
    store: Arc<S>,
    users: Arc<U>,
    settings: FeedSettings,
    cursor_cache: Option<TokenCache>,
}

impl<S, U> FeedService<S, U>
where
    S: PaginatedStore + ?Sized,
    U: UserDirectory + ?Sized,
{
    pub fn new(store: Arc<S>, users: Arc<U>, settings: FeedSettings) -> Self {
        let cursor_cache = settings
            .cursor_cache_ttl
            .filter(|ttl| !ttl.is_zero())
            .map(TokenCache::new);
        Self {
            store,
            users,
            settings,
            cursor_cache,
        }
    }

    pub fn settings(&self) -> &FeedSettings {
        &self.settings
    }

    /// Returns one page of `user_id`'s feed in the given view.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if `page.page` is 0 or `page.limit` is outside
    ///   `1..=max_page_size`.
    /// - `NotFound` if the user does not exist.
    /// - `StoreUnavailable` if any store call fails.
    /// - `DeadlineExceeded` if the request outlives `request_timeout`.
    pub async fn get_feed(
        &self,
        user_id: &str,
        view: ViewMode,
        page: PageRequest,
    ) -> Result<Vec<Event>, FeedError> {
        self.validate_page(page)?;
        let started = Instant::now();

        let result = match self.settings.request_timeout {
            Some(deadline) => tokio::time::timeout(deadline, self.resolve_feed(user_id, view, page))
                .await
                .map_err(|_| FeedError::DeadlineExceeded(deadline))
                .and_then(|inner| inner),
            None => self.resolve_feed(user_id, view, page).await,
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(events) => tracing::info!(
                user_id,
                view = %view,
                page = page.page,
                limit = page.limit,
                returned = events.len(),
                elapsed_ms,
                "served feed page"
            ),
            Err(e) => tracing::debug!(
                user_id,
                view = %view,
                page = page.page,
                limit = page.limit,
                elapsed_ms,
                error = %e,
                "feed request failed"
            ),
        }
        result
    }

    /// Like [`get_feed`](Self::get_feed), with the view given as its label
    /// (`ALL`, `HOSTING` or `INVITED`).
    pub async fn get_feed_by_label(
        &self,
        user_id: &str,
        view: &str,
        page: PageRequest,
    ) -> Result<Vec<Event>, FeedError> {
        let view: ViewMode = view.parse()?;
        self.get_feed(user_id, view, page).await
    }

    /// Looks up one event and its host's name.
    pub async fn get_event(&self, event_id: &str) -> Result<EventDetail, FeedError> {
        let record = self
            .store
            .get_by_id(EVENTS, event_id)
            .await?
            .ok_or_else(|| FeedError::NotFound(format!("event '{event_id}'")))?;
        let event = decode_event(record)?;

        let host = self
            .users
            .find_user(&event.owner_id)
            .await?
            .ok_or_else(|| FeedError::NotFound(format!("host '{}' of event '{event_id}'", event.owner_id)))?;

        Ok(EventDetail {
            event,
            host_name: host.name,
        })
    }

    /// Lists everyone invited to `event_id`, in recipient-address order.
    ///
    /// Returns `NotFound` if the event does not exist, so an unknown event
    /// and an event without invitations are distinguishable.
    pub async fn get_event_guests(&self, event_id: &str) -> Result<Vec<Guest>, FeedError> {
        let store = &*self.store;
        if store.get_by_id(EVENTS, event_id).await?.is_none() {
            return Err(FeedError::NotFound(format!("event '{event_id}'")));
        }
        GuestList::new(
            store,
            self.settings.hydrate_concurrency,
            self.settings.invitation_batch_size,
        )
        .fetch_guests(event_id)
        .await
    }

    /// Looks up a user profile.
    pub async fn get_user(&self, user_id: &str) -> Result<User, FeedError> {
        self.users
            .find_user(user_id)
            .await?
            .ok_or_else(|| FeedError::NotFound(format!("user '{user_id}'")))
    }

    fn validate_page(&self, page: PageRequest) -> Result<(), FeedError> {
        if page.page < 1 {
            return Err(FeedError::InvalidArgument(format!(
                "page must be at least 1, got {}",
                page.page
            )));
        }
        if page.limit < 1 || page.limit > self.settings.max_page_size {
            return Err(FeedError::InvalidArgument(format!(
                "limit must be between 1 and {}, got {}",
                self.settings.max_page_size, page.limit
            )));
        }
        Ok(())
    }

    async fn resolve_feed(
        &self,
        user_id: &str,
        view: ViewMode,
        page: PageRequest,
    ) -> Result<Vec<Event>, FeedError> {
        let user = self
            .users
            .find_user(user_id)
            .await?
            .ok_or_else(|| FeedError::NotFound(format!("user '{user_id}'")))?;

        let store = &*self.store;
        let hosting = HostingSource::new(store, self.cursor_cache.as_ref());
        let invited = InvitedSource::new(
            store,
            self.settings.hydrate_concurrency,
            self.settings.invitation_batch_size,
        );

        match view {
            ViewMode::Hosting => hosting.fetch_owned(&user.id, page).await,
            ViewMode::Invited => {
                invited
                    .fetch_invited(&user.contact_address, &user.id, page)
                    .await
            }
            ViewMode::All => {
                // Both legs need their first `page * limit` items for the
                // merged window to be complete.
                let bound = page.end();
                let (hosted, invited) = try_join(
                    hosting.fetch_owned_prefix(&user.id, bound, bound),
                    invited.fetch_invited_prefix(&user.contact_address, &user.id, bound),
                )
                .await?;
                Ok(merge_and_page(hosted, invited, page))
            }
        }
    }
}
