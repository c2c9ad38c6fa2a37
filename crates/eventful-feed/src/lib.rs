//! Paged per-user event feeds for the Eventful platform.
//!
//! A feed is built from two sources that only support forward cursor
//! pagination:
//!
//! | Leg | Read through | Order |
//! |-----|--------------|-------|
//! | hosting | `events` / `ownerId-createdAt-index` | newest first, native |
//! | invited | `invitations` / `recipientAddress-index`, then point lookups | re-sorted in memory |
//!
//! [`FeedService`] turns those into offset-addressed pages (`page`, `limit`)
//! in three views: hosted events, invited events, or both merged with each
//! event appearing once. The feed order is `createdAt` descending with `id`
//! ascending as the tie-break.
//!
//! Alongside feeds the service answers the lookups an event page needs: one
//! event with its host's name, an event's guest list, and a user profile.
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use eventful_feed::{FeedService, FeedSettings, SqliteStore};
//! use eventful_types::{PageRequest, ViewMode};
//!
//! let store = Arc::new(SqliteStore::new(pool));
//! let feed = FeedService::new(store.clone(), store, FeedSettings::default());
//! let events = feed.get_feed("u1", ViewMode::All, PageRequest::new(1, 10)).await?;
//! ```

pub mod cursor;
mod error;
pub mod guests;
pub mod hosting;
pub mod invited;
pub mod merge;
mod service;
pub mod store;

pub use cursor::{CursorWalker, TokenCache, WalkedPage};
pub use error::FeedError;
pub use guests::{Guest, GuestList};
pub use hosting::HostingSource;
pub use invited::InvitedSource;
pub use merge::{feed_order, merge_and_page};
pub use service::{EventDetail, FeedService, FeedSettings};
pub use store::{
    ContinuationToken, KeyQuery, MemoryStore, PaginatedStore, QueryPage, Record, SqliteStore,
    StoreError, UserDirectory,
};
