//! The storage collaborator seen by the feed.
//!
//! The feed reads through two narrow interfaces:
//!
//! - [`PaginatedStore`]: forward-only keyed range queries over a secondary
//!   index (`query_by_key`) and point lookups by ID (`get_by_id`).
//! - [`UserDirectory`]: resolves a user ID to the user record, and with it
//!   the contact address used to join against invitations.
//!
//! Continuation tokens are minted and interpreted by the store alone. The
//! feed only threads them from one round to the next and never looks inside.

pub mod memory;
pub mod schema;
pub mod sqlite;

use async_trait::async_trait;
use eventful_types::User;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use thiserror::Error;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// A stored document, as returned by the store.
pub type Record = Value;

/// Opaque resume point of a forward-only query.
///
/// A token is valid only for the exact query that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContinuationToken(String);

impl ContinuationToken {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A keyed range query against one secondary index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyQuery {
    /// Collection (table) to read.
    pub collection: &'static str,
    /// Secondary index to read through.
    pub index: &'static str,
    /// Value of the index's partition key.
    pub key: String,
    /// Newest first on the index's sort key.
    pub descending: bool,
    /// Fields to return. `None` returns whole records.
    pub projection: Option<Vec<&'static str>>,
}

impl KeyQuery {
    pub fn new(collection: &'static str, index: &'static str, key: impl Into<String>) -> Self {
        Self {
            collection,
            index,
            key: key.into(),
            descending: false,
            projection: None,
        }
    }

    pub fn descending(mut self) -> Self {
        self.descending = true;
        self
    }

    pub fn project(mut self, fields: &[&'static str]) -> Self {
        self.projection = Some(fields.to_vec());
        self
    }

    /// Stable digest identifying this exact query.
    ///
    /// Stores embed it in the tokens they mint and reject tokens carrying a
    /// different fingerprint. The token cache keys on it as well.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.collection.as_bytes());
        hasher.update([0]);
        hasher.update(self.index.as_bytes());
        hasher.update([0]);
        hasher.update(self.key.as_bytes());
        hasher.update([0, u8::from(self.descending), 0]);
        if let Some(fields) = &self.projection {
            for field in fields {
                hasher.update(field.as_bytes());
                hasher.update([b',']);
            }
        }
        hex::encode(&hasher.finalize()[..12])
    }
}

/// One round of a keyed range query.
#[derive(Debug, Clone, Default)]
pub struct QueryPage {
    /// Records in index order.
    pub items: Vec<Record>,
    /// Resume point, absent at end of stream.
    pub next_token: Option<ContinuationToken>,
}

/// Errors raised by store implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A SQLite operation failed.
    #[error("store database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// No pooled connection could be obtained.
    #[error("store connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// A blocking store task panicked or was cancelled.
    #[error("store task failed: {0}")]
    Task(String),

    /// A stored document could not be encoded or decoded.
    #[error("store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The (collection, index) pair is not registered.
    #[error("unknown index '{index}' on collection '{collection}'")]
    UnknownIndex { collection: String, index: String },

    /// The collection does not support point lookups or does not exist.
    #[error("unknown collection: {0}")]
    UnknownCollection(String),

    /// The token was minted for a different query, or is garbage.
    #[error("continuation token does not belong to this query")]
    InvalidToken,

    /// The backend refused or failed the request.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Forward-only paginated access to the indexed collections.
#[async_trait]
pub trait PaginatedStore: Send + Sync {
    /// Returns up to `limit` records of `query` after `token`, in index
    /// order, with the token to resume from if the stream continues.
    async fn query_by_key(
        &self,
        query: &KeyQuery,
        limit: usize,
        token: Option<&ContinuationToken>,
    ) -> Result<QueryPage, StoreError>;

    /// Point lookup of one record by ID.
    async fn get_by_id(&self, collection: &str, id: &str) -> Result<Option<Record>, StoreError>;
}

/// Resolves users by ID.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_user(&self, user_id: &str) -> Result<Option<User>, StoreError>;
}

/// Keeps only the projected fields of a record.
pub(crate) fn project(record: Record, fields: Option<&[&'static str]>) -> Record {
    let Some(fields) = fields else {
        return record;
    };
    match record {
        Value::Object(mut doc) => {
            let projected: Map<String, Value> = fields
                .iter()
                .filter_map(|field| doc.remove(*field).map(|value| (field.to_string(), value)))
                .collect();
            Value::Object(projected)
        }
        other => other,
    }
}

/// Decodes a user document.
pub(crate) fn decode_user(record: Record) -> Result<User, StoreError> {
    Ok(serde_json::from_value(record)?)
}
