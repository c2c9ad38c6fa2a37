//! Collections and secondary indexes known to the stores.
//!
//! Ordering within an index is: the sort field in the requested direction,
//! then the tie-break field ascending. Indexes without a sort field are read
//! in tie-break order regardless of direction.

use super::StoreError;

pub const EVENTS: &str = "events";
pub const USERS: &str = "users";
pub const INVITATIONS: &str = "invitations";

/// Events by owner, ordered by creation time.
pub const EVENTS_BY_OWNER: &str = "ownerId-createdAt-index";
/// Invitations by recipient address. Not ordered by event creation time.
pub const INVITATIONS_BY_RECIPIENT: &str = "recipientAddress-index";
/// Invitations to one event, i.e. its guest list.
pub const INVITATIONS_BY_EVENT: &str = "eventId-index";
/// Users by contact address.
pub const USERS_BY_ADDRESS: &str = "contactAddress-index";

/// A document field and the column mirroring it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    /// Field name in the stored document.
    pub name: &'static str,
    /// Column name in the SQLite table.
    pub column: &'static str,
}

/// Definition of a secondary index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexSpec {
    pub collection: &'static str,
    pub name: &'static str,
    /// Partition key; queries match it exactly.
    pub key: Field,
    /// Range key, if the index has one.
    pub sort: Option<Field>,
    /// Always ascending; makes the order total.
    pub tiebreak: Field,
}

pub const INDEXES: &[IndexSpec] = &[
    IndexSpec {
        collection: EVENTS,
        name: EVENTS_BY_OWNER,
        key: Field {
            name: "ownerId",
            column: "owner_id",
        },
        sort: Some(Field {
            name: "createdAt",
            column: "created_at",
        }),
        tiebreak: Field {
            name: "id",
            column: "id",
        },
    },
    IndexSpec {
        collection: INVITATIONS,
        name: INVITATIONS_BY_RECIPIENT,
        key: Field {
            name: "recipientAddress",
            column: "recipient_address",
        },
        sort: None,
        tiebreak: Field {
            name: "eventId",
            column: "event_id",
        },
    },
    IndexSpec {
        collection: INVITATIONS,
        name: INVITATIONS_BY_EVENT,
        key: Field {
            name: "eventId",
            column: "event_id",
        },
        sort: None,
        tiebreak: Field {
            name: "recipientAddress",
            column: "recipient_address",
        },
    },
    IndexSpec {
        collection: USERS,
        name: USERS_BY_ADDRESS,
        key: Field {
            name: "contactAddress",
            column: "contact_address",
        },
        sort: None,
        tiebreak: Field {
            name: "id",
            column: "id",
        },
    },
];

/// Collections addressable by `id`.
const ID_COLLECTIONS: &[&str] = &[EVENTS, USERS];

/// Looks up an index definition.
pub fn lookup_index(collection: &str, index: &str) -> Result<&'static IndexSpec, StoreError> {
    INDEXES
        .iter()
        .find(|spec| spec.collection == collection && spec.name == index)
        .ok_or_else(|| StoreError::UnknownIndex {
            collection: collection.to_string(),
            index: index.to_string(),
        })
}

/// Returns the canonical name of a collection that supports `get_by_id`.
pub fn id_collection(collection: &str) -> Result<&'static str, StoreError> {
    ID_COLLECTIONS
        .iter()
        .copied()
        .find(|name| *name == collection)
        .ok_or_else(|| StoreError::UnknownCollection(collection.to_string()))
}
