//! Shared record types for the Eventful platform.
//!
//! This crate provides the types every other Eventful crate agrees on:
//! the stored records (`Event`, `Invitation`, `User`), the feed view
//! selector (`ViewMode`), and the offset-style page request
//! (`PageRequest`).
//!
//! Records serialise with camelCase field names, matching the documents the
//! storage layer keeps. Timestamps are written in a fixed-width RFC 3339 form
//! (see [`timestamp`]) so that their string order equals their time order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// An event hosted by a user.
///
/// Only `id`, `owner_id` and `created_at` carry meaning for the feed; every
/// other stored field (name, description, capacity, ...) is kept verbatim in
/// `details` and returned to callers untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Globally unique event ID.
    pub id: String,
    /// ID of the user hosting the event.
    pub owner_id: String,
    /// Creation time. Assigned once by the write path and never mutated.
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    /// Descriptive payload, opaque to the feed.
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

impl Event {
    /// Creates an event with an empty descriptive payload.
    pub fn new(id: impl Into<String>, owner_id: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            owner_id: owner_id.into(),
            created_at,
            details: Map::new(),
        }
    }

    /// Adds a descriptive field, returning the event for chaining.
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }
}

/// Response status of an invitation. Opaque to the feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvitationStatus {
    Pending,
    Accepted,
    Declined,
}

impl InvitationStatus {
    /// Returns the canonical string label for this status.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Accepted => "ACCEPTED",
            Self::Declined => "DECLINED",
        }
    }
}

/// An invitation of a contact address to an event.
///
/// Keyed by `(event_id, recipient_address)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invitation {
    pub event_id: String,
    pub recipient_address: String,
    pub status: InvitationStatus,
}

/// A registered user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// User ID.
    pub id: String,
    /// Contact address (email); the join key against
    /// [`Invitation::recipient_address`].
    pub contact_address: String,
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Selects which sources populate a feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ViewMode {
    /// Hosted and invited events, merged.
    All,
    /// Events the user hosts.
    Hosting,
    /// Events the user was invited to and does not host.
    Invited,
}

impl ViewMode {
    /// Returns the canonical string label for this view mode.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::All => "ALL",
            Self::Hosting => "HOSTING",
            Self::Invited => "INVITED",
        }
    }
}

impl std::fmt::Display for ViewMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ViewMode {
    type Err = ParseViewModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ALL" => Ok(Self::All),
            "HOSTING" => Ok(Self::Hosting),
            "INVITED" => Ok(Self::Invited),
            _ => Err(ParseViewModeError(s.to_string())),
        }
    }
}

/// Error returned when parsing an unknown view mode string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown view mode: {0} (expected one of: ALL, HOSTING, INVITED)")]
pub struct ParseViewModeError(pub String);

/// Offset-style page address: 1-based page number and page size.
///
/// Construction does not validate; bounds are enforced by the feed service,
/// which knows the configured maximum page size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageRequest {
    /// 1-based page number.
    pub page: u32,
    /// Number of items per page.
    pub limit: u32,
}

impl PageRequest {
    /// Page number used when the caller supplies none.
    pub const DEFAULT_PAGE: u32 = 1;
    /// Page size used when the caller supplies none.
    pub const DEFAULT_LIMIT: u32 = 10;

    pub fn new(page: u32, limit: u32) -> Self {
        Self { page, limit }
    }

    /// Index of the first item of this page in the full ordered sequence.
    pub fn offset(&self) -> usize {
        (self.page.saturating_sub(1) as usize).saturating_mul(self.limit as usize)
    }

    /// Exclusive end index of this page, i.e. `page * limit`.
    ///
    /// This is also the over-fetch bound: a source must yield this many
    /// items for the page to be fully resolved.
    pub fn end(&self) -> usize {
        (self.page as usize).saturating_mul(self.limit as usize)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(Self::DEFAULT_PAGE, Self::DEFAULT_LIMIT)
    }
}

/// Fixed-width RFC 3339 timestamps (UTC, microsecond precision, `Z` suffix).
///
/// Every stored timestamp uses this form, which makes lexicographic order
/// on the serialised strings identical to chronological order.
///
/// Reading accepts any RFC 3339 string (other offsets, second or millisecond
/// precision) and writing always emits the canonical form. A `createdAt`
/// returned to a client therefore names the same instant the writer stored,
/// but not necessarily the same text: `2024-01-03T01:00:00+01:00` comes back
/// as `2024-01-03T00:00:00.000000Z`. Precision below a microsecond is dropped.
pub mod timestamp {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    /// Formats a timestamp in the canonical stored form.
    pub fn format(ts: &DateTime<Utc>) -> String {
        ts.to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    pub fn serialize<S>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format(ts))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn view_mode_parses_known_labels() {
        assert_eq!("ALL".parse::<ViewMode>(), Ok(ViewMode::All));
        assert_eq!("HOSTING".parse::<ViewMode>(), Ok(ViewMode::Hosting));
        assert_eq!("INVITED".parse::<ViewMode>(), Ok(ViewMode::Invited));
    }

    #[test]
    fn view_mode_rejects_unknown_and_lowercase_labels() {
        let err = "BOGUS".parse::<ViewMode>().unwrap_err();
        assert_eq!(err, ParseViewModeError("BOGUS".to_string()));
        assert!("all".parse::<ViewMode>().is_err());
    }

    #[test]
    fn page_request_bounds() {
        let page = PageRequest::new(3, 10);
        assert_eq!(page.offset(), 20);
        assert_eq!(page.end(), 30);
        assert_eq!(PageRequest::default(), PageRequest::new(1, 10));
    }

    #[test]
    fn event_keeps_opaque_fields() {
        let json = serde_json::json!({
            "id": "e1",
            "ownerId": "u1",
            "createdAt": "2024-01-03T00:00:00Z",
            "name": "Launch party",
            "capacity": 40,
            "isPublic": true
        });

        let event: Event = serde_json::from_value(json).expect("event should deserialise");
        assert_eq!(event.owner_id, "u1");
        assert_eq!(event.created_at, Utc.with_ymd_and_hms(2024, 1, 3, 0, 0, 0).unwrap());
        assert_eq!(event.details["name"], "Launch party");
        assert_eq!(event.details["capacity"], 40);

        let back = serde_json::to_value(&event).expect("event should serialise");
        assert_eq!(back["createdAt"], "2024-01-03T00:00:00.000000Z");
        assert_eq!(back["isPublic"], true);
    }

    #[test]
    fn timestamp_strings_sort_chronologically() {
        let earlier = Utc.with_ymd_and_hms(2024, 1, 2, 23, 59, 59).unwrap();
        let later = earlier + chrono::Duration::milliseconds(1);
        assert!(timestamp::format(&earlier) < timestamp::format(&later));
    }

    #[test]
    fn timestamps_are_normalised_to_the_canonical_form() {
        for raw in [
            "2024-01-03T00:00:00Z",
            "2024-01-03T00:00:00.000Z",
            "2024-01-03T01:00:00+01:00",
        ] {
            let event: Event = serde_json::from_value(serde_json::json!({
                "id": "e1",
                "ownerId": "u1",
                "createdAt": raw,
            }))
            .unwrap();
            let back = serde_json::to_value(&event).unwrap();
            assert_eq!(back["createdAt"], "2024-01-03T00:00:00.000000Z", "{raw}");
        }

        let event: Event = serde_json::from_value(serde_json::json!({
            "id": "e1",
            "ownerId": "u1",
            "createdAt": "2024-01-03T00:00:00.123456789Z",
        }))
        .unwrap();
        assert_eq!(timestamp::format(&event.created_at), "2024-01-03T00:00:00.123456Z");
    }
}
