//! Guest lists.
//!
//! An event's guests are its invitations, read through the `eventId-index`
//! in recipient-address order. Each address is then matched against the
//! user directory's `contactAddress-index`; invitees without an account are
//! still listed, with no user ID or name.

use eventful_types::{Invitation, InvitationStatus, User};
use futures_util::stream::{self, StreamExt, TryStreamExt};
use serde::Serialize;

use crate::cursor::CursorWalker;
use crate::error::FeedError;
use crate::store::schema::{INVITATIONS, INVITATIONS_BY_EVENT, USERS, USERS_BY_ADDRESS};
use crate::store::{decode_user, KeyQuery, PaginatedStore, Record};

/// One invitee of an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Guest {
    /// The invitee's user ID, if the address belongs to a registered user.
    pub user_id: Option<String>,
    pub name: Option<String>,
    pub contact_address: String,
    pub invitation_status: InvitationStatus,
}

/// Reads guest lists through the invitation and user-address indexes.
pub struct GuestList<'a, S: PaginatedStore + ?Sized> {
    store: &'a S,
    lookup_concurrency: usize,
    batch_size: usize,
}

impl<'a, S: PaginatedStore + ?Sized> GuestList<'a, S> {
    pub fn new(store: &'a S, lookup_concurrency: usize, batch_size: usize) -> Self {
        Self {
            store,
            lookup_concurrency: lookup_concurrency.max(1),
            batch_size: batch_size.max(1),
        }
    }

    /// The invitation index query for `event_id`.
    pub fn query(event_id: &str) -> KeyQuery {
        KeyQuery::new(INVITATIONS, INVITATIONS_BY_EVENT, event_id)
    }

    /// Every invitation to `event_id`, in recipient-address order.
    pub async fn invitations(&self, event_id: &str) -> Result<Vec<Invitation>, FeedError> {
        let records = CursorWalker::new(self.store)
            .collect_prefix(&Self::query(event_id), None, self.batch_size)
            .await?;
        records.into_iter().map(decode_invitation).collect()
    }

    /// The registered user behind `address`, if any.
    pub async fn user_for_address(&self, address: &str) -> Result<Option<User>, FeedError> {
        let query = KeyQuery::new(USERS, USERS_BY_ADDRESS, address);
        let page = self.store.query_by_key(&query, 1, None).await?;
        Ok(page.items.into_iter().next().map(decode_user).transpose()?)
    }

    /// The guest list of `event_id`, in recipient-address order.
    ///
    /// Address lookups run with at most `lookup_concurrency` in flight. Any
    /// store failure fails the whole list.
    pub async fn fetch_guests(&self, event_id: &str) -> Result<Vec<Guest>, FeedError> {
        let invitations = self.invitations(event_id).await?;
        let invited = invitations.len();

        let guests: Vec<Guest> = stream::iter(invitations)
            .map(|invitation| async move {
                let user = self.user_for_address(&invitation.recipient_address).await?;
                Ok::<_, FeedError>(Guest {
                    user_id: user.as_ref().map(|u| u.id.clone()),
                    name: user.and_then(|u| u.name),
                    contact_address: invitation.recipient_address,
                    invitation_status: invitation.status,
                })
            })
            .buffered(self.lookup_concurrency)
            .try_collect()
            .await?;

        tracing::debug!(
            event_id,
            invited,
            registered = guests.iter().filter(|g| g.user_id.is_some()).count(),
            "resolved guest list"
        );
        Ok(guests)
    }
}

fn decode_invitation(record: Record) -> Result<Invitation, FeedError> {
    serde_json::from_value(record).map_err(|e| FeedError::Malformed(format!("invitation: {e}")))
}
