//! SQLite-backed store.
//!
//! Keyed queries use keyset pagination: the continuation token records the
//! sort and tie-break values of the last row returned, so resuming costs one
//! indexed seek rather than an OFFSET scan. Tokens are URL-safe base64 of a
//! small JSON object that also carries the query fingerprint.
//!
//! SQLite calls are blocking and run on `spawn_blocking` with a pooled
//! connection.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use eventful_db::DbPool;
use eventful_types::{timestamp, Event, Invitation, User};
use rusqlite::types::ToSql;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use async_trait::async_trait;

use super::schema;
use super::{
    decode_user, project, ContinuationToken, KeyQuery, PaginatedStore, QueryPage, Record,
    StoreError, UserDirectory,
};

/// A [`PaginatedStore`] over the Eventful SQLite database.
#[derive(Clone)]
pub struct SqliteStore {
    pool: DbPool,
}

impl SqliteStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    async fn run<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let conn = pool.get()?;
            op(&conn)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

#[async_trait]
impl PaginatedStore for SqliteStore {
    async fn query_by_key(
        &self,
        query: &KeyQuery,
        limit: usize,
        token: Option<&ContinuationToken>,
    ) -> Result<QueryPage, StoreError> {
        let query = query.clone();
        let token = token.cloned();
        self.run(move |conn| query_index(conn, &query, limit, token.as_ref()))
            .await
    }

    async fn get_by_id(&self, collection: &str, id: &str) -> Result<Option<Record>, StoreError> {
        let collection = schema::id_collection(collection)?;
        let id = id.to_string();
        self.run(move |conn| get_record(conn, collection, &id)).await
    }
}

#[async_trait]
impl UserDirectory for SqliteStore {
    async fn find_user(&self, user_id: &str) -> Result<Option<User>, StoreError> {
        self.get_by_id(schema::USERS, user_id)
            .await?
            .map(decode_user)
            .transpose()
    }
}

/// Position after the last row of a round.
#[derive(Debug, Serialize, Deserialize)]
struct SqlCursor {
    #[serde(rename = "q")]
    query: String,
    #[serde(rename = "s", default, skip_serializing_if = "Option::is_none")]
    sort: Option<String>,
    #[serde(rename = "t")]
    tiebreak: String,
}

impl SqlCursor {
    fn encode(&self) -> Result<ContinuationToken, StoreError> {
        let json = serde_json::to_vec(self)?;
        Ok(ContinuationToken::new(URL_SAFE_NO_PAD.encode(json)))
    }

    fn decode(token: &ContinuationToken, fingerprint: &str) -> Result<Self, StoreError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(token.as_str())
            .map_err(|_| StoreError::InvalidToken)?;
        let cursor: Self = serde_json::from_slice(&bytes).map_err(|_| StoreError::InvalidToken)?;
        if cursor.query != fingerprint {
            return Err(StoreError::InvalidToken);
        }
        Ok(cursor)
    }
}

/// Runs one round of a keyed index query.
///
/// # Errors
///
/// Returns `StoreError::UnknownIndex` for unregistered indexes,
/// `StoreError::InvalidToken` for tokens minted by another query, and
/// `StoreError::Database` on SQL failure.
pub fn query_index(
    conn: &Connection,
    query: &KeyQuery,
    limit: usize,
    token: Option<&ContinuationToken>,
) -> Result<QueryPage, StoreError> {
    let spec = schema::lookup_index(query.collection, query.index)?;
    let fingerprint = query.fingerprint();
    let cursor = token
        .map(|token| SqlCursor::decode(token, &fingerprint))
        .transpose()?;
    let limit = limit.max(1);
    let tiebreak = spec.tiebreak.column;

    // Parameters are bound separately; only registered column names are
    // interpolated.
    let mut clauses = vec![format!("{} = ?1", spec.key.column)];
    let mut values: Vec<Box<dyn ToSql>> = vec![Box::new(query.key.clone())];
    let mut order = Vec::new();

    let sort_select = match spec.sort {
        Some(sort) => {
            let (cmp, direction) = if query.descending {
                ("<", "DESC")
            } else {
                (">", "ASC")
            };
            if let Some(cursor) = &cursor {
                let s = values.len() + 1;
                let t = s + 1;
                clauses.push(format!(
                    "({col} {cmp} ?{s} OR ({col} = ?{s} AND {tiebreak} > ?{t}))",
                    col = sort.column
                ));
                values.push(Box::new(cursor.sort.clone().unwrap_or_default()));
                values.push(Box::new(cursor.tiebreak.clone()));
            }
            order.push(format!("{} {direction}", sort.column));
            sort.column
        }
        None => {
            if let Some(cursor) = &cursor {
                clauses.push(format!("{tiebreak} > ?{}", values.len() + 1));
                values.push(Box::new(cursor.tiebreak.clone()));
            }
            "NULL"
        }
    };
    order.push(format!("{tiebreak} ASC"));

    // One extra row tells us whether the stream continues.
    let limit_idx = values.len() + 1;
    values.push(Box::new(i64::try_from(limit + 1).unwrap_or(i64::MAX)));

    let sql = format!(
        "SELECT doc_json, {sort_select}, {tiebreak}
         FROM {table}
         WHERE {filter}
         ORDER BY {order}
         LIMIT ?{limit_idx}",
        table = spec.collection,
        filter = clauses.join(" AND "),
        order = order.join(", "),
    );

    let params_refs: Vec<&dyn ToSql> = values.iter().map(|p| &**p).collect();
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_refs.as_slice(), |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, Option<String>>(1)?,
            row.get::<_, String>(2)?,
        ))
    })?;

    let mut fetched = Vec::new();
    for row in rows {
        fetched.push(row?);
    }

    let has_more = fetched.len() > limit;
    fetched.truncate(limit);

    let next_token = match fetched.last() {
        Some((_, sort, tiebreak)) if has_more => Some(
            SqlCursor {
                query: fingerprint,
                sort: sort.clone(),
                tiebreak: tiebreak.clone(),
            }
            .encode()?,
        ),
        _ => None,
    };

    let mut items = Vec::with_capacity(fetched.len());
    for (doc_json, _, _) in fetched {
        let record: Record = serde_json::from_str(&doc_json)?;
        items.push(project(record, query.projection.as_deref()));
    }

    Ok(QueryPage { items, next_token })
}

/// Point lookup of one document by ID.
///
/// # Errors
///
/// Returns `StoreError::UnknownCollection` for collections without an `id`
/// key and `StoreError::Database` on SQL failure.
pub fn get_record(
    conn: &Connection,
    collection: &str,
    id: &str,
) -> Result<Option<Record>, StoreError> {
    let table = schema::id_collection(collection)?;
    let doc_json: Option<String> = conn
        .query_row(
            &format!("SELECT doc_json FROM {table} WHERE id = ?1"),
            [id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(doc_json.map(|doc| serde_json::from_str(&doc)).transpose()?)
}

/// Inserts or replaces a user.
pub fn insert_user(conn: &Connection, user: &User) -> Result<(), StoreError> {
    conn.execute(
        "INSERT OR REPLACE INTO users (id, contact_address, doc_json) VALUES (?1, ?2, ?3)",
        params![user.id, user.contact_address, serde_json::to_string(user)?],
    )?;
    Ok(())
}

/// Inserts or replaces an event.
pub fn insert_event(conn: &Connection, event: &Event) -> Result<(), StoreError> {
    conn.execute(
        "INSERT OR REPLACE INTO events (id, owner_id, created_at, doc_json) VALUES (?1, ?2, ?3, ?4)",
        params![
            event.id,
            event.owner_id,
            timestamp::format(&event.created_at),
            serde_json::to_string(event)?,
        ],
    )?;
    Ok(())
}

/// Inserts or replaces an invitation.
pub fn insert_invitation(conn: &Connection, invitation: &Invitation) -> Result<(), StoreError> {
    conn.execute(
        "INSERT OR REPLACE INTO invitations (event_id, recipient_address, status, doc_json)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            invitation.event_id,
            invitation.recipient_address,
            invitation.status.as_str(),
            serde_json::to_string(invitation)?,
        ],
    )?;
    Ok(())
}

/// Deletes an event, leaving any invitations that reference it in place.
pub fn delete_event(conn: &Connection, event_id: &str) -> Result<bool, StoreError> {
    let deleted = conn.execute("DELETE FROM events WHERE id = ?1", [event_id])?;
    Ok(deleted > 0)
}
