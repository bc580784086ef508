use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use rusqlite::{params, Connection, ErrorCode, OptionalExtension};

use super::store::{DocumentStore, IdentityPatch, IdentityRecord, NewIdentity};
use crate::error::{StoreError, UniqueField};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS identities (
    recipient_id        TEXT NOT NULL UNIQUE,
    push_token          TEXT,
    direct_link_address TEXT NOT NULL UNIQUE,
    shard_index         INTEGER NOT NULL DEFAULT 0
);
";

/// Single-shard [`DocumentStore`] persisted in a SQLite file.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(e, rusqlite::Error::SqliteFailure(f, _) if f.code == ErrorCode::ConstraintViolation)
}

fn exists(conn: &Connection, column: &str, value: &str) -> Result<bool, StoreError> {
    // `column` is one of two fixed names, never user input.
    let sql = format!("SELECT 1 FROM identities WHERE {column} = ?1");
    Ok(conn
        .query_row(&sql, params![value], |_| Ok(()))
        .optional()?
        .is_some())
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<IdentityRecord> {
    let shard: i64 = row.get(3)?;
    Ok(IdentityRecord {
        recipient_id: row.get(0)?,
        push_token: row.get(1)?,
        direct_link_address: row.get(2)?,
        shard_index: usize::try_from(shard).unwrap_or_default(),
    })
}

impl DocumentStore for SqliteStore {
    fn shard_count(&self) -> usize {
        1
    }

    fn find(&self, recipient_id: &str) -> Result<Vec<IdentityRecord>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT recipient_id, push_token, direct_link_address, shard_index
             FROM identities WHERE recipient_id = ?1",
        )?;
        let rows = stmt.query_map(params![recipient_id], row_to_record)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn insert(&self, identity: NewIdentity) -> Result<IdentityRecord, StoreError> {
        let conn = self.lock();
        let result = conn.execute(
            "INSERT INTO identities (recipient_id, push_token, direct_link_address, shard_index)
             VALUES (?1, ?2, ?3, 0)",
            params![
                identity.recipient_id,
                identity.push_token,
                identity.direct_link_address
            ],
        );

        match result {
            Ok(_) => Ok(IdentityRecord {
                recipient_id: identity.recipient_id,
                push_token: identity.push_token,
                direct_link_address: identity.direct_link_address,
                shard_index: 0,
            }),
            Err(e) if is_constraint_violation(&e) => {
                let field = if exists(&conn, "recipient_id", &identity.recipient_id)? {
                    UniqueField::RecipientId
                } else {
                    UniqueField::DirectLinkAddress
                };
                Err(StoreError::Conflict(field))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn update(&self, recipient_id: &str, patch: &IdentityPatch) -> Result<usize, StoreError> {
        let conn = self.lock();
        let result = conn.execute(
            "UPDATE identities
             SET direct_link_address = COALESCE(?1, direct_link_address),
                 push_token = COALESCE(?2, push_token)
             WHERE recipient_id = ?3",
            params![patch.direct_link_address, patch.push_token, recipient_id],
        );

        match result {
            Ok(n) => Ok(n),
            Err(e) if is_constraint_violation(&e) && patch.direct_link_address.is_some() => {
                Err(StoreError::Conflict(UniqueField::DirectLinkAddress))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn list(&self) -> Result<Vec<IdentityRecord>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT recipient_id, push_token, direct_link_address, shard_index
             FROM identities ORDER BY rowid",
        )?;
        let rows = stmt.query_map([], row_to_record)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}
