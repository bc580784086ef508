//! Identity directory: recipient id → push token and direct-link address.
//!
//! Records are created on the first upsert that carries an address and
//! updated in place afterwards. Nothing deletes them.

mod sqlite;
mod store;

pub use sqlite::SqliteStore;
pub use store::{DocumentStore, IdentityPatch, IdentityRecord, MemoryStore, NewIdentity};

use std::sync::Arc;

use crate::error::DirectoryError;

/// One upsert request. At least one of the optional fields must be set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Upsert {
    pub recipient_id: String,
    pub direct_link_address: Option<String>,
    pub push_token: Option<String>,
}

impl Upsert {
    pub fn new(recipient_id: impl Into<String>) -> Self {
        Self {
            recipient_id: recipient_id.into(),
            ..Default::default()
        }
    }

    pub fn direct_link_address(mut self, address: impl Into<String>) -> Self {
        self.direct_link_address = Some(address.into());
        self
    }

    pub fn push_token(mut self, token: impl Into<String>) -> Self {
        self.push_token = Some(token.into());
        self
    }
}

/// Whether an upsert created or updated its record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created { shard_index: usize },
    Updated { copies: usize },
}

pub struct IdentityDirectory {
    store: Arc<dyn DocumentStore>,
}

impl IdentityDirectory {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// The record for `recipient_id`, from the first shard holding it.
    pub fn record(&self, recipient_id: &str) -> Result<IdentityRecord, DirectoryError> {
        self.store
            .find(recipient_id)?
            .into_iter()
            .next()
            .ok_or_else(|| DirectoryError::NotFound(recipient_id.to_string()))
    }

    pub fn records(&self) -> Result<Vec<IdentityRecord>, DirectoryError> {
        Ok(self.store.list()?)
    }

    /// `Ok(None)` when the record exists but has no push token.
    pub fn resolve_push_token(&self, recipient_id: &str) -> Result<Option<String>, DirectoryError> {
        Ok(self.record(recipient_id)?.push_token)
    }

    pub fn resolve_direct_link_address(&self, recipient_id: &str) -> Result<String, DirectoryError> {
        Ok(self.record(recipient_id)?.direct_link_address)
    }

    /// Create or update the record for `request.recipient_id`.
    pub fn upsert(&self, request: Upsert) -> Result<UpsertOutcome, DirectoryError> {
        let Upsert {
            recipient_id,
            direct_link_address,
            push_token,
        } = request;

        if recipient_id.is_empty() {
            return Err(DirectoryError::InvalidArgument(
                "recipient_id must not be empty".into(),
            ));
        }
        let patch = IdentityPatch {
            direct_link_address,
            push_token,
        };
        if patch.is_empty() {
            return Err(DirectoryError::InvalidArgument(
                "either direct_link_address or push_token must be provided".into(),
            ));
        }

        let copies = self.store.update(&recipient_id, &patch)?;
        if copies > 0 {
            tracing::debug!(recipient = %recipient_id, copies, "identity updated");
            return Ok(UpsertOutcome::Updated { copies });
        }

        let Some(direct_link_address) = patch.direct_link_address else {
            return Err(DirectoryError::InvalidArgument(
                "direct_link_address must be provided, push_token alone cannot create a record"
                    .into(),
            ));
        };

        let record = self.store.insert(NewIdentity {
            recipient_id,
            direct_link_address,
            push_token: patch.push_token,
        })?;
        tracing::info!(
            recipient = %record.recipient_id,
            shard = record.shard_index,
            "identity created"
        );
        Ok(UpsertOutcome::Created {
            shard_index: record.shard_index,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UniqueField;

    fn directory() -> IdentityDirectory {
        IdentityDirectory::new(Arc::new(MemoryStore::new(2)))
    }

    #[test]
    fn upsert_requires_a_field() {
        let err = directory().upsert(Upsert::new("a")).unwrap_err();
        assert_eq!(
            err,
            DirectoryError::InvalidArgument(
                "either direct_link_address or push_token must be provided".into()
            )
        );
    }

    #[test]
    fn token_alone_cannot_create() {
        let dir = directory();
        let err = dir.upsert(Upsert::new("a").push_token("tok")).unwrap_err();
        assert!(matches!(err, DirectoryError::InvalidArgument(ref m) if m.contains("push_token alone")));
        assert!(matches!(dir.record("a"), Err(DirectoryError::NotFound(_))));
    }

    #[test]
    fn create_then_update_token() {
        let dir = directory();
        assert_eq!(
            dir.upsert(Upsert::new("a").direct_link_address("addr-a")).unwrap(),
            UpsertOutcome::Created { shard_index: 0 }
        );
        assert_eq!(dir.resolve_push_token("a").unwrap(), None);

        assert_eq!(
            dir.upsert(Upsert::new("a").push_token("tok")).unwrap(),
            UpsertOutcome::Updated { copies: 1 }
        );
        assert_eq!(dir.resolve_push_token("a").unwrap().as_deref(), Some("tok"));
        assert_eq!(dir.resolve_direct_link_address("a").unwrap(), "addr-a");
    }

    #[test]
    fn duplicate_address_names_the_field() {
        let dir = directory();
        dir.upsert(Upsert::new("a").direct_link_address("shared")).unwrap();
        let err = dir
            .upsert(Upsert::new("b").direct_link_address("shared"))
            .unwrap_err();
        assert_eq!(err, DirectoryError::DuplicateKey(UniqueField::DirectLinkAddress));
        assert!(err.to_string().contains("direct_link_address"));
    }

    #[test]
    fn missing_record_is_not_found() {
        let err = directory().resolve_direct_link_address("ghost").unwrap_err();
        assert_eq!(err, DirectoryError::NotFound("ghost".into()));
    }
}
