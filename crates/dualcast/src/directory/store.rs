use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

use crate::error::{StoreError, UniqueField};

/// One identity as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub recipient_id: String,
    pub push_token: Option<String>,
    pub direct_link_address: String,
    /// Backing shard the record was created in.
    pub shard_index: usize,
}

/// Fields of a record about to be created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewIdentity {
    pub recipient_id: String,
    pub direct_link_address: String,
    pub push_token: Option<String>,
}

/// Partial update; `None` leaves the stored field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityPatch {
    pub direct_link_address: Option<String>,
    pub push_token: Option<String>,
}

impl IdentityPatch {
    pub fn is_empty(&self) -> bool {
        self.direct_link_address.is_none() && self.push_token.is_none()
    }
}

/// Storage behind the [`IdentityDirectory`](super::IdentityDirectory).
///
/// `recipient_id` and `direct_link_address` are unique. Implementations
/// report violations as [`StoreError::Conflict`] naming the field.
pub trait DocumentStore: Send + Sync {
    /// Number of backing shards.
    fn shard_count(&self) -> usize;

    /// Every stored copy of `recipient_id`, in shard order.
    fn find(&self, recipient_id: &str) -> Result<Vec<IdentityRecord>, StoreError>;

    /// Create a record; the store picks the shard.
    fn insert(&self, identity: NewIdentity) -> Result<IdentityRecord, StoreError>;

    /// Apply `patch` to every copy of `recipient_id`. Returns how many
    /// copies were updated.
    fn update(&self, recipient_id: &str, patch: &IdentityPatch) -> Result<usize, StoreError>;

    /// All records, in shard order.
    fn list(&self) -> Result<Vec<IdentityRecord>, StoreError>;
}

struct Shards {
    shards: Vec<Vec<IdentityRecord>>,
    next: usize,
}

/// In-memory [`DocumentStore`] spreading inserts round-robin over N shards.
pub struct MemoryStore {
    inner: Mutex<Shards>,
}

impl MemoryStore {
    /// A store with `shards` backing shards (at least one).
    pub fn new(shards: usize) -> Self {
        Self {
            inner: Mutex::new(Shards {
                shards: vec![Vec::new(); shards.max(1)],
                next: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Shards> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(1)
    }
}

impl DocumentStore for MemoryStore {
    fn shard_count(&self) -> usize {
        self.lock().shards.len()
    }

    fn find(&self, recipient_id: &str) -> Result<Vec<IdentityRecord>, StoreError> {
        Ok(self
            .lock()
            .shards
            .iter()
            .flatten()
            .filter(|r| r.recipient_id == recipient_id)
            .cloned()
            .collect())
    }

    fn insert(&self, identity: NewIdentity) -> Result<IdentityRecord, StoreError> {
        let mut inner = self.lock();

        for record in inner.shards.iter().flatten() {
            if record.recipient_id == identity.recipient_id {
                return Err(StoreError::Conflict(UniqueField::RecipientId));
            }
            if record.direct_link_address == identity.direct_link_address {
                return Err(StoreError::Conflict(UniqueField::DirectLinkAddress));
            }
        }

        let shard_index = inner.next;
        inner.next = (shard_index + 1) % inner.shards.len();

        let record = IdentityRecord {
            recipient_id: identity.recipient_id,
            push_token: identity.push_token,
            direct_link_address: identity.direct_link_address,
            shard_index,
        };
        inner.shards[shard_index].push(record.clone());
        Ok(record)
    }

    fn update(&self, recipient_id: &str, patch: &IdentityPatch) -> Result<usize, StoreError> {
        let mut inner = self.lock();

        if let Some(address) = &patch.direct_link_address {
            let taken = inner
                .shards
                .iter()
                .flatten()
                .any(|r| r.direct_link_address == *address && r.recipient_id != recipient_id);
            if taken {
                return Err(StoreError::Conflict(UniqueField::DirectLinkAddress));
            }
        }

        let mut updated = 0;
        for record in inner.shards.iter_mut().flatten() {
            if record.recipient_id != recipient_id {
                continue;
            }
            if let Some(address) = &patch.direct_link_address {
                record.direct_link_address = address.clone();
            }
            if let Some(token) = &patch.push_token {
                record.push_token = Some(token.clone());
            }
            updated += 1;
        }
        Ok(updated)
    }

    fn list(&self) -> Result<Vec<IdentityRecord>, StoreError> {
        Ok(self.lock().shards.iter().flatten().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new(id: &str, address: &str) -> NewIdentity {
        NewIdentity {
            recipient_id: id.into(),
            direct_link_address: address.into(),
            push_token: None,
        }
    }

    #[test]
    fn inserts_round_robin() {
        let store = MemoryStore::new(3);
        let shards: Vec<usize> = ["a", "b", "c", "d"]
            .iter()
            .map(|id| store.insert(new(id, &format!("addr-{id}"))).unwrap().shard_index)
            .collect();
        assert_eq!(shards, vec![0, 1, 2, 0]);
        assert_eq!(store.list().unwrap().len(), 4);
    }

    #[test]
    fn uniqueness_spans_shards() {
        let store = MemoryStore::new(2);
        store.insert(new("a", "addr-a")).unwrap();

        assert_eq!(
            store.insert(new("a", "addr-other")).unwrap_err(),
            StoreError::Conflict(UniqueField::RecipientId)
        );
        assert_eq!(
            store.insert(new("b", "addr-a")).unwrap_err(),
            StoreError::Conflict(UniqueField::DirectLinkAddress)
        );
    }

    #[test]
    fn update_touches_only_supplied_fields() {
        let store = MemoryStore::default();
        store.insert(new("a", "addr-a")).unwrap();

        let patch = IdentityPatch {
            push_token: Some("tok".into()),
            ..Default::default()
        };
        assert_eq!(store.update("a", &patch).unwrap(), 1);

        let record = &store.find("a").unwrap()[0];
        assert_eq!(record.push_token.as_deref(), Some("tok"));
        assert_eq!(record.direct_link_address, "addr-a");
    }

    #[test]
    fn update_to_own_address_is_not_a_conflict() {
        let store = MemoryStore::default();
        store.insert(new("a", "addr-a")).unwrap();
        let patch = IdentityPatch {
            direct_link_address: Some("addr-a".into()),
            ..Default::default()
        };
        assert_eq!(store.update("a", &patch).unwrap(), 1);
    }

    #[test]
    fn update_missing_record_updates_nothing() {
        let store = MemoryStore::default();
        assert_eq!(store.update("ghost", &IdentityPatch::default()).unwrap(), 0);
    }

    #[test]
    fn zero_shards_means_one() {
        assert_eq!(MemoryStore::new(0).shard_count(), 1);
    }
}
