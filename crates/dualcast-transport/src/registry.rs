use std::collections::HashMap;
use std::sync::Arc;

use crate::network::DirectLink;
use crate::RecipientId;

/// Open direct links by recipient. At most one entry per recipient.
///
/// A plain map: it does no locking and does not guard against a second
/// `put` for the same id. [`ConnectionManager`](crate::ConnectionManager)
/// owns it and checks `get` before every `put`.
#[derive(Default)]
pub struct ConnectionRegistry {
    links: HashMap<RecipientId, Arc<dyn DirectLink>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &RecipientId) -> Option<Arc<dyn DirectLink>> {
        self.links.get(id).cloned()
    }

    pub fn contains(&self, id: &RecipientId) -> bool {
        self.links.contains_key(id)
    }

    /// Insert an opened link. The id must not already have an entry.
    pub fn put(&mut self, id: RecipientId, link: Arc<dyn DirectLink>) {
        let previous = self.links.insert(id, link);
        debug_assert!(previous.is_none(), "second direct link registered for one recipient");
    }

    pub fn remove(&mut self, id: &RecipientId) -> Option<Arc<dyn DirectLink>> {
        self.links.remove(id)
    }

    /// Remove the entry only if it still holds `link`.
    ///
    /// A close event from an old link must not evict its replacement.
    pub fn remove_if_same(&mut self, id: &RecipientId, link: &Arc<dyn DirectLink>) -> bool {
        match self.links.get(id) {
            Some(current) if Arc::ptr_eq(current, link) => {
                self.links.remove(id);
                true
            }
            _ => false,
        }
    }

    pub fn recipients(&self) -> Vec<RecipientId> {
        self.links.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}
