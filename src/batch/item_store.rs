//! # Item Store
//!
//! Lista condivisa degli item con aggiornamenti copy-on-write.
//!
//! Ogni modifica produce un nuovo `Arc<Vec<ImageItem>>`: i lettori tengono
//! uno snapshot coerente senza bloccare gli scrittori. Gli aggiornamenti
//! concorrenti (tick di progresso e orchestratore) sono indirizzati per id,
//! mai per posizione.

use crate::error::StateTransitionError;
use crate::item::{ImageItem, ItemId};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Outcome of a replace-by-id
#[derive(Debug, Clone, PartialEq)]
pub enum Replace {
    Updated(ImageItem),
    Missing,
    Rejected(StateTransitionError),
}

#[derive(Debug, Default)]
pub struct ItemStore {
    items: Mutex<Arc<Vec<ImageItem>>>,
}

impl ItemStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Arc<Vec<ImageItem>>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Consistent view of every item
    pub fn snapshot(&self) -> Arc<Vec<ImageItem>> {
        Arc::clone(&self.lock())
    }

    pub fn get(&self, id: ItemId) -> Option<ImageItem> {
        self.lock().iter().find(|item| item.id == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn insert(&self, item: ImageItem) {
        let mut items = self.lock();
        let mut next = items.as_ref().clone();
        next.push(item);
        *items = Arc::new(next);
    }

    /// Apply a transition to the item with `id`, atomically
    pub fn replace<F>(&self, id: ItemId, transition: F) -> Replace
    where
        F: FnOnce(&ImageItem) -> Result<ImageItem, StateTransitionError>,
    {
        let mut items = self.lock();
        let Some(index) = items.iter().position(|item| item.id == id) else {
            return Replace::Missing;
        };

        match transition(&items[index]) {
            Ok(updated) => {
                let mut next = items.as_ref().clone();
                next[index] = updated.clone();
                *items = Arc::new(next);
                Replace::Updated(updated)
            }
            Err(e) => Replace::Rejected(e),
        }
    }

    pub fn remove(&self, id: ItemId) -> Option<ImageItem> {
        let mut items = self.lock();
        let index = items.iter().position(|item| item.id == id)?;
        let mut next = items.as_ref().clone();
        let removed = next.remove(index);
        *items = Arc::new(next);
        Some(removed)
    }

    pub fn clear(&self) {
        *self.lock() = Arc::new(Vec::new());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimation::fallback;
    use crate::format::ImageFormat;
    use crate::item::{ImageSource, StatusKind};
    use std::path::PathBuf;

    fn item(id: u64) -> ImageItem {
        ImageItem::new(
            ItemId(id),
            ImageSource {
                name: format!("{}.png", id),
                path: PathBuf::from(format!("/tmp/{}.png", id)),
                size: 10_000,
                format: ImageFormat::Png,
            },
            fallback::reduction_estimate(ImageFormat::Png, ImageFormat::WebP, 10_000, true),
        )
    }

    #[test]
    fn test_snapshots_are_immutable() {
        let store = ItemStore::new();
        store.insert(item(1));
        let before = store.snapshot();

        store.insert(item(2));
        assert_eq!(before.len(), 1);
        assert_eq!(store.snapshot().len(), 2);
    }

    #[test]
    fn test_replace_by_id() {
        let store = ItemStore::new();
        store.insert(item(1));
        store.insert(item(2));

        let result = store.replace(ItemId(2), |item| item.start_processing());
        assert!(matches!(result, Replace::Updated(ref item) if item.kind() == StatusKind::Processing));
        assert_eq!(store.get(ItemId(1)).unwrap().kind(), StatusKind::Pending);

        let rejected = store.replace(ItemId(1), |item| item.complete(10, PathBuf::from("x")));
        assert!(matches!(rejected, Replace::Rejected(_)));
        assert_eq!(store.get(ItemId(1)).unwrap().kind(), StatusKind::Pending);

        assert_eq!(store.replace(ItemId(9), |item| item.start_processing()), Replace::Missing);
    }

    #[test]
    fn test_remove_and_clear() {
        let store = ItemStore::new();
        store.insert(item(1));
        store.insert(item(2));

        assert_eq!(store.remove(ItemId(1)).map(|item| item.id), Some(ItemId(1)));
        assert!(store.remove(ItemId(1)).is_none());
        assert_eq!(store.len(), 1);

        store.clear();
        assert!(store.is_empty());
    }
}
