//! The shared, ordered item set.
//!
//! Engine and control surface both read-modify-write the same collection.
//! Every access goes through one short critical section that is never held
//! across an `.await`, so a background completion and a user edit are
//! serialised instead of racing.

use crate::item::{ItemId, ItemState, WorkItem};
use std::sync::{Mutex, MutexGuard};

/// Items in enqueue order.
pub struct ItemStore<T> {
    items: Mutex<Vec<WorkItem<T>>>,
}

impl<T> Default for ItemStore<T> {
    fn default() -> Self {
        Self {
            items: Mutex::new(Vec::new()),
        }
    }
}

impl<T> ItemStore<T> {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<WorkItem<T>>> {
        // A panic inside a closure leaves the vector structurally intact.
        self.items.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Append items at the tail.
    pub fn extend(&self, items: impl IntoIterator<Item = WorkItem<T>>) {
        self.lock().extend(items);
    }

    /// Ids of `Idle` items in enqueue order.
    pub fn idle_ids(&self) -> Vec<ItemId> {
        self.lock()
            .iter()
            .filter(|it| it.state() == ItemState::Idle)
            .map(|it| it.id())
            .collect()
    }

    /// Run `f` on the item if it still exists.
    pub fn update<R>(&self, id: ItemId, f: impl FnOnce(&mut WorkItem<T>) -> R) -> Option<R> {
        self.lock().iter_mut().find(|it| it.id() == id).map(f)
    }

    /// Read the item if it still exists.
    pub fn with_item<R>(&self, id: ItemId, f: impl FnOnce(&WorkItem<T>) -> R) -> Option<R> {
        self.lock().iter().find(|it| it.id() == id).map(f)
    }

    /// Run `f` on every item.
    pub fn for_each_mut(&self, mut f: impl FnMut(&mut WorkItem<T>)) {
        self.lock().iter_mut().for_each(|it| f(it));
    }

    /// Read every item in order.
    pub fn map<R>(&self, f: impl FnMut(&WorkItem<T>) -> R) -> Vec<R> {
        self.lock().iter().map(f).collect()
    }

    pub fn remove(&self, id: ItemId) -> bool {
        let mut items = self.lock();
        let before = items.len();
        items.retain(|it| it.id() != id);
        items.len() != before
    }

    /// Remove everything, returning how many items were dropped.
    pub fn clear(&self) -> usize {
        let mut items = self.lock();
        let n = items.len();
        items.clear();
        n
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl<T: Clone> ItemStore<T> {
    pub fn snapshot(&self) -> Vec<WorkItem<T>> {
        self.lock().clone()
    }

    pub fn get(&self, id: ItemId) -> Option<WorkItem<T>> {
        self.with_item(id, WorkItem::clone)
    }
}
