//! Ordered storage for queue items

use kubeshift_domain::{
    DomainResult, MigrationConfig, QueueItem, QueueItemStatus, RepositoryRef,
};
use std::collections::HashSet;

/// Queue items plus the sequence counter that keeps equal priorities FIFO.
///
/// Pending order is priority descending, then `sequence` ascending.
#[derive(Debug, Default, Clone)]
pub struct QueueStore {
    items: Vec<QueueItem>,
    next_sequence: u64,
}

impl QueueStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a Pending item and return a copy of it
    pub fn push(
        &mut self,
        repository: RepositoryRef,
        configuration: MigrationConfig,
        priority: i32,
    ) -> QueueItem {
        let item = QueueItem::new(repository, configuration, priority, self.take_sequence());
        self.items.push(item.clone());
        item
    }

    fn take_sequence(&mut self) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        sequence
    }

    /// Item by id
    pub fn get(&self, id: &str) -> Option<&QueueItem> {
        self.items.iter().find(|item| item.id == id)
    }

    /// Mutable item by id
    pub fn get_mut(&mut self, id: &str) -> Option<&mut QueueItem> {
        self.items.iter_mut().find(|item| item.id == id)
    }

    /// Remove an item regardless of status
    pub fn remove(&mut self, id: &str) -> Option<QueueItem> {
        let index = self.items.iter().position(|item| item.id == id)?;
        Some(self.items.remove(index))
    }

    /// All items in insertion order
    pub fn items(&self) -> &[QueueItem] {
        &self.items
    }

    /// Number of items
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// No items stored
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Number of items with the given status
    pub fn count(&self, status: QueueItemStatus) -> usize {
        self.items.iter().filter(|item| item.status == status).count()
    }

    /// Pending items in dispatch order
    pub fn pending(&self) -> Vec<QueueItem> {
        let mut pending: Vec<QueueItem> = self
            .items
            .iter()
            .filter(|item| item.status == QueueItemStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| a.sequence.cmp(&b.sequence))
        });
        pending
    }

    /// Id of the pending item that would be dispatched next
    pub fn next_pending_id(&self) -> Option<String> {
        self.items
            .iter()
            .filter(|item| item.status == QueueItemStatus::Pending)
            .min_by(|a, b| {
                b.priority
                    .cmp(&a.priority)
                    .then_with(|| a.sequence.cmp(&b.sequence))
            })
            .map(|item| item.id.clone())
    }

    /// Move an item to `next`, returning its previous status
    pub fn transition(&mut self, id: &str, next: QueueItemStatus) -> Option<DomainResult<QueueItemStatus>> {
        let item = self.get_mut(id)?;
        let previous = item.status;
        Some(item.transition(next).map(|_| previous))
    }

    /// Re-sequence pending items.
    ///
    /// Listed pending ids come first in the given order, followed by the
    /// remaining pending items in their previous relative order. Unknown and
    /// non-pending ids are ignored; priority still takes precedence over the
    /// new sequence. Returns the resulting pending ids in FIFO order.
    pub fn reorder(&mut self, ordered_ids: &[String]) -> Vec<String> {
        let pending_ids: HashSet<String> = self
            .items
            .iter()
            .filter(|item| item.status == QueueItemStatus::Pending)
            .map(|item| item.id.clone())
            .collect();

        let mut seen = HashSet::new();
        let mut new_order: Vec<String> = ordered_ids
            .iter()
            .filter(|id| pending_ids.contains(*id) && seen.insert((*id).clone()))
            .cloned()
            .collect();

        let mut remaining: Vec<&QueueItem> = self
            .items
            .iter()
            .filter(|item| item.status == QueueItemStatus::Pending && !seen.contains(&item.id))
            .collect();
        remaining.sort_by_key(|item| item.sequence);
        new_order.extend(remaining.into_iter().map(|item| item.id.clone()));

        for id in &new_order {
            let sequence = self.take_sequence();
            if let Some(item) = self.get_mut(id) {
                item.sequence = sequence;
            }
        }

        new_order
    }

    /// Remove finished items; Cancelled ones only when `include_cancelled` is set
    pub fn remove_finished(&mut self, include_cancelled: bool) -> Vec<QueueItem> {
        let (removed, kept): (Vec<QueueItem>, Vec<QueueItem>) =
            self.items.drain(..).partition(|item| match item.status {
                QueueItemStatus::Completed | QueueItemStatus::Failed => true,
                QueueItemStatus::Cancelled => include_cancelled,
                _ => false,
            });
        self.items = kept;
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo(name: &str) -> RepositoryRef {
        RepositoryRef::from_url(format!("https://github.com/acme/{}", name))
    }

    fn push(store: &mut QueueStore, name: &str, priority: i32) -> String {
        store
            .push(repo(name), MigrationConfig::default(), priority)
            .id
    }

    #[test]
    fn test_pending_order_priority_then_fifo() {
        let mut store = QueueStore::new();
        let first_low = push(&mut store, "a", 1);
        let high = push(&mut store, "b", 5);
        let second_low = push(&mut store, "c", 1);

        let order: Vec<String> = store.pending().into_iter().map(|i| i.id).collect();
        assert_eq!(order, vec![high.clone(), first_low, second_low]);
        assert_eq!(store.next_pending_id(), Some(high));
    }

    #[test]
    fn test_pending_excludes_other_statuses() {
        let mut store = QueueStore::new();
        let a = push(&mut store, "a", 0);
        let b = push(&mut store, "b", 0);

        store.transition(&a, QueueItemStatus::Processing).unwrap().unwrap();
        let pending = store.pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, b);
    }

    #[test]
    fn test_transition_reports_previous_status() {
        let mut store = QueueStore::new();
        let a = push(&mut store, "a", 0);

        let previous = store.transition(&a, QueueItemStatus::Cancelled).unwrap().unwrap();
        assert_eq!(previous, QueueItemStatus::Pending);
        assert!(store.transition(&a, QueueItemStatus::Cancelled).unwrap().is_err());
        assert!(store.transition("missing", QueueItemStatus::Cancelled).is_none());
    }

    #[test]
    fn test_reorder_within_equal_priority() {
        let mut store = QueueStore::new();
        let a = push(&mut store, "a", 0);
        let b = push(&mut store, "b", 0);
        let c = push(&mut store, "c", 0);

        let order = store.reorder(&[c.clone(), a.clone()]);
        assert_eq!(order, vec![c.clone(), a.clone(), b.clone()]);

        let pending: Vec<String> = store.pending().into_iter().map(|i| i.id).collect();
        assert_eq!(pending, vec![c, a, b]);
    }

    #[test]
    fn test_reorder_ignores_non_pending_and_unknown_ids() {
        let mut store = QueueStore::new();
        let a = push(&mut store, "a", 0);
        let b = push(&mut store, "b", 0);
        store.transition(&a, QueueItemStatus::Processing).unwrap().unwrap();

        let order = store.reorder(&[a.clone(), "ghost".to_string(), b.clone(), b.clone()]);
        assert_eq!(order, vec![b]);
        assert_eq!(store.get(&a).unwrap().status, QueueItemStatus::Processing);
    }

    #[test]
    fn test_reorder_keeps_priority_precedence() {
        let mut store = QueueStore::new();
        let low = push(&mut store, "low", 0);
        let high = push(&mut store, "high", 9);

        store.reorder(&[low.clone(), high.clone()]);
        assert_eq!(store.next_pending_id(), Some(high));
    }

    #[test]
    fn test_items_added_after_reorder_stay_behind() {
        let mut store = QueueStore::new();
        let a = push(&mut store, "a", 0);
        let b = push(&mut store, "b", 0);
        store.reorder(&[b.clone(), a.clone()]);
        let c = push(&mut store, "c", 0);

        let pending: Vec<String> = store.pending().into_iter().map(|i| i.id).collect();
        assert_eq!(pending, vec![b, a, c]);
    }

    #[test]
    fn test_remove_finished() {
        let mut store = QueueStore::new();
        let done = push(&mut store, "done", 0);
        let failed = push(&mut store, "failed", 0);
        let cancelled = push(&mut store, "cancelled", 0);
        let pending = push(&mut store, "pending", 0);

        store.transition(&done, QueueItemStatus::Processing).unwrap().unwrap();
        store.transition(&done, QueueItemStatus::Completed).unwrap().unwrap();
        store.transition(&failed, QueueItemStatus::Processing).unwrap().unwrap();
        store.transition(&failed, QueueItemStatus::Failed).unwrap().unwrap();
        store.transition(&cancelled, QueueItemStatus::Cancelled).unwrap().unwrap();

        let removed = store.remove_finished(false);
        assert_eq!(removed.len(), 2);
        assert_eq!(store.len(), 2);
        assert!(store.get(&cancelled).is_some());
        assert!(store.get(&pending).is_some());

        let removed = store.remove_finished(true);
        assert_eq!(removed.len(), 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_remove_any_status() {
        let mut store = QueueStore::new();
        let a = push(&mut store, "a", 0);
        store.transition(&a, QueueItemStatus::Processing).unwrap().unwrap();

        assert!(store.remove(&a).is_some());
        assert!(store.remove(&a).is_none());
        assert!(store.is_empty());
    }
}
