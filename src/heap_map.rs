//! The collector's retained-entry table: an indexed binary max-heap (worst
//! retained key at the root) paired with a hash map from key to heap slot.
//!
//! Membership checks and doc-count updates stay O(1); inserting a new key or
//! evicting the current worst entry is O(log n). A single comparator drives
//! the heap, so no ordering logic leaks into the entries themselves.

use std::cmp::Ordering;

use rustc_hash::FxHashMap;

use crate::key::{CompositeKey, CompositeOrdering, KeyValue};

#[derive(Clone, Debug)]
struct Entry<V> {
    key: CompositeKey,
    value: V,
}

#[derive(Clone, Debug)]
pub(crate) struct KeyHeapMap<V> {
    ordering: CompositeOrdering,
    heap: Vec<Entry<V>>,
    slots: FxHashMap<CompositeKey, usize>,
}

impl<V> KeyHeapMap<V> {
    pub(crate) fn new(ordering: CompositeOrdering) -> KeyHeapMap<V> {
        KeyHeapMap {
            ordering,
            heap: Vec::new(),
            slots: FxHashMap::default(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.heap.len()
    }

    pub(crate) fn get_mut(&mut self, key: &[KeyValue]) -> Option<&mut V> {
        let slot = *self.slots.get(key)?;
        Some(&mut self.heap[slot].value)
    }

    /// Inserts a new entry. The key must not be present yet.
    pub(crate) fn insert(&mut self, key: CompositeKey, value: V) {
        debug_assert!(!self.slots.contains_key(&key));
        let slot = self.heap.len();
        self.slots.insert(key.clone(), slot);
        self.heap.push(Entry { key, value });
        self.sift_up(slot);
    }

    /// The worst (largest under the composite order) retained key.
    pub(crate) fn peek_worst(&self) -> Option<&CompositeKey> {
        self.heap.first().map(|entry| &entry.key)
    }

    /// Removes and returns the worst retained entry.
    pub(crate) fn evict_worst(&mut self) -> Option<(CompositeKey, V)> {
        let last = self.heap.len().checked_sub(1)?;
        self.heap.swap(0, last);
        self.fix_slot(0);
        let entry = self.heap.pop()?;
        self.slots.remove(&entry.key);
        if !self.heap.is_empty() {
            self.sift_down(0);
        }
        Some((entry.key, entry.value))
    }

    /// Drains the table into entries sorted ascending by the composite
    /// order.
    pub(crate) fn into_sorted_entries(self) -> Vec<(CompositeKey, V)> {
        let ordering = self.ordering;
        let mut entries: Vec<(CompositeKey, V)> = self
            .heap
            .into_iter()
            .map(|entry| (entry.key, entry.value))
            .collect();
        entries.sort_by(|left, right| ordering.cmp(&left.0, &right.0));
        entries
    }

    fn cmp_slots(&self, left: usize, right: usize) -> Ordering {
        self.ordering.cmp(&self.heap[left].key, &self.heap[right].key)
    }

    fn sift_up(&mut self, mut slot: usize) {
        while slot > 0 {
            let parent = (slot - 1) / 2;
            if self.cmp_slots(slot, parent) != Ordering::Greater {
                break;
            }
            self.heap.swap(slot, parent);
            self.fix_slot(slot);
            slot = parent;
        }
        self.fix_slot(slot);
    }

    fn sift_down(&mut self, mut slot: usize) {
        loop {
            let left = 2 * slot + 1;
            let right = left + 1;
            let mut largest = slot;
            if left < self.heap.len() && self.cmp_slots(left, largest) == Ordering::Greater {
                largest = left;
            }
            if right < self.heap.len() && self.cmp_slots(right, largest) == Ordering::Greater {
                largest = right;
            }
            if largest == slot {
                break;
            }
            self.heap.swap(slot, largest);
            self.fix_slot(slot);
            slot = largest;
        }
        self.fix_slot(slot);
    }

    fn fix_slot(&mut self, slot: usize) {
        if slot < self.heap.len() {
            if let Some(stored) = self.slots.get_mut(&self.heap[slot].key) {
                *stored = slot;
            }
        }
    }
}
