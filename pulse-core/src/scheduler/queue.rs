//! Fixed-capacity min-heap of task slots.
//!
//! The heap stores arena indices, never tasks. Keys are read through a
//! closure at every comparison, so a task's deadline may change while it is
//! out of the heap; re-pushing the same index after mutating the task is the
//! only way to reorder it. Indices stay valid across any reordering because
//! the arena never moves or removes individual tasks.

use heapless::Vec;

use crate::time::Timestamp;

/// Binary min-heap over arena indices ordered by wraparound-safe deadline.
#[derive(Clone, Debug)]
pub struct DeadlineQueue<const N: usize> {
    heap: Vec<usize, N>,
}

impl<const N: usize> DeadlineQueue<N> {
    pub const fn new() -> Self {
        Self { heap: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }

    /// Index with the earliest deadline, if any.
    pub fn peek(&self) -> Option<usize> {
        self.heap.first().copied()
    }

    /// Iterates over queued indices in heap order.
    pub fn iter(&self) -> core::slice::Iter<'_, usize> {
        self.heap.iter()
    }

    /// Inserts `slot`, handing it back when the heap is full.
    pub fn push<K>(&mut self, slot: usize, key: K) -> Result<(), usize>
    where
        K: Fn(usize) -> Timestamp,
    {
        self.heap.push(slot)?;
        self.sift_up(self.heap.len() - 1, &key);
        Ok(())
    }

    /// Removes and returns the index with the earliest deadline.
    pub fn pop<K>(&mut self, key: K) -> Option<usize>
    where
        K: Fn(usize) -> Timestamp,
    {
        if self.heap.is_empty() {
            return None;
        }
        let last = self.heap.len() - 1;
        self.heap.swap(0, last);
        let top = self.heap.pop();
        if !self.heap.is_empty() {
            self.sift_down(0, &key);
        }
        top
    }

    fn sift_up<K>(&mut self, mut index: usize, key: &K)
    where
        K: Fn(usize) -> Timestamp,
    {
        while index > 0 {
            let parent = (index - 1) / 2;
            if key(self.heap[index]).precedes(key(self.heap[parent])) {
                self.heap.swap(index, parent);
                index = parent;
            } else {
                break;
            }
        }
    }

    fn sift_down<K>(&mut self, mut index: usize, key: &K)
    where
        K: Fn(usize) -> Timestamp,
    {
        let len = self.heap.len();
        loop {
            let left = 2 * index + 1;
            if left >= len {
                break;
            }
            let right = left + 1;
            let mut child = left;
            if right < len && key(self.heap[right]).precedes(key(self.heap[left])) {
                child = right;
            }
            if key(self.heap[child]).precedes(key(self.heap[index])) {
                self.heap.swap(index, child);
                index = child;
            } else {
                break;
            }
        }
    }
}

impl<const N: usize> Default for DeadlineQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pops_in_deadline_order() {
        let deadlines = [40u32, 10, 30, 20, 50];
        let key = |slot: usize| Timestamp::from_micros(deadlines[slot]);
        let mut queue = DeadlineQueue::<8>::new();
        for slot in 0..deadlines.len() {
            queue.push(slot, key).unwrap();
        }

        let mut order = [0usize; 5];
        for entry in &mut order {
            *entry = queue.pop(key).unwrap();
        }
        assert_eq!(order, [1, 3, 2, 0, 4]);
        assert!(queue.pop(key).is_none());
    }

    #[test]
    fn orders_across_counter_wrap() {
        let deadlines = [3u32, u32::MAX - 2, 1, u32::MAX];
        let key = |slot: usize| Timestamp::from_micros(deadlines[slot]);
        let mut queue = DeadlineQueue::<4>::new();
        for slot in 0..deadlines.len() {
            queue.push(slot, key).unwrap();
        }

        assert_eq!(queue.pop(key), Some(1));
        assert_eq!(queue.pop(key), Some(3));
        assert_eq!(queue.pop(key), Some(2));
        assert_eq!(queue.pop(key), Some(0));
    }

    #[test]
    fn full_queue_returns_slot() {
        let key = |_: usize| Timestamp::ZERO;
        let mut queue = DeadlineQueue::<2>::new();
        queue.push(0, key).unwrap();
        queue.push(1, key).unwrap();
        assert_eq!(queue.push(2, key), Err(2));
        assert_eq!(queue.len(), 2);
    }
}
