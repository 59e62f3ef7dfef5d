//! Bounded, thread-safe console command queue.
//!
//! The console reader thread produces lines; the main dispatch loop consumes
//! them.  Storage is one contiguous buffer of `capacity * item_size` bytes
//! split into fixed-width slots, used as a ring.
//!
//! ```text
//!  front_item_index
//!        │
//!        ▼
//!  ┌─────────┬─────────┬─────────┬─────────┐
//!  │ item 0  │ item 1  │ (zero)  │ (zero)  │   items_count = 2, capacity = 4
//!  └─────────┴─────────┴─────────┴─────────┘
//!                        ▲
//!                        └─ next enqueue: (front + count) % capacity
//! ```
//!
//! A full queue rejects new input instead of blocking the producer.  A
//! consumed slot is zeroed as soon as its contents have been copied out, so a
//! later short item never exposes the tail of an earlier long one.
//!
//! One `parking_lot::Mutex` guards the count, the front index and the slot
//! storage.  Critical sections only copy bytes; no I/O happens under the lock.

use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::error::NetError;

struct QueueState {
    items_count: usize,
    front_item_index: usize,
    buffer: Vec<u8>,
}

/// Fixed-capacity FIFO of fixed-size text items.
pub struct BoundedCommandQueue {
    capacity: usize,
    item_size: usize,
    state: Mutex<QueueState>,
    not_empty: Condvar,
}

impl BoundedCommandQueue {
    /// Creates a queue of `capacity` slots, each `item_size` bytes wide.
    ///
    /// Zero values are bumped to 1 so slot arithmetic never divides by zero.
    pub fn new(capacity: usize, item_size: usize) -> Self {
        let capacity = capacity.max(1);
        let item_size = item_size.max(1);
        Self {
            capacity,
            item_size,
            state: Mutex::new(QueueState {
                items_count: 0,
                front_item_index: 0,
                buffer: vec![0u8; capacity * item_size],
            }),
            not_empty: Condvar::new(),
        }
    }

    /// Appends `item`, truncated to `item_size` bytes.
    ///
    /// Returns `false` without blocking when the queue is full; the queue is
    /// left unchanged in that case.
    pub fn enqueue(&self, item: &str) -> bool {
        let bytes = item.as_bytes();
        let len = bytes.len().min(self.item_size);

        {
            let mut state = self.state.lock();
            if state.items_count >= self.capacity {
                return false;
            }

            let slot_index = (state.front_item_index + state.items_count) % self.capacity;
            let slot = self.slot_range(slot_index);
            let slot = &mut state.buffer[slot];
            slot[..len].copy_from_slice(&bytes[..len]);
            slot[len..].fill(0);
            state.items_count += 1;
        }

        self.not_empty.notify_one();
        true
    }

    /// Removes and returns the oldest item, or `None` when the queue is empty.
    ///
    /// The returned text stops at the first NUL byte of the slot.  A slot
    /// truncated in the middle of a multi-byte character is decoded lossily.
    pub fn dequeue(&self) -> Option<String> {
        let mut state = self.state.lock();
        self.take_front(&mut state)
    }

    /// [`enqueue`](Self::enqueue) reporting a full queue as
    /// [`NetError::QueueFull`].
    pub fn try_enqueue(&self, item: &str) -> Result<(), NetError> {
        if self.enqueue(item) {
            Ok(())
        } else {
            Err(NetError::QueueFull)
        }
    }

    /// [`dequeue`](Self::dequeue) reporting an empty queue as
    /// [`NetError::QueueEmpty`].
    pub fn try_dequeue(&self) -> Result<String, NetError> {
        self.dequeue().ok_or(NetError::QueueEmpty)
    }

    /// Like [`dequeue`](Self::dequeue) but waits up to `timeout` for an item.
    pub fn wait_dequeue(&self, timeout: Duration) -> Option<String> {
        let mut state = self.state.lock();
        if state.items_count == 0 {
            let _ = self.not_empty.wait_for(&mut state, timeout);
        }
        self.take_front(&mut state)
    }

    /// Number of queued items.
    pub fn len(&self) -> usize {
        self.state.lock().items_count
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() == self.capacity
    }

    /// Maximum number of items, `C`.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Width of a slot in bytes, `S`.
    pub fn item_size(&self) -> usize {
        self.item_size
    }

    fn take_front(&self, state: &mut QueueState) -> Option<String> {
        if state.items_count == 0 {
            return None;
        }

        let slot = self.slot_range(state.front_item_index);
        let slot = &mut state.buffer[slot];
        let end = slot.iter().position(|&b| b == 0).unwrap_or(slot.len());
        let item = String::from_utf8_lossy(&slot[..end]).into_owned();
        slot.fill(0);

        state.items_count -= 1;
        state.front_item_index = (state.front_item_index + 1) % self.capacity;
        Some(item)
    }

    fn slot_range(&self, index: usize) -> std::ops::Range<usize> {
        let start = index * self.item_size;
        start..start + self.item_size
    }

    #[cfg(test)]
    fn front_item_index(&self) -> usize {
        self.state.lock().front_item_index
    }

    #[cfg(test)]
    fn raw_slot(&self, index: usize) -> Vec<u8> {
        self.state.lock().buffer[self.slot_range(index)].to_vec()
    }
}

impl Default for BoundedCommandQueue {
    fn default() -> Self {
        Self::new(crate::INPUT_QUEUE_MAX_ITEMS, crate::INPUT_QUEUE_ITEM_SIZE)
    }
}
