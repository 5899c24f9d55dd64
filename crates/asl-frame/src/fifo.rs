use std::collections::VecDeque;

/// Default number of frames held by a transmit queue.
pub const DEFAULT_FIFO_CAPACITY: usize = 100;

/// A bounded first-in first-out queue.
///
/// Pushing onto a full queue is refused rather than evicting older items.
#[derive(Debug, Clone)]
pub struct Fifo<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> Fifo<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity.min(DEFAULT_FIFO_CAPACITY)),
            capacity,
        }
    }

    /// Append an item. Returns false (and drops the item) when full.
    pub fn push(&mut self, item: T) -> bool {
        if self.is_full() {
            return false;
        }
        self.items.push_back(item);
        true
    }

    /// Remove the oldest item.
    pub fn pop(&mut self) -> Option<T> {
        self.items.pop_front()
    }

    /// The item the next `pop` will return.
    pub fn peek(&self) -> Option<&T> {
        self.items.front()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Change the capacity. Items already queued beyond it are kept.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
    }

    /// Drop every queued item.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }
}

impl<T> Default for Fifo<T> {
    fn default() -> Self {
        Self::new(DEFAULT_FIFO_CAPACITY)
    }
}
