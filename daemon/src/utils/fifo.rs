use std::collections::VecDeque;

/// FIFO that never holds more than `capacity` items; pushing onto a full
/// queue drops the oldest item.
#[derive(Debug, Clone)]
pub struct BoundedFifo<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> BoundedFifo<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    /// Returns the evicted item, if any.
    pub fn push(&mut self, item: T) -> Option<T> {
        if self.capacity == 0 {
            return Some(item);
        }
        let evicted = if self.items.len() >= self.capacity {
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(item);
        evicted
    }

    pub fn retain<F: FnMut(&T) -> bool>(&mut self, f: F) {
        self.items.retain(f);
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator {
        self.items.iter()
    }

    /// The newest `n` items, oldest first.
    pub fn tail(&self, n: usize) -> impl Iterator<Item = &T> {
        self.items.iter().skip(self.items.len().saturating_sub(n))
    }

    pub fn last(&self) -> Option<&T> {
        self.items.back()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oldest_dropped_first() {
        let mut fifo = BoundedFifo::new(3);
        assert_eq!(fifo.push(1), None);
        fifo.push(2);
        fifo.push(3);
        assert_eq!(fifo.push(4), Some(1));
        assert_eq!(fifo.len(), 3);
        assert_eq!(fifo.iter().copied().collect::<Vec<_>>(), [2, 3, 4]);
    }

    #[test]
    fn test_tail_window() {
        let mut fifo = BoundedFifo::new(10);
        for i in 0..8 {
            fifo.push(i);
        }
        assert_eq!(fifo.tail(3).copied().collect::<Vec<_>>(), [5, 6, 7]);
        assert_eq!(fifo.tail(100).count(), 8);
        fifo.retain(|v| v % 2 == 0);
        assert_eq!(fifo.iter().copied().collect::<Vec<_>>(), [0, 2, 4, 6]);
        fifo.clear();
        assert!(fifo.is_empty());
    }
}
