//! Bounded per-cluster history of snapshots and scaling events.

use dbscale_core::{MetricSnapshot, ScalingEvent};

/// Fixed-capacity ring buffer. Pushing into a full buffer overwrites the
/// oldest entry.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    slots: Vec<Option<T>>,
    /// Next slot to write.
    cursor: usize,
    len: usize,
}

impl<T> RingBuffer<T> {
    /// A zero capacity is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: std::iter::repeat_with(|| None).take(capacity).collect(),
            cursor: 0,
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Insert an entry, returning the evicted one if the buffer was full.
    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = self.slots[self.cursor].replace(item);
        self.cursor = (self.cursor + 1) % self.capacity();
        if evicted.is_none() {
            self.len += 1;
        }
        evicted
    }

    /// Entries from most recent to oldest.
    pub fn recent(&self) -> impl Iterator<Item = &T> + '_ {
        let cap = self.capacity();
        (1..=self.len).filter_map(move |back| self.slots[(self.cursor + cap - back) % cap].as_ref())
    }
}

/// Recent snapshots and events of one cluster.
#[derive(Debug, Clone)]
pub struct History {
    snapshots: RingBuffer<MetricSnapshot>,
    events: RingBuffer<ScalingEvent>,
}

impl History {
    pub fn new(capacity: usize) -> Self {
        Self {
            snapshots: RingBuffer::new(capacity),
            events: RingBuffer::new(capacity),
        }
    }

    pub fn record_snapshot(&mut self, snapshot: MetricSnapshot) {
        self.snapshots.push(snapshot);
    }

    pub fn record_event(&mut self, event: ScalingEvent) {
        self.events.push(event);
    }

    pub fn recent_snapshots(&self) -> impl Iterator<Item = &MetricSnapshot> + '_ {
        self.snapshots.recent()
    }

    pub fn recent_events(&self) -> impl Iterator<Item = &ScalingEvent> + '_ {
        self.events.recent()
    }

    pub fn latest_snapshot(&self) -> Option<&MetricSnapshot> {
        self.snapshots.recent().next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn empty_buffer() {
        let ring: RingBuffer<u32> = RingBuffer::new(3);
        assert!(ring.is_empty());
        assert_eq!(ring.recent().count(), 0);
    }

    #[test]
    fn recent_is_most_recent_first() {
        let mut ring = RingBuffer::new(5);
        for i in 0..3 {
            ring.push(i);
        }
        assert_eq!(ring.recent().copied().collect::<Vec<_>>(), vec![2, 1, 0]);
    }

    #[test]
    fn overwrites_oldest_when_full() {
        let mut ring = RingBuffer::new(3);
        assert_eq!(ring.push(1), None);
        assert_eq!(ring.push(2), None);
        assert_eq!(ring.push(3), None);
        assert_eq!(ring.push(4), Some(1));
        assert_eq!(ring.len(), 3);
        assert_eq!(ring.recent().copied().collect::<Vec<_>>(), vec![4, 3, 2]);
    }

    #[test]
    fn zero_capacity_holds_one() {
        let mut ring = RingBuffer::new(0);
        ring.push("a");
        ring.push("b");
        assert_eq!(ring.capacity(), 1);
        assert_eq!(ring.recent().copied().collect::<Vec<_>>(), vec!["b"]);
    }

    #[test]
    fn history_latest_snapshot() {
        let mut history = History::new(2);
        assert!(history.latest_snapshot().is_none());
        for ts in [10, 20, 30] {
            history.record_snapshot(MetricSnapshot {
                cluster_id: "orders".to_string(),
                timestamp: ts,
                values: Default::default(),
            });
        }
        assert_eq!(history.latest_snapshot().map(|s| s.timestamp), Some(30));
        assert_eq!(history.recent_snapshots().count(), 2);
    }

    proptest! {
        #[test]
        fn never_exceeds_capacity(capacity in 1usize..32, inserts in 0usize..200) {
            let mut ring = RingBuffer::new(capacity);
            for i in 0..inserts {
                ring.push(i);
                prop_assert!(ring.len() <= capacity);
            }
            prop_assert_eq!(ring.recent().count(), inserts.min(capacity));
        }

        #[test]
        fn oldest_evicted_after_overflow(capacity in 1usize..32) {
            let mut ring = RingBuffer::new(capacity);
            for i in 0..=capacity {
                ring.push(i);
            }
            prop_assert!(!ring.recent().any(|&v| v == 0));
            prop_assert_eq!(ring.recent().next().copied(), Some(capacity));
        }
    }
}
