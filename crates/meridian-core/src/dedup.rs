//! Bounded window of recently handled event ids.

use std::collections::{HashSet, VecDeque};

use uuid::Uuid;

/// Default number of event ids a consumer remembers.
pub const DEFAULT_DEDUP_WINDOW: usize = 100_000;

/// Remembers the most recent `capacity` event ids, evicting the oldest first.
///
/// Redeliveries inside the window are recognised. Older ids are forgotten, so
/// memory stays flat for a long-running consumer.
#[derive(Debug, Clone)]
pub struct RecentIds {
    capacity: usize,
    order: VecDeque<Uuid>,
    members: HashSet<Uuid>,
}

impl RecentIds {
    /// Creates an empty window. A zero capacity is raised to one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            order: VecDeque::new(),
            members: HashSet::new(),
        }
    }

    #[must_use]
    pub fn contains(&self, id: &Uuid) -> bool {
        self.members.contains(id)
    }

    /// Records `id`. Returns `false` if it is already in the window.
    pub fn insert(&mut self, id: Uuid) -> bool {
        if self.members.contains(&id) {
            return false;
        }
        if self.order.len() == self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.members.remove(&oldest);
            }
        }
        self.order.push_back(id);
        self.members.insert(id);
        true
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for RecentIds {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUP_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_reports_repeats_inside_window() {
        let mut ids = RecentIds::new(4);
        let id = Uuid::new_v4();

        assert!(ids.insert(id));
        assert!(!ids.insert(id));
        assert!(ids.contains(&id));
        assert_eq!(ids.len(), 1);
    }

    #[test]
    fn test_window_never_grows_past_capacity() {
        // Arrange
        let mut ids = RecentIds::new(3);
        let all: Vec<Uuid> = (0..10).map(|_| Uuid::new_v4()).collect();

        // Act
        for id in &all {
            ids.insert(*id);
        }

        // Assert
        assert_eq!(ids.len(), 3);
        assert!(!ids.contains(&all[0]));
        assert!(!ids.contains(&all[6]));
        assert!(all[7..].iter().all(|id| ids.contains(id)));
    }

    #[test]
    fn test_zero_capacity_keeps_latest_id() {
        let mut ids = RecentIds::new(0);
        let (first, second) = (Uuid::new_v4(), Uuid::new_v4());

        ids.insert(first);
        ids.insert(second);

        assert_eq!(ids.capacity(), 1);
        assert!(!ids.contains(&first));
        assert!(ids.contains(&second));
    }
}
