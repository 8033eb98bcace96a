//! Subtask dependency queue
//!
//! Tracks which subtasks are ready to run: a subtask becomes available
//! once every declared dependency has completed successfully.

use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// Dependency map over subtask ids
#[derive(Debug, Default)]
pub struct TaskQueue {
    deps: HashMap<Uuid, HashSet<Uuid>>,
    order: Vec<Uuid>,
    completed: HashSet<Uuid>,
}

impl TaskQueue {
    /// Create an empty queue
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subtask with its dependency set
    pub fn add_task(&mut self, id: Uuid, dependencies: impl IntoIterator<Item = Uuid>) {
        self.deps.insert(id, dependencies.into_iter().collect());
        self.order.push(id);
    }

    /// Whether a subtask id is known
    #[must_use]
    pub fn contains(&self, id: Uuid) -> bool {
        self.deps.contains_key(&id)
    }

    /// Subtasks whose dependencies are all completed and which have not
    /// completed themselves, in registration order
    #[must_use]
    pub fn available_tasks(&self) -> Vec<Uuid> {
        self.order
            .iter()
            .filter(|id| !self.completed.contains(id))
            .filter(|id| self.deps[id].is_subset(&self.completed))
            .copied()
            .collect()
    }

    /// Whether a subtask's dependencies are all completed
    #[must_use]
    pub fn is_ready(&self, id: Uuid) -> bool {
        self.deps
            .get(&id)
            .is_some_and(|deps| deps.is_subset(&self.completed))
    }

    /// Mark a subtask completed
    pub fn mark_completed(&mut self, id: Uuid) {
        self.completed.insert(id);
    }

    /// Whether every registered subtask has completed
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.deps.keys().all(|id| self.completed.contains(id))
    }

    /// Number of subtasks not yet completed
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.deps
            .keys()
            .filter(|id| !self.completed.contains(id))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_availability_follows_dependencies() {
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let mut queue = TaskQueue::new();
        queue.add_task(a, []);
        queue.add_task(b, [a]);
        queue.add_task(c, [a, b]);

        assert_eq!(queue.available_tasks(), vec![a]);
        assert_eq!(queue.remaining(), 3);

        queue.mark_completed(a);
        assert_eq!(queue.available_tasks(), vec![b]);
        assert!(queue.is_ready(b));
        assert!(!queue.is_ready(c));

        queue.mark_completed(b);
        assert_eq!(queue.available_tasks(), vec![c]);

        queue.mark_completed(c);
        assert!(queue.is_complete());
        assert!(queue.available_tasks().is_empty());
        assert_eq!(queue.remaining(), 0);
    }

    #[test]
    fn test_independent_tasks_all_available() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let mut queue = TaskQueue::new();
        queue.add_task(a, []);
        queue.add_task(b, []);
        assert_eq!(queue.available_tasks(), vec![a, b]);
    }

    #[test]
    fn test_unknown_id_is_not_ready() {
        let queue = TaskQueue::new();
        assert!(!queue.is_ready(Uuid::new_v4()));
    }
}
