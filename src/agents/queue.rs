//! Stable priority queue of tasks owned by one worker.

use std::collections::VecDeque;

use super::model::Task;

/// Tasks ordered by priority (highest first), then by arrival.
#[derive(Debug, Default)]
pub struct TaskQueue {
    tasks: VecDeque<Task>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert behind every queued task of equal or higher priority.
    pub fn push(&mut self, task: Task) {
        let at = self.tasks.partition_point(|queued| queued.priority >= task.priority);
        self.tasks.insert(at, task);
    }

    /// Remove the most urgent task.
    pub fn pop(&mut self) -> Option<Task> {
        self.tasks.pop_front()
    }

    #[cfg(test)]
    pub fn peek(&self) -> Option<&Task> {
        self.tasks.front()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Queued task ids in drain order.
    #[cfg(test)]
    pub fn ids(&self) -> Vec<String> {
        self.tasks.iter().map(|t| t.id.clone()).collect()
    }
}
