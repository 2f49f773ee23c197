// SPDX-License-Identifier: GPL-3.0-only

//! Bounded linear undo/redo stack of serialised scene snapshots
//!
//! The undo stack always holds the current state on top. Its bottom entry is
//! the floor: undo never moves past it. Stepping only moves snapshots between
//! stacks; the caller restores the scene and calls `step_back`/`step_forward`
//! only after the target decoded successfully.

use std::collections::VecDeque;

pub const DEFAULT_CAPACITY: usize = 50;

#[derive(Debug, Clone)]
pub struct History {
    undo: VecDeque<String>,
    redo: Vec<String>,
    capacity: usize,
}

impl Default for History {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl History {
    /// A capacity below two could never undo, so it is raised to two
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            undo: VecDeque::new(),
            redo: Vec::new(),
            capacity: capacity.max(2),
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Entries on the undo stack, current state included
    #[must_use]
    pub fn len(&self) -> usize {
        self.undo.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.undo.is_empty()
    }

    #[must_use]
    pub fn redo_len(&self) -> usize {
        self.redo.len()
    }

    #[must_use]
    pub fn can_undo(&self) -> bool {
        self.undo.len() > 1
    }

    #[must_use]
    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    #[must_use]
    pub fn current(&self) -> Option<&str> {
        self.undo.back().map(String::as_str)
    }

    /// Drop everything and start again from `baseline`
    pub fn reset(&mut self, baseline: String) {
        self.undo.clear();
        self.redo.clear();
        self.undo.push_back(baseline);
    }

    /// Record a new state. Returns `false` when it equals the current top
    /// and nothing changed.
    pub fn push(&mut self, snapshot: String) -> bool {
        if self.current() == Some(snapshot.as_str()) {
            return false;
        }
        self.undo.push_back(snapshot);
        while self.undo.len() > self.capacity {
            self.undo.pop_front();
        }
        self.redo.clear();
        true
    }

    /// The state undo would restore, without moving anything
    #[must_use]
    pub fn undo_target(&self) -> Option<&str> {
        if !self.can_undo() {
            return None;
        }
        self.undo.get(self.undo.len() - 2).map(String::as_str)
    }

    /// Commit an undo whose target was restored
    pub fn step_back(&mut self) {
        if self.can_undo() {
            if let Some(current) = self.undo.pop_back() {
                self.redo.push(current);
            }
        }
    }

    #[must_use]
    pub fn redo_target(&self) -> Option<&str> {
        self.redo.last().map(String::as_str)
    }

    /// Commit a redo whose target was restored
    pub fn step_forward(&mut self) {
        if let Some(next) = self.redo.pop() {
            self.undo.push_back(next);
        }
    }
}
