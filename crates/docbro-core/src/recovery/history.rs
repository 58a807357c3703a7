use super::taxonomy::{ErrorCategory, ErrorContext};
use std::collections::VecDeque;

pub const DEFAULT_HISTORY_CAPACITY: usize = 50;

/// Bounded, append-only log of classified failures
#[derive(Debug, Clone)]
pub struct ErrorHistory {
    capacity: usize,
    entries: VecDeque<ErrorContext>,
}

impl Default for ErrorHistory {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }
}

impl ErrorHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    /// Append an entry, evicting the oldest when full
    pub fn push(&mut self, context: ErrorContext) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(context);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn latest(&self) -> Option<&ErrorContext> {
        self.entries.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ErrorContext> {
        self.entries.iter()
    }

    pub fn count_by_category(&self, category: ErrorCategory) -> usize {
        self.entries.iter().filter(|e| e.category == category).count()
    }

    pub fn into_vec(self) -> Vec<ErrorContext> {
        self.entries.into()
    }
}
