//! Bounded conversation history
//!
//! Keeps the most recent query/response exchanges; the oldest drop first.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// One answered question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub query: String,
    pub response: String,
}

impl MemoryEntry {
    pub fn new(query: impl Into<String>, response: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            response: response.into(),
        }
    }
}

/// FIFO of exchanges with a fixed capacity
#[derive(Debug, Clone)]
pub struct ConversationMemory {
    entries: VecDeque<MemoryEntry>,
    capacity: usize,
}

impl ConversationMemory {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    /// Rebuild from persisted entries, keeping only the newest `capacity`
    pub fn from_entries(entries: Vec<MemoryEntry>, capacity: usize) -> Self {
        let mut memory = Self::new(capacity);
        for entry in entries {
            memory.push(entry);
        }
        memory
    }

    pub fn push(&mut self, entry: MemoryEntry) {
        self.entries.push_back(entry);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    pub fn entries(&self) -> impl Iterator<Item = &MemoryEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// `Q: …` / `A: …` lines, oldest first. Empty when there is no history.
    pub fn format_history(&self) -> String {
        self.entries
            .iter()
            .map(|e| format!("Q: {}\nA: {}", e.query, e.response))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn to_vec(&self) -> Vec<MemoryEntry> {
        self.entries.iter().cloned().collect()
    }
}
