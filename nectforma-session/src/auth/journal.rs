//! Transition journal — bounded append-only log of published sessions
//!
//! Every snapshot the session actor publishes is appended here, oldest
//! entries dropped first once capacity is reached. Readers get copies.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use super::types::Session;

#[derive(Debug, Clone)]
pub struct TransitionJournal {
    entries: Arc<Mutex<VecDeque<Session>>>,
    capacity: usize,
}

impl TransitionJournal {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Arc::new(Mutex::new(VecDeque::with_capacity(capacity.min(1024)))),
            capacity,
        }
    }

    pub fn record(&self, session: &Session) {
        if self.capacity == 0 {
            return;
        }
        let mut entries = self.entries.lock();
        while entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(session.clone());
    }

    /// Snapshot, oldest first
    pub fn entries(&self) -> Vec<Session> {
        self.entries.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
