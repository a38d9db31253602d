use std::collections::VecDeque;

use wave_core::{AlertEntry, AlertId, Counters};

pub const DEFAULT_CAPACITY: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JournalError {
    #[error("alert text is empty")]
    EmptyText,
}

/// Result of a successful [`AlertJournal::record`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recorded {
    pub entry: AlertEntry,
    /// Oldest entry dropped to stay within capacity.
    pub evicted: Option<AlertEntry>,
}

/// Acknowledging never fails; the variants only say what happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acknowledgement {
    Acknowledged,
    AlreadyAcknowledged,
    /// Unknown or evicted id.
    NotFound,
}

/// Bounded FIFO of completed messages plus the session counters.
///
/// The unacknowledged count is always derived from the entries themselves.
#[derive(Debug)]
pub struct AlertJournal {
    entries: VecDeque<AlertEntry>,
    capacity: usize,
    next_id: u64,
    counters: Counters,
}

impl AlertJournal {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            next_id: 1,
            counters: Counters::default(),
        }
    }

    pub fn record(
        &mut self,
        text: &str,
        timestamp: jiff::Timestamp,
    ) -> Result<Recorded, JournalError> {
        if text.is_empty() {
            return Err(JournalError::EmptyText);
        }

        let evicted = if self.entries.len() >= self.capacity {
            self.entries.pop_front()
        } else {
            None
        };

        let entry = AlertEntry {
            id: AlertId(self.next_id),
            timestamp,
            text: text.into(),
            acknowledged: false,
        };
        self.next_id += 1;
        self.entries.push_back(entry.clone());
        self.counters.messages_received += 1;

        Ok(Recorded { entry, evicted })
    }

    pub fn acknowledge(&mut self, id: AlertId) -> Acknowledgement {
        match self.find_mut(id) {
            Some(entry) if entry.acknowledged => Acknowledgement::AlreadyAcknowledged,
            Some(entry) => {
                entry.acknowledged = true;
                Acknowledgement::Acknowledged
            }
            None => Acknowledgement::NotFound,
        }
    }

    pub fn unacknowledged_count(&self) -> usize {
        self.unacknowledged().count()
    }

    pub fn unacknowledged(&self) -> impl Iterator<Item = &AlertEntry> {
        self.entries.iter().filter(|entry| !entry.acknowledged)
    }

    /// Oldest first.
    pub fn entries(&self) -> impl Iterator<Item = &AlertEntry> {
        self.entries.iter()
    }

    pub fn get(&self, id: AlertId) -> Option<&AlertEntry> {
        self.entries
            .binary_search_by_key(&id, |entry| entry.id)
            .ok()
            .and_then(|at| self.entries.get(at))
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

    /// Drops every entry. Counters and id sequence are kept.
    pub fn clear(&mut self) -> usize {
        let removed = self.entries.len();
        self.entries.clear();
        removed
    }

    pub fn counters(&self) -> Counters {
        self.counters
    }

    pub fn count_unrecognized(&mut self) {
        self.counters.unrecognized += 1;
    }

    pub fn count_card_scanned(&mut self) {
        self.counters.cards_scanned += 1;
    }

    pub fn count_card_authorized(&mut self) {
        self.counters.cards_authorized += 1;
    }

    fn find_mut(&mut self, id: AlertId) -> Option<&mut AlertEntry> {
        let at = self
            .entries
            .binary_search_by_key(&id, |entry| entry.id)
            .ok()?;
        self.entries.get_mut(at)
    }
}

impl Default for AlertJournal {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
