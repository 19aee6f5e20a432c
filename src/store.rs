//! Fixed-capacity store of the most recent notifications.
//!
//! Ring buffer of `N` slots. `head` is the slot the next record goes
//! into; once `count == N` that slot holds the oldest record, which is
//! dropped before being overwritten.
//!
//! No internal locking: the store is owned by the application task and
//! only ever touched from there.

use crate::notification::NotificationRecord;

pub struct NotificationStore<const N: usize> {
    slots: [Option<NotificationRecord>; N],
    /// Index for the next new record.
    head: usize,
    count: usize,
}

impl<const N: usize> NotificationStore<N> {
    /// Create an empty store.
    pub const fn new() -> Self {
        const { assert!(N > 0, "NotificationStore needs at least one slot") };
        Self {
            slots: [const { None }; N],
            head: 0,
            count: 0,
        }
    }

    /// Take ownership of `record`, evicting the oldest one when full.
    pub fn insert(&mut self, record: NotificationRecord) {
        debug!(
            "Adding notification: {} - {} - {}",
            record.title(),
            record.message(),
            record.app()
        );

        if self.count == N {
            if let Some(evicted) = self.slots[self.head].take() {
                debug!("Store full - evicting notification from {}", evicted.app());
            }
        }

        self.slots[self.head] = Some(record);
        self.head = (self.head + 1) % N;

        if self.count < N {
            self.count += 1;
        }
        debug!("Store head={} count={}", self.head, self.count);
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    /// Record by recency rank: 0 is the most recently inserted.
    pub fn get_by_rank(&self, rank: usize) -> Option<&NotificationRecord> {
        if rank >= self.count {
            return None;
        }
        let index = (self.head + N - 1 - rank) % N;
        self.slots[index].as_ref()
    }

    /// Iterate most-recent-first.
    pub fn iter(&self) -> impl Iterator<Item = &NotificationRecord> + '_ {
        (0..self.count).filter_map(move |rank| self.get_by_rank(rank))
    }

    /// Free a record that was taken out of the insert/evict flow.
    pub fn dispose(&self, record: NotificationRecord) {
        debug!("Disposing notification from {}", record.app());
        drop(record);
    }

    /// Log every stored notification, most recent first.
    pub fn dump(&self) {
        for (rank, record) in self.iter().enumerate() {
            info!(
                "Notification {}: {} - {} - {}",
                rank,
                record.title(),
                record.message(),
                record.app()
            );
        }
    }
}

impl<const N: usize> Default for NotificationStore<N> {
    fn default() -> Self {
        Self::new()
    }
}
