//! Hand-off of completed records from the BLE context to the
//! application task.
//!
//! The BLE side must never block the radio, so it only ever uses
//! `try_send`: when the queue is full the record is dropped (and freed)
//! on the spot. The application side receives, inserts into its
//! [`NotificationStore`] and thereby becomes the record's sole owner.

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::channel::{Channel, Receiver, Sender};

use crate::config::EVENT_QUEUE_DEPTH;
use crate::notification::NotificationRecord;
use crate::store::NotificationStore;

/// Queue type used on the target.
pub type NotificationChannel<M> = Channel<M, NotificationRecord, EVENT_QUEUE_DEPTH>;

/// Enqueue without waiting. Returns `false` if the record was dropped.
pub fn post<M: RawMutex, const N: usize>(
    tx: &Sender<'_, M, NotificationRecord, N>,
    record: NotificationRecord,
) -> bool {
    match tx.try_send(record) {
        Ok(()) => true,
        Err(_) => {
            warn!("Notification queue full - dropping notification");
            false
        }
    }
}

/// Take ownership of one received record.
pub fn deliver<const C: usize>(record: NotificationRecord, store: &mut NotificationStore<C>) {
    store.insert(record);
    store.dump();
}

/// Move every queued record into `store` without waiting.
///
/// Returns the number of records moved.
pub fn drain<M: RawMutex, const N: usize, const C: usize>(
    rx: &Receiver<'_, M, NotificationRecord, N>,
    store: &mut NotificationStore<C>,
) -> usize {
    let mut moved = 0;
    while let Ok(record) = rx.try_receive() {
        deliver(record, store);
        moved += 1;
    }
    moved
}

/// Wait for the next record and move it into `store`.
pub async fn forward_next<M: RawMutex, const N: usize, const C: usize>(
    rx: &Receiver<'_, M, NotificationRecord, N>,
    store: &mut NotificationStore<C>,
) {
    let record = rx.receive().await;
    deliver(record, store);
}
