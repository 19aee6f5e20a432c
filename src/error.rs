//! Unified error type for ancs-watch.
//!
//! We avoid `alloc` - all error variants carry only fixed-size data.
//! Implements `defmt::Format` (behind the `defmt` feature) for efficient
//! on-target logging.

/// Top-level error type used across the notification pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    // BLE
    /// The SoftDevice or the GATT client returned a BLE-level error.
    Ble(BleError),

    /// The peer does not expose the requested service.
    ServiceNotFound,

    // ANCS wire format
    /// A Notification Source payload was shorter than 8 bytes.
    MalformedNotification,

    /// Notification Source carried an EventID outside Added/Modified/Removed.
    UnknownEvent(u8),

    /// Data Source carried a CommandID we never issue.
    UnknownCommand(u8),

    /// Attribute bytes are not valid UTF-8.
    InvalidUtf8,

    // Hand-off
    /// The BLE → application queue is full.
    QueueFull,

    // Generic
    /// Buffer too small for the requested operation.
    BufferOverflow,
}

/// Subset of BLE errors we propagate (keeps the enum `Copy`-friendly).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BleError {
    /// GAP / GATT raw error code from the SoftDevice.
    Raw(u32),
    /// GATT discovery could not be started or failed midway.
    DiscoveryFailed,
    /// CCCD write (subscribe) failed.
    NotifyFailed,
    /// Control Point write failed.
    WriteFailed,
    /// The link dropped while a procedure was pending.
    Disconnected,
}

// Convenience conversions

impl From<BleError> for Error {
    fn from(e: BleError) -> Self {
        Error::Ble(e)
    }
}
