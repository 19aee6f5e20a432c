//! Application-wide constants and compile-time configuration.
//!
//! Protocol limits, queue depths and BLE timing parameters live here so
//! they can be tuned in one place.

use crate::ancs::discovery::SecurityLevel;

// Notification pipeline

/// Number of notifications kept for the notification browser.
pub const MAX_NOTIFICATIONS: usize = 10;

/// Depth of the BLE → application record queue.
pub const EVENT_QUEUE_DEPTH: usize = 10;

// ANCS attribute buffer caps (bytes, excluding any terminator)

/// App Identifier, e.g. `com.apple.MobileSMS`.
pub const ATTR_APP_ID_SIZE: usize = 32;

/// Notification title.
pub const ATTR_TITLE_SIZE: usize = 64;

/// Notification body. Longer messages are truncated to this length.
pub const ATTR_MESSAGE_SIZE: usize = 256;

/// Every other attribute (subtitle, date, action labels, ...).
pub const ATTR_COMMON_SIZE: usize = 32;

// BLE

/// Minimum link security before service discovery starts.
/// ANCS refuses unencrypted access, so L2 (encrypted, unauthenticated).
pub const MIN_SECURITY_LEVEL: SecurityLevel = SecurityLevel::Encrypted;

/// GAP device name shown in the iOS Bluetooth settings.
pub const BLE_DEVICE_NAME: &str = "ANCS Watch";

/// Advertising interval (in 0.625 ms units). 160 = 100 ms.
pub const BLE_ADV_INTERVAL: u32 = 160;

/// Preferred connection interval range (in 1.25 ms units).
/// Notifications are not latency critical: 30 ms .. 50 ms.
pub const BLE_CONN_INTERVAL_MIN: u16 = 24;
pub const BLE_CONN_INTERVAL_MAX: u16 = 40;

/// Peripheral latency (number of connection events we may skip).
pub const BLE_SLAVE_LATENCY: u16 = 4;

/// Supervision timeout (in 10 ms units). 400 = 4 s.
pub const BLE_SUP_TIMEOUT: u16 = 400;

/// ATT MTU offered to the phone. Data Source notifications carry at most
/// `BLE_ATT_MTU - 3` bytes.
pub const BLE_ATT_MTU: u16 = 247;

/// Number of bonded phones remembered by the security handler.
pub const MAX_BONDED_PEERS: usize = 2;

/// Polling budget while waiting for the phone to encrypt the link
/// (`SECURE_LINK_POLL_COUNT` × `SECURE_LINK_POLL_MS`).
pub const SECURE_LINK_POLL_COUNT: u32 = 50;
pub const SECURE_LINK_POLL_MS: u64 = 200;
