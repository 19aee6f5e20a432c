//! Bluetooth Low Energy subsystem.
//!
//! This module drives the Nordic SoftDevice S140 in **Peripheral** role
//! with a GATT **client** on top, which is what ANCS expects of a watch:
//!
//! 1. **Connection** - advertises with an ANCS solicitation, bonds with
//!    the phone and waits for an encrypted link.
//! 2. **GATT clients** - discover the Generic Attribute service and ANCS
//!    on the phone and turn notifications into [`gatt::PeerEvent`]s.
//! 3. **Link** - executes the peer operations requested by the
//!    [`AncsClient`](crate::ancs::AncsClient) and reports their outcome.
//!
//! Completed notifications leave through the record channel owned by
//! `main.rs`.

pub mod connection;
pub mod gatt;
pub mod link;

pub use connection::{ble_task, RecordSender};
