//! ANCS notification pipeline for an nRF52840 watch.
//!
//! Everything that does not touch the radio lives here and builds on the
//! host, so the protocol logic can be tested without hardware:
//!
//! - [`ancs`] - discovery, Data Source parsing, attribute reassembly
//! - [`bridge`] - BLE context to application task hand-off
//! - [`store`] - bounded most-recent-first notification history
//!
//! Usage: `cargo test` on the host.
//!
//! The SoftDevice binding in [`ble`] and the firmware entry point in
//! `main.rs` need `--features embedded` and the thumbv7em target.

#![cfg_attr(not(test), no_std)]

// Must come first so the logging macros are visible to every module.
#[macro_use]
mod fmt;

pub mod ancs;
pub mod bridge;
pub mod config;
pub mod error;
pub mod notification;
pub mod store;

#[cfg(feature = "embedded")]
pub mod ble;

pub use ancs::AncsClient;
pub use error::{BleError, Error};
pub use notification::NotificationRecord;
pub use store::NotificationStore;
