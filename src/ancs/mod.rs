//! Apple Notification Center Service client.
//!
//! This module is the phone-notification ingestion pipeline:
//!
//! 1. **Discovery** - finds ANCS on the phone once the link is encrypted,
//!    and again after a Service Changed indication if the first attempt
//!    failed.
//! 2. **Data Source parser** - reassembles attribute tuples from the
//!    streamed Data Source notifications.
//! 3. **Reassembler** - collects App/Title/Message for the notification
//!    in flight and emits a [`NotificationRecord`](crate::notification::NotificationRecord).
//!
//! [`AncsClient`] owns one of each for a single connection and posts
//! completed records to the application through the event bridge.

pub mod data_source;
pub mod discovery;
pub mod protocol;
pub mod reassembler;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::channel::Sender;

use crate::bridge;
use crate::error::Error;
use crate::notification::NotificationRecord;
use data_source::DataSourceParser;
use discovery::{AncsHandles, DiscoveryCoordinator, GattLink, GattServiceHandles, SecurityLevel};
use protocol::NotificationEnvelope;
use reassembler::AttributeReassembler;

/// Per-connection ANCS state.
pub struct AncsClient {
    discovery: DiscoveryCoordinator,
    parser: DataSourceParser,
    reassembler: AttributeReassembler,
}

impl AncsClient {
    pub const fn new() -> Self {
        Self {
            discovery: DiscoveryCoordinator::new(),
            parser: DataSourceParser::new(),
            reassembler: AttributeReassembler::new(),
        }
    }

    pub fn discovery(&self) -> &DiscoveryCoordinator {
        &self.discovery
    }

    pub fn reassembler(&self) -> &AttributeReassembler {
        &self.reassembler
    }

    pub fn on_security_changed<L: GattLink>(&mut self, level: SecurityLevel, link: &mut L) {
        self.discovery.on_security_upgraded(level, link);
    }

    pub fn on_gatt_service_discovered<L: GattLink>(
        &mut self,
        result: Result<GattServiceHandles, Error>,
        link: &mut L,
    ) {
        self.discovery.on_gatt_service_discovered(result, link);
    }

    pub fn on_ancs_discovered<L: GattLink>(
        &mut self,
        result: Result<AncsHandles, Error>,
        link: &mut L,
    ) {
        self.discovery.on_ancs_discovered(result, link);
    }

    pub fn on_service_changed<L: GattLink>(&mut self, link: &mut L) {
        self.discovery.on_service_changed_indicated(link);
    }

    /// Drop everything learned on the link, including a half-received
    /// notification.
    pub fn on_disconnected(&mut self) {
        self.discovery.on_disconnected();
        self.parser.reset();
        self.reassembler = AttributeReassembler::new();
    }

    /// Handle one Notification Source notification.
    ///
    /// For a newly added notification, asks the phone for its attributes
    /// through the Control Point.
    pub fn on_notification_source<L: GattLink>(&mut self, payload: &[u8], link: &mut L) {
        let envelope = match NotificationEnvelope::parse(payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("Ignoring Notification Source payload: {:?}", e);
                return;
            }
        };

        let Some(request) = self.reassembler.on_notification_added(&envelope) else {
            return;
        };

        let Some(handles) = self.discovery.handles() else {
            warn!("Notification {} before ANCS discovery finished", envelope.uid);
            return;
        };

        if let Err(e) = link.write_control_point(handles, &request) {
            error!("Failed to request notification attributes: {:?}", e);
        }
    }

    /// Handle one Data Source notification.
    ///
    /// Returns how many records were handed to the application queue.
    pub fn on_data_source<M: RawMutex, const N: usize>(
        &mut self,
        payload: &[u8],
        records: &Sender<'_, M, NotificationRecord, N>,
    ) -> usize {
        let reassembler = &mut self.reassembler;
        let mut posted = 0;
        let result = self.parser.feed(payload, |fragment| {
            if let Some(record) = reassembler.on_attribute_fragment(fragment.attribute, fragment.data) {
                if bridge::post(records, record) {
                    posted += 1;
                }
            }
        });

        if let Err(e) = result {
            warn!("Data Source response dropped: {:?}", e);
        }
        posted
    }
}

impl Default for AncsClient {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::data_source::tests::response;
    use super::discovery::tests::{ancs_handles, RecordingLink};
    use super::protocol::AttributeRequest;
    use super::*;
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;
    use embassy_sync::channel::Channel;

    fn ready_client(link: &mut RecordingLink) -> AncsClient {
        let mut client = AncsClient::new();
        client.on_security_changed(SecurityLevel::Encrypted, link);
        client.on_gatt_service_discovered(Err(Error::ServiceNotFound), link);
        client.on_ancs_discovered(Ok(ancs_handles()), link);
        assert!(client.discovery().service_found());
        client
    }

    #[test]
    fn added_notification_writes_control_point() {
        let mut link = RecordingLink::default();
        let mut client = ready_client(&mut link);

        client.on_notification_source(&[0x00, 0x00, 0x04, 0x01, 0x2A, 0x00, 0x00, 0x00], &mut link);
        assert_eq!(link.control_point_writes.len(), 1);
        assert_eq!(
            link.control_point_writes[0].as_slice(),
            AttributeRequest::for_notification(42).as_bytes()
        );
    }

    #[test]
    fn removed_notification_writes_nothing() {
        let mut link = RecordingLink::default();
        let mut client = ready_client(&mut link);
        client.on_notification_source(&[0x02, 0x00, 0x04, 0x00, 0x2A, 0x00, 0x00, 0x00], &mut link);
        assert!(link.control_point_writes.is_empty());
    }

    #[test]
    fn malformed_notification_source_is_ignored() {
        let mut link = RecordingLink::default();
        let mut client = ready_client(&mut link);
        client.on_notification_source(&[0x00, 0x00], &mut link);
        assert!(link.control_point_writes.is_empty());
    }

    #[test]
    fn notification_before_discovery_is_not_requested() {
        let mut link = RecordingLink::default();
        let mut client = AncsClient::new();
        client.on_notification_source(&[0x00, 0x00, 0x04, 0x01, 0x01, 0x00, 0x00, 0x00], &mut link);
        assert!(link.control_point_writes.is_empty());
    }

    #[test]
    fn control_point_failure_is_not_fatal() {
        let mut link = RecordingLink::default();
        let mut client = ready_client(&mut link);
        link.fail_write = true;
        client.on_notification_source(&[0x00, 0x00, 0x04, 0x01, 0x01, 0x00, 0x00, 0x00], &mut link);
        assert!(client.discovery().service_found());
    }

    #[test]
    fn data_source_posts_completed_record() {
        let channel: Channel<NoopRawMutex, NotificationRecord, 4> = Channel::new();
        let mut link = RecordingLink::default();
        let mut client = ready_client(&mut link);

        let bytes = response(42, b"com.test", b"Hello", b"World");
        let (first, rest) = bytes.split_at(9);
        assert_eq!(client.on_data_source(first, &channel.sender()), 0);
        assert_eq!(client.on_data_source(rest, &channel.sender()), 1);

        let record = channel.try_receive().unwrap();
        assert_eq!(record.title(), "Hello");
        assert_eq!(record.message(), "World");
        assert_eq!(record.app(), "com.test");
        assert!(channel.try_receive().is_err());
    }

    #[test]
    fn full_queue_drops_record() {
        let channel: Channel<NoopRawMutex, NotificationRecord, 1> = Channel::new();
        let mut link = RecordingLink::default();
        let mut client = ready_client(&mut link);

        let first = response(1, b"app1", b"title1", b"body1");
        let second = response(2, b"app2", b"title2", b"body2");
        assert_eq!(client.on_data_source(&first, &channel.sender()), 1);
        assert_eq!(client.on_data_source(&second, &channel.sender()), 0);

        assert_eq!(channel.try_receive().unwrap().title(), "title1");
        assert!(channel.try_receive().is_err());
    }

    #[test]
    fn disconnect_drops_partial_response() {
        let channel: Channel<NoopRawMutex, NotificationRecord, 4> = Channel::new();
        let mut link = RecordingLink::default();
        let mut client = ready_client(&mut link);

        let bytes = response(7, b"app", b"title", b"body");
        client.on_data_source(&bytes[..12], &channel.sender());
        assert_eq!(client.reassembler().accumulator().app_id(), Some("app"));

        client.on_disconnected();
        assert!(!client.discovery().service_found());
        assert!(client.reassembler().accumulator().is_empty());

        // The parser starts over at the next command byte.
        assert_eq!(client.on_data_source(&bytes, &channel.sender()), 1);
    }
}
