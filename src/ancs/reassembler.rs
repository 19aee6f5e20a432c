//! Attribute reassembly for one in-flight notification.
//!
//! AppIdentifier, Title and Message arrive as separate Data Source
//! attributes, in any order. They are collected in an
//! [`AttributeAccumulator`]; the moment all three are present and
//! non-empty a [`NotificationRecord`] is packaged and the accumulator
//! starts over.
//!
//! The accumulator is *not* reset when a new notification is announced.
//! If the phone interleaves two notifications, fields from both can end
//! up in a single record.

use heapless::String;

use super::protocol::{AttributeId, AttributeRequest, EventKind, NotificationEnvelope};
use crate::error::Error;
use crate::notification::{AppId, Message, NotificationRecord, Title};

/// Copy attribute bytes into an owned string of capacity `N`.
///
/// Input longer than `N` is truncated (hard cap, not a rejection). A
/// multi-byte character cut by the cap is dropped whole. Bytes that are
/// not UTF-8 for any other reason fail the copy.
pub fn copy_attribute<const N: usize>(bytes: &[u8]) -> Result<String<N>, Error> {
    let capped = &bytes[..bytes.len().min(N)];
    let text = match core::str::from_utf8(capped) {
        Ok(text) => text,
        // Only the tail is incomplete: the cap split a character.
        Err(e) if e.error_len().is_none() => {
            // valid_up_to() bytes were just validated.
            core::str::from_utf8(&capped[..e.valid_up_to()]).map_err(|_| Error::InvalidUtf8)?
        }
        Err(_) => return Err(Error::InvalidUtf8),
    };
    String::try_from(text).map_err(|_| Error::BufferOverflow)
}

/// Working state for the notification currently being received.
#[derive(Debug, Default)]
pub struct AttributeAccumulator {
    app_id: Option<AppId>,
    title: Option<Title>,
    message: Option<Message>,
}

impl AttributeAccumulator {
    pub const fn new() -> Self {
        Self {
            app_id: None,
            title: None,
            message: None,
        }
    }

    pub fn app_id(&self) -> Option<&str> {
        self.app_id.as_deref()
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.app_id.is_none() && self.title.is_none() && self.message.is_none()
    }

    fn is_complete(&self) -> bool {
        fn filled<const N: usize>(field: &Option<String<N>>) -> bool {
            field.as_ref().is_some_and(|s| !s.is_empty())
        }
        filled(&self.app_id) && filled(&self.title) && filled(&self.message)
    }

    /// Move the three fields out, leaving the accumulator empty.
    fn take_record(&mut self) -> Option<NotificationRecord> {
        if !self.is_complete() {
            return None;
        }
        let app = self.app_id.take()?;
        let title = self.title.take()?;
        let message = self.message.take()?;
        Some(NotificationRecord::new(title, message, app))
    }
}

/// Turns Notification Source events and Data Source attributes into
/// completed records.
#[derive(Debug, Default)]
pub struct AttributeReassembler {
    accumulator: AttributeAccumulator,
}

impl AttributeReassembler {
    pub const fn new() -> Self {
        Self {
            accumulator: AttributeAccumulator::new(),
        }
    }

    pub fn accumulator(&self) -> &AttributeAccumulator {
        &self.accumulator
    }

    /// Decide what to ask the phone for after a Notification Source event.
    ///
    /// Only `Added` produces a request; other events are observed only.
    pub fn on_notification_added(
        &mut self,
        envelope: &NotificationEnvelope,
    ) -> Option<AttributeRequest> {
        info!(
            "[{}] - {:?}: {}",
            envelope.uid,
            envelope.event,
            envelope.category.label()
        );

        match envelope.event {
            EventKind::Added => Some(AttributeRequest::for_notification(envelope.uid)),
            EventKind::Modified | EventKind::Removed => None,
        }
    }

    /// Store one attribute value and emit a record once App, Title and
    /// Message are all present.
    ///
    /// A zero-length value clears the field. A value that cannot be copied
    /// leaves the field unset; completion then waits for a later delivery.
    pub fn on_attribute_fragment(
        &mut self,
        attribute: AttributeId,
        bytes: &[u8],
    ) -> Option<NotificationRecord> {
        let acc = &mut self.accumulator;
        match attribute {
            AttributeId::AppIdentifier => acc.app_id = Self::copy_field(attribute, bytes),
            AttributeId::Title => acc.title = Self::copy_field(attribute, bytes),
            AttributeId::Message => acc.message = Self::copy_field(attribute, bytes),
            _ => {
                debug!("Ignoring attribute {:?} ({} bytes)", attribute, bytes.len());
                return None;
            }
        }

        let record = acc.take_record()?;
        debug!("Notification complete from {}", record.app());
        Some(record)
    }

    fn copy_field<const N: usize>(attribute: AttributeId, bytes: &[u8]) -> Option<String<N>> {
        if bytes.is_empty() {
            debug!("{:?}: (N/A)", attribute);
            return None;
        }
        match copy_attribute::<N>(bytes) {
            Ok(value) => {
                debug!("{:?}: {}", attribute, value.as_str());
                Some(value)
            }
            Err(e) => {
                warn!("Dropping {:?} value: {:?}", attribute, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ancs::protocol::{Category, EventFlags};
    use crate::config::ATTR_MESSAGE_SIZE;

    fn envelope(uid: u32, event: EventKind) -> NotificationEnvelope {
        NotificationEnvelope {
            uid,
            event,
            flags: EventFlags::default(),
            category: Category::Social,
            category_count: 1,
        }
    }

    #[test]
    fn added_event_requests_attributes() {
        let mut r = AttributeReassembler::new();
        let request = r.on_notification_added(&envelope(9, EventKind::Added)).unwrap();
        assert_eq!(request, AttributeRequest::for_notification(9));
    }

    #[test]
    fn modified_and_removed_are_observed_only() {
        let mut r = AttributeReassembler::new();
        assert!(r.on_notification_added(&envelope(1, EventKind::Modified)).is_none());
        assert!(r.on_notification_added(&envelope(1, EventKind::Removed)).is_none());
    }

    #[test]
    fn emits_only_after_third_field() {
        let mut r = AttributeReassembler::new();
        assert!(r.on_attribute_fragment(AttributeId::AppIdentifier, b"com.test").is_none());
        assert!(r.on_attribute_fragment(AttributeId::Message, b"World").is_none());
        let record = r.on_attribute_fragment(AttributeId::Title, b"Hello").unwrap();

        assert_eq!(record.title(), "Hello");
        assert_eq!(record.message(), "World");
        assert_eq!(record.app(), "com.test");
        assert!(r.accumulator().is_empty());
    }

    #[test]
    fn any_arrival_order_emits_exactly_once() {
        let fields: [(AttributeId, &[u8]); 3] = [
            (AttributeId::AppIdentifier, b"app"),
            (AttributeId::Title, b"title"),
            (AttributeId::Message, b"message"),
        ];
        let orders = [
            [0, 1, 2],
            [0, 2, 1],
            [1, 0, 2],
            [1, 2, 0],
            [2, 0, 1],
            [2, 1, 0],
        ];
        for order in orders {
            let mut r = AttributeReassembler::new();
            let mut emitted = 0;
            for (step, &i) in order.iter().enumerate() {
                let (id, bytes) = fields[i];
                let out = r.on_attribute_fragment(id, bytes);
                if step < 2 {
                    assert!(out.is_none(), "early record for order {:?}", order);
                } else {
                    let record = out.expect("record on last field");
                    assert_eq!(record.title(), "title");
                    assert_eq!(record.message(), "message");
                    assert_eq!(record.app(), "app");
                    emitted += 1;
                }
            }
            assert_eq!(emitted, 1);
        }
    }

    #[test]
    fn other_attributes_do_not_count() {
        let mut r = AttributeReassembler::new();
        assert!(r.on_attribute_fragment(AttributeId::Subtitle, b"sub").is_none());
        assert!(r.on_attribute_fragment(AttributeId::Date, b"20240101T120000").is_none());
        assert!(r.on_attribute_fragment(AttributeId::AppIdentifier, b"a").is_none());
        assert!(r.on_attribute_fragment(AttributeId::Title, b"t").is_none());
        assert!(r.on_attribute_fragment(AttributeId::MessageSize, b"3").is_none());
        assert!(r.on_attribute_fragment(AttributeId::Message, b"m").is_some());
    }

    #[test]
    fn repeated_field_replaces_previous_value() {
        let mut r = AttributeReassembler::new();
        r.on_attribute_fragment(AttributeId::Title, b"first");
        r.on_attribute_fragment(AttributeId::Title, b"second");
        assert_eq!(r.accumulator().title(), Some("second"));

        r.on_attribute_fragment(AttributeId::AppIdentifier, b"app");
        let record = r.on_attribute_fragment(AttributeId::Message, b"body").unwrap();
        assert_eq!(record.title(), "second");
    }

    #[test]
    fn empty_value_clears_field() {
        let mut r = AttributeReassembler::new();
        r.on_attribute_fragment(AttributeId::AppIdentifier, b"app");
        r.on_attribute_fragment(AttributeId::Title, b"title");
        r.on_attribute_fragment(AttributeId::Title, b"");
        assert_eq!(r.accumulator().title(), None);
        assert!(r.on_attribute_fragment(AttributeId::Message, b"body").is_none());
    }

    #[test]
    fn long_message_is_truncated_to_cap() {
        let mut r = AttributeReassembler::new();
        r.on_attribute_fragment(AttributeId::AppIdentifier, b"app");
        r.on_attribute_fragment(AttributeId::Title, b"title");
        let body = [b'x'; 300];
        let record = r.on_attribute_fragment(AttributeId::Message, &body).unwrap();
        assert_eq!(record.message().len(), ATTR_MESSAGE_SIZE);
        assert_eq!(record.message().len(), 256);
    }

    #[test]
    fn invalid_utf8_leaves_field_unset() {
        let mut r = AttributeReassembler::new();
        r.on_attribute_fragment(AttributeId::AppIdentifier, b"app");
        r.on_attribute_fragment(AttributeId::Title, &[0x48, 0xFF, 0x49]);
        assert_eq!(r.accumulator().title(), None);
        assert!(r.on_attribute_fragment(AttributeId::Message, b"body").is_none());

        // A later valid delivery completes the record.
        let record = r.on_attribute_fragment(AttributeId::Title, b"Hi").unwrap();
        assert_eq!(record.title(), "Hi");
    }

    #[test]
    fn cap_never_splits_a_character() {
        // 31 ASCII bytes followed by a two-byte 'é' straddling the 32-byte cap.
        let mut bytes = [b'a'; 33];
        bytes[31] = 0xC3;
        bytes[32] = 0xA9;
        let app: AppId = copy_attribute(&bytes).unwrap();
        assert_eq!(app.len(), 31);
    }

    #[test]
    fn interleaved_notifications_can_merge() {
        // Known boundary: a new "added" event does not reset the accumulator,
        // so a half-received notification is completed by the next one.
        let mut r = AttributeReassembler::new();
        r.on_notification_added(&envelope(1, EventKind::Added));
        r.on_attribute_fragment(AttributeId::AppIdentifier, b"com.first");
        r.on_attribute_fragment(AttributeId::Title, b"First title");

        r.on_notification_added(&envelope(2, EventKind::Added));
        let record = r.on_attribute_fragment(AttributeId::Message, b"Second body").unwrap();
        assert_eq!(record.app(), "com.first");
        assert_eq!(record.title(), "First title");
        assert_eq!(record.message(), "Second body");
    }
}
