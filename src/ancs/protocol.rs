//! ANCS wire format.
//!
//! ## Notification Source (8 bytes, notified by the phone)
//!
//! ```text
//! Byte 0:   EventID        (0 = Added, 1 = Modified, 2 = Removed)
//! Byte 1:   EventFlags     (bitfield, see `EventFlags`)
//! Byte 2:   CategoryID
//! Byte 3:   CategoryCount
//! Byte 4-7: NotificationUID (little-endian)
//! ```
//!
//! ## Control Point - Get Notification Attributes
//!
//! ```text
//! CommandID (0) | NotificationUID (4, LE) | AttributeID [MaxLen (2, LE)] ...
//! ```
//!
//! Title, Subtitle and Message carry a max-length parameter; every other
//! attribute is requested by ID alone.

use heapless::Vec;

use crate::config::{ATTR_APP_ID_SIZE, ATTR_COMMON_SIZE, ATTR_MESSAGE_SIZE, ATTR_TITLE_SIZE};
use crate::error::Error;

/// ANCS primary service.
pub const ANCS_SERVICE_UUID: &str = "7905f431-b5ce-4e99-a40f-4b1e122d00d0";
/// Notification Source characteristic (notify).
pub const NOTIFICATION_SOURCE_UUID: &str = "9fbf120d-6301-42d9-8c58-25e699a21dbd";
/// Control Point characteristic (write with response).
pub const CONTROL_POINT_UUID: &str = "69d1d8f3-45e1-49a8-9821-9bbdfdaad9d9";
/// Data Source characteristic (notify).
pub const DATA_SOURCE_UUID: &str = "22eac6e9-24d6-4bb5-be44-b36ace7c7bfb";

/// ANCS UUIDs in the little-endian byte order used on air.
pub const ANCS_SERVICE_UUID_LE: [u8; 16] = uuid_le(ANCS_SERVICE_UUID);
pub const NOTIFICATION_SOURCE_UUID_LE: [u8; 16] = uuid_le(NOTIFICATION_SOURCE_UUID);
pub const CONTROL_POINT_UUID_LE: [u8; 16] = uuid_le(CONTROL_POINT_UUID);
pub const DATA_SOURCE_UUID_LE: [u8; 16] = uuid_le(DATA_SOURCE_UUID);

/// Generic Attribute service (0x1801).
pub const GATT_SERVICE_UUID16: u16 = 0x1801;
/// Service Changed characteristic (0x2A05, indicate).
pub const SERVICE_CHANGED_UUID16: u16 = 0x2A05;

/// Client Characteristic Configuration descriptor (0x2902).
pub const CCCD_UUID16: u16 = 0x2902;

/// Parse a textual 128-bit UUID into little-endian bytes.
///
/// Evaluated at compile time; a malformed literal fails the build.
pub const fn uuid_le(text: &str) -> [u8; 16] {
    const fn nibble(c: u8) -> u8 {
        match c {
            b'0'..=b'9' => c - b'0',
            b'a'..=b'f' => c - b'a' + 10,
            b'A'..=b'F' => c - b'A' + 10,
            _ => panic!("invalid hex digit in UUID"),
        }
    }

    let text = text.as_bytes();
    let mut out = [0u8; 16];
    let mut i = 0;
    let mut n = 0;
    while i < text.len() {
        if text[i] == b'-' {
            i += 1;
            continue;
        }
        out[15 - n] = (nibble(text[i]) << 4) | nibble(text[i + 1]);
        n += 1;
        i += 2;
    }
    out
}

/// Notification Source payload size.
pub const NOTIFICATION_SOURCE_LEN: usize = 8;

/// Attributes requested for every added notification, in request order.
///
/// Only AppIdentifier, Title and Message gate completion; the rest are
/// fetched so the Data Source stream stays in the shape the phone expects.
pub const REQUESTED_ATTRIBUTES: [AttributeId; 8] = [
    AttributeId::AppIdentifier,
    AttributeId::Title,
    AttributeId::Subtitle,
    AttributeId::Message,
    AttributeId::MessageSize,
    AttributeId::Date,
    AttributeId::PositiveActionLabel,
    AttributeId::NegativeActionLabel,
];

/// Upper bound of an encoded Get Notification Attributes command:
/// command + uid + one byte per attribute + three max-length fields.
pub const MAX_REQUEST_LEN: usize = 1 + 4 + REQUESTED_ATTRIBUTES.len() + 3 * 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EventKind {
    Added,
    Modified,
    Removed,
}

impl TryFrom<u8> for EventKind {
    type Error = Error;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(EventKind::Added),
            1 => Ok(EventKind::Modified),
            2 => Ok(EventKind::Removed),
            other => Err(Error::UnknownEvent(other)),
        }
    }
}

/// iOS notification categories.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Category {
    Other,
    IncomingCall,
    MissedCall,
    VoiceMail,
    Social,
    Schedule,
    Email,
    News,
    HealthAndFitness,
    BusinessAndFinance,
    Location,
    Entertainment,
    /// Reserved by Apple.
    Unknown(u8),
}

impl From<u8> for Category {
    fn from(code: u8) -> Self {
        match code {
            0 => Category::Other,
            1 => Category::IncomingCall,
            2 => Category::MissedCall,
            3 => Category::VoiceMail,
            4 => Category::Social,
            5 => Category::Schedule,
            6 => Category::Email,
            7 => Category::News,
            8 => Category::HealthAndFitness,
            9 => Category::BusinessAndFinance,
            10 => Category::Location,
            11 => Category::Entertainment,
            other => Category::Unknown(other),
        }
    }
}

impl Category {
    /// Human-readable label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            Category::Other => "Other",
            Category::IncomingCall => "Incoming Call",
            Category::MissedCall => "Missed Call",
            Category::VoiceMail => "Voice Mail",
            Category::Social => "Social",
            Category::Schedule => "Schedule",
            Category::Email => "Email",
            Category::News => "News",
            Category::HealthAndFitness => "Health And Fitness",
            Category::BusinessAndFinance => "Business And Finance",
            Category::Location => "Location",
            Category::Entertainment => "Entertainment",
            Category::Unknown(_) => "Unknown",
        }
    }
}

/// EventFlags bitfield from the Notification Source.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EventFlags(pub u8);

impl EventFlags {
    pub const SILENT: u8 = 1 << 0;
    pub const IMPORTANT: u8 = 1 << 1;
    pub const PRE_EXISTING: u8 = 1 << 2;
    pub const POSITIVE_ACTION: u8 = 1 << 3;
    pub const NEGATIVE_ACTION: u8 = 1 << 4;

    pub fn contains(&self, flag: u8) -> bool {
        self.0 & flag == flag
    }

    pub fn is_silent(&self) -> bool {
        self.contains(Self::SILENT)
    }

    pub fn is_important(&self) -> bool {
        self.contains(Self::IMPORTANT)
    }

    /// Notification existed before the link came up.
    pub fn is_pre_existing(&self) -> bool {
        self.contains(Self::PRE_EXISTING)
    }
}

/// Notification attribute identifiers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AttributeId {
    AppIdentifier,
    Title,
    Subtitle,
    Message,
    MessageSize,
    Date,
    PositiveActionLabel,
    NegativeActionLabel,
    Unknown(u8),
}

impl From<u8> for AttributeId {
    fn from(code: u8) -> Self {
        match code {
            0 => AttributeId::AppIdentifier,
            1 => AttributeId::Title,
            2 => AttributeId::Subtitle,
            3 => AttributeId::Message,
            4 => AttributeId::MessageSize,
            5 => AttributeId::Date,
            6 => AttributeId::PositiveActionLabel,
            7 => AttributeId::NegativeActionLabel,
            other => AttributeId::Unknown(other),
        }
    }
}

impl From<AttributeId> for u8 {
    fn from(id: AttributeId) -> Self {
        match id {
            AttributeId::AppIdentifier => 0,
            AttributeId::Title => 1,
            AttributeId::Subtitle => 2,
            AttributeId::Message => 3,
            AttributeId::MessageSize => 4,
            AttributeId::Date => 5,
            AttributeId::PositiveActionLabel => 6,
            AttributeId::NegativeActionLabel => 7,
            AttributeId::Unknown(code) => code,
        }
    }
}

impl AttributeId {
    /// Registered buffer cap: the most bytes kept from one delivery.
    pub const fn capacity(&self) -> usize {
        match self {
            AttributeId::AppIdentifier => ATTR_APP_ID_SIZE,
            AttributeId::Title => ATTR_TITLE_SIZE,
            AttributeId::Message => ATTR_MESSAGE_SIZE,
            _ => ATTR_COMMON_SIZE,
        }
    }

    /// Whether the request must carry a max-length parameter.
    pub const fn has_max_len(&self) -> bool {
        matches!(
            self,
            AttributeId::Title | AttributeId::Subtitle | AttributeId::Message
        )
    }
}

/// Control Point / Data Source command identifiers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CommandId {
    GetNotificationAttributes,
    GetAppAttributes,
    PerformNotificationAction,
}

impl CommandId {
    pub const fn code(&self) -> u8 {
        match self {
            CommandId::GetNotificationAttributes => 0,
            CommandId::GetAppAttributes => 1,
            CommandId::PerformNotificationAction => 2,
        }
    }
}

impl TryFrom<u8> for CommandId {
    type Error = Error;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(CommandId::GetNotificationAttributes),
            1 => Ok(CommandId::GetAppAttributes),
            2 => Ok(CommandId::PerformNotificationAction),
            other => Err(Error::UnknownCommand(other)),
        }
    }
}

/// One Notification Source event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct NotificationEnvelope {
    pub uid: u32,
    pub event: EventKind,
    pub flags: EventFlags,
    pub category: Category,
    pub category_count: u8,
}

impl NotificationEnvelope {
    /// Parse a Notification Source payload. Trailing bytes are ignored.
    pub fn parse(data: &[u8]) -> Result<Self, Error> {
        if data.len() < NOTIFICATION_SOURCE_LEN {
            return Err(Error::MalformedNotification);
        }
        Ok(Self {
            event: EventKind::try_from(data[0])?,
            flags: EventFlags(data[1]),
            category: Category::from(data[2]),
            category_count: data[3],
            uid: u32::from_le_bytes([data[4], data[5], data[6], data[7]]),
        })
    }
}

/// Encoded Get Notification Attributes command for the Control Point.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttributeRequest {
    bytes: Vec<u8, MAX_REQUEST_LEN>,
}

impl AttributeRequest {
    /// Request every attribute in [`REQUESTED_ATTRIBUTES`] for `uid`.
    pub fn for_notification(uid: u32) -> Self {
        let mut bytes: Vec<u8, MAX_REQUEST_LEN> = Vec::new();
        // MAX_REQUEST_LEN is derived from the same attribute table, so the
        // pushes below cannot overflow.
        let _ = bytes.push(CommandId::GetNotificationAttributes.code());
        let _ = bytes.extend_from_slice(&uid.to_le_bytes());
        for attribute in REQUESTED_ATTRIBUTES {
            let _ = bytes.push(u8::from(attribute));
            if attribute.has_max_len() {
                let _ = bytes.extend_from_slice(&(attribute.capacity() as u16).to_le_bytes());
            }
        }
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}
