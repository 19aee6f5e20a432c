//! Completed phone notification as handed to the application.
//!
//! A [`NotificationRecord`] is move-only: it is built by the reassembler,
//! moved through the event queue and finally owned by the store. It is
//! not `Clone`.

use heapless::String;

use crate::config::{ATTR_APP_ID_SIZE, ATTR_MESSAGE_SIZE, ATTR_TITLE_SIZE};
use crate::error::Error;

pub type AppId = String<ATTR_APP_ID_SIZE>;
pub type Title = String<ATTR_TITLE_SIZE>;
pub type Message = String<ATTR_MESSAGE_SIZE>;

/// `{title, message, app}` triple of one phone notification.
#[derive(Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct NotificationRecord {
    title: Title,
    message: Message,
    app: AppId,
}

impl NotificationRecord {
    pub fn new(title: Title, message: Message, app: AppId) -> Self {
        Self {
            title,
            message,
            app,
        }
    }

    /// Build a record from borrowed strings.
    ///
    /// Fails with [`Error::BufferOverflow`] if any field exceeds its cap.
    pub fn from_strs(title: &str, message: &str, app: &str) -> Result<Self, Error> {
        Ok(Self {
            title: String::try_from(title).map_err(|_| Error::BufferOverflow)?,
            message: String::try_from(message).map_err(|_| Error::BufferOverflow)?,
            app: String::try_from(app).map_err(|_| Error::BufferOverflow)?,
        })
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Bundle identifier of the originating iOS app.
    pub fn app(&self) -> &str {
        &self.app
    }

    /// Give up the record and keep only its fields.
    pub fn into_parts(self) -> (Title, Message, AppId) {
        (self.title, self.message, self.app)
    }
}
