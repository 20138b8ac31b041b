//! JSON wire representation of sections and notifications.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};

use chronicle_application::{ApplicationError, Section};
use chronicle_core::AggregateId;
use chronicle_persistence::Notification;

/// A notification on the wire: hex uuid, base64 state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationDto {
    pub id: u64,
    pub originator_id: String,
    pub originator_version: u64,
    pub topic: String,
    pub state: String,
}

impl From<&Notification> for NotificationDto {
    fn from(notification: &Notification) -> Self {
        Self {
            id: notification.id,
            originator_id: notification.originator_id.as_uuid().simple().to_string(),
            originator_version: notification.originator_version,
            topic: notification.topic.clone(),
            state: BASE64.encode(&notification.state),
        }
    }
}

impl NotificationDto {
    pub fn to_notification(&self) -> Result<Notification, ApplicationError> {
        let originator_id = uuid::Uuid::parse_str(&self.originator_id)
            .map(AggregateId::from_uuid)
            .map_err(|e| decode_error(format!("bad originator_id: {e}")))?;
        let state = BASE64
            .decode(&self.state)
            .map_err(|e| decode_error(format!("bad state encoding: {e}")))?;
        Ok(Notification {
            id: self.id,
            originator_id,
            originator_version: self.originator_version,
            topic: self.topic.clone(),
            state,
        })
    }
}

/// A section on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionDto {
    pub id: Option<String>,
    pub next_id: Option<String>,
    pub items: Vec<NotificationDto>,
}

impl From<&Section> for SectionDto {
    fn from(section: &Section) -> Self {
        Self {
            id: section.id.clone(),
            next_id: section.next_id.clone(),
            items: section.items.iter().map(NotificationDto::from).collect(),
        }
    }
}

impl SectionDto {
    pub fn to_section(&self) -> Result<Section, ApplicationError> {
        Ok(Section {
            id: self.id.clone(),
            items: self
                .items
                .iter()
                .map(NotificationDto::to_notification)
                .collect::<Result<Vec<_>, _>>()?,
            next_id: self.next_id.clone(),
        })
    }
}

fn decode_error(msg: String) -> ApplicationError {
    ApplicationError::Persistence(chronicle_persistence::PersistenceError::datastore(msg))
}
