//! Remote notification log client.

use chronicle_application::{ApplicationError, NotificationLog, Section};
use chronicle_persistence::{Notification, NotificationId, PersistenceError};

use crate::wire::{NotificationDto, SectionDto};

/// A [`NotificationLog`] read over HTTP from a server exposing the
/// [`crate::server`] endpoints.
///
/// Section and select semantics are exactly those of the remote log;
/// transport and decode failures surface as datastore errors. The client is
/// blocking, like the rest of the persistence surface, so it must not be
/// driven from an async executor thread.
pub struct RemoteNotificationLog {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl RemoteNotificationLog {
    /// `base_url` is the server root, e.g. `http://127.0.0.1:8000`.
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            client: reqwest::blocking::Client::new(),
            base_url,
        }
    }

    fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, ApplicationError> {
        self.client
            .get(url)
            .send()
            .and_then(|response| response.error_for_status())
            .and_then(|response| response.json())
            .map_err(|e| transport_error(url, e))
    }
}

fn transport_error(url: &str, e: reqwest::Error) -> ApplicationError {
    ApplicationError::Persistence(PersistenceError::datastore(format!(
        "remote notification log request to {url} failed: {e}"
    )))
}

impl NotificationLog for RemoteNotificationLog {
    fn section(&self, section_id: &str) -> Result<Section, ApplicationError> {
        let url = format!("{}/notifications/{section_id}", self.base_url);
        let dto: SectionDto = self.get_json(&url)?;
        dto.to_section()
    }

    fn select(
        &self,
        start: NotificationId,
        limit: usize,
    ) -> Result<Vec<Notification>, ApplicationError> {
        let url = format!(
            "{}/notifications?start={start}&limit={limit}",
            self.base_url
        );
        let items: Vec<NotificationDto> = self.get_json(&url)?;
        items.iter().map(NotificationDto::to_notification).collect()
    }
}

impl core::fmt::Debug for RemoteNotificationLog {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RemoteNotificationLog")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}
