//! Paginated views over the global notification sequence.

use std::collections::VecDeque;
use std::sync::Arc;

use chronicle_persistence::{ApplicationRecorder, Notification, NotificationId};

use crate::error::ApplicationError;

pub const DEFAULT_SECTION_SIZE: usize = 10;

/// A fixed-size window over the notification sequence.
///
/// `id` describes the notifications actually contained (`"first,last"`,
/// inclusive, 1-indexed) and may be narrower than what was requested, or
/// `None` when the range is empty. `next_id` is set if and only if the
/// section is full, so readers know whether to keep following.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub id: Option<String>,
    pub items: Vec<Notification>,
    pub next_id: Option<String>,
}

pub fn format_section_id(first: NotificationId, last: NotificationId) -> String {
    format!("{first},{last}")
}

pub fn parse_section_id(
    section_id: &str,
) -> Result<(NotificationId, NotificationId), ApplicationError> {
    let malformed = || {
        ApplicationError::programming(format!(
            "malformed section id '{section_id}', expected 'first,last'"
        ))
    };
    let (first, last) = section_id.split_once(',').ok_or_else(malformed)?;
    Ok((
        first.trim().parse().map_err(|_| malformed())?,
        last.trim().parse().map_err(|_| malformed())?,
    ))
}

/// A paginated, forward-readable view over an application's notifications.
pub trait NotificationLog: Send + Sync {
    /// Return the section covering the requested id range.
    fn section(&self, section_id: &str) -> Result<Section, ApplicationError>;

    /// Notifications with `id >= start`, ascending, at most `limit`
    /// (`limit` must not exceed the log's section size).
    fn select(
        &self,
        start: NotificationId,
        limit: usize,
    ) -> Result<Vec<Notification>, ApplicationError>;
}

/// Notification log served directly from an [`ApplicationRecorder`].
pub struct LocalNotificationLog {
    recorder: Arc<dyn ApplicationRecorder>,
    section_size: usize,
}

impl LocalNotificationLog {
    pub fn new(recorder: Arc<dyn ApplicationRecorder>) -> Self {
        Self::with_section_size(recorder, DEFAULT_SECTION_SIZE)
    }

    pub fn with_section_size(recorder: Arc<dyn ApplicationRecorder>, section_size: usize) -> Self {
        Self {
            recorder,
            section_size,
        }
    }

    pub fn section_size(&self) -> usize {
        self.section_size
    }
}

impl NotificationLog for LocalNotificationLog {
    fn section(&self, section_id: &str) -> Result<Section, ApplicationError> {
        let (first, last) = parse_section_id(section_id)?;
        let start = first.max(1);
        let span = last.saturating_add(1).saturating_sub(start) as usize;
        let limit = span.min(self.section_size);

        let items = self.select(start, limit)?;

        let (id, next_id) = match (items.first(), items.last()) {
            (Some(head), Some(tail)) => {
                let id = Some(format_section_id(head.id, tail.id));
                let next_id = (items.len() == limit)
                    .then(|| format_section_id(tail.id + 1, tail.id + limit as u64));
                (id, next_id)
            }
            _ => (None, None),
        };

        Ok(Section { id, items, next_id })
    }

    fn select(
        &self,
        start: NotificationId,
        limit: usize,
    ) -> Result<Vec<Notification>, ApplicationError> {
        if limit > self.section_size {
            return Err(ApplicationError::programming(format!(
                "requested limit {limit} greater than section size {}",
                self.section_size
            )));
        }
        Ok(self.recorder.select_notifications(start, limit)?)
    }
}

impl core::fmt::Debug for LocalNotificationLog {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("LocalNotificationLog")
            .field("section_size", &self.section_size)
            .finish_non_exhaustive()
    }
}

/// Drives forward iteration over a notification log, section by section.
pub struct NotificationLogReader {
    log: Arc<dyn NotificationLog>,
    section_size: usize,
}

impl NotificationLogReader {
    pub fn new(log: Arc<dyn NotificationLog>) -> Self {
        Self::with_section_size(log, DEFAULT_SECTION_SIZE)
    }

    pub fn with_section_size(log: Arc<dyn NotificationLog>, section_size: usize) -> Self {
        Self { log, section_size }
    }

    /// Yield every notification with `id >= start`, following `next_id`
    /// until a partial section ends the sequence.
    pub fn read(&self, start: NotificationId) -> NotificationIter {
        let start = start.max(1);
        NotificationIter {
            log: Arc::clone(&self.log),
            buffer: VecDeque::new(),
            next_section: Some(format_section_id(
                start,
                start + self.section_size as u64 - 1,
            )),
        }
    }
}

/// Iterator over notifications; a log failure ends iteration after being
/// yielded once.
pub struct NotificationIter {
    log: Arc<dyn NotificationLog>,
    buffer: VecDeque<Notification>,
    next_section: Option<String>,
}

impl Iterator for NotificationIter {
    type Item = Result<Notification, ApplicationError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(notification) = self.buffer.pop_front() {
                return Some(Ok(notification));
            }
            let section_id = self.next_section.take()?;
            match self.log.section(&section_id) {
                Ok(section) => {
                    self.buffer.extend(section.items);
                    self.next_section = section.next_id;
                    if self.buffer.is_empty() && self.next_section.is_none() {
                        return None;
                    }
                }
                Err(e) => return Some(Err(e)),
            }
        }
    }
}
