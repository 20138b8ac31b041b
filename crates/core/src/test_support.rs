//! Shared test fixtures: a minimal counter aggregate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::aggregate::Aggregate;
use crate::error::VersionError;
use crate::event::{DomainEvent, Version};
use crate::id::AggregateId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CounterEvent {
    Started {
        counter_id: AggregateId,
        version: Version,
        at: DateTime<Utc>,
    },
    Incremented {
        counter_id: AggregateId,
        version: Version,
        at: DateTime<Utc>,
        amount: i64,
    },
}

impl DomainEvent for CounterEvent {
    fn originator_id(&self) -> AggregateId {
        match self {
            CounterEvent::Started { counter_id, .. } => *counter_id,
            CounterEvent::Incremented { counter_id, .. } => *counter_id,
        }
    }

    fn originator_version(&self) -> Version {
        match self {
            CounterEvent::Started { version, .. } => *version,
            CounterEvent::Incremented { version, .. } => *version,
        }
    }

    fn timestamp(&self) -> DateTime<Utc> {
        match self {
            CounterEvent::Started { at, .. } => *at,
            CounterEvent::Incremented { at, .. } => *at,
        }
    }

    fn topic(&self) -> &str {
        match self {
            CounterEvent::Started { .. } => "test.counter.started",
            CounterEvent::Incremented { .. } => "test.counter.incremented",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counter {
    pub id: AggregateId,
    pub version: Version,
    pub created_on: DateTime<Utc>,
    pub modified_on: DateTime<Utc>,
    pub total: i64,
    #[serde(skip)]
    pub pending: Vec<CounterEvent>,
}

impl Counter {
    pub fn start() -> Self {
        let event = CounterEvent::Started {
            counter_id: AggregateId::new(),
            version: 1,
            at: Utc::now(),
        };
        let mut counter = Self::from_event(&event).unwrap();
        counter.pending.push(event);
        counter
    }

    pub fn increment(&mut self, amount: i64) {
        let event = CounterEvent::Incremented {
            counter_id: self.id,
            version: self.version + 1,
            at: Utc::now(),
            amount,
        };
        self.apply(&event).unwrap();
        self.pending.push(event);
    }
}

impl Aggregate for Counter {
    type Event = CounterEvent;

    const TOPIC: &'static str = "test.counter";

    fn id(&self) -> AggregateId {
        self.id
    }

    fn version(&self) -> Version {
        self.version
    }

    fn created_on(&self) -> DateTime<Utc> {
        self.created_on
    }

    fn modified_on(&self) -> DateTime<Utc> {
        self.modified_on
    }

    fn from_event(event: &CounterEvent) -> Option<Self> {
        match event {
            CounterEvent::Started {
                counter_id, at, ..
            } => Some(Self {
                id: *counter_id,
                version: 1,
                created_on: *at,
                modified_on: *at,
                total: 0,
                pending: Vec::new(),
            }),
            _ => None,
        }
    }

    fn apply(&mut self, event: &CounterEvent) -> Result<(), VersionError> {
        self.check_version(event)?;
        match event {
            CounterEvent::Started { .. } => {}
            CounterEvent::Incremented { amount, .. } => self.total += amount,
        }
        self.version = event.originator_version();
        self.modified_on = event.timestamp();
        Ok(())
    }

    fn collect_events(&mut self) -> Vec<CounterEvent> {
        std::mem::take(&mut self.pending)
    }
}
