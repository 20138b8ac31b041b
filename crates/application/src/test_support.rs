//! Shared test fixtures: a small event-sourced wallet.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use chronicle_core::{Aggregate, AggregateId, DomainEvent, Version, VersionError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WalletEvent {
    Opened {
        wallet_id: AggregateId,
        version: Version,
        at: DateTime<Utc>,
        owner: String,
    },
    Deposited {
        wallet_id: AggregateId,
        version: Version,
        at: DateTime<Utc>,
        amount: i64,
    },
}

impl DomainEvent for WalletEvent {
    fn originator_id(&self) -> AggregateId {
        match self {
            WalletEvent::Opened { wallet_id, .. } => *wallet_id,
            WalletEvent::Deposited { wallet_id, .. } => *wallet_id,
        }
    }

    fn originator_version(&self) -> Version {
        match self {
            WalletEvent::Opened { version, .. } => *version,
            WalletEvent::Deposited { version, .. } => *version,
        }
    }

    fn timestamp(&self) -> DateTime<Utc> {
        match self {
            WalletEvent::Opened { at, .. } => *at,
            WalletEvent::Deposited { at, .. } => *at,
        }
    }

    fn topic(&self) -> &str {
        match self {
            WalletEvent::Opened { .. } => "wallet.opened",
            WalletEvent::Deposited { .. } => "wallet.deposited",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    pub id: AggregateId,
    pub version: Version,
    pub created_on: DateTime<Utc>,
    pub modified_on: DateTime<Utc>,
    pub owner: String,
    pub balance: i64,
    #[serde(skip)]
    pub pending: Vec<WalletEvent>,
}

impl Wallet {
    pub fn open(owner: &str) -> Self {
        Self::open_with_id(AggregateId::new(), owner)
    }

    pub fn open_with_id(wallet_id: AggregateId, owner: &str) -> Self {
        let event = WalletEvent::Opened {
            wallet_id,
            version: 1,
            at: Utc::now(),
            owner: owner.to_string(),
        };
        let mut wallet = Self::from_event(&event).unwrap();
        wallet.pending.push(event);
        wallet
    }

    pub fn deposit(&mut self, amount: i64) {
        let event = WalletEvent::Deposited {
            wallet_id: self.id,
            version: self.version + 1,
            at: Utc::now(),
            amount,
        };
        self.apply(&event).unwrap();
        self.pending.push(event);
    }
}

impl Aggregate for Wallet {
    type Event = WalletEvent;

    const TOPIC: &'static str = "wallet";

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

    fn from_event(event: &WalletEvent) -> Option<Self> {
        match event {
            WalletEvent::Opened {
                wallet_id,
                at,
                owner,
                ..
            } => Some(Self {
                id: *wallet_id,
                version: 1,
                created_on: *at,
                modified_on: *at,
                owner: owner.clone(),
                balance: 0,
                pending: Vec::new(),
            }),
            _ => None,
        }
    }

    fn apply(&mut self, event: &WalletEvent) -> Result<(), VersionError> {
        self.check_version(event)?;
        match event {
            WalletEvent::Opened { .. } => {}
            WalletEvent::Deposited { amount, .. } => self.balance += amount,
        }
        self.version = event.originator_version();
        self.modified_on = event.timestamp();
        Ok(())
    }

    fn collect_events(&mut self) -> Vec<WalletEvent> {
        std::mem::take(&mut self.pending)
    }
}
