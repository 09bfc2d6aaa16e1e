//! # Notification Log
//!
//! Append-only record of everything observable that happened: ledger
//! transfers and approvals, payer registrations and payments, payee
//! registrations, salaries, and suspensions.
//!
//! The institution only ever appends. Truncation exists solely for the
//! runtime's rollback path, which removes whatever a failed call emitted.

use bursar_protocol::{AccountId, Amount, LedgerEvent};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::fee_schedule::Tier;

/// Which of the two currencies a payment moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Currency {
    /// Host native value attached to the call.
    Native,
    /// Ledger token units.
    Token,
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Currency::Native => write!(f, "native"),
            Currency::Token => write!(f, "token"),
        }
    }
}

/// Notification emitted by the institution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstitutionEvent {
    /// A payer paid the fee for `tier` and was registered.
    PayerRegistered {
        account: AccountId,
        name: String,
        tier: Tier,
    },
    /// The institution received a payment.
    PaymentReceived {
        account: AccountId,
        amount: Amount,
        currency: Currency,
        timestamp: DateTime<Utc>,
    },
    /// The admin registered a payee.
    PayeeRegistered { account: AccountId, name: String },
    /// A payee's salary for the current cycle went out.
    SalaryPaid {
        account: AccountId,
        amount: Amount,
        currency: Currency,
        timestamp: DateTime<Utc>,
    },
    /// The admin suspended a payee.
    PayeeSuspended { account: AccountId },
}

/// Any notification in the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Event {
    /// Emitted by the token ledger.
    Ledger(LedgerEvent),
    /// Emitted by the institution.
    Institution(InstitutionEvent),
}

impl From<LedgerEvent> for Event {
    fn from(event: LedgerEvent) -> Self {
        Event::Ledger(event)
    }
}

impl From<InstitutionEvent> for Event {
    fn from(event: InstitutionEvent) -> Self {
        Event::Institution(event)
    }
}

/// A logged notification with its position and time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Zero-based position in the log.
    pub sequence: u64,
    /// Time of the call that emitted it.
    pub timestamp: DateTime<Utc>,
    /// The notification.
    pub event: Event,
}

/// The append-only notification log.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventLog {
    records: Vec<EventRecord>,
}

impl EventLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a notification.
    pub fn emit(&mut self, timestamp: DateTime<Utc>, event: impl Into<Event>) {
        let sequence = self.records.len() as u64;
        self.records.push(EventRecord {
            sequence,
            timestamp,
            event: event.into(),
        });
    }

    /// All records, oldest first.
    pub fn records(&self) -> &[EventRecord] {
        &self.records
    }

    /// Records from position `mark` onwards.
    pub fn since(&self, mark: usize) -> &[EventRecord] {
        self.records.get(mark..).unwrap_or(&[])
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if nothing has been logged.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Drops every record at or after `mark`. Rollback only.
    pub(crate) fn truncate(&mut self, mark: usize) {
        self.records.truncate(mark);
    }

    /// Iterates over the bare notifications.
    pub fn events(&self) -> impl Iterator<Item = &Event> {
        self.records.iter().map(|r| &r.event)
    }
}
