//! # Bursar Contracts
//!
//! Institution accounting on top of the Bursar token ledger:
//!
//! - **Institution**: payer registration against a tiered fee schedule,
//!   paid in native value or in ledger tokens, plus an admin-run payroll
//!   with per-payee pay cycles and one-way suspension.
//! - **Runtime**: a simulated host that executes calls atomically, moves
//!   attached native value, and lets value recipients re-enter.
//! - **Events**: the append-only notification log both components write to.
//!
//! ## Design Principles
//!
//! 1. Validate everything, then write. Treasury arithmetic is checked, never
//!    wrapping.
//! 2. Payee state is explicit: record presence means registered and
//!    [`PayeeStatus`] carries suspension.
//! 3. The institution sees the ledger only through [`TokenLedger`].
//! 4. Every public type is serializable (serde) for the HTTP API and replay
//!    scripts.

pub mod events;
pub mod fee_schedule;
pub mod genesis;
pub mod institution;
pub mod runtime;
pub mod token;

pub use events::{Currency, Event, EventLog, EventRecord, InstitutionEvent};
pub use fee_schedule::{FeeSchedule, FeeScheduleError, Tier};
pub use genesis::{GenesisConfig, GenesisError};
pub use institution::{
    CallContext, Institution, InstitutionError, Payee, PayeeStatus, Payer, PendingSalary,
};
pub use runtime::{
    Call, Chain, ExecutionError, NativeTransfer, Receipt, Transaction, ValueReceiver, WorldState,
};
pub use token::TokenLedger;
