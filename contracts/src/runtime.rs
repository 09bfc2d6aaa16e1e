//! # Execution Runtime
//!
//! The simulated host that runs ledger and institution calls. Each call
//! executes inside a savepoint: a snapshot of the world state plus the event
//! log length. If anything fails, the snapshot is restored and the log is
//! cut back, so a failed call leaves no trace, including the native value
//! that was attached to it.
//!
//! ## Re-entrancy
//!
//! Outbound native transfers run the recipient's [`ValueReceiver`] hook, if
//! one is registered. The hook gets the live [`Transaction`] and may submit
//! further calls through [`Transaction::call`], each in its own nested
//! savepoint. Those calls always run as the account that received the
//! value, so a hook can never act for the admin or spend another account's
//! funds. The institution commits its flags and totals before the
//! transfer, so a re-entering hook sees the payment as already made.
//!
//! ```text
//! submit ─▶ savepoint ─▶ attach value ─▶ institution commit ─▶ send value
//!                                                                 │
//!                                              hook ─▶ tx.call ◀──┘
//! ```

use bursar_protocol::config::MAX_CALL_DEPTH;
use bursar_protocol::{AccountId, Amount, Ledger, LedgerError, NativeBank, NativeError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::events::{EventLog, EventRecord};
use crate::fee_schedule::Tier;
use crate::genesis::{GenesisConfig, GenesisError};
use crate::institution::{CallContext, Institution, InstitutionError};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Why a submitted call was reverted.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExecutionError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Institution(#[from] InstitutionError),

    #[error(transparent)]
    Native(#[from] NativeError),

    /// Native value was attached to a call that does not accept it.
    #[error("{call} does not accept native value")]
    NonPayable {
        /// Name of the rejected call.
        call: &'static str,
    },

    /// Nested calls went deeper than the runtime allows.
    #[error("call depth limit of {0} exceeded")]
    CallDepthExceeded(usize),
}

impl ExecutionError {
    /// Stable taxonomy name of the error, surfaced to API clients.
    pub fn code(&self) -> &'static str {
        match self {
            ExecutionError::Ledger(e) => e.code(),
            ExecutionError::Institution(e) => e.code(),
            ExecutionError::Native(e) => e.code(),
            ExecutionError::NonPayable { .. } => "NonPayable",
            ExecutionError::CallDepthExceeded(_) => "CallDepthExceeded",
        }
    }
}

// ---------------------------------------------------------------------------
// Calls
// ---------------------------------------------------------------------------

/// A call a client can submit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Call {
    /// Creates new tokens for `account`.
    Mint { account: AccountId, amount: Amount },
    /// Moves the caller's tokens to `to`.
    Transfer { to: AccountId, amount: Amount },
    /// Spends the caller's allowance over `from`.
    TransferFrom {
        from: AccountId,
        to: AccountId,
        amount: Amount,
    },
    /// Sets `spender`'s allowance over the caller's tokens.
    Approve { spender: AccountId, amount: Amount },
    /// Registers the caller as a payer using the attached native value.
    RegisterPayer { name: String, tier: Tier },
    /// Registers the caller as a payer with a delegated token payment.
    RegisterPayerViaLedger {
        amount: Amount,
        name: String,
        tier: Tier,
    },
    /// Registers a payee.
    RegisterPayee { account: AccountId, name: String },
    /// Suspends a payee.
    Suspend { account: AccountId },
    /// Pays a salary in native value.
    PaySalaryNative { account: AccountId, amount: Amount },
    /// Pays a salary in tokens.
    PaySalaryViaLedger { account: AccountId, amount: Amount },
    /// Clears a payee's paid flag.
    ResetPayCycle { account: AccountId },
}

impl Call {
    /// Wire name of the call.
    pub fn name(&self) -> &'static str {
        match self {
            Call::Mint { .. } => "mint",
            Call::Transfer { .. } => "transfer",
            Call::TransferFrom { .. } => "transfer_from",
            Call::Approve { .. } => "approve",
            Call::RegisterPayer { .. } => "register_payer",
            Call::RegisterPayerViaLedger { .. } => "register_payer_via_ledger",
            Call::RegisterPayee { .. } => "register_payee",
            Call::Suspend { .. } => "suspend",
            Call::PaySalaryNative { .. } => "pay_salary_native",
            Call::PaySalaryViaLedger { .. } => "pay_salary_via_ledger",
            Call::ResetPayCycle { .. } => "reset_pay_cycle",
        }
    }

    /// Whether native value may be attached.
    pub fn is_payable(&self) -> bool {
        matches!(self, Call::RegisterPayer { .. } | Call::PaySalaryNative { .. })
    }
}

/// Outcome of a committed call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    /// Unique receipt id.
    pub id: Uuid,
    /// Who submitted the call.
    pub caller: AccountId,
    /// Native value attached.
    pub value: Amount,
    /// The call itself.
    pub call: Call,
    /// Execution time.
    pub timestamp: DateTime<Utc>,
    /// Everything the call logged, nested calls included.
    pub events: Vec<EventRecord>,
}

// ---------------------------------------------------------------------------
// World state
// ---------------------------------------------------------------------------

/// All mutable state a call can touch. Cloned wholesale for savepoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldState {
    /// Host native-value balances.
    pub native: NativeBank,
    /// The token ledger.
    pub ledger: Ledger,
    /// The institution.
    pub institution: Institution,
}

/// A completed outbound native transfer, as seen by the recipient's hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeTransfer {
    /// Sender.
    pub from: AccountId,
    /// Recipient.
    pub to: AccountId,
    /// Amount moved.
    pub amount: Amount,
}

/// Code that runs when an account receives native value.
///
/// Returning an error fails the transfer, which reverts the call that made
/// it.
pub trait ValueReceiver: Send + Sync {
    /// Called after `transfer.amount` has been credited to `transfer.to`.
    fn on_value_received(
        &self,
        tx: &mut Transaction<'_>,
        transfer: &NativeTransfer,
    ) -> Result<(), ExecutionError>;
}

// ---------------------------------------------------------------------------
// Transaction
// ---------------------------------------------------------------------------

/// A live execution handle over the world state.
pub struct Transaction<'a> {
    state: &'a mut WorldState,
    events: &'a mut EventLog,
    receivers: &'a HashMap<AccountId, Arc<dyn ValueReceiver>>,
    caller: AccountId,
    timestamp: DateTime<Utc>,
    depth: usize,
}

impl<'a> Transaction<'a> {
    /// Identity that [`call`](Self::call) runs as: the submitter at the top
    /// level, the receiving account inside a hook.
    pub fn caller(&self) -> AccountId {
        self.caller
    }

    /// Current world state, including uncommitted writes of enclosing calls.
    pub fn state(&self) -> &WorldState {
        &*self.state
    }

    /// Execution time shared by every call in this transaction.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Number of calls currently on the stack.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Executes `call` as [`caller`](Self::caller) in a nested savepoint.
    ///
    /// On error the state and the log are restored to how they were before
    /// this call, and the error is returned to the caller, which may recover
    /// or propagate it.
    pub fn call(&mut self, value: Amount, call: Call) -> Result<(), ExecutionError> {
        self.call_as(self.caller, value, call)
    }

    fn call_as(
        &mut self,
        caller: AccountId,
        value: Amount,
        call: Call,
    ) -> Result<(), ExecutionError> {
        if self.depth >= MAX_CALL_DEPTH {
            return Err(ExecutionError::CallDepthExceeded(MAX_CALL_DEPTH));
        }

        let snapshot = self.state.clone();
        let mark = self.events.len();

        self.depth += 1;
        let result = self.apply(caller, value, call);
        self.depth -= 1;

        if let Err(e) = &result {
            *self.state = snapshot;
            self.events.truncate(mark);
            debug!(depth = self.depth, code = e.code(), "savepoint restored");
        }
        result
    }

    fn apply(&mut self, caller: AccountId, value: Amount, call: Call) -> Result<(), ExecutionError> {
        let institution_account = self.state.institution.account();
        if value > 0 {
            if !call.is_payable() {
                return Err(ExecutionError::NonPayable { call: call.name() });
            }
            self.state.native.transfer(caller, institution_account, value)?;
        }

        let ts = self.timestamp;
        let ctx = CallContext::new(caller, value, ts);

        match call {
            Call::Mint { account, amount } => {
                let event = self.state.ledger.mint(account, amount)?;
                self.events.emit(ts, event);
            }
            Call::Transfer { to, amount } => {
                let event = self.state.ledger.transfer(caller, to, amount)?;
                self.events.emit(ts, event);
            }
            Call::TransferFrom { from, to, amount } => {
                let event = self.state.ledger.transfer_from(caller, from, to, amount)?;
                self.events.emit(ts, event);
            }
            Call::Approve { spender, amount } => {
                let event = self.state.ledger.approve(caller, spender, amount)?;
                self.events.emit(ts, event);
            }
            Call::RegisterPayer { name, tier } => {
                self.state
                    .institution
                    .register_payer(&ctx, name, tier, self.events)?;
            }
            Call::RegisterPayerViaLedger { amount, name, tier } => {
                self.state.institution.register_payer_via_ledger(
                    &ctx,
                    &mut self.state.ledger,
                    amount,
                    name,
                    tier,
                    self.events,
                )?;
            }
            Call::RegisterPayee { account, name } => {
                self.state
                    .institution
                    .register_payee(&ctx, account, name, self.events)?;
            }
            Call::Suspend { account } => {
                self.state.institution.suspend(&ctx, account, self.events)?;
            }
            Call::PaySalaryNative { account, amount } => {
                let pending = self
                    .state
                    .institution
                    .pay_salary_native(&ctx, account, amount)?;
                self.send_value(institution_account, account, amount)
                    .map_err(|e| InstitutionError::PaymentFailed {
                        account,
                        reason: e.to_string(),
                    })?;
                pending.settle(self.events);
            }
            Call::PaySalaryViaLedger { account, amount } => {
                self.state.institution.pay_salary_via_ledger(
                    &ctx,
                    &mut self.state.ledger,
                    account,
                    amount,
                    self.events,
                )?;
            }
            Call::ResetPayCycle { account } => {
                self.state.institution.reset_pay_cycle(&ctx, account)?;
            }
        }
        Ok(())
    }

    /// Moves native value and runs the recipient's hook.
    fn send_value(
        &mut self,
        from: AccountId,
        to: AccountId,
        amount: Amount,
    ) -> Result<(), ExecutionError> {
        self.state.native.transfer(from, to, amount)?;
        debug!(%from, %to, amount, "native value sent");

        if let Some(receiver) = self.receivers.get(&to).cloned() {
            let transfer = NativeTransfer { from, to, amount };
            let outer = std::mem::replace(&mut self.caller, to);
            let result = receiver.on_value_received(self, &transfer);
            self.caller = outer;
            result?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Chain
// ---------------------------------------------------------------------------

/// The host: world state, the event log, and registered receivers.
pub struct Chain {
    state: WorldState,
    events: EventLog,
    receivers: HashMap<AccountId, Arc<dyn ValueReceiver>>,
}

impl fmt::Debug for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chain")
            .field("state", &self.state)
            .field("events", &self.events.len())
            .field("receivers", &self.receivers.len())
            .finish()
    }
}

impl Chain {
    /// Builds a chain from a genesis configuration.
    pub fn from_genesis(config: &GenesisConfig) -> Result<Self, GenesisError> {
        config.validate()?;

        let institution = Institution::new(
            config.admin,
            config.institution,
            config.fee_schedule.clone(),
        )?;
        let ledger = Ledger::new(config.institution);
        let mut native = NativeBank::new();
        for (account, amount) in &config.native_allocations {
            native.credit(*account, *amount)?;
        }

        info!(
            admin = %config.admin,
            institution = %config.institution,
            tiers = config.fee_schedule.len(),
            funded = config.native_allocations.len(),
            "chain initialized from genesis"
        );

        Ok(Self {
            state: WorldState {
                native,
                ledger,
                institution,
            },
            events: EventLog::new(),
            receivers: HashMap::new(),
        })
    }

    /// Installs a hook that runs whenever `account` receives native value.
    /// Replaces any earlier hook for the same account.
    pub fn register_receiver(&mut self, account: AccountId, receiver: Arc<dyn ValueReceiver>) {
        self.receivers.insert(account, receiver);
    }

    /// Executes a call at the current wall-clock time.
    pub fn submit(
        &mut self,
        caller: AccountId,
        value: Amount,
        call: Call,
    ) -> Result<Receipt, ExecutionError> {
        self.submit_at(caller, value, call, Utc::now())
    }

    /// Executes a call at `timestamp`. Either everything it does is kept, or
    /// nothing is.
    pub fn submit_at(
        &mut self,
        caller: AccountId,
        value: Amount,
        call: Call,
        timestamp: DateTime<Utc>,
    ) -> Result<Receipt, ExecutionError> {
        let mark = self.events.len();
        let mut tx = Transaction {
            state: &mut self.state,
            events: &mut self.events,
            receivers: &self.receivers,
            caller,
            timestamp,
            depth: 0,
        };

        match tx.call_as(caller, value, call.clone()) {
            Ok(()) => {
                let receipt = Receipt {
                    id: Uuid::new_v4(),
                    caller,
                    value,
                    call,
                    timestamp,
                    events: self.events.since(mark).to_vec(),
                };
                info!(
                    receipt = %receipt.id,
                    call = receipt.call.name(),
                    %caller,
                    events = receipt.events.len(),
                    "call committed"
                );
                Ok(receipt)
            }
            Err(e) => {
                warn!(call = call.name(), %caller, code = e.code(), error = %e, "call reverted");
                Err(e)
            }
        }
    }

    /// Current world state.
    pub fn state(&self) -> &WorldState {
        &self.state
    }

    /// The token ledger.
    pub fn ledger(&self) -> &Ledger {
        &self.state.ledger
    }

    /// The institution.
    pub fn institution(&self) -> &Institution {
        &self.state.institution
    }

    /// Native balance of `account`.
    pub fn native_balance_of(&self, account: AccountId) -> Amount {
        self.state.native.balance_of(account)
    }

    /// The full event log.
    pub fn events(&self) -> &EventLog {
        &self.events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{Currency, Event, InstitutionEvent};
    use bursar_protocol::config::tenths;
    use bursar_protocol::LedgerEvent;

    fn id(label: &str) -> AccountId {
        AccountId::from_label(label)
    }

    fn chain() -> Chain {
        let mut config = GenesisConfig::reference(id("admin"), id("school"));
        config.native_allocations.insert(id("alice"), tenths(10));
        Chain::from_genesis(&config).unwrap()
    }

    #[test]
    fn payable_calls_are_marked() {
        let payable: Vec<&str> = [
            Call::RegisterPayer { name: "a".into(), tier: 100 },
            Call::PaySalaryNative { account: id("x"), amount: 1 },
            Call::Transfer { to: id("x"), amount: 1 },
            Call::ResetPayCycle { account: id("x") },
        ]
        .iter()
        .filter(|c| c.is_payable())
        .map(Call::name)
        .collect();
        assert_eq!(payable, vec!["register_payer", "pay_salary_native"]);
    }

    #[test]
    fn call_json_is_externally_tagged() {
        let call = Call::PaySalaryViaLedger {
            account: id("t"),
            amount: tenths(1),
        };
        let json = serde_json::to_value(&call).unwrap();
        assert_eq!(json["pay_salary_via_ledger"]["amount"], 100_000_000_000_000_000u64);
        let back: Call = serde_json::from_value(json).unwrap();
        assert_eq!(back, call);
    }

    #[test]
    fn native_registration_moves_value_to_institution() {
        let mut chain = chain();
        let receipt = chain
            .submit(
                id("alice"),
                tenths(3),
                Call::RegisterPayer { name: "Alice".into(), tier: 300 },
            )
            .unwrap();

        assert_eq!(chain.native_balance_of(id("alice")), tenths(7));
        assert_eq!(chain.native_balance_of(id("school")), tenths(3));
        assert_eq!(chain.institution().native_treasury(), tenths(3));
        assert_eq!(receipt.events.len(), 2);
        assert_eq!(receipt.value, tenths(3));
    }

    #[test]
    fn failed_call_returns_attached_value() {
        let mut chain = chain();
        let err = chain
            .submit(
                id("alice"),
                tenths(2),
                Call::RegisterPayer { name: "Alice".into(), tier: 300 },
            )
            .unwrap_err();
        assert_eq!(err.code(), "ExactPaymentRequired");
        assert_eq!(chain.native_balance_of(id("alice")), tenths(10));
        assert_eq!(chain.native_balance_of(id("school")), 0);
        assert!(chain.events().is_empty());
    }

    #[test]
    fn value_on_non_payable_call_rejected() {
        let mut chain = chain();
        let err = chain
            .submit(id("alice"), 1, Call::Mint { account: id("alice"), amount: 5 })
            .unwrap_err();
        assert_eq!(err, ExecutionError::NonPayable { call: "mint" });
        assert_eq!(chain.ledger().total_supply(), 0);
    }

    #[test]
    fn attaching_more_than_balance_fails() {
        let mut chain = chain();
        let err = chain
            .submit(
                id("bob"),
                tenths(1),
                Call::RegisterPayer { name: "Bob".into(), tier: 100 },
            )
            .unwrap_err();
        assert_eq!(err.code(), "InsufficientFunds");
        assert!(matches!(err, ExecutionError::Native(_)));
    }

    #[test]
    fn ledger_calls_log_and_return_receipts() {
        let mut chain = chain();
        let receipt = chain
            .submit(id("alice"), 0, Call::Mint { account: id("alice"), amount: 1000 })
            .unwrap();
        assert_eq!(
            receipt.events[0].event,
            Event::Ledger(LedgerEvent::Transfer {
                from: AccountId::ZERO,
                to: id("alice"),
                amount: 1000
            })
        );

        chain
            .submit(id("alice"), 0, Call::Approve { spender: id("bob"), amount: 400 })
            .unwrap();
        chain
            .submit(
                id("bob"),
                0,
                Call::TransferFrom { from: id("alice"), to: id("carol"), amount: 400 },
            )
            .unwrap();

        let ledger = chain.ledger();
        assert_eq!(ledger.balance_of(id("alice")), 600);
        assert_eq!(ledger.balance_of(id("carol")), 400);
        assert_eq!(ledger.allowance(id("alice"), id("bob")), 0);
        assert_eq!(chain.events().len(), 3);
    }

    #[test]
    fn native_payroll_settles_after_transfer() {
        let mut chain = chain();
        chain
            .submit(
                id("alice"),
                tenths(4),
                Call::RegisterPayer { name: "Alice".into(), tier: 400 },
            )
            .unwrap();
        chain
            .submit(
                id("admin"),
                0,
                Call::RegisterPayee { account: id("tutor"), name: "T".into() },
            )
            .unwrap();

        let receipt = chain
            .submit(
                id("admin"),
                tenths(1),
                Call::PaySalaryNative { account: id("tutor"), amount: tenths(1) },
            )
            .unwrap();

        assert_eq!(chain.native_balance_of(id("tutor")), tenths(1));
        assert_eq!(chain.institution().native_treasury(), tenths(3));
        assert!(matches!(
            receipt.events.last().map(|r| &r.event),
            Some(Event::Institution(InstitutionEvent::SalaryPaid {
                currency: Currency::Native,
                ..
            }))
        ));
    }

    struct Refuse;

    impl ValueReceiver for Refuse {
        fn on_value_received(
            &self,
            _tx: &mut Transaction<'_>,
            _transfer: &NativeTransfer,
        ) -> Result<(), ExecutionError> {
            Err(ExecutionError::NonPayable { call: "receive" })
        }
    }

    #[test]
    fn refusing_receiver_reverts_payroll() {
        let mut chain = chain();
        chain.register_receiver(id("tutor"), Arc::new(Refuse));
        chain
            .submit(
                id("alice"),
                tenths(4),
                Call::RegisterPayer { name: "Alice".into(), tier: 400 },
            )
            .unwrap();
        chain
            .submit(
                id("admin"),
                0,
                Call::RegisterPayee { account: id("tutor"), name: "T".into() },
            )
            .unwrap();
        let admin_before = chain.native_balance_of(id("admin"));
        let log_before = chain.events().len();

        let err = chain
            .submit(
                id("admin"),
                tenths(1),
                Call::PaySalaryNative { account: id("tutor"), amount: tenths(1) },
            )
            .unwrap_err();

        assert_eq!(err.code(), "PaymentFailed");
        assert!(!chain.institution().payee(id("tutor")).unwrap().salary_paid);
        assert_eq!(chain.institution().native_treasury(), tenths(4));
        assert_eq!(chain.native_balance_of(id("tutor")), 0);
        assert_eq!(chain.native_balance_of(id("admin")), admin_before);
        assert_eq!(chain.events().len(), log_before);
    }

    #[test]
    fn genesis_allocations_past_the_native_limit_are_refused() {
        let mut config = GenesisConfig::reference(id("admin"), id("school"));
        config.native_allocations.clear();
        config.native_allocations.insert(id("school"), Amount::MAX);
        config.native_allocations.insert(id("alice"), tenths(1));

        assert!(matches!(
            Chain::from_genesis(&config),
            Err(GenesisError::AllocationOverflow)
        ));

        config.native_allocations.insert(id("alice"), 0);
        let mut chain = Chain::from_genesis(&config).unwrap();
        let err = chain
            .submit(id("alice"), 1, Call::RegisterPayer { name: "A".into(), tier: 100 })
            .unwrap_err();
        assert_eq!(err.code(), "InsufficientFunds");
        assert_eq!(chain.state().native.total(), Amount::MAX);
    }

    #[test]
    fn state_dumps_are_identical_across_runs() {
        let build = || {
            let mut chain = chain();
            for label in ["zed", "mia", "bob", "kim", "ann"] {
                chain
                    .submit(id(label), 0, Call::Mint { account: id(label), amount: 5 })
                    .unwrap();
                chain
                    .submit(id(label), 0, Call::Approve { spender: id("alice"), amount: 1 })
                    .unwrap();
                chain
                    .submit(
                        id("admin"),
                        0,
                        Call::RegisterPayee { account: id(label), name: label.into() },
                    )
                    .unwrap();
            }
            serde_json::to_string(chain.state()).unwrap()
        };

        let first = build();
        assert_eq!(first, build());

        // Accounts appear in id order, not insertion or hash order.
        let mut ids: Vec<String> = ["zed", "mia", "bob", "kim", "ann"]
            .iter()
            .map(|l| id(l).to_string())
            .collect();
        ids.sort();
        let state: WorldState = serde_json::from_str(&first).unwrap();
        let ledger = serde_json::to_string(&state.ledger).unwrap();
        let positions: Vec<usize> = ids.iter().map(|i| ledger.find(i.as_str()).unwrap()).collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }
}
