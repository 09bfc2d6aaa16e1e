//! # Institution Accounting
//!
//! Fee collection from payers and payroll for payees, kept in two currencies:
//! native value attached to calls, and ledger tokens moved through the
//! [`TokenLedger`] capability.
//!
//! ## Payee lifecycle
//!
//! ```text
//! Unregistered ──register──▶ Active(unpaid) ──pay──▶ Active(paid)
//!                                 ▲                      │
//!                                 └────────reset─────────┘
//! Active ──suspend──▶ Suspended      (one way; no un-suspend)
//! ```
//!
//! Suspended payees can never be paid. `reset_pay_cycle` only checks
//! registration, so it still clears the paid flag on a suspended payee; the
//! next payment attempt is refused anyway.
//!
//! ## Ordering
//!
//! Every operation checks all of its preconditions before it writes. Native
//! payroll commits the paid flag and the treasury decrement *before* the
//! runtime forwards the value, so any code the transfer re-enters already
//! sees the payee as paid. Token payroll restores its own writes if the
//! ledger rejects the transfer.

use bursar_protocol::{AccountId, Amount, LedgerError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{info, warn};

use crate::events::{Currency, EventLog, InstitutionEvent};
use crate::fee_schedule::{FeeSchedule, Tier};
use crate::token::TokenLedger;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during institution operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InstitutionError {
    /// An admin-only operation was called by someone else.
    #[error("unauthorized: {caller} is not the institution admin")]
    Unauthorized {
        /// The rejected caller.
        caller: AccountId,
    },

    /// The zero account was used where a real account is required.
    #[error("invalid account: the zero account cannot be used as {role}")]
    InvalidAccount {
        /// Which argument was rejected.
        role: &'static str,
    },

    /// The tier is not in the fee schedule.
    #[error("invalid tier: {0} is not offered")]
    InvalidTier(Tier),

    /// The payment did not match the tier's fee exactly.
    #[error("exact payment required: tier {tier} costs {required}, got {provided}")]
    ExactPaymentRequired {
        /// The requested tier.
        tier: Tier,
        /// The scheduled fee.
        required: Amount,
        /// The amount offered.
        provided: Amount,
    },

    /// The account already has a record of this kind.
    #[error("{account} is already registered")]
    AlreadyRegistered {
        /// The duplicate account.
        account: AccountId,
    },

    /// The account has no payee record.
    #[error("{account} is not a registered payee")]
    NotRegistered {
        /// The unknown account.
        account: AccountId,
    },

    /// The payee is suspended.
    #[error("{account} is suspended")]
    AlreadySuspended {
        /// The suspended payee.
        account: AccountId,
    },

    /// The payee was already paid this cycle.
    #[error("salary for {account} has already been paid this cycle")]
    SalaryAlreadyPaid {
        /// The paid payee.
        account: AccountId,
    },

    /// Not enough funds for the requested payroll amount.
    #[error("insufficient {currency} treasury: available {available}, requested {requested}")]
    InsufficientTreasury {
        /// Currency of the payroll.
        currency: Currency,
        /// Funds that could cover it.
        available: Amount,
        /// The payroll amount.
        requested: Amount,
    },

    /// A treasury total would overflow.
    #[error("{currency} treasury overflow")]
    TreasuryOverflow {
        /// Currency of the total.
        currency: Currency,
    },

    /// The ledger rejected the token movement.
    #[error("token transfer failed: {0}")]
    TokenTransferFailed(#[source] LedgerError),

    /// The outbound native transfer did not go through.
    #[error("payment to {account} failed: {reason}")]
    PaymentFailed {
        /// The intended recipient.
        account: AccountId,
        /// Why the transfer failed.
        reason: String,
    },
}

impl InstitutionError {
    /// Stable taxonomy name of the error, surfaced to API clients.
    pub fn code(&self) -> &'static str {
        match self {
            InstitutionError::Unauthorized { .. } => "Unauthorized",
            InstitutionError::InvalidAccount { .. } => "InvalidAccount",
            InstitutionError::InvalidTier(_) => "InvalidTier",
            InstitutionError::ExactPaymentRequired { .. } => "ExactPaymentRequired",
            InstitutionError::AlreadyRegistered { .. } => "AlreadyRegistered",
            InstitutionError::NotRegistered { .. } => "NotRegistered",
            InstitutionError::AlreadySuspended { .. } => "AlreadySuspended",
            InstitutionError::SalaryAlreadyPaid { .. } => "SalaryAlreadyPaid",
            InstitutionError::InsufficientTreasury { .. } => "InsufficientTreasury",
            InstitutionError::TreasuryOverflow { .. } => "TreasuryOverflow",
            InstitutionError::TokenTransferFailed(_) => "TokenTransferFailed",
            InstitutionError::PaymentFailed { .. } => "PaymentFailed",
        }
    }
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Who is calling, with how much native value attached, and when.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallContext {
    /// The calling account.
    pub caller: AccountId,
    /// Native value attached to the call.
    pub value: Amount,
    /// Execution time of the call.
    pub timestamp: DateTime<Utc>,
}

impl CallContext {
    /// Builds a context.
    pub fn new(caller: AccountId, value: Amount, timestamp: DateTime<Utc>) -> Self {
        Self {
            caller,
            value,
            timestamp,
        }
    }
}

/// A fee-paying member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payer {
    /// The payer's account.
    pub account: AccountId,
    /// Display name.
    pub name: String,
    /// Tier the fee was paid for.
    pub tier: Tier,
    /// Always `true` once the record exists.
    pub paid: bool,
    /// When the fee was paid.
    pub paid_at: DateTime<Utc>,
    /// Currency the fee was paid in.
    pub currency: Currency,
}

/// Whether a payee can still be paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayeeStatus {
    /// Eligible for payroll.
    Active,
    /// Permanently barred from payroll.
    Suspended,
}

impl std::fmt::Display for PayeeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PayeeStatus::Active => write!(f, "Active"),
            PayeeStatus::Suspended => write!(f, "Suspended"),
        }
    }
}

/// A salaried member. Presence of the record means registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payee {
    /// The payee's account.
    pub account: AccountId,
    /// Display name.
    pub name: String,
    /// Active or suspended.
    pub status: PayeeStatus,
    /// Whether the current cycle's salary has gone out.
    pub salary_paid: bool,
    /// When the most recent salary was paid.
    pub last_paid_at: Option<DateTime<Utc>>,
}

impl Payee {
    /// Returns `true` once the payee has been suspended.
    pub fn is_suspended(&self) -> bool {
        self.status == PayeeStatus::Suspended
    }
}

/// A native salary already committed to institution state, waiting for the
/// runtime to forward the value.
///
/// Call [`settle`](Self::settle) only after the transfer succeeded; dropping
/// it instead leaves the commit to the enclosing rollback.
#[must_use = "the salary notification is only emitted by `settle`"]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSalary {
    /// Recipient of the transfer.
    pub payee: AccountId,
    /// Exact amount to forward.
    pub amount: Amount,
    /// Time recorded on the payee.
    pub paid_at: DateTime<Utc>,
}

impl PendingSalary {
    /// Logs the salary notification once the value has been delivered.
    pub fn settle(self, log: &mut EventLog) {
        info!(payee = %self.payee, amount = self.amount, "native salary paid");
        log.emit(
            self.paid_at,
            InstitutionEvent::SalaryPaid {
                account: self.payee,
                amount: self.amount,
                currency: Currency::Native,
                timestamp: self.paid_at,
            },
        );
    }
}

// ---------------------------------------------------------------------------
// Institution
// ---------------------------------------------------------------------------

/// Payer and payee registry, fee schedule, and the two treasury totals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Institution {
    /// Identity allowed to run admin-only operations.
    admin: AccountId,
    /// The institution's own account on the ledger and the native bank.
    account: AccountId,
    /// Tier to fee mapping.
    fee_schedule: FeeSchedule,
    /// Payer records keyed by account.
    payers: BTreeMap<AccountId, Payer>,
    /// Payer accounts in registration order.
    payer_order: Vec<AccountId>,
    /// Payee records keyed by account.
    payees: BTreeMap<AccountId, Payee>,
    /// Payee accounts in registration order.
    payee_order: Vec<AccountId>,
    /// Running native-value total.
    native_treasury: Amount,
    /// Running token total.
    token_treasury: Amount,
}

impl Institution {
    /// Creates an institution with empty registries and zero treasuries.
    ///
    /// # Errors
    ///
    /// Returns [`InstitutionError::InvalidAccount`] if either the admin or
    /// the institution account is the zero account.
    pub fn new(
        admin: AccountId,
        account: AccountId,
        fee_schedule: FeeSchedule,
    ) -> Result<Self, InstitutionError> {
        if admin.is_zero() {
            return Err(InstitutionError::InvalidAccount { role: "admin" });
        }
        if account.is_zero() {
            return Err(InstitutionError::InvalidAccount {
                role: "institution account",
            });
        }
        Ok(Self {
            admin,
            account,
            fee_schedule,
            payers: BTreeMap::new(),
            payer_order: Vec::new(),
            payees: BTreeMap::new(),
            payee_order: Vec::new(),
            native_treasury: 0,
            token_treasury: 0,
        })
    }

    // -- payers -------------------------------------------------------------

    /// Registers the caller as a payer against the native value attached to
    /// the call.
    ///
    /// # Errors
    ///
    /// [`InstitutionError::InvalidTier`], [`InstitutionError::ExactPaymentRequired`]
    /// (over- and under-payment alike), [`InstitutionError::AlreadyRegistered`].
    pub fn register_payer(
        &mut self,
        ctx: &CallContext,
        name: String,
        tier: Tier,
        log: &mut EventLog,
    ) -> Result<(), InstitutionError> {
        let fee = self.fee_for(tier)?;
        if ctx.value != fee {
            return Err(InstitutionError::ExactPaymentRequired {
                tier,
                required: fee,
                provided: ctx.value,
            });
        }
        self.ensure_new_payer(ctx.caller)?;
        let new_total = self
            .native_treasury
            .checked_add(ctx.value)
            .ok_or(InstitutionError::TreasuryOverflow {
                currency: Currency::Native,
            })?;

        self.native_treasury = new_total;
        self.record_payer(ctx, name, tier, ctx.value, Currency::Native, log);
        Ok(())
    }

    /// Registers the caller as a payer, pulling the fee from the caller's
    /// ledger balance. The caller must have approved the institution account
    /// as spender for at least `amount`.
    ///
    /// # Errors
    ///
    /// Same as [`register_payer`](Self::register_payer), with `amount` in
    /// place of the attached value, plus [`InstitutionError::TokenTransferFailed`]
    /// if the ledger refuses the delegated transfer. Nothing is recorded on
    /// failure.
    pub fn register_payer_via_ledger<L: TokenLedger + ?Sized>(
        &mut self,
        ctx: &CallContext,
        ledger: &mut L,
        amount: Amount,
        name: String,
        tier: Tier,
        log: &mut EventLog,
    ) -> Result<(), InstitutionError> {
        let fee = self.fee_for(tier)?;
        if amount != fee {
            return Err(InstitutionError::ExactPaymentRequired {
                tier,
                required: fee,
                provided: amount,
            });
        }
        self.ensure_new_payer(ctx.caller)?;
        let new_total = self
            .token_treasury
            .checked_add(amount)
            .ok_or(InstitutionError::TreasuryOverflow {
                currency: Currency::Token,
            })?;

        let transfer = ledger
            .transfer_from(self.account, ctx.caller, self.account, amount)
            .map_err(|e| {
                warn!(payer = %ctx.caller, error = %e, "fee transfer refused by ledger");
                InstitutionError::TokenTransferFailed(e)
            })?;
        log.emit(ctx.timestamp, transfer);

        self.token_treasury = new_total;
        self.record_payer(ctx, name, tier, amount, Currency::Token, log);
        Ok(())
    }

    // -- payees -------------------------------------------------------------

    /// Registers `account` as an active, unpaid payee. Admin only.
    ///
    /// # Errors
    ///
    /// [`InstitutionError::Unauthorized`], [`InstitutionError::InvalidAccount`]
    /// for the zero account, [`InstitutionError::AlreadyRegistered`] if any
    /// payee record exists for `account`.
    pub fn register_payee(
        &mut self,
        ctx: &CallContext,
        account: AccountId,
        name: String,
        log: &mut EventLog,
    ) -> Result<(), InstitutionError> {
        self.ensure_admin(ctx)?;
        if account.is_zero() {
            return Err(InstitutionError::InvalidAccount { role: "payee" });
        }
        if self.payees.contains_key(&account) {
            return Err(InstitutionError::AlreadyRegistered { account });
        }

        self.payees.insert(
            account,
            Payee {
                account,
                name: name.clone(),
                status: PayeeStatus::Active,
                salary_paid: false,
                last_paid_at: None,
            },
        );
        self.payee_order.push(account);

        info!(payee = %account, "payee registered");
        log.emit(
            ctx.timestamp,
            InstitutionEvent::PayeeRegistered { account, name },
        );
        Ok(())
    }

    /// Suspends a payee for good. Admin only.
    ///
    /// # Errors
    ///
    /// [`InstitutionError::Unauthorized`], [`InstitutionError::NotRegistered`],
    /// [`InstitutionError::AlreadySuspended`].
    pub fn suspend(
        &mut self,
        ctx: &CallContext,
        account: AccountId,
        log: &mut EventLog,
    ) -> Result<(), InstitutionError> {
        self.ensure_admin(ctx)?;
        let payee = self
            .payees
            .get_mut(&account)
            .ok_or(InstitutionError::NotRegistered { account })?;
        if payee.is_suspended() {
            return Err(InstitutionError::AlreadySuspended { account });
        }

        payee.status = PayeeStatus::Suspended;

        info!(payee = %account, "payee suspended");
        log.emit(ctx.timestamp, InstitutionEvent::PayeeSuspended { account });
        Ok(())
    }

    /// Commits a native salary and returns the transfer the runtime must
    /// perform. Admin only.
    ///
    /// The paid flag, the payment time, and the treasury decrement are all
    /// written before this returns.
    ///
    /// # Errors
    ///
    /// [`InstitutionError::Unauthorized`], [`InstitutionError::NotRegistered`],
    /// [`InstitutionError::SalaryAlreadyPaid`], [`InstitutionError::AlreadySuspended`],
    /// and [`InstitutionError::InsufficientTreasury`] when either the attached
    /// value or the native treasury is below `amount`.
    pub fn pay_salary_native(
        &mut self,
        ctx: &CallContext,
        account: AccountId,
        amount: Amount,
    ) -> Result<PendingSalary, InstitutionError> {
        self.ensure_admin(ctx)?;
        self.ensure_payable(account)?;
        if ctx.value < amount {
            return Err(InstitutionError::InsufficientTreasury {
                currency: Currency::Native,
                available: ctx.value,
                requested: amount,
            });
        }
        if self.native_treasury < amount {
            return Err(InstitutionError::InsufficientTreasury {
                currency: Currency::Native,
                available: self.native_treasury,
                requested: amount,
            });
        }

        self.mark_paid(account, ctx.timestamp);
        self.native_treasury -= amount;

        Ok(PendingSalary {
            payee: account,
            amount,
            paid_at: ctx.timestamp,
        })
    }

    /// Pays a salary in tokens from the institution's ledger balance. Admin
    /// only.
    ///
    /// `amount` must be strictly below the token treasury total, so the
    /// tracked total can never be paid out in full by a single salary.
    ///
    /// # Errors
    ///
    /// The same registration checks as [`pay_salary_native`](Self::pay_salary_native),
    /// [`InstitutionError::InsufficientTreasury`] when `amount >= token_treasury`,
    /// and [`InstitutionError::TokenTransferFailed`] with all writes undone if
    /// the ledger rejects the transfer.
    pub fn pay_salary_via_ledger<L: TokenLedger + ?Sized>(
        &mut self,
        ctx: &CallContext,
        ledger: &mut L,
        account: AccountId,
        amount: Amount,
        log: &mut EventLog,
    ) -> Result<(), InstitutionError> {
        self.ensure_admin(ctx)?;
        let previous = self.ensure_payable(account)?.clone();
        if amount >= self.token_treasury {
            return Err(InstitutionError::InsufficientTreasury {
                currency: Currency::Token,
                available: self.token_treasury,
                requested: amount,
            });
        }

        self.mark_paid(account, ctx.timestamp);
        self.token_treasury -= amount;

        let transfer = match ledger.transfer(self.account, account, amount) {
            Ok(event) => event,
            Err(e) => {
                warn!(payee = %account, error = %e, "salary transfer refused by ledger");
                self.payees.insert(account, previous);
                self.token_treasury += amount;
                return Err(InstitutionError::TokenTransferFailed(e));
            }
        };

        info!(payee = %account, amount, "token salary paid");
        log.emit(ctx.timestamp, transfer);
        log.emit(
            ctx.timestamp,
            InstitutionEvent::SalaryPaid {
                account,
                amount,
                currency: Currency::Token,
                timestamp: ctx.timestamp,
            },
        );
        Ok(())
    }

    /// Opens a new pay cycle for a payee by clearing the paid flag. Admin
    /// only. Suspension is not checked.
    ///
    /// # Errors
    ///
    /// [`InstitutionError::Unauthorized`], [`InstitutionError::NotRegistered`].
    pub fn reset_pay_cycle(
        &mut self,
        ctx: &CallContext,
        account: AccountId,
    ) -> Result<(), InstitutionError> {
        self.ensure_admin(ctx)?;
        let payee = self
            .payees
            .get_mut(&account)
            .ok_or(InstitutionError::NotRegistered { account })?;
        payee.salary_paid = false;

        info!(payee = %account, status = %payee.status, "pay cycle reset");
        Ok(())
    }

    // -- reads --------------------------------------------------------------

    /// The admin identity.
    pub fn admin(&self) -> AccountId {
        self.admin
    }

    /// The institution's own account.
    pub fn account(&self) -> AccountId {
        self.account
    }

    /// Running native-value total.
    pub fn native_treasury(&self) -> Amount {
        self.native_treasury
    }

    /// Running token total.
    pub fn token_treasury(&self) -> Amount {
        self.token_treasury
    }

    /// The fee schedule.
    pub fn fee_schedule(&self) -> &FeeSchedule {
        &self.fee_schedule
    }

    /// Payer record for `account`.
    pub fn payer(&self, account: AccountId) -> Option<&Payer> {
        self.payers.get(&account)
    }

    /// Payee record for `account`.
    pub fn payee(&self, account: AccountId) -> Option<&Payee> {
        self.payees.get(&account)
    }

    /// Payer accounts in registration order.
    pub fn list_payers(&self) -> &[AccountId] {
        &self.payer_order
    }

    /// Payee accounts in registration order.
    pub fn list_payees(&self) -> &[AccountId] {
        &self.payee_order
    }

    /// Payer records in registration order.
    pub fn payers(&self) -> impl Iterator<Item = &Payer> {
        self.payer_order.iter().filter_map(|a| self.payers.get(a))
    }

    /// Payee records in registration order.
    pub fn payees(&self) -> impl Iterator<Item = &Payee> {
        self.payee_order.iter().filter_map(|a| self.payees.get(a))
    }

    // -- helpers ------------------------------------------------------------

    fn ensure_admin(&self, ctx: &CallContext) -> Result<(), InstitutionError> {
        if ctx.caller != self.admin {
            return Err(InstitutionError::Unauthorized { caller: ctx.caller });
        }
        Ok(())
    }

    fn fee_for(&self, tier: Tier) -> Result<Amount, InstitutionError> {
        self.fee_schedule
            .fee(tier)
            .ok_or(InstitutionError::InvalidTier(tier))
    }

    fn ensure_new_payer(&self, account: AccountId) -> Result<(), InstitutionError> {
        match self.payers.get(&account) {
            Some(payer) if payer.paid => Err(InstitutionError::AlreadyRegistered { account }),
            _ => Ok(()),
        }
    }

    fn ensure_payable(&self, account: AccountId) -> Result<&Payee, InstitutionError> {
        let payee = self
            .payees
            .get(&account)
            .ok_or(InstitutionError::NotRegistered { account })?;
        if payee.salary_paid {
            return Err(InstitutionError::SalaryAlreadyPaid { account });
        }
        if payee.is_suspended() {
            return Err(InstitutionError::AlreadySuspended { account });
        }
        Ok(payee)
    }

    fn mark_paid(&mut self, account: AccountId, at: DateTime<Utc>) {
        if let Some(payee) = self.payees.get_mut(&account) {
            payee.salary_paid = true;
            payee.last_paid_at = Some(at);
        }
    }

    fn record_payer(
        &mut self,
        ctx: &CallContext,
        name: String,
        tier: Tier,
        amount: Amount,
        currency: Currency,
        log: &mut EventLog,
    ) {
        let account = ctx.caller;
        self.payers.insert(
            account,
            Payer {
                account,
                name: name.clone(),
                tier,
                paid: true,
                paid_at: ctx.timestamp,
                currency,
            },
        );
        self.payer_order.push(account);

        info!(payer = %account, tier, amount, %currency, "payer registered");
        log.emit(
            ctx.timestamp,
            InstitutionEvent::PayerRegistered {
                account,
                name,
                tier,
            },
        );
        log.emit(
            ctx.timestamp,
            InstitutionEvent::PaymentReceived {
                account,
                amount,
                currency,
                timestamp: ctx.timestamp,
            },
        );
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
