//! # Fungible Token Ledger
//!
//! Balances, delegated-spending allowances, and total supply for a single
//! fungible asset class.
//!
//! ## Invariants
//!
//! - The sum of all balances equals [`Ledger::total_supply`] after every
//!   operation. Only [`Ledger::mint`] increases supply; nothing decreases it.
//! - An allowance is written only by its owner (via `approve`) and only
//!   reduced by the exact amount a delegated transfer moves.
//! - Every operation validates before it writes. A rejected call leaves
//!   every table untouched.
//!
//! Mint is deliberately permissionless, and `approve` refuses to grant more
//! than the owner currently holds. Both are part of the ledger's contract and
//! are not hardening gaps.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;

use crate::config::{TOKEN_DECIMALS, TOKEN_NAME, TOKEN_SYMBOL};
use crate::types::{AccountId, Amount};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during ledger operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerError {
    /// The target account is the zero/burn account.
    #[error("invalid account: the zero account cannot be used as {role}")]
    InvalidAccount {
        /// Which argument was rejected ("recipient", "spender", ...).
        role: &'static str,
    },

    /// A transfer or approval of zero units.
    #[error("amount must be greater than zero")]
    ZeroAmount,

    /// The debited account holds less than requested.
    #[error("insufficient funds: account {account} holds {balance}, needs {requested}")]
    InsufficientFunds {
        /// The account being debited.
        account: AccountId,
        /// Its current balance.
        balance: Amount,
        /// The amount requested.
        requested: Amount,
    },

    /// The spender's remaining allowance is below the transfer amount.
    #[error("insufficient allowance: {spender} may move {allowance} from {owner}, requested {requested}")]
    InsufficientAllowance {
        /// Owner of the balance.
        owner: AccountId,
        /// Account acting on the owner's behalf.
        spender: AccountId,
        /// Remaining allowance.
        allowance: Amount,
        /// The amount requested.
        requested: Amount,
    },

    /// Minting would overflow the supply or a balance.
    #[error("supply overflow: minting {amount} would exceed u128::MAX")]
    SupplyOverflow {
        /// The amount that was attempted.
        amount: Amount,
    },
}

impl LedgerError {
    /// Stable taxonomy name of the error, surfaced to API clients.
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::InvalidAccount { .. } => "InvalidAccount",
            LedgerError::ZeroAmount => "ZeroAmount",
            LedgerError::InsufficientFunds { .. } => "InsufficientFunds",
            LedgerError::InsufficientAllowance { .. } => "InsufficientAllowance",
            LedgerError::SupplyOverflow { .. } => "SupplyOverflow",
        }
    }
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

/// Notification produced by a successful ledger write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerEvent {
    /// Units moved between accounts. Mints report `from` as the zero account.
    Transfer {
        from: AccountId,
        to: AccountId,
        amount: Amount,
    },
    /// An owner set a spender's allowance.
    Approval {
        owner: AccountId,
        spender: AccountId,
        amount: Amount,
    },
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// The token ledger.
///
/// Allowances are stored as `owner -> spender -> amount` so the whole ledger
/// serializes to plain JSON objects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ledger {
    /// Account of the institution this ledger was deployed for.
    institution: AccountId,
    /// Per-account balances. Missing entries read as zero.
    balances: BTreeMap<AccountId, Amount>,
    /// Remaining delegated-spending rights.
    allowances: BTreeMap<AccountId, BTreeMap<AccountId, Amount>>,
    /// Sum of all balances.
    total_supply: Amount,
}

impl Ledger {
    /// Creates an empty ledger bound to the given institution account.
    pub fn new(institution: AccountId) -> Self {
        Self {
            institution,
            balances: BTreeMap::new(),
            allowances: BTreeMap::new(),
            total_supply: 0,
        }
    }

    /// The institution account configured at construction.
    pub fn institution(&self) -> AccountId {
        self.institution
    }

    /// Human-readable token name.
    pub fn name(&self) -> &'static str {
        TOKEN_NAME
    }

    /// Ticker symbol.
    pub fn symbol(&self) -> &'static str {
        TOKEN_SYMBOL
    }

    /// Display precision.
    pub fn decimals(&self) -> u8 {
        TOKEN_DECIMALS
    }

    /// Creates `amount` new units in `account`.
    ///
    /// Any caller may mint. Reports the mint as a transfer from the zero
    /// account.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidAccount`] for the zero account and
    /// [`LedgerError::SupplyOverflow`] if supply would exceed `u128::MAX`.
    pub fn mint(&mut self, account: AccountId, amount: Amount) -> Result<LedgerEvent, LedgerError> {
        if account.is_zero() {
            return Err(LedgerError::InvalidAccount { role: "mint target" });
        }

        // Balances never exceed supply, so one check covers both.
        let new_supply = self
            .total_supply
            .checked_add(amount)
            .ok_or(LedgerError::SupplyOverflow { amount })?;

        self.total_supply = new_supply;
        *self.balances.entry(account).or_insert(0) += amount;

        debug!(%account, amount, supply = new_supply, "minted");
        Ok(LedgerEvent::Transfer {
            from: AccountId::ZERO,
            to: account,
            amount,
        })
    }

    /// Moves `amount` from `caller` to `to`.
    ///
    /// # Errors
    ///
    /// [`LedgerError::InvalidAccount`] for a zero recipient,
    /// [`LedgerError::ZeroAmount`], and [`LedgerError::InsufficientFunds`].
    pub fn transfer(
        &mut self,
        caller: AccountId,
        to: AccountId,
        amount: Amount,
    ) -> Result<LedgerEvent, LedgerError> {
        Self::check_target(to, "recipient")?;
        Self::check_amount(amount)?;
        self.check_balance(caller, amount)?;

        self.move_units(caller, to, amount);

        debug!(from = %caller, %to, amount, "transfer");
        Ok(LedgerEvent::Transfer {
            from: caller,
            to,
            amount,
        })
    }

    /// Moves `amount` from `from` to `to` on the strength of the allowance
    /// `from` granted to `caller`, consuming that allowance.
    ///
    /// # Errors
    ///
    /// In order: [`LedgerError::InvalidAccount`], [`LedgerError::ZeroAmount`],
    /// [`LedgerError::InsufficientFunds`] (on `from`), and
    /// [`LedgerError::InsufficientAllowance`].
    pub fn transfer_from(
        &mut self,
        caller: AccountId,
        from: AccountId,
        to: AccountId,
        amount: Amount,
    ) -> Result<LedgerEvent, LedgerError> {
        Self::check_target(to, "recipient")?;
        Self::check_amount(amount)?;
        self.check_balance(from, amount)?;

        let allowance = self.allowance(from, caller);
        if allowance < amount {
            return Err(LedgerError::InsufficientAllowance {
                owner: from,
                spender: caller,
                allowance,
                requested: amount,
            });
        }

        self.allowances
            .entry(from)
            .or_default()
            .insert(caller, allowance - amount);
        self.move_units(from, to, amount);

        debug!(spender = %caller, %from, %to, amount, "delegated transfer");
        Ok(LedgerEvent::Transfer { from, to, amount })
    }

    /// Sets the amount `spender` may move out of `caller`'s balance,
    /// replacing any previous allowance.
    ///
    /// # Errors
    ///
    /// [`LedgerError::InvalidAccount`] for a zero spender,
    /// [`LedgerError::ZeroAmount`], and [`LedgerError::InsufficientFunds`]
    /// when `caller` currently holds less than `amount`.
    pub fn approve(
        &mut self,
        caller: AccountId,
        spender: AccountId,
        amount: Amount,
    ) -> Result<LedgerEvent, LedgerError> {
        Self::check_target(spender, "spender")?;
        Self::check_amount(amount)?;
        self.check_balance(caller, amount)?;

        self.allowances
            .entry(caller)
            .or_default()
            .insert(spender, amount);

        debug!(owner = %caller, %spender, amount, "approval");
        Ok(LedgerEvent::Approval {
            owner: caller,
            spender,
            amount,
        })
    }

    /// Remaining amount `spender` may move from `owner`.
    pub fn allowance(&self, owner: AccountId, spender: AccountId) -> Amount {
        self.allowances
            .get(&owner)
            .and_then(|spenders| spenders.get(&spender))
            .copied()
            .unwrap_or(0)
    }

    /// Balance of `account`, zero if never touched.
    pub fn balance_of(&self, account: AccountId) -> Amount {
        self.balances.get(&account).copied().unwrap_or(0)
    }

    /// Total units in existence.
    pub fn total_supply(&self) -> Amount {
        self.total_supply
    }

    /// Sum of every balance entry. Equal to [`total_supply`](Self::total_supply)
    /// whenever the ledger is consistent.
    pub fn balances_sum(&self) -> Amount {
        self.balances.values().sum()
    }

    /// Number of accounts that have ever held a balance entry.
    pub fn account_count(&self) -> usize {
        self.balances.len()
    }

    fn check_target(account: AccountId, role: &'static str) -> Result<(), LedgerError> {
        if account.is_zero() {
            return Err(LedgerError::InvalidAccount { role });
        }
        Ok(())
    }

    fn check_amount(amount: Amount) -> Result<(), LedgerError> {
        if amount == 0 {
            return Err(LedgerError::ZeroAmount);
        }
        Ok(())
    }

    fn check_balance(&self, account: AccountId, amount: Amount) -> Result<(), LedgerError> {
        let balance = self.balance_of(account);
        if balance < amount {
            return Err(LedgerError::InsufficientFunds {
                account,
                balance,
                requested: amount,
            });
        }
        Ok(())
    }

    /// Caller must have checked `from`'s balance. Supply is unchanged, so the
    /// credit cannot overflow.
    fn move_units(&mut self, from: AccountId, to: AccountId, amount: Amount) {
        *self.balances.entry(from).or_insert(0) -= amount;
        *self.balances.entry(to).or_insert(0) += amount;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
