//! # Native Value Bank
//!
//! Native value is the host environment's own currency: it is attached to
//! calls and forwarded by direct value transfers, independent of the token
//! ledger. The bank only moves value; it never creates it after genesis.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::types::{AccountId, Amount};

/// Errors that can occur while moving native value.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NativeError {
    /// The sender holds less native value than requested.
    #[error("insufficient native funds: {account} holds {balance}, needs {requested}")]
    InsufficientFunds {
        /// The sending account.
        account: AccountId,
        /// Its current native balance.
        balance: Amount,
        /// The amount requested.
        requested: Amount,
    },

    /// Crediting would push a balance or the total past `u128::MAX`.
    #[error("native balance overflow crediting {amount} to {account}")]
    Overflow {
        /// The account being credited.
        account: AccountId,
        /// The amount being credited.
        amount: Amount,
    },
}

impl NativeError {
    /// Stable taxonomy name of the error.
    pub fn code(&self) -> &'static str {
        match self {
            NativeError::InsufficientFunds { .. } => "InsufficientFunds",
            NativeError::Overflow { .. } => "NativeOverflow",
        }
    }
}

/// Native-value balances held by the host.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NativeBank {
    balances: BTreeMap<AccountId, Amount>,
}

impl NativeBank {
    /// Creates an empty bank.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds genesis funds to an account.
    ///
    /// The total across all accounts must stay representable, which keeps
    /// every later transfer and [`total`](Self::total) overflow-free.
    ///
    /// # Errors
    ///
    /// Returns [`NativeError::Overflow`] if the total would exceed `u128::MAX`.
    pub fn credit(&mut self, account: AccountId, amount: Amount) -> Result<Amount, NativeError> {
        if self.total().checked_add(amount).is_none() {
            return Err(NativeError::Overflow { account, amount });
        }
        let balance = self.balances.entry(account).or_insert(0);
        *balance += amount;
        Ok(*balance)
    }

    /// Moves native value between accounts.
    ///
    /// # Errors
    ///
    /// Returns [`NativeError::InsufficientFunds`] if `from` is short and
    /// [`NativeError::Overflow`] if `to` cannot hold the amount. Nothing
    /// moves on error.
    pub fn transfer(
        &mut self,
        from: AccountId,
        to: AccountId,
        amount: Amount,
    ) -> Result<(), NativeError> {
        let balance = self.balance_of(from);
        if balance < amount {
            return Err(NativeError::InsufficientFunds {
                account: from,
                balance,
                requested: amount,
            });
        }
        if amount == 0 || from == to {
            return Ok(());
        }
        let credited = self
            .balance_of(to)
            .checked_add(amount)
            .ok_or(NativeError::Overflow { account: to, amount })?;
        self.balances.insert(from, balance - amount);
        self.balances.insert(to, credited);
        Ok(())
    }

    /// Native balance of `account`, zero if never funded.
    pub fn balance_of(&self, account: AccountId) -> Amount {
        self.balances.get(&account).copied().unwrap_or(0)
    }

    /// Total native value held across all accounts.
    ///
    /// Saturates rather than panicking if the table was deserialized from a
    /// document whose balances do not fit.
    pub fn total(&self) -> Amount {
        self.balances
            .values()
            .fold(0, |acc: Amount, b| acc.saturating_add(*b))
    }
}
