//! # Token Ledger Capability
//!
//! The institution never reaches into ledger storage. It holds a
//! [`TokenLedger`]: balance query, direct transfer, delegated transfer, and
//! approval, each acting on behalf of an explicit caller. The real
//! [`Ledger`] implements it; tests swap in doubles that fail on demand.

use bursar_protocol::{AccountId, Amount, Ledger, LedgerError, LedgerEvent};

/// The ledger operations the institution depends on.
pub trait TokenLedger {
    /// Balance of `account`.
    fn balance_of(&self, account: AccountId) -> Amount;

    /// Moves `amount` from `caller` to `to`.
    fn transfer(
        &mut self,
        caller: AccountId,
        to: AccountId,
        amount: Amount,
    ) -> Result<LedgerEvent, LedgerError>;

    /// Moves `amount` from `from` to `to`, spending `caller`'s allowance.
    fn transfer_from(
        &mut self,
        caller: AccountId,
        from: AccountId,
        to: AccountId,
        amount: Amount,
    ) -> Result<LedgerEvent, LedgerError>;

    /// Sets `spender`'s allowance over `caller`'s balance.
    fn approve(
        &mut self,
        caller: AccountId,
        spender: AccountId,
        amount: Amount,
    ) -> Result<LedgerEvent, LedgerError>;
}

impl TokenLedger for Ledger {
    fn balance_of(&self, account: AccountId) -> Amount {
        Ledger::balance_of(self, account)
    }

    fn transfer(
        &mut self,
        caller: AccountId,
        to: AccountId,
        amount: Amount,
    ) -> Result<LedgerEvent, LedgerError> {
        Ledger::transfer(self, caller, to, amount)
    }

    fn transfer_from(
        &mut self,
        caller: AccountId,
        from: AccountId,
        to: AccountId,
        amount: Amount,
    ) -> Result<LedgerEvent, LedgerError> {
        Ledger::transfer_from(self, caller, from, to, amount)
    }

    fn approve(
        &mut self,
        caller: AccountId,
        spender: AccountId,
        amount: Amount,
    ) -> Result<LedgerEvent, LedgerError> {
        Ledger::approve(self, caller, spender, amount)
    }
}
