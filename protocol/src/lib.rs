// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Bursar Protocol: Core Ledger Library
//!
//! The leaf of the Bursar workspace: the fungible-token ledger and the
//! host's native-value bank. Everything the institution layer does with
//! money ends up as a call into one of these two.
//!
//! ## Modules
//!
//! - **types**: Account identifiers and amounts.
//! - **config**: Token metadata, unit scale, reference fee schedule, limits.
//! - **ledger**: Balances, allowances, total supply.
//! - **native**: Native-value balances moved by attached call value.
//!
//! ## Design Philosophy
//!
//! 1. Validate first, write second. A failed operation leaves no trace.
//! 2. All amounts are `u128` smallest units. No floating point, ever.
//! 3. If it touches money, it has tests. Plural.

pub mod config;
pub mod ledger;
pub mod native;
pub mod types;

pub use ledger::{Ledger, LedgerError, LedgerEvent};
pub use native::{NativeBank, NativeError};
pub use types::{AccountId, AccountIdError, Amount};
