//! # Core Types
//!
//! Account identifiers and amounts shared by every Bursar component.
//!
//! An [`AccountId`] is a 20-byte identifier rendered as `0x`-prefixed
//! lowercase hex. The all-zero identifier is the burn account: nothing can be
//! minted to it, transferred to it, or approved as a spender.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Token and native amounts, in smallest units.
///
/// `u128` because the ledger scales one whole token to 10^18 units, which
/// overflows `u64` at roughly 18.4 tokens.
pub type Amount = u128;

/// Byte length of an [`AccountId`].
pub const ACCOUNT_ID_LENGTH: usize = 20;

/// Errors produced when parsing an [`AccountId`] from text.
#[derive(Debug, Error, PartialEq)]
pub enum AccountIdError {
    /// The input was not valid hex.
    #[error("invalid hex in account id: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    /// The input decoded to the wrong number of bytes.
    #[error("account id must be {expected} bytes, got {actual}")]
    InvalidLength {
        /// Required byte length.
        expected: usize,
        /// Decoded byte length.
        actual: usize,
    },
}

// ---------------------------------------------------------------------------
// AccountId
// ---------------------------------------------------------------------------

/// Identifier of a ledger or native-value account.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct AccountId([u8; ACCOUNT_ID_LENGTH]);

impl AccountId {
    /// The zero/burn account.
    pub const ZERO: AccountId = AccountId([0u8; ACCOUNT_ID_LENGTH]);

    /// Wraps raw identifier bytes.
    pub const fn from_bytes(bytes: [u8; ACCOUNT_ID_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Derives a deterministic identifier from a human-readable label.
    ///
    /// Takes the first 20 bytes of `BLAKE3(label)`. Handy for fixtures and
    /// scripts where "alice" reads better than forty hex digits.
    pub fn from_label(label: &str) -> Self {
        let digest = blake3::hash(label.as_bytes());
        let mut bytes = [0u8; ACCOUNT_ID_LENGTH];
        bytes.copy_from_slice(&digest.as_bytes()[..ACCOUNT_ID_LENGTH]);
        Self(bytes)
    }

    /// Returns the raw identifier bytes.
    pub fn as_bytes(&self) -> &[u8; ACCOUNT_ID_LENGTH] {
        &self.0
    }

    /// Returns `true` for the zero/burn account.
    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }

    /// Returns the `0x`-prefixed hex rendering.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// Parses a hex identifier, with or without the `0x` prefix.
    pub fn from_hex(s: &str) -> Result<Self, AccountIdError> {
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);
        let bytes = hex::decode(digits)?;
        if bytes.len() != ACCOUNT_ID_LENGTH {
            return Err(AccountIdError::InvalidLength {
                expected: ACCOUNT_ID_LENGTH,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; ACCOUNT_ID_LENGTH];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl fmt::Debug for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = self.to_hex();
        write!(f, "AccountId({}...)", &hex[..10])
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for AccountId {
    type Err = AccountIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

// Hex strings on the wire so ids work as JSON map keys.
impl Serialize for AccountId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for AccountId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}
