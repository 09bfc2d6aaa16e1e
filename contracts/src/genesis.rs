//! # Genesis Configuration
//!
//! Everything needed to stand up a fresh [`Chain`](crate::runtime::Chain):
//! the admin identity, the institution account, the fee schedule, and the
//! initial native-value allocations. Stored on disk as JSON.

use bursar_protocol::config::UNITS_PER_TOKEN;
use bursar_protocol::{AccountId, Amount, NativeError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::fee_schedule::FeeSchedule;
use crate::institution::InstitutionError;

/// Native value handed to the admin by [`GenesisConfig::reference`].
pub const REFERENCE_ADMIN_ALLOCATION: Amount = 1_000 * UNITS_PER_TOKEN;

/// Errors raised while loading or applying a genesis configuration.
#[derive(Debug, Error)]
pub enum GenesisError {
    /// The JSON could not be parsed.
    #[error("malformed genesis config: {0}")]
    Parse(#[from] serde_json::Error),

    /// The admin and the institution share an account.
    #[error("admin and institution must be different accounts")]
    AdminIsInstitution,

    /// A native allocation targets the zero account.
    #[error("native allocations cannot target the zero account")]
    ZeroAllocation,

    /// The native allocations add up to more than an `Amount` can hold.
    #[error("native allocations overflow the total native supply")]
    AllocationOverflow,

    /// The institution could not be constructed.
    #[error("invalid institution: {0}")]
    Institution(#[from] InstitutionError),

    /// A native allocation could not be credited.
    #[error("invalid native allocation: {0}")]
    Native(#[from] NativeError),
}

/// Initial configuration of a chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisConfig {
    /// Identity allowed to run admin-only institution operations.
    pub admin: AccountId,
    /// The institution's own account.
    pub institution: AccountId,
    /// Tier to fee mapping.
    pub fee_schedule: FeeSchedule,
    /// Native value credited before the first call.
    #[serde(default)]
    pub native_allocations: BTreeMap<AccountId, Amount>,
}

impl GenesisConfig {
    /// Reference setup: the four-tier schedule and a native float for the
    /// admin.
    pub fn reference(admin: AccountId, institution: AccountId) -> Self {
        Self {
            admin,
            institution,
            fee_schedule: FeeSchedule::reference(),
            native_allocations: BTreeMap::from([(admin, REFERENCE_ADMIN_ALLOCATION)]),
        }
    }

    /// Parses and validates a JSON document.
    pub fn from_json(json: &str) -> Result<Self, GenesisError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Pretty-printed JSON form.
    pub fn to_json_pretty(&self) -> Result<String, GenesisError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Checks the account relationships and that the native allocations
    /// fit in a single total. Zero accounts for the admin or the
    /// institution are caught later by `Institution::new`.
    pub fn validate(&self) -> Result<(), GenesisError> {
        if self.admin == self.institution {
            return Err(GenesisError::AdminIsInstitution);
        }
        if self.native_allocations.contains_key(&AccountId::ZERO) {
            return Err(GenesisError::ZeroAllocation);
        }
        self.native_allocations
            .values()
            .try_fold(0, |total: Amount, amount| total.checked_add(*amount))
            .ok_or(GenesisError::AllocationOverflow)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_config_roundtrips_through_json() {
        let admin = AccountId::from_label("admin");
        let school = AccountId::from_label("school");
        let config = GenesisConfig::reference(admin, school);

        let json = config.to_json_pretty().unwrap();
        let back = GenesisConfig::from_json(&json).unwrap();
        assert_eq!(back, config);
        assert_eq!(back.native_allocations[&admin], REFERENCE_ADMIN_ALLOCATION);
    }

    #[test]
    fn allocations_default_to_empty() {
        let json = format!(
            r#"{{"admin":"{}","institution":"{}","fee_schedule":{{"100":5}}}}"#,
            AccountId::from_label("a"),
            AccountId::from_label("b"),
        );
        let config = GenesisConfig::from_json(&json).unwrap();
        assert!(config.native_allocations.is_empty());
        assert_eq!(config.fee_schedule.fee(100), Some(5));
    }

    #[test]
    fn invalid_configs_rejected() {
        let same = AccountId::from_label("same");
        let config = GenesisConfig::reference(same, same);
        assert!(matches!(config.validate(), Err(GenesisError::AdminIsInstitution)));

        let mut config =
            GenesisConfig::reference(AccountId::from_label("a"), AccountId::from_label("b"));
        config.native_allocations.insert(AccountId::ZERO, 1);
        assert!(matches!(config.validate(), Err(GenesisError::ZeroAllocation)));

        let mut config =
            GenesisConfig::reference(AccountId::from_label("a"), AccountId::from_label("b"));
        config.native_allocations.insert(AccountId::from_label("b"), Amount::MAX);
        assert!(matches!(config.validate(), Err(GenesisError::AllocationOverflow)));

        assert!(matches!(
            GenesisConfig::from_json("{"),
            Err(GenesisError::Parse(_))
        ));
        let empty_fees = format!(
            r#"{{"admin":"{}","institution":"{}","fee_schedule":{{}}}}"#,
            AccountId::from_label("a"),
            AccountId::from_label("b"),
        );
        assert!(matches!(
            GenesisConfig::from_json(&empty_fees),
            Err(GenesisError::Parse(_))
        ));
    }
}
