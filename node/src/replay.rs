//! # Script Replay
//!
//! Loads genesis and call-script files and runs scripts against a fresh
//! chain. A script is a JSON array of entries:
//!
//! ```json
//! [
//!   { "caller": "0x…", "value": 100000000000000000,
//!     "call": { "register_payer": { "name": "Ada", "tier": 100 } } },
//!   { "caller": "0x…", "call": { "mint": { "account": "0x…", "amount": 5 } } }
//! ]
//! ```
//!
//! `value` defaults to zero. An optional RFC 3339 `timestamp` pins the
//! execution time; otherwise the wall clock is used. Failed entries are
//! reported and the replay moves on.

use anyhow::{Context, Result};
use bursar_contracts::{Call, Chain, GenesisConfig, Receipt};
use bursar_protocol::{AccountId, Amount};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::api::ErrorResponse;

/// One scripted call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptEntry {
    /// Account the call runs as.
    pub caller: AccountId,
    /// Native value to attach.
    #[serde(default)]
    pub value: Amount,
    /// The call.
    pub call: Call,
    /// Execution time override.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Result of one entry, printed as a single JSON line.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplayOutcome {
    /// The call committed.
    Ok(Receipt),
    /// The call reverted.
    Err(ErrorResponse),
}

/// Reads and validates a genesis file.
pub fn load_genesis(path: &Path) -> Result<GenesisConfig> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read genesis file {}", path.display()))?;
    GenesisConfig::from_json(&json)
        .with_context(|| format!("invalid genesis file {}", path.display()))
}

/// Writes a genesis file, refusing to clobber an existing one unless
/// `force` is set.
pub fn write_genesis(path: &Path, config: &GenesisConfig, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists (pass --force to overwrite)",
            path.display()
        );
    }
    let json = config.to_json_pretty().context("failed to encode genesis")?;
    std::fs::write(path, json)
        .with_context(|| format!("failed to write genesis file {}", path.display()))
}

/// Reads a call script.
pub fn load_script(path: &Path) -> Result<Vec<ScriptEntry>> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read script {}", path.display()))?;
    serde_json::from_str(&json).with_context(|| format!("malformed script {}", path.display()))
}

/// Executes every entry in order.
pub fn run_script(chain: &mut Chain, entries: Vec<ScriptEntry>) -> Vec<ReplayOutcome> {
    entries
        .into_iter()
        .map(|entry| {
            let at = entry.timestamp.unwrap_or_else(Utc::now);
            match chain.submit_at(entry.caller, entry.value, entry.call, at) {
                Ok(receipt) => ReplayOutcome::Ok(receipt),
                Err(e) => ReplayOutcome::Err(ErrorResponse::from(&e)),
            }
        })
        .collect()
}
