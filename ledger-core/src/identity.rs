//! Account identities and the namespace prefixes that drive authorization
//! and transfer policy.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Externally-owned user account, e.g. `IOSTkex...`.
pub const USER_PREFIX: &str = "IOST";
/// Contract custody account: funds a contract holds directly.
pub const CONTRACT_ACCOUNT_PREFIX: &str = "CA";
/// Contract gas-pool account: topped up by users to pay for a contract's gas.
pub const CONTRACT_GAS_PREFIX: &str = "CG";
/// Fixed sink receiving 10% of every settled gas fee.
pub const BONUS_SINK: &str = "iost.bonus";

/// An opaque account identity. The string itself carries its namespace
/// (`IOST`/`CA`/`CG`) as a prefix; this type exists only to make prefix
/// checks and account-address construction explicit call sites instead of
/// ad hoc `starts_with`/`format!` scattered through the ledger.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Identity(String);

impl Identity {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    pub fn is_user(&self) -> bool {
        self.0.starts_with(USER_PREFIX)
    }

    pub fn is_contract_account(&self) -> bool {
        self.0.starts_with(CONTRACT_ACCOUNT_PREFIX)
    }

    pub fn is_contract_gas(&self) -> bool {
        self.0.starts_with(CONTRACT_GAS_PREFIX)
    }

    /// `CA` + contract name: the custody account a contract can spend from freely.
    pub fn contract_account(contract: &str) -> Identity {
        Identity(format!("{CONTRACT_ACCOUNT_PREFIX}{contract}"))
    }

    /// `CG` + contract name: the gas pool users top up on a contract's behalf.
    pub fn contract_gas(contract: &str) -> Identity {
        Identity(format!("{CONTRACT_GAS_PREFIX}{contract}"))
    }

    pub fn bonus_sink() -> Identity {
        Identity::contract_account(BONUS_SINK)
    }
}

impl Default for Identity {
    fn default() -> Self {
        Identity(String::new())
    }
}

impl From<&str> for Identity {
    fn from(s: &str) -> Self {
        Identity(s.to_string())
    }
}

impl From<String> for Identity {
    fn from(s: String) -> Self {
        Identity(s)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
