//! Authorization oracle: resolves an identity's privilege in the current
//! execution context.

use std::collections::HashMap;

use crate::identity::Identity;

/// Everything an ABI call needs from the host about the current execution:
/// which contract is running, and who signed the enclosing transaction at
/// what privilege level. Constructed fresh by the host for every call frame
/// (cross-contract calls swap `contract_name`, never the signer set).
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// The contract currently executing, without any `CA`/`CG` prefix.
    pub contract_name: String,
    /// Privilege level per signer of the enclosing transaction.
    /// 0 = none, 1 = ordinary signer, higher = admin-granted privilege.
    pub auth_list: HashMap<Identity, i32>,
    /// Gas budget remaining for the running call, consulted by `CheckCost`
    /// gates partway through an ABI method. Defaults to `i64::MAX`, i.e.
    /// no limit, for callers that don't care to model exhaustion.
    pub gas_limit: i64,
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self { contract_name: String::new(), auth_list: HashMap::new(), gas_limit: i64::MAX }
    }
}

impl ExecutionContext {
    pub fn new(contract_name: impl Into<String>) -> Self {
        Self { contract_name: contract_name.into(), ..Self::default() }
    }

    pub fn with_signer(mut self, id: Identity, privilege: i32) -> Self {
        self.auth_list.insert(id, privilege);
        self
    }

    pub fn with_gas_limit(mut self, gas_limit: i64) -> Self {
        self.gas_limit = gas_limit;
        self
    }

    pub fn gas_limit(&self) -> i64 {
        self.gas_limit
    }

    /// Privilege level for `id`. Absent from the signer set, or no signer
    /// set at all, both resolve to `0` rather than an error — the Go source
    /// treats a missing `auth_list` the same as an empty one.
    pub fn privilege(&self, id: &Identity) -> i32 {
        *self.auth_list.get(id).unwrap_or(&0)
    }
}
