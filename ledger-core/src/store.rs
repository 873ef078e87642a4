//! The nested-map state store the host exposes to the ledger and Token721.
//!
//! [`StateStore`] is the seam to the real trie-backed database (out of
//! scope for this crate, see the crate-level docs). [`MemoryStateStore`] is
//! an in-memory stand-in used by the test suite, the same way
//! `near-contract-sim`'s `GlobalState` stands in for the real NEAR trie in
//! that crate's own tests.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::cost::{self, Cost};
use crate::identity::Identity;

/// A typed stand-in for the host's untyped map cell. The real store holds
/// `interface{}`/`Any` values and every call site in the source VM either
/// stores an `int64` or a `string` — this enum is the Rust-idiomatic
/// substitute for that dynamic typing, not a behavior change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StoreValue {
    Int(i64),
    Str(String),
}

impl StoreValue {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            StoreValue::Int(v) => Some(*v),
            StoreValue::Str(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            StoreValue::Str(v) => Some(v),
            StoreValue::Int(_) => None,
        }
    }

    pub fn into_string(self) -> Option<String> {
        match self {
            StoreValue::Str(v) => Some(v),
            StoreValue::Int(_) => None,
        }
    }
}

impl From<i64> for StoreValue {
    fn from(v: i64) -> Self {
        StoreValue::Int(v)
    }
}

impl From<String> for StoreValue {
    fn from(v: String) -> Self {
        StoreValue::Str(v)
    }
}

impl From<&str> for StoreValue {
    fn from(v: &str) -> Self {
        StoreValue::Str(v.to_string())
    }
}

/// Nested-map key-value store consumed by the Teller and Token721. Every
/// call returns the [`Cost`] it charged, matching `MapHas`/`MapGet`/
/// `MapPut`/`MapDel`'s `(value, Cost)` shape in the source VM.
///
/// `payer` on the mutating calls names whose storage-rent account is
/// billed for the cell going forward; `MemoryStateStore` records it but
/// (deferred storage-rent accounting is out of scope for this crate, see
/// `spec.md` §1) does not itself charge ongoing rent against it.
pub trait StateStore {
    fn map_has(&self, bucket: &str, field: &str) -> (bool, Cost);
    fn map_get(&self, bucket: &str, field: &str) -> (Option<StoreValue>, Cost);
    fn map_put(
        &mut self,
        bucket: &str,
        field: &str,
        value: StoreValue,
        payer: Option<&Identity>,
    ) -> Cost;
    fn map_del(&mut self, bucket: &str, field: &str, payer: Option<&Identity>) -> Cost;

    /// Absolute balance lookup.
    fn balance(&self, id: &Identity) -> i64;
    /// Delta-add, not absolute: `delta` may be negative.
    fn set_balance(&mut self, id: &Identity, delta: i64);

    fn coin(&self, coin_name: &str, id: &Identity) -> i64;
    fn set_coin(&mut self, coin_name: &str, id: &Identity, delta: i64);

    fn servi(&self, id: &Identity) -> i64;
    fn set_servi(&mut self, id: &Identity, delta: i64);
    fn total_servi(&self) -> i64;

    /// Consults the transaction's signer set for whether `id` has granted
    /// `permission` to the calling contract.
    fn require_auth(&self, id: &Identity, permission: &str) -> (bool, Cost);
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct MapKey {
    bucket: String,
    field: String,
}

impl MapKey {
    fn new(bucket: &str, field: &str) -> Self {
        Self { bucket: bucket.to_string(), field: field.to_string() }
    }
}

/// In-memory [`StateStore`] reference implementation, analogous to
/// `near-contract-sim::state::GlobalState`: a plain `HashMap`-backed
/// account/storage table good enough for unit and integration tests, never
/// intended as the consensus-grade store.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    maps: HashMap<MapKey, (StoreValue, Option<Identity>)>,
    balances: HashMap<Identity, i64>,
    coins: HashMap<(String, Identity), i64>,
    servi: HashMap<Identity, i64>,
    total_servi: i64,
    auth_list: HashMap<Identity, i32>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grants `id` authority to act as a transaction signer (privilege 1),
    /// i.e. registers it with `RequireAuth`. Test/harness convenience only.
    pub fn authorize(&mut self, id: Identity) {
        self.auth_list.insert(id, 1);
    }

    pub fn revoke(&mut self, id: &Identity) {
        self.auth_list.remove(id);
    }

    /// Seeds an absolute balance. Test/harness convenience only — the real
    /// mutator is always the delta-add `set_balance`.
    pub fn seed_balance(&mut self, id: &Identity, value: i64) {
        self.balances.insert(id.clone(), value);
    }

    /// Whichever identity `bucket`+`field` is currently billed to, if any.
    pub fn payer_of(&self, bucket: &str, field: &str) -> Option<Identity> {
        self.maps.get(&MapKey::new(bucket, field)).and_then(|(_, payer)| payer.clone())
    }
}

impl StateStore for MemoryStateStore {
    fn map_has(&self, bucket: &str, field: &str) -> (bool, Cost) {
        (self.maps.contains_key(&MapKey::new(bucket, field)), cost::Cost::storage_op(1))
    }

    fn map_get(&self, bucket: &str, field: &str) -> (Option<StoreValue>, Cost) {
        let value = self.maps.get(&MapKey::new(bucket, field)).map(|(v, _)| v.clone());
        (value, cost::Cost::storage_op(1))
    }

    fn map_put(
        &mut self,
        bucket: &str,
        field: &str,
        value: StoreValue,
        payer: Option<&Identity>,
    ) -> Cost {
        self.maps.insert(MapKey::new(bucket, field), (value, payer.cloned()));
        cost::Cost::storage_op(1)
    }

    fn map_del(&mut self, bucket: &str, field: &str, _payer: Option<&Identity>) -> Cost {
        self.maps.remove(&MapKey::new(bucket, field));
        cost::Cost::storage_op(1)
    }

    fn balance(&self, id: &Identity) -> i64 {
        *self.balances.get(id).unwrap_or(&0)
    }

    fn set_balance(&mut self, id: &Identity, delta: i64) {
        *self.balances.entry(id.clone()).or_insert(0) += delta;
    }

    fn coin(&self, coin_name: &str, id: &Identity) -> i64 {
        *self.coins.get(&(coin_name.to_string(), id.clone())).unwrap_or(&0)
    }

    fn set_coin(&mut self, coin_name: &str, id: &Identity, delta: i64) {
        *self.coins.entry((coin_name.to_string(), id.clone())).or_insert(0) += delta;
    }

    fn servi(&self, id: &Identity) -> i64 {
        *self.servi.get(id).unwrap_or(&0)
    }

    fn set_servi(&mut self, id: &Identity, delta: i64) {
        *self.servi.entry(id.clone()).or_insert(0) += delta;
        self.total_servi += delta;
    }

    fn total_servi(&self) -> i64 {
        self.total_servi
    }

    fn require_auth(&self, id: &Identity, _permission: &str) -> (bool, Cost) {
        let authorized = self.auth_list.get(id).copied().unwrap_or(0) >= 1;
        (authorized, cost::Cost::common_op(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balance_defaults_to_zero_and_deltas_accumulate() {
        let mut store = MemoryStateStore::new();
        let alice = Identity::from("IOSTalice");
        assert_eq!(store.balance(&alice), 0);
        store.set_balance(&alice, 100);
        store.set_balance(&alice, -40);
        assert_eq!(store.balance(&alice), 60);
    }

    #[test]
    fn map_put_then_get_round_trips() {
        let mut store = MemoryStateStore::new();
        let owner = Identity::from("IOSTalice");
        store.map_put("T721INFT", "0", StoreValue::Str("IOSTalice".into()), Some(&owner));
        let (has, _) = store.map_has("T721INFT", "0");
        assert!(has);
        let (value, _) = store.map_get("T721INFT", "0");
        assert_eq!(value, Some(StoreValue::Str("IOSTalice".into())));
        assert_eq!(store.payer_of("T721INFT", "0"), Some(owner));
    }

    #[test]
    fn servi_tracks_a_running_total() {
        let mut store = MemoryStateStore::new();
        let alice = Identity::from("IOSTalice");
        let bob = Identity::from("IOSTbob");
        store.set_servi(&alice, 10);
        store.set_servi(&bob, 5);
        assert_eq!(store.total_servi(), 15);
        store.set_servi(&alice, -3);
        assert_eq!(store.servi(&alice), 7);
        assert_eq!(store.total_servi(), 12);
    }

    #[test]
    fn require_auth_reflects_authorize_and_revoke() {
        let mut store = MemoryStateStore::new();
        let alice = Identity::from("IOSTalice");
        assert!(!store.require_auth(&alice, "transfer").0);
        store.authorize(alice.clone());
        assert!(store.require_auth(&alice, "transfer").0);
        store.revoke(&alice);
        assert!(!store.require_auth(&alice, "transfer").0);
    }
}
