//! The native-currency ledger and gas settlement engine.

use std::collections::BTreeMap;

use log::{debug, warn};
use thiserror::Error;

use crate::auth::ExecutionContext;
use crate::cost::{self, Cost};
use crate::fixed::{Fixed, NATIVE_DECIMALS};
use crate::identity::Identity;
use crate::store::StateStore;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TellerError {
    #[error("balance of '{0}' not enough")]
    BalanceNotEnough(Identity),
    #[error("amount must be positive")]
    InvalidAmount,
    #[error("'{0}' has not granted '{1}' permission")]
    AuthFailed(Identity, String),
    #[error("gas limit exceeded")]
    GasLimitExceeded,
    #[error("coin '{0}' does not exist")]
    CoinNotFound(String),
    /// Fatal: the block proposed a gas price below the protocol floor.
    /// Not a caller-recoverable condition — the host must treat this as an
    /// invalid block, though this crate still returns `Err` rather than
    /// panicking on attacker-reachable input.
    #[error("gas price {got} below minimum of 100")]
    BadGasPrice { got: i64 },
    /// Fatal: a payer recorded in the cost ledger carries neither the
    /// `IOST` nor `CG` namespace prefix. `pay_cost` only ever receives
    /// payer ids the ABI layer derives itself, so this should be
    /// unreachable in a correctly wired host; surfaced as an error rather
    /// than a panic all the same.
    #[error("payer '{0}' has no recognized IOST/CG prefix")]
    UnknownCostPrefix(Identity),
}

pub type TellerResult<T> = Result<T, TellerError>;

/// The native-currency ledger and gas settlement engine, mirroring the
/// source VM's `host.Teller`. Holds no state of its own besides the
/// per-transaction cost ledger; every balance lives in the [`StateStore`].
pub struct Teller<'a, S: StateStore> {
    store: &'a mut S,
    ctx: &'a ExecutionContext,
    /// Gas owed per payer so far this transaction, billed in `do_pay`.
    /// A `BTreeMap` (not a `HashMap`) so settlement iterates payers in a
    /// fixed, deterministic order regardless of insertion order.
    cost_ledger: BTreeMap<Identity, Cost>,
}

impl<'a, S: StateStore> Teller<'a, S> {
    pub fn new(store: &'a mut S, ctx: &'a ExecutionContext) -> Self {
        Self { store, ctx, cost_ledger: BTreeMap::new() }
    }

    /// Records (replacing, not accumulating) the cost to be billed to
    /// `payer` at settlement. Mirrors `PayCost`: the last call for a given
    /// payer in a transaction is authoritative, earlier calls are
    /// discarded rather than summed.
    pub fn pay_cost(&mut self, payer: Identity, cost: Cost) {
        self.cost_ledger.insert(payer, cost);
    }

    /// Settles every payer recorded via `pay_cost` against `gas_price`:
    /// 90% of the fee goes to the block witness, the floor-divided 10%
    /// remainder to the fixed bonus sink. A payer whose balance cannot
    /// cover its own fee is a fatal, transaction-aborting condition — gas
    /// must always be collectible once billed.
    pub fn do_pay(&mut self, witness: &Identity, gas_price: i64) -> TellerResult<()> {
        if gas_price < 100 {
            warn!("refusing to settle: gas price {gas_price} below minimum of 100");
            return Err(TellerError::BadGasPrice { got: gas_price });
        }
        let ledger = std::mem::take(&mut self.cost_ledger);
        for (payer, cost) in ledger {
            if !payer.is_user() && !payer.is_contract_gas() {
                warn!("refusing to settle: payer {payer} has no recognized prefix");
                return Err(TellerError::UnknownCostPrefix(payer));
            }
            let fee = cost.to_gas() * gas_price;
            if fee == 0 {
                continue;
            }
            let bonus = fee / 10;
            let witness_share = fee - bonus;

            if let Err(err) = self.transfer_raw(&payer, witness, witness_share) {
                warn!("gas settlement failed for payer {payer}: {err}");
                return Err(err);
            }
            if bonus > 0 {
                let bonus_sink = Identity::bonus_sink();
                if let Err(err) = self.transfer_raw(&payer, &bonus_sink, bonus) {
                    warn!("bonus settlement failed for payer {payer}: {err}");
                    return Err(err);
                }
            }
            debug!("settled {fee} gas from {payer} ({witness_share} to {witness}, {bonus} bonus)");
        }
        Ok(())
    }

    /// Unconditional minor-unit transfer with no auth check, the engine
    /// every higher-level Teller call and `do_pay` settlement itself
    /// bottoms out on. Enforces the asymmetric non-negative-balance rule:
    /// `CA` accounts may drain to exactly zero, every other account
    /// (`IOST` users and `CG` gas pools) must retain at least one minor
    /// unit.
    pub fn transfer_raw(&mut self, from: &Identity, to: &Identity, amount: i64) -> TellerResult<()> {
        if amount < 0 {
            return Err(TellerError::InvalidAmount);
        }
        if amount == 0 {
            return Ok(());
        }
        let balance = self.store.balance(from);
        let remaining = balance - amount;
        let floor = if from.is_contract_account() { 0 } else { 1 };
        if from != to && remaining < floor {
            return Err(TellerError::BalanceNotEnough(from.clone()));
        }
        self.store.set_balance(from, -amount);
        self.store.set_balance(to, amount);
        Ok(())
    }

    /// Authenticated transfer: `from` must have granted `"transfer"` to
    /// the running contract unless it is spending its own `CA` custody
    /// account.
    pub fn transfer(&mut self, from: &Identity, to: &Identity, amount: Fixed) -> (Cost, TellerResult<()>) {
        let cost = cost::TRANSFER_COST;
        if amount.value <= 0 {
            return (cost, Err(TellerError::InvalidAmount));
        }
        if let Err(err) = self.require_transfer_auth(from) {
            return (cost, Err(err));
        }
        (cost, self.transfer_raw(from, to, amount.value))
    }

    /// Moves funds from a user's balance into a contract's gas pool so the
    /// contract can pay for its own execution later.
    pub fn top_up(&mut self, contract: &str, from: &Identity, amount: Fixed) -> (Cost, TellerResult<()>) {
        let cost = cost::TRANSFER_COST;
        if amount.value <= 0 {
            return (cost, Err(TellerError::InvalidAmount));
        }
        if let Err(err) = self.require_transfer_auth(from) {
            return (cost, Err(err));
        }
        let gas_pool = Identity::contract_gas(contract);
        (cost, self.transfer_raw(from, &gas_pool, amount.value))
    }

    /// The inverse of `top_up`: reclaims funds from a contract's gas pool
    /// back to a user. Unlike every other transfer wrapper, this is
    /// unauthenticated — it bottoms out directly on `transfer_raw` with no
    /// auth gate, since only the runtime itself (never a contract or a
    /// user) issues a countermand.
    pub fn countermand(&mut self, contract: &str, to: &Identity, amount: Fixed) -> (Cost, TellerResult<()>) {
        let cost = cost::TRANSFER_COST;
        let gas_pool = Identity::contract_gas(contract);
        (cost, self.transfer_raw(&gas_pool, to, amount.value))
    }

    /// Withdraws from a contract's own `CA` custody account to a user,
    /// authorized by the contract's own identity rather than the
    /// recipient — only the contract itself can spend its custody funds.
    pub fn withdraw(&mut self, to: &Identity, amount: Fixed) -> (Cost, TellerResult<()>) {
        let cost = cost::TRANSFER_COST;
        if amount.value <= 0 {
            return (cost, Err(TellerError::InvalidAmount));
        }
        let from = Identity::contract_account(&self.ctx.contract_name);
        (cost, self.transfer_raw(&from, to, amount.value))
    }

    /// Deposits a user's funds into the running contract's own `CA`
    /// custody account.
    pub fn deposit(&mut self, from: &Identity, amount: Fixed) -> (Cost, TellerResult<()>) {
        let cost = cost::TRANSFER_COST;
        if amount.value <= 0 {
            return (cost, Err(TellerError::InvalidAmount));
        }
        if let Err(err) = self.require_transfer_auth(from) {
            return (cost, Err(err));
        }
        let to = Identity::contract_account(&self.ctx.contract_name);
        (cost, self.transfer_raw(from, &to, amount.value))
    }

    /// Absolute minor-unit balance of an already-namespaced identity, with
    /// no prefix normalization. An internal/test convenience, not the ABI
    /// entry point — see [`Teller::get_balance`] for that.
    pub fn raw_balance(&self, id: &Identity) -> (Cost, i64) {
        (cost::GET_COST, self.store.balance(id))
    }

    /// The `GetBalance` ABI: normalizes `id` — used as-is if it already
    /// carries the `IOST` user prefix, otherwise treated as a bare
    /// contract name and looked up under its `CA` custody account — and
    /// renders the result as a fixed-8 decimal string. Never fails: an
    /// unknown identity simply reads as a zero balance.
    pub fn get_balance(&self, id: &str) -> (Cost, String) {
        let normalized =
            if id.starts_with(crate::identity::USER_PREFIX) { Identity::from(id) } else { Identity::contract_account(id) };
        let value = self.store.balance(&normalized);
        (cost::GET_COST, Fixed::new(value, NATIVE_DECIMALS).to_string_fixed())
    }

    /// Reserved prefix a system contract's own name must carry to mint
    /// secondary-coin supply or Servi unconditionally.
    const SYSTEM_CONTRACT_PREFIX: &'static str = "iost.";

    /// Mints `amount` of `coin_name` directly to `to`'s ledger entry.
    /// Gated not by a signer-auth check but by the *running contract's own
    /// name*: only a system contract (its name starting with `"iost."`)
    /// may call this at all.
    pub fn grant_coin(&mut self, coin_name: &str, to: &Identity, amount: i64) -> (Cost, TellerResult<()>) {
        if amount <= 0 {
            return (cost::common_error(1), Err(TellerError::InvalidAmount));
        }
        if !self.ctx.contract_name.starts_with(Self::SYSTEM_CONTRACT_PREFIX) {
            return (cost::common_error(2), Err(TellerError::AuthFailed(to.clone(), "iost.*".to_string())));
        }
        self.store.set_coin(coin_name, to, amount);
        (cost::TRANSFER_COST, Ok(()))
    }

    /// Burns `amount` of `coin_name` from `from`'s ledger entry. Gated by
    /// `from`'s own signer privilege (not a `RequireAuth` store call) —
    /// `from` must itself be a transaction signer with privilege ≥ 1.
    pub fn consume_coin(&mut self, coin_name: &str, from: &Identity, amount: i64) -> (Cost, TellerResult<()>) {
        if amount <= 0 {
            return (cost::common_error(1), Err(TellerError::InvalidAmount));
        }
        if self.ctx.privilege(from) < 1 {
            return (cost::common_error(1), Err(TellerError::AuthFailed(from.clone(), "transfer".to_string())));
        }
        let balance = self.store.coin(coin_name, from);
        if balance < amount {
            return (cost::common_error(2), Err(TellerError::BalanceNotEnough(from.clone())));
        }
        self.store.set_coin(coin_name, from, -amount);
        (cost::TRANSFER_COST, Ok(()))
    }

    /// Mints Servi ("contribution points") to `to`. Unlike `grant_coin`,
    /// the source VM comments out any auth check here entirely — Servi is
    /// granted unconditionally by whichever contract calls this, a quirk
    /// kept rather than "fixed".
    pub fn grant_servi(&mut self, to: &Identity, amount: i64) -> (Cost, TellerResult<()>) {
        if amount <= 0 {
            return (cost::common_error(1), Err(TellerError::InvalidAmount));
        }
        self.store.set_servi(to, amount);
        (cost::TRANSFER_COST, Ok(()))
    }

    /// Burns `amount` of Servi from `from`, gated the same way as
    /// `consume_coin`: `from` must itself hold signer privilege ≥ 1.
    pub fn consume_servi(&mut self, from: &Identity, amount: i64) -> (Cost, TellerResult<()>) {
        if amount <= 0 {
            return (cost::common_error(1), Err(TellerError::InvalidAmount));
        }
        if self.ctx.privilege(from) < 1 {
            return (cost::common_error(1), Err(TellerError::AuthFailed(from.clone(), "transfer".to_string())));
        }
        let balance = self.store.servi(from);
        if balance < amount {
            return (cost::common_error(2), Err(TellerError::BalanceNotEnough(from.clone())));
        }
        self.store.set_servi(from, -amount);
        (cost::TRANSFER_COST, Ok(()))
    }

    pub fn total_servi(&self) -> (Cost, i64) {
        (cost::GET_COST, self.store.total_servi())
    }

    fn require_transfer_auth(&self, from: &Identity) -> TellerResult<()> {
        if from.is_contract_account() {
            // Only the contract whose own custody account this is may spend
            // from it — not just any `CA*` identity the caller names.
            let own_custody = Identity::contract_account(&self.ctx.contract_name);
            return if *from == own_custody {
                Ok(())
            } else {
                Err(TellerError::AuthFailed(from.clone(), "transfer".to_string()))
            };
        }
        let (authorized, _) = self.store.require_auth(from, "transfer");
        if authorized {
            Ok(())
        } else {
            Err(TellerError::AuthFailed(from.clone(), "transfer".to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStateStore;

    fn ctx() -> ExecutionContext {
        ExecutionContext::new("dice.iost")
    }

    #[test]
    fn transfer_raw_moves_funds_and_enforces_user_floor() {
        let mut store = MemoryStateStore::new();
        let alice = Identity::from("IOSTalice");
        let bob = Identity::from("IOSTbob");
        store.seed_balance(&alice, 100);

        let c = ctx();
        let mut teller = Teller::new(&mut store, &c);
        assert!(teller.transfer_raw(&alice, &bob, 99).is_ok());
        assert_eq!(teller.raw_balance(&alice).1, 1);
        assert_eq!(teller.raw_balance(&bob).1, 99);

        // Draining the last unit would leave a user account at zero: rejected.
        assert_eq!(
            teller.transfer_raw(&alice, &bob, 1),
            Err(TellerError::BalanceNotEnough(alice))
        );
    }

    #[test]
    fn transfer_raw_lets_ca_accounts_drain_to_zero() {
        let mut store = MemoryStateStore::new();
        let ca = Identity::contract_account("dice.iost");
        let bob = Identity::from("IOSTbob");
        store.seed_balance(&ca, 50);

        let c = ctx();
        let mut teller = Teller::new(&mut store, &c);
        assert!(teller.transfer_raw(&ca, &bob, 50).is_ok());
        assert_eq!(teller.raw_balance(&ca).1, 0);
    }

    #[test]
    fn transfer_requires_auth_unless_ca() {
        let mut store = MemoryStateStore::new();
        let alice = Identity::from("IOSTalice");
        let bob = Identity::from("IOSTbob");
        store.seed_balance(&alice, 100_000_000);

        let c = ctx();
        let mut teller = Teller::new(&mut store, &c);
        let (_, result) = teller.transfer(&alice, &bob, Fixed::parse("1", NATIVE_DECIMALS));
        assert_eq!(result, Err(TellerError::AuthFailed(alice.clone(), "transfer".to_string())));

        store.authorize(alice.clone());
        let mut teller = Teller::new(&mut store, &c);
        let (_, result) = teller.transfer(&alice, &bob, Fixed::parse("1", NATIVE_DECIMALS));
        assert!(result.is_ok());
    }

    #[test]
    fn transfer_from_ca_requires_the_owning_contract() {
        let mut store = MemoryStateStore::new();
        let ca = Identity::contract_account("dice.iost");
        let bob = Identity::from("IOSTbob");
        store.seed_balance(&ca, 100_000_000);

        // "dice.iost" is the running contract, so spending its own custody
        // account needs no signer auth at all.
        let c = ctx();
        let mut teller = Teller::new(&mut store, &c);
        let (_, result) = teller.transfer(&ca, &bob, Fixed::parse("1", NATIVE_DECIMALS));
        assert!(result.is_ok());

        // A different running contract may not spend "dice.iost"'s custody
        // account just because it names it as `from`.
        let other = ExecutionContext::new("other.iost");
        let mut teller = Teller::new(&mut store, &other);
        let (_, result) = teller.transfer(&ca, &bob, Fixed::parse("1", NATIVE_DECIMALS));
        assert_eq!(result, Err(TellerError::AuthFailed(ca, "transfer".to_string())));
    }

    #[test]
    fn do_pay_splits_fee_ninety_ten_and_drains_deterministically() {
        crate::test_support::init_test_logging();
        let mut store = MemoryStateStore::new();
        let alice = Identity::from("IOSTalice");
        let bob = Identity::from("IOSTbob");
        let witness = Identity::from("IOSTwitness");
        store.seed_balance(&alice, 1_000_000);
        store.seed_balance(&bob, 1_000_000);

        let c = ctx();
        let mut teller = Teller::new(&mut store, &c);
        teller.pay_cost(bob.clone(), Cost::common_op(100));
        teller.pay_cost(alice.clone(), Cost::common_op(100));
        assert!(teller.do_pay(&witness, 100).is_ok());

        // to_gas() = 100 * COMMON_OP_GAS(1) = 100, fee = 100 * gas_price(100) = 10_000
        assert_eq!(teller.raw_balance(&alice).1, 990_000);
        assert_eq!(teller.raw_balance(&bob).1, 990_000);
        assert_eq!(teller.raw_balance(&witness).1, 18_000); // 9_000 * 2
        assert_eq!(teller.raw_balance(&Identity::bonus_sink()).1, 2_000); // 1_000 * 2
    }

    #[test]
    fn do_pay_rejects_gas_price_below_protocol_floor() {
        let mut store = MemoryStateStore::new();
        let alice = Identity::from("IOSTalice");
        let witness = Identity::from("IOSTwitness");
        store.seed_balance(&alice, 1_000_000);

        let c = ctx();
        let mut teller = Teller::new(&mut store, &c);
        teller.pay_cost(alice.clone(), Cost::common_op(100));
        assert_eq!(teller.do_pay(&witness, 99), Err(TellerError::BadGasPrice { got: 99 }));
        // Nothing settled: the ledger entry and alice's balance are untouched.
        assert_eq!(teller.raw_balance(&alice).1, 1_000_000);
    }

    #[test]
    fn do_pay_rejects_payer_with_unrecognized_prefix() {
        let mut store = MemoryStateStore::new();
        let ca = Identity::contract_account("dice.iost");
        let witness = Identity::from("IOSTwitness");
        store.seed_balance(&ca, 1_000_000);

        let c = ctx();
        let mut teller = Teller::new(&mut store, &c);
        // A `CA*` payer in the cost ledger would mean the ABI layer billed
        // a contract's custody account for its own gas, which never
        // happens through `pay_cost`'s real callers — fatal if observed.
        teller.pay_cost(ca.clone(), Cost::common_op(100));
        assert_eq!(teller.do_pay(&witness, 100), Err(TellerError::UnknownCostPrefix(ca)));
    }

    #[test]
    fn pay_cost_replaces_rather_than_accumulates() {
        let mut store = MemoryStateStore::new();
        let alice = Identity::from("IOSTalice");
        let witness = Identity::from("IOSTwitness");
        store.seed_balance(&alice, 10_000);

        let c = ctx();
        let mut teller = Teller::new(&mut store, &c);
        teller.pay_cost(alice.clone(), Cost::common_op(100));
        teller.pay_cost(alice.clone(), Cost::common_op(5));
        assert!(teller.do_pay(&witness, 100).is_ok());

        // Only the last pay_cost call for alice (5 ops = 500 gas-price-scaled fee) is billed.
        assert_eq!(teller.raw_balance(&alice).1, 9_500);
    }

    #[test]
    fn grant_coin_requires_a_system_contract_caller() {
        let mut store = MemoryStateStore::new();
        let alice = Identity::from("IOSTalice");

        // "dice.iost" does not carry the reserved "iost." prefix.
        let c = ctx();
        let mut teller = Teller::new(&mut store, &c);
        assert_eq!(
            teller.grant_coin("ram", &alice, 1000),
            (cost::common_error(2), Err(TellerError::AuthFailed(alice.clone(), "iost.*".to_string())))
        );

        let system = ExecutionContext::new("iost.issue");
        let mut teller = Teller::new(&mut store, &system);
        assert!(teller.grant_coin("ram", &alice, 1000).1.is_ok());
    }

    #[test]
    fn consume_coin_requires_signer_privilege_then_balance() {
        let mut store = MemoryStateStore::new();
        let alice = Identity::from("IOSTalice");
        let bob = Identity::from("IOSTbob");

        let system = ExecutionContext::new("iost.issue");
        let mut teller = Teller::new(&mut store, &system);
        assert!(teller.grant_coin("ram", &alice, 1000).1.is_ok());

        // bob has no privilege over alice's coin balance.
        let c = ctx().with_signer(bob.clone(), 1);
        let mut teller = Teller::new(&mut store, &c);
        assert_eq!(
            teller.consume_coin("ram", &alice, 400),
            (cost::common_error(1), Err(TellerError::AuthFailed(alice.clone(), "transfer".to_string())))
        );

        let c = ctx().with_signer(alice.clone(), 1);
        let mut teller = Teller::new(&mut store, &c);
        assert!(teller.consume_coin("ram", &alice, 400).1.is_ok());
        assert_eq!(
            teller.consume_coin("ram", &alice, 10_000),
            (cost::common_error(2), Err(TellerError::BalanceNotEnough(alice)))
        );
    }

    #[test]
    fn get_balance_normalizes_bare_contract_names_under_ca() {
        let mut store = MemoryStateStore::new();
        let alice = Identity::from("IOSTalice");
        let ca_dice = Identity::contract_account("dice.iost");
        store.seed_balance(&alice, 150_000_000);
        store.seed_balance(&ca_dice, 25_000_000);

        let c = ctx();
        let teller = Teller::new(&mut store, &c);
        // Already `IOST`-prefixed: used as-is.
        assert_eq!(teller.get_balance("IOSTalice").1, "1.50000000");
        // Bare contract name: normalized to its `CA` custody account.
        assert_eq!(teller.get_balance("dice.iost").1, "0.25000000");
        // Unknown identity reads as zero, never an error.
        assert_eq!(teller.get_balance("nobody.iost").1, "0.00000000");
    }

    #[test]
    fn servi_grant_needs_no_auth_but_consume_needs_signer_privilege() {
        let mut store = MemoryStateStore::new();
        let alice = Identity::from("IOSTalice");

        // grant_servi is ungated even from a non-system, unsigned context.
        let c = ctx();
        let mut teller = Teller::new(&mut store, &c);
        assert!(teller.grant_servi(&alice, 50).1.is_ok());
        assert_eq!(teller.total_servi().1, 50);

        assert_eq!(
            teller.consume_servi(&alice, 20),
            (cost::common_error(1), Err(TellerError::AuthFailed(alice.clone(), "transfer".to_string())))
        );

        let c = ctx().with_signer(alice.clone(), 1);
        let mut teller = Teller::new(&mut store, &c);
        assert!(teller.consume_servi(&alice, 20).1.is_ok());
        assert_eq!(teller.total_servi().1, 30);
    }
}
