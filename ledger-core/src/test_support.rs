//! Test-only harness account, reimplementing the role `itest.Account`
//! plays in the source VM's integration-test suite: a human-readable,
//! JSON-round-trippable view of a balance independent of the [`StateStore`]
//! machinery under test. Not part of the public ledger semantics — never
//! consulted by [`crate::teller::Teller`] or [`crate::token721::Token721`].

use std::fs;
use std::io;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::fixed::{Fixed, NATIVE_DECIMALS};

/// Initializes the `log` backend for a single test run. Safe to call from
/// every test: `try_init` is idempotent and ignores the "already
/// initialized" error from a previous call in the same process.
pub fn init_test_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Mirrors `itest.AccountJSON`'s on-disk shape. `seckey`/`algorithm` are
/// carried as opaque strings only — no signing/keypair crate is pulled in,
/// key derivation is out of scope for this crate (`spec.md` §1).
#[derive(Debug, Serialize, Deserialize)]
struct AccountRecord {
    id: String,
    balance: String,
    #[serde(default)]
    seckey: String,
    #[serde(default)]
    algorithm: String,
}

/// A named balance with the fixed-8 decimal-string representation the
/// source VM's integration-test fixtures use on disk, guarded by a
/// `RwLock` since fixtures are shared across concurrently-running test
/// cases.
pub struct Account {
    pub id: String,
    pub seckey: String,
    pub algorithm: String,
    balance: RwLock<String>,
}

impl Account {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            seckey: String::new(),
            algorithm: String::new(),
            balance: RwLock::new(Fixed::zero(NATIVE_DECIMALS).to_string_fixed()),
        }
    }

    pub fn balance(&self) -> Fixed {
        let raw = self.balance.read().expect("account balance lock poisoned");
        Fixed::parse(&raw, NATIVE_DECIMALS)
    }

    /// Adds `amount` (which may be negative) to the recorded balance and
    /// re-stringifies it at fixed-8 precision.
    pub fn add_balance(&self, amount: Fixed) {
        let mut raw = self.balance.write().expect("account balance lock poisoned");
        let current = Fixed::parse(&raw, NATIVE_DECIMALS);
        let updated = current.checked_add(amount).unwrap_or(current);
        *raw = updated.to_string_fixed();
    }

    fn to_record(&self) -> AccountRecord {
        AccountRecord {
            id: self.id.clone(),
            balance: self.balance.read().unwrap().clone(),
            seckey: self.seckey.clone(),
            algorithm: self.algorithm.clone(),
        }
    }

    fn from_record(record: AccountRecord) -> Self {
        Self {
            id: record.id,
            seckey: record.seckey,
            algorithm: record.algorithm,
            balance: RwLock::new(record.balance),
        }
    }
}

/// Loads a fixture file of accounts, mirroring `itest.LoadAccounts`.
pub fn load_accounts(path: &str) -> io::Result<Vec<Account>> {
    let data = fs::read_to_string(path)?;
    let records: Vec<AccountRecord> = serde_json::from_str(&data)
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
    Ok(records.into_iter().map(Account::from_record).collect())
}

/// Dumps a fixture file of accounts, mirroring `itest.DumpAccounts`
/// (two-space-indented JSON).
pub fn dump_accounts(accounts: &[Account], path: &str) -> io::Result<()> {
    let records: Vec<AccountRecord> = accounts.iter().map(Account::to_record).collect();
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"  ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    serde::Serialize::serialize(&records, &mut ser)
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
    fs::write(path, buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_balance_accumulates_at_fixed_precision() {
        let account = Account::new("IOSTalice");
        account.add_balance(Fixed::parse("1.5", NATIVE_DECIMALS));
        account.add_balance(Fixed::parse("0.25", NATIVE_DECIMALS));
        assert_eq!(account.balance().to_string_fixed(), "1.75000000");
    }

    #[test]
    fn dump_then_load_round_trips() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("ledger-core-test-accounts-{}.json", std::process::id()));
        let path_str = path.to_str().unwrap();

        let accounts = vec![Account::new("IOSTalice"), Account::new("IOSTbob")];
        accounts[0].add_balance(Fixed::parse("10", NATIVE_DECIMALS));
        dump_accounts(&accounts, path_str).unwrap();

        let loaded = load_accounts(path_str).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].id, "IOSTalice");
        assert_eq!(loaded[0].balance().to_string_fixed(), "10.00000000");

        let _ = fs::remove_file(path);
    }
}
