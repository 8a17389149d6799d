// Unit-of-work store.
//
// All entity tables live in one backend; every multi-row mutation goes
// through a UnitOfWork that stages writes and applies them atomically on
// commit. The store has a single writer: a unit of work holds the writer
// lock for its whole lifetime, which linearizes proposal transitions and
// makes relative balance mutations safe against lost updates. Dropping a
// unit of work without committing discards everything it staged.

mod accessors;
mod backend;

use std::collections::{BTreeMap, HashMap};

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

use custos_common::tokio::{Mutex, MutexGuard};

pub use backend::{Db, Tree};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("backend error: {0}")]
    Backend(String),

    #[error("encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("unique violation on {index}: {value}")]
    UniqueViolation {
        index: &'static str,
        value: String,
    },

    #[error("balance overflow")]
    BalanceOverflow,

    #[error("balance underflow")]
    BalanceUnderflow,
}

impl From<sled::Error> for StorageError {
    fn from(err: sled::Error) -> Self {
        StorageError::Backend(err.to_string())
    }
}

impl StorageError {
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, StorageError::UniqueViolation { .. })
    }
}

// Entity tables
pub(crate) const USERS: &str = "users";
pub(crate) const MULTISIGS: &str = "multisigs";
pub(crate) const MEMBERS: &str = "multisig_members";
pub(crate) const PROPOSALS: &str = "proposals";
pub(crate) const APPROVALS: &str = "approvals";
pub(crate) const INTERNAL_TRANSFERS: &str = "transfers";
pub(crate) const WALLET_TRANSFERS: &str = "wallet_transfers";
pub(crate) const EXTERNAL_TRANSFERS: &str = "external_transfers";
pub(crate) const FEES: &str = "fees";
pub(crate) const VAULTS: &str = "vaults";
pub(crate) const DEPOSITS: &str = "deposits";
pub(crate) const WITHDRAWALS: &str = "withdrawals";
pub(crate) const REMOVAL_EVENTS: &str = "removal_events";

// Unique secondary indexes
pub(crate) const IDX_USER_EMAIL: &str = "idx_user_email";
pub(crate) const IDX_USER_WALLET: &str = "idx_user_wallet";
pub(crate) const IDX_MULTISIG_PDA: &str = "idx_multisig_pda";
pub(crate) const IDX_MULTISIG_CREATE_KEY: &str = "idx_multisig_create_key";
pub(crate) const IDX_MEMBER_KEY: &str = "idx_member_key";
pub(crate) const IDX_VAULT_ADDRESS: &str = "idx_vault_address";
pub(crate) const IDX_DEPOSIT_HASH: &str = "idx_deposit_hash";

// Id allocation
pub(crate) const COUNTERS: &str = "counters";

const TREE_NAMES: &[&str] = &[
    USERS,
    MULTISIGS,
    MEMBERS,
    PROPOSALS,
    APPROVALS,
    INTERNAL_TRANSFERS,
    WALLET_TRANSFERS,
    EXTERNAL_TRANSFERS,
    FEES,
    VAULTS,
    DEPOSITS,
    WITHDRAWALS,
    REMOVAL_EVENTS,
    IDX_USER_EMAIL,
    IDX_USER_WALLET,
    IDX_MULTISIG_PDA,
    IDX_MULTISIG_CREATE_KEY,
    IDX_MEMBER_KEY,
    IDX_VAULT_ADDRESS,
    IDX_DEPOSIT_HASH,
    COUNTERS,
];

pub fn id_key(id: u64) -> Vec<u8> {
    id.to_be_bytes().to_vec()
}

pub struct Store {
    db: Db,
    trees: HashMap<&'static str, Tree>,
    // Single-writer discipline; see module docs
    write_lock: Mutex<()>,
}

impl Store {
    pub fn open(path: &str) -> Result<Self, StorageError> {
        Self::with_db(backend::open(path)?)
    }

    pub fn memory() -> Result<Self, StorageError> {
        Self::with_db(backend::memory())
    }

    fn with_db(db: Db) -> Result<Self, StorageError> {
        let mut trees = HashMap::with_capacity(TREE_NAMES.len());
        for name in TREE_NAMES {
            trees.insert(*name, db.open_tree(name)?);
        }

        Ok(Self {
            db,
            trees,
            write_lock: Mutex::new(()),
        })
    }

    fn tree(&self, name: &'static str) -> &Tree {
        self.trees
            .get(name)
            .unwrap_or_else(|| panic!("unknown tree {}", name))
    }

    /// Open a unit of work. Blocks until the current writer finishes.
    pub async fn begin(&self) -> UnitOfWork<'_> {
        trace!("begin unit of work");
        UnitOfWork {
            store: self,
            _guard: self.write_lock.lock().await,
            staged: HashMap::new(),
        }
    }

    // Committed-state read, for query paths that tolerate running beside
    // a writer. Mutations must go through a unit of work instead.
    pub(crate) fn read_committed<T: DeserializeOwned>(
        &self,
        tree: &'static str,
        key: &[u8],
    ) -> Result<Option<T>, StorageError> {
        match self.tree(tree).get(key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    pub(crate) fn scan_committed<T: DeserializeOwned>(
        &self,
        tree: &'static str,
    ) -> Result<Vec<(Vec<u8>, T)>, StorageError> {
        let mut rows = Vec::new();
        for (key, value) in self.tree(tree).snapshot()? {
            rows.push((key, serde_json::from_slice(&value)?));
        }
        Ok(rows)
    }
}

pub struct UnitOfWork<'a> {
    store: &'a Store,
    _guard: MutexGuard<'a, ()>,
    // tree name + key -> staged value; None marks a deletion
    staged: HashMap<(&'static str, Vec<u8>), Option<Vec<u8>>>,
}

impl<'a> UnitOfWork<'a> {
    fn read_raw(&self, tree: &'static str, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        if let Some(staged) = self.staged.get(&(tree, key.to_vec())) {
            return Ok(staged.clone());
        }
        self.store.tree(tree).get(key)
    }

    pub(crate) fn get<T: DeserializeOwned>(
        &self,
        tree: &'static str,
        key: &[u8],
    ) -> Result<Option<T>, StorageError> {
        match self.read_raw(tree, key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    pub(crate) fn put<T: Serialize>(
        &mut self,
        tree: &'static str,
        key: Vec<u8>,
        value: &T,
    ) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec(value)?;
        self.staged.insert((tree, key), Some(bytes));
        Ok(())
    }

    pub(crate) fn del(&mut self, tree: &'static str, key: Vec<u8>) {
        self.staged.insert((tree, key), None);
    }

    // Committed rows overlaid with this unit of work's staged changes,
    // so a row staged earlier in the same unit of work is visible
    pub(crate) fn scan<T: DeserializeOwned>(
        &self,
        tree: &'static str,
    ) -> Result<Vec<(Vec<u8>, T)>, StorageError> {
        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> = self.store.tree(tree).snapshot()?;
        for ((name, key), value) in &self.staged {
            if *name != tree {
                continue;
            }
            match value {
                Some(bytes) => {
                    merged.insert(key.clone(), bytes.clone());
                }
                None => {
                    merged.remove(key);
                }
            }
        }

        let mut rows = Vec::with_capacity(merged.len());
        for (key, value) in merged {
            rows.push((key, serde_json::from_slice(&value)?));
        }
        Ok(rows)
    }

    /// Allocate the next id of an entity sequence.
    pub(crate) fn next_id(&mut self, sequence: &'static str) -> Result<u64, StorageError> {
        let current: u64 = self.get(COUNTERS, sequence.as_bytes())?.unwrap_or(0);
        let next = current + 1;
        self.put(COUNTERS, sequence.as_bytes().to_vec(), &next)?;
        Ok(next)
    }

    // Reserve a unique index slot for `id`, failing if another row holds it
    pub(crate) fn claim_unique(
        &mut self,
        tree: &'static str,
        index: &'static str,
        key: Vec<u8>,
        display: &dyn std::fmt::Display,
        id: u64,
    ) -> Result<(), StorageError> {
        if let Some(existing) = self.get::<u64>(tree, &key)? {
            if existing != id {
                return Err(StorageError::UniqueViolation {
                    index,
                    value: display.to_string(),
                });
            }
        }
        self.put(tree, key, &id)
    }

    /// Apply every staged write atomically, then flush the backend.
    pub async fn commit(self) -> Result<(), StorageError> {
        trace!("commit unit of work: {} staged writes", self.staged.len());
        for ((tree, key), value) in &self.staged {
            let tree = self.store.tree(*tree);
            match value {
                Some(bytes) => tree.insert(key, bytes.clone())?,
                None => tree.remove(key)?,
            }
        }
        self.store.db.flush().await
    }
}
