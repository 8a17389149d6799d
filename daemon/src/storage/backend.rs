// Key/value backend behind the store: sled on disk, a BTreeMap in memory
// for tests and ephemeral runs.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use super::StorageError;

#[derive(Clone)]
pub enum Db {
    Sled(sled::Db),
    Memory(MemoryDb),
}

#[derive(Clone)]
pub enum Tree {
    Sled(sled::Tree),
    Memory(MemoryTree),
}

#[derive(Clone, Default)]
pub struct MemoryDb {
    trees: Arc<RwLock<HashMap<String, MemoryTree>>>,
}

#[derive(Clone, Default)]
pub struct MemoryTree {
    entries: Arc<RwLock<BTreeMap<Vec<u8>, Vec<u8>>>>,
}

pub fn open(path: &str) -> Result<Db, StorageError> {
    let db = sled::open(path)?;
    Ok(Db::Sled(db))
}

pub fn memory() -> Db {
    Db::Memory(MemoryDb::default())
}

impl Db {
    pub fn open_tree(&self, name: &str) -> Result<Tree, StorageError> {
        match self {
            Db::Sled(db) => Ok(Tree::Sled(db.open_tree(name)?)),
            Db::Memory(db) => {
                let mut trees = db.trees.write().expect("memory backend lock poisoned");
                let tree = trees.entry(name.to_string()).or_default().clone();
                Ok(Tree::Memory(tree))
            }
        }
    }

    pub async fn flush(&self) -> Result<(), StorageError> {
        match self {
            Db::Sled(db) => {
                db.flush_async().await?;
                Ok(())
            }
            Db::Memory(_) => Ok(()),
        }
    }
}

impl Tree {
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        match self {
            Tree::Sled(tree) => Ok(tree.get(key)?.map(|v| v.to_vec())),
            Tree::Memory(tree) => {
                let entries = tree.entries.read().expect("memory backend lock poisoned");
                Ok(entries.get(key).cloned())
            }
        }
    }

    pub fn insert(&self, key: &[u8], value: Vec<u8>) -> Result<(), StorageError> {
        match self {
            Tree::Sled(tree) => {
                tree.insert(key, value)?;
                Ok(())
            }
            Tree::Memory(tree) => {
                let mut entries = tree.entries.write().expect("memory backend lock poisoned");
                entries.insert(key.to_vec(), value);
                Ok(())
            }
        }
    }

    pub fn remove(&self, key: &[u8]) -> Result<(), StorageError> {
        match self {
            Tree::Sled(tree) => {
                tree.remove(key)?;
                Ok(())
            }
            Tree::Memory(tree) => {
                let mut entries = tree.entries.write().expect("memory backend lock poisoned");
                entries.remove(key);
                Ok(())
            }
        }
    }

    pub fn contains_key(&self, key: &[u8]) -> Result<bool, StorageError> {
        Ok(self.get(key)?.is_some())
    }

    // Snapshot of all entries; tables here are small enough that scans
    // stay cheap, and a snapshot keeps iteration independent of writes
    pub fn snapshot(&self) -> Result<BTreeMap<Vec<u8>, Vec<u8>>, StorageError> {
        match self {
            Tree::Sled(tree) => {
                let mut entries = BTreeMap::new();
                for item in tree.iter() {
                    let (key, value) = item?;
                    entries.insert(key.to_vec(), value.to_vec());
                }
                Ok(entries)
            }
            Tree::Memory(tree) => {
                let entries = tree.entries.read().expect("memory backend lock poisoned");
                Ok(entries.clone())
            }
        }
    }
}
