// Document Store: sled-backed persistence for runs and holder snapshots
//
// Storage format:
//   Tree: "documents"
//   Key: logical path (e.g. "distributions/distribution_<id>", "cache/holders_<..>")
//   Value: JSON document

pub mod cache;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::{Db, Tree};
use std::path::Path;

pub use cache::{CacheEntry, TtlCache};

pub const DOCUMENT_TREE: &str = "documents";

/// Document store keyed by logical path. Cloning shares the same database.
#[derive(Clone)]
pub struct DocumentStore {
    db: Db,
    tree: Tree,
}

impl DocumentStore {
    pub fn new(db: Db) -> Result<Self> {
        let tree = db.open_tree(DOCUMENT_TREE)?;
        Ok(Self { db, tree })
    }

    /// Open (or create) the database under `dir`.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        let db = sled::open(dir).with_context(|| format!("opening store {}", dir.display()))?;
        Self::new(db)
    }

    /// Throwaway in-memory store.
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::new(db)
    }

    pub fn read<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        match self.tree.get(path.as_bytes())? {
            Some(bytes) => {
                let doc = serde_json::from_slice(&bytes)
                    .with_context(|| format!("decoding document {path}"))?;
                Ok(Some(doc))
            }
            None => Ok(None),
        }
    }

    pub fn read_raw(&self, path: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.tree.get(path.as_bytes())?.map(|v| v.to_vec()))
    }

    /// Replace the whole document at `path`.
    pub fn write<T: Serialize>(&self, path: &str, doc: &T) -> Result<()> {
        let bytes = serde_json::to_vec(doc).with_context(|| format!("encoding document {path}"))?;
        self.write_raw(path, &bytes)
    }

    pub fn write_raw(&self, path: &str, bytes: &[u8]) -> Result<()> {
        self.tree.insert(path.as_bytes(), bytes)?;
        self.tree.flush()?;
        Ok(())
    }

    /// Paths under `prefix`, in key order.
    pub fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut out = Vec::new();
        for item in self.tree.scan_prefix(prefix.as_bytes()) {
            let (k, _) = item?;
            out.push(String::from_utf8_lossy(&k).to_string());
        }
        Ok(out)
    }

    /// Raw `(path, bytes)` pairs under `prefix`; callers decode each one.
    pub fn scan_raw(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>> {
        let mut out = Vec::new();
        for item in self.tree.scan_prefix(prefix.as_bytes()) {
            let (k, v) = item?;
            out.push((String::from_utf8_lossy(&k).to_string(), v.to_vec()));
        }
        Ok(out)
    }

    /// Returns whether a document existed.
    pub fn delete(&self, path: &str) -> Result<bool> {
        let existed = self.tree.remove(path.as_bytes())?.is_some();
        if existed {
            self.tree.flush()?;
        }
        Ok(existed)
    }

    pub fn db(&self) -> &Db {
        &self.db
    }
}
