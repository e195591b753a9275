//! Alias persistence and the shared, lock-guarded table accessor.
//!
//! The REPL and the utterance worker both touch the alias table, so every
//! read, write and save goes through [`SharedAliases`], which holds a single
//! mutex. Saves happen while that lock is held, so the file always reflects a
//! consistent snapshot.

use crate::alias::AliasTable;
use crate::errors::{StoreError, ValidationError};
use crate::matcher::{ResolvedTarget, resolve};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

/// Boundary to wherever the alias table is persisted.
pub trait AliasStore: Send + Sync {
    fn load(&self) -> Result<AliasTable, StoreError>;
    fn save(&self, table: &AliasTable) -> Result<(), StoreError>;

    /// Human-readable location, shown in the REPL banner.
    fn location(&self) -> String;
}

/// Alias table stored as a pretty-printed JSON object on disk.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AliasStore for JsonFileStore {
    /// A missing file is an empty table.
    fn load(&self) -> Result<AliasTable, StoreError> {
        if !self.path.exists() {
            return Ok(AliasTable::new());
        }
        // Raw bytes: invalid UTF-8 is corrupt data, not an I/O failure.
        let content = std::fs::read(&self.path).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })?;
        serde_json::from_slice(&content).map_err(|source| StoreError::Corrupt {
            path: self.path.clone(),
            source,
        })
    }

    fn save(&self, table: &AliasTable) -> Result<(), StoreError> {
        let io_err = |source| StoreError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let content = serde_json::to_string_pretty(table).map_err(|source| StoreError::Encode {
            path: self.path.clone(),
            source,
        })?;
        std::fs::write(&self.path, content).map_err(io_err)?;
        debug!(path = %self.path.display(), entries = table.len(), "alias table saved");
        Ok(())
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

/// What happened when a table was loaded at startup.
#[derive(Debug)]
pub enum LoadStatus {
    Loaded,
    /// The stored data could not be parsed; the in-memory table starts empty
    /// and the file is left untouched until the next save.
    Corrupt(StoreError),
}

/// Result of an `unmap` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Removal {
    /// The exact phrase was registered.
    Exact(String),
    /// No exact key; the matcher picked this phrase instead.
    Resolved(String),
    NotFound,
}

/// The alias table plus its store behind one mutex.
pub struct SharedAliases {
    table: Mutex<AliasTable>,
    store: Box<dyn AliasStore>,
}

impl SharedAliases {
    /// Load the table from `store`.
    ///
    /// Corrupt data is not fatal: the table starts empty and the status says
    /// why. Plain I/O failures (permissions, etc.) are returned as errors.
    pub fn open(store: Box<dyn AliasStore>) -> Result<(Self, LoadStatus), StoreError> {
        let (table, status) = match store.load() {
            Ok(table) => (table, LoadStatus::Loaded),
            Err(err @ StoreError::Corrupt { .. }) => {
                warn!(error = %err, "alias store is corrupt; starting with an empty table");
                (AliasTable::new(), LoadStatus::Corrupt(err))
            }
            Err(err) => return Err(err),
        };
        Ok((
            Self {
                table: Mutex::new(table),
                store,
            },
            status,
        ))
    }

    pub fn location(&self) -> String {
        self.store.location()
    }

    fn lock(&self) -> Result<MutexGuard<'_, AliasTable>, StoreError> {
        self.table.lock().map_err(|_| StoreError::LockPoisoned)
    }

    /// Copy of the current table.
    pub fn snapshot(&self) -> Result<AliasTable, StoreError> {
        Ok(self.lock()?.clone())
    }

    /// Resolve a phrase while holding the lock.
    pub fn resolve(&self, raw_phrase: &str) -> Result<Option<ResolvedTarget>, StoreError> {
        let table = self.lock()?;
        Ok(resolve(&table, raw_phrase))
    }

    /// Register a phrase and persist.
    ///
    /// If the save fails the in-memory change is rolled back.
    pub fn map(&self, phrase: &str, path: &str) -> Result<Result<(), ValidationError>, StoreError> {
        let mut table = self.lock()?;
        let previous = match table.insert(phrase, path) {
            Ok(previous) => previous,
            Err(err) => return Ok(Err(err)),
        };
        if let Err(err) = self.store.save(&table) {
            match previous {
                Some(old) => {
                    let _ = table.insert(phrase, old);
                }
                None => {
                    table.remove(phrase);
                }
            }
            return Err(err);
        }
        Ok(Ok(()))
    }

    /// Remove a phrase by exact key, falling back to matcher resolution.
    pub fn unmap(&self, phrase: &str) -> Result<Removal, StoreError> {
        let mut table = self.lock()?;
        let (key, removal) = if table.contains(phrase) {
            (phrase.to_string(), Removal::Exact(phrase.to_string()))
        } else {
            match resolve(&table, phrase) {
                Some(target) => (
                    target.matched_phrase.clone(),
                    Removal::Resolved(target.matched_phrase),
                ),
                None => return Ok(Removal::NotFound),
            }
        };
        let Some((index, removed)) = table.remove_indexed(&key) else {
            return Ok(Removal::NotFound);
        };
        if let Err(err) = self.store.save(&table) {
            table.restore(index, removed);
            return Err(err);
        }
        Ok(removal)
    }
}
