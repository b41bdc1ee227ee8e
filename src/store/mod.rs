// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Local user store: accounts, farm inventory and scan history
//!
//! Everything lives in one JSON document. Each operation reads the whole
//! file, changes an in-memory copy and writes the whole file back. There is
//! no locking; when two writers race, the last one wins.

pub mod model;

use chrono::Local;
use serde::Serialize;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::knowledge::Report;
use crate::{CropError, Result};

pub use model::{
    Category, HistoryEntry, InventoryItem, InventoryStats, Quantity, Repair, Store,
    StoreDocument, UserRecord, DEFAULT_ADMIN, ITEM_DATE_FORMAT, SCAN_DATE_FORMAT,
};

/// Outcome of a registration attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Created,
    UsernameTaken,
    StoreUnavailable,
}

impl Registration {
    pub fn is_ok(&self) -> bool {
        matches!(self, Registration::Created)
    }

    pub fn message(&self) -> &'static str {
        match self {
            Registration::Created => "Success",
            Registration::UsernameTaken => "Username taken",
            Registration::StoreUnavailable => "Store unavailable",
        }
    }
}

/// Operations over the user store.
///
/// None of these fail loudly: unknown users turn mutations into no-ops and
/// reads into empty results, and storage problems are logged.
pub trait UserRepository: Send + Sync {
    /// Create, repair or reset the backing store so it is usable
    fn ensure_store(&self);

    fn register_user(&self, username: &str, password: &str) -> Registration;

    fn verify_user(&self, username: &str, password: &str) -> bool;

    /// Add an item to the front of the user's inventory, returning its id
    fn add_item(
        &self,
        username: &str,
        name: &str,
        category: Category,
        qty: Quantity,
        notes: &str,
    ) -> Option<String>;

    /// Inventory, newest first
    fn get_inventory(&self, username: &str) -> Vec<InventoryItem>;

    fn delete_item(&self, username: &str, item_id: &str);

    fn get_stats(&self, username: &str) -> InventoryStats {
        InventoryStats::from_items(&self.get_inventory(username))
    }

    /// Record a completed scan at the front of the user's history
    fn log_scan(&self, username: &str, image_path: &Path, report: &Report);

    /// Scan history, newest first
    fn get_history(&self, username: &str) -> Vec<HistoryEntry>;
}

/// Store backed by a single pretty-printed JSON file
#[derive(Debug, Clone)]
pub struct JsonStore {
    path: PathBuf,
}

impl JsonStore {
    /// Point at a store file without touching the disk
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    /// Point at a store file and make sure it is usable
    pub fn open<P: Into<PathBuf>>(path: P) -> Self {
        let store = Self::new(path);
        store.ensure_store();
        store
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the current document. A missing file is an empty store.
    pub fn load(&self) -> Result<Store> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Store::default()),
            Err(e) => return Err(e.into()),
        };

        match StoreDocument::parse(&bytes) {
            StoreDocument::Valid(store) => Ok(store),
            StoreDocument::NeedsRepair { store, repair } => {
                debug!("Store at {:?} needs repair ({}), using repaired view", self.path, repair);
                Ok(store)
            }
            StoreDocument::Corrupt(reason) => Err(CropError::Store(format!(
                "{:?} is corrupt: {}",
                self.path, reason
            ))),
        }
    }

    /// Write the whole document
    pub fn save(&self, store: &Store) -> Result<()> {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        store.serialize(&mut ser)?;
        fs::write(&self.path, buf)?;
        Ok(())
    }

    fn persist(&self, store: &Store) -> bool {
        match self.save(store) {
            Ok(()) => true,
            Err(e) => {
                error!("Store save error at {:?}: {}", self.path, e);
                false
            }
        }
    }

    fn read_or_empty(&self) -> Store {
        self.load().unwrap_or_else(|e| {
            warn!("Store read failed, treating as empty: {}", e);
            Store::default()
        })
    }

    /// Read-modify-write. `f` returning `None` means nothing changed and
    /// nothing is written. A failed read never leads to a write.
    fn modify<R>(&self, f: impl FnOnce(&mut Store) -> Option<R>) -> Option<R> {
        let mut store = match self.load() {
            Ok(store) => store,
            Err(e) => {
                warn!("Store read failed, skipping update: {}", e);
                return None;
            }
        };
        let out = f(&mut store)?;
        self.persist(&store).then_some(out)
    }

    fn user<T>(&self, username: &str, f: impl FnOnce(UserRecord) -> T) -> Option<T> {
        self.read_or_empty().users.remove(username).map(f)
    }

    fn backup_corrupt(&self, bytes: &[u8]) {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".corrupt");
        let backup = PathBuf::from(name);
        match fs::write(&backup, bytes) {
            Ok(()) => info!("Saved corrupt store to {:?}", backup),
            Err(e) => warn!("Could not back up corrupt store to {:?}: {}", backup, e),
        }
    }
}

impl UserRepository for JsonStore {
    fn ensure_store(&self) {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("Creating store at {:?} with default administrator", self.path);
                self.persist(&Store::with_default_admin());
                return;
            }
            Err(e) => {
                error!("Cannot read store at {:?}: {}", self.path, e);
                return;
            }
        };

        match StoreDocument::parse(&bytes) {
            StoreDocument::Valid(_) => debug!("Store at {:?} is valid", self.path),
            StoreDocument::NeedsRepair { store, repair } => {
                warn!("Repairing store structure: {}", repair);
                self.persist(&store);
            }
            StoreDocument::Corrupt(reason) => {
                warn!("Store corrupt ({}), resetting", reason);
                self.backup_corrupt(&bytes);
                self.persist(&Store::with_default_admin());
            }
        }
    }

    fn register_user(&self, username: &str, password: &str) -> Registration {
        let mut store = match self.load() {
            Ok(store) => store,
            Err(e) => {
                warn!("Cannot register '{}': {}", username, e);
                return Registration::StoreUnavailable;
            }
        };

        if store.users.contains_key(username) {
            return Registration::UsernameTaken;
        }

        store.users.insert(username.to_string(), UserRecord::new(password));
        if self.persist(&store) {
            info!("Registered user '{}'", username);
            Registration::Created
        } else {
            Registration::StoreUnavailable
        }
    }

    fn verify_user(&self, username: &str, password: &str) -> bool {
        self.user(username, |record| record.password_matches(password))
            .unwrap_or(false)
    }

    fn add_item(
        &self,
        username: &str,
        name: &str,
        category: Category,
        qty: Quantity,
        notes: &str,
    ) -> Option<String> {
        self.modify(|store| {
            let record = store.users.get_mut(username)?;
            let id = new_item_id(&record.inventory);
            record.inventory.insert(
                0,
                InventoryItem {
                    id: id.clone(),
                    name: name.to_string(),
                    category,
                    qty,
                    notes: notes.to_string(),
                    date: Local::now().format(ITEM_DATE_FORMAT).to_string(),
                    extra: Default::default(),
                },
            );
            debug!("Added item {} for '{}'", id, username);
            Some(id)
        })
    }

    fn get_inventory(&self, username: &str) -> Vec<InventoryItem> {
        self.user(username, |record| record.inventory)
            .unwrap_or_default()
    }

    fn delete_item(&self, username: &str, item_id: &str) {
        self.modify(|store| {
            let inventory = &mut store.users.get_mut(username)?.inventory;
            let before = inventory.len();
            inventory.retain(|item| item.id != item_id);
            (inventory.len() != before).then_some(())
        });
    }

    fn log_scan(&self, username: &str, image_path: &Path, report: &Report) {
        let file = image_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        self.modify(|store| {
            let record = store.users.get_mut(username)?;
            record.history.insert(
                0,
                HistoryEntry {
                    date: Local::now().format(SCAN_DATE_FORMAT).to_string(),
                    file,
                    result: report.title.clone(),
                    status: report.status,
                    extra: Default::default(),
                },
            );
            Some(())
        });
    }

    fn get_history(&self, username: &str) -> Vec<HistoryEntry> {
        self.user(username, |record| record.history)
            .unwrap_or_default()
    }
}

/// Short random item id, regenerated on the rare clash within one inventory
fn new_item_id(existing: &[InventoryItem]) -> String {
    loop {
        let id = Uuid::new_v4().simple().to_string()[..8].to_string();
        if !existing.iter().any(|item| item.id == id) {
            return id;
        }
    }
}
