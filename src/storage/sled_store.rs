//! Save slots kept in an embedded sled database.

use std::path::Path;

use log::debug;

use crate::fiction::errors::FictionError;
use crate::storage::{checked_slot, SlotStore};
use crate::validation::{validate_file_size, MAX_SNAPSHOT_BYTES};

const TREE_SLOTS: &str = "fablekit_slots";
const SLOT_PREFIX: &str = "slot:";

pub struct SledSlotStore {
    _db: sled::Db,
    slots: sled::Tree,
    max_bytes: u64,
}

impl SledSlotStore {
    /// Open (or create) the store rooted at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, FictionError> {
        let path_ref = path.as_ref();
        std::fs::create_dir_all(path_ref)?;
        let db = sled::open(path_ref)?;
        let slots = db.open_tree(TREE_SLOTS)?;
        Ok(Self {
            _db: db,
            slots,
            max_bytes: MAX_SNAPSHOT_BYTES,
        })
    }

    /// Reads of values larger than `max_bytes` fail.
    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    fn slot_key(slot: &str) -> Vec<u8> {
        format!("{}{}", SLOT_PREFIX, slot).into_bytes()
    }
}

impl SlotStore for SledSlotStore {
    fn write(&self, slot: &str, bytes: &[u8]) -> Result<(), FictionError> {
        let slot = checked_slot(slot)?;
        self.slots.insert(Self::slot_key(&slot), bytes)?;
        self.slots.flush()?;
        debug!("wrote sled slot '{}' ({} bytes)", slot, bytes.len());
        Ok(())
    }

    fn read(&self, slot: &str) -> Result<Vec<u8>, FictionError> {
        let slot = checked_slot(slot)?;
        let Some(bytes) = self.slots.get(Self::slot_key(&slot))? else {
            return Err(FictionError::NotFound(format!("slot '{}'", slot)));
        };
        validate_file_size(bytes.len() as u64, self.max_bytes)?;
        Ok(bytes.to_vec())
    }

    fn list(&self) -> Result<Vec<String>, FictionError> {
        let mut names = Vec::new();
        for entry in self.slots.scan_prefix(SLOT_PREFIX.as_bytes()) {
            let (key, _) = entry?;
            let text = String::from_utf8_lossy(&key);
            if let Some(name) = text.strip_prefix(SLOT_PREFIX) {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    fn remove(&self, slot: &str) -> Result<bool, FictionError> {
        let slot = checked_slot(slot)?;
        let existed = self.slots.remove(Self::slot_key(&slot))?.is_some();
        self.slots.flush()?;
        Ok(existed)
    }
}
