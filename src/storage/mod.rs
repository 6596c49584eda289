//! # Storage Module - Snapshot Persistence Layer
//!
//! Turns a [`SnapshotNode`] tree into durable bytes and back, and keeps those bytes in
//! named save slots.
//!
//! ## Pipeline
//!
//! ```text
//! SnapshotNode ──format──▶ payload ──envelope (sha256)──▶ bincode ──transform──▶ slot
//! ```
//!
//! Loading runs the same steps in reverse. Schema version and checksum are verified
//! before the payload is parsed, so a damaged slot never reaches the decoder.
//!
//! ## Backends
//!
//! - [`FileSlotStore`]: one file per slot, percent-encoded names, exclusive `fs2` lock,
//!   temp file + rename.
//! - [`SledSlotStore`]: slots as keys in a `sled` tree.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use fablekit::storage::{pack, unpack, FileSlotStore, SlotStore, SnapshotFormat};
//! use fablekit::storage::transform::Identity;
//! # fn demo(tree: fablekit::fiction::SnapshotNode) -> Result<(), fablekit::fiction::FictionError> {
//! let store = FileSlotStore::new("./saves")?;
//! let bytes = pack(&tree, SnapshotFormat::Bincode, &Identity)?;
//! store.write("quick", &bytes)?;
//! let (envelope, restored) = unpack("quick", store.read("quick")?, &Identity)?;
//! # let _ = (envelope, restored);
//! # Ok(())
//! # }
//! ```

pub mod sled_store;
pub mod transform;

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use fs2::FileExt;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::fiction::errors::FictionError;
use crate::fiction::snapshot::SnapshotNode;
use crate::validation::{
    safe_filename, slot_from_filename, validate_file_size, validate_slot_name, MAX_SNAPSHOT_BYTES,
};

pub use sled_store::SledSlotStore;
use transform::ByteTransform;

/// Envelope layout version. Bump on any incompatible change to [`SnapshotEnvelope`].
pub const SNAPSHOT_SCHEMA_VERSION: u8 = 1;

const SLOT_EXTENSION: &str = "snap";

/// How the snapshot tree is serialized inside the envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotFormat {
    #[default]
    Bincode,
    Json,
}

impl SnapshotFormat {
    pub fn encode(self, tree: &SnapshotNode) -> Result<Vec<u8>, FictionError> {
        Ok(match self {
            SnapshotFormat::Bincode => bincode::serialize(tree)?,
            SnapshotFormat::Json => serde_json::to_vec(tree)?,
        })
    }

    pub fn decode(self, bytes: &[u8]) -> Result<SnapshotNode, FictionError> {
        Ok(match self {
            SnapshotFormat::Bincode => bincode::deserialize(bytes)?,
            SnapshotFormat::Json => serde_json::from_slice(bytes)?,
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SnapshotFormat::Bincode => "bincode",
            SnapshotFormat::Json => "json",
        }
    }
}

impl FromStr for SnapshotFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bincode" => Ok(SnapshotFormat::Bincode),
            "json" => Ok(SnapshotFormat::Json),
            other => Err(format!("unknown snapshot format '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotEnvelope {
    pub schema_version: u8,
    pub snapshot_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub format: SnapshotFormat,
    /// Hex sha256 of `payload`.
    pub checksum: String,
    pub payload: Vec<u8>,
}

fn checksum(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

impl SnapshotEnvelope {
    pub fn seal(tree: &SnapshotNode, format: SnapshotFormat) -> Result<Self, FictionError> {
        let payload = format.encode(tree)?;
        Ok(Self {
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            snapshot_id: Uuid::new_v4(),
            created_at: Utc::now(),
            format,
            checksum: checksum(&payload),
            payload,
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, FictionError> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FictionError> {
        Ok(bincode::deserialize(bytes)?)
    }

    /// Check schema version and payload checksum.
    pub fn verify(&self, slot: &str) -> Result<(), FictionError> {
        if self.schema_version != SNAPSHOT_SCHEMA_VERSION {
            return Err(FictionError::SchemaMismatch {
                expected: SNAPSHOT_SCHEMA_VERSION,
                found: self.schema_version,
            });
        }
        if checksum(&self.payload) != self.checksum {
            return Err(FictionError::ChecksumMismatch {
                slot: slot.to_string(),
            });
        }
        Ok(())
    }

    pub fn tree(&self) -> Result<SnapshotNode, FictionError> {
        self.format.decode(&self.payload)
    }
}

/// Seal `tree` and run the transform. The result is what a slot store keeps.
pub fn pack(
    tree: &SnapshotNode,
    format: SnapshotFormat,
    transform: &dyn ByteTransform,
) -> Result<Vec<u8>, FictionError> {
    let envelope = SnapshotEnvelope::seal(tree, format)?;
    debug!(
        "sealed snapshot {} ({} payload bytes, {})",
        envelope.snapshot_id,
        envelope.payload.len(),
        format.as_str()
    );
    transform.apply(envelope.to_bytes()?)
}

/// Reverse the transform, verify the envelope and parse the tree.
pub fn unpack(
    slot: &str,
    bytes: Vec<u8>,
    transform: &dyn ByteTransform,
) -> Result<(SnapshotEnvelope, SnapshotNode), FictionError> {
    let raw = transform.reverse(bytes)?;
    let envelope = SnapshotEnvelope::from_bytes(&raw)?;
    envelope.verify(slot)?;
    let tree = envelope.tree()?;
    Ok((envelope, tree))
}

/// Named save slots. Implementations are blocking and are driven from a worker thread.
pub trait SlotStore: Send + Sync {
    fn write(&self, slot: &str, bytes: &[u8]) -> Result<(), FictionError>;
    fn read(&self, slot: &str) -> Result<Vec<u8>, FictionError>;
    /// Slot names, sorted.
    fn list(&self) -> Result<Vec<String>, FictionError>;
    /// Returns false when the slot did not exist.
    fn remove(&self, slot: &str) -> Result<bool, FictionError>;
}

pub(crate) fn checked_slot(slot: &str) -> Result<String, FictionError> {
    validate_slot_name(slot).map_err(|e| FictionError::InvalidSlot(format!("'{}': {}", slot, e)))
}

/// Which [`SlotStore`] implementation to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Files,
    Sled,
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "files" => Ok(StorageBackend::Files),
            "sled" => Ok(StorageBackend::Sled),
            other => Err(format!("unknown storage backend '{}'", other)),
        }
    }
}

pub fn open_store<P: AsRef<Path>>(
    backend: StorageBackend,
    dir: P,
) -> Result<Arc<dyn SlotStore>, FictionError> {
    Ok(match backend {
        StorageBackend::Files => Arc::new(FileSlotStore::new(dir)?),
        StorageBackend::Sled => Arc::new(SledSlotStore::open(dir)?),
    })
}

/// One file per slot under a save directory.
#[derive(Debug, Clone)]
pub struct FileSlotStore {
    dir: PathBuf,
}

impl FileSlotStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self, FictionError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn slot_path(&self, slot: &str) -> PathBuf {
        self.dir
            .join(format!("{}.{}", safe_filename(slot), SLOT_EXTENSION))
    }

    fn lock_path(&self, slot: &str) -> PathBuf {
        self.dir.join(format!(".{}.lock", safe_filename(slot)))
    }

    fn open_lock(&self, slot: &str) -> Result<File, FictionError> {
        Ok(OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(self.lock_path(slot))?)
    }
}

fn write_atomic(dir: &Path, path: &Path, content: &[u8]) -> std::io::Result<()> {
    let base = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("slot");
    let mut counter = 0u32;
    let tmp_path = loop {
        let cand = dir.join(format!(".{}.tmp-{}-{}", base, std::process::id(), counter));
        match OpenOptions::new().write(true).create_new(true).open(&cand) {
            Ok(mut tmp) => {
                tmp.write_all(content)?;
                tmp.flush()?;
                let _ = tmp.sync_all();
                break cand;
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                counter = counter.saturating_add(1);
                continue;
            }
            Err(e) => return Err(e),
        }
    };
    if let Err(e) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(e);
    }
    if let Ok(dirf) = File::open(dir) {
        let _ = dirf.sync_all();
    }
    Ok(())
}

impl SlotStore for FileSlotStore {
    fn write(&self, slot: &str, bytes: &[u8]) -> Result<(), FictionError> {
        let slot = checked_slot(slot)?;
        let lock = self.open_lock(&slot)?;
        lock.lock_exclusive()?;
        let result = write_atomic(&self.dir, &self.slot_path(&slot), bytes);
        let _ = lock.unlock();
        result?;
        debug!("wrote slot '{}' ({} bytes)", slot, bytes.len());
        Ok(())
    }

    fn read(&self, slot: &str) -> Result<Vec<u8>, FictionError> {
        let slot = checked_slot(slot)?;
        let path = self.slot_path(&slot);
        if !path.exists() {
            return Err(FictionError::NotFound(format!("slot '{}'", slot)));
        }
        let lock = self.open_lock(&slot)?;
        lock.lock_shared()?;
        let result = fs::metadata(&path)
            .and_then(|meta| validate_file_size(meta.len(), MAX_SNAPSHOT_BYTES))
            .and_then(|_| fs::read(&path));
        let _ = lock.unlock();
        Ok(result?)
    }

    fn list(&self) -> Result<Vec<String>, FictionError> {
        let mut slots = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(SLOT_EXTENSION) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match slot_from_filename(stem) {
                Some(name) => slots.push(name),
                None => warn!("skipping undecodable slot file {}", path.display()),
            }
        }
        slots.sort();
        Ok(slots)
    }

    fn remove(&self, slot: &str) -> Result<bool, FictionError> {
        let slot = checked_slot(slot)?;
        let path = self.slot_path(&slot);
        let lock = self.open_lock(&slot)?;
        lock.lock_exclusive()?;
        let result = match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        };
        let _ = lock.unlock();
        drop(lock);
        let _ = fs::remove_file(self.lock_path(&slot));
        Ok(result?)
    }
}

#[cfg(test)]
mod tests {
    use super::transform::{Gzip, Identity};
    use super::*;
    use tempfile::TempDir;

    fn sample_tree() -> SnapshotNode {
        SnapshotNode::new("game")
            .with_attr("id", "game.test")
            .with_child(SnapshotNode::new("player").with_attr("name", "Hero"))
    }

    #[test]
    fn file_store_write_read_list_remove() {
        let tmp = TempDir::new().unwrap();
        let store = FileSlotStore::new(tmp.path()).unwrap();
        store.write("beta", b"two").unwrap();
        store.write("alpha one", b"one").unwrap();
        assert_eq!(store.list().unwrap(), vec!["alpha one", "beta"]);
        assert_eq!(store.read("alpha one").unwrap(), b"one");

        store.write("beta", b"two again").unwrap();
        assert_eq!(store.read("beta").unwrap(), b"two again");

        assert!(store.remove("beta").unwrap());
        assert!(!store.remove("beta").unwrap());
        assert!(matches!(store.read("beta"), Err(FictionError::NotFound(_))));
    }

    #[test]
    fn invalid_slot_names_are_refused() {
        let tmp = TempDir::new().unwrap();
        let store = FileSlotStore::new(tmp.path()).unwrap();
        assert!(matches!(
            store.write("../escape", b"x"),
            Err(FictionError::InvalidSlot(_))
        ));
    }

    #[test]
    fn pack_unpack_both_formats() {
        for format in [SnapshotFormat::Bincode, SnapshotFormat::Json] {
            let bytes = pack(&sample_tree(), format, &Gzip::default()).unwrap();
            let (envelope, tree) = unpack("s", bytes, &Gzip::default()).unwrap();
            assert_eq!(envelope.format, format);
            assert_eq!(tree, sample_tree());
        }
    }

    #[test]
    fn tampered_payload_fails_checksum() {
        let mut envelope = SnapshotEnvelope::seal(&sample_tree(), SnapshotFormat::Json).unwrap();
        envelope.payload[0] ^= 0xff;
        let bytes = envelope.to_bytes().unwrap();
        let err = unpack("slot1", bytes, &Identity).unwrap_err();
        assert!(matches!(err, FictionError::ChecksumMismatch { slot } if slot == "slot1"));
    }

    #[test]
    fn schema_version_is_checked() {
        let mut envelope = SnapshotEnvelope::seal(&sample_tree(), SnapshotFormat::Bincode).unwrap();
        envelope.schema_version = 9;
        let err = envelope.verify("x").unwrap_err();
        assert!(matches!(
            err,
            FictionError::SchemaMismatch {
                expected: SNAPSHOT_SCHEMA_VERSION,
                found: 9
            }
        ));
    }
}
