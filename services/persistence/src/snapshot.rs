//! Snapshot store — per-pair order-book snapshots
//!
//! One record per asset pair, keyed by the pair, holding the serialized book
//! together with the offset at which it was taken. Writes go through a
//! temp file, fsync and rename, so a reader never observes a torn
//! `(offset, bytes)` tuple.

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::PathBuf;
use thiserror::Error;
use types::AssetPair;

// ── Errors ──────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("unsupported snapshot record version: {0}")]
    UnsupportedVersion(u8),

    #[error("snapshot record too short")]
    Truncated,
}

// ── Store ───────────────────────────────────────────────────────────

/// Current on-disk record version.
const RECORD_VERSION: u8 = 1;

/// Record layout: `version: u8, offset: u64 le, payload`.
/// The payload is the book's own versioned encoding and is opaque here.
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, SnapshotError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Atomically replace the snapshot for `pair`.
    pub fn put(&self, pair: &AssetPair, offset: u64, bytes: &[u8]) -> Result<(), SnapshotError> {
        let path = self.path_for(pair);
        let tmp = path.with_extension("tmp");
        {
            let mut f = File::create(&tmp)?;
            f.write_all(&[RECORD_VERSION])?;
            f.write_all(&offset.to_le_bytes())?;
            f.write_all(bytes)?;
            f.sync_all()?;
        }
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// The latest snapshot for `pair`, if one was ever taken.
    pub fn get(&self, pair: &AssetPair) -> Result<Option<(u64, Vec<u8>)>, SnapshotError> {
        let path = self.path_for(pair);
        if !path.exists() {
            return Ok(None);
        }
        let mut data = Vec::new();
        File::open(&path)?.read_to_end(&mut data)?;
        if data.len() < 9 {
            return Err(SnapshotError::Truncated);
        }
        if data[0] != RECORD_VERSION {
            return Err(SnapshotError::UnsupportedVersion(data[0]));
        }
        let offset = u64::from_le_bytes(data[1..9].try_into().expect("9-byte header"));
        Ok(Some((offset, data[9..].to_vec())))
    }

    /// Remove the snapshot for `pair`, if any.
    pub fn drop_pair(&self, pair: &AssetPair) -> Result<(), SnapshotError> {
        let path = self.path_for(pair);
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }

    fn path_for(&self, pair: &AssetPair) -> PathBuf {
        self.dir.join(format!("{}.snap", pair.key()))
    }
}

// ── Tests ───────────────────────────────────────────────────────────
