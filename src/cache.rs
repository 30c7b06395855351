//! Content-addressed storage for resized images.
//!
//! Decoding, resampling and re-encoding an upload is the expensive part of a
//! request. This module lets the pipeline skip all of it when the same
//! logical request has been served before.
//!
//! # Design
//!
//! The storage directory *is* the cache index. A file named
//! `<fingerprint><ext>` means the work for that fingerprint is done; there is
//! no manifest and no metadata record. Entries are never evicted.
//!
//! ## Lookup
//!
//! [`MediaStore::resolve`] maps a fingerprint to its path and checks for the
//! file. A hit returns immediately. A miss tells the caller to compute and
//! write to exactly that path via [`MediaStore::persist`].
//!
//! ## Writes
//!
//! Output is written to a temp file in the storage directory and renamed
//! into place, so a reader never observes a truncated file at a final path,
//! and a failed encode or a dropped request leaves nothing behind.
//!
//! ## Concurrency
//!
//! Two requests with the same fingerprint could both miss and both compute.
//! [`MediaStore::with_fingerprint_lock`] serializes lookup + compute + persist
//! per fingerprint, so within one process each result is computed at most
//! once. Different fingerprints never contend.

use crate::fingerprint::Fingerprint;
use dashmap::DashMap;
use std::fmt;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Outcome of a cache lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lookup {
    /// Absolute or root-relative filesystem path of the entry.
    pub path: PathBuf,
    /// Stored filename (`<fingerprint><ext>`).
    pub file_name: String,
    pub cache_hit: bool,
}

/// Flat directory of resized images keyed by fingerprint.
#[derive(Debug)]
pub struct MediaStore {
    root: PathBuf,
    in_flight: DashMap<Fingerprint, Arc<Mutex<()>>>,
    stats: CacheStats,
}

impl MediaStore {
    /// Open (and create if needed) the storage directory.
    pub fn open(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            in_flight: DashMap::new(),
            stats: CacheStats::default(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Map a fingerprint to its storage path and check for existing content.
    ///
    /// `extension` includes the leading dot (`".jpg"`).
    pub fn resolve(&self, fingerprint: &Fingerprint, extension: &str) -> Lookup {
        let file_name = format!("{}{}", fingerprint, extension);
        let path = self.root.join(&file_name);
        let cache_hit = path.is_file();
        if cache_hit {
            self.stats.hit();
        } else {
            self.stats.miss();
        }
        Lookup {
            path,
            file_name,
            cache_hit,
        }
    }

    /// Atomically publish `bytes` at `path`.
    ///
    /// `path` must live inside the store root (as returned by [`resolve`]).
    ///
    /// [`resolve`]: MediaStore::resolve
    pub fn persist(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        let dir = path.parent().unwrap_or(&self.root);
        let mut tmp = tempfile::Builder::new()
            .prefix(".partial-")
            .tempfile_in(dir)?;
        tmp.write_all(bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }

    /// Run `f` while holding the compute lock for `fingerprint`.
    ///
    /// The lock entry is dropped from the table once no caller holds it.
    pub fn with_fingerprint_lock<T>(&self, fingerprint: &Fingerprint, f: impl FnOnce() -> T) -> T {
        let lock = self
            .in_flight
            .entry(fingerprint.clone())
            .or_default()
            .clone();

        let result = {
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            f()
        };

        drop(lock);
        self.in_flight
            .remove_if(fingerprint, |_, lock| Arc::strong_count(lock) == 1);
        result
    }

    /// Number of fingerprints currently being computed or waited on.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }
}

/// Running cache counters for the lifetime of the process.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU32,
    misses: AtomicU32,
}

impl CacheStats {
    pub fn hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn hits(&self) -> u32 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u32 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn total(&self) -> u32 {
        self.hits() + self.misses()
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.hits() > 0 {
            write!(
                f,
                "{} cached, {} encoded ({} total)",
                self.hits(),
                self.misses(),
                self.total()
            )
        } else {
            write!(f, "{} encoded", self.misses())
        }
    }
}
