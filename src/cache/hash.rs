//! Content hashing for freshness detection.
//!
//! Digests are blake3 over the full file bytes, rendered as 64 hex chars.
//! [`HashMemo`] remembers digests between staleness checks, trusting a
//! memoized digest only while the file's size and mtime are unchanged and the
//! mtime is safely older than the moment the digest was taken.

use rustc_hash::FxHashMap;
use std::{
    fs,
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};

/// Hex-encoded blake3 digest.
pub type Digest = String;

/// Files modified this close to the moment they were hashed are re-hashed on
/// every lookup: coarse filesystem clocks can hide a second write.
const RACY_WINDOW: Duration = Duration::from_secs(2);

/// Digest of a file's contents, `None` if it cannot be read.
///
/// A vanished file (deleted between event and hash) is a normal outcome here.
pub fn hash_file(path: &Path) -> Option<Digest> {
    fs::read(path).ok().map(|bytes| hash_bytes(&bytes))
}

#[inline]
pub fn hash_bytes(bytes: &[u8]) -> Digest {
    blake3::hash(bytes).to_hex().to_string()
}

/// Manifest key for an `(input, output)` pair.
///
/// Path-based, content-independent: `blake3("<input-rel>:<output-rel>")`.
pub fn cache_key(root: &Path, input: &Path, output: &Path) -> String {
    let rel = |p: &Path| {
        p.strip_prefix(root)
            .unwrap_or(p)
            .to_string_lossy()
            .replace('\\', "/")
    };
    hash_bytes(format!("{}:{}", rel(input), rel(output)).as_bytes())
}

#[derive(Debug, Clone)]
struct Memo {
    digest: Digest,
    len: u64,
    modified: SystemTime,
    hashed_at: SystemTime,
}

impl Memo {
    fn still_valid(&self, meta: &fs::Metadata) -> bool {
        let Ok(modified) = meta.modified() else {
            return false;
        };
        meta.len() == self.len
            && modified == self.modified
            && modified
                .checked_add(RACY_WINDOW)
                .is_some_and(|settled| settled < self.hashed_at)
    }
}

/// In-memory path → digest cache for one process lifetime.
#[derive(Debug, Default)]
pub struct HashMemo {
    entries: FxHashMap<PathBuf, Memo>,
}

impl HashMemo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Digest of `path`, reusing the memoized one when it is still trustworthy.
    pub fn digest(&mut self, path: &Path) -> Option<Digest> {
        let Ok(meta) = fs::metadata(path) else {
            self.entries.remove(path);
            return None;
        };

        if let Some(memo) = self.entries.get(path)
            && memo.still_valid(&meta)
        {
            return Some(memo.digest.clone());
        }

        self.refresh(path)
    }

    /// Re-read and re-hash `path` unconditionally.
    pub fn refresh(&mut self, path: &Path) -> Option<Digest> {
        let hashed_at = SystemTime::now();
        let (Ok(meta), Some(digest)) = (fs::metadata(path), hash_file(path)) else {
            self.entries.remove(path);
            return None;
        };

        if let Ok(modified) = meta.modified() {
            self.entries.insert(
                path.to_path_buf(),
                Memo {
                    digest: digest.clone(),
                    len: meta.len(),
                    modified,
                    hashed_at,
                },
            );
        }
        Some(digest)
    }

    pub fn forget(&mut self, path: &Path) {
        self.entries.remove(path);
    }

    /// Forget every memoized path below `dir`.
    pub fn forget_under(&mut self, dir: &Path) {
        self.entries.retain(|path, _| !path.starts_with(dir));
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
