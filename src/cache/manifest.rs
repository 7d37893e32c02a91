//! On-disk build manifest.
//!
//! ```json
//! {
//!   "version": "2/0.3.2",
//!   "timestamp": 1760000000000,
//!   "entries": {
//!     "<blake3(input:output)>": {
//!       "cacheKey": "...",
//!       "inputFile": "/theme/src/styles/main.scss",
//!       "outputFile": "/theme/dist/css/main.css",
//!       "inputHash": "...",
//!       "dependencies": { "/theme/src/styles/_vars.scss": "..." },
//!       "timestamp": 1760000000000
//!     }
//!   }
//! }
//! ```
//!
//! The format is private to this tool: a different `version` is discarded,
//! never migrated.

use super::hash::Digest;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs, io,
    path::{Path, PathBuf},
};
use thiserror::Error;

/// Bump the leading schema number whenever the entry layout changes.
pub const MANIFEST_VERSION: &str = concat!("2/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("no manifest at `{0}`")]
    NotFound(PathBuf),

    #[error("failed to read `{0}`")]
    Io(PathBuf, #[source] io::Error),

    #[error("corrupt manifest")]
    Corrupt(#[from] serde_json::Error),

    #[error("manifest version `{found}` does not match `{MANIFEST_VERSION}`")]
    VersionMismatch { found: String },
}

/// One successful build of `input_file` into `output_file`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub cache_key: String,
    pub input_file: PathBuf,
    pub output_file: PathBuf,
    pub input_hash: Digest,
    pub dependencies: BTreeMap<PathBuf, Digest>,
    /// Epoch millis of the build that produced this entry.
    pub timestamp: i64,
}

impl CacheEntry {
    /// Whether the entry refers to `path` as input or dependency.
    pub fn references(&self, path: &Path) -> bool {
        self.input_file == path || self.dependencies.contains_key(path)
    }

    /// Whether the entry refers to anything below `dir`.
    pub fn references_under(&self, dir: &Path) -> bool {
        self.input_file.starts_with(dir) || self.dependencies.keys().any(|d| d.starts_with(dir))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheManifest {
    pub version: String,
    /// Epoch millis of the last write.
    pub timestamp: i64,
    pub entries: BTreeMap<String, CacheEntry>,
}

impl Default for CacheManifest {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheManifest {
    pub fn new() -> Self {
        Self {
            version: MANIFEST_VERSION.to_string(),
            timestamp: now_millis(),
            entries: BTreeMap::new(),
        }
    }

    /// Read and validate a manifest.
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(ManifestError::NotFound(path.to_path_buf()));
            }
            Err(e) => return Err(ManifestError::Io(path.to_path_buf(), e)),
        };

        let manifest: Self = serde_json::from_str(&content)?;
        if manifest.version != MANIFEST_VERSION {
            return Err(ManifestError::VersionMismatch {
                found: manifest.version,
            });
        }
        Ok(manifest)
    }

    /// Write the whole document to a sibling temp file, then rename over `path`.
    pub fn save(&mut self, path: &Path) -> io::Result<()> {
        self.timestamp = now_millis();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_vec_pretty(self).map_err(io::Error::other)?;

        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, path)
    }
}

/// Current time as epoch millis.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
