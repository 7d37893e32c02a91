//! Persistent build cache.
//!
//! Decides whether an `(input, output)` pair must be rebuilt by comparing
//! content digests of the input and its dependencies against the digests
//! recorded after the last successful build.
//!
//! # Staleness policy
//!
//! ```text
//! needs_rebuild(input, output, deps)
//!     │
//!     ├── cache disabled / bypassed ──────────────► true
//!     ├── no entry for (input, output) ───────────► true
//!     ├── output missing on disk ─────────────────► true
//!     ├── input digest changed or unreadable ─────► true
//!     ├── any current dep changed, new or gone ───► true
//!     └── otherwise ──────────────────────────────► false
//! ```
//!
//! Dependencies recorded earlier but no longer listed are ignored. The policy
//! may rebuild needlessly, it never skips a needed build.

mod hash;
mod manifest;

pub use hash::{Digest, HashMemo, cache_key, hash_file};
pub use manifest::{CacheEntry, CacheManifest, MANIFEST_VERSION, ManifestError, now_millis};

use crate::{config::ThemeConfig, debug, log};
use parking_lot::Mutex;
use std::{
    collections::BTreeMap,
    fs, io,
    path::{Path, PathBuf},
    sync::Arc,
};

/// Cache handle shared by every component of a session.
///
/// The lock is held only for synchronous cache calls, never across `.await`.
pub type SharedCache = Arc<Mutex<BuildCache>>;

const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

/// Summary for log output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub path: PathBuf,
}

pub struct BuildCache {
    root: PathBuf,
    manifest_path: PathBuf,
    manifest: CacheManifest,
    hashes: HashMemo,
    /// Load, consult and record at all.
    enabled: bool,
    /// Answer "rebuild" to every staleness check, but keep recording.
    bypass: bool,
    retention_millis: i64,
}

impl BuildCache {
    pub fn new(root: &Path, manifest_path: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            manifest_path: manifest_path.to_path_buf(),
            manifest: CacheManifest::new(),
            hashes: HashMemo::new(),
            enabled: true,
            bypass: false,
            retention_millis: 7 * MILLIS_PER_DAY,
        }
    }

    /// Build from config. `active` is false when the `cache` component is not selected.
    pub fn from_config(config: &ThemeConfig, active: bool) -> Self {
        let mut cache = Self::new(config.get_root(), &config.cache_path());
        cache.enabled = active && config.cache.enable;
        cache.bypass = config.cache.bypass;
        cache.retention_millis = i64::try_from(config.cache.retention_days)
            .unwrap_or(i64::MAX / MILLIS_PER_DAY)
            .saturating_mul(MILLIS_PER_DAY);
        cache
    }

    pub fn shared(self) -> SharedCache {
        Arc::new(Mutex::new(self))
    }

    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_bypass(&mut self, bypass: bool) {
        self.bypass = bypass;
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.manifest.entries.len(),
            path: self.manifest_path.clone(),
        }
    }

    pub fn entry(&self, input: &Path, output: &Path) -> Option<&CacheEntry> {
        self.manifest.entries.get(&self.key(input, output))
    }

    fn key(&self, input: &Path, output: &Path) -> String {
        cache_key(&self.root, input, output)
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Load the persisted manifest, then prune stale entries.
    ///
    /// Missing, corrupt or foreign-version manifests start an empty cache.
    /// Returns the number of pruned entries.
    pub fn init(&mut self) -> usize {
        if !self.enabled {
            return 0;
        }

        self.manifest = match CacheManifest::load(&self.manifest_path) {
            Ok(manifest) => manifest,
            Err(ManifestError::NotFound(_)) => CacheManifest::new(),
            Err(e) => {
                log!("cache"; "{e}, starting fresh");
                CacheManifest::new()
            }
        };

        let pruned = self.clean_stale_entries();
        if pruned > 0 {
            self.persist();
        }
        pruned
    }

    /// Remove entries past the retention window or whose input is gone.
    pub fn clean_stale_entries(&mut self) -> usize {
        let now = now_millis();
        let retention = self.retention_millis;
        let before = self.manifest.entries.len();

        self.manifest.entries.retain(|_, entry| {
            let fresh = now.saturating_sub(entry.timestamp) <= retention;
            fresh && entry.input_file.exists()
        });

        before - self.manifest.entries.len()
    }

    /// Drop every entry and delete the manifest file.
    pub fn clear(&mut self) -> io::Result<()> {
        self.manifest = CacheManifest::new();
        self.hashes.clear();
        match fs::remove_file(&self.manifest_path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }

    fn persist(&mut self) {
        if let Err(e) = self.manifest.save(&self.manifest_path) {
            log!("cache"; "failed to write {}: {e}", self.manifest_path.display());
        }
    }

    // ========================================================================
    // Staleness
    // ========================================================================

    /// Whether `input` must be (re)built into `output`.
    pub fn needs_rebuild(&mut self, input: &Path, output: &Path, dependencies: &[PathBuf]) -> bool {
        if !self.enabled || self.bypass {
            return true;
        }

        let key = self.key(input, output);
        let Some(entry) = self.manifest.entries.get(&key) else {
            debug!("cache"; "miss: {}", input.display());
            return true;
        };

        if !output.exists() {
            debug!("cache"; "output missing: {}", output.display());
            return true;
        }

        if self.hashes.digest(input).as_ref() != Some(&entry.input_hash) {
            return true;
        }

        dependencies.iter().any(|dep| {
            let current = self.hashes.digest(dep);
            let changed = current.is_none() || current.as_ref() != entry.dependencies.get(dep);
            if changed {
                debug!("cache"; "dependency changed: {}", dep.display());
            }
            changed
        })
    }

    /// Record a successful build and persist the manifest.
    ///
    /// Digests are re-read from disk, not taken from the memo.
    pub fn update_cache(&mut self, input: &Path, output: &Path, dependencies: &[PathBuf]) {
        if !self.enabled {
            return;
        }

        let Some(input_hash) = self.hashes.refresh(input) else {
            debug!("cache"; "input vanished after build: {}", input.display());
            return;
        };

        let dependencies: BTreeMap<PathBuf, Digest> = dependencies
            .iter()
            .filter_map(|dep| self.hashes.refresh(dep).map(|digest| (dep.clone(), digest)))
            .collect();

        let key = self.key(input, output);
        let entry = CacheEntry {
            cache_key: key.clone(),
            input_file: input.to_path_buf(),
            output_file: output.to_path_buf(),
            input_hash,
            dependencies,
            timestamp: now_millis(),
        };
        self.manifest.entries.insert(key, entry);
        self.persist();
    }

    // ========================================================================
    // Invalidation
    // ========================================================================

    /// Remove every entry using `path` as input or dependency.
    pub fn invalidate_file(&mut self, path: &Path) -> usize {
        self.hashes.forget(path);
        self.remove_where(|entry| entry.references(path))
    }

    /// Remove every entry using anything below `dir`.
    pub fn invalidate_dir(&mut self, dir: &Path) -> usize {
        self.hashes.forget_under(dir);
        self.remove_where(|entry| entry.references_under(dir))
    }

    /// Forget only the memoized digest of `path`.
    pub fn forget_hash(&mut self, path: &Path) {
        self.hashes.forget(path);
    }

    fn remove_where(&mut self, pred: impl Fn(&CacheEntry) -> bool) -> usize {
        let before = self.manifest.entries.len();
        self.manifest.entries.retain(|_, entry| !pred(entry));
        let removed = before - self.manifest.entries.len();

        if removed > 0 && self.enabled {
            self.persist();
        }
        removed
    }

    #[cfg(test)]
    pub(crate) fn manifest_mut(&mut self) -> &mut CacheManifest {
        &mut self.manifest
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
        cache: BuildCache,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let cache = BuildCache::new(dir.path(), &dir.path().join(".cache/build-cache.json"));
            Self { dir, cache }
        }

        fn file(&self, name: &str, content: &str) -> PathBuf {
            let path = self.dir.path().join(name);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).unwrap();
            }
            fs::write(&path, content).unwrap();
            path
        }
    }

    #[test]
    fn test_clean_cache_miss() {
        let mut fx = Fixture::new();
        fx.cache.init();
        let input = fx.file("a.scss", "$x:1");
        let output = fx.dir.path().join("a.css");

        assert!(fx.cache.needs_rebuild(&input, &output, &[]));
    }

    #[test]
    fn test_hit_after_build() {
        let mut fx = Fixture::new();
        let input = fx.file("a.scss", "$x:1");
        let output = fx.file("a.css", ".x{}");

        fx.cache.update_cache(&input, &output, &[]);
        assert!(!fx.cache.needs_rebuild(&input, &output, &[]));
    }

    #[test]
    fn test_idempotent_check() {
        let mut fx = Fixture::new();
        let input = fx.file("a.scss", "$x:1");
        let output = fx.file("a.css", ".x{}");

        let first = fx.cache.needs_rebuild(&input, &output, &[]);
        assert_eq!(first, fx.cache.needs_rebuild(&input, &output, &[]));

        fx.cache.update_cache(&input, &output, &[]);
        let first = fx.cache.needs_rebuild(&input, &output, &[]);
        assert_eq!(first, fx.cache.needs_rebuild(&input, &output, &[]));
    }

    #[test]
    fn test_input_byte_change_detected() {
        let mut fx = Fixture::new();
        let input = fx.file("a.scss", "$x:1");
        let output = fx.file("a.css", ".x{}");
        fx.cache.update_cache(&input, &output, &[]);

        fs::write(&input, "$x:2").unwrap();
        assert!(fx.cache.needs_rebuild(&input, &output, &[]));
    }

    #[test]
    fn test_dependency_triggered_rebuild() {
        let mut fx = Fixture::new();
        let input = fx.file("a.scss", "@import 'vars';");
        let vars = fx.file("_vars.scss", "$c: red;");
        let output = fx.file("a.css", "");
        let deps = vec![vars.clone()];

        fx.cache.update_cache(&input, &output, &deps);
        assert!(!fx.cache.needs_rebuild(&input, &output, &deps));

        fs::write(&vars, "$c: red;;").unwrap();
        assert!(fx.cache.needs_rebuild(&input, &output, &deps));
    }

    #[test]
    fn test_new_dependency_counts_as_changed() {
        let mut fx = Fixture::new();
        let input = fx.file("a.js", "import './b.js'");
        let b = fx.file("b.js", "");
        let output = fx.file("dist/a.js", "");

        fx.cache.update_cache(&input, &output, &[]);
        assert!(fx.cache.needs_rebuild(&input, &output, &[b]));
    }

    #[test]
    fn test_removed_dependency_ignored() {
        let mut fx = Fixture::new();
        let input = fx.file("a.js", "");
        let b = fx.file("b.js", "");
        let output = fx.file("dist/a.js", "");

        fx.cache.update_cache(&input, &output, &[b]);
        assert!(!fx.cache.needs_rebuild(&input, &output, &[]));
    }

    #[test]
    fn test_missing_output_forces_rebuild() {
        let mut fx = Fixture::new();
        let input = fx.file("a.scss", "");
        let output = fx.file("a.css", "");
        fx.cache.update_cache(&input, &output, &[]);

        fs::remove_file(&output).unwrap();
        assert!(fx.cache.needs_rebuild(&input, &output, &[]));
    }

    #[test]
    fn test_bypass_and_disabled() {
        let mut fx = Fixture::new();
        let input = fx.file("a.scss", "");
        let output = fx.file("a.css", "");
        fx.cache.update_cache(&input, &output, &[]);

        fx.cache.set_bypass(true);
        assert!(fx.cache.needs_rebuild(&input, &output, &[]));

        fx.cache.set_bypass(false);
        assert!(!fx.cache.needs_rebuild(&input, &output, &[]));
    }

    #[test]
    fn test_invalidate_file_removes_exactly_referencing_entries() {
        let mut fx = Fixture::new();
        let vars = fx.file("_vars.scss", "");
        let a = fx.file("a.scss", "");
        let b = fx.file("b.scss", "");
        let c = fx.file("c.scss", "");
        let out = |n: &str| fx.file(n, "");
        let (oa, ob, oc) = (out("a.css"), out("b.css"), out("c.css"));

        fx.cache.update_cache(&a, &oa, &[vars.clone()]);
        fx.cache.update_cache(&b, &ob, &[]);
        fx.cache.update_cache(&c, &oc, &[vars.clone()]);
        fx.cache.update_cache(&vars, &fx.dir.path().join("vars.css"), &[]);

        let removed = fx.cache.invalidate_file(&vars);
        assert_eq!(removed, 3);
        assert!(fx.cache.entry(&b, &ob).is_some());
        assert!(fx.cache.entry(&a, &oa).is_none());
        assert!(fx.cache.entry(&c, &oc).is_none());
        assert_eq!(fx.cache.stats().entries, 1);
    }

    #[test]
    fn test_invalidate_dir() {
        let mut fx = Fixture::new();
        let json = fx.file("blocks/hero/block.json", "{}");
        let other = fx.file("blocks/card/block.json", "{}");
        let out = fx.file("dist/blocks/hero/index.js", "");
        let out2 = fx.file("dist/blocks/card/index.js", "");
        fx.cache.update_cache(&json, &out, &[]);
        fx.cache.update_cache(&other, &out2, &[]);

        assert_eq!(fx.cache.invalidate_dir(&fx.dir.path().join("blocks/hero")), 1);
        assert!(fx.cache.entry(&other, &out2).is_some());
    }

    #[test]
    fn test_stale_pruning() {
        let mut fx = Fixture::new();
        let kept = fx.file("kept.scss", "");
        let kept_out = fx.file("kept.css", "");
        fx.cache.update_cache(&kept, &kept_out, &[]);

        let gone = fx.dir.path().join("gone.scss");
        let old = CacheEntry {
            cache_key: "old".into(),
            input_file: gone,
            output_file: fx.dir.path().join("gone.css"),
            input_hash: String::new(),
            dependencies: BTreeMap::new(),
            timestamp: now_millis() - 8 * MILLIS_PER_DAY,
        };
        fx.cache.manifest_mut().entries.insert("old".into(), old);

        assert_eq!(fx.cache.clean_stale_entries(), 1);
        assert!(fx.cache.entry(&kept, &kept_out).is_some());
    }

    #[test]
    fn test_old_entry_with_existing_input_pruned() {
        let mut fx = Fixture::new();
        let input = fx.file("a.scss", "");
        let output = fx.file("a.css", "");
        fx.cache.update_cache(&input, &output, &[]);
        for entry in fx.cache.manifest_mut().entries.values_mut() {
            entry.timestamp -= 30 * MILLIS_PER_DAY;
        }

        assert_eq!(fx.cache.clean_stale_entries(), 1);
    }

    #[test]
    fn test_persist_and_reload() {
        let mut fx = Fixture::new();
        let input = fx.file("a.scss", "");
        let output = fx.file("a.css", "");
        fx.cache.update_cache(&input, &output, &[]);

        let mut reloaded = BuildCache::new(fx.dir.path(), &fx.dir.path().join(".cache/build-cache.json"));
        assert_eq!(reloaded.init(), 0);
        assert!(!reloaded.needs_rebuild(&input, &output, &[]));
    }

    #[test]
    fn test_corrupt_manifest_starts_fresh() {
        let mut fx = Fixture::new();
        fx.file(".cache/build-cache.json", "garbage");
        assert_eq!(fx.cache.init(), 0);
        assert_eq!(fx.cache.stats().entries, 0);
    }

    #[test]
    fn test_clear_removes_manifest() {
        let mut fx = Fixture::new();
        let input = fx.file("a.scss", "");
        let output = fx.file("a.css", "");
        fx.cache.update_cache(&input, &output, &[]);
        let path = fx.cache.stats().path;
        assert!(path.exists());

        fx.cache.clear().unwrap();
        assert!(!path.exists());
        assert_eq!(fx.cache.stats().entries, 0);
        // clearing twice is fine
        fx.cache.clear().unwrap();
    }
}
