//! Unit → file dependency graph for one watch session.

use rustc_hash::{FxHashMap, FxHashSet};
use std::path::{Path, PathBuf};

/// Maps build units to the files they depend on, and files back to units.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    units: FxHashMap<String, Vec<PathBuf>>,
    reverse: FxHashMap<PathBuf, FxHashSet<String>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the file list of `unit`. Duplicates are dropped, first occurrence wins.
    pub fn set(&mut self, unit: &str, files: impl IntoIterator<Item = PathBuf>) {
        self.remove(unit);

        let mut seen = FxHashSet::default();
        let files: Vec<PathBuf> = files
            .into_iter()
            .filter(|f| seen.insert(f.clone()))
            .collect();

        for file in &files {
            self.reverse
                .entry(file.clone())
                .or_default()
                .insert(unit.to_string());
        }
        self.units.insert(unit.to_string(), files);
    }

    pub fn remove(&mut self, unit: &str) {
        let Some(files) = self.units.remove(unit) else {
            return;
        };
        for file in files {
            if let Some(owners) = self.reverse.get_mut(&file) {
                owners.remove(unit);
                if owners.is_empty() {
                    self.reverse.remove(&file);
                }
            }
        }
    }

    pub fn clear(&mut self) {
        self.units.clear();
        self.reverse.clear();
    }

    pub fn files(&self, unit: &str) -> &[PathBuf] {
        self.units.get(unit).map(Vec::as_slice).unwrap_or_default()
    }

    /// Units depending on `path`, sorted by name.
    pub fn units_for(&self, path: &Path) -> Vec<String> {
        let mut units: Vec<String> = self
            .reverse
            .get(path)
            .map(|owners| owners.iter().cloned().collect())
            .unwrap_or_default();
        units.sort();
        units
    }

    /// Units depending on anything below `dir`, sorted by name.
    pub fn units_under(&self, dir: &Path) -> Vec<String> {
        let mut units: Vec<String> = self
            .units
            .iter()
            .filter(|(_, files)| files.iter().any(|f| f.starts_with(dir)))
            .map(|(unit, _)| unit.clone())
            .collect();
        units.sort();
        units
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}
