//! Static import discovery for styles and scripts.
//!
//! A deliberately approximate scanner: regexes over comment-stripped source,
//! no real parsing. Re-exports (`export * from`), conditional requires and
//! computed specifiers are not followed. Every reported path exists on disk.
//!
//! # Traversal
//!
//! ```text
//! resolve(a.scss)           a.scss ──► _vars.scss ──► _colors.scss
//!   = [_vars, _colors, _mix]   │
//!                               └────► _mix.scss ──► _vars.scss (visited)
//! ```
//!
//! Depth-first with a visited set, so cycles terminate and every file is
//! reported once, in discovery order.

mod graph;
pub mod script;
pub mod style;

pub use graph::DependencyGraph;

use crate::config::ThemeConfig;
use regex::Regex;
use rustc_hash::FxHashSet;
use std::{
    fs, io,
    path::{Path, PathBuf},
    sync::LazyLock,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("failed to read `{0}`")]
    Read(PathBuf, #[source] io::Error),
}

static BLOCK_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)/\*.*?\*/").expect("valid block comment regex"));

static LINE_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*//.*$").expect("valid line comment regex"));

/// Remove `/* ... */` blocks and whole-line `//` comments.
pub fn strip_comments(source: &str) -> String {
    let without_blocks = BLOCK_COMMENT.replace_all(source, "");
    LINE_COMMENT.replace_all(&without_blocks, "").into_owned()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceKind {
    Style,
    Script,
}

impl SourceKind {
    fn of(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?;
        if style::STYLE_EXTENSIONS.contains(&ext) {
            Some(Self::Style)
        } else if script::SCANNED_EXTENSIONS.contains(&ext) {
            Some(Self::Script)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone)]
pub struct DependencyResolver {
    root: PathBuf,
    style_load_paths: Vec<PathBuf>,
}

impl DependencyResolver {
    pub fn new(root: &Path, style_load_paths: &[PathBuf]) -> Self {
        Self {
            root: root.to_path_buf(),
            style_load_paths: style_load_paths.to_vec(),
        }
    }

    pub fn from_config(config: &ThemeConfig) -> Self {
        Self::new(config.get_root(), &config.build.style_load_paths)
    }

    /// Transitive imports of `path`; empty when it cannot be read.
    pub fn resolve(&self, path: &Path) -> Vec<PathBuf> {
        self.try_resolve(path).unwrap_or_default()
    }

    /// Transitive imports of `path`.
    ///
    /// Only the root file being unreadable is an error; unreadable imports
    /// simply contribute nothing further.
    pub fn try_resolve(&self, path: &Path) -> Result<Vec<PathBuf>, ResolveError> {
        let source =
            fs::read_to_string(path).map_err(|e| ResolveError::Read(path.to_path_buf(), e))?;

        let root = canonical(path);
        let mut visited = FxHashSet::default();
        visited.insert(root.clone());

        let mut found = Vec::new();
        let mut reported = FxHashSet::default();

        // Last pushed is expanded first; imports are pushed reversed to keep source order
        let mut stack: Vec<PathBuf> = self.direct_imports(&root, &source);
        stack.reverse();

        while let Some(dep) = stack.pop() {
            if !reported.insert(dep.clone()) {
                continue;
            }
            found.push(dep.clone());

            if visited.insert(dep.clone())
                && let Ok(source) = fs::read_to_string(&dep)
            {
                let mut imports = self.direct_imports(&dep, &source);
                imports.reverse();
                stack.extend(imports);
            }
        }

        Ok(found)
    }

    /// Existing files directly imported by `file`.
    pub fn direct_imports(&self, file: &Path, source: &str) -> Vec<PathBuf> {
        let Some(kind) = SourceKind::of(file) else {
            return Vec::new();
        };
        let source = strip_comments(source);
        let dir = file.parent().unwrap_or(&self.root);

        match kind {
            SourceKind::Style => style::scan(&source)
                .iter()
                .filter_map(|spec| self.resolve_style(dir, spec))
                .collect(),
            SourceKind::Script => script::scan(&source)
                .iter()
                .filter_map(|spec| first_existing(script::candidates(&self.root, dir, spec)))
                .collect(),
        }
    }

    /// Importing directory first, then each load path.
    fn resolve_style(&self, dir: &Path, spec: &str) -> Option<PathBuf> {
        std::iter::once(dir)
            .chain(self.style_load_paths.iter().map(PathBuf::as_path))
            .find_map(|base| first_existing(style::candidates(base, spec)))
    }
}

fn first_existing(candidates: Vec<PathBuf>) -> Option<PathBuf> {
    candidates
        .into_iter()
        .find(|c| c.is_file())
        .map(|c| canonical(&c))
}

/// Absolute, symlink-free form when the file exists.
fn canonical(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                dir: TempDir::new().unwrap(),
            }
        }

        fn file(&self, name: &str, content: &str) -> PathBuf {
            let path = self.dir.path().join(name);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, content).unwrap();
            path.canonicalize().unwrap()
        }

        fn resolver(&self) -> DependencyResolver {
            DependencyResolver::new(&self.dir.path().canonicalize().unwrap(), &[])
        }
    }

    #[test]
    fn test_style_partials_transitive() {
        let fx = Fixture::new();
        let main = fx.file("styles/main.scss", "@use 'abstracts/vars';\n@import 'mixins';\n");
        let vars = fx.file("styles/abstracts/_vars.scss", "@forward 'colors';\n");
        let colors = fx.file("styles/abstracts/_colors.scss", "$c: red;\n");
        let mixins = fx.file("styles/_mixins.scss", "@use 'abstracts/vars';\n");

        assert_eq!(fx.resolver().resolve(&main), vec![vars, colors, mixins]);
    }

    #[test]
    fn test_style_index_and_load_path() {
        let fx = Fixture::new();
        let main = fx.file("src/main.scss", "@use 'grid';\n@use 'vendor-lib';\n");
        let grid = fx.file("src/grid/_index.scss", "");
        let vendor = fx.file("node_modules/_vendor-lib.scss", "");

        let root = fx.dir.path().canonicalize().unwrap();
        let resolver = DependencyResolver::new(&root, &[root.join("node_modules")]);
        assert_eq!(resolver.resolve(&main), vec![grid, vendor]);
    }

    #[test]
    fn test_cycle_terminates() {
        let fx = Fixture::new();
        let a = fx.file("a.scss", "@import 'b';\n");
        let b = fx.file("b.scss", "@import 'a';\n@import 'c';\n");
        let c = fx.file("c.scss", "");

        let deps = fx.resolver().resolve(&a);
        assert_eq!(deps, vec![b, a.clone(), c]);
        assert_eq!(deps.iter().filter(|d| **d == a).count(), 1);
    }

    #[test]
    fn test_script_extension_probing() {
        let fx = Fixture::new();
        let entry = fx.file(
            "js/index.js",
            "import { x } from './util';\nimport cfg from '/config/site.json';\nconst c = require('./components');\n",
        );
        let util = fx.file("js/util.ts", "export const x = 1;\n");
        let cfg = fx.file("config/site.json", "{}");
        let comp = fx.file("js/components/index.jsx", "import '../util';\n");

        assert_eq!(fx.resolver().resolve(&entry), vec![util, cfg, comp]);
    }

    #[test]
    fn test_bare_and_missing_dropped() {
        let fx = Fixture::new();
        let entry = fx.file(
            "index.js",
            "import React from 'react';\nimport gone from './missing';\n",
        );
        assert!(fx.resolver().resolve(&entry).is_empty());
    }

    #[test]
    fn test_comments_stripped() {
        let fx = Fixture::new();
        let entry = fx.file(
            "main.scss",
            "// @import 'old';\n/* @import 'older'; */\n@import 'live';\n",
        );
        fx.file("_old.scss", "");
        fx.file("_older.scss", "");
        let live = fx.file("_live.scss", "");

        assert_eq!(fx.resolver().resolve(&entry), vec![live]);
    }

    #[test]
    fn test_unreadable_root() {
        let fx = Fixture::new();
        let missing = fx.dir.path().join("nope.js");
        assert!(matches!(
            fx.resolver().try_resolve(&missing),
            Err(ResolveError::Read(..))
        ));
        assert!(fx.resolver().resolve(&missing).is_empty());
    }

    #[test]
    fn test_style_imported_from_script() {
        let fx = Fixture::new();
        let entry = fx.file("edit.js", "import './editor.scss';\n");
        let editor = fx.file("editor.scss", "@use 'vars';\n");
        let vars = fx.file("_vars.scss", "");

        assert_eq!(fx.resolver().resolve(&entry), vec![editor, vars]);
    }
}
