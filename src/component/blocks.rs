//! Blocks: every directory holding a `block.json` is one unit.
//!
//! A block depends on every file of its directory plus whatever its scripts
//! and styles import from elsewhere. Editors save several block files at
//! once, so block units are debounced with `[watch] debounce_ms`.

use super::{BuildUnit, ComponentEnv, ComponentKind, UnitSource, has_extension, unit_label, walk_files};
use crate::{
    action::{BuildAction, CopyFrom},
    config::PathsConfig,
    deps::{DependencyResolver, script::SCANNED_EXTENSIONS, style::STYLE_EXTENSIONS},
};
use std::{path::PathBuf, sync::Arc, time::Duration};

const MANIFEST: &str = "block.json";

pub struct BlockSource {
    dir: PathBuf,
    output: PathBuf,
    paths: PathsConfig,
    resolver: Arc<DependencyResolver>,
    action: Arc<dyn BuildAction>,
    window: Duration,
}

impl BlockSource {
    pub fn new(env: &ComponentEnv) -> Self {
        let paths = env.config.paths.clone();
        Self {
            dir: paths.blocks.clone(),
            output: paths.output.join("blocks"),
            resolver: Arc::clone(&env.resolver),
            action: env.command_or_copy(ComponentKind::Blocks, CopyFrom::InputDir),
            window: env.config.watch.debounce(),
            paths,
        }
    }
}

impl UnitSource for BlockSource {
    fn kind(&self) -> ComponentKind {
        ComponentKind::Blocks
    }

    fn roots(&self) -> Vec<PathBuf> {
        vec![self.dir.clone()]
    }

    fn units(&self) -> Vec<BuildUnit> {
        walk_files(&self.dir, 2, &self.paths, |path| {
            path.file_name().is_some_and(|name| name == MANIFEST)
        })
        .into_iter()
        .filter_map(|manifest| {
            let block_dir = manifest.parent()?;
            let mut name = unit_label(&self.dir, block_dir);
            if name.is_empty() {
                name = block_dir.file_name()?.to_string_lossy().into_owned();
            }
            let output = self.output.join(&name);
            Some(BuildUnit::new(name, &manifest, &output))
        })
        .collect()
    }

    fn action(&self, _unit: &BuildUnit) -> Option<Arc<dyn BuildAction>> {
        Some(Arc::clone(&self.action))
    }

    fn dependencies(&self, unit: &BuildUnit) -> Vec<PathBuf> {
        let Some(block_dir) = unit.input.parent() else {
            return Vec::new();
        };

        let files = walk_files(block_dir, usize::MAX, &self.paths, |_| true);
        let mut deps = Vec::with_capacity(files.len());
        for file in files {
            let scanned = has_extension(&file, SCANNED_EXTENSIONS)
                || has_extension(&file, STYLE_EXTENSIONS);
            let imports = if scanned {
                self.resolver.resolve(&file)
            } else {
                Vec::new()
            };
            if file != unit.input {
                deps.push(file);
            }
            deps.extend(imports);
        }
        deps
    }

    fn window(&self) -> Duration {
        self.window
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{cache::BuildCache, config::ThemeConfig};
    use std::{fs, path::Path};
    use tempfile::TempDir;

    fn source(root: &Path) -> BlockSource {
        let mut config = ThemeConfig::default();
        config.paths.root = Some(root.to_path_buf());
        config.paths.blocks = root.join("src/blocks");
        config.paths.output = root.join("dist");
        let cache = BuildCache::new(root, &root.join(".themewright/m.json")).shared();
        BlockSource::new(&ComponentEnv::new(Arc::new(config), cache))
    }

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_one_unit_per_block_dir() {
        let dir = TempDir::new().unwrap();
        let blocks = dir.path().join("src/blocks");
        write(&blocks.join("hero/block.json"), "{}");
        write(&blocks.join("card/block.json"), "{}");
        write(&blocks.join("card/deep/nested/block.json"), "{}");
        write(&blocks.join("shared/util.js"), "");

        let source = source(dir.path());
        let units = source.units();
        let names: Vec<_> = units.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(names, vec!["card", "hero"]);
        assert_eq!(units[1].output, dir.path().join("dist/blocks/hero"));
        assert_eq!(source.window(), Duration::from_millis(500));
    }

    #[test]
    fn test_dependencies_cover_dir_and_imports() {
        let dir = TempDir::new().unwrap();
        let blocks = dir.path().join("src/blocks");
        write(&blocks.join("hero/block.json"), "{}");
        write(&blocks.join("hero/index.js"), "import '../shared/util';");
        write(&blocks.join("hero/style.scss"), "");
        write(&blocks.join("shared/util.js"), "");

        let source = source(dir.path());
        let hero = source.units().remove(0);
        let deps = source.dependencies(&hero);

        assert!(deps.iter().any(|d| d.ends_with("hero/index.js")));
        assert!(deps.iter().any(|d| d.ends_with("hero/style.scss")));
        assert!(deps.iter().any(|d| d.ends_with("shared/util.js")));
        assert!(!deps.contains(&hero.input));
    }
}
