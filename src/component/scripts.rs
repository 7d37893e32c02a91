//! Scripts: top-level entries → `<output>/js/<stem>.js`.

use super::{BuildUnit, ComponentEnv, ComponentKind, UnitSource, has_extension, walk_files};
use crate::{action::BuildAction, config::PathsConfig, deps::DependencyResolver};
use std::{path::PathBuf, sync::Arc};

const ENTRY_EXTENSIONS: &[&str] = &["js", "jsx", "ts", "tsx", "mjs"];

pub struct ScriptSource {
    dir: PathBuf,
    output: PathBuf,
    paths: PathsConfig,
    resolver: Arc<DependencyResolver>,
    command: Option<Arc<dyn BuildAction>>,
}

impl ScriptSource {
    pub fn new(env: &ComponentEnv) -> Self {
        let paths = env.config.paths.clone();
        Self {
            dir: paths.scripts.clone(),
            output: paths.output.join("js"),
            resolver: Arc::clone(&env.resolver),
            command: env.command(ComponentKind::Scripts),
            paths,
        }
    }
}

impl UnitSource for ScriptSource {
    fn kind(&self) -> ComponentKind {
        ComponentKind::Scripts
    }

    fn roots(&self) -> Vec<PathBuf> {
        vec![self.dir.clone()]
    }

    fn units(&self) -> Vec<BuildUnit> {
        walk_files(&self.dir, 1, &self.paths, |path| {
            has_extension(path, ENTRY_EXTENSIONS) && !path.to_string_lossy().ends_with(".d.ts")
        })
        .into_iter()
        .filter_map(|input| {
            let name = input.file_name()?.to_string_lossy().into_owned();
            let stem = input.file_stem()?.to_string_lossy().into_owned();
            Some(BuildUnit::new(name, &input, &self.output.join(format!("{stem}.js"))))
        })
        .collect()
    }

    fn action(&self, _unit: &BuildUnit) -> Option<Arc<dyn BuildAction>> {
        self.command.clone()
    }

    fn dependencies(&self, unit: &BuildUnit) -> Vec<PathBuf> {
        self.resolver.resolve(&unit.input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{cache::BuildCache, config::ThemeConfig};
    use std::fs;
    use tempfile::TempDir;

    fn source(root: &std::path::Path) -> ScriptSource {
        let mut config = ThemeConfig::default();
        config.paths.root = Some(root.to_path_buf());
        config.paths.scripts = root.join("src/scripts");
        config.paths.output = root.join("dist");
        let cache = BuildCache::new(root, &root.join(".themewright/m.json")).shared();
        ScriptSource::new(&ComponentEnv::new(Arc::new(config), cache))
    }

    #[test]
    fn test_entries_and_outputs() {
        let dir = TempDir::new().unwrap();
        let scripts = dir.path().join("src/scripts");
        fs::create_dir_all(scripts.join("lib")).unwrap();
        for file in ["app.ts", "editor.jsx", "types.d.ts", "lib/util.js", "data.json"] {
            fs::write(scripts.join(file), "").unwrap();
        }

        let units = source(dir.path()).units();
        let names: Vec<_> = units.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(names, vec!["app.ts", "editor.jsx"]);
        assert_eq!(units[0].output, dir.path().join("dist/js/app.js"));
    }

    #[test]
    fn test_nested_modules_are_dependencies() {
        let dir = TempDir::new().unwrap();
        let scripts = dir.path().join("src/scripts");
        fs::create_dir_all(scripts.join("lib")).unwrap();
        fs::write(scripts.join("app.js"), "import { a } from './lib/util';").unwrap();
        fs::write(scripts.join("lib/util.js"), "export const a = 1;").unwrap();

        let source = source(dir.path());
        let app = source.units().remove(0);
        let deps = source.dependencies(&app);
        assert_eq!(deps.len(), 1);
        assert!(deps[0].ends_with("lib/util.js"));
    }
}
