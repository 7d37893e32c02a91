//! PHP linting and HTML template formatting.
//!
//! Both check or rewrite sources in place: a unit's output is its input, so
//! the cache records the file as it looks after the tool ran.

use super::{BuildUnit, ComponentEnv, ComponentKind, UnitSource, has_extension, unit_label, walk_files};
use crate::{action::BuildAction, config::PathsConfig};
use std::{path::PathBuf, sync::Arc};

pub struct InPlaceSource {
    kind: ComponentKind,
    root: PathBuf,
    dirs: Vec<PathBuf>,
    extension: &'static str,
    paths: PathsConfig,
    command: Option<Arc<dyn BuildAction>>,
}

impl InPlaceSource {
    pub fn new(kind: ComponentKind, env: &ComponentEnv) -> Self {
        let paths = env.config.paths.clone();
        let (dirs, extension) = match kind {
            ComponentKind::Html => (paths.templates.clone(), "html"),
            _ => (paths.php.clone(), "php"),
        };
        Self {
            kind,
            root: env.config.get_root().to_path_buf(),
            dirs,
            extension,
            command: env.command(kind),
            paths,
        }
    }
}

impl UnitSource for InPlaceSource {
    fn kind(&self) -> ComponentKind {
        self.kind
    }

    fn roots(&self) -> Vec<PathBuf> {
        self.dirs.clone()
    }

    fn units(&self) -> Vec<BuildUnit> {
        let mut files: Vec<PathBuf> = self
            .dirs
            .iter()
            .flat_map(|dir| {
                walk_files(dir, usize::MAX, &self.paths, |path| {
                    has_extension(path, &[self.extension])
                })
            })
            .collect();
        files.sort();
        files.dedup();

        files
            .into_iter()
            .map(|file| BuildUnit::new(unit_label(&self.root, &file), &file, &file))
            .collect()
    }

    fn action(&self, _unit: &BuildUnit) -> Option<Arc<dyn BuildAction>> {
        self.command.clone()
    }
}
