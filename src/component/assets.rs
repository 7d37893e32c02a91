//! Images and fonts: every file below the source directory, mirrored into
//! `<output>/images` or `<output>/fonts`.
//!
//! Without a configured command the file is copied as is.

use super::{BuildUnit, ComponentEnv, ComponentKind, UnitSource, unit_label, walk_files};
use crate::{
    action::{BuildAction, CopyFrom},
    config::PathsConfig,
};
use std::{path::PathBuf, sync::Arc};

pub struct FileSource {
    kind: ComponentKind,
    dir: PathBuf,
    output: PathBuf,
    paths: PathsConfig,
    action: Arc<dyn BuildAction>,
}

impl FileSource {
    pub fn new(kind: ComponentKind, env: &ComponentEnv) -> Self {
        let paths = env.config.paths.clone();
        let dir = match kind {
            ComponentKind::Fonts => paths.fonts.clone(),
            _ => paths.images.clone(),
        };
        Self {
            kind,
            dir,
            output: paths.output.join(kind.name()),
            action: env.command_or_copy(kind, CopyFrom::Input),
            paths,
        }
    }
}

impl UnitSource for FileSource {
    fn kind(&self) -> ComponentKind {
        self.kind
    }

    fn roots(&self) -> Vec<PathBuf> {
        vec![self.dir.clone()]
    }

    fn units(&self) -> Vec<BuildUnit> {
        walk_files(&self.dir, usize::MAX, &self.paths, |_| true)
            .into_iter()
            .map(|input| {
                let name = unit_label(&self.dir, &input);
                let output = self.output.join(&name);
                BuildUnit::new(name, &input, &output)
            })
            .collect()
    }

    fn action(&self, _unit: &BuildUnit) -> Option<Arc<dyn BuildAction>> {
        Some(Arc::clone(&self.action))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cache::BuildCache,
        component::{AssetComponent, Component},
        config::ThemeConfig,
    };
    use std::fs;
    use tempfile::TempDir;

    fn env(root: &std::path::Path) -> ComponentEnv {
        let mut config = ThemeConfig::default();
        config.paths.root = Some(root.to_path_buf());
        config.paths.fonts = root.join("src/fonts");
        config.paths.images = root.join("src/images");
        config.paths.output = root.join("dist");
        let cache = BuildCache::new(root, &root.join(".themewright/m.json")).shared();
        ComponentEnv::new(Arc::new(config), cache)
    }

    #[test]
    fn test_units_mirror_tree() {
        let dir = TempDir::new().unwrap();
        let fonts = dir.path().join("src/fonts");
        fs::create_dir_all(fonts.join("inter")).unwrap();
        fs::write(fonts.join("inter/inter.woff2"), "").unwrap();
        fs::write(fonts.join("inter/inter.woff2~"), "").unwrap();

        let units = FileSource::new(ComponentKind::Fonts, &env(dir.path())).units();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].name, "inter/inter.woff2");
        assert_eq!(units[0].output, dir.path().join("dist/fonts/inter/inter.woff2"));
    }

    #[tokio::test]
    async fn test_copy_fallback_then_fresh() {
        let dir = TempDir::new().unwrap();
        let images = dir.path().join("src/images");
        fs::create_dir_all(&images).unwrap();
        fs::write(images.join("logo.svg"), "<svg/>").unwrap();

        let env = env(dir.path());
        let comp = AssetComponent::new(FileSource::new(ComponentKind::Images, &env), &env);

        let first = comp.process().await.unwrap();
        assert_eq!(first.built, 1);
        assert_eq!(
            fs::read_to_string(dir.path().join("dist/images/logo.svg")).unwrap(),
            "<svg/>"
        );

        let second = comp.process().await.unwrap();
        assert_eq!((second.built, second.fresh), (0, 1));
    }
}
