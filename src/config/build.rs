//! `[build]` section configuration.
//!
//! Selects the active components and the external command each family runs.

use super::defaults;
use crate::component::ComponentKind;
use educe::Educe;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// `[build]` section in themewright.toml.
///
/// # Example
/// ```toml
/// [build]
/// components = ["cache", "styles", "scripts", "server"]
/// style_load_paths = ["node_modules"]
///
/// [build.commands]
/// styles = ["sass", "--style=compressed", "{input}", "{output}"]
/// images = []   # empty: plain copy
/// ```
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(default, deny_unknown_fields)]
pub struct BuildConfig {
    /// Components run by default (narrowed further by `--builds`).
    #[serde(default = "defaults::build::components")]
    #[educe(Default = defaults::build::components())]
    pub components: Vec<ComponentKind>,

    /// Extra directories searched for style imports, relative to the root.
    #[serde(default = "defaults::build::style_load_paths")]
    #[educe(Default = defaults::build::style_load_paths())]
    pub style_load_paths: Vec<PathBuf>,

    /// External command per asset family.
    #[serde(default)]
    pub commands: CommandsConfig,
}

/// `[build.commands]` - argv templates.
///
/// Placeholders: `{input}`, `{output}`, `{name}`, `{root}`.
/// An empty list means "no external tool": copy families copy the file,
/// format families skip the unit.
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(default, deny_unknown_fields)]
pub struct CommandsConfig {
    #[serde(default = "defaults::build::styles")]
    #[educe(Default = defaults::build::styles())]
    pub styles: Vec<String>,

    #[serde(default = "defaults::build::scripts")]
    #[educe(Default = defaults::build::scripts())]
    pub scripts: Vec<String>,

    #[serde(default = "defaults::build::none")]
    #[educe(Default = defaults::build::none())]
    pub images: Vec<String>,

    #[serde(default = "defaults::build::none")]
    #[educe(Default = defaults::build::none())]
    pub fonts: Vec<String>,

    #[serde(default = "defaults::build::blocks")]
    #[educe(Default = defaults::build::blocks())]
    pub blocks: Vec<String>,

    #[serde(default = "defaults::build::php")]
    #[educe(Default = defaults::build::php())]
    pub php: Vec<String>,

    #[serde(default = "defaults::build::html")]
    #[educe(Default = defaults::build::html())]
    pub html: Vec<String>,
}

impl CommandsConfig {
    /// Command for a component family, `None` for families without one.
    pub fn for_kind(&self, kind: ComponentKind) -> Option<&[String]> {
        let command = match kind {
            ComponentKind::Styles => &self.styles,
            ComponentKind::Scripts => &self.scripts,
            ComponentKind::Images => &self.images,
            ComponentKind::Fonts => &self.fonts,
            ComponentKind::Blocks => &self.blocks,
            ComponentKind::Php => &self.php,
            ComponentKind::Html => &self.html,
            _ => return None,
        };
        Some(command.as_slice())
    }
}
