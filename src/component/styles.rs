//! Styles: top-level `.scss`/`.sass`/`.css` entries → `<output>/css/<stem>.css`.
//!
//! When `theme.json` exists its palette, font sizes and spacing scale are
//! turned into a `_theme-vars.scss` partial. That unit is a prerequisite:
//! it is generated before any entry compiles.

use super::{BoxFuture, BuildUnit, ComponentEnv, ComponentKind, UnitSource, has_extension, is_partial, walk_files};
use crate::{
    action::{ActionOutcome, BuildAction},
    config::PathsConfig,
    deps::{DependencyResolver, style::STYLE_EXTENSIONS},
};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::{
    fmt::Write as _,
    fs,
    path::{Path, PathBuf},
    sync::Arc,
    time::Instant,
};

pub const THEME_VARS_FILE: &str = "_theme-vars.scss";
const THEME_UNIT: &str = "theme.json";

pub struct StyleSource {
    dir: PathBuf,
    output: PathBuf,
    theme_json: PathBuf,
    paths: PathsConfig,
    resolver: Arc<DependencyResolver>,
    command: Option<Arc<dyn BuildAction>>,
}

impl StyleSource {
    pub fn new(env: &ComponentEnv) -> Self {
        let paths = env.config.paths.clone();
        Self {
            dir: paths.styles.clone(),
            output: paths.output.join("css"),
            theme_json: paths.theme_json.clone(),
            resolver: Arc::clone(&env.resolver),
            command: env.command(ComponentKind::Styles),
            paths,
        }
    }

    fn theme_unit(&self) -> BuildUnit {
        BuildUnit::new(THEME_UNIT, &self.theme_json, &self.dir.join(THEME_VARS_FILE))
    }
}

impl UnitSource for StyleSource {
    fn kind(&self) -> ComponentKind {
        ComponentKind::Styles
    }

    fn roots(&self) -> Vec<PathBuf> {
        vec![self.dir.clone(), self.theme_json.clone()]
    }

    fn units(&self) -> Vec<BuildUnit> {
        let mut units = Vec::new();
        if self.theme_json.is_file() {
            units.push(self.theme_unit());
        }

        let entries = walk_files(&self.dir, 1, &self.paths, |path| {
            has_extension(path, STYLE_EXTENSIONS) && !is_partial(path)
        });
        units.extend(entries.into_iter().filter_map(|input| {
            let name = input.file_name()?.to_string_lossy().into_owned();
            let stem = input.file_stem()?.to_string_lossy().into_owned();
            Some(BuildUnit::new(name, &input, &self.output.join(format!("{stem}.css"))))
        }));
        units
    }

    fn action(&self, unit: &BuildUnit) -> Option<Arc<dyn BuildAction>> {
        if self.is_prerequisite(unit) {
            return Some(Arc::new(ThemeVarsAction));
        }
        self.command.clone()
    }

    fn dependencies(&self, unit: &BuildUnit) -> Vec<PathBuf> {
        if self.is_prerequisite(unit) {
            return Vec::new();
        }
        self.resolver.resolve(&unit.input)
    }

    fn is_prerequisite(&self, unit: &BuildUnit) -> bool {
        unit.name == THEME_UNIT && unit.input == self.theme_json
    }
}

// ============================================================================
// Theme variables
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ThemeJson {
    settings: Settings,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Settings {
    color: ColorSettings,
    typography: TypographySettings,
    spacing: SpacingSettings,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ColorSettings {
    palette: Vec<Preset>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct TypographySettings {
    font_sizes: Vec<Preset>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SpacingSettings {
    spacing_sizes: Vec<Preset>,
}

/// One preset; the value sits under `color` or `size` depending on the list.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Preset {
    slug: String,
    color: Option<String>,
    size: Option<serde_json::Value>,
}

impl Preset {
    fn value(&self) -> Option<String> {
        if let Some(color) = &self.color {
            return Some(color.clone());
        }
        match self.size.as_ref()? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// Render the variables partial from `theme.json` content.
pub fn render_theme_vars(json: &str) -> Result<String> {
    let theme: ThemeJson = serde_json::from_str(json).context("invalid theme.json")?;
    let settings = &theme.settings;

    let mut out = String::from("// Generated from theme.json, do not edit.\n");
    let groups = [
        ("color", &settings.color.palette),
        ("font-size", &settings.typography.font_sizes),
        ("spacing", &settings.spacing.spacing_sizes),
    ];
    for (prefix, presets) in groups {
        for preset in presets.iter().filter(|p| !p.slug.is_empty()) {
            if let Some(value) = preset.value() {
                let _ = writeln!(out, "${prefix}-{}: {value};", preset.slug);
            }
        }
    }
    Ok(out)
}

/// Write `content` unless the file already holds it. Returns whether it wrote.
fn write_if_changed(path: &Path, content: &str) -> Result<bool> {
    if fs::read_to_string(path).is_ok_and(|current| current == content) {
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, content).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(true)
}

/// Generates the theme variables partial in-process.
struct ThemeVarsAction;

impl BuildAction for ThemeVarsAction {
    fn run<'a>(&'a self, unit: &'a BuildUnit) -> BoxFuture<'a, ActionOutcome> {
        Box::pin(async move {
            let started = Instant::now();
            let result = tokio::fs::read_to_string(&unit.input)
                .await
                .with_context(|| format!("failed to read {}", unit.input.display()))
                .and_then(|json| render_theme_vars(&json))
                .and_then(|vars| write_if_changed(&unit.output, &vars));

            match result {
                Ok(_) => ActionOutcome {
                    success: true,
                    duration: started.elapsed(),
                    ..ActionOutcome::default()
                },
                Err(e) => ActionOutcome {
                    success: false,
                    duration: started.elapsed(),
                    error: Some(format!("{e:#}")),
                    ..ActionOutcome::default()
                },
            }
        })
    }
}
