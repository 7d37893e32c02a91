//! Style import scanning (`@import`, `@use`, `@forward`).

use regex::Regex;
use std::{
    path::{Path, PathBuf},
    sync::LazyLock,
};

pub const STYLE_EXTENSIONS: &[&str] = &["scss", "sass", "css"];

/// `@import 'a', 'b';` / `@use "sass:math" as m;` / `@forward 'src/list'`
static DIRECTIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"@(import|use|forward)\s+([^;\n]+)").expect("valid directive regex")
});

static QUOTED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"['"]([^'"]+)['"]"#).expect("valid quoted regex"));

/// Import specifiers in source order.
///
/// `@use`/`@forward` take only their first quoted argument (the rest is a
/// `with (...)` configuration map), `@import` may list several.
pub fn scan(source: &str) -> Vec<String> {
    let mut specs = Vec::new();

    for cap in DIRECTIVE.captures_iter(source) {
        let args = &cap[2];
        if args.trim_start().starts_with("url(") {
            continue;
        }

        let quoted = QUOTED.captures_iter(args).map(|q| q[1].to_string());
        let quoted: Vec<_> = if &cap[1] == "import" {
            quoted.collect()
        } else {
            quoted.take(1).collect()
        };

        specs.extend(quoted.into_iter().filter(|s| is_local(s)));
    }

    specs
}

/// Builtin modules and remote URLs never resolve to project files.
fn is_local(spec: &str) -> bool {
    !(spec.starts_with("sass:")
        || spec.starts_with("http://")
        || spec.starts_with("https://")
        || spec.starts_with("//")
        || spec.starts_with("url("))
}

/// Candidate files for `spec` imported relative to `base`, in probe order.
///
/// `foo/bar` → `foo/bar.scss`, `foo/_bar.scss`, `foo/bar.sass`, ... then
/// `foo/bar/_index.scss`, `foo/bar/index.scss`, ...
pub fn candidates(base: &Path, spec: &str) -> Vec<PathBuf> {
    let path = base.join(spec);
    let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
        return Vec::new();
    };
    let parent = path.parent().unwrap_or(base);
    let partial = parent.join(format!("_{name}"));

    let has_ext = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| STYLE_EXTENSIONS.contains(&e));

    if has_ext {
        return vec![path.clone(), partial];
    }

    let mut out = Vec::with_capacity(STYLE_EXTENSIONS.len() * 4);
    for ext in STYLE_EXTENSIONS {
        out.push(parent.join(format!("{name}.{ext}")));
        out.push(parent.join(format!("_{name}.{ext}")));
    }
    for ext in STYLE_EXTENSIONS {
        out.push(path.join(format!("_index.{ext}")));
        out.push(path.join(format!("index.{ext}")));
    }
    out
}
