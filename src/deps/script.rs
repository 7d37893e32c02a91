//! Script import scanning (ES modules and CommonJS).

use regex::Regex;
use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    sync::LazyLock,
};

/// Probed in order when a specifier has no (known) extension.
pub const SCRIPT_EXTENSIONS: &[&str] = &["js", "jsx", "ts", "tsx", "mjs", "cjs", "json"];

/// Extensions whose sources are scanned for further imports.
pub const SCANNED_EXTENSIONS: &[&str] = &["js", "jsx", "ts", "tsx", "mjs", "cjs"];

/// `import x from '...'`, `import { a, b } from "..."`, `import '...'`
static STATIC_IMPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^\s*import\s+(?:type\s+)?(?:[\w*${}\s,]+?\s+from\s+)?['"]([^'"\n]+)['"]"#)
        .expect("valid import regex")
});

static DYNAMIC_IMPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\bimport\s*\(\s*['"]([^'"\n]+)['"]\s*\)"#).expect("valid dynamic import regex")
});

static REQUIRE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\brequire\s*\(\s*['"]([^'"\n]+)['"]\s*\)"#).expect("valid require regex")
});

/// Relative (`./`, `../`) and root-relative (`/`) specifiers in source order.
///
/// Bare specifiers name packages and are never followed.
pub fn scan(source: &str) -> Vec<String> {
    let mut found: Vec<(usize, String)> = [&*STATIC_IMPORT, &*DYNAMIC_IMPORT, &*REQUIRE]
        .into_iter()
        .flat_map(|re| re.captures_iter(source))
        .filter_map(|cap| {
            let m = cap.get(1)?;
            let spec = m.as_str();
            (spec.starts_with('.') || spec.starts_with('/')).then(|| (m.start(), spec.to_string()))
        })
        .collect();

    found.sort_by_key(|(pos, _)| *pos);
    found.into_iter().map(|(_, spec)| spec).collect()
}

/// Candidate files for `spec`, in probe order.
///
/// `/x` resolves against `root`, anything else against `dir`.
pub fn candidates(root: &Path, dir: &Path, spec: &str) -> Vec<PathBuf> {
    let base = match spec.strip_prefix('/') {
        Some(rooted) => root.join(rooted),
        None => dir.join(spec),
    };

    let mut out = Vec::with_capacity(1 + SCRIPT_EXTENSIONS.len() * 2);
    out.push(base.clone());
    for ext in SCRIPT_EXTENSIONS {
        let mut appended = OsString::from(base.as_os_str());
        appended.push(".");
        appended.push(ext);
        out.push(PathBuf::from(appended));
    }
    for ext in SCRIPT_EXTENSIONS {
        out.push(base.join(format!("index.{ext}")));
    }
    out
}
