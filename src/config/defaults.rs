//! Default values for configuration fields.
//!
//! These functions are used by serde for default deserialization.

// ============================================================================
// Common Defaults
// ============================================================================

pub fn r#true() -> bool {
    true
}

pub fn r#false() -> bool {
    false
}

// ============================================================================
// [paths] Section Defaults
// ============================================================================

pub mod paths {
    use std::path::PathBuf;

    pub fn root() -> Option<PathBuf> {
        None
    }

    pub fn styles() -> PathBuf {
        "src/styles".into()
    }

    pub fn scripts() -> PathBuf {
        "src/scripts".into()
    }

    pub fn images() -> PathBuf {
        "src/images".into()
    }

    pub fn fonts() -> PathBuf {
        "src/fonts".into()
    }

    pub fn blocks() -> PathBuf {
        "src/blocks".into()
    }

    pub fn output() -> PathBuf {
        "dist".into()
    }

    pub fn templates() -> Vec<PathBuf> {
        vec!["templates".into(), "parts".into()]
    }

    pub fn php() -> Vec<PathBuf> {
        vec![".".into()]
    }

    pub fn theme_json() -> PathBuf {
        "theme.json".into()
    }

    pub fn error_log() -> PathBuf {
        "../../debug.log".into()
    }

    pub fn ignore() -> Vec<String> {
        ["node_modules", "vendor", ".git", ".themewright"]
            .into_iter()
            .map(String::from)
            .collect()
    }
}

// ============================================================================
// [build] Section Defaults
// ============================================================================

pub mod build {
    use crate::component::ComponentKind;
    use std::path::PathBuf;

    pub fn components() -> Vec<ComponentKind> {
        ComponentKind::ALL
            .iter()
            .copied()
            .filter(|kind| *kind != ComponentKind::ErrorLog)
            .collect()
    }

    pub fn style_load_paths() -> Vec<PathBuf> {
        Vec::new()
    }

    fn argv(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| (*s).to_string()).collect()
    }

    pub fn styles() -> Vec<String> {
        argv(&["sass", "--no-source-map", "{input}", "{output}"])
    }

    pub fn scripts() -> Vec<String> {
        argv(&["esbuild", "{input}", "--bundle", "--outfile={output}"])
    }

    pub fn blocks() -> Vec<String> {
        argv(&[
            "npx",
            "wp-scripts",
            "build",
            "--webpack-src-dir={dir}",
            "--output-path={output}",
        ])
    }

    pub fn php() -> Vec<String> {
        argv(&["php", "-l", "{input}"])
    }

    pub fn html() -> Vec<String> {
        argv(&["npx", "prettier", "--write", "--parser=html", "{input}"])
    }

    pub fn none() -> Vec<String> {
        Vec::new()
    }
}

// ============================================================================
// [cache] Section Defaults
// ============================================================================

pub mod cache {
    use std::path::PathBuf;

    pub fn path() -> PathBuf {
        ".themewright/build-cache.json".into()
    }

    pub fn retention_days() -> u64 {
        7
    }
}

// ============================================================================
// [watch] Section Defaults
// ============================================================================

pub mod watch {
    pub fn debounce_ms() -> u64 {
        500
    }
}

// ============================================================================
// [serve] Section Defaults
// ============================================================================

pub mod serve {
    pub fn interface() -> String {
        "127.0.0.1".into()
    }

    pub fn port() -> u16 {
        3000
    }

    pub fn reload_port() -> u16 {
        35729
    }

    pub fn root() -> std::path::PathBuf {
        ".".into()
    }
}
