//! Configuration error types.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read theme config `{}`", .0.display())]
    Io(PathBuf, #[source] std::io::Error),

    #[error("malformed themewright.toml: {0}")]
    Toml(#[from] toml::de::Error),

    /// Settings that parse but cannot run together.
    #[error("unusable themewright.toml: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error, ErrorKind};

    #[test]
    fn test_messages_name_the_theme_config() {
        let missing = ConfigError::Io(
            PathBuf::from("theme/themewright.toml"),
            Error::new(ErrorKind::NotFound, "file not found"),
        );
        assert_eq!(missing.to_string(), "cannot read theme config `theme/themewright.toml`");

        let clash = ConfigError::Validation("[serve.port] and [serve.reload_port] must differ".into());
        assert!(clash.to_string().starts_with("unusable themewright.toml: [serve.port]"));

        let malformed = toml::from_str::<toml::Table>("port = ").unwrap_err();
        assert!(ConfigError::from(malformed).to_string().starts_with("malformed themewright.toml: "));
    }
}
