use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum ConfigError {
    #[error("TOML deserialization error: {0}")]
    #[diagnostic(
        code(mirrorkit_config::toml_deserialize),
        help("Check your config.toml syntax and structure")
    )]
    TomlDeError(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    #[diagnostic(code(mirrorkit_config::toml_serialize))]
    TomlSerError(#[from] toml::ser::Error),

    #[error("Invalid duration `{value}` for `{field}`")]
    #[diagnostic(
        code(mirrorkit_config::invalid_duration),
        help("Use a value like `30s`, `5m` or `1h30m`")
    )]
    InvalidDuration { field: &'static str, value: String },

    #[error("`{field}` must be greater than zero")]
    #[diagnostic(code(mirrorkit_config::zero_value))]
    ZeroValue { field: &'static str },

    #[error("Keyring not found: {0}")]
    #[diagnostic(
        code(mirrorkit_config::missing_keyring),
        help("Point `keyrings` at minisign public key files, or disable signature_verification")
    )]
    MissingKeyring(String),

    #[error("Failed to read config file {path}: {source}")]
    #[diagnostic(code(mirrorkit_config::io))]
    IoError {
        path: String,
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, ConfigError>;
