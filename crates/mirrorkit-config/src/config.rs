use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use mirrorkit_utils::{
    path::{expand_tilde, xdg_config_home, xdg_data_home},
    time::parse_duration,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ConfigError, Result};

/// Application configuration.
///
/// Every field is optional in the file; [`Config::resolve`] fills in defaults.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Root directory for all mirrorkit state.
    /// Default: $MIRRORKIT_ROOT or $XDG_DATA_HOME/mirrorkit
    pub root_dir: Option<String>,

    /// Path of the SQLite database holding mirrors, packages and reflists.
    /// Default: $ROOT/db/mirrorkit.db
    pub db_path: Option<String>,

    /// Directory where downloaded package files are pooled.
    /// Default: $ROOT/pool
    pub pool_path: Option<String>,

    /// Directory holding per-mirror lock files.
    /// Default: $ROOT/locks
    pub lock_dir: Option<String>,

    /// Maximum number of parallel downloads within one mirror update.
    /// Default: 4
    pub download_concurrency: Option<usize>,

    /// Number of retries after a failed request.
    /// Default: 3
    pub download_retries: Option<u32>,

    /// Initial delay between retries; doubled on each attempt.
    /// Default: 1s
    pub retry_backoff: Option<String>,

    /// Timeout for a single HTTP request.
    /// Default: 30s
    pub download_timeout: Option<String>,

    /// Overall deadline for downloading one mirror. Unset means no deadline.
    pub update_deadline: Option<String>,

    /// Whether newly created mirrors include source packages.
    /// Default: false
    pub download_sources: Option<bool>,

    /// Whether Release files must carry a valid signature.
    /// Default: true
    pub signature_verification: Option<bool>,

    /// Trusted minisign public key files.
    /// Default: []
    pub keyrings: Option<Vec<String>>,

    /// Architectures for newly created mirrors. Empty takes all from the Release file.
    /// Default: []
    pub architectures: Option<Vec<String>>,

    /// User-Agent header sent with each request.
    /// Default: mirrorkit/<version>
    pub user_agent: Option<String>,

    /// Proxy URL for all requests.
    pub proxy: Option<String>,
}

/// Resolves the config file location.
///
/// An explicit path wins, then `$MIRRORKIT_CONFIG`, then
/// `$XDG_CONFIG_HOME/mirrorkit/config.toml`.
pub fn config_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    match std::env::var("MIRRORKIT_CONFIG") {
        Ok(path) => expand_tilde(&path),
        Err(_) => xdg_config_home().join("mirrorkit").join("config.toml"),
    }
}

impl Config {
    pub fn default_config() -> Self {
        let mut config = Self::default();
        config.fill_defaults();
        config
    }

    /// Loads the configuration from `path`, or the defaults if it does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = match fs::read_to_string(path) {
            Ok(content) => {
                debug!(path = %path.display(), "loading configuration");
                toml::from_str(&content)?
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no config file, using defaults");
                Self::default()
            }
            Err(err) => {
                return Err(ConfigError::IoError {
                    path: path.display().to_string(),
                    source: err,
                })
            }
        };

        config.resolve()?;
        Ok(config)
    }

    fn fill_defaults(&mut self) {
        let root = match std::env::var("MIRRORKIT_ROOT") {
            Ok(root) => expand_tilde(&root),
            Err(_) => xdg_data_home().join("mirrorkit"),
        };
        let root_dir = self
            .root_dir
            .get_or_insert_with(|| root.display().to_string())
            .clone();

        self.db_path
            .get_or_insert_with(|| format!("{root_dir}/db/mirrorkit.db"));
        self.pool_path.get_or_insert_with(|| format!("{root_dir}/pool"));
        self.lock_dir.get_or_insert_with(|| format!("{root_dir}/locks"));

        self.download_concurrency.get_or_insert(4);
        self.download_retries.get_or_insert(3);
        self.retry_backoff.get_or_insert_with(|| "1s".into());
        self.download_timeout.get_or_insert_with(|| "30s".into());
        self.download_sources.get_or_insert(false);
        self.signature_verification.get_or_insert(true);
        self.keyrings.get_or_insert_with(Vec::new);
        self.architectures.get_or_insert_with(Vec::new);
        self.user_agent
            .get_or_insert_with(|| format!("mirrorkit/{}", env!("CARGO_PKG_VERSION")));
    }

    /// Fills defaults and validates the loaded values.
    pub fn resolve(&mut self) -> Result<()> {
        self.fill_defaults();

        if self.download_concurrency == Some(0) {
            return Err(ConfigError::ZeroValue {
                field: "download_concurrency",
            });
        }

        self.retry_backoff()?;
        self.download_timeout()?;
        self.update_deadline()?;

        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Returns the configured keyring paths, failing on any that do not exist.
    pub fn keyring_paths(&self) -> Result<Vec<PathBuf>> {
        self.keyrings
            .iter()
            .flatten()
            .map(|keyring| {
                let path = expand_tilde(keyring);
                if path.is_file() {
                    Ok(path)
                } else {
                    Err(ConfigError::MissingKeyring(keyring.clone()))
                }
            })
            .collect()
    }

    pub fn root_dir(&self) -> PathBuf {
        path_or(&self.root_dir, || xdg_data_home().join("mirrorkit"))
    }

    pub fn db_path(&self) -> PathBuf {
        path_or(&self.db_path, || self.root_dir().join("db/mirrorkit.db"))
    }

    pub fn pool_path(&self) -> PathBuf {
        path_or(&self.pool_path, || self.root_dir().join("pool"))
    }

    pub fn lock_dir(&self) -> PathBuf {
        path_or(&self.lock_dir, || self.root_dir().join("locks"))
    }

    pub fn download_concurrency(&self) -> usize {
        self.download_concurrency.unwrap_or(4).max(1)
    }

    pub fn download_retries(&self) -> u32 {
        self.download_retries.unwrap_or(3)
    }

    pub fn retry_backoff(&self) -> Result<Duration> {
        duration_field("retry_backoff", self.retry_backoff.as_deref().unwrap_or("1s"))
    }

    pub fn download_timeout(&self) -> Result<Duration> {
        duration_field(
            "download_timeout",
            self.download_timeout.as_deref().unwrap_or("30s"),
        )
    }

    pub fn update_deadline(&self) -> Result<Option<Duration>> {
        self.update_deadline
            .as_deref()
            .map(|value| duration_field("update_deadline", value))
            .transpose()
    }

    pub fn signature_verification(&self) -> bool {
        self.signature_verification.unwrap_or(true)
    }

    pub fn download_sources(&self) -> bool {
        self.download_sources.unwrap_or(false)
    }
}

fn path_or(value: &Option<String>, default: impl FnOnce() -> PathBuf) -> PathBuf {
    value.as_deref().map(expand_tilde).unwrap_or_else(default)
}

fn duration_field(field: &'static str, value: &str) -> Result<Duration> {
    parse_duration(value).ok_or_else(|| {
        ConfigError::InvalidDuration {
            field,
            value: value.to_string(),
        }
    })
}

#[cfg(test)]
mod tests {
    use serial_test::serial;
    use tempfile::tempdir;

    use super::*;

    #[test]
    #[serial]
    fn test_default_config_uses_root() {
        std::env::set_var("MIRRORKIT_ROOT", "/srv/mirrorkit");
        let config = Config::default_config();
        std::env::remove_var("MIRRORKIT_ROOT");

        assert_eq!(config.db_path(), PathBuf::from("/srv/mirrorkit/db/mirrorkit.db"));
        assert_eq!(config.pool_path(), PathBuf::from("/srv/mirrorkit/pool"));
        assert_eq!(config.lock_dir(), PathBuf::from("/srv/mirrorkit/locks"));
        assert_eq!(config.download_concurrency(), 4);
        assert_eq!(config.download_retries(), 3);
        assert_eq!(config.download_timeout().unwrap(), Duration::from_secs(30));
        assert_eq!(config.update_deadline().unwrap(), None);
        assert!(config.signature_verification());
        assert!(!config.download_sources());
    }

    #[test]
    #[serial]
    fn test_load_missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let config = Config::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.download_concurrency(), 4);
    }

    #[test]
    #[serial]
    fn test_load_overrides() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
root_dir = "/data/mk"
download_concurrency = 8
update_deadline = "1h"
signature_verification = false
architectures = ["amd64", "arm64"]
"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.pool_path(), PathBuf::from("/data/mk/pool"));
        assert_eq!(config.download_concurrency(), 8);
        assert_eq!(
            config.update_deadline().unwrap(),
            Some(Duration::from_secs(3600))
        );
        assert!(!config.signature_verification());
        assert_eq!(
            config.architectures.as_deref(),
            Some(&["amd64".to_string(), "arm64".to_string()][..])
        );
    }

    #[test]
    #[serial]
    fn test_load_rejects_bad_duration() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "download_timeout = \"soon\"\n").unwrap();

        let err = Config::load(&path).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidDuration {
                field: "download_timeout",
                ..
            }
        ));
    }

    #[test]
    #[serial]
    fn test_load_rejects_zero_concurrency() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "download_concurrency = 0\n").unwrap();

        assert!(matches!(
            Config::load(&path),
            Err(ConfigError::ZeroValue { .. })
        ));
    }

    #[test]
    #[serial]
    fn test_load_rejects_unknown_field() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "parallel_limit = 3\n").unwrap();

        assert!(matches!(
            Config::load(&path),
            Err(ConfigError::TomlDeError(_))
        ));
    }

    #[test]
    #[serial]
    fn test_to_toml_round_trips() {
        let dir = tempdir().unwrap();
        let mut config = Config::default_config();
        config.update_deadline = Some("2h".into());
        let path = dir.path().join("config.toml");
        fs::write(&path, config.to_toml().unwrap()).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.db_path(), config.db_path());
        assert_eq!(
            loaded.update_deadline().unwrap(),
            Some(Duration::from_secs(7200))
        );
    }

    #[test]
    fn test_keyring_paths() {
        let dir = tempdir().unwrap();
        let key = dir.path().join("archive.pub");
        fs::write(&key, "untrusted comment\nRWQ\n").unwrap();

        let mut config = Config::default_config();
        config.keyrings = Some(vec![key.display().to_string()]);
        assert_eq!(config.keyring_paths().unwrap(), vec![key]);

        config.keyrings = Some(vec!["/nonexistent/key.pub".into()]);
        assert!(matches!(
            config.keyring_paths(),
            Err(ConfigError::MissingKeyring(_))
        ));
    }

    #[test]
    #[serial]
    fn test_config_path_precedence() {
        let explicit = PathBuf::from("/etc/mirrorkit.toml");
        assert_eq!(config_path(Some(&explicit)), explicit);

        std::env::set_var("MIRRORKIT_CONFIG", "/opt/mk.toml");
        assert_eq!(config_path(None), PathBuf::from("/opt/mk.toml"));
        std::env::remove_var("MIRRORKIT_CONFIG");

        std::env::set_var("XDG_CONFIG_HOME", "/cfg");
        assert_eq!(
            config_path(None),
            PathBuf::from("/cfg/mirrorkit/config.toml")
        );
        std::env::remove_var("XDG_CONFIG_HOME");
    }
}
