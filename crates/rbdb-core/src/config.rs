//! Library configuration
//!
//! Configuration is loaded from:
//! 1. Default values
//! 2. Config file (~/.config/rbdb/config.toml)
//! 3. Environment variables (RBDB_* prefix)
//!
//! Environment variables take precedence over config file values.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::database::OpenOptions;
use crate::mirror::MIRROR_FILE_NAME;

/// Environment variable prefix
const ENV_PREFIX: &str = "RBDB";

/// File name of the library database inside `db_dir`
pub const DATABASE_FILE_NAME: &str = "master.db";

/// Library configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding `master.db` and `masterPlaylists6.xml`
    #[serde(default = "default_db_dir")]
    pub db_dir: PathBuf,

    /// Root of the analysis file tree (defaults to `<db_dir>/share`)
    #[serde(default)]
    pub share_dir: Option<PathBuf>,

    /// Where decrypted copies of protected databases are kept
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Whether to decrypt the database before opening it
    #[serde(default)]
    pub unlock: bool,

    /// Passphrase of the protected database
    #[serde(default)]
    pub key: Option<String>,

    /// Write logs to this file instead of stderr
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_dir: default_db_dir(),
            share_dir: None,
            cache_dir: default_cache_dir(),
            unlock: false,
            key: None,
            log_file: None,
        }
    }
}

impl Config {
    /// Load configuration from default location and environment
    ///
    /// Order of precedence (highest to lowest):
    /// 1. Environment variables (RBDB_DB_DIR, RBDB_SHARE_DIR, RBDB_CACHE_DIR,
    ///    RBDB_UNLOCK, RBDB_KEY, RBDB_LOG_FILE)
    /// 2. Config file (~/.config/rbdb/config.toml or RBDB_CONFIG)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::config_file_path())
    }

    /// Load configuration from a specific path
    ///
    /// Environment variables are still applied as overrides.
    /// If the file doesn't exist, defaults are used.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from a TOML string (useful for testing)
    pub fn load_from_str(toml_content: &str) -> Result<Self> {
        let mut config: Config =
            toml::from_str(toml_content).context("Failed to parse config TOML")?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var(format!("{}_DB_DIR", ENV_PREFIX)) {
            self.db_dir = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var(format!("{}_SHARE_DIR", ENV_PREFIX)) {
            self.share_dir = if val.is_empty() { None } else { Some(PathBuf::from(val)) };
        }

        if let Ok(val) = std::env::var(format!("{}_CACHE_DIR", ENV_PREFIX)) {
            self.cache_dir = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var(format!("{}_UNLOCK", ENV_PREFIX)) {
            self.unlock = val.eq_ignore_ascii_case("true") || val == "1";
        }

        if let Ok(val) = std::env::var(format!("{}_KEY", ENV_PREFIX)) {
            self.key = if val.is_empty() { None } else { Some(val) };
        }

        if let Ok(val) = std::env::var(format!("{}_LOG_FILE", ENV_PREFIX)) {
            self.log_file = if val.is_empty() { None } else { Some(PathBuf::from(val)) };
        }
    }

    /// Save configuration to a file
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;
        Ok(())
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to_path(&Self::config_file_path())
    }

    /// Get the config file path
    ///
    /// Can be overridden with RBDB_CONFIG environment variable
    pub fn config_file_path() -> PathBuf {
        if let Ok(path) = std::env::var(format!("{}_CONFIG", ENV_PREFIX)) {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("rbdb")
            .join("config.toml")
    }

    /// Get the path to the library database
    pub fn database_path(&self) -> PathBuf {
        self.db_dir.join(DATABASE_FILE_NAME)
    }

    /// Get the path to the master playlist mirror
    pub fn playlist_xml_path(&self) -> PathBuf {
        self.db_dir.join(MIRROR_FILE_NAME)
    }

    /// Get the root of the analysis file tree
    pub fn share_path(&self) -> PathBuf {
        self.share_dir
            .clone()
            .unwrap_or_else(|| self.db_dir.join("share"))
    }

    /// Options for opening the configured library
    pub fn open_options(&self) -> OpenOptions {
        OpenOptions {
            unlock: self.unlock,
            key: self.key.clone(),
            cache_dir: Some(self.cache_dir.clone()),
            share_dir: Some(self.share_path()),
            ..OpenOptions::default()
        }
    }
}

/// Get the host application's library directory for this platform
fn default_db_dir() -> PathBuf {
    let base = if cfg!(target_os = "macos") {
        dirs::home_dir().map(|home| home.join("Library"))
    } else if cfg!(target_os = "windows") {
        dirs::config_dir()
    } else {
        dirs::data_dir()
    };
    base.unwrap_or_else(|| PathBuf::from("."))
        .join("Pioneer")
        .join("rekordbox")
}

/// Get the default cache directory for decrypted copies
pub(crate) fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("rbdb")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;
    use tempfile::TempDir;

    // Mutex to serialize tests that touch environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// Guard that locks env access and saves/restores env vars
    struct EnvGuard<'a> {
        _lock: std::sync::MutexGuard<'a, ()>,
        saved: Vec<(String, Option<String>)>,
    }

    impl<'a> EnvGuard<'a> {
        fn new(vars: &[&str]) -> Self {
            let lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
            let saved = vars
                .iter()
                .map(|&name| (name.to_string(), env::var(name).ok()))
                .collect();
            for name in vars {
                env::remove_var(name);
            }
            Self { _lock: lock, saved }
        }
    }

    impl Drop for EnvGuard<'_> {
        fn drop(&mut self) {
            for (name, value) in &self.saved {
                match value {
                    Some(v) => env::set_var(name, v),
                    None => env::remove_var(name),
                }
            }
        }
    }

    const ENV_VARS: &[&str] = &[
        "RBDB_DB_DIR",
        "RBDB_SHARE_DIR",
        "RBDB_CACHE_DIR",
        "RBDB_UNLOCK",
        "RBDB_KEY",
        "RBDB_LOG_FILE",
    ];

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(!config.unlock);
        assert!(config.key.is_none());
        assert!(config.db_dir.ends_with("Pioneer/rekordbox"));
        assert!(config.cache_dir.ends_with("rbdb"));
    }

    #[test]
    fn test_file_paths() {
        let config = Config {
            db_dir: PathBuf::from("/music/rekordbox"),
            ..Config::default()
        };

        assert_eq!(config.database_path(), PathBuf::from("/music/rekordbox/master.db"));
        assert_eq!(
            config.playlist_xml_path(),
            PathBuf::from("/music/rekordbox/masterPlaylists6.xml")
        );
        assert_eq!(config.share_path(), PathBuf::from("/music/rekordbox/share"));
    }

    #[test]
    fn test_env_override_db_dir() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();

        env::set_var("RBDB_DB_DIR", "/tmp/rbdb-test");
        config.apply_env_overrides();

        assert_eq!(config.db_dir, PathBuf::from("/tmp/rbdb-test"));
    }

    #[test]
    fn test_env_override_unlock() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();
        assert!(!config.unlock);

        env::set_var("RBDB_UNLOCK", "true");
        config.apply_env_overrides();
        assert!(config.unlock);

        env::set_var("RBDB_UNLOCK", "1");
        config.unlock = false;
        config.apply_env_overrides();
        assert!(config.unlock);

        env::set_var("RBDB_UNLOCK", "false");
        config.apply_env_overrides();
        assert!(!config.unlock);
    }

    #[test]
    fn test_env_override_key() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();

        env::set_var("RBDB_KEY", "secret");
        config.apply_env_overrides();
        assert_eq!(config.key.as_deref(), Some("secret"));

        // Empty string clears it
        env::set_var("RBDB_KEY", "");
        config.apply_env_overrides();
        assert!(config.key.is_none());
    }

    #[test]
    fn test_share_dir_override() {
        let _guard = EnvGuard::new(ENV_VARS);

        env::set_var("RBDB_SHARE_DIR", "/analysis");
        let config = Config::load_from_str("db_dir = \"/library\"").unwrap();
        assert_eq!(config.share_path(), PathBuf::from("/analysis"));
    }

    #[test]
    fn test_load_from_str() {
        let _guard = EnvGuard::new(ENV_VARS);

        let toml = r#"
            db_dir = "/custom/rekordbox"
            cache_dir = "/custom/cache"
            unlock = true
            key = "secret"
        "#;

        let config = Config::load_from_str(toml).unwrap();
        assert_eq!(config.db_dir, PathBuf::from("/custom/rekordbox"));
        assert_eq!(config.cache_dir, PathBuf::from("/custom/cache"));
        assert!(config.unlock);
        assert_eq!(config.key.as_deref(), Some("secret"));
    }

    #[test]
    fn test_save_and_load() {
        let _guard = EnvGuard::new(ENV_VARS);
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("rbdb").join("config.toml");

        let config = Config {
            db_dir: PathBuf::from("/data/rekordbox"),
            log_file: Some(PathBuf::from("/data/rbdb.log")),
            ..Config::default()
        };
        config.save_to_path(&path).unwrap();

        let loaded = Config::load_from_path(&path).unwrap();
        assert_eq!(loaded.db_dir, config.db_dir);
        assert_eq!(loaded.log_file, config.log_file);
    }

    #[test]
    fn test_load_from_path_missing_file() {
        let _guard = EnvGuard::new(ENV_VARS);

        let path = PathBuf::from("/nonexistent/config.toml");
        let config = Config::load_from_path(&path).unwrap();
        assert!(!config.unlock);
        assert!(config.share_dir.is_none());
    }

    #[test]
    fn test_open_options() {
        let config = Config {
            db_dir: PathBuf::from("/library"),
            unlock: true,
            key: Some("secret".to_string()),
            ..Config::default()
        };

        let options = config.open_options();
        assert!(options.unlock);
        assert_eq!(options.key.as_deref(), Some("secret"));
        // resolved by `Database::open`, which skips it for decrypted copies
        assert!(options.playlist_xml.is_none());
        assert_eq!(options.share_dir, Some(PathBuf::from("/library/share")));
    }
}
