//! Global config for Pythonect
//! Includes settings for fan-out parallelism, nested evaluation depth and process workers.
use std::collections::HashMap;

use camino::Utf8PathBuf;
use config::{Config, ConfigError, Environment, File};
use once_cell::sync::OnceCell;
use serde::Deserialize;

/// Global config variable for `Settings`
pub static PYTHONECT_CONFIG: OnceCell<Settings> = OnceCell::new();

/// Global path variable for configuration file
pub static PYTHONECT_CONFIG_FILE: OnceCell<Utf8PathBuf> = OnceCell::new();

/// Gets the `PYTHONECT_CONFIG` settings. If uninitialized, sets the global variable
/// in the following order (greatest to least precedence):
/// - `settings` map if provided, e.g. with key ("max_threads_per_flow", "4")
/// - Env var per setting, e.g. `PYTHONECT_MAX_THREADS_PER_FLOW`
/// - Config file, which also has a configurable location (see `pythonect_config_file()`),
///   and has the following syntax for e.g. TOML:
///   ```toml
///   max_threads_per_flow = 4
///   max_depth = 16
///   ```
/// - Default values, e.g. host parallelism + 1 threads per flow
pub fn pythonect_config(
    file: Option<&Utf8PathBuf>,
    settings: Option<&HashMap<&str, String>>,
) -> &'static Settings {
    PYTHONECT_CONFIG.get_or_init(|| {
        Settings::from_config(pythonect_config_file(file), settings).unwrap_or_else(|e| {
            tracing::warn!("ignoring unreadable configuration: {e}");
            Settings::default()
        })
    })
}

/// Gets the `PYTHONECT_CONFIG_FILE` path. If uninitialized, sets the global variable
/// in the following order (greatest to least precedence):
/// - `config_file` parameter if provided
/// - `PYTHONECT_CONFIG_FILE` env var
/// - Default location at `$HOME/.pythonect/pythonect.toml`
pub fn pythonect_config_file(config_file: Option<&Utf8PathBuf>) -> &'static Utf8PathBuf {
    PYTHONECT_CONFIG_FILE.get_or_init(|| {
        if let Some(file) = config_file {
            file.clone()
        } else if let Ok(file) = std::env::var("PYTHONECT_CONFIG_FILE") {
            Utf8PathBuf::from(file)
        } else {
            pythonect_default_dir().join("pythonect.toml")
        }
    })
}

/// Contains the Pythonect config settings
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct Settings {
    /// Size of the thread pool created for each fan-out step
    pub max_threads_per_flow: usize,

    /// How deeply backtick sub-programs may nest
    pub max_depth: usize,

    /// Executable serving `&` nodes; the running executable when unset
    pub worker_program: Option<Utf8PathBuf>,
}

impl Settings {
    /// Loads config settings from a file or env vars
    pub fn from_config(
        config_file: &Utf8PathBuf,
        settings: Option<&HashMap<&str, String>>,
    ) -> Result<Self, ConfigError> {
        let threads = "max_threads_per_flow";
        let depth = "max_depth";
        let worker = "worker_program";
        let overridden = |key: &str| settings.and_then(|s| s.get(key).map(|v| v.to_owned()));
        // Settings are read first to last, in order of increasing precedence.
        // Hence, default values must come first so they are overriden by all other methods.
        Config::builder()
            .set_default(threads, default_threads() as u64)?
            .set_default(depth, DEFAULT_MAX_DEPTH as u64)?
            .add_source(File::with_name(config_file.as_str()).required(false))
            // Then override with any `PYTHONECT` environment variables
            .add_source(Environment::with_prefix("PYTHONECT"))
            // Optionally override if settings were specified via CLI arg
            .set_override_option(threads, overridden(threads))?
            .set_override_option(depth, overridden(depth))?
            .set_override_option(worker, overridden(worker))?
            .build()
            .and_then(|c| c.try_deserialize())
    }
}

pub const DEFAULT_MAX_DEPTH: usize = 32;

/// Host parallelism plus one
pub fn default_threads() -> usize {
    num_cpus::get() + 1
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_threads_per_flow: default_threads(),
            max_depth: DEFAULT_MAX_DEPTH,
            worker_program: None,
        }
    }
}

pub fn pythonect_default_dir() -> Utf8PathBuf {
    home_dir().join(".pythonect")
}

/// Returns the home directory, or the current directory when there is none
pub fn home_dir() -> Utf8PathBuf {
    home::home_dir()
        .and_then(|p| Utf8PathBuf::from_path_buf(p).ok())
        .unwrap_or_else(|| Utf8PathBuf::from("."))
}

#[cfg(test)]
mod tests {
    use camino::Utf8Path;
    use std::io::prelude::*;
    use std::{collections::HashMap, fs::File};
    use tempfile::Builder;

    use crate::config::{default_threads, Settings, DEFAULT_MAX_DEPTH};

    // Doesn't test `OnceCell` behavior as the tests seem to share memory
    #[test]
    fn test_config_pythonect() {
        let tmp_dir = Builder::new().prefix("tmp").tempdir().unwrap();
        let tmp_dir = Utf8Path::from_path(tmp_dir.path()).unwrap();
        let config_dir = tmp_dir.join("pythonect.toml");

        let mut config_file = File::create(config_dir.clone()).unwrap();
        config_file
            .write_all("max_threads_per_flow = 3\n".as_bytes())
            .unwrap();
        config_file
            .write_all("worker_program = \"/usr/local/bin/pythonect\"\n".as_bytes())
            .unwrap();

        let config = Settings::from_config(&config_dir, None).unwrap();

        assert_eq!(config.max_threads_per_flow, 3);
        assert_eq!(config.max_depth, DEFAULT_MAX_DEPTH);
        assert_eq!(
            config.worker_program.as_deref(),
            Some(Utf8Path::new("/usr/local/bin/pythonect"))
        );
    }

    // Tests overwriting the config file and CLI argument
    // Doesn't test env var as it can overwrite other tests when run in parallel
    #[test]
    fn test_config_override() {
        let tmp_dir = Builder::new().prefix("tmp").tempdir().unwrap();
        let tmp_dir = Utf8Path::from_path(tmp_dir.path()).unwrap();
        let config_dir = tmp_dir.join("pythonect.toml");

        let mut config_file = File::create(config_dir.clone()).unwrap();
        config_file
            .write_all("max_threads_per_flow = 3\nmax_depth = 4\n".as_bytes())
            .unwrap();

        let mut overrides = HashMap::new();
        overrides.insert("max_threads_per_flow", "7".to_string());

        let config = Settings::from_config(&config_dir, Some(&overrides)).unwrap();

        assert_eq!(config.max_threads_per_flow, 7);
        assert_eq!(config.max_depth, 4);
    }

    #[test]
    fn test_config_missing_file() {
        let tmp_dir = Builder::new().prefix("tmp").tempdir().unwrap();
        let tmp_dir = Utf8Path::from_path(tmp_dir.path()).unwrap();
        let config = Settings::from_config(&tmp_dir.join("absent.toml"), None).unwrap();
        assert_eq!(config, Settings::default());
        assert_eq!(config.max_threads_per_flow, default_threads());
    }

    // Tests that duplicate config keys result in an error
    #[test]
    fn test_config_duplicate() {
        let tmp_dir = Builder::new().prefix("tmp").tempdir().unwrap();
        let tmp_dir = Utf8Path::from_path(tmp_dir.path()).unwrap();
        let config_dir = tmp_dir.join("pythonect.toml");

        let mut config_file = File::create(config_dir.clone()).unwrap();
        config_file
            .write_all("max_depth = 1\nmax_depth = 2\n".as_bytes())
            .unwrap();

        assert!(Settings::from_config(&config_dir, None).is_err())
    }
}
