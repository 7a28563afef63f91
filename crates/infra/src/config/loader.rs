//! Configuration loader
//!
//! Loads client configuration from environment variables or files.
//!
//! ## Loading Strategy
//! 1. First, attempts to load from environment variables
//! 2. If `CLINICFLOW_API_BASE_URL` is unset, falls back to loading from file
//! 3. Probes multiple paths for config files
//! 4. Supports JSON and TOML formats
//! 5. Without any file, the built-in defaults apply
//!
//! ## Environment Variables
//! - `CLINICFLOW_API_BASE_URL`: API base URL (required for env loading)
//! - `CLINICFLOW_API_TIMEOUT_SECS`: Per-request timeout in seconds
//! - `CLINICFLOW_API_MAX_ATTEMPTS`: Transport attempts for 5xx/connection
//!   failures
//! - `CLINICFLOW_STORAGE_BACKEND`: `memory`, `file` or `keychain`
//! - `CLINICFLOW_STORAGE_KEY`: Credential slot key
//! - `CLINICFLOW_STORAGE_DIR`: Directory for the file backend
//!
//! ## File Locations
//! The loader probes the following paths (in order):
//! 1. `./clinicflow.json` or `./clinicflow.toml` (current working directory)
//! 2. `./config.json` or `./config.toml` (current working directory)
//! 3. `../config.json` or `../config.toml` (parent directory)
//! 4. Relative to executable location

use std::path::{Path, PathBuf};
use std::str::FromStr;

use clinicflow_domain::{ApiConfig, ClientConfig, ClinicFlowError, Result, StorageConfig};

/// Load configuration with automatic fallback strategy
///
/// First attempts to load from environment variables. If the base URL is
/// not set there, falls back to a config file, then to defaults.
///
/// # Errors
/// Returns `ClinicFlowError::Config` if:
/// - An environment variable has an invalid value
/// - A config file was found but is invalid
pub fn load() -> Result<ClientConfig> {
    match load_from_env() {
        Ok(config) => {
            tracing::info!("Configuration loaded from environment variables");
            Ok(config)
        }
        Err(e) if std::env::var_os(BASE_URL_VAR).is_some() => Err(e),
        Err(e) => {
            tracing::debug!(error = ?e, "Failed to load from environment, trying file");
            match probe_config_paths() {
                Some(path) => load_from_file(Some(path)),
                None => {
                    tracing::info!("No configuration found; using defaults");
                    Ok(ClientConfig::default())
                }
            }
        }
    }
}

const BASE_URL_VAR: &str = "CLINICFLOW_API_BASE_URL";

/// Load configuration from environment variables
///
/// `CLINICFLOW_API_BASE_URL` must be present; every other variable is
/// optional and falls back to its default.
///
/// # Errors
/// Returns `ClinicFlowError::Config` if the base URL is missing or a
/// variable has an invalid value.
pub fn load_from_env() -> Result<ClientConfig> {
    let defaults = ClientConfig::default();

    let base_url = env_var(BASE_URL_VAR)?;
    let timeout_secs =
        env_parse("CLINICFLOW_API_TIMEOUT_SECS", defaults.api.timeout_secs, "timeout")?;
    let max_attempts =
        env_parse("CLINICFLOW_API_MAX_ATTEMPTS", defaults.api.max_attempts, "max attempts")?;

    let backend = match std::env::var("CLINICFLOW_STORAGE_BACKEND") {
        Ok(value) => value
            .parse()
            .map_err(|e| ClinicFlowError::Config(format!("Invalid storage backend: {}", e)))?,
        Err(_) => defaults.storage.backend,
    };
    let key = std::env::var("CLINICFLOW_STORAGE_KEY").unwrap_or(defaults.storage.key);
    let directory =
        std::env::var_os("CLINICFLOW_STORAGE_DIR").map(PathBuf::from).or(defaults.storage.directory);

    Ok(ClientConfig {
        api: ApiConfig { base_url, timeout_secs, max_attempts, ..defaults.api },
        storage: StorageConfig { backend, key, directory, ..defaults.storage },
    })
}

/// Load configuration from a file
///
/// If `path` is `None`, probes multiple locations for config files.
/// Supports both JSON and TOML formats (detected by file extension).
///
/// # Errors
/// Returns `ClinicFlowError::Config` if:
/// - File not found (when path is specified)
/// - No config file found (when path is `None`)
/// - File format is invalid
pub fn load_from_file(path: Option<PathBuf>) -> Result<ClientConfig> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(ClinicFlowError::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            ClinicFlowError::Config(
                "No config file found in any of the standard locations".to_string(),
            )
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| ClinicFlowError::Config(format!("Failed to read config file: {}", e)))?;

    parse_config(&contents, &config_path)
}

/// Parse configuration from string content
///
/// Format is detected by file extension (`.json` or `.toml`).
fn parse_config(contents: &str, path: &Path) -> Result<ClientConfig> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| ClinicFlowError::Config(format!("Invalid TOML format: {}", e))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| ClinicFlowError::Config(format!("Invalid JSON format: {}", e))),
        _ => Err(ClinicFlowError::Config(format!("Unsupported config format: {}", extension))),
    }
}

/// Probe multiple paths for configuration files
///
/// # Returns
/// The first config file found, or `None` if no file exists.
pub fn probe_config_paths() -> Option<PathBuf> {
    let mut candidates = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        candidates.extend(vec![
            cwd.join("clinicflow.json"),
            cwd.join("clinicflow.toml"),
            cwd.join("config.json"),
            cwd.join("config.toml"),
            cwd.join("../config.json"),
            cwd.join("../config.toml"),
        ]);
    }

    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            candidates.extend(vec![
                exe_dir.join("clinicflow.json"),
                exe_dir.join("clinicflow.toml"),
                exe_dir.join("config.json"),
                exe_dir.join("config.toml"),
            ]);
        }
    }

    candidates.into_iter().find(|path| path.exists())
}

/// Get required environment variable
///
/// # Errors
/// Returns `ClinicFlowError::Config` if the variable is not set.
fn env_var(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| {
        ClinicFlowError::Config(format!("Missing required environment variable: {}", key))
    })
}

/// Parse an optional environment variable, using `default` when unset.
fn env_parse<T>(key: &str, default: T, what: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| ClinicFlowError::Config(format!("Invalid {}: {}", what, e))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::Mutex;

    use clinicflow_domain::StorageBackend;
    use once_cell::sync::Lazy;
    use tempfile::NamedTempFile;

    use super::*;

    static ENV_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

    const VARS: [&str; 6] = [
        "CLINICFLOW_API_BASE_URL",
        "CLINICFLOW_API_TIMEOUT_SECS",
        "CLINICFLOW_API_MAX_ATTEMPTS",
        "CLINICFLOW_STORAGE_BACKEND",
        "CLINICFLOW_STORAGE_KEY",
        "CLINICFLOW_STORAGE_DIR",
    ];

    fn clear_env() {
        for var in VARS {
            std::env::remove_var(var);
        }
    }

    #[test]
    fn test_load_from_env_all_vars_set() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");

        std::env::set_var("CLINICFLOW_API_BASE_URL", "https://clinic.test/api");
        std::env::set_var("CLINICFLOW_API_TIMEOUT_SECS", "25");
        std::env::set_var("CLINICFLOW_API_MAX_ATTEMPTS", "3");
        std::env::set_var("CLINICFLOW_STORAGE_BACKEND", "keychain");
        std::env::set_var("CLINICFLOW_STORAGE_KEY", "session");
        std::env::set_var("CLINICFLOW_STORAGE_DIR", "/tmp/clinicflow-test");

        let result = load_from_env();
        clear_env();

        let config = result.expect("config from env");
        assert_eq!(config.api.base_url, "https://clinic.test/api");
        assert_eq!(config.api.timeout_secs, 25);
        assert_eq!(config.api.max_attempts, 3);
        assert_eq!(config.storage.backend, StorageBackend::Keychain);
        assert_eq!(config.storage.key, "session");
        assert_eq!(config.storage.directory, Some(PathBuf::from("/tmp/clinicflow-test")));
    }

    #[test]
    fn test_load_from_env_uses_defaults_for_optional_vars() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");
        clear_env();
        std::env::set_var("CLINICFLOW_API_BASE_URL", "https://clinic.test/api");

        let result = load_from_env();
        clear_env();

        let config = result.expect("config from env");
        assert_eq!(config.api.timeout_secs, 10);
        assert_eq!(config.api.max_attempts, 1);
        assert_eq!(config.storage, StorageConfig::default());
    }

    #[test]
    fn test_load_from_env_missing_base_url() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");
        clear_env();

        let result = load_from_env();
        assert!(matches!(result, Err(ClinicFlowError::Config(_))));
    }

    #[test]
    fn test_load_rejects_invalid_env_instead_of_falling_back() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");
        clear_env();
        std::env::set_var("CLINICFLOW_API_BASE_URL", "https://clinic.test/api");
        std::env::set_var("CLINICFLOW_API_TIMEOUT_SECS", "soon");

        let result = load();
        clear_env();

        assert!(matches!(result, Err(ClinicFlowError::Config(msg)) if msg.contains("timeout")));
    }

    #[test]
    fn test_load_from_file_json() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(
            file,
            r#"{{ "api": {{ "base_url": "https://json.test/api", "timeout_secs": 5 }},
                 "storage": {{ "backend": "memory" }} }}"#
        )
        .unwrap();

        let config = load_from_file(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(config.api.base_url, "https://json.test/api");
        assert_eq!(config.api.timeout_secs, 5);
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.storage.key, "auth-storage");
    }

    #[test]
    fn test_load_from_file_toml() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(
            file,
            "[api]\nbase_url = \"https://toml.test/api\"\nmax_attempts = 2\n\n[storage]\nbackend = \"file\"\ndirectory = \"/var/lib/clinicflow\"\n"
        )
        .unwrap();

        let config = load_from_file(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(config.api.base_url, "https://toml.test/api");
        assert_eq!(config.api.max_attempts, 2);
        assert_eq!(config.storage.directory, Some(PathBuf::from("/var/lib/clinicflow")));
    }

    #[test]
    fn test_load_from_file_invalid_format() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "not a config").unwrap();
        let path = file.path().with_extension("yaml");
        std::fs::copy(file.path(), &path).unwrap();

        let result = load_from_file(Some(path.clone()));
        std::fs::remove_file(&path).ok();

        assert!(matches!(result, Err(ClinicFlowError::Config(msg)) if msg.contains("yaml")));
    }

    #[test]
    fn test_load_from_file_missing_path() {
        let result = load_from_file(Some(PathBuf::from("/nonexistent/clinicflow.json")));
        assert!(matches!(result, Err(ClinicFlowError::Config(_))));
    }
}
