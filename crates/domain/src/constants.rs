//! Application constants
//!
//! Centralized location for the API and session constants shared by the
//! client crates.

// API defaults
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:5000/api";
pub const DEFAULT_API_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_API_MAX_ATTEMPTS: usize = 1;
pub const DEFAULT_USER_AGENT: &str = concat!("clinicflow-client/", env!("CARGO_PKG_VERSION"));

// Auth endpoints, relative to the API base URL
pub const AUTH_REFRESH_PATH: &str = "/auth/refresh";
pub const AUTH_LOGIN_PATH: &str = "/auth/login";
pub const AUTH_LOGOUT_PATH: &str = "/auth/logout";

// Persisted credential slot
pub const DEFAULT_STORAGE_KEY: &str = "auth-storage";
pub const DEFAULT_KEYCHAIN_SERVICE: &str = "ClinicFlow";
pub const STORAGE_DIR_NAME: &str = "clinicflow";
