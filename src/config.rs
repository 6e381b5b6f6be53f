//! Configuration module for the mailbox core and context-menu pipeline
//!
//! All configuration is loaded from environment variables prefixed with
//! `WAVEBOX_`. Every setting has a default so the server starts with an
//! empty environment.

use std::env;
use std::env::VarError;
use std::path::PathBuf;

use crate::errors::{AppError, AppResult};

/// Default search provider prefix for the lookup/search menu section
const DEFAULT_SEARCH_URL: &str = "https://www.google.com/search?q=";

/// Server-wide configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Optional JSON snapshot used to seed the mailbox store
    pub state_file: Option<PathBuf>,
    /// Grace period after the native menu closes before teardown runs
    pub menu_teardown_ms: u64,
    /// How long a surface bind intent waits for window attachment
    pub binding_timeout_ms: u64,
    /// Settings consumed by the context-menu section builders
    pub menu: MenuConfig,
    /// Installed spellcheck dictionaries, primary first
    pub spellcheck_languages: Vec<String>,
}

/// Settings consumed by the context-menu section builders
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuConfig {
    /// Human-readable search provider name ("Search Google for ...")
    pub search_provider: String,
    /// Search URL prefix; the url-encoded selection is appended
    pub search_url: String,
    /// Adds "Inspect Element" to the app-settings section
    pub devtools_enabled: bool,
    /// Adds the native "Look Up" entry to the lookup section
    pub lookup_enabled: bool,
}

impl Default for MenuConfig {
    fn default() -> Self {
        Self {
            search_provider: "Google".to_owned(),
            search_url: DEFAULT_SEARCH_URL.to_owned(),
            devtools_enabled: false,
            lookup_enabled: cfg!(target_os = "macos"),
        }
    }
}

impl ServerConfig {
    /// Load all configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if a variable is set but malformed.
    ///
    /// # Example Environment
    ///
    /// ```text
    /// WAVEBOX_STATE_FILE=/home/me/.config/wavebox/mailboxes.json
    /// WAVEBOX_MENU_TEARDOWN_MS=100
    /// WAVEBOX_SPELLCHECK_LANGUAGES=en_GB,de_DE
    /// WAVEBOX_DEVTOOLS_ENABLED=true
    /// ```
    pub fn load_from_env() -> AppResult<Self> {
        let defaults = MenuConfig::default();
        let menu = MenuConfig {
            search_provider: optional_env("WAVEBOX_SEARCH_PROVIDER")?
                .unwrap_or(defaults.search_provider),
            search_url: optional_env("WAVEBOX_SEARCH_URL")?.unwrap_or(defaults.search_url),
            devtools_enabled: parse_bool_env("WAVEBOX_DEVTOOLS_ENABLED", defaults.devtools_enabled)?,
            lookup_enabled: parse_bool_env("WAVEBOX_LOOKUP_ENABLED", defaults.lookup_enabled)?,
        };

        let spellcheck_languages = optional_env("WAVEBOX_SPELLCHECK_LANGUAGES")?
            .map(|raw| parse_language_list(&raw))
            .unwrap_or_else(|| vec!["en_US".to_owned()]);

        Ok(Self {
            state_file: optional_env("WAVEBOX_STATE_FILE")?.map(PathBuf::from),
            menu_teardown_ms: parse_u64_env("WAVEBOX_MENU_TEARDOWN_MS", 100)?,
            binding_timeout_ms: parse_u64_env("WAVEBOX_BINDING_TIMEOUT_MS", 5_000)?,
            menu,
            spellcheck_languages,
        })
    }
}

/// Read an optional environment variable, treating blank values as unset
fn optional_env(key: &str) -> AppResult<Option<String>> {
    match env::var(key) {
        Ok(v) if v.trim().is_empty() => Ok(None),
        Ok(v) => Ok(Some(v.trim().to_owned())),
        Err(VarError::NotPresent) => Ok(None),
        Err(VarError::NotUnicode(_)) => Err(AppError::InvalidInput(format!(
            "environment variable {key} contains non-unicode data"
        ))),
    }
}

/// Split a comma separated dictionary list, dropping blanks and duplicates
/// while keeping the first-listed (primary) language first
fn parse_language_list(raw: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for code in raw.split(',').map(str::trim).filter(|c| !c.is_empty()) {
        if !out.iter().any(|existing| existing == code) {
            out.push(code.to_owned());
        }
    }
    out
}

/// Parse a boolean environment variable with flexible values
///
/// Accepts: `1`, `true`, `yes`, `y`, `on` (truthy) or `0`, `false`, `no`,
/// `n`, `off` (falsy). Case-insensitive. Returns `default` if unset.
///
/// # Errors
///
/// Returns `InvalidInput` if the variable is set to an unrecognized value.
fn parse_bool_env(key: &str, default: bool) -> AppResult<bool> {
    match env::var(key) {
        Ok(v) => parse_bool_value(&v).ok_or_else(|| {
            AppError::InvalidInput(format!("invalid boolean environment variable {key}: '{v}'"))
        }),
        Err(VarError::NotPresent) => Ok(default),
        Err(VarError::NotUnicode(_)) => Err(AppError::InvalidInput(format!(
            "environment variable {key} contains non-unicode data"
        ))),
    }
}

fn parse_bool_value(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a `u64` environment variable with default fallback
///
/// # Errors
///
/// Returns `InvalidInput` if the variable is set but not a valid `u64`.
fn parse_u64_env(key: &str, default: u64) -> AppResult<u64> {
    match env::var(key) {
        Ok(v) => v.trim().parse::<u64>().map_err(|_| {
            AppError::InvalidInput(format!("invalid u64 environment variable {key}: '{v}'"))
        }),
        Err(VarError::NotPresent) => Ok(default),
        Err(VarError::NotUnicode(_)) => Err(AppError::InvalidInput(format!(
            "environment variable {key} contains non-unicode data"
        ))),
    }
}
