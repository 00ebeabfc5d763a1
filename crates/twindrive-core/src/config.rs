//! Configuration module for TwinDrive.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for TwinDrive.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub engine: EngineConfig,
    pub uploads: UploadsConfig,
    pub store: StoreConfig,
    pub remote: RemoteConfig,
    pub logging: LoggingConfig,
    #[serde(default)]
    pub mappings: Vec<MappingConfig>,
}

/// Change detection and classification timing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Milliseconds to wait after a watcher event before processing (debounce).
    pub debounce_ms: u64,
    /// Seconds a candidate event may wait for its counterpart before the
    /// classifier commits to a verdict.
    pub detection_window_secs: u64,
    /// Milliseconds to wait for a just-written file's hash to settle.
    pub hash_settle_ms: u64,
    /// Milliseconds within which creations are stamped with the same batch id.
    pub batch_window_ms: u64,
    /// Seconds between sweeps of expired classification candidates.
    pub sweep_interval_secs: u64,
    /// Seconds a download marker suppresses the echo of its own write.
    pub download_marker_ttl_secs: u64,
    /// Seconds before an in-flight hash computation is abandoned.
    pub hash_timeout_secs: u64,
    /// Hash cache entry count that triggers a trim.
    pub hash_cache_max: usize,
    /// Hash cache entry count remaining after a trim.
    pub hash_cache_trim_to: usize,
}

/// Upload policy settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadsConfig {
    /// Files above this size (in MiB) are never uploaded.
    pub max_file_size_mb: u64,
    /// Files above this size (in MiB) use the chunked transfer method.
    pub chunked_threshold_mb: u64,
    /// Whether uploads wait for explicit approval before queueing.
    pub require_approval: bool,
}

/// Persistent state storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path to the SQLite database file.
    pub database_path: PathBuf,
}

/// Remote backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Base URL of the remote drive API.
    pub base_url: String,
    /// Seconds before an API request is abandoned.
    pub request_timeout_secs: u64,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
    /// Path to the log file.
    pub file: PathBuf,
    /// Maximum size of a single log file (in MiB) before rotation.
    pub max_size_mb: u64,
    /// Maximum number of rotated log files to keep.
    pub max_files: u32,
}

/// One local-folder-to-remote-folder pairing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingConfig {
    /// Remote drive identifier.
    pub remote_drive_id: String,
    /// Absolute local folder to sync.
    pub local_folder: PathBuf,
    /// Remote folder acting as the mapping root.
    pub root_folder_id: String,
    /// Transfer direction: `bidirectional`, `upload_only`, or `download_only`.
    #[serde(default = "default_direction")]
    pub direction: String,
    /// Glob patterns excluded from sync.
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
    /// Per-mapping size ceiling in MiB (None means the global ceiling).
    #[serde(default)]
    pub max_file_size_mb: Option<u64>,
    /// Base priority assigned to uploads from this mapping.
    #[serde(default)]
    pub upload_priority: i32,
}

fn default_direction() -> String {
    "bidirectional".to_string()
}

// ---------------------------------------------------------------------------
// Config::load()
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/twindrive/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("twindrive")
            .join("config.yaml")
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

// Config derives Default because all its fields implement Default.
// (clippy::derivable_impls)

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 500,
            detection_window_secs: 3,
            hash_settle_ms: 1000,
            batch_window_ms: 500,
            sweep_interval_secs: 60,
            download_marker_ttl_secs: 30,
            hash_timeout_secs: 5,
            hash_cache_max: 1000,
            hash_cache_trim_to: 500,
        }
    }
}

impl Default for UploadsConfig {
    fn default() -> Self {
        Self {
            max_file_size_mb: 100,
            chunked_threshold_mb: 10,
            require_approval: true,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("~/.local/share"))
            .join("twindrive");
        Self {
            database_path: data_dir.join("state.db"),
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            request_timeout_secs: 30,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("~/.local/share"))
            .join("twindrive");
        Self {
            level: "info".to_string(),
            file: data_dir.join("twindrive.log"),
            max_size_mb: 50,
            max_files: 5,
        }
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"engine.debounce_ms"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Valid values for `mappings[].direction`.
const VALID_DIRECTIONS: &[&str] = &["bidirectional", "upload_only", "download_only"];

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- engine ---
        if self.engine.debounce_ms == 0 {
            errors.push(ValidationError {
                field: "engine.debounce_ms".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.engine.detection_window_secs == 0 {
            errors.push(ValidationError {
                field: "engine.detection_window_secs".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.engine.sweep_interval_secs == 0 {
            errors.push(ValidationError {
                field: "engine.sweep_interval_secs".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.engine.download_marker_ttl_secs == 0 {
            errors.push(ValidationError {
                field: "engine.download_marker_ttl_secs".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.engine.hash_timeout_secs == 0 {
            errors.push(ValidationError {
                field: "engine.hash_timeout_secs".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.engine.hash_cache_max == 0 {
            errors.push(ValidationError {
                field: "engine.hash_cache_max".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.engine.hash_cache_trim_to >= self.engine.hash_cache_max {
            errors.push(ValidationError {
                field: "engine.hash_cache_trim_to".into(),
                message: format!(
                    "hash_cache_trim_to ({}) must be less than hash_cache_max ({})",
                    self.engine.hash_cache_trim_to, self.engine.hash_cache_max
                ),
            });
        }

        // --- uploads ---
        if self.uploads.max_file_size_mb == 0 {
            errors.push(ValidationError {
                field: "uploads.max_file_size_mb".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.uploads.chunked_threshold_mb == 0 {
            errors.push(ValidationError {
                field: "uploads.chunked_threshold_mb".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.uploads.chunked_threshold_mb > self.uploads.max_file_size_mb {
            errors.push(ValidationError {
                field: "uploads.chunked_threshold_mb".into(),
                message: format!(
                    "chunked_threshold_mb ({}) must not exceed max_file_size_mb ({})",
                    self.uploads.chunked_threshold_mb, self.uploads.max_file_size_mb
                ),
            });
        }

        // --- remote ---
        if self.remote.base_url.is_empty() {
            errors.push(ValidationError {
                field: "remote.base_url".into(),
                message: "must not be empty".into(),
            });
        } else if !self.remote.base_url.starts_with("http://")
            && !self.remote.base_url.starts_with("https://")
        {
            errors.push(ValidationError {
                field: "remote.base_url".into(),
                message: format!("must be an http(s) URL, got '{}'", self.remote.base_url),
            });
        }
        if self.remote.request_timeout_secs == 0 {
            errors.push(ValidationError {
                field: "remote.request_timeout_secs".into(),
                message: "must be greater than 0".into(),
            });
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }
        if self.logging.max_size_mb == 0 {
            errors.push(ValidationError {
                field: "logging.max_size_mb".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.logging.max_files == 0 {
            errors.push(ValidationError {
                field: "logging.max_files".into(),
                message: "must be greater than 0".into(),
            });
        }

        // --- mappings ---
        for (i, mapping) in self.mappings.iter().enumerate() {
            if mapping.remote_drive_id.is_empty() {
                errors.push(ValidationError {
                    field: format!("mappings[{i}].remote_drive_id"),
                    message: "must not be empty".into(),
                });
            }
            if mapping.root_folder_id.is_empty() {
                errors.push(ValidationError {
                    field: format!("mappings[{i}].root_folder_id"),
                    message: "must not be empty".into(),
                });
            }

            // Check the local folder only when it does not start with `~`
            // (tilde is expanded at runtime).
            let folder_str = mapping.local_folder.to_string_lossy();
            if !folder_str.starts_with('~') && !mapping.local_folder.is_absolute() {
                errors.push(ValidationError {
                    field: format!("mappings[{i}].local_folder"),
                    message: format!(
                        "must be an absolute path, got '{}'",
                        mapping.local_folder.display()
                    ),
                });
            }

            if !VALID_DIRECTIONS.contains(&mapping.direction.as_str()) {
                errors.push(ValidationError {
                    field: format!("mappings[{i}].direction"),
                    message: format!(
                        "invalid direction '{}'; valid options: {}",
                        mapping.direction,
                        VALID_DIRECTIONS.join(", ")
                    ),
                });
            }

            if mapping.max_file_size_mb == Some(0) {
                errors.push(ValidationError {
                    field: format!("mappings[{i}].max_file_size_mb"),
                    message: "must be greater than 0 when set".into(),
                });
            }
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::default`] and allows selective overrides.
///
/// # Example
///
/// ```rust,no_run
/// use twindrive_core::config::ConfigBuilder;
/// use std::path::PathBuf;
///
/// let config = ConfigBuilder::new()
///     .store_database_path(PathBuf::from("/tmp/state.db"))
///     .engine_debounce_ms(250)
///     .logging_level("debug")
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder initialised with [`Config::default`] values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- engine ---

    pub fn engine_debounce_ms(mut self, ms: u64) -> Self {
        self.config.engine.debounce_ms = ms;
        self
    }

    pub fn engine_detection_window_secs(mut self, seconds: u64) -> Self {
        self.config.engine.detection_window_secs = seconds;
        self
    }

    pub fn engine_hash_settle_ms(mut self, ms: u64) -> Self {
        self.config.engine.hash_settle_ms = ms;
        self
    }

    pub fn engine_batch_window_ms(mut self, ms: u64) -> Self {
        self.config.engine.batch_window_ms = ms;
        self
    }

    pub fn engine_sweep_interval_secs(mut self, seconds: u64) -> Self {
        self.config.engine.sweep_interval_secs = seconds;
        self
    }

    pub fn engine_download_marker_ttl_secs(mut self, seconds: u64) -> Self {
        self.config.engine.download_marker_ttl_secs = seconds;
        self
    }

    pub fn engine_hash_timeout_secs(mut self, seconds: u64) -> Self {
        self.config.engine.hash_timeout_secs = seconds;
        self
    }

    pub fn engine_hash_cache_max(mut self, max: usize) -> Self {
        self.config.engine.hash_cache_max = max;
        self
    }

    pub fn engine_hash_cache_trim_to(mut self, trim_to: usize) -> Self {
        self.config.engine.hash_cache_trim_to = trim_to;
        self
    }

    // --- uploads ---

    pub fn uploads_max_file_size_mb(mut self, mb: u64) -> Self {
        self.config.uploads.max_file_size_mb = mb;
        self
    }

    pub fn uploads_chunked_threshold_mb(mut self, mb: u64) -> Self {
        self.config.uploads.chunked_threshold_mb = mb;
        self
    }

    pub fn uploads_require_approval(mut self, require: bool) -> Self {
        self.config.uploads.require_approval = require;
        self
    }

    // --- store ---

    pub fn store_database_path(mut self, path: PathBuf) -> Self {
        self.config.store.database_path = path;
        self
    }

    // --- remote ---

    pub fn remote_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.remote.base_url = url.into();
        self
    }

    pub fn remote_request_timeout_secs(mut self, seconds: u64) -> Self {
        self.config.remote.request_timeout_secs = seconds;
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn logging_file(mut self, file: PathBuf) -> Self {
        self.config.logging.file = file;
        self
    }

    pub fn logging_max_size_mb(mut self, mb: u64) -> Self {
        self.config.logging.max_size_mb = mb;
        self
    }

    pub fn logging_max_files(mut self, n: u32) -> Self {
        self.config.logging.max_files = n;
        self
    }

    // --- mappings ---

    pub fn add_mapping(mut self, mapping: MappingConfig) -> Self {
        self.config.mappings.push(mapping);
        self
    }

    // --- build ---

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn test_mapping() -> MappingConfig {
        MappingConfig {
            remote_drive_id: "drive-1".to_string(),
            local_folder: PathBuf::from("/home/user/Drive"),
            root_folder_id: "root-1".to_string(),
            direction: "bidirectional".to_string(),
            exclude_patterns: vec![],
            max_file_size_mb: None,
            upload_priority: 0,
        }
    }

    // -- Defaults --

    #[test]
    fn default_config_has_sensible_values() {
        let cfg = Config::default();
        assert_eq!(cfg.engine.debounce_ms, 500);
        assert_eq!(cfg.engine.detection_window_secs, 3);
        assert_eq!(cfg.engine.hash_settle_ms, 1000);
        assert_eq!(cfg.engine.batch_window_ms, 500);
        assert_eq!(cfg.engine.sweep_interval_secs, 60);
        assert_eq!(cfg.engine.download_marker_ttl_secs, 30);
        assert_eq!(cfg.engine.hash_timeout_secs, 5);
        assert_eq!(cfg.engine.hash_cache_max, 1000);
        assert_eq!(cfg.engine.hash_cache_trim_to, 500);
        assert_eq!(cfg.uploads.max_file_size_mb, 100);
        assert_eq!(cfg.uploads.chunked_threshold_mb, 10);
        assert!(cfg.uploads.require_approval);
        assert!(cfg.store.database_path.to_string_lossy().contains("twindrive"));
        assert_eq!(cfg.remote.base_url, "http://localhost:8080");
        assert_eq!(cfg.remote.request_timeout_secs, 30);
        assert_eq!(cfg.logging.level, "info");
        assert_eq!(cfg.logging.max_size_mb, 50);
        assert_eq!(cfg.logging.max_files, 5);
        assert!(cfg.mappings.is_empty());
    }

    #[test]
    fn default_config_passes_validation() {
        let cfg = Config::default();
        let errors = cfg.validate();
        assert!(errors.is_empty(), "unexpected validation errors: {errors:?}");
    }

    // -- Loading --

    #[test]
    fn load_from_yaml_file() {
        let yaml = r#"
engine:
  debounce_ms: 250
  detection_window_secs: 5
  hash_settle_ms: 500
  batch_window_ms: 250
  sweep_interval_secs: 30
  download_marker_ttl_secs: 60
  hash_timeout_secs: 10
  hash_cache_max: 2000
  hash_cache_trim_to: 1000
uploads:
  max_file_size_mb: 200
  chunked_threshold_mb: 20
  require_approval: false
store:
  database_path: /tmp/twindrive-test.db
remote:
  base_url: https://drive.example.com
  request_timeout_secs: 60
logging:
  level: debug
  file: /tmp/test.log
  max_size_mb: 25
  max_files: 3
mappings:
  - remote_drive_id: drive-abc
    local_folder: /data/drive
    root_folder_id: root-xyz
    direction: upload_only
    exclude_patterns:
      - "*.tmp"
      - ".git/**"
    max_file_size_mb: 50
    upload_priority: 5
"#;
        let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
        tmp.write_all(yaml.as_bytes()).unwrap();
        tmp.flush().unwrap();

        let cfg = Config::load(tmp.path()).expect("load config");
        assert_eq!(cfg.engine.debounce_ms, 250);
        assert_eq!(cfg.engine.detection_window_secs, 5);
        assert_eq!(cfg.engine.hash_cache_max, 2000);
        assert_eq!(cfg.uploads.max_file_size_mb, 200);
        assert!(!cfg.uploads.require_approval);
        assert_eq!(cfg.store.database_path, PathBuf::from("/tmp/twindrive-test.db"));
        assert_eq!(cfg.remote.base_url, "https://drive.example.com");
        assert_eq!(cfg.logging.level, "debug");
        assert_eq!(cfg.logging.max_files, 3);
        assert_eq!(cfg.mappings.len(), 1);
        assert_eq!(cfg.mappings[0].remote_drive_id, "drive-abc");
        assert_eq!(cfg.mappings[0].direction, "upload_only");
        assert_eq!(cfg.mappings[0].exclude_patterns.len(), 2);
        assert_eq!(cfg.mappings[0].max_file_size_mb, Some(50));
        assert_eq!(cfg.mappings[0].upload_priority, 5);
    }

    #[test]
    fn load_or_default_returns_default_on_missing_file() {
        let cfg = Config::load_or_default(Path::new("/nonexistent/config.yaml"));
        assert_eq!(cfg.engine.debounce_ms, 500);
    }

    #[test]
    fn load_returns_error_on_invalid_yaml() {
        let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
        tmp.write_all(b"not: [valid: yaml: {{{").unwrap();
        tmp.flush().unwrap();

        let result = Config::load(tmp.path());
        assert!(result.is_err());
    }

    #[test]
    fn mapping_direction_defaults_to_bidirectional() {
        let yaml = r#"
remote_drive_id: drive-abc
local_folder: /data/drive
root_folder_id: root-xyz
"#;
        let mapping: MappingConfig = serde_yaml::from_str(yaml).expect("deserialize mapping");
        assert_eq!(mapping.direction, "bidirectional");
        assert!(mapping.exclude_patterns.is_empty());
        assert!(mapping.max_file_size_mb.is_none());
        assert_eq!(mapping.upload_priority, 0);
    }

    // -- Validation --

    #[test]
    fn validate_catches_zero_debounce() {
        let mut cfg = Config::default();
        cfg.engine.debounce_ms = 0;
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "engine.debounce_ms"));
    }

    #[test]
    fn validate_catches_zero_detection_window() {
        let mut cfg = Config::default();
        cfg.engine.detection_window_secs = 0;
        let errors = cfg.validate();
        assert!(errors
            .iter()
            .any(|e| e.field == "engine.detection_window_secs"));
    }

    #[test]
    fn validate_catches_trim_target_at_or_above_max() {
        let mut cfg = Config::default();
        cfg.engine.hash_cache_trim_to = 1000;
        cfg.engine.hash_cache_max = 1000;
        let errors = cfg.validate();
        assert!(errors
            .iter()
            .any(|e| e.field == "engine.hash_cache_trim_to" && e.message.contains("less than")));
    }

    #[test]
    fn validate_catches_chunked_threshold_exceeding_ceiling() {
        let mut cfg = Config::default();
        cfg.uploads.chunked_threshold_mb = 200;
        cfg.uploads.max_file_size_mb = 100;
        let errors = cfg.validate();
        assert!(errors.iter().any(
            |e| e.field == "uploads.chunked_threshold_mb" && e.message.contains("must not exceed")
        ));
    }

    #[test]
    fn validate_catches_invalid_base_url() {
        let mut cfg = Config::default();
        cfg.remote.base_url = "ftp://drive.example.com".to_string();
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "remote.base_url"));

        cfg.remote.base_url = String::new();
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "remote.base_url"));
    }

    #[test]
    fn validate_catches_invalid_log_level() {
        let mut cfg = Config::default();
        cfg.logging.level = "verbose".to_string();
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "logging.level"));
    }

    #[test]
    fn validate_accepts_all_valid_log_levels() {
        for level in VALID_LOG_LEVELS {
            let mut cfg = Config::default();
            cfg.logging.level = level.to_string();
            let errors = cfg.validate();
            assert!(
                !errors.iter().any(|e| e.field == "logging.level"),
                "level '{level}' should be valid"
            );
        }
    }

    #[test]
    fn validate_catches_empty_mapping_ids() {
        let mut cfg = Config::default();
        let mut mapping = test_mapping();
        mapping.remote_drive_id = String::new();
        mapping.root_folder_id = String::new();
        cfg.mappings.push(mapping);
        let errors = cfg.validate();
        assert!(errors
            .iter()
            .any(|e| e.field == "mappings[0].remote_drive_id"));
        assert!(errors
            .iter()
            .any(|e| e.field == "mappings[0].root_folder_id"));
    }

    #[test]
    fn validate_catches_relative_local_folder() {
        let mut cfg = Config::default();
        let mut mapping = test_mapping();
        mapping.local_folder = PathBuf::from("relative/path");
        cfg.mappings.push(mapping);
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "mappings[0].local_folder"));
    }

    #[test]
    fn validate_accepts_tilde_local_folder() {
        let mut cfg = Config::default();
        let mut mapping = test_mapping();
        mapping.local_folder = PathBuf::from("~/Drive");
        cfg.mappings.push(mapping);
        let errors = cfg.validate();
        assert!(!errors.iter().any(|e| e.field == "mappings[0].local_folder"));
    }

    #[test]
    fn validate_catches_invalid_direction() {
        let mut cfg = Config::default();
        let mut mapping = test_mapping();
        mapping.direction = "sideways".to_string();
        cfg.mappings.push(mapping);
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "mappings[0].direction"));
    }

    #[test]
    fn validate_catches_zero_mapping_ceiling() {
        let mut cfg = Config::default();
        let mut mapping = test_mapping();
        mapping.max_file_size_mb = Some(0);
        cfg.mappings.push(mapping);
        let errors = cfg.validate();
        assert!(errors
            .iter()
            .any(|e| e.field == "mappings[0].max_file_size_mb"));
    }

    #[test]
    fn validate_reports_field_per_mapping_index() {
        let mut cfg = Config::default();
        cfg.mappings.push(test_mapping());
        let mut bad = test_mapping();
        bad.direction = "nope".to_string();
        cfg.mappings.push(bad);
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "mappings[1].direction"));
        assert!(!errors.iter().any(|e| e.field == "mappings[0].direction"));
    }

    // -- Builder --

    #[test]
    fn builder_starts_from_defaults() {
        let cfg = ConfigBuilder::new().build();
        assert_eq!(cfg.engine.debounce_ms, 500);
        assert_eq!(cfg.uploads.max_file_size_mb, 100);
    }

    #[test]
    fn builder_overrides_fields() {
        let cfg = ConfigBuilder::new()
            .engine_debounce_ms(250)
            .engine_detection_window_secs(5)
            .engine_hash_settle_ms(2000)
            .engine_batch_window_ms(100)
            .engine_sweep_interval_secs(120)
            .engine_download_marker_ttl_secs(15)
            .engine_hash_timeout_secs(10)
            .engine_hash_cache_max(5000)
            .engine_hash_cache_trim_to(2500)
            .uploads_max_file_size_mb(500)
            .uploads_chunked_threshold_mb(50)
            .uploads_require_approval(false)
            .store_database_path(PathBuf::from("/custom/state.db"))
            .remote_base_url("https://drive.example.com")
            .remote_request_timeout_secs(90)
            .logging_level("trace")
            .logging_file(PathBuf::from("/tmp/twindrive.log"))
            .logging_max_size_mb(100)
            .logging_max_files(10)
            .add_mapping(test_mapping())
            .build();

        assert_eq!(cfg.engine.debounce_ms, 250);
        assert_eq!(cfg.engine.detection_window_secs, 5);
        assert_eq!(cfg.engine.hash_settle_ms, 2000);
        assert_eq!(cfg.engine.batch_window_ms, 100);
        assert_eq!(cfg.engine.sweep_interval_secs, 120);
        assert_eq!(cfg.engine.download_marker_ttl_secs, 15);
        assert_eq!(cfg.engine.hash_timeout_secs, 10);
        assert_eq!(cfg.engine.hash_cache_max, 5000);
        assert_eq!(cfg.engine.hash_cache_trim_to, 2500);
        assert_eq!(cfg.uploads.max_file_size_mb, 500);
        assert_eq!(cfg.uploads.chunked_threshold_mb, 50);
        assert!(!cfg.uploads.require_approval);
        assert_eq!(cfg.store.database_path, PathBuf::from("/custom/state.db"));
        assert_eq!(cfg.remote.base_url, "https://drive.example.com");
        assert_eq!(cfg.remote.request_timeout_secs, 90);
        assert_eq!(cfg.logging.level, "trace");
        assert_eq!(cfg.logging.file, PathBuf::from("/tmp/twindrive.log"));
        assert_eq!(cfg.logging.max_size_mb, 100);
        assert_eq!(cfg.logging.max_files, 10);
        assert_eq!(cfg.mappings.len(), 1);
    }

    #[test]
    fn builder_build_validated_succeeds_for_valid_config() {
        let result = ConfigBuilder::new().add_mapping(test_mapping()).build_validated();
        assert!(result.is_ok());
    }

    #[test]
    fn builder_build_validated_fails_for_invalid_config() {
        let result = ConfigBuilder::new()
            .engine_debounce_ms(0)
            .logging_level("nope")
            .build_validated();
        assert!(result.is_err());
        let errors = result.unwrap_err();
        assert!(errors.len() >= 2);
    }

    // -- default_path --

    #[test]
    fn default_path_ends_with_config_yaml() {
        let p = Config::default_path();
        assert!(p.ends_with("twindrive/config.yaml"));
    }

    // -- ValidationError Display --

    #[test]
    fn validation_error_display() {
        let err = ValidationError {
            field: "engine.debounce_ms".into(),
            message: "must be greater than 0".into(),
        };
        assert_eq!(err.to_string(), "engine.debounce_ms: must be greater than 0");
    }
}
