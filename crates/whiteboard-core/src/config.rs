//! Configuration loading and validation.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, WhiteboardError};
use crate::protocol::DEFAULT_PORT;

/// Canvases larger than this many cells trigger a validation warning.
const LARGE_CANVAS_CELLS: usize = 16_000_000;

/// Top-level whiteboard server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<ServerConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub canvas: Option<CanvasConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    /// Address to bind (default: all interfaces).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind: Option<String>,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

/// Dimensions used for every whiteboard created on this server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanvasConfig {
    #[serde(default = "default_width")]
    pub width: usize,

    #[serde(default = "default_height")]
    pub height: usize,
}

fn default_width() -> usize {
    800
}

fn default_height() -> usize {
    600
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log format: "plain" (default) or "json".
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Log level override (trace/debug/info/warn/error).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,

    /// Per-crate log level overrides (e.g. "whiteboard_server=debug").
    #[serde(default)]
    pub filters: Vec<String>,

    /// Output target: "stderr" (default) or "stdout".
    #[serde(default = "default_log_output")]
    pub output: String,
}

fn default_log_format() -> String {
    "plain".into()
}

fn default_log_output() -> String {
    "stderr".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: default_log_format(),
            level: None,
            filters: Vec::new(),
            output: default_log_output(),
        }
    }
}

/// Substitute `${ENV_VAR}` patterns in a string with their environment variable values.
fn substitute_env_vars(input: &str) -> Result<String> {
    let re = regex::Regex::new(r"\$\{([^}]+)\}")
        .map_err(|e| WhiteboardError::Config(e.to_string()))?;
    Ok(re
        .replace_all(input, |caps: &regex::Captures| {
            std::env::var(&caps[1]).unwrap_or_default()
        })
        .into_owned())
}

impl Config {
    /// Load config from a JSON5 file, substituting `${ENV_VAR}` references.
    ///
    /// A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        debug!(path = %path.display(), "Loading config");
        let raw = std::fs::read_to_string(path)?;
        let substituted = substitute_env_vars(&raw)?;

        json5::from_str(&substituted).map_err(|e| WhiteboardError::Config(e.to_string()))
    }

    /// Default config file location.
    pub fn config_path() -> PathBuf {
        data_dir().join("config.json")
    }

    pub fn port(&self) -> u16 {
        self.server.as_ref().map(|s| s.port).unwrap_or(DEFAULT_PORT)
    }

    pub fn bind(&self) -> String {
        self.server
            .as_ref()
            .and_then(|s| s.bind.clone())
            .unwrap_or_else(|| "0.0.0.0".to_string())
    }

    /// Width and height for newly created whiteboards.
    pub fn canvas_size(&self) -> (usize, usize) {
        let canvas = self.canvas.clone().unwrap_or_default();
        (canvas.width, canvas.height)
    }

    /// Validate config, returning (warnings, errors).
    pub fn validate(&self) -> (Vec<String>, Vec<String>) {
        let mut warnings = Vec::new();
        let mut errors = Vec::new();

        if self.server.as_ref().is_some_and(|s| s.port == 0) {
            errors.push("Server port cannot be 0".to_string());
        }

        let (width, height) = self.canvas_size();
        if width == 0 || height == 0 {
            errors.push(format!(
                "Canvas dimensions must be positive (got {width}x{height})"
            ));
        } else if width.saturating_mul(height) > LARGE_CANVAS_CELLS {
            warnings.push(format!(
                "Canvas of {width}x{height} cells allocates a large grid per whiteboard"
            ));
        }

        if let Some(logging) = &self.logging {
            if logging.format != "plain" && logging.format != "json" {
                errors.push(format!("Unknown log format: {}", logging.format));
            }
            if logging.output != "stderr" && logging.output != "stdout" {
                errors.push(format!("Unknown log output: {}", logging.output));
            }
        }

        (warnings, errors)
    }

    /// Save config to a file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// Base directory for whiteboard data: `~/.whiteboard/`
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".whiteboard")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.port(), 4444);
        assert_eq!(config.bind(), "0.0.0.0");
        assert_eq!(config.canvas_size(), (800, 600));
        let (warnings, errors) = config.validate();
        assert!(warnings.is_empty());
        assert!(errors.is_empty());
    }

    #[test]
    fn test_env_var_substitution() {
        // SAFETY: test-only, the variable name is unique to this test
        unsafe { std::env::set_var("TEST_WB_PORT", "5555") };
        let input = r#"{ server: { port: ${TEST_WB_PORT} }, note: "plain" }"#;
        let result = substitute_env_vars(input).unwrap();
        assert!(result.contains("5555"));
        assert!(result.contains("plain"));
        unsafe { std::env::remove_var("TEST_WB_PORT") };
    }

    #[test]
    fn test_env_var_missing() {
        let input = r#"{"bind": "${NONEXISTENT_VAR_WB_TEST}"}"#;
        let result = substitute_env_vars(input).unwrap();
        assert_eq!(result, r#"{"bind": ""}"#);
    }

    #[test]
    fn test_section_defaults() {
        let config: Config = json5::from_str("{ server: {}, canvas: { width: 10 }, logging: {} }").unwrap();
        assert_eq!(config.port(), 4444);
        assert_eq!(config.canvas_size(), (10, 600));
        let logging = config.logging.expect("logging should be present");
        assert_eq!(logging.format, "plain");
        assert!(logging.level.is_none());
        assert_eq!(logging.output, "stderr");
        assert!(logging.filters.is_empty());
    }

    #[test]
    fn test_validate_errors() {
        let config: Config = json5::from_str(
            r#"{
                server: { port: 0 },
                canvas: { width: 0, height: 10 },
                logging: { format: "xml" },
            }"#,
        )
        .unwrap();
        let (_, errors) = config.validate();
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn test_validate_large_canvas_warns() {
        let config = Config {
            canvas: Some(CanvasConfig {
                width: 10_000,
                height: 10_000,
            }),
            ..Default::default()
        };
        let (warnings, errors) = config.validate();
        assert_eq!(warnings.len(), 1);
        assert!(errors.is_empty());
    }

    #[test]
    fn test_load_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("absent.json")).unwrap();
        assert!(config.server.is_none());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = Config {
            server: Some(ServerConfig {
                port: 4545,
                bind: Some("127.0.0.1".into()),
            }),
            ..Default::default()
        };
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.port(), 4545);
        assert_eq!(loaded.bind(), "127.0.0.1");
    }

    #[test]
    fn test_load_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ server: ").unwrap();
        assert!(matches!(Config::load(&path), Err(WhiteboardError::Config(_))));
    }
}
