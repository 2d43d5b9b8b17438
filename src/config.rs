use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::typing::InputMethod;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("{0} is not set (put it in config.toml or export the environment variable)")]
    MissingCredential(&'static str),
}

#[derive(Debug, Deserialize)]
pub struct Config {
    /// Exact title of the game window
    #[serde(default = "default_window_title")]
    pub window_title: String,
    /// Where captured screenshots are written before upload
    #[serde(default = "default_screenshot_dir")]
    pub screenshot_dir: PathBuf,
    #[serde(default)]
    pub typing: TypingConfig,
    #[serde(default)]
    pub cycle: CycleConfig,
    #[serde(default)]
    pub imgur: ImgurConfig,
    #[serde(default)]
    pub vision: VisionConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            window_title: default_window_title(),
            screenshot_dir: default_screenshot_dir(),
            typing: TypingConfig::default(),
            cycle: CycleConfig::default(),
            imgur: ImgurConfig::default(),
            vision: VisionConfig::default(),
        }
    }
}

fn default_window_title() -> String {
    "The Chef's Shift".into()
}

fn default_screenshot_dir() -> PathBuf {
    "screenshots".into()
}

// ============================================================================
// Typing Config
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct TypingConfig {
    /// "key" (one key click per character) or "text" (unicode text injection)
    #[serde(default)]
    pub method: InputMethod,
    /// Pause between two characters of a word
    #[serde(default = "default_char_interval")]
    pub char_interval_ms: u64,
    /// How long the dispatcher waits on an empty queue before re-checking stop
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_ms: u64,
    /// Pause after activating the window, before the first keystroke
    #[serde(default = "default_settle_delay")]
    pub settle_delay_ms: u64,
}

impl Default for TypingConfig {
    fn default() -> Self {
        Self {
            method: InputMethod::default(),
            char_interval_ms: default_char_interval(),
            poll_timeout_ms: default_poll_timeout(),
            settle_delay_ms: default_settle_delay(),
        }
    }
}

fn default_char_interval() -> u64 {
    50
}

fn default_poll_timeout() -> u64 {
    100
}

fn default_settle_delay() -> u64 {
    100
}

// ============================================================================
// Cycle Config
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CycleConfig {
    /// Pause between two capture/plan cycles
    #[serde(default = "default_cycle_delay")]
    pub delay_ms: u64,
    /// Pause after activating the window, before the screenshot
    #[serde(default = "default_capture_settle")]
    pub capture_settle_ms: u64,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            delay_ms: default_cycle_delay(),
            capture_settle_ms: default_capture_settle(),
        }
    }
}

fn default_cycle_delay() -> u64 {
    2000
}

fn default_capture_settle() -> u64 {
    500
}

// ============================================================================
// Imgur Config
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ImgurConfig {
    /// Imgur application client id (supports ${ENV_VAR} syntax)
    #[serde(default = "default_imgur_client_id")]
    pub client_id: String,
    #[serde(default = "default_imgur_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
}

impl Default for ImgurConfig {
    fn default() -> Self {
        Self {
            client_id: default_imgur_client_id(),
            endpoint: default_imgur_endpoint(),
            timeout_secs: default_http_timeout(),
        }
    }
}

fn default_imgur_client_id() -> String {
    "${IMGUR_CLIENT_ID}".into()
}

fn default_imgur_endpoint() -> String {
    "https://api.imgur.com/3/image".into()
}

fn default_http_timeout() -> u64 {
    60
}

// ============================================================================
// Vision Config
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct VisionConfig {
    /// OpenAI-compatible base URL
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// API key (supports ${ENV_VAR} syntax)
    #[serde(default = "default_api_key")]
    pub api_key: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            api_key: default_api_key(),
            max_tokens: default_max_tokens(),
            temperature: 0.0,
            timeout_secs: default_http_timeout(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}

fn default_model() -> String {
    "gpt-4o".into()
}

fn default_api_key() -> String {
    "${OPENAI_API_KEY}".into()
}

fn default_max_tokens() -> u32 {
    1000
}

/// Expand ${VAR} to environment variable values
fn expand_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    let mut from = 0;

    while let Some(offset) = result[from..].find("${") {
        let start = from + offset;
        let Some(end) = result[start..].find('}') else {
            break;
        };
        let var_name = &result[start + 2..start + end];
        let value = std::env::var(var_name).unwrap_or_else(|_| {
            tracing::warn!(var = var_name, "environment variable not found");
            String::new()
        });
        result.replace_range(start..start + end + 1, &value);
        from = start + value.len();
    }

    result
}

impl Config {
    /// Load `path`, falling back to defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            Self::from_toml(&text).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?
        } else {
            tracing::info!(path = %path.display(), "no config file, using defaults");
            Config::default()
        };

        config.resolve_env();
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    fn resolve_env(&mut self) {
        self.imgur.client_id = expand_env_vars(&self.imgur.client_id);
        self.vision.api_key = expand_env_vars(&self.vision.api_key);
    }

    pub fn require_imgur(&self) -> Result<(), ConfigError> {
        if self.imgur.client_id.trim().is_empty() {
            return Err(ConfigError::MissingCredential("IMGUR_CLIENT_ID"));
        }
        Ok(())
    }

    pub fn require_vision(&self) -> Result<(), ConfigError> {
        if self.vision.api_key.trim().is_empty() {
            return Err(ConfigError::MissingCredential("OPENAI_API_KEY"));
        }
        Ok(())
    }
}

impl TypingConfig {
    pub fn char_interval(&self) -> Duration {
        Duration::from_millis(self.char_interval_ms)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

impl CycleConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn capture_settle(&self) -> Duration {
        Duration::from_millis(self.capture_settle_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.window_title, "The Chef's Shift");
        assert_eq!(config.typing.char_interval(), Duration::from_millis(50));
        assert_eq!(config.typing.poll_timeout(), Duration::from_millis(100));
        assert_eq!(config.cycle.delay(), Duration::from_secs(2));
        assert_eq!(config.vision.model, "gpt-4o");
        assert_eq!(config.typing.method, InputMethod::Key);
    }

    #[test]
    fn test_partial_toml() {
        let config = Config::from_toml(
            r#"
            window_title = "Test Game"

            [typing]
            method = "text"
            char_interval_ms = 10

            [vision]
            model = "gpt-4o-mini"
            "#,
        )
        .unwrap();

        assert_eq!(config.window_title, "Test Game");
        assert_eq!(config.typing.method, InputMethod::Text);
        assert_eq!(config.typing.char_interval_ms, 10);
        assert_eq!(config.typing.settle_delay_ms, 100);
        assert_eq!(config.vision.model, "gpt-4o-mini");
        assert_eq!(config.vision.max_tokens, 1000);
        assert_eq!(config.cycle.delay_ms, 2000);
    }

    #[test]
    fn test_example_config_matches_defaults() {
        let config = Config::from_toml(include_str!("../config.example.toml")).unwrap();
        let defaults = Config::default();
        assert_eq!(config.window_title, defaults.window_title);
        assert_eq!(config.screenshot_dir, defaults.screenshot_dir);
        assert_eq!(config.typing.char_interval_ms, defaults.typing.char_interval_ms);
        assert_eq!(config.cycle.capture_settle_ms, defaults.cycle.capture_settle_ms);
        assert_eq!(config.imgur.client_id, defaults.imgur.client_id);
        assert_eq!(config.imgur.endpoint, defaults.imgur.endpoint);
        assert_eq!(config.vision.api_key, defaults.vision.api_key);
        assert_eq!(config.vision.base_url, defaults.vision.base_url);
    }

    #[test]
    fn test_expand_env_vars() {
        // SAFETY: the variable name is unique to this test
        unsafe { std::env::set_var("SHIFTCHEF_TEST_KEY", "secret") };
        assert_eq!(expand_env_vars("${SHIFTCHEF_TEST_KEY}"), "secret");
        assert_eq!(expand_env_vars("Bearer ${SHIFTCHEF_TEST_KEY}!"), "Bearer secret!");
        assert_eq!(expand_env_vars("${SHIFTCHEF_TEST_MISSING}"), "");
        assert_eq!(expand_env_vars("plain"), "plain");
        assert_eq!(expand_env_vars("${unterminated"), "${unterminated");
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.window_title, "The Chef's Shift");
    }

    #[test]
    fn test_load_rejects_malformed_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "window_title = ").unwrap();
        let err = Config::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_missing_credentials() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[imgur]\nclient_id = \"\"\n[vision]\napi_key = \"sk-test\"").unwrap();
        let config = Config::load(file.path()).unwrap();

        assert!(matches!(
            config.require_imgur(),
            Err(ConfigError::MissingCredential("IMGUR_CLIENT_ID"))
        ));
        assert!(config.require_vision().is_ok());
    }
}
