//! Widget Settings
//!
//! Everything the embedding application can configure: where the backend
//! lives, how the widget greets and labels things, and which auxiliary
//! features are switched on.
//!
//! # Configuration Priority
//!
//! Settings are loaded with the following priority (highest first):
//! 1. Values set programmatically by the embedding application
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! [client]
//! host = "cat.example.org"
//! port = 443
//! secure = true
//! auth_key = "meow"
//!
//! [widget]
//! user_id = "alice"
//! dark = true
//! why = true
//! defaults = ["Where is the white rabbit?"]
//! features = ["file", "web", "reset"]
//! ```

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::conversation::MessagePreprocessor;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading settings
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// A feature name that is not one of the known features
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown widget feature `{0}` (expected one of: memory, web, file, reset, record)")]
pub struct FeatureParseError(pub String);

// =============================================================================
// Features
// =============================================================================

/// Optional widget capabilities
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Feature {
    /// Upload a memories export
    Memory,
    /// Send a website down the rabbit hole
    Web,
    /// Send a document down the rabbit hole
    File,
    /// Wipe the conversation
    Reset,
    /// Voice dictation
    Record,
}

impl Feature {
    /// Every feature, in menu order
    pub const ALL: [Feature; 5] = [
        Feature::Memory,
        Feature::Web,
        Feature::File,
        Feature::Reset,
        Feature::Record,
    ];

    /// Lowercase name used in settings
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Web => "web",
            Self::File => "file",
            Self::Reset => "reset",
            Self::Record => "record",
        }
    }

    /// Whether the feature lives in the attachment menu
    #[must_use]
    pub fn in_menu(&self) -> bool {
        *self != Self::Record
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Feature {
    type Err = FeatureParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|f| f.as_str() == name)
            .ok_or_else(|| FeatureParseError(s.trim().to_string()))
    }
}

/// Parse a comma-separated feature list
///
/// # Errors
///
/// Returns the first name that is not a known feature.
pub fn parse_features(list: &str) -> Result<Vec<Feature>, FeatureParseError> {
    let mut features = Vec::new();
    for name in list.split(',').filter(|s| !s.trim().is_empty()) {
        let feature: Feature = name.parse()?;
        if !features.contains(&feature) {
            features.push(feature);
        }
    }
    Ok(features)
}

// =============================================================================
// Settings
// =============================================================================

/// Widget settings
///
/// Compared by value: the session controller rebuilds its backend client
/// whenever two consecutive settings differ. The `callback` is compared by
/// identity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WidgetSettings {
    /// Backend host
    pub host: String,
    /// Backend port
    pub port: u16,
    /// Use TLS (`https`/`wss`)
    pub secure: bool,
    /// Backend API key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_key: Option<String>,
    /// User the messages are sent as
    pub user_id: String,
    /// Dark theme
    pub dark: bool,
    /// Show the why panel on bot replies
    pub why: bool,
    /// Text shown while waiting for a reply
    pub thinking: String,
    /// Input placeholder
    pub placeholder: String,
    /// Primary color (any CSS color, empty for the theme default)
    pub primary: String,
    /// Suggested first messages (empty for the built-in list)
    pub defaults: Vec<String>,
    /// Enabled features
    pub features: Vec<Feature>,
    /// Transforms outgoing text before it is sent
    #[serde(skip)]
    pub callback: Option<MessagePreprocessor>,
}

impl Default for WidgetSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1865,
            secure: false,
            auth_key: None,
            user_id: "user".to_string(),
            dark: false,
            why: false,
            thinking: "Cheshire Cat is thinking...".to_string(),
            placeholder: "Ask the Cheshire Cat...".to_string(),
            primary: String::new(),
            defaults: Vec::new(),
            features: Feature::ALL.to_vec(),
            callback: None,
        }
    }
}

impl WidgetSettings {
    /// Create settings with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the backend host
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the user messages are sent as
    #[must_use]
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self
    }

    /// Set the enabled features
    #[must_use]
    pub fn with_features(mut self, features: impl IntoIterator<Item = Feature>) -> Self {
        self.features = features.into_iter().collect();
        self
    }

    /// Set the suggested first messages
    #[must_use]
    pub fn with_defaults<S: Into<String>>(mut self, defaults: impl IntoIterator<Item = S>) -> Self {
        self.defaults = defaults.into_iter().map(Into::into).collect();
        self
    }

    /// Set the outgoing-text preprocessor
    #[must_use]
    pub fn with_callback(mut self, callback: MessagePreprocessor) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Whether a feature is enabled
    #[must_use]
    pub fn has_feature(&self, feature: Feature) -> bool {
        self.features.contains(&feature)
    }

    /// Whether any attachment-menu feature is enabled
    #[must_use]
    pub fn has_menu(&self) -> bool {
        self.features.iter().any(Feature::in_menu)
    }

    /// HTTP base URL of the backend
    #[must_use]
    pub fn base_url(&self) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        format!("{scheme}://{}:{}", self.host, self.port)
    }

    /// WebSocket URL of the user's chat connection
    #[must_use]
    pub fn ws_url(&self) -> String {
        let scheme = if self.secure { "wss" } else { "ws" };
        format!("{scheme}://{}:{}/ws/{}", self.host, self.port, self.user_id)
    }

    /// Check the settings can produce a client
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] for an empty host, a zero port
    /// or an empty user id.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "host must not be empty".into(),
            ));
        }
        if self.port == 0 {
            return Err(ConfigError::ValidationError("port must not be 0".into()));
        }
        if self.user_id.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "user_id must not be empty".into(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Configuration Source Tracking
// =============================================================================

/// Tracks where the configuration values came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    Default,
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

/// Settings together with where they came from
#[derive(Clone, Debug)]
pub struct LoadedSettings {
    /// The resolved settings
    pub settings: WidgetSettings,
    /// Highest-priority source that contributed a value
    pub source: ConfigSource,
    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// Client section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientToml {
    /// Backend host
    pub host: Option<String>,
    /// Backend port
    pub port: Option<u16>,
    /// Use TLS
    pub secure: Option<bool>,
    /// Backend API key
    pub auth_key: Option<String>,
}

/// Widget section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WidgetToml {
    /// User the messages are sent as
    pub user_id: Option<String>,
    /// Dark theme
    pub dark: Option<bool>,
    /// Show the why panel
    pub why: Option<bool>,
    /// Thinking text
    pub thinking: Option<String>,
    /// Input placeholder
    pub placeholder: Option<String>,
    /// Primary color
    pub primary: Option<String>,
    /// Suggested first messages
    pub defaults: Option<Vec<String>>,
    /// Enabled features
    pub features: Option<Vec<Feature>>,
}

/// Root of the TOML configuration file
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsToml {
    /// `[client]`
    pub client: ClientToml,
    /// `[widget]`
    pub widget: WidgetToml,
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/catwidget/widget.toml` or
/// `~/.config/catwidget/widget.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("catwidget").join("widget.toml"))
}

/// Load settings from the default file and the environment
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed, or if the
/// resulting settings are invalid. A missing config file is not an error.
pub fn load_settings() -> Result<LoadedSettings, ConfigError> {
    load_settings_from_path(default_config_path())
}

/// Load settings from a specific path and the environment
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed, or
/// if the resulting settings are invalid.
pub fn load_settings_from_path(path: Option<PathBuf>) -> Result<LoadedSettings, ConfigError> {
    load_settings_with_env(path, |key| std::env::var(key).ok())
}

/// Load settings, resolving environment variables through `env`
///
/// # Errors
///
/// See [`load_settings_from_path`].
pub fn load_settings_with_env<E>(
    path: Option<PathBuf>,
    env: E,
) -> Result<LoadedSettings, ConfigError>
where
    E: Fn(&str) -> Option<String>,
{
    let mut loaded = LoadedSettings {
        settings: WidgetSettings::default(),
        source: ConfigSource::Default,
        config_file_path: None,
    };

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: SettingsToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut loaded.settings, &toml_config);
            loaded.config_file_path = Some(config_path.clone());
            loaded.source = ConfigSource::File;

            tracing::info!(
                path = %config_path.display(),
                "Loaded widget settings from file"
            );
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    if apply_env_config(&mut loaded.settings, env) {
        loaded.source = ConfigSource::Env;
    }

    loaded.settings.validate()?;
    Ok(loaded)
}

/// Apply TOML configuration values to the settings
fn apply_toml_config(settings: &mut WidgetSettings, toml: &SettingsToml) {
    if let Some(ref host) = toml.client.host {
        settings.host.clone_from(host);
    }
    if let Some(port) = toml.client.port {
        settings.port = port;
    }
    if let Some(secure) = toml.client.secure {
        settings.secure = secure;
    }
    if toml.client.auth_key.is_some() {
        settings.auth_key.clone_from(&toml.client.auth_key);
    }

    let widget = &toml.widget;
    if let Some(ref user_id) = widget.user_id {
        settings.user_id.clone_from(user_id);
    }
    if let Some(dark) = widget.dark {
        settings.dark = dark;
    }
    if let Some(why) = widget.why {
        settings.why = why;
    }
    if let Some(ref thinking) = widget.thinking {
        settings.thinking.clone_from(thinking);
    }
    if let Some(ref placeholder) = widget.placeholder {
        settings.placeholder.clone_from(placeholder);
    }
    if let Some(ref primary) = widget.primary {
        settings.primary.clone_from(primary);
    }
    if let Some(ref defaults) = widget.defaults {
        settings.defaults.clone_from(defaults);
    }
    if let Some(ref features) = widget.features {
        settings.features.clone_from(features);
    }
}

/// Apply environment variable overrides; returns whether any applied
fn apply_env_config<E>(settings: &mut WidgetSettings, env: E) -> bool
where
    E: Fn(&str) -> Option<String>,
{
    let mut applied = false;

    if let Some(host) = env("CATWIDGET_HOST") {
        settings.host = host;
        applied = true;
    }
    if let Some(port) = env("CATWIDGET_PORT") {
        match port.parse::<u16>() {
            Ok(p) => {
                settings.port = p;
                applied = true;
            }
            Err(e) => tracing::warn!(value = %port, error = %e, "Ignoring CATWIDGET_PORT"),
        }
    }
    if let Some(secure) = env("CATWIDGET_SECURE") {
        settings.secure = parse_flag(&secure);
        applied = true;
    }
    if let Some(key) = env("CATWIDGET_AUTH_KEY") {
        settings.auth_key = Some(key);
        applied = true;
    }
    if let Some(user) = env("CATWIDGET_USER") {
        settings.user_id = user;
        applied = true;
    }
    if let Some(dark) = env("CATWIDGET_DARK") {
        settings.dark = parse_flag(&dark);
        applied = true;
    }
    if let Some(why) = env("CATWIDGET_WHY") {
        settings.why = parse_flag(&why);
        applied = true;
    }
    if let Some(list) = env("CATWIDGET_FEATURES") {
        match parse_features(&list) {
            Ok(features) => {
                settings.features = features;
                applied = true;
            }
            Err(e) => tracing::warn!(error = %e, "Ignoring CATWIDGET_FEATURES"),
        }
    }

    applied
}

fn parse_flag(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}
