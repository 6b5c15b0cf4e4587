//! Configuration for voicelink.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (VOICELINK_HOME, VOICELINK_SESSION)
//! 2. Config file (.voicelink/config.yaml)
//! 3. Defaults (~/.voicelink, session "live_transcription_chat")
//!
//! Config file discovery:
//! - Searches current directory and parents for .voicelink/config.yaml
//! - `paths.home` is relative to the .voicelink/ directory

pub mod profile;

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

pub const DEFAULT_SESSION: &str = "live_transcription_chat";

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub session: Option<SessionConfig>,
    #[serde(default)]
    pub assist: Option<AssistConfig>,
    #[serde(default)]
    pub notifications: Option<NotificationConfig>,
    #[serde(default)]
    pub replies: Option<RepliesConfig>,
    #[serde(default)]
    pub capture: Option<CaptureConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// State directory (relative to .voicelink/)
    pub home: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssistConfig {
    pub backend: Option<AssistBackendKind>,
    pub model: Option<String>,
    pub endpoint: Option<String>,
    pub api_key_env: Option<String>,
    pub command: Option<Vec<String>>,
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationConfig {
    pub muted: Option<bool>,
    pub tone_hz: Option<u32>,
    pub tone_ms: Option<u64>,
    pub haptic_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RepliesConfig {
    pub presets: Option<Vec<String>>,
    pub emojis: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CaptureConfig {
    pub language: Option<String>,
}

/// Which completion backend serves assist requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssistBackendKind {
    /// Gemini generateContent over HTTPS
    Gemini,

    /// Local command reading the prompt from stdin
    Command,
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Absolute path to voicelink home (state)
    pub home: PathBuf,
    /// Session (shared log) name
    pub session: String,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    pub assist: AssistSettings,
    pub notifications: NotificationSettings,
    pub replies: ReplySettings,
    pub capture: CaptureSettings,
}

#[derive(Debug, Clone)]
pub struct AssistSettings {
    pub backend: AssistBackendKind,
    pub model: String,
    pub endpoint: String,
    pub api_key_env: String,
    pub command: Vec<String>,
    pub timeout_seconds: u64,
}

impl Default for AssistSettings {
    fn default() -> Self {
        Self {
            backend: AssistBackendKind::Gemini,
            model: "gemini-2.5-flash".to_string(),
            endpoint: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            api_key_env: "GEMINI_API_KEY".to_string(),
            command: vec!["fabric".to_string(), "-p".to_string(), "raw_query".to_string()],
            timeout_seconds: 30,
        }
    }
}

impl AssistSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

#[derive(Debug, Clone)]
pub struct NotificationSettings {
    pub muted: bool,
    pub tone_hz: u32,
    pub tone_ms: u64,
    pub haptic_ms: u64,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            muted: false,
            tone_hz: 880,
            tone_ms: 150,
            haptic_ms: 200,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReplySettings {
    pub presets: Vec<String>,
    pub emojis: Vec<String>,
}

impl Default for ReplySettings {
    fn default() -> Self {
        Self {
            presets: ["Got it", "Thank you", "One moment please", "OK!", "I'll check"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            emojis: ["👍", "👌", "🙆", "🙅", "🙏", "😊"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CaptureSettings {
    /// BCP 47 tag handed to capture backends
    pub language: String,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            language: "ja-JP".to_string(),
        }
    }
}

impl ResolvedConfig {
    /// Directory holding all session logs
    pub fn sessions_dir(&self) -> PathBuf {
        self.home.join("sessions")
    }

    /// Local participant profile
    pub fn profile_path(&self) -> PathBuf {
        self.home.join("profile.json")
    }
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(".voicelink").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the config file's parent
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

/// Layer a parsed config file over the defaults (env vars not applied)
fn apply_file(config: ConfigFile, config_dir: &Path, default_home: PathBuf) -> ResolvedConfig {
    let home = config
        .paths
        .home
        .as_deref()
        .map(|h| resolve_path(config_dir, h))
        .unwrap_or(default_home);

    let session = config
        .session
        .and_then(|s| s.name)
        .unwrap_or_else(|| DEFAULT_SESSION.to_string());

    let mut assist = AssistSettings::default();
    if let Some(a) = config.assist {
        assist.backend = a.backend.unwrap_or(assist.backend);
        assist.model = a.model.unwrap_or(assist.model);
        assist.endpoint = a.endpoint.unwrap_or(assist.endpoint);
        assist.api_key_env = a.api_key_env.unwrap_or(assist.api_key_env);
        assist.command = a.command.unwrap_or(assist.command);
        assist.timeout_seconds = a.timeout_seconds.unwrap_or(assist.timeout_seconds);
    }

    let mut notifications = NotificationSettings::default();
    if let Some(n) = config.notifications {
        notifications.muted = n.muted.unwrap_or(notifications.muted);
        notifications.tone_hz = n.tone_hz.unwrap_or(notifications.tone_hz);
        notifications.tone_ms = n.tone_ms.unwrap_or(notifications.tone_ms);
        notifications.haptic_ms = n.haptic_ms.unwrap_or(notifications.haptic_ms);
    }

    let mut replies = ReplySettings::default();
    if let Some(r) = config.replies {
        replies.presets = r.presets.unwrap_or(replies.presets);
        replies.emojis = r.emojis.unwrap_or(replies.emojis);
    }

    let capture = CaptureSettings {
        language: config
            .capture
            .and_then(|c| c.language)
            .unwrap_or_else(|| CaptureSettings::default().language),
    };

    ResolvedConfig {
        home,
        session,
        config_file: None,
        assist,
        notifications,
        replies,
        capture,
    }
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(".voicelink");

    let config_file = find_config_file();

    let mut resolved = if let Some(ref config_path) = config_file {
        let config = load_config_file(config_path)?;
        let config_dir = config_path.parent().unwrap_or(Path::new("."));
        let mut resolved = apply_file(config, config_dir, default_home);
        resolved.config_file = Some(config_path.clone());
        resolved
    } else {
        ResolvedConfig {
            home: default_home,
            session: DEFAULT_SESSION.to_string(),
            config_file: None,
            assist: AssistSettings::default(),
            notifications: NotificationSettings::default(),
            replies: ReplySettings::default(),
            capture: CaptureSettings::default(),
        }
    };

    if let Ok(env_home) = std::env::var("VOICELINK_HOME") {
        resolved.home = PathBuf::from(env_home);
    }
    if let Ok(env_session) = std::env::var("VOICELINK_SESSION") {
        resolved.session = env_session;
    }

    Ok(resolved)
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| e.to_string()));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}

/// Force reload configuration (useful for testing)
pub fn reload_config() -> Result<ResolvedConfig> {
    load_config()
}
