use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::Duration,
};

use crate::focus::{ListEntry, DEFAULT_THRESHOLD};

pub const GEMINI_API_KEY_ENV: &str = "GEMINI_API_KEY";
pub const EMBED_API_KEY_ENV: &str = "FOCUSLENS_EMBED_API_KEY";

/// How many anchors of each flavour the goal expander asks for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AnchorCounts {
    pub broad: usize,
    pub technical: usize,
    pub practical: usize,
}

impl Default for AnchorCounts {
    fn default() -> Self {
        Self {
            broad: 8,
            technical: 8,
            practical: 8,
        }
    }
}

impl AnchorCounts {
    pub fn total(&self) -> usize {
        self.broad + self.technical + self.practical
    }
}

/// Model and policy knobs for the classification engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub language_model: String,
    pub language_base_url: String,
    pub embedding_model: String,
    pub embedding_base_url: String,
    pub embedding_dimensions: Option<usize>,
    /// Prepended to every anchor before it is encoded.
    pub query_prompt: String,
    pub threshold: f32,
    pub anchors: AnchorCounts,
    pub startup_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub backend_timeout_secs: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            language_model: "gemini-2.5-flash".into(),
            language_base_url: "https://generativelanguage.googleapis.com/v1beta".into(),
            embedding_model: "text-embedding-3-small".into(),
            embedding_base_url: "https://api.openai.com/v1".into(),
            embedding_dimensions: None,
            query_prompt: "task: search result | query: ".into(),
            threshold: DEFAULT_THRESHOLD,
            anchors: AnchorCounts::default(),
            startup_timeout_secs: 30,
            request_timeout_secs: 5,
            backend_timeout_secs: 20,
        }
    }
}

impl EngineSettings {
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn backend_timeout(&self) -> Duration {
        Duration::from_secs(self.backend_timeout_secs)
    }
}

/// The part of the settings the front-end reads and writes.
///
/// Field names match the settings file written by earlier releases.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ClientConfig {
    #[serde(rename = "APIKEY", default)]
    pub api_key: String,
    #[serde(rename = "WHITE", default)]
    pub whitelist: Vec<ListEntry>,
    #[serde(rename = "BLACK", default)]
    pub blacklist: Vec<ListEntry>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserSettings {
    #[serde(flatten)]
    pub client: ClientConfig,
    #[serde(rename = "EMBEDKEY", default, skip_serializing_if = "Option::is_none")]
    pub embedding_api_key: Option<String>,
    #[serde(default)]
    pub engine: EngineSettings,
}

impl UserSettings {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse settings in {}", path.display()))
    }

    /// Generative-language key, environment first.
    pub fn language_api_key(&self) -> String {
        std::env::var(GEMINI_API_KEY_ENV)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .unwrap_or_else(|| self.client.api_key.clone())
    }

    /// Embedding key, environment first.
    pub fn embedding_api_key(&self) -> Option<String> {
        std::env::var(EMBED_API_KEY_ENV)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .or_else(|| self.embedding_api_key.clone())
    }
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<UserSettings>,
}

impl SettingsStore {
    /// Loads settings from `path`, or defaults when the file does not exist.
    ///
    /// A file that exists but does not parse is an error, so it is never
    /// overwritten with defaults.
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            UserSettings::load(&path)?
        } else {
            UserSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn snapshot(&self) -> UserSettings {
        self.read().clone()
    }

    pub fn client_config(&self) -> ClientConfig {
        self.read().client.clone()
    }

    pub fn engine(&self) -> EngineSettings {
        self.read().engine.clone()
    }

    pub fn update_client_config(&self, config: ClientConfig) -> Result<()> {
        let mut guard = self.write();
        guard.client = config;
        self.persist(&guard)
    }

    /// Writes the current in-memory settings to disk.
    ///
    /// `serve` calls this once at startup so child workers always find a file.
    pub fn flush(&self) -> Result<()> {
        let guard = self.read();
        self.persist(&guard)
    }

    fn persist(&self, data: &UserSettings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create settings directory {}", parent.display())
                })?;
            }
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }

    fn read(&self) -> RwLockReadGuard<'_, UserSettings> {
        match self.data.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, UserSettings> {
        match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
