mod env_overrides;

use anyhow::{Context, Result};
use directories::UserDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Workspace directory - computed from home, not serialized
    #[serde(skip)]
    pub workspace_dir: PathBuf,
    /// Path to config.toml - computed from home, not serialized
    #[serde(skip)]
    pub config_path: PathBuf,

    #[serde(default)]
    pub ai: AiSettings,

    #[serde(default)]
    pub conversation: ConversationSettings,

    #[serde(default)]
    pub gateway: GatewaySettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiSettings {
    /// Primary provider for new requests: "openai", "anthropic" or "local".
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_true")]
    pub enable_caching: bool,
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_seconds: u64,
    #[serde(default)]
    pub openai_api_key: Option<String>,
    #[serde(default)]
    pub anthropic_api_key: Option<String>,
}

fn default_provider() -> String {
    "local".into()
}

fn default_true() -> bool {
    true
}

fn default_cache_ttl() -> u64 {
    3600
}

impl Default for AiSettings {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            enable_caching: true,
            cache_ttl_seconds: default_cache_ttl(),
            openai_api_key: None,
            anthropic_api_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSettings {
    /// Classifications at or above this confidence count as successful turns.
    #[serde(default = "default_confidence_threshold")]
    pub intent_confidence_threshold: f64,
    #[serde(default = "default_max_profiles")]
    pub max_assistant_profiles_per_user: u32,
    #[serde(default = "default_idle_timeout")]
    pub session_idle_timeout_minutes: i64,
}

fn default_confidence_threshold() -> f64 {
    0.85
}

fn default_max_profiles() -> u32 {
    5
}

fn default_idle_timeout() -> i64 {
    30
}

impl Default for ConversationSettings {
    fn default() -> Self {
        Self {
            intent_confidence_threshold: default_confidence_threshold(),
            max_assistant_profiles_per_user: default_max_profiles(),
            session_idle_timeout_minutes: default_idle_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewaySettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".into()
}

fn default_port() -> u16 {
    8787
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Config {
    /// Load `~/.northstar/config.toml`, creating a default file on first run.
    /// Environment overrides are applied after parsing.
    pub fn load_or_init() -> Result<Self> {
        let user_dirs = UserDirs::new().context("could not determine home directory")?;
        let workspace_dir = user_dirs.home_dir().join(".northstar");
        let config_path = workspace_dir.join("config.toml");

        fs::create_dir_all(&workspace_dir)
            .with_context(|| format!("create workspace dir {}", workspace_dir.display()))?;

        if !config_path.exists() {
            let defaults = Self::with_paths(workspace_dir.clone(), config_path.clone());
            let rendered =
                toml::to_string_pretty(&defaults).context("serialize default config")?;
            fs::write(&config_path, rendered)
                .with_context(|| format!("write {}", config_path.display()))?;
            tracing::info!(path = %config_path.display(), "created default config");
        }

        Self::load_from(&workspace_dir, &config_path)
    }

    /// Load a config from an explicit location (used by tests).
    pub fn load_from(workspace_dir: &Path, config_path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(config_path)
            .with_context(|| format!("read {}", config_path.display()))?;
        let mut config: Self = toml::from_str(&raw)
            .with_context(|| format!("parse {}", config_path.display()))?;
        config.workspace_dir = workspace_dir.to_path_buf();
        config.config_path = config_path.to_path_buf();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn with_paths(workspace_dir: PathBuf, config_path: PathBuf) -> Self {
        Self {
            workspace_dir,
            config_path,
            ai: AiSettings::default(),
            conversation: ConversationSettings::default(),
            gateway: GatewaySettings::default(),
        }
    }

    /// Path of the SQLite database backing sessions, assistants and sync.
    pub fn database_path(&self) -> PathBuf {
        self.workspace_dir.join("northstar.db")
    }

    fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            (0.0..=1.0).contains(&self.conversation.intent_confidence_threshold),
            "intent_confidence_threshold must be within [0.0, 1.0], got {}",
            self.conversation.intent_confidence_threshold
        );
        anyhow::ensure!(
            self.conversation.max_assistant_profiles_per_user > 0,
            "max_assistant_profiles_per_user must be at least 1"
        );
        anyhow::ensure!(
            self.conversation.session_idle_timeout_minutes > 0,
            "session_idle_timeout_minutes must be at least 1"
        );
        Ok(())
    }
}
