use anyhow::{Context, Result};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// Credential environment variables
// ---------------------------------------------------------------------------

/// Environment variable names for each provider credential, keyed by the
/// provider id used in the registry catalog.
pub const CREDENTIAL_VARS: &[(&str, &str)] = &[
    ("openai", "OPENAI_API_KEY"),
    ("perplexity", "PERPLEXITY_API_KEY"),
    ("gemini", "GEMINI_API_KEY"),
    ("elevenlabs", "ELEVENLABS_API_KEY"),
];

// ---------------------------------------------------------------------------
// WanderConfig
// ---------------------------------------------------------------------------

/// Application configuration stored at `~/.wander/config.json`.
///
/// API keys are **never** written to the JSON file. They are read from the
/// environment on load (see [`CREDENTIAL_VARS`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WanderConfig {
    #[serde(skip)]
    pub openai_api_key: Option<String>,
    #[serde(skip)]
    pub perplexity_api_key: Option<String>,
    #[serde(skip)]
    pub gemini_api_key: Option<String>,
    #[serde(skip)]
    pub elevenlabs_api_key: Option<String>,

    /// User toggles from the settings screen, keyed by provider id.
    /// Providers without an entry keep their catalog default.
    pub provider_toggles: BTreeMap<String, bool>,

    // Query routing
    pub min_response_chars: usize,
    pub provider_timeout_secs: u64,
    pub cache_ttl_secs: u64,

    // Voice
    pub tts_enabled: bool,
    pub tts_voice_id: String,
    pub tts_rate: f32,
    pub tts_pitch: f32,
    pub preferred_local_voices: Vec<String>,
    pub intro_marker: String,

    // General
    pub log_level: String,
}

impl Default for WanderConfig {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            perplexity_api_key: None,
            gemini_api_key: None,
            elevenlabs_api_key: None,
            provider_toggles: BTreeMap::new(),
            min_response_chars: 100,
            provider_timeout_secs: 8,
            cache_ttl_secs: 300,
            tts_enabled: true,
            tts_voice_id: "21m00Tcm4TlvDq8ikWAM".into(),
            tts_rate: 1.0,
            tts_pitch: 0.0,
            preferred_local_voices: vec![
                "Google US English".into(),
                "Microsoft David".into(),
                "Samantha".into(),
                "Daniel".into(),
            ],
            intro_marker: "Hi, I'm Wander".into(),
            log_level: "info".into(),
        }
    }
}

impl WanderConfig {
    /// Returns the base config directory: `~/.wander/`
    pub fn base_dir() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Could not determine home directory")?;
        Ok(home.join(".wander"))
    }

    /// Returns the config file path: `~/.wander/config.json`
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::base_dir()?.join("config.json"))
    }

    /// Returns the logs directory: `~/.wander/logs/`
    pub fn logs_dir() -> Result<PathBuf> {
        Ok(Self::base_dir()?.join("logs"))
    }

    /// Ensures all required directories exist.
    pub fn ensure_dirs() -> Result<()> {
        for dir in [Self::base_dir()?, Self::logs_dir()?] {
            if !dir.exists() {
                std::fs::create_dir_all(&dir)
                    .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
            }
        }
        Ok(())
    }

    /// Loads config from `~/.wander/config.json`, creating the default if
    /// missing, then fills API keys from the environment.
    pub fn load() -> Result<Self> {
        Self::ensure_dirs()?;
        let path = Self::config_path()?;
        let mut config = Self::load_from_path(&path)?;
        config.populate_keys_from_env();
        Ok(config)
    }

    /// Load config from a specific file path (keys are not populated).
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config: {}", path.display()))?;
            let config: Self =
                serde_json::from_str(&content).with_context(|| "Failed to parse config.json")?;
            info!("Loaded config from {}", path.display());
            Ok(config)
        } else {
            let config = Self::default();
            config.save_to_path(path)?;
            info!("Created default config at {}", path.display());
            Ok(config)
        }
    }

    /// Saves config to disk (API keys are excluded via `#[serde(skip)]`).
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        self.save_to_path(&path)
    }

    /// Save config to a specific file path.
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config: {}", path.display()))?;
        Ok(())
    }

    /// Fill API keys from the process environment.
    pub fn populate_keys_from_env(&mut self) {
        self.populate_keys_with(|var| std::env::var(var).ok());
    }

    /// Fill API keys using `lookup` to resolve each environment variable.
    /// Empty values are treated as missing.
    pub fn populate_keys_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        for (provider, var) in CREDENTIAL_VARS {
            let value = lookup(var).filter(|v| !v.trim().is_empty());
            match *provider {
                "openai" => self.openai_api_key = value,
                "perplexity" => self.perplexity_api_key = value,
                "gemini" => self.gemini_api_key = value,
                "elevenlabs" => self.elevenlabs_api_key = value,
                _ => {}
            }
        }
    }

    /// API key for a provider id, if configured.
    pub fn api_key(&self, provider: &str) -> Option<&str> {
        match provider {
            "openai" => self.openai_api_key.as_deref(),
            "perplexity" => self.perplexity_api_key.as_deref(),
            "gemini" => self.gemini_api_key.as_deref(),
            "elevenlabs" => self.elevenlabs_api_key.as_deref(),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// ConfigManager
// ---------------------------------------------------------------------------

type ReloadCallback = Box<dyn Fn(&WanderConfig) + Send + Sync>;

/// Thread-safe config holder with a file watcher for hot reload.
///
/// Settings toggles go through [`ConfigManager::set_provider_enabled`] so they
/// are persisted immediately and survive restarts.
pub struct ConfigManager {
    config: Arc<RwLock<WanderConfig>>,
    path: PathBuf,
    callbacks: Arc<RwLock<Vec<ReloadCallback>>>,
    _watcher: Option<RecommendedWatcher>,
}

impl ConfigManager {
    /// Load `~/.wander/config.json` and watch it for external edits.
    pub fn new() -> Result<Self> {
        WanderConfig::ensure_dirs()?;
        let path = WanderConfig::config_path()?;
        Self::open(path, true)
    }

    /// Open a config file at an explicit path. `watch` controls whether a
    /// file watcher is installed.
    pub fn open(path: PathBuf, watch: bool) -> Result<Self> {
        let mut config = WanderConfig::load_from_path(&path)?;
        config.populate_keys_from_env();

        let config = Arc::new(RwLock::new(config));
        let callbacks: Arc<RwLock<Vec<ReloadCallback>>> = Arc::new(RwLock::new(Vec::new()));

        let watcher = if watch {
            Some(Self::setup_watcher(
                path.clone(),
                Arc::clone(&config),
                Arc::clone(&callbacks),
            )?)
        } else {
            None
        };

        Ok(Self {
            config,
            path,
            callbacks,
            _watcher: watcher,
        })
    }

    /// Get a clone of the current config (including API keys).
    pub fn get(&self) -> WanderConfig {
        self.config.read().clone()
    }

    /// Path of the backing config file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Mutate the config and persist it.
    pub fn update(&self, f: impl FnOnce(&mut WanderConfig)) -> Result<()> {
        let mut config = self.config.write();
        f(&mut config);
        config.save_to_path(&self.path)
    }

    /// Persist a single provider toggle from the settings screen.
    pub fn set_provider_enabled(&self, provider_id: &str, enabled: bool) -> Result<()> {
        self.update(|c| {
            c.provider_toggles.insert(provider_id.to_string(), enabled);
        })?;
        debug!(provider = provider_id, enabled, "Provider toggle persisted");
        Ok(())
    }

    /// Register a callback invoked after every successful hot reload.
    pub fn on_reload(&self, callback: impl Fn(&WanderConfig) + Send + Sync + 'static) {
        self.callbacks.write().push(Box::new(callback));
    }

    /// Re-read the file now and notify reload callbacks.
    pub fn reload(&self) -> Result<()> {
        Self::reload_into(&self.path, &self.config, &self.callbacks)
    }

    fn reload_into(
        path: &Path,
        config: &RwLock<WanderConfig>,
        callbacks: &RwLock<Vec<ReloadCallback>>,
    ) -> Result<()> {
        let mut fresh = WanderConfig::load_from_path(path)?;
        fresh.populate_keys_from_env();
        *config.write() = fresh.clone();
        for cb in callbacks.read().iter() {
            cb(&fresh);
        }
        Ok(())
    }

    fn setup_watcher(
        path: PathBuf,
        config: Arc<RwLock<WanderConfig>>,
        callbacks: Arc<RwLock<Vec<ReloadCallback>>>,
    ) -> Result<RecommendedWatcher> {
        let watch_dir = path
            .parent()
            .map(Path::to_path_buf)
            .context("Config path has no parent directory")?;
        let file_name = path
            .file_name()
            .map(|n| n.to_os_string())
            .context("Config path has no file name")?;

        let mut watcher = notify::recommended_watcher(move |res: Result<Event, _>| {
            if let Ok(event) = res
                && event.kind.is_modify()
                && event.paths.iter().any(|p| p.file_name() == Some(&file_name))
            {
                match Self::reload_into(&path, &config, &callbacks) {
                    Ok(()) => info!("Config hot-reloaded"),
                    Err(e) => warn!("Failed to hot-reload config: {e}"),
                }
            }
        })?;

        watcher.watch(&watch_dir, RecursiveMode::NonRecursive)?;
        Ok(watcher)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn defaults_match_router_and_voice_tuning() {
        let c = WanderConfig::default();
        assert_eq!(c.min_response_chars, 100);
        assert_eq!(c.cache_ttl_secs, 300);
        assert!((c.tts_rate - 1.0).abs() < f32::EPSILON);
        assert!(c.tts_pitch.abs() < f32::EPSILON);
        assert!(c.provider_toggles.is_empty());
    }

    #[test]
    fn missing_file_creates_default() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.json");
        let config = WanderConfig::load_from_path(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.provider_timeout_secs, 8);
    }

    #[test]
    fn api_keys_never_written() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.json");
        let config = WanderConfig {
            openai_api_key: Some("sk-secret".into()),
            ..Default::default()
        };
        config.save_to_path(&path).unwrap();
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(!raw.contains("sk-secret"));
    }

    #[test]
    fn partial_file_fills_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.json");
        std::fs::write(&path, r#"{"provider_toggles":{"openai":false}}"#).unwrap();
        let config = WanderConfig::load_from_path(&path).unwrap();
        assert_eq!(config.provider_toggles.get("openai"), Some(&false));
        assert_eq!(config.min_response_chars, 100);
    }

    #[test]
    fn populate_keys_ignores_blank_values() {
        let mut config = WanderConfig::default();
        config.populate_keys_with(|var| match var {
            "OPENAI_API_KEY" => Some("sk-1".into()),
            "GEMINI_API_KEY" => Some("   ".into()),
            _ => None,
        });
        assert_eq!(config.api_key("openai"), Some("sk-1"));
        assert_eq!(config.api_key("gemini"), None);
        assert_eq!(config.api_key("unknown"), None);
    }

    #[test]
    fn provider_toggle_persists_across_managers() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.json");

        let mgr = ConfigManager::open(path.clone(), false).unwrap();
        mgr.set_provider_enabled("perplexity", false).unwrap();
        drop(mgr);

        let reopened = ConfigManager::open(path, false).unwrap();
        assert_eq!(
            reopened.get().provider_toggles.get("perplexity"),
            Some(&false)
        );
    }

    #[test]
    fn reload_invokes_callbacks() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.json");
        let mgr = ConfigManager::open(path.clone(), false).unwrap();

        let hits = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&hits);
        mgr.on_reload(move |c| {
            if c.provider_toggles.get("gemini") == Some(&true) {
                seen.fetch_add(1, Ordering::SeqCst);
            }
        });

        std::fs::write(&path, r#"{"provider_toggles":{"gemini":true}}"#).unwrap();
        mgr.reload().unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(mgr.get().provider_toggles.get("gemini"), Some(&true));
    }
}
