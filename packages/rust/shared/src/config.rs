//! Application configuration for NeuroGraph.
//!
//! User config lives at `~/.neurograph/neurograph.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{NeurographError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "neurograph.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".neurograph";

// ---------------------------------------------------------------------------
// Config structs (matching neurograph.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Remote service endpoints.
    #[serde(default)]
    pub services: ServicesConfig,

    /// Shared and local storage roots.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Auxiliary build behavior.
    #[serde(default)]
    pub auxiliary: AuxiliaryConfig,

    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Request defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,
}

/// `[services]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServicesConfig {
    /// Base URL of the AtomSpace Builder (graph construction) service.
    #[serde(default = "default_atomspace_url")]
    pub atomspace_url: String,

    /// Base URL of the Neural Miner service.
    #[serde(default = "default_miner_url")]
    pub miner_url: String,

    /// Per-call timeout for both services.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            atomspace_url: default_atomspace_url(),
            miner_url: default_miner_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_atomspace_url() -> String {
    "http://localhost:8000".into()
}
fn default_miner_url() -> String {
    "http://localhost:5000".into()
}
fn default_timeout_secs() -> u64 {
    300
}

/// `[storage]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Volume written by the remote services, one directory per job.
    #[serde(default = "default_shared_root")]
    pub shared_root: String,

    /// Local copy of mining outputs served for retrieval.
    #[serde(default = "default_local_root")]
    pub local_root: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            shared_root: default_shared_root(),
            local_root: default_local_root(),
        }
    }
}

fn default_shared_root() -> String {
    "/shared/output".into()
}
fn default_local_root() -> String {
    "output".into()
}

/// Whether the primary response waits for any part of the auxiliary path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuxiliaryMode {
    /// Return after the primary call; merge runs detached.
    #[default]
    Background,
    /// Join the auxiliary build and merge before returning.
    Await,
    /// Never launch the auxiliary build.
    Disabled,
}

impl std::str::FromStr for AuxiliaryMode {
    type Err = NeurographError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "background" => Ok(Self::Background),
            "await" => Ok(Self::Await),
            "disabled" => Ok(Self::Disabled),
            other => Err(NeurographError::config(format!(
                "unknown auxiliary mode '{other}': expected background, await, or disabled"
            ))),
        }
    }
}

/// `[auxiliary]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuxiliaryConfig {
    #[serde(default)]
    pub mode: AuxiliaryMode,
}

/// `[server]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Prefix for download URLs handed back to clients (empty = relative).
    #[serde(default)]
    pub public_base_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_base_url: String::new(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    9000
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Tenant used when a request does not name one.
    #[serde(default = "default_tenant_id")]
    pub tenant_id: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            tenant_id: default_tenant_id(),
        }
    }
}

fn default_tenant_id() -> String {
    "default".into()
}

// ---------------------------------------------------------------------------
// Orchestrator config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime orchestrator configuration: merged from config file + CLI flags.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// AtomSpace Builder base URL.
    pub atomspace_url: String,
    /// Neural Miner base URL.
    pub miner_url: String,
    /// Per-call timeout for remote requests.
    pub timeout: Duration,
    /// Shared storage root.
    pub shared_root: PathBuf,
    /// Local output root.
    pub local_root: PathBuf,
    /// Auxiliary build behavior.
    pub auxiliary_mode: AuxiliaryMode,
    /// Prefix for download URLs.
    pub public_base_url: String,
    /// Tenant used when none is given.
    pub default_tenant: String,
}

impl From<&AppConfig> for OrchestratorConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            atomspace_url: config.services.atomspace_url.clone(),
            miner_url: config.services.miner_url.clone(),
            timeout: Duration::from_secs(config.services.timeout_secs),
            shared_root: PathBuf::from(&config.storage.shared_root),
            local_root: PathBuf::from(&config.storage.local_root),
            auxiliary_mode: config.auxiliary.mode,
            public_base_url: config.server.public_base_url.clone(),
            default_tenant: config.defaults.tenant_id.clone(),
        }
    }
}

impl OrchestratorConfig {
    /// Check that service URLs parse and the timeout is usable.
    pub fn validate(&self) -> Result<()> {
        for (name, raw) in [
            ("atomspace_url", &self.atomspace_url),
            ("miner_url", &self.miner_url),
        ] {
            let url = Url::parse(raw)
                .map_err(|e| NeurographError::config(format!("invalid {name} '{raw}': {e}")))?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(NeurographError::config(format!(
                    "{name} must use http or https, got '{}'",
                    url.scheme()
                )));
            }
        }
        if self.timeout.is_zero() {
            return Err(NeurographError::config("timeout_secs must be greater than 0"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.neurograph/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| NeurographError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.neurograph/neurograph.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| NeurographError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        NeurographError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| NeurographError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| NeurographError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| NeurographError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("atomspace_url"));
        assert!(toml_str.contains("/shared/output"));
        assert!(toml_str.contains("mode = \"background\""));
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let toml_str = r#"
[services]
atomspace_url = "http://atomspace:8001"

[auxiliary]
mode = "await"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.services.atomspace_url, "http://atomspace:8001");
        assert_eq!(config.services.timeout_secs, 300);
        assert_eq!(config.auxiliary.mode, AuxiliaryMode::Await);
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.defaults.tenant_id, "default");
    }

    #[test]
    fn auxiliary_mode_from_flag() {
        assert_eq!("Await".parse::<AuxiliaryMode>().unwrap(), AuxiliaryMode::Await);
        assert_eq!(" disabled ".parse::<AuxiliaryMode>().unwrap(), AuxiliaryMode::Disabled);
        assert!("sometimes".parse::<AuxiliaryMode>().is_err());
    }

    #[test]
    fn orchestrator_config_from_app_config() {
        let app = AppConfig::default();
        let runtime = OrchestratorConfig::from(&app);
        assert_eq!(runtime.timeout, Duration::from_secs(300));
        assert_eq!(runtime.shared_root, PathBuf::from("/shared/output"));
        assert_eq!(runtime.auxiliary_mode, AuxiliaryMode::Background);
        assert!(runtime.validate().is_ok());
    }

    #[test]
    fn orchestrator_config_rejects_bad_urls() {
        let mut runtime = OrchestratorConfig::from(&AppConfig::default());
        runtime.miner_url = "not a url".into();
        let err = runtime.validate().unwrap_err();
        assert!(err.to_string().contains("miner_url"));

        runtime.miner_url = "ftp://miner".into();
        assert!(runtime.validate().is_err());
    }

    #[test]
    fn unknown_auxiliary_mode_is_a_parse_error() {
        let result: std::result::Result<AppConfig, _> =
            toml::from_str("[auxiliary]\nmode = \"sometimes\"\n");
        assert!(result.is_err());
    }
}
