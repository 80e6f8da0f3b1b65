//! Configuration for the nota CLI.
//!
//! Loaded with figment from defaults, then a TOML file, then `NOTA_`-prefixed
//! environment variables (`NOTA_SERVER__URL`, `NOTA_SYNC__PROBE_INTERVAL_SECS`).

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use nota_http::ClientConfig;
use serde::{Deserialize, Serialize};
use url::Url;

const CONFIG_FILE_NAME: &str = "config.toml";
const DATA_DIR_NAME: &str = "nota";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub sync: SyncConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Base URL of the notes API; `/notes` and `/tags` are appended.
    pub url: String,
    /// Bearer token for the authenticated user.
    pub token: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Where the cache and the pending-change log live.
    /// Defaults to `~/.local/share/nota`
    pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// How often `nota watch` probes the server.
    pub probe_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:3000".to_string(),
            token: None,
            timeout_secs: 10,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            probe_interval_secs: 15,
        }
    }
}

impl Config {
    /// Load configuration, reading `config_path` or the default config file.
    /// A missing file leaves the defaults in place.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);
        Self::from_figment(Self::figment(&config_file))
    }

    fn figment(config_file: &Path) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(config_file))
            .merge(Env::prefixed("NOTA_").split("__"))
    }

    fn from_figment(figment: Figment) -> Result<Self> {
        let config: Config = figment.extract().context("Failed to load configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    pub fn validate(&self) -> Result<()> {
        self.base_url()?;

        if self.server.timeout_secs == 0 {
            bail!("server.timeout_secs must be greater than 0");
        }
        if self.sync.probe_interval_secs == 0 {
            bail!("sync.probe_interval_secs must be greater than 0");
        }

        Ok(())
    }

    pub fn base_url(&self) -> Result<Url> {
        let url = Url::parse(&self.server.url)
            .with_context(|| format!("invalid server.url: {}", self.server.url))?;
        if !matches!(url.scheme(), "http" | "https") {
            bail!("server.url must use http or https: {}", self.server.url);
        }
        Ok(url)
    }

    pub fn data_dir(&self) -> PathBuf {
        self.storage
            .data_dir
            .clone()
            .unwrap_or_else(Self::default_data_dir)
    }

    pub fn client_config(&self) -> Result<ClientConfig> {
        Ok(ClientConfig {
            base_url: self.base_url()?,
            token: self.server.token.clone(),
            timeout: Duration::from_secs(self.server.timeout_secs),
        })
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.sync.probe_interval_secs)
    }
}
