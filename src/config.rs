use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::cache::{CachePolicy, Domain, Lifetimes};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub api: ApiConfig,
  #[serde(default)]
  pub session: SessionConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub push: PushConfig,
  #[serde(default)]
  pub admin: AdminConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  /// REST base URL, e.g. "https://erp.example.com/api"
  pub base_url: String,
  /// Push channel endpoint (defaults to /ws on the API host)
  pub ws_url: Option<String>,
  #[serde(default = "default_request_timeout_secs")]
  pub request_timeout_secs: u64,
}

fn default_request_timeout_secs() -> u64 {
  30
}

impl ApiConfig {
  pub fn request_timeout(&self) -> Duration {
    Duration::from_secs(self.request_timeout_secs)
  }

  /// Resolve the push endpoint, deriving `ws(s)://host/ws` from the base URL when unset.
  pub fn push_url(&self) -> Result<String> {
    if let Some(url) = &self.ws_url {
      return Ok(url.clone());
    }

    let mut url = Url::parse(&self.base_url)
      .map_err(|e| eyre!("Invalid api.base_url '{}': {}", self.base_url, e))?;
    let scheme = match url.scheme() {
      "https" => "wss",
      _ => "ws",
    };
    url
      .set_scheme(scheme)
      .map_err(|_| eyre!("Cannot derive push URL from '{}'", self.base_url))?;
    url.set_path("/ws");
    url.set_query(None);
    Ok(url.to_string())
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
  /// Display name of the signed-in user
  pub user: Option<String>,
  #[serde(default = "default_role")]
  pub role: String,
}

fn default_role() -> String {
  "user".to_string()
}

impl Default for SessionConfig {
  fn default() -> Self {
    Self {
      user: None,
      role: default_role(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  #[serde(default = "default_stale_after_secs")]
  pub stale_after_secs: u64,
  #[serde(default = "default_gc_after_secs")]
  pub gc_after_secs: u64,
  /// Per-domain lifetimes, keyed by domain tag (e.g. "expense-dashboard")
  #[serde(default)]
  pub overrides: BTreeMap<Domain, LifetimeOverride>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LifetimeOverride {
  pub stale_after_secs: Option<u64>,
  pub gc_after_secs: Option<u64>,
}

fn default_stale_after_secs() -> u64 {
  5 * 60
}

fn default_gc_after_secs() -> u64 {
  10 * 60
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      stale_after_secs: default_stale_after_secs(),
      gc_after_secs: default_gc_after_secs(),
      overrides: BTreeMap::new(),
    }
  }
}

impl CacheConfig {
  pub fn policy(&self) -> CachePolicy {
    let default = Lifetimes {
      stale_after: Duration::from_secs(self.stale_after_secs),
      gc_after: Duration::from_secs(self.gc_after_secs),
    };
    self
      .overrides
      .iter()
      .fold(CachePolicy::new(default), |policy, (domain, o)| {
        policy.with_override(
          *domain,
          Lifetimes {
            stale_after: o
              .stale_after_secs
              .map(Duration::from_secs)
              .unwrap_or(default.stale_after),
            gc_after: o
              .gc_after_secs
              .map(Duration::from_secs)
              .unwrap_or(default.gc_after),
          },
        )
      })
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PushConfig {
  #[serde(default = "default_true")]
  pub enabled: bool,
  #[serde(default = "default_reconnect_delay_secs")]
  pub reconnect_delay_secs: u64,
  /// Consecutive failed connection attempts before the user is warned
  #[serde(default = "default_notify_after_failures")]
  pub notify_after_failures: u32,
}

fn default_true() -> bool {
  true
}

const MIN_RECONNECT_DELAY_SECS: u64 = 1;

fn default_reconnect_delay_secs() -> u64 {
  5
}

fn default_notify_after_failures() -> u32 {
  5
}

impl Default for PushConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      reconnect_delay_secs: default_reconnect_delay_secs(),
      notify_after_failures: default_notify_after_failures(),
    }
  }
}

impl PushConfig {
  pub fn reconnect_delay(&self) -> Duration {
    Duration::from_secs(self.reconnect_delay_secs)
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdminConfig {
  /// Role allowed to broadcast a cache clear to every client
  #[serde(default = "default_elevated_role")]
  pub elevated_role: String,
}

fn default_elevated_role() -> String {
  "admin".to_string()
}

impl Default for AdminConfig {
  fn default() -> Self {
    Self {
      elevated_role: default_elevated_role(),
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./erpq.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/erpq/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/erpq/config.yaml\n\
                 See erpq.example.yaml for the format."
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("erpq.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("erpq").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn from_yaml(contents: &str) -> Result<Self> {
    let mut config: Config = serde_yaml::from_str(contents)?;
    if config.push.reconnect_delay_secs < MIN_RECONNECT_DELAY_SECS {
      tracing::warn!(
        configured = config.push.reconnect_delay_secs,
        "push.reconnect_delay_secs too small, using {}",
        MIN_RECONNECT_DELAY_SECS
      );
      config.push.reconnect_delay_secs = MIN_RECONNECT_DELAY_SECS;
    }
    Ok(config)
  }

  /// Get the API bearer token from environment variables.
  ///
  /// Checks ERPQ_TOKEN first, then ERP_API_TOKEN as fallback.
  pub fn get_api_token() -> Result<String> {
    std::env::var("ERPQ_TOKEN")
      .or_else(|_| std::env::var("ERP_API_TOKEN"))
      .map_err(|_| eyre!("API token not found. Set ERPQ_TOKEN or ERP_API_TOKEN environment variable."))
  }
}
