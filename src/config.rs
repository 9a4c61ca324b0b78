use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub api: ApiConfig,
  #[serde(default)]
  pub cache: CacheConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  /// Absolute base URL of the platform API
  #[serde(default = "default_base_url")]
  pub base_url: String,
  /// Per-attempt timeout in milliseconds
  #[serde(default = "default_timeout_ms")]
  pub timeout_ms: u64,
  /// Re-attempts after the first (3 allows 4 total attempts)
  #[serde(default = "default_retries")]
  pub retries: u32,
  /// Base backoff delay in milliseconds; doubles per attempt
  #[serde(default = "default_retry_delay_ms")]
  pub retry_delay_ms: u64,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      base_url: default_base_url(),
      timeout_ms: default_timeout_ms(),
      retries: default_retries(),
      retry_delay_ms: default_retry_delay_ms(),
    }
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CacheConfig {
  /// Cache database path (defaults to the platform data directory)
  pub path: Option<PathBuf>,
  /// Serve valid cached entries without touching the network
  #[serde(default)]
  pub cache_first: bool,
}

fn default_base_url() -> String {
  "http://localhost:3000/api".to_string()
}

fn default_timeout_ms() -> u64 {
  10_000
}

fn default_retries() -> u32 {
  3
}

fn default_retry_delay_ms() -> u64 {
  1_000
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./stint.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/stint/config.yaml
  ///
  /// Falls back to defaults when no file exists.
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
      None => Ok(Config::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("stint.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("stint").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    Ok(config)
  }

  /// Get the platform API token from environment variables.
  ///
  /// Checks STINT_API_TOKEN first, then INTERNSHIP_API_TOKEN as fallback.
  pub fn get_api_token() -> Result<String> {
    std::env::var("STINT_API_TOKEN")
      .or_else(|_| std::env::var("INTERNSHIP_API_TOKEN"))
      .map_err(|_| {
        eyre!("API token not found. Set STINT_API_TOKEN or INTERNSHIP_API_TOKEN environment variable.")
      })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults() {
    let config = Config::default();
    assert_eq!(config.api.base_url, "http://localhost:3000/api");
    assert_eq!(config.api.timeout_ms, 10_000);
    assert_eq!(config.api.retries, 3);
    assert_eq!(config.api.retry_delay_ms, 1_000);
    assert!(!config.cache.cache_first);
  }

  #[test]
  fn test_parse_partial_yaml_fills_defaults() {
    let config: Config = serde_yaml::from_str(
      r#"
api:
  base_url: https://api.example.com/v1
cache:
  cache_first: true
"#,
    )
    .unwrap();

    assert_eq!(config.api.base_url, "https://api.example.com/v1");
    assert_eq!(config.api.retries, 3);
    assert!(config.cache.cache_first);
    assert!(config.cache.path.is_none());
  }
}
