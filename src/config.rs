// src/config.rs

use crate::error::{Error, Result};
use crate::strategy::StrategyKind;
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use std::{collections::HashMap, env, fs, io, path::Path, time::Duration};
use tracing::{error, info, warn};

/// Settings for a single key pool (one upstream provider).
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PoolConfig {
    /// Ordered key list. Order matters: it defines round-robin rotation and
    /// least-used tie-breaking.
    #[serde(default)]
    pub api_keys: Vec<Secret<String>>,
    /// Selection strategy; unrecognized values fall back to round-robin.
    #[serde(default)]
    pub strategy: StrategyKind,
    /// Consecutive failures before a key enters cooldown.
    #[serde(default = "default_max_failures")]
    pub max_failures: u32,
    /// Cooldown (quarantine) window in seconds.
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
    /// Retry budget: maximum attempts per logical call.
    #[serde(default = "default_attempts")]
    pub attempts: u32,
    /// Fixed delay between attempts, in milliseconds.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            api_keys: Vec::new(),
            strategy: StrategyKind::default(),
            max_failures: default_max_failures(),
            cooldown_secs: default_cooldown_secs(),
            attempts: default_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl PoolConfig {
    /// Convenience constructor for programmatic use: given keys, everything
    /// else at defaults.
    pub fn with_keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            api_keys: keys
                .into_iter()
                .map(|key| Secret::new(key.into()))
                .collect(),
            ..Self::default()
        }
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

fn default_max_failures() -> u32 {
    3
}
fn default_cooldown_secs() -> u64 {
    300
}
fn default_attempts() -> u32 {
    3
}
fn default_retry_delay_ms() -> u64 {
    1_000
}

/// Root configuration: named pools, one per upstream provider.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    #[serde(default)]
    pub pools: HashMap<String, PoolConfig>,
}

// Environment variable constants
const ENV_VAR_PREFIX: &str = "KEYWHEEL_POOL_";
const API_KEYS_SUFFIX: &str = "_API_KEYS";
const STRATEGY_SUFFIX: &str = "_STRATEGY";
const MAX_FAILURES_SUFFIX: &str = "_MAX_FAILURES";
const COOLDOWN_SECS_SUFFIX: &str = "_COOLDOWN_SECS";
const ATTEMPTS_SUFFIX: &str = "_ATTEMPTS";
const RETRY_DELAY_MS_SUFFIX: &str = "_RETRY_DELAY_MS";

/// Canonical pool-name form used for matching YAML entries against
/// environment variables: trimmed and lowercased. `OpenAI` in the file and
/// `KEYWHEEL_POOL_OPENAI_*` in the environment address the same pool.
fn normalize_pool_name(name: &str) -> String {
    name.trim().to_ascii_lowercase()
}

/// Extracts the pool name from an environment variable key based on a suffix.
/// `KEYWHEEL_POOL_OPENAI_API_KEYS` yields pool name `openai`.
fn extract_pool_name_from_env(env_key: &str, suffix: &str) -> Option<String> {
    env_key
        .strip_prefix(ENV_VAR_PREFIX)?
        .strip_suffix(suffix)
        .filter(|name| !name.is_empty())
        .map(normalize_pool_name)
}

/// Loads configuration from an optional YAML file, then overlays environment
/// variables (`KEYWHEEL_POOL_{NAME}_API_KEYS` etc.), then validates.
///
/// A missing or unparsable file is tolerated with a warning so that pure
/// env-var deployments work; a file that exists but cannot be read is an
/// error. At least one pool with usable keys must remain after the merge.
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let path_str = path.display().to_string();
    let mut config = AppConfig::default();

    // --- 1. Try loading base config from YAML (optional) ---
    match fs::read_to_string(path) {
        Ok(contents) => {
            if contents.trim().is_empty() {
                warn!("Config file '{}' is empty. Using defaults.", path_str);
            } else {
                match serde_yaml::from_str::<AppConfig>(&contents) {
                    Ok(yaml_config) => {
                        info!("Loaded {} pool(s) from '{}'.", yaml_config.pools.len(), path_str);
                        for (name, pool) in yaml_config.pools {
                            let normalized = normalize_pool_name(&name);
                            if config.pools.insert(normalized.clone(), pool).is_some() {
                                warn!(
                                    "Pool names '{}' collide after normalization to '{}'; the \
                                     later entry wins.",
                                    name, normalized
                                );
                            }
                        }
                    }
                    Err(e) => warn!(
                        "Failed to parse YAML config file '{}': {}. Using defaults.",
                        path_str, e
                    ),
                }
            }
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            warn!("Config file '{}' not found. Using environment variables only.", path_str);
        }
        Err(e) => {
            return Err(Error::Io(io::Error::new(
                e.kind(),
                format!("Failed to read config file '{}': {}", path_str, e),
            )))
        }
    }

    // --- 2. Overlay pool settings from environment variables ---
    apply_env_overrides(&mut config, env::vars());

    // --- 3. Final check & validation ---
    if config.pools.is_empty() || config.pools.values().all(|p| p.api_keys.is_empty()) {
        error!(
            "Configuration error: no pools with usable API keys found. Define at least one pool \
             via the config file or environment (e.g. KEYWHEEL_POOL_DEFAULT_API_KEYS=...)."
        );
        return Err(Error::Config("no pools with usable keys found".to_string()));
    }
    if !validate_config(&config, &path_str) {
        return Err(Error::Config("validation failed".to_string()));
    }

    info!(
        "Configuration loaded and validated successfully ({} pool(s) total).",
        config.pools.len()
    );
    Ok(config)
}

fn apply_env_overrides(config: &mut AppConfig, vars: impl Iterator<Item = (String, String)>) {
    for (key, value) in vars {
        if let Some(name) = extract_pool_name_from_env(&key, API_KEYS_SUFFIX) {
            let keys: Vec<Secret<String>> = value
                .split(',')
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(|k| Secret::new(k.to_string()))
                .collect();
            if keys.is_empty() {
                warn!("Environment variable '{}' contains no usable keys. Ignoring.", key);
                continue;
            }
            info!("Pool '{}': {} key(s) taken from environment.", name, keys.len());
            config.pools.entry(name).or_default().api_keys = keys;
        } else if let Some(name) = extract_pool_name_from_env(&key, STRATEGY_SUFFIX) {
            config.pools.entry(name).or_default().strategy = StrategyKind::parse(&value);
        } else if let Some(name) = extract_pool_name_from_env(&key, MAX_FAILURES_SUFFIX) {
            parse_env_number(&key, &value, &mut config.pools.entry(name).or_default().max_failures);
        } else if let Some(name) = extract_pool_name_from_env(&key, COOLDOWN_SECS_SUFFIX) {
            parse_env_number(&key, &value, &mut config.pools.entry(name).or_default().cooldown_secs);
        } else if let Some(name) = extract_pool_name_from_env(&key, ATTEMPTS_SUFFIX) {
            parse_env_number(&key, &value, &mut config.pools.entry(name).or_default().attempts);
        } else if let Some(name) = extract_pool_name_from_env(&key, RETRY_DELAY_MS_SUFFIX) {
            parse_env_number(&key, &value, &mut config.pools.entry(name).or_default().retry_delay_ms);
        }
    }
}

fn parse_env_number<T: std::str::FromStr>(key: &str, value: &str, slot: &mut T) {
    match value.trim().parse::<T>() {
        Ok(parsed) => *slot = parsed,
        Err(_) => warn!(
            "Environment variable '{}' has non-numeric value '{}'. Keeping previous value.",
            key, value
        ),
    }
}

/// Performs validation checks on the merged configuration.
pub fn validate_config(config: &AppConfig, config_source: &str) -> bool {
    let mut has_errors = false;

    if config.pools.is_empty() {
        error!("Configuration error: no pools loaded (source: {}).", config_source);
        return false;
    }

    for (name, pool) in &config.pools {
        if name.trim().is_empty() {
            error!("Invalid (blank) pool name found.");
            has_errors = true;
        }
        if pool.api_keys.is_empty() {
            error!("Pool '{}' has no API keys defined.", name);
            has_errors = true;
        } else if pool.api_keys.iter().any(|k| k.expose_secret().trim().is_empty()) {
            error!("Pool '{}' contains empty API key strings.", name);
            has_errors = true;
        }
        if pool.max_failures == 0 {
            error!("Pool '{}': max_failures must be at least 1.", name);
            has_errors = true;
        }
        if pool.attempts == 0 {
            error!("Pool '{}': attempts must be at least 1.", name);
            has_errors = true;
        }
    }

    !has_errors
}
