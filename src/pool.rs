// src/pool.rs

use crate::config::{AppConfig, PoolConfig};
use crate::error::{Error, Result};
use crate::key_state::{KeyState, KeyStatus};
use crate::strategy::RotationStrategy;
use chrono::Utc;
use parking_lot::Mutex;
use secrecy::{ExposeSecret, Secret};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Result of one attempt against a selected key, as reported by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
}

/// A fixed set of interchangeable API keys for one upstream provider.
///
/// The pool is the sole owner of key health state. All operations run inside
/// one coarse lock, so concurrent callers observe a consistent history; key
/// cardinality is single digits in practice, so lock contention is not a
/// concern. Critical sections never await and never perform I/O. Cooldown
/// expiry is checked lazily on the next [`select`](Self::select); there are no
/// background tasks.
///
/// Construct one pool per provider and share it via `Arc`; the pool holds no
/// external resources and needs no teardown.
pub struct KeyPool {
    name: String,
    strategy: Box<dyn RotationStrategy>,
    max_failures: u32,
    cooldown: Duration,
    inner: Mutex<PoolInner>,
}

struct PoolInner {
    keys: Vec<KeyState>,
    /// Shared rotation counter, advanced on every selection. Only the
    /// round-robin strategy reads it.
    cursor: u64,
}

impl KeyPool {
    /// Builds a pool from configuration. An empty key list is a hard
    /// construction error; blank key strings are rejected the same way.
    pub fn new(name: impl Into<String>, config: &PoolConfig) -> Result<Self> {
        let name = name.into();
        let keys: Vec<KeyState> = config
            .api_keys
            .iter()
            .filter(|key| !key.expose_secret().trim().is_empty())
            .map(|key| KeyState::new(key.clone()))
            .collect();

        if keys.is_empty() {
            return Err(Error::EmptyKeyList { pool: name });
        }

        info!(
            pool = %name,
            key_count = keys.len(),
            strategy = config.strategy.as_str(),
            max_failures = config.max_failures,
            cooldown_secs = config.cooldown_secs,
            "Key pool initialized"
        );

        Ok(Self {
            name,
            strategy: config.strategy.build(),
            max_failures: config.max_failures.max(1),
            cooldown: config.cooldown(),
            inner: Mutex::new(PoolInner { keys, cursor: 0 }),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of keys in the pool (fixed at construction).
    pub fn len(&self) -> usize {
        self.inner.lock().keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Picks one eligible key and hands out its identity.
    ///
    /// Filtering, strategy dispatch, and the usage-count/cursor bump happen in
    /// one critical section, so two concurrent selections cannot observe the
    /// same cursor value or lose an increment.
    pub fn select(&self) -> Result<Secret<String>> {
        let now = Utc::now();
        let mut inner = self.inner.lock();
        let cursor = inner.cursor;

        let eligible: Vec<usize> = inner
            .keys
            .iter()
            .enumerate()
            .filter(|(_, state)| state.is_eligible(now))
            .map(|(idx, _)| idx)
            .collect();

        if eligible.is_empty() {
            warn!(pool = %self.name, "All API keys are disabled or cooling down");
            return Err(Error::NoEligibleKeys);
        }

        let picked = {
            let refs: Vec<&KeyState> = eligible.iter().map(|&idx| &inner.keys[idx]).collect();
            self.strategy.pick(&refs, cursor)
        };
        let idx = eligible[picked];

        let state = &mut inner.keys[idx];
        state.usage_count += 1;
        state.last_used_at = Some(now);

        debug!(
            pool = %self.name,
            api_key.preview = %state.preview(),
            strategy = self.strategy.name(),
            eligible = eligible.len(),
            "Selected API key"
        );

        let key = state.key.clone();
        inner.cursor = cursor.wrapping_add(1);
        Ok(key)
    }

    /// Applies the caller's outcome report to the matching key.
    ///
    /// An unknown identity is a silent no-op: the record set is fixed for the
    /// life of the pool, so a miss can only mean the report refers to a key
    /// this pool never owned.
    pub fn report_outcome(&self, api_key: &str, outcome: Outcome) {
        match outcome {
            Outcome::Success => self.report_success(api_key),
            Outcome::Failure => self.report_failure(api_key),
        }
    }

    pub fn report_success(&self, api_key: &str) {
        let now = Utc::now();
        let mut inner = self.inner.lock();
        if let Some(state) = find_key(&mut inner.keys, api_key) {
            state.record_success(now);
            debug!(
                pool = %self.name,
                api_key.preview = %state.preview(),
                "Success reported; key health cleared"
            );
        }
    }

    pub fn report_failure(&self, api_key: &str) {
        let now = Utc::now();
        let mut inner = self.inner.lock();
        if let Some(state) = find_key(&mut inner.keys, api_key) {
            let entered_cooldown = state.record_failure(now, self.max_failures, self.cooldown);
            if entered_cooldown {
                warn!(
                    pool = %self.name,
                    api_key.preview = %state.preview(),
                    failures = state.consecutive_failures,
                    cooldown_until = ?state.cooldown_until,
                    "API key quarantined after repeated failures"
                );
            } else {
                warn!(
                    pool = %self.name,
                    api_key.preview = %state.preview(),
                    failures = state.consecutive_failures,
                    "API key failure reported"
                );
            }
        }
    }

    /// Read-only snapshot of every key, in pool order. Key material is
    /// masked; this is the only place the pool surfaces identity at all.
    pub fn status(&self) -> Vec<KeyStatus> {
        let inner = self.inner.lock();
        inner.keys.iter().map(KeyState::status).collect()
    }

    /// Administrative escape hatch: clears every key's failure count and
    /// cooldown. `enabled` flags and usage counters are untouched.
    pub fn reset_all(&self) {
        let mut inner = self.inner.lock();
        for state in &mut inner.keys {
            state.reset();
        }
        info!(pool = %self.name, "All key health state reset");
    }

    /// Administrative enable/disable of one key. Returns `false` when the
    /// identity is unknown to this pool.
    pub fn set_enabled(&self, api_key: &str, enabled: bool) -> bool {
        let mut inner = self.inner.lock();
        if let Some(state) = find_key(&mut inner.keys, api_key) {
            state.enabled = enabled;
            info!(
                pool = %self.name,
                api_key.preview = %state.preview(),
                enabled,
                "Key administrative state changed"
            );
            true
        } else {
            false
        }
    }
}

fn find_key<'a>(keys: &'a mut [KeyState], api_key: &str) -> Option<&'a mut KeyState> {
    keys.iter_mut()
        .find(|state| state.key.expose_secret() == api_key)
}

/// Named pools, one per upstream provider, built from [`AppConfig`].
///
/// Providers that differ only in credentials and tuning share the one
/// parameterized [`KeyPool`] implementation.
pub struct PoolRegistry {
    pools: HashMap<String, Arc<KeyPool>>,
}

impl PoolRegistry {
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        if config.pools.is_empty() {
            return Err(Error::Config("no pools configured".to_string()));
        }

        let mut pools = HashMap::new();
        for (name, pool_config) in &config.pools {
            let pool = KeyPool::new(name.clone(), pool_config)?;
            pools.insert(name.clone(), Arc::new(pool));
        }
        Ok(Self { pools })
    }

    pub fn get(&self, name: &str) -> Result<Arc<KeyPool>> {
        self.pools
            .get(name)
            .cloned()
            .ok_or_else(|| Error::PoolNotFound(name.to_string()))
    }

    pub fn names(&self) -> Vec<&str> {
        self.pools.keys().map(String::as_str).collect()
    }

    /// Status snapshot across every pool, keyed by pool name.
    pub fn status(&self) -> HashMap<String, Vec<KeyStatus>> {
        self.pools
            .iter()
            .map(|(name, pool)| (name.clone(), pool.status()))
            .collect()
    }
}
