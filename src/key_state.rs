// src/key_state.rs

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use secrecy::{ExposeSecret, Secret};
use serde::Serialize;
use std::time::Duration;

/// Health state of a single API key.
///
/// The set of `KeyState` records in a pool is fixed at construction; records
/// are only mutated afterwards, never added or removed.
#[derive(Debug, Clone)]
pub struct KeyState {
    pub key: Secret<String>,
    /// Administrative switch. A disabled key is never eligible, regardless of
    /// health; runtime failures never touch this flag.
    pub enabled: bool,
    pub consecutive_failures: u32,
    /// While set and in the future, the key is quarantined.
    pub cooldown_until: Option<DateTime<Utc>>,
    /// Number of times this key was handed out (selection, not success).
    pub usage_count: u64,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl KeyState {
    pub fn new(key: Secret<String>) -> Self {
        Self {
            key,
            enabled: true,
            consecutive_failures: 0,
            cooldown_until: None,
            usage_count: 0,
            last_used_at: None,
        }
    }

    /// A key is eligible iff it is enabled and not cooling down.
    pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        self.enabled && self.cooldown_until.map_or(true, |until| until <= now)
    }

    /// Record a successful call: failure counters and any cooldown are
    /// cleared. Idempotent.
    pub fn record_success(&mut self, now: DateTime<Utc>) {
        self.consecutive_failures = 0;
        self.cooldown_until = None;
        self.last_used_at = Some(now);
    }

    /// Record a failed call. Once `consecutive_failures` reaches
    /// `max_failures` the key enters cooldown for `cooldown`.
    ///
    /// A cooldown already in force is not re-extended by further failures;
    /// only a crossing while no cooldown is active sets a new deadline.
    /// Returns `true` when this report started a cooldown.
    pub fn record_failure(
        &mut self,
        now: DateTime<Utc>,
        max_failures: u32,
        cooldown: Duration,
    ) -> bool {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);

        let already_cooling = self.cooldown_until.is_some_and(|until| until > now);
        if self.consecutive_failures >= max_failures && !already_cooling {
            let deadline = ChronoDuration::from_std(cooldown)
                .ok()
                .and_then(|span| now.checked_add_signed(span))
                .unwrap_or(DateTime::<Utc>::MAX_UTC);
            self.cooldown_until = Some(deadline);
            return true;
        }
        false
    }

    /// Administrative reset: clears failures and cooldown, leaves `enabled`
    /// and `usage_count` untouched.
    pub fn reset(&mut self) {
        self.consecutive_failures = 0;
        self.cooldown_until = None;
    }

    /// Masked rendering of the key for logs and status output.
    pub fn preview(&self) -> String {
        preview_key(&self.key)
    }

    /// Read-only snapshot for status reporting. Never exposes the full key.
    pub fn status(&self) -> KeyStatus {
        KeyStatus {
            key_preview: self.preview(),
            enabled: self.enabled,
            consecutive_failures: self.consecutive_failures,
            cooldown_until: self.cooldown_until,
            usage_count: self.usage_count,
            last_used_at: self.last_used_at,
        }
    }
}

/// Serializable per-key snapshot exposed by [`crate::pool::KeyPool::status`].
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct KeyStatus {
    pub key_preview: String,
    pub enabled: bool,
    pub consecutive_failures: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cooldown_until: Option<DateTime<Utc>>,
    pub usage_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<DateTime<Utc>>,
}

/// Truncates a key to `abcd...wxyz`; short keys are fully masked.
pub fn preview_key(key: &Secret<String>) -> String {
    let key = key.expose_secret();
    let chars: Vec<char> = key.chars().collect();
    if chars.len() > 8 {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{head}...{tail}")
    } else {
        "****".to_string()
    }
}
