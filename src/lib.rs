// src/lib.rs

//! keywheel — a resilient pool of interchangeable API keys.
//!
//! A client-side load balancer with circuit-breaker semantics over a finite
//! key set: one key is chosen per outgoing call via a pluggable strategy
//! (round-robin, least-used, random), per-key failures are counted, keys that
//! fail repeatedly are quarantined for a cooldown window, and a retry driver
//! moves a caller-supplied operation across keys until it succeeds or the
//! budget runs out.
//!
//! The crate is transport-free: the actual outbound call is an async closure
//! supplied by the consumer, and all state is in-memory for the life of the
//! process.
//!
//! ```no_run
//! use keywheel::{KeyPool, PoolConfig, Retrier};
//! use secrecy::ExposeSecret;
//! use std::{sync::Arc, time::Duration};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let config = PoolConfig::with_keys(["sk-aaaa1111", "sk-bbbb2222"]);
//! let pool = Arc::new(KeyPool::new("openai", &config)?);
//!
//! let retrier = Retrier::new(Arc::clone(&pool), 3, Duration::from_secs(1));
//! let answer = retrier
//!     .run(|key| async move {
//!         // ... call the upstream provider with `key.expose_secret()` ...
//!         Ok::<_, std::io::Error>(key.expose_secret().len())
//!     })
//!     .await?;
//! # let _ = answer;
//! # Ok(()) }
//! ```

pub mod config;
pub mod error;
pub mod key_state;
pub mod pool;
pub mod retry;
pub mod strategy;

pub use config::{load_config, AppConfig, PoolConfig};
pub use error::{Error, Result};
pub use key_state::{KeyState, KeyStatus};
pub use pool::{KeyPool, Outcome, PoolRegistry};
pub use retry::{Retrier, RetryError};
pub use strategy::{RotationStrategy, StrategyKind};
