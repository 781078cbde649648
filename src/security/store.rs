//! Counter stores backing the rate limiter.
//!
//! # Responsibilities
//! - Atomic increment-with-expiry of a per-key counter (fixed window)
//! - Shared store (Redis) so limits hold across server instances
//! - In-process store for single-instance and development use
//!
//! # Design Decisions
//! - Increment and expiry happen in one server-side step; application code
//!   never reads, modifies, and writes a counter
//! - The Redis binding only exists once the connection is confirmed ready;
//!   a store that is not ready at startup is a startup error

use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use fred::interfaces::{ClientLike, LuaInterface};
use fred::prelude::*;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("counter store not ready: {0}")]
    NotReady(String),

    #[error("counter store error: {0}")]
    Backend(String),
}

/// A counter store shared by all requests.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Increment `key` and return the count within the current window.
    ///
    /// The first increment of a window starts it; the counter expires
    /// `window` after that.
    async fn increment(&self, key: &str, window: Duration) -> Result<u64, StoreError>;
}

struct Window {
    count: u64,
    started: Instant,
    length: Duration,
}

impl Window {
    fn expired(&self, now: Instant) -> bool {
        now.duration_since(self.started) >= self.length
    }
}

/// In-process fixed-window counters.
///
/// Only correct when a single instance serves all traffic.
#[derive(Default)]
pub struct MemoryStore {
    windows: DashMap<String, Window>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop counters whose window has ended.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.windows.retain(|_, window| !window.expired(now));
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// Periodically purge expired counters until the store is dropped.
    pub fn spawn_sweeper(store: &Arc<MemoryStore>, every: Duration) {
        let weak: Weak<MemoryStore> = Arc::downgrade(store);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                match weak.upgrade() {
                    Some(store) => store.purge_expired(),
                    None => break,
                }
            }
        });
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn increment(&self, key: &str, window: Duration) -> Result<u64, StoreError> {
        let now = Instant::now();
        // The entry guard holds the shard lock for the whole update.
        let mut entry = self.windows.entry(key.to_string()).or_insert(Window {
            count: 0,
            started: now,
            length: window,
        });
        if entry.expired(now) {
            entry.count = 0;
            entry.started = now;
        }
        entry.length = window;
        entry.count += 1;
        Ok(entry.count)
    }
}

/// `INCR` the key and start its expiry on the first hit of a window.
const INCREMENT_SCRIPT: &str = r#"
local count = redis.call('INCR', KEYS[1])
if count == 1 then
  redis.call('PEXPIRE', KEYS[1], ARGV[1])
end
return count
"#;

/// Redis-backed counters shared across instances.
pub struct RedisStore {
    client: Client,
    command_timeout: Duration,
}

impl RedisStore {
    /// Connect and wait until the client is ready.
    pub async fn connect(url: &str, timeout: Duration) -> Result<Self, StoreError> {
        let config = Config::from_url(url).map_err(|e| StoreError::NotReady(e.to_string()))?;
        let client = Builder::from_config(config)
            .set_policy(ReconnectPolicy::new_exponential(0, 100, 30_000, 2))
            .build()
            .map_err(|e| StoreError::NotReady(e.to_string()))?;

        match tokio::time::timeout(timeout, client.init()).await {
            Ok(Ok(_connection)) => {}
            Ok(Err(e)) => return Err(StoreError::NotReady(e.to_string())),
            Err(_) => {
                // Stops the reconnect loop; the server may never have answered.
                let _ = tokio::time::timeout(Duration::from_millis(250), client.quit()).await;
                return Err(StoreError::NotReady(format!(
                    "no connection within {}ms",
                    timeout.as_millis()
                )));
            }
        }

        tracing::info!(url = %redact_url(url), "Rate limit store connected");
        Self::from_client(client, timeout)
    }

    /// Bind an existing client. Fails unless the client is connected.
    pub fn from_client(client: Client, command_timeout: Duration) -> Result<Self, StoreError> {
        if !client.is_connected() {
            return Err(StoreError::NotReady("client is not connected".into()));
        }
        Ok(Self {
            client,
            command_timeout,
        })
    }
}

#[async_trait]
impl CounterStore for RedisStore {
    async fn increment(&self, key: &str, window: Duration) -> Result<u64, StoreError> {
        let window_ms = i64::try_from(window.as_millis()).unwrap_or(i64::MAX);
        let call = self
            .client
            .eval::<i64, _, _, _>(INCREMENT_SCRIPT, vec![key.to_string()], vec![window_ms]);

        match tokio::time::timeout(self.command_timeout, call).await {
            Ok(Ok(count)) => Ok(u64::try_from(count).unwrap_or_default()),
            Ok(Err(e)) => Err(StoreError::Backend(e.to_string())),
            Err(_) => Err(StoreError::Backend(format!(
                "no reply within {}ms",
                self.command_timeout.as_millis()
            ))),
        }
    }
}

/// Strip credentials from a store URL for logging.
fn redact_url(raw: &str) -> String {
    match url::Url::parse(raw) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("***"));
            }
            parsed.to_string()
        }
        Err(_) => "<invalid url>".to_string(),
    }
}
