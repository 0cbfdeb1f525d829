use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// How a loader takes part in rendering.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Reveal incrementally as the output streams, embedding a data
    /// marker so the client need not load the value again.
    Streaming,
    /// Fully resolve before the final server render.
    #[default]
    Ssr,
    /// Always start unresolved on the client, never reading any value
    /// seeded from the server.
    Csr,
}

pub const TIMEOUT_ENV: &str = "LOAD_SSR_TIMEOUT_MS";
pub const STREAMING_ENV: &str = "LOAD_SSR_STREAMING";

/// Request-level settings for the [`Collector`](crate::collector::Collector).
///
/// The timeout should be kept below the execution deadline of the
/// hosting platform, as any load still pending once it elapses is left
/// for the client to resolve.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    pub timeout_ms: Option<u64>,
    /// Leave loads in [`Mode::Streaming`] for the streamed output to
    /// resolve rather than waiting on them.
    pub streaming: bool,
}

impl CollectorConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    pub fn streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    /// Read the configuration from `LOAD_SSR_TIMEOUT_MS` and
    /// `LOAD_SSR_STREAMING`, defaulting whichever is unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(
        lookup: impl Fn(&'static str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(value) = lookup(TIMEOUT_ENV) {
            let ms = value
                .trim()
                .parse::<u64>()
                .map_err(|source| ConfigError::InvalidTimeout {
                    key: TIMEOUT_ENV,
                    value: value.clone(),
                    source,
                })?;
            config.timeout_ms = Some(ms);
        }
        if let Some(value) = lookup(STREAMING_ENV) {
            config.streaming = match value.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" => false,
                _ => {
                    return Err(ConfigError::InvalidFlag {
                        key: STREAMING_ENV,
                        value,
                    })
                }
            };
        }
        Ok(config)
    }
}
