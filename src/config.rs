use std::env;
use std::time::Duration;

use tracing::warn;

use crate::cache::DEFAULT_CAPACITY;

const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);
const DEFAULT_LIMIT: usize = 5;

/// Trust score per evidence category. Higher ranks first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrustWeights {
    /// Official sites and hosts under a government TLD.
    pub official: u32,
    pub gov: u32,
    pub wikivoyage: u32,
    pub wikipedia: u32,
    pub wikidata: u32,
    /// Everything else (POI cards, unclassified web results).
    pub other: u32,
}

impl Default for TrustWeights {
    fn default() -> Self {
        Self {
            official: 100,
            gov: 95,
            wikivoyage: 90,
            wikipedia: 85,
            wikidata: 80,
            other: 60,
        }
    }
}

/// Engine-wide settings.
///
/// Configuration via environment variables:
/// - `WANDERLORE_CACHE_TTL_SECS`: lifetime of cached results (default: 7 days)
/// - `WANDERLORE_CACHE_CAPACITY`: most results kept in memory (default: 1024)
#[derive(Debug, Clone)]
pub struct ResearchConfig {
    pub cache_ttl: Duration,
    pub cache_capacity: usize,
    pub default_limit: usize,
    pub trust: TrustWeights,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            cache_ttl: DEFAULT_CACHE_TTL,
            cache_capacity: DEFAULT_CAPACITY,
            default_limit: DEFAULT_LIMIT,
            trust: TrustWeights::default(),
        }
    }
}

impl ResearchConfig {
    pub fn from_env() -> Self {
        let cache_ttl = positive_env("WANDERLORE_CACHE_TTL_SECS")
            .map_or(DEFAULT_CACHE_TTL, Duration::from_secs);
        let cache_capacity = positive_env("WANDERLORE_CACHE_CAPACITY")
            .and_then(|n| usize::try_from(n).ok())
            .unwrap_or(DEFAULT_CAPACITY);
        Self {
            cache_ttl,
            cache_capacity,
            ..Self::default()
        }
    }
}

/// A positive integer from the environment; invalid values are logged and ignored.
fn positive_env(name: &str) -> Option<u64> {
    let raw = env_value(name)?;
    match raw.parse::<u64>() {
        Ok(n) if n > 0 => Some(n),
        _ => {
            warn!(value = %raw, "ignoring invalid {name}");
            None
        }
    }
}

/// Read an env var, treating unset and blank values alike.
pub(crate) fn env_value(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// API credential that never shows up in `Debug` output.
#[derive(Clone)]
pub(crate) struct ApiKey(pub(crate) String);

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("[REDACTED]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_weights_order_trusted_sources_first() {
        let w = TrustWeights::default();
        assert!(w.official > w.gov);
        assert!(w.gov > w.wikivoyage);
        assert!(w.wikivoyage > w.wikipedia);
        assert!(w.wikipedia > w.wikidata);
        assert!(w.wikidata > w.other);
    }

    #[test]
    fn default_config_uses_week_long_ttl() {
        let config = ResearchConfig::default();
        assert_eq!(config.cache_ttl, Duration::from_secs(604_800));
        assert_eq!(config.default_limit, 5);
        assert_eq!(config.cache_capacity, 1024);
    }

    #[test]
    fn api_key_debug_is_redacted() {
        let key = ApiKey("secret".into());
        assert_eq!(format!("{key:?}"), "[REDACTED]");
    }
}
