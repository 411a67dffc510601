use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Result;

/// Per-1M-token input/output pricing for one model.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ModelPricing {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

impl ModelPricing {
    pub const fn new(input_per_million: f64, output_per_million: f64) -> Self {
        Self {
            input_per_million,
            output_per_million,
        }
    }

    pub fn estimate_usd(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        (input_tokens as f64 / 1_000_000.0) * self.input_per_million
            + (output_tokens as f64 / 1_000_000.0) * self.output_per_million
    }
}

/// A source of fresh pricing data, implemented by `relayscope-cli` with an
/// HTTP client; this crate never makes network calls of its own.
pub trait PricingSource {
    fn fetch(&self) -> std::result::Result<HashMap<String, ModelPricing>, String>;
}

const DEFAULT_PRICING: ModelPricing = ModelPricing::new(5.0, 15.0);
const STALE_AFTER_SECS: i64 = 24 * 60 * 60;

/// Embedded fallback pricing used when no cache file exists yet and no
/// live source is available. Freshness always comes from a refresh, never
/// from editing this table.
fn embedded_defaults() -> HashMap<String, ModelPricing> {
    let mut map = HashMap::new();
    map.insert("gpt-4o".to_string(), ModelPricing::new(2.5, 10.0));
    map.insert("gpt-4o-mini".to_string(), ModelPricing::new(0.15, 0.6));
    map.insert("gpt-4-turbo".to_string(), ModelPricing::new(10.0, 30.0));
    map.insert("gpt-4".to_string(), ModelPricing::new(30.0, 60.0));
    map.insert("gpt-3.5-turbo".to_string(), ModelPricing::new(0.5, 1.5));
    map.insert("o1".to_string(), ModelPricing::new(15.0, 60.0));
    map.insert("o1-mini".to_string(), ModelPricing::new(3.0, 12.0));
    map.insert("claude-opus-4".to_string(), ModelPricing::new(15.0, 75.0));
    map.insert("claude-sonnet-4".to_string(), ModelPricing::new(3.0, 15.0));
    map.insert("claude-3-7-sonnet".to_string(), ModelPricing::new(3.0, 15.0));
    map.insert("claude-3-5-haiku".to_string(), ModelPricing::new(0.8, 4.0));
    map.insert("claude-3-haiku".to_string(), ModelPricing::new(0.25, 1.25));
    map
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheFile {
    last_updated: DateTime<Utc>,
    models: HashMap<String, ModelPricing>,
}

/// Token-cost lookup backed by a local JSON cache, refreshed at most once a
/// day and falling back to an embedded table when no cache or live source
/// is available. Mirrors the cache/stale-check/fallback shape of the
/// cost-estimation module this crate's dashboard cost figures are drawn
/// from, down to the 24-hour staleness window.
pub struct PricingCache {
    cache_path: PathBuf,
    models: HashMap<String, ModelPricing>,
    last_updated: DateTime<Utc>,
}

impl PricingCache {
    /// Loads the cache file at `cache_path` if present, else falls back to
    /// [`embedded_defaults`]. Never touches the network.
    pub fn load_or_default(cache_path: impl Into<PathBuf>) -> Self {
        let cache_path = cache_path.into();
        match Self::read_cache_file(&cache_path) {
            Ok(cache) => cache,
            Err(_) => Self {
                cache_path,
                models: embedded_defaults(),
                last_updated: DateTime::<Utc>::from_timestamp(0, 0).expect("epoch is a valid timestamp"),
            },
        }
    }

    fn read_cache_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let parsed: CacheFile = serde_json::from_str(&content)?;
        Ok(Self {
            cache_path: path.to_path_buf(),
            models: parsed.models,
            last_updated: parsed.last_updated,
        })
    }

    /// True once the cache is more than 24 hours old.
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        (now - self.last_updated).num_seconds() > STALE_AFTER_SECS
    }

    /// Replaces the in-memory table with freshly fetched data and persists
    /// it to `cache_path`. Leaves the existing table untouched on failure,
    /// so a transient fetch error never blanks out known-good pricing.
    pub fn refresh(&mut self, source: &dyn PricingSource, now: DateTime<Utc>) -> Result<()> {
        let models = source
            .fetch()
            .map_err(crate::Error::Config)?;
        self.models = models;
        self.last_updated = now;
        self.save()
    }

    fn save(&self) -> Result<()> {
        if let Some(parent) = self.cache_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = CacheFile {
            last_updated: self.last_updated,
            models: self.models.clone(),
        };
        std::fs::write(&self.cache_path, serde_json::to_string_pretty(&file)?)?;
        Ok(())
    }

    /// Looks up pricing for `model_name`, falling through to a substring
    /// match against known model families, then a flat default.
    pub fn lookup(&self, model_name: &str) -> ModelPricing {
        let needle = model_name.to_lowercase();
        if let Some(pricing) = self.models.get(&needle) {
            return *pricing;
        }
        self.models
            .iter()
            .filter(|(key, _)| needle.contains(key.as_str()) || key.contains(needle.as_str()))
            .max_by_key(|(key, _)| key.len())
            .map(|(_, pricing)| *pricing)
            .unwrap_or(DEFAULT_PRICING)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct StubSource(HashMap<String, ModelPricing>);

    impl PricingSource for StubSource {
        fn fetch(&self) -> std::result::Result<HashMap<String, ModelPricing>, String> {
            Ok(self.0.clone())
        }
    }

    struct FailingSource;

    impl PricingSource for FailingSource {
        fn fetch(&self) -> std::result::Result<HashMap<String, ModelPricing>, String> {
            Err("network unreachable".to_string())
        }
    }

    #[test]
    fn load_or_default_falls_back_to_embedded_defaults_when_no_cache_exists() {
        let dir = TempDir::new().unwrap();
        let cache = PricingCache::load_or_default(dir.path().join("missing.json"));
        assert_eq!(cache.lookup("gpt-4o"), ModelPricing::new(2.5, 10.0));
    }

    #[test]
    fn is_stale_is_true_for_the_embedded_default_epoch() {
        let dir = TempDir::new().unwrap();
        let cache = PricingCache::load_or_default(dir.path().join("missing.json"));
        assert!(cache.is_stale(Utc::now()));
    }

    #[test]
    fn refresh_persists_and_unstales_the_cache() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pricing.json");
        let mut cache = PricingCache::load_or_default(&path);

        let mut fresh = HashMap::new();
        fresh.insert("gpt-6".to_string(), ModelPricing::new(1.0, 2.0));
        let now = Utc::now();
        cache.refresh(&StubSource(fresh), now).unwrap();

        assert!(!cache.is_stale(now));
        assert_eq!(cache.lookup("gpt-6"), ModelPricing::new(1.0, 2.0));

        let reloaded = PricingCache::load_or_default(&path);
        assert_eq!(reloaded.lookup("gpt-6"), ModelPricing::new(1.0, 2.0));
    }

    #[test]
    fn refresh_failure_leaves_existing_pricing_intact() {
        let dir = TempDir::new().unwrap();
        let mut cache = PricingCache::load_or_default(dir.path().join("missing.json"));
        let before = cache.lookup("gpt-4o");
        assert!(cache.refresh(&FailingSource, Utc::now()).is_err());
        assert_eq!(cache.lookup("gpt-4o"), before);
    }

    #[test]
    fn lookup_fuzzy_matches_a_dated_model_suffix_against_its_family() {
        let dir = TempDir::new().unwrap();
        let cache = PricingCache::load_or_default(dir.path().join("missing.json"));
        assert_eq!(cache.lookup("gpt-4o-2024-08-06"), ModelPricing::new(2.5, 10.0));
    }

    #[test]
    fn lookup_falls_back_to_the_flat_default_for_unknown_models() {
        let dir = TempDir::new().unwrap();
        let cache = PricingCache::load_or_default(dir.path().join("missing.json"));
        assert_eq!(cache.lookup("some-unheard-of-model"), DEFAULT_PRICING);
    }
}
