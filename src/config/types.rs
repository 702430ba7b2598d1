use serde::{Deserialize, Serialize};

use crate::metadata::semantic::SemanticBackend;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub tmdb: TmdbConfig,

    #[serde(default)]
    pub douban: DoubanConfig,

    #[serde(default)]
    pub wikipedia: WikipediaConfig,

    #[serde(default)]
    pub semantic: SemanticConfig,

    #[serde(default)]
    pub locale: LocaleConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub health: HealthConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub resolution: ResolutionConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> String {
    "framevault.db".to_string()
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TmdbConfig {
    /// TMDB API key. The provider is disabled when empty.
    #[serde(default)]
    pub api_key: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DoubanConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for DoubanConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WikipediaConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for WikipediaConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SemanticConfig {
    /// Which completion API dialect to use.
    #[serde(default)]
    pub backend: SemanticBackend,

    /// API key for the completion provider. The step is skipped when empty.
    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_semantic_model")]
    pub model: String,
}

impl Default for SemanticConfig {
    fn default() -> Self {
        Self {
            backend: SemanticBackend::default(),
            api_key: String::new(),
            model: default_semantic_model(),
        }
    }
}

fn default_semantic_model() -> String {
    "gpt-4o-mini".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LocaleConfig {
    /// Preferred display locale.
    #[serde(default = "default_preferred_locale")]
    pub preferred: String,

    /// Ordered fallback chain. Derived from `preferred` when empty.
    #[serde(default)]
    pub chain: Vec<String>,
}

impl Default for LocaleConfig {
    fn default() -> Self {
        Self {
            preferred: default_preferred_locale(),
            chain: Vec::new(),
        }
    }
}

fn default_preferred_locale() -> String {
    "zh-TW".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    /// How long resolution results stay fresh (default: 24)
    #[serde(default = "default_cache_ttl_hours")]
    pub ttl_hours: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_hours: default_cache_ttl_hours(),
        }
    }
}

fn default_cache_ttl_hours() -> u64 {
    24
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HealthConfig {
    /// Consecutive failures before a source is marked down (default: 3)
    #[serde(default = "default_error_threshold")]
    pub error_threshold: u32,

    /// Skip sources currently marked down instead of calling them.
    #[serde(default = "default_true")]
    pub skip_down_sources: bool,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            error_threshold: default_error_threshold(),
            skip_down_sources: true,
        }
    }
}

fn default_error_threshold() -> u32 {
    3
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    /// Attempts before a task is dropped as exhausted (default: 4)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// First backoff step in seconds; later steps double it (default: 1)
    #[serde(default = "default_base_delay_secs")]
    pub base_delay_secs: u64,

    /// How often the drain worker wakes up (default: 30)
    #[serde(default = "default_drain_interval_secs")]
    pub drain_interval_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_secs: default_base_delay_secs(),
            drain_interval_secs: default_drain_interval_secs(),
        }
    }
}

fn default_max_attempts() -> u32 {
    4
}

fn default_base_delay_secs() -> u64 {
    1
}

fn default_drain_interval_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResolutionConfig {
    /// Pause between consecutive source attempts (default: 200)
    #[serde(default = "default_inter_source_delay_ms")]
    pub inter_source_delay_ms: u64,

    /// Lowest confidence accepted as a match (default: 0.2)
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self {
            inter_source_delay_ms: default_inter_source_delay_ms(),
            min_confidence: default_min_confidence(),
        }
    }
}

fn default_inter_source_delay_ms() -> u64 {
    200
}

fn default_min_confidence() -> f64 {
    0.2
}

fn default_true() -> bool {
    true
}
