use serde::Deserialize;

/// Main configuration structure for Sumi-Harvest
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub crawler: CrawlerConfig,
    pub transport: TransportConfig,
    pub robots: RobotsConfig,
    pub storage: StorageConfig,
    pub embeddings: EmbeddingConfig,
    pub server: ServerConfig,
}

/// Crawl scheduler configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CrawlerConfig {
    /// Number of concurrent workers per job
    pub concurrency: usize,

    /// Page budget used when a request does not specify one
    pub default_max_pages: usize,

    /// First sleep when the frontier is transiently empty (milliseconds)
    pub idle_backoff_ms: u64,

    /// Upper bound for the idle sleep (milliseconds)
    pub max_idle_backoff_ms: u64,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            default_max_pages: 50,
            idle_backoff_ms: 20,
            max_idle_backoff_ms: 160,
        }
    }
}

/// HTTP transport configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct TransportConfig {
    /// User-Agent header sent with every request
    pub user_agent: String,

    /// Whole-request timeout, including body streaming (seconds)
    pub timeout_secs: u64,

    /// Hard ceiling on response body size (bytes)
    pub max_bytes: usize,

    /// Maximum redirect hops followed automatically
    pub max_redirects: usize,

    /// Number of hostnames kept in the DNS cache
    pub dns_cache_size: usize,

    /// Lifetime of a cached DNS resolution (seconds)
    pub dns_ttl_secs: u64,

    /// Number of URLs whose ETag/Last-Modified are remembered
    pub metadata_cache_size: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            user_agent: "SumiHarvest/1.0 (+https://github.com/sumi-harvest)".to_string(),
            timeout_secs: 15,
            max_bytes: 2 * 1024 * 1024,
            max_redirects: 5,
            dns_cache_size: 256,
            dns_ttl_secs: 300,
            metadata_cache_size: 10_000,
        }
    }
}

/// Robots.txt evaluation configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RobotsConfig {
    /// Identity matched (as a substring) against `User-agent` groups
    pub identity: String,

    /// How long compiled rules for an origin are reused (seconds)
    pub cache_ttl_secs: u64,

    /// Maximum number of origins kept in the cache
    pub cache_size: usize,
}

impl Default for RobotsConfig {
    fn default() -> Self {
        Self {
            identity: "sumiharvest".to_string(),
            cache_ttl_secs: 30 * 60,
            cache_size: 1024,
        }
    }
}

/// Persistent store configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct StorageConfig {
    /// Path to the SQLite database file
    pub database_path: String,

    /// Number of buffered records that triggers an automatic flush
    pub batch_size: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: "./harvest.db".to_string(),
            batch_size: 32,
        }
    }
}

/// Embedding queue configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct EmbeddingConfig {
    /// Whether extracted text is embedded at all
    pub enabled: bool,

    /// Number of buffered texts that triggers an embedding batch
    pub batch_size: usize,

    /// Vector dimension produced by the built-in embedder
    pub dimensions: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            batch_size: 64,
            dimensions: 256,
        }
    }
}

/// HTTP control surface configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ServerConfig {
    /// Socket address the control surface binds to
    pub listen_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8080".to_string(),
        }
    }
}
