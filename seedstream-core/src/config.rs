//! Centralized configuration for Seedstream.
//!
//! All tunable parameters and settings are defined here to avoid
//! hard-coded values scattered throughout the codebase. The configuration
//! is built once at startup and passed by value or reference to the
//! constructors that need it.

use std::path::PathBuf;
use std::time::Duration;

/// Central configuration for all Seedstream components.
///
/// Groups related configuration settings into logical sections.
/// Supports environment variable overrides for runtime customization.
#[derive(Debug, Clone, Default)]
pub struct SeedstreamConfig {
    pub tracker: TrackerConfig,
    pub search: SearchConfig,
    pub metadata: MetadataConfig,
    pub storage: StorageConfig,
    pub streaming: StreamingConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

/// Upstream tracker access.
///
/// Controls where the tracker lives, which credentials are used for the
/// form login and how long a session cookie is trusted when the tracker
/// does not announce an expiry.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Short name used in play URLs and stream descriptors
    pub source_name: String,
    /// Base URL of the tracker, without trailing slash
    pub base_url: String,
    pub username: String,
    pub password: String,
    /// User agent for HTTP requests
    pub user_agent: String,
    /// Timeout applied to every outbound tracker request
    pub request_timeout: Duration,
    /// Session lifetime assumed when the login cookie carries no expiry
    pub session_ttl: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            source_name: "tracker".to_string(),
            base_url: "http://127.0.0.1:8081".to_string(),
            username: String::new(),
            password: String::new(),
            user_agent: "seedstream/0.1.0".to_string(),
            request_timeout: Duration::from_secs(20),
            session_ttl: Duration::from_secs(3600), // 1 hour
        }
    }
}

/// Search, caching and enrichment fan-out settings.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// How long a search result list stays valid
    pub cache_ttl: Duration,
    /// Maximum number of cached queries
    pub cache_capacity: usize,
    /// Number of torrent files fetched in parallel per batch
    pub batch_size: usize,
    /// Pause between two enrichment batches
    pub batch_delay: Duration,
    /// Upper bound on result pages requested for a single query
    pub max_pages: u32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(1800), // 30 minutes
            cache_capacity: 500,
            batch_size: 5,
            batch_delay: Duration::from_millis(500),
            max_pages: 10,
        }
    }
}

/// Title metadata lookup used by the fallback search.
#[derive(Debug, Clone)]
pub struct MetadataConfig {
    pub base_url: String,
    pub api_key: Option<String>,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            base_url: "http://www.omdbapi.com".to_string(),
            api_key: None,
        }
    }
}

/// On-disk layout for torrent files, downloaded data and persisted state.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Directory holding one download directory per torrent
    pub download_dir: PathBuf,
    /// Directory holding fetched `.torrent` files
    pub torrent_dir: PathBuf,
    /// JSON file mapping info hashes to torrent file paths
    pub state_file: PathBuf,
    /// Interval between removable-torrent sweeps (None = disabled)
    pub cleanup_interval: Option<Duration>,
}

impl StorageConfig {
    /// Creates a storage layout rooted at a single directory.
    pub fn rooted_at(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            download_dir: root.join("downloads"),
            torrent_dir: root.join("torrents"),
            state_file: root.join("torrents.json"),
            cleanup_interval: None,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            cleanup_interval: Some(Duration::from_secs(6 * 3600)),
            ..Self::rooted_at("data")
        }
    }
}

/// Range negotiation and prefetch tuning.
#[derive(Debug, Clone)]
pub struct StreamingConfig {
    /// Minimum response window for a cold request at byte 0
    pub min_initial_window: u64,
    /// Forward window prioritized when playback resumes at an offset
    pub resume_prefetch_window: u64,
    /// Optional clamp for open-ended `bytes=N-` requests
    pub max_chunk_size: Option<u64>,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            min_initial_window: 4 * 1024 * 1024,      // 4 MiB
            resume_prefetch_window: 32 * 1024 * 1024, // 32 MiB
            max_chunk_size: None,
        }
    }
}

/// Log output of the CLI process.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Directory holding one full-trace file per command
    pub logs_dir: PathBuf,
    /// Filter directives for the trace file
    pub file_directives: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            logs_dir: PathBuf::from("data/logs"),
            file_directives: "info,seedstream=trace,seedstream_core=trace,seedstream_search=trace,\
                              seedstream_web=trace,tower_http=debug"
                .to_string(),
        }
    }
}

/// HTTP listener settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Base URL clients use to reach this server, embedded in stream URLs
    pub public_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 7000,
            public_url: "http://127.0.0.1:7000".to_string(),
        }
    }
}

impl SeedstreamConfig {
    /// Creates configuration with environment variable overrides.
    ///
    /// Allows runtime configuration via environment variables while
    /// maintaining sensible defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("SEEDSTREAM_TRACKER_URL") {
            config.tracker.base_url = url.trim_end_matches('/').to_string();
        }
        if let Ok(name) = std::env::var("SEEDSTREAM_TRACKER_NAME") {
            config.tracker.source_name = name;
        }
        if let Ok(username) = std::env::var("SEEDSTREAM_TRACKER_USERNAME") {
            config.tracker.username = username;
        }
        if let Ok(password) = std::env::var("SEEDSTREAM_TRACKER_PASSWORD") {
            config.tracker.password = password;
        }
        if let Ok(timeout) = std::env::var("SEEDSTREAM_TRACKER_TIMEOUT")
            && let Ok(seconds) = timeout.parse::<u64>()
        {
            config.tracker.request_timeout = Duration::from_secs(seconds);
        }

        if let Ok(ttl) = std::env::var("SEEDSTREAM_CACHE_TTL")
            && let Ok(seconds) = ttl.parse::<u64>()
        {
            config.search.cache_ttl = Duration::from_secs(seconds);
        }
        if let Ok(size) = std::env::var("SEEDSTREAM_BATCH_SIZE")
            && let Ok(count) = size.parse::<usize>()
        {
            config.search.batch_size = count;
        }

        if let Ok(api_key) = std::env::var("OMDB_API_KEY") {
            config.metadata.api_key = Some(api_key);
        }

        if let Ok(root) = std::env::var("SEEDSTREAM_DATA_DIR") {
            let cleanup_interval = config.storage.cleanup_interval;
            config.logging.logs_dir = PathBuf::from(&root).join("logs");
            config.storage = StorageConfig {
                cleanup_interval,
                ..StorageConfig::rooted_at(root)
            };
        }
        if let Ok(directives) = std::env::var("SEEDSTREAM_FILE_LOG") {
            config.logging.file_directives = directives;
        }

        if let Ok(port) = std::env::var("SEEDSTREAM_PORT")
            && let Ok(port) = port.parse::<u16>()
        {
            config.server.port = port;
        }
        if let Ok(public_url) = std::env::var("SEEDSTREAM_PUBLIC_URL") {
            config.server.public_url = public_url.trim_end_matches('/').to_string();
        }

        config
    }

    /// Creates a configuration optimized for testing.
    ///
    /// Storage lives under `root`, batches run without delay and the
    /// background cleanup sweep is disabled.
    pub fn for_testing(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            search: SearchConfig {
                batch_delay: Duration::ZERO,
                ..SearchConfig::default()
            },
            logging: LoggingConfig {
                logs_dir: root.join("logs"),
                ..LoggingConfig::default()
            },
            storage: StorageConfig::rooted_at(root),
            streaming: StreamingConfig {
                min_initial_window: 1024,
                resume_prefetch_window: 4096,
                max_chunk_size: None,
            },
            ..Self::default()
        }
    }

    /// Checks settings that would make components misbehave.
    ///
    /// # Errors
    ///
    /// - `SeedstreamError::Configuration` - A value is out of range
    pub fn validate(&self) -> crate::Result<()> {
        if self.search.batch_size == 0 {
            return Err(crate::SeedstreamError::Configuration {
                reason: "search.batch_size must be at least 1".to_string(),
            });
        }
        if self.search.cache_capacity == 0 {
            return Err(crate::SeedstreamError::Configuration {
                reason: "search.cache_capacity must be at least 1".to_string(),
            });
        }
        if self.streaming.min_initial_window == 0 {
            return Err(crate::SeedstreamError::Configuration {
                reason: "streaming.min_initial_window must be positive".to_string(),
            });
        }
        if let Some(max_chunk) = self.streaming.max_chunk_size
            && max_chunk < self.streaming.min_initial_window
        {
            return Err(crate::SeedstreamError::Configuration {
                reason: "streaming.max_chunk_size is smaller than the initial window"
                    .to_string(),
            });
        }
        Ok(())
    }
}
