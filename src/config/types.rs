use serde::Deserialize;

/// Main configuration structure for Arena-Stats
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub crawl: CrawlConfig,
    pub output: OutputConfig,
    #[serde(default)]
    pub seeds: SeedsConfig,
}

/// Upstream API connection and pacing configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the developer API
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Name of the environment variable holding the API key
    #[serde(rename = "api-key-env")]
    pub api_key_env: Option<String>,

    /// Minimum milliseconds between any two requests, process-wide
    #[serde(rename = "min-interval-ms")]
    pub min_interval_ms: u64,

    /// Maximum retries when the upstream signals throttling
    #[serde(rename = "max-retries")]
    pub max_retries: u32,

    /// Per-request timeout in seconds
    #[serde(rename = "timeout-secs")]
    pub timeout_secs: u64,
}

impl ApiConfig {
    /// Reads the API key from the configured environment variable.
    pub fn api_key(&self) -> Option<String> {
        self.api_key_env
            .as_deref()
            .and_then(|name| std::env::var(name).ok())
            .filter(|value| !value.is_empty())
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://open-api.example.io".to_string(),
            api_key_env: Some("ARENA_API_KEY".to_string()),
            min_interval_ms: 1000,
            max_retries: 3,
            timeout_secs: 10,
        }
    }
}

/// Crawl behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    /// Maximum traversal depth from the seed players (seeds are depth 0)
    #[serde(rename = "max-depth")]
    pub max_depth: u32,

    /// Cap on the number of games considered per player; omit for all
    #[serde(rename = "max-games-per-user")]
    pub max_games_per_user: Option<u32>,

    /// Whether to fetch the full participant list for each game
    #[serde(rename = "fetch-game-details")]
    pub fetch_game_details: bool,

    /// Stop paging a player's game list once a previously ingested match
    /// is reached
    #[serde(rename = "only-newer-games")]
    pub only_newer_games: bool,

    /// Skip the stored nickname->uid shortcut and always ask the API
    #[serde(rename = "prefer-api-lookup")]
    pub prefer_api_lookup: bool,

    /// When a freshly recovered identifier still reports "no games",
    /// re-enter the recovery protocol instead of accepting the empty result
    #[serde(rename = "recheck-empty-after-recovery")]
    pub recheck_empty_after_recovery: bool,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            max_depth: 1,
            max_games_per_user: None,
            fetch_game_details: true,
            only_newer_games: true,
            prefer_api_lookup: false,
            recheck_empty_after_recovery: false,
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// Optional directory for the partitioned export datasets
    #[serde(rename = "export-dir")]
    pub export_dir: Option<String>,
}

/// Seed players to start the crawl from
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SeedsConfig {
    /// Public nicknames, resolved through the lookup endpoint
    #[serde(default)]
    pub nicknames: Vec<String>,

    /// Stable identifiers, used directly without resolution
    #[serde(default)]
    pub uids: Vec<String>,
}
