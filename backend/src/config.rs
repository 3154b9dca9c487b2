use clap::Parser;
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub logging: LoggingConfig,
    pub scanner: ScannerConfig,
    pub llm: LlmConfig,
    pub encryption: EncryptionConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Full connection URL. Takes precedence over `db_path` when set.
    pub url: Option<String>,
    /// Path to the sqlite file; used when `url` is unset.
    pub db_path: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Requests must carry this value in `X-API-Key`. Auth is disabled when
    /// unset or left at the "dev-key" placeholder.
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// Scan cycle cadence in seconds (default: 300)
    #[serde(deserialize_with = "deserialize_duration_secs")]
    pub scan_interval_secs: u64,
    /// Lineage refresh cadence in seconds (default: 3600)
    #[serde(deserialize_with = "deserialize_duration_secs")]
    pub lineage_refresh_secs: u64,
    /// Whether the background scanner starts at boot (default: true)
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub api_base: String,
    pub model: String,
    pub api_key: Option<String>,
    /// Per-attempt request timeout in seconds
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct EncryptionConfig {
    /// Base64-encoded 32-byte key for sealing connection URIs.
    pub key: Option<String>,
}

/// Command line arguments for configuration overrides
#[derive(Parser, Debug, Clone)]
#[command(name = "vigil")]
#[command(version, about = "Vigil - Data Quality Observability Platform")]
pub struct CommandLineArgs {
    /// Path to configuration file
    #[arg(long, value_name = "PATH")]
    pub config: Option<String>,

    /// Server host (overrides config file)
    #[arg(long, value_name = "HOST")]
    pub server_host: Option<String>,

    /// Server port (overrides config file)
    #[arg(long, value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Database URL (overrides config file)
    #[arg(long, value_name = "URL")]
    pub database_url: Option<String>,

    /// API key required in X-API-Key (overrides config file)
    #[arg(long, value_name = "KEY")]
    pub api_key: Option<String>,

    /// Logging level (overrides config file, e.g., "info,vigil=debug")
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Scan cycle interval (overrides config file, e.g., "300", "5m")
    #[arg(long, value_name = "DURATION")]
    pub scan_interval: Option<String>,

    /// Lineage refresh interval (overrides config file, e.g., "1h")
    #[arg(long, value_name = "DURATION")]
    pub lineage_refresh_interval: Option<String>,

    /// Enable/disable the background scanner (overrides config file)
    #[arg(long, value_name = "BOOL")]
    pub scanner_enabled: Option<bool>,
}

impl Config {
    /// Load configuration with command line, environment variable, and file support
    ///
    /// Loading order (priority from highest to lowest):
    /// 1. Command line arguments
    /// 2. Environment variables
    /// 3. Configuration file (config.toml)
    /// 4. Default values
    pub fn load() -> Result<Self, anyhow::Error> {
        let cli_args = CommandLineArgs::parse();

        let config_path = cli_args.config.clone().or_else(Self::find_config_file);
        let mut config = if let Some(config_path) = config_path {
            Self::from_toml(&config_path)?
        } else {
            tracing::warn!("Configuration file not found, using defaults");
            Config::default()
        };

        config.apply_env_overrides();
        config.apply_cli_overrides(&cli_args);
        config.validate()?;

        Ok(config)
    }

    /// Resolve the sqlx connection URL from `url` or `db_path`.
    pub fn database_url(&self) -> String {
        match &self.database.url {
            Some(url) => url.clone(),
            None => format!("sqlite://{}", self.database.db_path),
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - DB_PATH: sqlite file path (default: data/vigil.db)
    /// - DATABASE_URL: full database URL, takes precedence over DB_PATH
    /// - API_KEY: API key required in X-API-Key
    /// - LOG_LEVEL: logging filter (e.g., "info,vigil=debug")
    /// - ENCRYPTION_KEY: base64 key for connection URI encryption
    /// - OPENAI_API_KEY: LLM API key
    /// - SCAN_INTERVAL_SECONDS: scan cadence (accepts "300", "5m")
    /// - LINEAGE_REFRESH_SECONDS: lineage refresh cadence (accepts "1h")
    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("DB_PATH") {
            self.database.db_path = path;
            tracing::info!("Override database.db_path from env: {}", self.database.db_path);
        }

        if let Ok(url) = std::env::var("DATABASE_URL") {
            self.database.url = Some(url);
            tracing::info!("Override database.url from env");
        }

        if let Ok(key) = std::env::var("API_KEY") {
            self.auth.api_key = Some(key);
            tracing::info!("Override auth.api_key from env");
        }

        if let Ok(level) = std::env::var("LOG_LEVEL") {
            self.logging.level = level;
            tracing::info!("Override logging.level from env: {}", self.logging.level);
        }

        if let Ok(key) = std::env::var("ENCRYPTION_KEY") {
            self.encryption.key = Some(key);
            tracing::info!("Override encryption.key from env");
        }

        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            self.llm.api_key = Some(key);
            tracing::info!("Override llm.api_key from env");
        }

        if let Ok(interval) = std::env::var("SCAN_INTERVAL_SECONDS") {
            match parse_duration_to_secs(&interval) {
                Ok(val) => {
                    self.scanner.scan_interval_secs = val;
                    tracing::info!(
                        "Override scanner.scan_interval_secs from env: {}",
                        self.scanner.scan_interval_secs
                    );
                },
                Err(e) => tracing::warn!(
                    "Invalid SCAN_INTERVAL_SECONDS '{}': {} (keep {})",
                    interval,
                    e,
                    self.scanner.scan_interval_secs
                ),
            }
        }

        if let Ok(interval) = std::env::var("LINEAGE_REFRESH_SECONDS") {
            match parse_duration_to_secs(&interval) {
                Ok(val) => {
                    self.scanner.lineage_refresh_secs = val;
                    tracing::info!(
                        "Override scanner.lineage_refresh_secs from env: {}",
                        self.scanner.lineage_refresh_secs
                    );
                },
                Err(e) => tracing::warn!(
                    "Invalid LINEAGE_REFRESH_SECONDS '{}': {} (keep {})",
                    interval,
                    e,
                    self.scanner.lineage_refresh_secs
                ),
            }
        }
    }

    /// Apply command line argument overrides (highest priority)
    fn apply_cli_overrides(&mut self, args: &CommandLineArgs) {
        if let Some(host) = &args.server_host {
            self.server.host = host.clone();
            tracing::info!("Override server.host from CLI: {}", self.server.host);
        }

        if let Some(port) = args.server_port {
            self.server.port = port;
            tracing::info!("Override server.port from CLI: {}", self.server.port);
        }

        if let Some(url) = &args.database_url {
            self.database.url = Some(url.clone());
            tracing::info!("Override database.url from CLI");
        }

        if let Some(key) = &args.api_key {
            self.auth.api_key = Some(key.clone());
            tracing::info!("Override auth.api_key from CLI");
        }

        if let Some(level) = &args.log_level {
            self.logging.level = level.clone();
            tracing::info!("Override logging.level from CLI: {}", self.logging.level);
        }

        if let Some(interval) = &args.scan_interval {
            match parse_duration_to_secs(interval) {
                Ok(val) => {
                    self.scanner.scan_interval_secs = val;
                    tracing::info!(
                        "Override scanner.scan_interval_secs from CLI: {}",
                        self.scanner.scan_interval_secs
                    );
                },
                Err(e) => tracing::warn!(
                    "Invalid --scan-interval '{}': {} (keep {})",
                    interval,
                    e,
                    self.scanner.scan_interval_secs
                ),
            }
        }

        if let Some(interval) = &args.lineage_refresh_interval {
            match parse_duration_to_secs(interval) {
                Ok(val) => {
                    self.scanner.lineage_refresh_secs = val;
                    tracing::info!(
                        "Override scanner.lineage_refresh_secs from CLI: {}",
                        self.scanner.lineage_refresh_secs
                    );
                },
                Err(e) => tracing::warn!(
                    "Invalid --lineage-refresh-interval '{}': {} (keep {})",
                    interval,
                    e,
                    self.scanner.lineage_refresh_secs
                ),
            }
        }

        if let Some(enabled) = args.scanner_enabled {
            self.scanner.enabled = enabled;
            tracing::info!("Override scanner.enabled from CLI: {}", self.scanner.enabled);
        }
    }

    /// Validate configuration
    fn validate(&self) -> Result<(), anyhow::Error> {
        if self.server.port == 0 {
            anyhow::bail!("Server port cannot be 0");
        }

        if self.database.url.is_none() && self.database.db_path.is_empty() {
            anyhow::bail!("Database path cannot be empty");
        }

        if self.scanner.scan_interval_secs == 0 {
            anyhow::bail!("scanner.scan_interval_secs must be > 0");
        }
        if self.scanner.lineage_refresh_secs == 0 {
            anyhow::bail!("scanner.lineage_refresh_secs must be > 0");
        }

        if let Some(key) = &self.encryption.key {
            crate::utils::crypto::validate_key(key)?;
        }

        if self.auth.api_key.as_deref() == Some("dev-key") {
            tracing::warn!("API key is the 'dev-key' placeholder; authentication is disabled");
        }

        Ok(())
    }

    fn find_config_file() -> Option<String> {
        let possible_paths =
            ["conf/config.toml", "config.toml", "./conf/config.toml", "./config.toml"];

        for path in &possible_paths {
            if Path::new(path).exists() {
                return Some(path.to_string());
            }
        }
        None
    }

    fn from_toml(path: &str) -> Result<Self, anyhow::Error> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "0.0.0.0".to_string(), port: 8080 }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { url: None, db_path: "data/vigil.db".to_string() }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self { api_key: None }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info,vigil=debug".to_string(), file: Some("logs/vigil.log".to_string()) }
    }
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self { scan_interval_secs: 300, lineage_refresh_secs: 3600, enabled: true }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".to_string(),
            model: "gpt-4".to_string(),
            api_key: None,
            timeout_secs: 30,
        }
    }
}

// =========================
// Helpers for parsing values
// =========================

fn parse_duration_to_secs(input: &str) -> Result<u64, String> {
    // Accept plain numbers (treated as seconds)
    if let Ok(val) = input.parse::<u64>() {
        return Ok(val);
    }

    let s = input.trim().to_lowercase();
    let (num_str, unit) = s.split_at(s.chars().take_while(|c| c.is_ascii_digit()).count());
    if num_str.is_empty() || unit.is_empty() {
        return Err("missing number or unit".into());
    }
    let n: u64 = num_str.parse().map_err(|_| "invalid number".to_string())?;
    match unit {
        "s" | "sec" | "secs" | "second" | "seconds" => Ok(n),
        "m" | "min" | "mins" | "minute" | "minutes" => Ok(n * 60),
        "h" | "hr" | "hour" | "hours" => Ok(n * 60 * 60),
        "d" | "day" | "days" => Ok(n * 60 * 60 * 24),
        _ => Err(format!("unsupported unit: {}", unit)),
    }
}

// Custom serde deserializer to support numeric or human-friendly string values
fn deserialize_duration_secs<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    struct Visitor;
    impl<'de> serde::de::Visitor<'de> for Visitor {
        type Value = u64;
        fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
            write!(f, "a number of seconds or a string like '30s', '5m', '1h'")
        }
        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E> {
            Ok(v)
        }
        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            if v >= 0 { Ok(v as u64) } else { Err(E::custom("negative not allowed")) }
        }
        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            parse_duration_to_secs(v).map_err(E::custom)
        }
        fn visit_string<E>(self, v: String) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            parse_duration_to_secs(&v).map_err(E::custom)
        }
    }
    deserializer.deserialize_any(Visitor)
}
