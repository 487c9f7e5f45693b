use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::Level;
use vidur_core::agent::DEFAULT_LIVE_MODEL;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Output format of the process-wide log subscriber.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("'{}' is not a valid log format", other)),
        }
    }
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub google_api_key: String,
    pub live_model: String,
    /// Overrides the Gemini Live endpoint, e.g. for a regional proxy.
    pub live_url: Option<String>,
    pub log_level: Level,
    pub log_format: LogFormat,
    pub prompts_path: PathBuf,
    pub static_dir: PathBuf,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8000".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let google_api_key = std::env::var("GOOGLE_API_KEY")
            .or_else(|_| std::env::var("GEMINI_API_KEY"))
            .map_err(|_| {
                ConfigError::MissingVar(
                    "GOOGLE_API_KEY (or GEMINI_API_KEY) must be set".to_string(),
                )
            })?;
        if google_api_key.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "GOOGLE_API_KEY".to_string(),
                "API key must not be empty".to_string(),
            ));
        }

        let live_model =
            std::env::var("LIVE_MODEL").unwrap_or_else(|_| DEFAULT_LIVE_MODEL.to_string());
        let live_url = std::env::var("GEMINI_LIVE_URL").ok();

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let log_format = std::env::var("LOG_FORMAT")
            .unwrap_or_else(|_| "text".to_string())
            .parse::<LogFormat>()
            .map_err(|e| ConfigError::InvalidValue("LOG_FORMAT".to_string(), e))?;

        let prompts_path = std::env::var("PROMPTS_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./prompts"));

        let static_dir = std::env::var("STATIC_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./static"));

        Ok(Self {
            bind_address,
            google_api_key,
            live_model,
            live_url,
            log_level,
            log_format,
            prompts_path,
            static_dir,
        })
    }
}
