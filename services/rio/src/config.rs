//! Application Configuration Module
//!
//! Centralizes the configuration for the Rio service. Settings come from
//! environment variables and are validated once at startup.

use std::env;
use std::path::PathBuf;

use tracing::Level;

use rio_core::state::UserProfile;

// --- Application Constants ---

/// The size of each audio chunk sent from the microphone input stream.
pub const INPUT_CHUNK_SIZE: usize = 1024;
/// The size of each audio chunk for the audio output stream.
pub const OUTPUT_CHUNK_SIZE: usize = 1024;
/// The latency for the output audio buffer in milliseconds.
pub const OUTPUT_LATENCY_MS: usize = 1000;

/// Default public playlist for the IPTV channel list.
const DEFAULT_PLAYLIST_URL: &str =
    "https://raw.githubusercontent.com/vuminhthanh12/vuminhthanh12/refs/heads/main/vmttv";
/// Model answering grounded search queries.
const DEFAULT_SEARCH_MODEL: &str = "gemini-2.5-flash";

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid log level provided for RUST_LOG: {0}")]
    InvalidLogLevel(String),
}

/// Holds all configuration loaded from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub gemini_api_key: String,
    pub search_model: String,
    pub playlist_url: String,
    pub history_path: PathBuf,
    pub profile: UserProfile,
    pub log_level: Level,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    // *   `GEMINI_API_KEY`: Your secret key for the Gemini API. Required.
    // *   `RIO_USER_NAME` / `RIO_USER_GENDER`: Who Rio is talking to.
    // *   `RIO_NAME`: (Optional) What the companion calls itself. Defaults to "Rio".
    // *   `RIO_WAKE_WORD`: (Optional) Custom wake phrase. Defaults to "<name> ơi".
    // *   `RIO_VOICE`: (Optional) Voice for spoken replies. Defaults to "Zephyr".
    // *   `RIO_HISTORY_PATH`: (Optional) Where chat history is persisted.
    // *   `RIO_PLAYLIST_URL`: (Optional) IPTV playlist to search channels in.
    // *   `SEARCH_MODEL`: (Optional) Model used for grounded web search.
    // *   `RUST_LOG`: (Optional) Logging level. Defaults to "INFO".
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file. Useful for local development, ignored if absent.
        dotenvy::dotenv().ok();

        let gemini_api_key = env::var("GEMINI_API_KEY")
            .map_err(|_| ConfigError::MissingVar("GEMINI_API_KEY".to_string()))?;

        let profile = UserProfile {
            name: env::var("RIO_USER_NAME").unwrap_or_else(|_| "bạn".to_string()),
            gender: env::var("RIO_USER_GENDER").unwrap_or_else(|_| "bạn".to_string()),
            rio_name: env::var("RIO_NAME").ok(),
            wake_word: env::var("RIO_WAKE_WORD").ok(),
            voice: env::var("RIO_VOICE").ok(),
        };

        let history_path = env::var("RIO_HISTORY_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("rio-history.json"));

        let playlist_url =
            env::var("RIO_PLAYLIST_URL").unwrap_or_else(|_| DEFAULT_PLAYLIST_URL.to_string());

        let search_model =
            env::var("SEARCH_MODEL").unwrap_or_else(|_| DEFAULT_SEARCH_MODEL.to_string());

        let log_level_str = env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str
            .parse::<Level>()
            .map_err(|_| ConfigError::InvalidLogLevel(log_level_str))?;

        Ok(Self {
            gemini_api_key,
            search_model,
            playlist_url,
            history_path,
            profile,
            log_level,
        })
    }
}
