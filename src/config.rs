use anyhow::{Context, Result};

pub const DEFAULT_OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Glossary database used when `DATABASE_PATH` is unset
pub const DEFAULT_DATABASE_PATH: &str = "mine_action_memory.db";

/// Upload limit for document translation when `MAX_UPLOAD_BYTES` is unset
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct Config {
    // Text generation
    pub openai_api_key: String,
    pub openai_model: String,
    pub openai_api_url: String,
    pub openai_temperature: f32,
    pub request_timeout_secs: u64,

    // Glossary
    pub database_path: String,

    // Server
    pub port: u16,
    /// When set, glossary edits over HTTP require a matching `X-API-Key` header
    pub api_key: Option<String>,
    /// Largest request body accepted by the document endpoint
    pub max_upload_bytes: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            openai_api_key: std::env::var("OPENAI_API_KEY")
                .context("OPENAI_API_KEY not set")?,
            openai_model: std::env::var("OPENAI_MODEL")
                .unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            openai_api_url: std::env::var("OPENAI_API_URL")
                .unwrap_or_else(|_| DEFAULT_OPENAI_API_URL.to_string()),
            openai_temperature: std::env::var("OPENAI_TEMPERATURE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0.2),
            request_timeout_secs: std::env::var("REQUEST_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(60),

            database_path: std::env::var("DATABASE_PATH")
                .unwrap_or_else(|_| DEFAULT_DATABASE_PATH.to_string()),

            port: std::env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8080),
            api_key: std::env::var("API_KEY").ok().filter(|k| !k.is_empty()),
            max_upload_bytes: std::env::var("MAX_UPLOAD_BYTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES),
        })
    }
}
