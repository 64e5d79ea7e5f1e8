use std::fmt;
use std::path::PathBuf;

use extract::{GroqClient, DEFAULT_GROQ_BASE_URL, DEFAULT_GROQ_MODEL};
use search::{SearchParams, SerpApiClient, DEFAULT_SERPAPI_BASE_URL};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_CREDENTIALS_FILE: &str = "google_credentials.json";
pub const DEFAULT_EXPORT_WORKSHEET: &str = "Sheet4";
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:3000";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    MissingVar(&'static str),
}

/// Provider secret. Never printed.
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub search: SearchConfig,
    pub llm: LlmConfig,
    pub sheets: SheetsConfig,
    pub export: ExportConfig,
    pub listen_addr: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    pub base_url: String,
    #[serde(skip_serializing)]
    pub api_key: ApiKey,
    pub params: SearchParams,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub base_url: String,
    #[serde(skip_serializing)]
    pub api_key: ApiKey,
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SheetsConfig {
    pub base_url: String,
    pub credentials_file: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Worksheet that receives results on write-back
    pub worksheet: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            search: SearchConfig {
                base_url: DEFAULT_SERPAPI_BASE_URL.to_string(),
                api_key: ApiKey::default(),
                params: SearchParams::default(),
            },
            llm: LlmConfig {
                base_url: DEFAULT_GROQ_BASE_URL.to_string(),
                api_key: ApiKey::default(),
                model: DEFAULT_GROQ_MODEL.to_string(),
            },
            sheets: SheetsConfig {
                base_url: ingest::DEFAULT_SHEETS_BASE_URL.to_string(),
                credentials_file: PathBuf::from(DEFAULT_CREDENTIALS_FILE),
            },
            export: ExportConfig {
                worksheet: DEFAULT_EXPORT_WORKSHEET.to_string(),
            },
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
        }
    }
}

impl AppConfig {
    /// Build from the process environment, after loading `.env` if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let require = |key: &'static str| get(key).ok_or(ConfigError::MissingVar(key));

        let mut config = Self::default();

        config.search.api_key = ApiKey::new(require("SERPAPI_KEY")?);
        config.llm.api_key = ApiKey::new(require("GROQ_API_KEY")?);

        if let Some(url) = get("SERPAPI_BASE_URL") {
            config.search.base_url = url;
        }
        if let Some(url) = get("GROQ_BASE_URL") {
            config.llm.base_url = url;
        }
        if let Some(model) = get("GROQ_MODEL") {
            config.llm.model = model;
        }
        if let Some(url) = get("SHEETS_BASE_URL") {
            config.sheets.base_url = url;
        }
        if let Some(path) = get("GOOGLE_CREDENTIALS_FILE") {
            config.sheets.credentials_file = PathBuf::from(path);
        }
        if let Some(worksheet) = get("EXPORT_WORKSHEET") {
            config.export.worksheet = worksheet;
        }
        if let Some(addr) = get("API_LISTEN_ADDR") {
            config.listen_addr = addr;
        }

        Ok(config)
    }

    pub fn search_client(&self) -> SerpApiClient {
        SerpApiClient::new(
            self.search.base_url.clone(),
            self.search.api_key.expose().to_string(),
            self.search.params.clone(),
        )
    }

    pub fn llm_client(&self) -> GroqClient {
        GroqClient::new(
            self.llm.base_url.clone(),
            self.llm.api_key.expose().to_string(),
            self.llm.model.clone(),
        )
    }
}
