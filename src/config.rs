//! Environment configuration
//!
//! Values come from the process environment, optionally seeded from a `.env`
//! file by the binary (`dotenv`). Only the model key is needed for a real
//! agent run; everything else has a usable default.

use crate::error::LedgerError;
use crate::llm::Pricing;
use crate::Result;
use std::env;
use std::path::PathBuf;

const DEFAULT_LLM_BASE_URL: &str = "https://openrouter.ai/api/v1";
const DEFAULT_LLM_MODEL: &str = "deepseek/deepseek-chat-v3-0324:free";
const DEFAULT_PLAID_BASE_URL: &str = "https://sandbox.plaid.com";

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub pricing: Pricing,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_LLM_BASE_URL.to_string(),
            model: DEFAULT_LLM_MODEL.to_string(),
            max_tokens: 1024,
            pricing: Pricing::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PlaidConfig {
    pub client_id: String,
    pub secret: String,
    pub base_url: String,
}

/// Where cache, budget and agent memory documents live
#[derive(Debug, Clone, PartialEq)]
pub enum StorageConfig {
    Directory(PathBuf),
    Postgres(String),
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub plaid: Option<PlaidConfig>,
    pub storage: StorageConfig,
    /// Token from a previous link, if the caller keeps one outside the store
    pub access_token: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let llm = LlmConfig {
            api_key: env::var("OPENROUTER_API_KEY").unwrap_or_default(),
            base_url: env::var("LLM_BASE_URL").unwrap_or_else(|_| DEFAULT_LLM_BASE_URL.to_string()),
            model: env::var("LLM_MODEL").unwrap_or_else(|_| DEFAULT_LLM_MODEL.to_string()),
            max_tokens: parse_var("LLM_MAX_TOKENS")?.unwrap_or(1024),
            pricing: Pricing {
                prompt_per_1k: parse_var("LLM_PROMPT_COST_PER_1K")?.unwrap_or(0.0),
                completion_per_1k: parse_var("LLM_COMPLETION_COST_PER_1K")?.unwrap_or(0.0),
            },
        };

        let plaid = match (env::var("PLAID_CLIENT_ID"), env::var("PLAID_SECRET")) {
            (Ok(client_id), Ok(secret)) if !client_id.is_empty() && !secret.is_empty() => {
                Some(PlaidConfig {
                    client_id,
                    secret,
                    base_url: env::var("PLAID_BASE_URL")
                        .unwrap_or_else(|_| DEFAULT_PLAID_BASE_URL.to_string()),
                })
            }
            _ => None,
        };

        let storage = match env::var("POSTGRES_URL").or_else(|_| env::var("DATABASE_URL")) {
            Ok(url) if !url.trim().is_empty() => StorageConfig::Postgres(url),
            _ => StorageConfig::Directory(
                env::var("DATA_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from(".ledger-data")),
            ),
        };

        let access_token = env::var("PLAID_ACCESS_TOKEN")
            .ok()
            .filter(|t| !t.trim().is_empty());

        Ok(Self {
            llm,
            plaid,
            storage,
            access_token,
        })
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| LedgerError::Config(format!("{} has an invalid value: {}", name, raw))),
        _ => Ok(None),
    }
}
