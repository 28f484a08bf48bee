// Defaults loaded from the environment (after `.env` has been read by dotenvy).

use std::env;

lazy_static::lazy_static! {
    pub static ref SEARCH_BASE_URL: String = env::var("FOODHUNTER_SEARCH_URL").unwrap_or_else(|_| "https://api.tavily.com".to_string());
    pub static ref DEFAULT_PROVIDER: String = env::var("FOODHUNTER_PROVIDER").unwrap_or_else(|_| "deepseek".to_string());
    // Overrides the provider's own endpoint, e.g. for a local OpenAI-compatible proxy.
    pub static ref COMPLETION_BASE_URL: Option<String> = env::var("FOODHUNTER_COMPLETION_URL").ok().filter(|s| !s.trim().is_empty());
    pub static ref COMPLETION_MODEL: Option<String> = env::var("FOODHUNTER_MODEL").ok().filter(|s| !s.trim().is_empty());
    pub static ref TEMPLATES_DIR: String = env::var("FOODHUNTER_TEMPLATES_DIR").unwrap_or_else(|_| "templates".to_string());
    pub static ref STATIC_DIR: String = env::var("FOODHUNTER_STATIC_DIR").unwrap_or_else(|_| "static".to_string());
}

/// Secret store key for the completion provider credential.
pub const LLM_API_KEY_VAR: &str = "LLM_API_KEY";
/// Secret store key for the search provider credential.
pub const SEARCH_API_KEY_VAR: &str = "TAVILY_API_KEY";

pub const DEFAULT_MAX_RESULTS: usize = 5;
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const REWRITE_TEMPERATURE: f32 = 0.3;
pub const DEFAULT_BOOST_TERMS: &str = "最新餐饮趋势 爆款";
