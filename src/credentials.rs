//! API credential resolution.
//!
//! Keys come from the host's secret store first (the process environment,
//! populated from `.env` at startup) and fall back to whatever the user typed
//! into the CLI flags or the web form.

use std::collections::HashMap;
use std::fmt;

use crate::constants::{LLM_API_KEY_VAR, SEARCH_API_KEY_VAR};
use crate::error::{CredentialKind, ReportError, Result};

/// Host-managed secrets, looked up by name.
#[derive(Debug, Clone, Default)]
pub struct SecretStore {
    values: HashMap<String, String>,
}

impl SecretStore {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Snapshot the two credential variables from the environment.
    pub fn from_env() -> Self {
        let mut store = Self::empty();
        for key in [LLM_API_KEY_VAR, SEARCH_API_KEY_VAR] {
            if let Ok(value) = std::env::var(key) {
                store = store.with(key, value);
            }
        }
        store
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }
}

#[derive(Clone, Default)]
pub struct Credentials {
    pub llm_api_key: Option<String>,
    pub search_api_key: Option<String>,
}

// Keys never end up in logs.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("llm_api_key", &self.llm_api_key.as_ref().map(|_| "***"))
            .field("search_api_key", &self.search_api_key.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Ready-to-use keys, only obtainable through [`Credentials::require`].
#[derive(Clone)]
pub struct ApiKeys {
    pub llm: String,
    pub search: String,
}

impl fmt::Debug for ApiKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiKeys")
            .field("llm", &"***")
            .field("search", &"***")
            .finish()
    }
}

impl Credentials {
    pub fn new(llm_api_key: Option<String>, search_api_key: Option<String>) -> Self {
        Self {
            llm_api_key: non_blank(llm_api_key),
            search_api_key: non_blank(search_api_key),
        }
    }

    pub fn resolve(
        store: &SecretStore,
        llm_input: Option<String>,
        search_input: Option<String>,
    ) -> Self {
        let llm = store
            .get(LLM_API_KEY_VAR)
            .map(str::to_string)
            .or_else(|| non_blank(llm_input));
        let search = store
            .get(SEARCH_API_KEY_VAR)
            .map(str::to_string)
            .or_else(|| non_blank(search_input));
        Self::new(llm, search)
    }

    pub fn require(&self) -> Result<ApiKeys> {
        let mut missing = Vec::new();
        if self.llm_api_key.is_none() {
            missing.push(CredentialKind::Completion);
        }
        if self.search_api_key.is_none() {
            missing.push(CredentialKind::Search);
        }
        match (&self.llm_api_key, &self.search_api_key) {
            (Some(llm), Some(search)) => Ok(ApiKeys {
                llm: llm.clone(),
                search: search.clone(),
            }),
            _ => Err(ReportError::MissingCredential(missing)),
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
