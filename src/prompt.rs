use std::fmt;
use std::str::FromStr;

use minijinja::{context, AutoEscape, Environment};
use serde::{Deserialize, Serialize};

use crate::error::{ReportError, Result};
use crate::search::Evidence;

const PERSONA_MARKDOWN: &str = "persona_markdown";
const PERSONA_CARDS: &str = "persona_cards";
const USER_MESSAGE: &str = "user_message";
const REWRITE_QUERY: &str = "rewrite_query";

/// How the model is asked to lay out the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Markdown,
    /// HTML fragment with one card per dish
    Html,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Markdown => "md",
            OutputFormat::Html => "html",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Markdown => write!(f, "markdown"),
            OutputFormat::Html => write!(f, "html"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            "html" | "cards" => Ok(OutputFormat::Html),
            other => Err(ReportError::UnknownFormat(other.to_string())),
        }
    }
}

/// Renders the persona prompt and the per-request user message.
pub struct PromptRenderer {
    env: Environment<'static>,
    max_cards: usize,
}

impl PromptRenderer {
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        // Prompts are plain text even when they contain HTML.
        env.set_auto_escape_callback(|_| AutoEscape::None);
        env.add_template(
            PERSONA_MARKDOWN,
            include_str!("../templates/prompts/persona_markdown.j2"),
        )?;
        env.add_template(
            PERSONA_CARDS,
            include_str!("../templates/prompts/persona_cards.j2"),
        )?;
        env.add_template(
            USER_MESSAGE,
            include_str!("../templates/prompts/user_message.j2"),
        )?;
        env.add_template(
            REWRITE_QUERY,
            include_str!("../templates/prompts/rewrite_query.j2"),
        )?;
        Ok(Self { env, max_cards: 3 })
    }

    pub fn with_max_cards(mut self, max_cards: usize) -> Self {
        self.max_cards = max_cards.max(1);
        self
    }

    pub fn system_prompt(&self, format: OutputFormat) -> Result<String> {
        let name = match format {
            OutputFormat::Markdown => PERSONA_MARKDOWN,
            OutputFormat::Html => PERSONA_CARDS,
        };
        let rendered = self
            .env
            .get_template(name)?
            .render(context! { max_cards => self.max_cards })?;
        Ok(rendered)
    }

    pub fn user_message(&self, request: &str, evidence: &[Evidence]) -> Result<String> {
        let rendered = self
            .env
            .get_template(USER_MESSAGE)?
            .render(context! { request => request, evidence => evidence })?;
        Ok(rendered)
    }

    pub fn rewrite_prompt(&self, request: &str) -> Result<String> {
        let rendered = self
            .env
            .get_template(REWRITE_QUERY)?
            .render(context! { request => request })?;
        Ok(rendered)
    }
}
