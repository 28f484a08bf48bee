//! One report interaction: credentials → query → search → prompt → completion → cleanup.

use chrono::Local;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use crate::completion::{CompletionClient, Provider};
use crate::constants;
use crate::credentials::{ApiKeys, Credentials};
use crate::error::Result;
use crate::prompt::{OutputFormat, PromptRenderer};
use crate::query::QueryBuilder;
use crate::sanitize;
use crate::search::{Evidence, SearchClient};
use crate::transcript::Transcript;

/// Everything about a report run that is not a credential.
#[derive(Debug, Clone)]
pub struct Settings {
    pub provider: Provider,
    /// Overrides `provider.base_url()`
    pub completion_base_url: Option<String>,
    /// Overrides `provider.model()`
    pub model: Option<String>,
    pub search_base_url: String,
    pub max_results: usize,
    pub temperature: f32,
    pub rewrite_temperature: f32,
    pub format: OutputFormat,
    /// Ask the model for a better search query before searching.
    pub rewrite_query: bool,
    /// Look up a picture for each dish card (HTML format only).
    pub enrich_images: bool,
    pub query: QueryBuilder,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            provider: Provider::default(),
            completion_base_url: None,
            model: None,
            search_base_url: "https://api.tavily.com".to_string(),
            max_results: constants::DEFAULT_MAX_RESULTS,
            temperature: constants::DEFAULT_TEMPERATURE,
            rewrite_temperature: constants::REWRITE_TEMPERATURE,
            format: OutputFormat::default(),
            rewrite_query: false,
            enrich_images: false,
            query: QueryBuilder::default(),
        }
    }
}

impl Settings {
    /// Defaults with the endpoint overrides from the environment applied.
    pub fn from_env() -> Self {
        let provider = constants::DEFAULT_PROVIDER.parse::<Provider>().unwrap_or_else(|e| {
            warn!("{}; falling back to {}", e, Provider::default());
            Provider::default()
        });
        Self {
            provider,
            completion_base_url: constants::COMPLETION_BASE_URL.clone(),
            model: constants::COMPLETION_MODEL.clone(),
            search_base_url: constants::SEARCH_BASE_URL.clone(),
            ..Self::default()
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature.clamp(0.0, 2.0);
        self
    }

    fn completion_client(&self, api_key: &str) -> CompletionClient {
        let base_url = self
            .completion_base_url
            .as_deref()
            .unwrap_or(self.provider.base_url());
        let model = self.model.as_deref().unwrap_or(self.provider.model());
        CompletionClient::new(base_url, model, api_key)
    }
}

/// Progress notifications sent while a report is being produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReportEvent {
    RewritingQuery,
    Searching { query: String },
    EvidenceCollected { count: usize },
    Drafting { provider: String },
    EnrichingImages { dishes: usize },
    Completed,
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub query: String,
    pub evidence: Vec<Evidence>,
    pub format: OutputFormat,
    pub content: String,
}

pub struct ReportPipeline {
    settings: Settings,
    prompts: PromptRenderer,
}

impl ReportPipeline {
    pub fn new(settings: Settings) -> Result<Self> {
        let prompts = PromptRenderer::new()?.with_max_cards(settings.max_results);
        Ok(Self { settings, prompts })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Same pipeline, different completion vendor.
    pub fn with_provider(&self, provider: Provider) -> Result<Self> {
        let mut settings = self.settings.clone();
        settings.provider = provider;
        Self::new(settings)
    }

    /// Runs one interaction against `transcript`.
    ///
    /// Credentials are checked before anything else: when one is missing no
    /// request is sent and the transcript is left untouched. Otherwise the user
    /// turn is recorded, and the assistant turn only if every step succeeds.
    #[instrument(skip(self, transcript, credentials, progress), fields(session = %transcript.id()))]
    pub async fn run(
        &self,
        transcript: &mut Transcript,
        request: &str,
        credentials: &Credentials,
        progress: Option<&mpsc::Sender<ReportEvent>>,
    ) -> Result<Report> {
        let keys = credentials.require()?;
        transcript.push_user(request);

        match self.generate(request, &keys, progress).await {
            Ok(report) => {
                transcript.push_assistant(report.content.clone());
                notify(progress, ReportEvent::Completed).await;
                Ok(report)
            }
            Err(e) => {
                notify(
                    progress,
                    ReportEvent::Failed {
                        error: e.to_string(),
                    },
                )
                .await;
                Err(e)
            }
        }
    }

    async fn generate(
        &self,
        request: &str,
        keys: &ApiKeys,
        progress: Option<&mpsc::Sender<ReportEvent>>,
    ) -> Result<Report> {
        let settings = &self.settings;
        let llm = settings.completion_client(&keys.llm);
        let search = SearchClient::new(&settings.search_base_url, &keys.search)
            .with_images(settings.format == OutputFormat::Html);

        let search_text = if settings.rewrite_query {
            notify(progress, ReportEvent::RewritingQuery).await;
            let instruction = self.prompts.rewrite_prompt(request)?;
            let rewritten = llm
                .complete(&instruction, request, settings.rewrite_temperature)
                .await?;
            let rewritten = rewritten.trim().trim_matches('"').trim();
            if rewritten.is_empty() {
                warn!("Rewrite pass returned nothing usable; searching with the request");
                request.to_string()
            } else {
                debug!(%rewritten, "Rewrote search request");
                rewritten.to_string()
            }
        } else {
            request.to_string()
        };

        let query = settings
            .query
            .build(&search_text, Some(Local::now().date_naive()));
        notify(
            progress,
            ReportEvent::Searching {
                query: query.clone(),
            },
        )
        .await;
        let evidence = search.search(&query, settings.max_results).await?;
        info!(count = evidence.len(), "Collected evidence");
        notify(
            progress,
            ReportEvent::EvidenceCollected {
                count: evidence.len(),
            },
        )
        .await;

        let system = self.prompts.system_prompt(settings.format)?;
        let user = self.prompts.user_message(request, &evidence)?;
        notify(
            progress,
            ReportEvent::Drafting {
                provider: settings.provider.to_string(),
            },
        )
        .await;
        let raw = llm.complete(&system, &user, settings.temperature).await?;
        let mut content = sanitize::sanitize(&raw);

        if settings.enrich_images && settings.format == OutputFormat::Html {
            content = self.enrich_images(&search, content, progress).await;
        }

        Ok(Report {
            query,
            evidence,
            format: settings.format,
            content,
        })
    }

    /// Fill in `<img data-dish>` markers, one image search per dish.
    /// A failed lookup leaves that marker without a `src`.
    async fn enrich_images(
        &self,
        search: &SearchClient,
        mut html: String,
        progress: Option<&mpsc::Sender<ReportEvent>>,
    ) -> String {
        let dishes = sanitize::dish_markers(&html);
        if dishes.is_empty() {
            return html;
        }
        notify(
            progress,
            ReportEvent::EnrichingImages {
                dishes: dishes.len(),
            },
        )
        .await;

        for dish in dishes {
            let query = format!("{} 菜品 实拍", dish);
            match search.first_image(&query).await {
                Ok(Some(url)) => html = sanitize::attach_dish_image(&html, &dish, &url),
                Ok(None) => debug!(%dish, "No image found"),
                Err(e) => warn!(%dish, "Image lookup failed: {}", e),
            }
        }
        html
    }
}

async fn notify(progress: Option<&mpsc::Sender<ReportEvent>>, event: ReportEvent) {
    if let Some(tx) = progress {
        // A dropped receiver just means nobody is watching.
        let _ = tx.send(event).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completion_client_uses_overrides() {
        let settings = Settings {
            completion_base_url: Some("http://localhost:9999/v1".to_string()),
            model: Some("local-model".to_string()),
            ..Settings::default()
        };
        let client = settings.completion_client("k");
        assert_eq!(client.model(), "local-model");

        let client = Settings::default().completion_client("k");
        assert_eq!(client.model(), "deepseek-chat");
    }

    #[test]
    fn test_temperature_clamped() {
        assert_eq!(Settings::default().with_temperature(5.0).temperature, 2.0);
        assert_eq!(Settings::default().with_temperature(0.3).temperature, 0.3);
    }

    #[test]
    fn test_event_serialization() {
        let json = serde_json::to_value(ReportEvent::EvidenceCollected { count: 5 }).unwrap();
        assert_eq!(json["type"], "evidence_collected");
        assert_eq!(json["count"], 5);
    }

    #[tokio::test]
    async fn test_missing_credentials_leave_transcript_untouched() {
        let pipeline = ReportPipeline::new(Settings::default()).unwrap();
        let mut transcript = Transcript::new();
        let (tx, mut rx) = mpsc::channel(8);

        let err = pipeline
            .run(&mut transcript, "火锅", &Credentials::default(), Some(&tx))
            .await
            .unwrap_err();

        assert!(err.is_user_error());
        assert!(transcript.is_empty());
        drop(tx);
        assert!(rx.recv().await.is_none());
    }
}
