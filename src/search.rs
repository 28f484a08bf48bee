use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument};

use crate::error::{ReportError, Result};

/// One search hit handed to the report prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub title: String,
    pub url: String,
    pub content: String,
    pub image_url: Option<String>,
}

// Structures matching the Tavily /search endpoint
#[derive(Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    max_results: usize,
    include_images: bool,
}

#[derive(Deserialize, Debug)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchHit>,
    #[serde(default)]
    images: Vec<SearchImage>,
}

#[derive(Deserialize, Debug)]
struct SearchHit {
    #[serde(default)]
    title: String,
    url: String,
    #[serde(default)]
    content: String,
}

// Tavily returns plain URLs, or objects when image descriptions are requested.
#[derive(Deserialize, Debug)]
#[serde(untagged)]
enum SearchImage {
    Url(String),
    Described { url: String },
}

impl SearchImage {
    fn into_url(self) -> String {
        match self {
            SearchImage::Url(url) | SearchImage::Described { url } => url,
        }
    }
}

/// Web search client.
pub struct SearchClient {
    client: Client,
    base_url: String,
    api_key: String,
    include_images: bool,
}

impl SearchClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            include_images: false,
        }
    }

    /// Attach image URLs to the returned evidence.
    pub fn with_images(mut self, include_images: bool) -> Self {
        self.include_images = include_images;
        self
    }

    #[instrument(skip(self), fields(base_url = %self.base_url))]
    pub async fn search(&self, query: &str, max_results: usize) -> Result<Vec<Evidence>> {
        let response = self.send(query, max_results, self.include_images).await?;

        let mut images = response.images.into_iter().map(SearchImage::into_url);
        let evidence: Vec<Evidence> = response
            .results
            .into_iter()
            .take(max_results)
            .map(|hit| Evidence {
                title: hit.title,
                url: hit.url,
                content: hit.content,
                image_url: images.next(),
            })
            .collect();

        debug!(count = evidence.len(), "Search returned evidence");
        Ok(evidence)
    }

    /// First image for `query`, if the search engine has one.
    #[instrument(skip(self))]
    pub async fn first_image(&self, query: &str) -> Result<Option<String>> {
        let response = self.send(query, 1, true).await?;
        Ok(response.images.into_iter().next().map(SearchImage::into_url))
    }

    async fn send(
        &self,
        query: &str,
        max_results: usize,
        include_images: bool,
    ) -> Result<SearchResponse> {
        let url = format!("{}/search", self.base_url);
        let payload = SearchRequest {
            query,
            max_results,
            include_images,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            error!(%status, %body, "Search API request failed");
            return Err(ReportError::Api {
                service: "Search",
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json::<SearchResponse>().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_images_accept_both_shapes() {
        let raw = r#"{
            "results": [{"title": "t", "url": "https://a", "content": "c"}],
            "images": ["https://img/1.jpg", {"url": "https://img/2.jpg", "description": "鱼"}]
        }"#;
        let parsed: SearchResponse = serde_json::from_str(raw).unwrap();
        let urls: Vec<String> = parsed.images.into_iter().map(SearchImage::into_url).collect();
        assert_eq!(urls, vec!["https://img/1.jpg", "https://img/2.jpg"]);
    }

    #[test]
    fn test_missing_fields_default() {
        let parsed: SearchResponse =
            serde_json::from_str(r#"{"results": [{"url": "https://a"}]}"#).unwrap();
        assert_eq!(parsed.results.len(), 1);
        assert_eq!(parsed.results[0].content, "");
        assert!(parsed.images.is_empty());
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = SearchClient::new("https://api.tavily.com/", "k");
        assert_eq!(client.base_url, "https://api.tavily.com");
    }
}
