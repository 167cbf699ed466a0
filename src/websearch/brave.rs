use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::warn;

use super::{ResultKind, SearchError, WebResult, WebSearch};
use crate::config::{ApiKey, env_value};
use crate::rank::is_gov_host;

const API_URL: &str = "https://api.search.brave.com/res/v1/web/search";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
/// Brave rejects larger page sizes.
const MAX_COUNT: usize = 20;

/// Brave Search web API.
#[derive(Clone)]
pub struct BraveSearch {
    http: Client,
    api_key: ApiKey,
    api_url: String,
}

#[derive(Debug, Deserialize)]
struct BraveResponse {
    web: Option<BraveWeb>,
}

#[derive(Debug, Deserialize)]
struct BraveWeb {
    #[serde(default)]
    results: Vec<BraveResult>,
}

#[derive(Debug, Deserialize)]
struct BraveResult {
    url: String,
    title: Option<String>,
    description: Option<String>,
}

impl BraveSearch {
    pub fn from_env(http: Client) -> Result<Self, SearchError> {
        let key = env_value("BRAVE_SEARCH_API_KEY").ok_or(SearchError::ApiKeyNotSet)?;
        Ok(Self::with_base_url(http, &key, API_URL))
    }

    pub fn with_base_url(http: Client, api_key: &str, api_url: &str) -> Self {
        Self {
            http,
            api_key: ApiKey(api_key.to_string()),
            api_url: api_url.to_string(),
        }
    }
}

/// Official when the host is governmental or a tourism board, or the page
/// calls itself official.
fn classify(url: &str, title: Option<&str>, description: Option<&str>) -> ResultKind {
    let Ok(parsed) = url::Url::parse(url) else {
        return ResultKind::Other;
    };
    let Some(host) = parsed.host_str() else {
        return ResultKind::Other;
    };
    let host = host.trim_start_matches("www.").to_ascii_lowercase();

    let board_host = host.starts_with("visit") || host.starts_with("tourism");
    let says_official = [title, description]
        .into_iter()
        .flatten()
        .any(|text| text.to_lowercase().contains("official"));

    if is_gov_host(&host) || board_host || says_official {
        ResultKind::Official
    } else {
        ResultKind::Other
    }
}

#[async_trait]
impl WebSearch for BraveSearch {
    async fn search(&self, query: &str, count: usize) -> Result<Vec<WebResult>, SearchError> {
        let count = count.clamp(1, MAX_COUNT).to_string();
        let response = self
            .http
            .get(&self.api_url)
            .query(&[("q", query), ("count", count.as_str())])
            .header("X-Subscription-Token", &self.api_key.0)
            .header("Accept", "application/json")
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            warn!("Brave Search rate limited");
            return Err(SearchError::RateLimited);
        }
        if !status.is_success() {
            return Err(SearchError::Status(status.as_u16()));
        }

        let body: BraveResponse = response.json().await?;
        Ok(body
            .web
            .map(|w| w.results)
            .unwrap_or_default()
            .into_iter()
            .map(|r| WebResult {
                kind: classify(&r.url, r.title.as_deref(), r.description.as_deref()),
                url: r.url,
                title: r.title,
            })
            .collect())
    }
}
