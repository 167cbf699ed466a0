//! Evidence providers. Each adapter queries one knowledge source and turns
//! what it finds into [`Citation`]s.

mod mediawiki;
pub mod opentripmap;
pub mod wikidata;
pub mod wikipedia;
pub mod wikivoyage;

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::join_all;
use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::entity::Entity;
use crate::entity::lang::{language_chain, normalize_lang};

pub use opentripmap::OpenTripMap;
pub use wikidata::Wikidata;
pub use wikipedia::Wikipedia;
pub use wikivoyage::Wikivoyage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Wikivoyage,
    Wikipedia,
    Official,
    Gov,
    Wikidata,
    Poi,
}

impl SourceType {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceType::Wikivoyage => "wikivoyage",
            SourceType::Wikipedia => "wikipedia",
            SourceType::Official => "official",
            SourceType::Gov => "gov",
            SourceType::Wikidata => "wikidata",
            SourceType::Poi => "poi",
        }
    }
}

/// One piece of retrieved evidence.
///
/// `url` is always absolute. `score` is set by the ranker only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Citation {
    pub url: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    #[serde(rename = "type")]
    pub source_type: SourceType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<u32>,
}

impl Citation {
    pub fn new(url: impl Into<String>, title: impl Into<String>, source_type: SourceType) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            publisher: None,
            source_type,
            snippet: None,
            published_at: None,
            score: None,
        }
    }

    pub fn with_publisher(mut self, publisher: impl Into<String>) -> Self {
        self.publisher = Some(publisher.into());
        self
    }

    pub fn with_snippet(mut self, snippet: Option<String>) -> Self {
        self.snippet = snippet.filter(|s| !s.trim().is_empty());
        self
    }
}

/// Per-run parameters shared by every adapter.
#[derive(Debug, Clone)]
pub struct AdapterContext {
    pub limit: usize,
    pub lang: Option<String>,
    /// Ordered language fallback list, always ending in `"en"`.
    pub langs: Vec<String>,
    pub cancel: Option<CancellationToken>,
}

impl AdapterContext {
    pub fn new(limit: usize, lang: Option<&str>, country_code: Option<&str>) -> Self {
        Self {
            limit,
            lang: lang.and_then(normalize_lang),
            langs: language_chain(lang, country_code),
            cancel: None,
        }
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("request failed: status {0}")]
    Status(u16),

    #[error("unexpected response: {0}")]
    Malformed(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

/// A knowledge source that can produce citations for an entity.
///
/// Implementors provide [`try_fetch`](SourceAdapter::try_fetch); callers use
/// [`fetch`](SourceAdapter::fetch), which never fails.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn name(&self) -> &'static str;

    async fn try_fetch(
        &self,
        entity: &Entity,
        ctx: &AdapterContext,
    ) -> Result<Vec<Citation>, SourceError>;

    async fn fetch(&self, entity: &Entity, ctx: &AdapterContext) -> Vec<Citation> {
        match self.try_fetch(entity, ctx).await {
            Ok(citations) => citations
                .into_iter()
                .filter(|c| is_absolute_url(&c.url))
                .map(|c| Citation { score: None, ..c })
                .collect(),
            Err(e) => {
                warn!(
                    adapter = self.name(),
                    entity = %entity.name,
                    error = %e,
                    "source failed, contributing nothing"
                );
                Vec::new()
            }
        }
    }
}

/// Run every adapter concurrently and wait for all of them.
///
/// A panicking or cancelled adapter contributes nothing; the others are unaffected.
pub async fn fetch_all(
    adapters: &[Arc<dyn SourceAdapter>],
    entity: &Entity,
    ctx: &AdapterContext,
) -> Vec<Citation> {
    let runs = adapters.iter().map(|adapter| async move {
        let guarded = AssertUnwindSafe(adapter.fetch(entity, ctx)).catch_unwind();
        let outcome = match &ctx.cancel {
            Some(token) => tokio::select! {
                result = guarded => Some(result),
                _ = token.cancelled() => None,
            },
            None => Some(guarded.await),
        };

        match outcome {
            Some(Ok(citations)) => {
                debug!(
                    adapter = adapter.name(),
                    count = citations.len(),
                    "source returned"
                );
                citations
            }
            Some(Err(_)) => {
                warn!(
                    adapter = adapter.name(),
                    "source panicked, contributing nothing"
                );
                Vec::new()
            }
            None => {
                debug!(adapter = adapter.name(), "source cancelled");
                Vec::new()
            }
        }
    });

    join_all(runs).await.into_iter().flatten().collect()
}

pub(crate) fn is_absolute_url(raw: &str) -> bool {
    url::Url::parse(raw)
        .is_ok_and(|u| matches!(u.scheme(), "http" | "https") && u.host().is_some())
}

/// Name to look up in knowledge bases. `None` for the placeholder entity,
/// whose name would only match pages about the word itself.
pub(crate) fn search_term(entity: &Entity) -> Option<&str> {
    (!entity.is_placeholder()).then_some(entity.name.as_str())
}

/// Host of `raw` without a leading `www.`.
pub(crate) fn publisher_of(raw: &str) -> Option<String> {
    let parsed = url::Url::parse(raw).ok()?;
    let host = parsed.host_str()?;
    Some(host.strip_prefix("www.").unwrap_or(host).to_string())
}

/// Send `request` and decode a JSON body, mapping non-2xx to [`SourceError::Status`].
pub(crate) async fn get_json<T: DeserializeOwned>(
    request: RequestBuilder,
) -> Result<T, SourceError> {
    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(SourceError::Status(status.as_u16()));
    }
    Ok(response.json().await?)
}
