//! General web search, used as a fallback when the knowledge sources come up short.

pub mod brave;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::entity::Entity;
use crate::sources::{Citation, SourceType, is_absolute_url, publisher_of};

pub use brave::BraveSearch;

/// Results requested from the provider; only the official ones are kept.
const SEARCH_COUNT: usize = 10;
const MAX_OFFICIAL_RESULTS: usize = 3;

/// How the provider classified a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultKind {
    Official,
    Other,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WebResult {
    pub url: String,
    pub title: Option<String>,
    pub kind: ResultKind,
}

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("BRAVE_SEARCH_API_KEY not set")]
    ApiKeyNotSet,

    #[error("search API rate limit exceeded")]
    RateLimited,

    #[error("search failed: status {0}")]
    Status(u16),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

#[async_trait]
pub trait WebSearch: Send + Sync {
    async fn search(&self, query: &str, count: usize) -> Result<Vec<WebResult>, SearchError>;
}

pub fn fallback_query(entity: &Entity) -> String {
    format!("{} official site tourism", entity.name)
}

/// Official-looking pages for `entity` from one web search. Never fails.
pub async fn official_citations(search: &dyn WebSearch, entity: &Entity) -> Vec<Citation> {
    if entity.is_placeholder() {
        debug!("no place to search for, skipping web search fallback");
        return Vec::new();
    }
    let query = fallback_query(entity);
    let results = match search.search(&query, SEARCH_COUNT).await {
        Ok(results) => results,
        Err(e) => {
            warn!(query = %query, error = %e, "web search fallback failed");
            return Vec::new();
        }
    };

    let citations: Vec<Citation> = results
        .into_iter()
        .filter(|r| r.kind == ResultKind::Official && is_absolute_url(&r.url))
        .take(MAX_OFFICIAL_RESULTS)
        .filter_map(|r| {
            let publisher = publisher_of(&r.url)?;
            let title = r
                .title
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| publisher.clone());
            let citation = Citation::new(r.url, title, SourceType::Official);
            Some(citation.with_publisher(publisher))
        })
        .collect();

    debug!(query = %query, found = citations.len(), "web search fallback complete");
    citations
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct MockSearch {
        response: Mutex<Option<Result<Vec<WebResult>, SearchError>>>,
        queries: Mutex<Vec<String>>,
    }

    impl MockSearch {
        fn new(response: Result<Vec<WebResult>, SearchError>) -> Self {
            Self {
                response: Mutex::new(Some(response)),
                queries: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl WebSearch for MockSearch {
        async fn search(&self, query: &str, _count: usize) -> Result<Vec<WebResult>, SearchError> {
            self.queries.lock().unwrap().push(query.to_string());
            let canned = self.response.lock().unwrap().take();
            canned.unwrap_or(Ok(Vec::new()))
        }
    }

    fn result(url: &str, kind: ResultKind) -> WebResult {
        WebResult {
            url: url.into(),
            title: Some(format!("Title of {url}")),
            kind,
        }
    }

    #[tokio::test]
    async fn keeps_at_most_three_official_results() {
        let search = MockSearch::new(Ok(vec![
            result("https://blog.example/kyoto", ResultKind::Other),
            result("https://kyoto.travel/en/", ResultKind::Official),
            result("https://www.city.kyoto.lg.jp/", ResultKind::Official),
            result("https://visit.kyoto.example/", ResultKind::Official),
            result("https://www.japan.travel/en/kyoto/", ResultKind::Official),
        ]));

        let citations = official_citations(&search, &Entity::named("Kyoto")).await;

        assert_eq!(citations.len(), 3);
        let kinds: Vec<_> = citations.iter().map(|c| c.source_type).collect();
        assert_eq!(kinds, [SourceType::Official; 3]);
        assert_eq!(citations[0].publisher.as_deref(), Some("kyoto.travel"));
        assert_eq!(citations[1].publisher.as_deref(), Some("city.kyoto.lg.jp"));
        assert_eq!(
            search.queries.lock().unwrap().as_slice(),
            ["Kyoto official site tourism"]
        );
    }

    #[tokio::test]
    async fn search_failure_contributes_nothing() {
        let search = MockSearch::new(Err(SearchError::RateLimited));
        let citations = official_citations(&search, &Entity::named("Kyoto")).await;
        assert!(citations.is_empty());
    }

    #[tokio::test]
    async fn placeholder_entity_is_not_searched() {
        let found = vec![result("https://unknown.example/", ResultKind::Official)];
        let search = MockSearch::new(Ok(found));

        let unknown = Entity::named(crate::entity::UNKNOWN_ENTITY);
        assert!(official_citations(&search, &unknown).await.is_empty());
        assert!(search.queries.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_title_falls_back_to_host() {
        let search = MockSearch::new(Ok(vec![WebResult {
            url: "https://www.visitlisboa.com/".into(),
            title: None,
            kind: ResultKind::Official,
        }]));

        let citations = official_citations(&search, &Entity::named("Lisbon")).await;
        assert_eq!(citations[0].title, "visitlisboa.com");
    }
}
