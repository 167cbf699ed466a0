use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::{SourceError, get_json};

pub(super) const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// A page located by title search on one language edition.
#[derive(Debug, Clone, PartialEq)]
pub(super) struct PageHit {
    pub lang: String,
    pub title: String,
    pub url: String,
}

/// `action=opensearch` response: `[term, [titles], [descriptions], [urls]]`.
#[derive(Debug, Deserialize)]
struct OpenSearch(String, Vec<String>, Vec<String>, Vec<String>);

/// Client for one Wikimedia project (`wikipedia`, `wikivoyage`) across its
/// language editions.
#[derive(Clone)]
pub(super) struct MediaWiki {
    http: Client,
    project: &'static str,
    base_url: Option<String>,
}

impl MediaWiki {
    pub fn new(http: Client, project: &'static str) -> Self {
        Self {
            http,
            project,
            base_url: None,
        }
    }

    /// Route every language edition to `{base_url}/{lang}/w/api.php`.
    pub fn with_base_url(http: Client, project: &'static str, base_url: &str) -> Self {
        Self {
            http,
            project,
            base_url: Some(base_url.trim_end_matches('/').to_string()),
        }
    }

    pub fn http(&self) -> &Client {
        &self.http
    }

    pub fn api_url(&self, lang: &str) -> String {
        match &self.base_url {
            Some(base) => format!("{base}/{lang}/w/api.php"),
            None => format!("https://{lang}.{}.org/w/api.php", self.project),
        }
    }

    async fn opensearch(&self, lang: &str, term: &str) -> Result<Option<PageHit>, SourceError> {
        let request = self
            .http
            .get(self.api_url(lang))
            .query(&[
                ("action", "opensearch"),
                ("search", term),
                ("limit", "1"),
                ("namespace", "0"),
                ("redirects", "resolve"),
                ("format", "json"),
            ])
            .timeout(REQUEST_TIMEOUT);
        let OpenSearch(_, titles, _, urls) = get_json(request).await?;

        Ok(titles
            .into_iter()
            .zip(urls)
            .find(|(title, url)| !title.is_empty() && !url.is_empty())
            .map(|(title, url)| PageHit {
                lang: lang.to_string(),
                title,
                url,
            }))
    }

    /// Search each language in order and return the first page found.
    ///
    /// A failing language edition does not stop the walk; its error is only
    /// returned when no later language produced a hit.
    pub async fn first_hit(
        &self,
        langs: &[String],
        term: &str,
    ) -> Result<Option<PageHit>, SourceError> {
        let mut last_err = None;
        for lang in langs {
            match self.opensearch(lang, term).await {
                Ok(Some(hit)) => return Ok(Some(hit)),
                Ok(None) => debug!(project = self.project, lang, term, "no page"),
                Err(e) => {
                    debug!(project = self.project, lang, error = %e, "language edition failed");
                    last_err = Some(e);
                }
            }
        }
        match last_err {
            Some(e) => Err(e),
            None => Ok(None),
        }
    }
}
