use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::mediawiki::{MediaWiki, REQUEST_TIMEOUT};
use super::{
    AdapterContext, Citation, SourceAdapter, SourceError, SourceType, get_json, search_term,
};
use crate::entity::Entity;

const MAX_SNIPPET_CHARS: usize = 240;

/// Encyclopedia article plus the first line of its lead section.
#[derive(Clone)]
pub struct Wikipedia {
    wiki: MediaWiki,
}

#[derive(Debug, Deserialize)]
struct ExtractResponse {
    query: Option<ExtractQuery>,
}

#[derive(Debug, Deserialize)]
struct ExtractQuery {
    #[serde(default)]
    pages: Vec<ExtractPage>,
}

#[derive(Debug, Deserialize)]
struct ExtractPage {
    extract: Option<String>,
}

impl Wikipedia {
    pub fn new(http: Client) -> Self {
        Self {
            wiki: MediaWiki::new(http, "wikipedia"),
        }
    }

    pub fn with_base_url(http: Client, base_url: &str) -> Self {
        Self {
            wiki: MediaWiki::with_base_url(http, "wikipedia", base_url),
        }
    }

    async fn lead_extract(&self, lang: &str, title: &str) -> Result<Option<String>, SourceError> {
        let request = self
            .wiki
            .http()
            .get(self.wiki.api_url(lang))
            .query(&[
                ("action", "query"),
                ("prop", "extracts"),
                ("exintro", "1"),
                ("explaintext", "1"),
                ("redirects", "1"),
                ("titles", title),
                ("format", "json"),
                ("formatversion", "2"),
            ])
            .timeout(REQUEST_TIMEOUT);
        let body: ExtractResponse = get_json(request).await?;

        Ok(body
            .query
            .and_then(|q| q.pages.into_iter().find_map(|p| p.extract))
            .and_then(|text| first_line_snippet(&text)))
    }
}

/// First non-blank line, capped at [`MAX_SNIPPET_CHARS`] characters.
fn first_line_snippet(text: &str) -> Option<String> {
    let line = text.lines().map(str::trim).find(|l| !l.is_empty())?;
    if line.chars().count() <= MAX_SNIPPET_CHARS {
        return Some(line.to_string());
    }
    let mut cut: String = line.chars().take(MAX_SNIPPET_CHARS - 1).collect();
    cut.truncate(cut.trim_end().len());
    cut.push('…');
    Some(cut)
}

#[async_trait]
impl SourceAdapter for Wikipedia {
    fn name(&self) -> &'static str {
        "wikipedia"
    }

    async fn try_fetch(
        &self,
        entity: &Entity,
        ctx: &AdapterContext,
    ) -> Result<Vec<Citation>, SourceError> {
        let Some(term) = search_term(entity) else {
            return Ok(Vec::new());
        };
        let Some(hit) = self.wiki.first_hit(&ctx.langs, term).await? else {
            return Ok(Vec::new());
        };

        // The article alone is still worth citing when the extract call fails.
        let snippet = match self.lead_extract(&hit.lang, &hit.title).await {
            Ok(snippet) => snippet,
            Err(e) => {
                debug!(title = %hit.title, error = %e, "lead extract unavailable");
                None
            }
        };

        let article = Citation::new(hit.url, hit.title, SourceType::Wikipedia)
            .with_publisher("Wikipedia")
            .with_snippet(snippet);
        Ok(vec![article])
    }
}
