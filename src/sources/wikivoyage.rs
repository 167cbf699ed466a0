use async_trait::async_trait;
use reqwest::Client;

use super::mediawiki::MediaWiki;
use super::{AdapterContext, Citation, SourceAdapter, SourceError, SourceType, search_term};
use crate::entity::Entity;

/// Travel guide page from the first Wikivoyage edition that has one.
#[derive(Clone)]
pub struct Wikivoyage {
    wiki: MediaWiki,
}

impl Wikivoyage {
    pub fn new(http: Client) -> Self {
        Self {
            wiki: MediaWiki::new(http, "wikivoyage"),
        }
    }

    pub fn with_base_url(http: Client, base_url: &str) -> Self {
        Self {
            wiki: MediaWiki::with_base_url(http, "wikivoyage", base_url),
        }
    }
}

#[async_trait]
impl SourceAdapter for Wikivoyage {
    fn name(&self) -> &'static str {
        "wikivoyage"
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
        let guide = Citation::new(hit.url, hit.title, SourceType::Wikivoyage);
        Ok(vec![guide.with_publisher("Wikivoyage")])
    }
}
