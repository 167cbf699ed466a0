use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::mediawiki::REQUEST_TIMEOUT;
use super::{
    AdapterContext, Citation, SourceAdapter, SourceError, SourceType, get_json, publisher_of,
    search_term,
};
use crate::entity::Entity;

const API_URL: &str = "https://www.wikidata.org/w/api.php";
const OFFICIAL_WEBSITE: &str = "P856";

/// Official website (property P856) of the best-matching Wikidata item.
#[derive(Clone)]
pub struct Wikidata {
    http: Client,
    api_url: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    search: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    id: String,
    label: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EntitiesResponse {
    #[serde(default)]
    entities: HashMap<String, ItemData>,
}

#[derive(Debug, Deserialize)]
struct ItemData {
    #[serde(default)]
    claims: HashMap<String, Vec<Statement>>,
}

#[derive(Debug, Deserialize)]
struct Statement {
    mainsnak: Snak,
    #[serde(default)]
    rank: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Snak {
    datavalue: Option<DataValue>,
}

#[derive(Debug, Deserialize)]
struct DataValue {
    value: serde_json::Value,
}

impl Wikidata {
    pub fn new(http: Client) -> Self {
        Self::with_base_url(http, API_URL)
    }

    pub fn with_base_url(http: Client, api_url: &str) -> Self {
        Self {
            http,
            api_url: api_url.to_string(),
        }
    }

    async fn best_match(&self, name: &str) -> Result<Option<SearchHit>, SourceError> {
        let request = self
            .http
            .get(&self.api_url)
            .query(&[
                ("action", "wbsearchentities"),
                ("search", name),
                ("language", "en"),
                ("uselang", "en"),
                ("type", "item"),
                ("limit", "1"),
                ("format", "json"),
            ])
            .timeout(REQUEST_TIMEOUT);
        let body: SearchResponse = get_json(request).await?;
        Ok(body.search.into_iter().next())
    }

    async fn official_website(&self, id: &str) -> Result<Option<String>, SourceError> {
        let request = self
            .http
            .get(&self.api_url)
            .query(&[
                ("action", "wbgetentities"),
                ("ids", id),
                ("props", "claims"),
                ("format", "json"),
            ])
            .timeout(REQUEST_TIMEOUT);
        let mut body: EntitiesResponse = get_json(request).await?;
        let item = body
            .entities
            .remove(id)
            .ok_or_else(|| SourceError::Malformed(format!("item {id} missing from response")))?;
        let statements = item.claims.get(OFFICIAL_WEBSITE).map(Vec::as_slice);
        Ok(pick_website(statements.unwrap_or_default()))
    }
}

/// Preferred-rank statement first, then the first non-deprecated one.
fn pick_website(statements: &[Statement]) -> Option<String> {
    let usable = |s: &&Statement| s.rank.as_deref() != Some("deprecated");
    let value_of = |s: &Statement| {
        s.mainsnak
            .datavalue
            .as_ref()
            .and_then(|d| d.value.as_str())
            .map(str::to_string)
    };

    statements
        .iter()
        .filter(usable)
        .find(|s| s.rank.as_deref() == Some("preferred"))
        .and_then(value_of)
        .or_else(|| statements.iter().filter(usable).find_map(value_of))
}

#[async_trait]
impl SourceAdapter for Wikidata {
    fn name(&self) -> &'static str {
        "wikidata"
    }

    async fn try_fetch(
        &self,
        entity: &Entity,
        _ctx: &AdapterContext,
    ) -> Result<Vec<Citation>, SourceError> {
        let Some(term) = search_term(entity) else {
            return Ok(Vec::new());
        };
        let Some(hit) = self.best_match(term).await? else {
            return Ok(Vec::new());
        };
        let Some(website) = self.official_website(&hit.id).await? else {
            return Ok(Vec::new());
        };
        let Some(publisher) = publisher_of(&website) else {
            let reason = format!("official website is not a URL: {website}");
            return Err(SourceError::Malformed(reason));
        };

        let label = hit.label.unwrap_or_else(|| entity.name.clone());
        let title = format!("{label} official website");
        let site = Citation::new(website, title, SourceType::Official)
            .with_publisher(publisher);
        Ok(vec![site])
    }
}
