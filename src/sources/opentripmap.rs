use async_trait::async_trait;
use futures::future::join_all;
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};

use super::mediawiki::REQUEST_TIMEOUT;
use super::{
    AdapterContext, Citation, SourceAdapter, SourceError, SourceType, get_json, is_absolute_url,
    publisher_of,
};
use crate::config::{ApiKey, env_value};
use crate::entity::Entity;

const API_BASE: &str = "https://api.opentripmap.com/0.1";
const SEARCH_RADIUS_M: u32 = 5_000;
const MIN_RATE: &str = "3";
const CANDIDATE_POOL: usize = 20;
const TOP_CANDIDATES: usize = 3;

/// Points of interest around the entity's coordinates.
///
/// Needs `OPENTRIPMAP_API_KEY`; without it the adapter contributes nothing.
#[derive(Clone)]
pub struct OpenTripMap {
    http: Client,
    api_key: Option<ApiKey>,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    xid: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    rate: f64,
}

#[derive(Debug, Deserialize)]
struct PlaceDetail {
    #[serde(default)]
    name: String,
    url: Option<String>,
    wikipedia: Option<String>,
    otm: Option<String>,
    wikipedia_extracts: Option<Extract>,
    info: Option<Info>,
}

#[derive(Debug, Deserialize)]
struct Extract {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Info {
    descr: Option<String>,
}

impl OpenTripMap {
    pub fn from_env(http: Client) -> Self {
        let api_key = env_value("OPENTRIPMAP_API_KEY").map(ApiKey);
        if api_key.is_none() {
            info!("OPENTRIPMAP_API_KEY not set, points of interest disabled");
        }
        Self {
            http,
            api_key,
            base_url: API_BASE.to_string(),
        }
    }

    pub fn with_base_url(http: Client, api_key: Option<&str>, base_url: &str) -> Self {
        Self {
            http,
            api_key: api_key.map(|k| ApiKey(k.to_string())),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn candidates(
        &self,
        key: &ApiKey,
        lang: &str,
        (lat, lon): (f64, f64),
    ) -> Result<Vec<Candidate>, SourceError> {
        let request = self
            .http
            .get(format!("{}/{lang}/places/radius", self.base_url))
            .query(&[
                ("radius", SEARCH_RADIUS_M.to_string()),
                ("lat", lat.to_string()),
                ("lon", lon.to_string()),
                ("rate", MIN_RATE.to_string()),
                ("format", "json".to_string()),
                ("limit", CANDIDATE_POOL.to_string()),
                ("apikey", key.0.clone()),
            ])
            .timeout(REQUEST_TIMEOUT);
        let mut found: Vec<Candidate> = get_json(request).await?;

        found.retain(|c| !c.xid.is_empty() && !c.name.trim().is_empty());
        found.sort_by(|a, b| b.rate.total_cmp(&a.rate));
        found.truncate(TOP_CANDIDATES);
        Ok(found)
    }

    async fn detail(
        &self,
        key: &ApiKey,
        lang: &str,
        xid: &str,
    ) -> Result<PlaceDetail, SourceError> {
        let xid = utf8_percent_encode(xid, NON_ALPHANUMERIC);
        let request = self
            .http
            .get(format!("{}/{lang}/places/xid/{xid}", self.base_url))
            .query(&[("apikey", key.0.as_str())])
            .timeout(REQUEST_TIMEOUT);
        get_json(request).await
    }
}

/// OpenTripMap serves `en` and `ru` only.
fn otm_lang(ctx: &AdapterContext) -> &'static str {
    match ctx.langs.first().map(String::as_str) {
        Some("ru") => "ru",
        _ => "en",
    }
}

fn place_citations(fallback_name: &str, detail: PlaceDetail) -> Vec<Citation> {
    let name = if detail.name.trim().is_empty() {
        fallback_name.to_string()
    } else {
        detail.name.trim().to_string()
    };
    let mut out = Vec::new();

    if let Some(url) = detail.url.filter(|u| is_absolute_url(u))
        && let Some(publisher) = publisher_of(&url)
    {
        let site = Citation::new(url, format!("{name} official site"), SourceType::Official);
        out.push(site.with_publisher(publisher));
    }
    if let Some(url) = detail.wikipedia.filter(|u| is_absolute_url(u)) {
        let extract = detail.wikipedia_extracts.and_then(|e| e.text);
        let article = Citation::new(url, name.clone(), SourceType::Wikipedia)
            .with_publisher("Wikipedia")
            .with_snippet(extract);
        out.push(article);
    }
    if let Some(url) = detail.otm.filter(|u| is_absolute_url(u)) {
        let descr = detail.info.and_then(|i| i.descr);
        let poi = Citation::new(url, name, SourceType::Poi)
            .with_publisher("OpenTripMap")
            .with_snippet(descr);
        out.push(poi);
    }
    out
}

#[async_trait]
impl SourceAdapter for OpenTripMap {
    fn name(&self) -> &'static str {
        "opentripmap"
    }

    async fn try_fetch(
        &self,
        entity: &Entity,
        ctx: &AdapterContext,
    ) -> Result<Vec<Citation>, SourceError> {
        let Some(key) = self.api_key.as_ref() else {
            return Ok(Vec::new());
        };
        let Some(coords) = entity.coordinates() else {
            debug!(entity = %entity.name, "no coordinates, skipping points of interest");
            return Ok(Vec::new());
        };
        let lang = otm_lang(ctx);

        let candidates = self.candidates(key, lang, coords).await?;
        let lookups = candidates.iter().map(|c| self.detail(key, lang, &c.xid));
        let details = join_all(lookups).await;

        let mut citations = Vec::new();
        for (candidate, detail) in candidates.iter().zip(details) {
            match detail {
                Ok(detail) => citations.extend(place_citations(&candidate.name, detail)),
                Err(e) => {
                    debug!(xid = %candidate.xid, error = %e, "skipping place without detail")
                }
            }
        }
        Ok(citations)
    }
}
