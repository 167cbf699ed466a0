//! The research pipeline and its cached entry point.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::{Computed, MemoryCache, ResultCache, cache_key};
use crate::config::{ResearchConfig, TrustWeights};
use crate::entity::geocode::NominatimGeocoder;
use crate::entity::{EntityInput, EntityResolver};
use crate::gemini::GeminiClient;
use crate::rank::rank;
use crate::sources::{
    AdapterContext, Citation, OpenTripMap, SourceAdapter, Wikidata, Wikipedia, Wikivoyage,
    fetch_all,
};
use crate::summarize::{ChatModel, Summarizer, Summary};
use crate::websearch::{BraveSearch, WebSearch, official_citations};

/// TCP connection establishment timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Global HTTP client timeout covering DNS + connect + response body.
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
/// Maximum redirect hops before aborting.
const MAX_REDIRECTS: usize = 5;
const UNKNOWN_LOCATION: &str = "unknown";

/// One call to [`Researcher::research_for_location`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResearchRequest {
    #[serde(flatten)]
    pub input: EntityInput,
    /// Cache identity of the location; defaults to the slug, then the name.
    pub location_slug: Option<String>,
    pub query: Option<String>,
    pub limit: Option<usize>,
    pub lang: Option<String>,
    #[serde(skip)]
    pub cancel: Option<CancellationToken>,
}

impl ResearchRequest {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            input: EntityInput {
                name: Some(name.into()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }

    fn location(&self) -> String {
        [&self.location_slug, &self.input.slug, &self.input.name]
            .into_iter()
            .flatten()
            .map(|s| s.trim())
            .find(|s| !s.is_empty())
            .unwrap_or(UNKNOWN_LOCATION)
            .to_string()
    }
}

/// What a research run produces and the cache stores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchResult {
    pub summary: String,
    /// At most two entries.
    pub facts: Vec<String>,
    /// Sorted by descending score, at most the requested limit.
    pub citations: Vec<Citation>,
}

/// resolve → fan-out → rank → fallback → re-rank → summarize, uncached.
#[derive(Clone)]
pub struct Pipeline {
    resolver: EntityResolver,
    adapters: Vec<Arc<dyn SourceAdapter>>,
    web_search: Option<Arc<dyn WebSearch>>,
    summarizer: Summarizer,
    trust: TrustWeights,
}

impl Pipeline {
    pub fn new(
        resolver: EntityResolver,
        adapters: Vec<Arc<dyn SourceAdapter>>,
        web_search: Option<Arc<dyn WebSearch>>,
        summarizer: Summarizer,
        trust: TrustWeights,
    ) -> Self {
        Self {
            resolver,
            adapters,
            web_search,
            summarizer,
            trust,
        }
    }

    /// Build the production pipeline, reading credentials from the environment.
    pub fn from_env(http: &Client, trust: TrustWeights) -> Self {
        let adapters: Vec<Arc<dyn SourceAdapter>> = vec![
            Arc::new(Wikivoyage::new(http.clone())),
            Arc::new(Wikipedia::new(http.clone())),
            Arc::new(Wikidata::new(http.clone())),
            Arc::new(OpenTripMap::from_env(http.clone())),
        ];
        let web_search = BraveSearch::from_env(http.clone())
            .inspect_err(|e| warn!("web search fallback not available: {e}"))
            .ok()
            .map(|s| Arc::new(s) as Arc<dyn WebSearch>);
        let model = GeminiClient::from_env(http.clone())
            .inspect_err(|e| warn!("Gemini client not available: {e}"))
            .ok()
            .map(|m| Arc::new(m) as Arc<dyn ChatModel>);
        let geocoder = Arc::new(NominatimGeocoder::from_env(http.clone()));

        Self::new(
            EntityResolver::new(Some(geocoder)),
            adapters,
            web_search,
            Summarizer::new(model),
            trust,
        )
    }

    pub async fn run(&self, request: &ResearchRequest, limit: usize) -> ResearchResult {
        let entity = self.resolver.resolve(&request.input).await;
        let mut ctx = AdapterContext::new(
            limit,
            request.lang.as_deref(),
            entity.country_code.as_deref(),
        );
        if let Some(token) = &request.cancel {
            ctx = ctx.with_cancel(token.clone());
        }

        let gathered = fetch_all(&self.adapters, &entity, &ctx).await;
        let mut citations = rank(gathered, limit, &self.trust);

        if citations.len() < limit
            && !request.is_cancelled()
            && let Some(search) = &self.web_search
        {
            let extra = official_citations(search.as_ref(), &entity).await;
            if !extra.is_empty() {
                citations.extend(extra);
                citations = rank(citations, limit, &self.trust);
            }
        }

        let summary = if request.is_cancelled() {
            debug!(entity = %entity.name, "cancelled, skipping summary");
            Summary::key_info(&entity)
        } else {
            self.summarizer.summarize(&citations, &entity).await
        };
        info!(
            entity = %entity.name,
            citations = citations.len(),
            facts = summary.facts.len(),
            "research complete"
        );
        ResearchResult {
            summary: summary.summary,
            facts: summary.facts,
            citations,
        }
    }
}

/// Cached front door to the [`Pipeline`].
pub struct Researcher<C = MemoryCache<ResearchResult>> {
    pipeline: Pipeline,
    cache: C,
    config: ResearchConfig,
}

impl Researcher {
    pub fn new(pipeline: Pipeline, config: ResearchConfig) -> Self {
        Self {
            pipeline,
            cache: MemoryCache::with_capacity(config.cache_capacity),
            config,
        }
    }

    /// Configuration via environment variables:
    /// - `OPENTRIPMAP_API_KEY`: enables points of interest (optional)
    /// - `BRAVE_SEARCH_API_KEY`: enables the web search fallback (optional)
    /// - `GEMINI_API_KEY` / `GEMINI_MODEL`: enables generated summaries (optional)
    /// - `WANDERLORE_CACHE_TTL_SECS`, `WANDERLORE_NOMINATIM_URL`
    pub fn from_env() -> Result<Self, reqwest::Error> {
        let http = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(HTTP_TIMEOUT)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .user_agent(crate::USER_AGENT)
            .build()?;
        let config = ResearchConfig::from_env();
        let pipeline = Pipeline::from_env(&http, config.trust);
        Ok(Self::new(pipeline, config))
    }
}

impl<C: ResultCache<ResearchResult>> Researcher<C> {
    pub fn with_cache<D: ResultCache<ResearchResult>>(self, cache: D) -> Researcher<D> {
        Researcher {
            pipeline: self.pipeline,
            cache,
            config: self.config,
        }
    }

    /// Research a location. Always returns a result; on total failure it has
    /// no citations and a templated summary. Results of cancelled runs are
    /// returned to their caller but never cached.
    pub async fn research_for_location(&self, request: ResearchRequest) -> ResearchResult {
        let limit = request.limit.unwrap_or(self.config.default_limit).max(1);
        let location = request.location();
        let key = cache_key(
            &location,
            limit,
            request.query.as_deref().unwrap_or_default(),
            request.lang.as_deref().unwrap_or_default(),
        );

        info!(location = %location, limit, "research requested");
        let ttl = self.config.cache_ttl;
        self.cache
            .get_or_compute(&key, ttl, || async {
                let result = self.pipeline.run(&request, limit).await;
                if request.is_cancelled() {
                    Computed::Skip(result)
                } else {
                    Computed::Store(result)
                }
            })
            .await
    }
}
