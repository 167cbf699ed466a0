//! Entity resolution: turn a loose place query into a canonical [`Entity`].

pub mod geocode;
pub mod lang;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use geocode::Geocoder;

/// Name used when the caller supplies neither a name nor a slug.
pub const UNKNOWN_ENTITY: &str = "Unknown";

/// Caller-supplied place query. At least one of `slug`/`name` should be set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityInput {
    pub slug: Option<String>,
    pub name: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub country_code: Option<String>,
}

/// Canonical place a research run is about. Built once per run, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    pub name: String,
    pub country_code: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
}

impl Entity {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            country_code: None,
            lat: None,
            lon: None,
            aliases: Vec::new(),
        }
    }

    pub fn coordinates(&self) -> Option<(f64, f64)> {
        self.lat.zip(self.lon)
    }

    pub fn is_placeholder(&self) -> bool {
        self.name == UNKNOWN_ENTITY
    }
}

/// `"new-york_city"` → `"New York City"`.
pub fn humanize_slug(slug: &str) -> String {
    slug.split(['-', '_', ' '])
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn valid_coordinates(lat: Option<f64>, lon: Option<f64>) -> Option<(f64, f64)> {
    let (lat, lon) = lat.zip(lon)?;
    let in_range = lat.is_finite() && lon.is_finite() && lat.abs() <= 90.0 && lon.abs() <= 180.0;
    in_range.then_some((lat, lon))
}

fn normalize_country(code: Option<&str>) -> Option<String> {
    non_blank(code)
        .filter(|cc| cc.len() == 2 && cc.chars().all(|c| c.is_ascii_alphabetic()))
        .map(str::to_ascii_uppercase)
}

/// Resolves [`EntityInput`] into an [`Entity`], geocoding when coordinates are missing.
///
/// Never fails: a missing name becomes [`UNKNOWN_ENTITY`], a failed lookup
/// leaves the coordinates unset.
#[derive(Clone, Default)]
pub struct EntityResolver {
    geocoder: Option<Arc<dyn Geocoder>>,
}

impl EntityResolver {
    pub fn new(geocoder: Option<Arc<dyn Geocoder>>) -> Self {
        Self { geocoder }
    }

    pub async fn resolve(&self, input: &EntityInput) -> Entity {
        let slug_name = non_blank(input.slug.as_deref())
            .map(humanize_slug)
            .filter(|n| !n.is_empty());
        let given_name = non_blank(input.name.as_deref()).map(str::to_string);

        let (name, aliases) = match (given_name, slug_name) {
            (Some(name), Some(alias)) if !alias.eq_ignore_ascii_case(&name) => (name, vec![alias]),
            (Some(name), _) => (name, Vec::new()),
            (None, Some(name)) => (name, Vec::new()),
            (None, None) => (UNKNOWN_ENTITY.to_string(), Vec::new()),
        };

        let mut entity = Entity {
            name,
            country_code: normalize_country(input.country_code.as_deref()),
            lat: None,
            lon: None,
            aliases,
        };

        if let Some((lat, lon)) = valid_coordinates(input.lat, input.lon) {
            entity.lat = Some(lat);
            entity.lon = Some(lon);
        } else if !entity.is_placeholder()
            && let Some((lat, lon)) = self.geocode(&entity).await
        {
            entity.lat = Some(lat);
            entity.lon = Some(lon);
        }

        debug!(
            name = %entity.name,
            country = entity.country_code.as_deref().unwrap_or("-"),
            has_coordinates = entity.coordinates().is_some(),
            "entity resolved"
        );
        entity
    }

    async fn geocode(&self, entity: &Entity) -> Option<(f64, f64)> {
        let geocoder = self.geocoder.as_ref()?;
        let country = entity.country_code.as_deref().map(str::to_ascii_lowercase);
        match geocoder.geocode(&entity.name, country.as_deref()).await {
            Ok(Some(c)) => valid_coordinates(Some(c.lat), Some(c.lon)),
            Ok(None) => None,
            Err(e) => {
                warn!(
                    name = %entity.name,
                    error = %e,
                    "geocoding failed, continuing without coordinates"
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use geocode::{Coordinates, GeocodeError};
    use std::sync::Mutex;

    struct MockGeocoder {
        result: Mutex<Option<Result<Option<Coordinates>, GeocodeError>>>,
        calls: Mutex<Vec<(String, Option<String>)>>,
    }

    impl MockGeocoder {
        fn returning(result: Result<Option<Coordinates>, GeocodeError>) -> Arc<Self> {
            Arc::new(Self {
                result: Mutex::new(Some(result)),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<(String, Option<String>)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Geocoder for MockGeocoder {
        async fn geocode(
            &self,
            name: &str,
            country_code: Option<&str>,
        ) -> Result<Option<Coordinates>, GeocodeError> {
            self.calls
                .lock()
                .unwrap()
                .push((name.to_string(), country_code.map(str::to_string)));
            self.result.lock().unwrap().take().unwrap_or(Ok(None))
        }
    }

    fn input(name: Option<&str>, slug: Option<&str>) -> EntityInput {
        EntityInput {
            name: name.map(Into::into),
            slug: slug.map(Into::into),
            ..Default::default()
        }
    }

    #[test]
    fn humanizes_slugs() {
        assert_eq!(humanize_slug("new-york_city"), "New York City");
        assert_eq!(humanize_slug("kyoto"), "Kyoto");
        assert_eq!(humanize_slug("--a__b--"), "A B");
        assert_eq!(humanize_slug(""), "");
    }

    #[tokio::test]
    async fn missing_name_and_slug_resolves_to_unknown() {
        let geocoder = MockGeocoder::returning(Ok(None));
        let resolver = EntityResolver::new(Some(geocoder.clone()));

        let entity = resolver.resolve(&EntityInput::default()).await;

        assert_eq!(entity.name, "Unknown");
        assert!(entity.is_placeholder());
        assert!(geocoder.calls().is_empty(), "placeholder is not geocoded");
    }

    #[tokio::test]
    async fn name_is_taken_from_slug_when_absent() {
        let resolver = EntityResolver::default();
        let slug_only = input(None, Some("mont-saint_michel"));
        let entity = resolver.resolve(&slug_only).await;
        assert_eq!(entity.name, "Mont Saint Michel");
        assert!(entity.aliases.is_empty());
    }

    #[tokio::test]
    async fn differing_slug_becomes_alias() {
        let resolver = EntityResolver::default();
        let entity = resolver.resolve(&input(Some("Kyōto"), Some("kyoto"))).await;
        assert_eq!(entity.name, "Kyōto");
        assert_eq!(entity.aliases, ["Kyoto"]);
    }

    #[tokio::test]
    async fn supplied_coordinates_skip_geocoding() {
        let geocoder = MockGeocoder::returning(Ok(None));
        let resolver = EntityResolver::new(Some(geocoder.clone()));
        let entity = resolver
            .resolve(&EntityInput {
                name: Some("Kyoto".into()),
                lat: Some(35.0),
                lon: Some(135.7),
                ..Default::default()
            })
            .await;

        assert_eq!(entity.coordinates(), Some((35.0, 135.7)));
        assert!(geocoder.calls().is_empty());
    }

    #[tokio::test]
    async fn missing_coordinates_are_geocoded_with_country() {
        let geocoder = MockGeocoder::returning(Ok(Some(Coordinates {
            lat: 35.01,
            lon: 135.76,
        })));
        let resolver = EntityResolver::new(Some(geocoder.clone()));
        let entity = resolver
            .resolve(&EntityInput {
                name: Some("Kyoto".into()),
                country_code: Some("jp".into()),
                ..Default::default()
            })
            .await;

        assert_eq!(entity.coordinates(), Some((35.01, 135.76)));
        assert_eq!(entity.country_code.as_deref(), Some("JP"));
        let expected = ("Kyoto".to_string(), Some("jp".to_string()));
        assert_eq!(geocoder.calls(), [expected]);
    }

    #[tokio::test]
    async fn geocoding_failure_leaves_coordinates_unset() {
        let geocoder = MockGeocoder::returning(Err(GeocodeError::Status(500)));
        let resolver = EntityResolver::new(Some(geocoder.clone()));
        let entity = resolver.resolve(&input(Some("Kyoto"), None)).await;

        assert_eq!(entity.name, "Kyoto");
        assert_eq!(entity.coordinates(), None);
        assert_eq!(geocoder.calls().len(), 1, "exactly one attempt, no retries");
    }

    #[tokio::test]
    async fn half_supplied_coordinates_trigger_geocoding() {
        let geocoder = MockGeocoder::returning(Ok(Some(Coordinates { lat: 1.0, lon: 2.0 })));
        let resolver = EntityResolver::new(Some(geocoder.clone()));
        let entity = resolver
            .resolve(&EntityInput {
                name: Some("Somewhere".into()),
                lat: Some(10.0),
                ..Default::default()
            })
            .await;

        assert_eq!(entity.coordinates(), Some((1.0, 2.0)));
    }

    #[test]
    fn invalid_country_codes_are_dropped() {
        assert_eq!(normalize_country(Some("Japan")), None);
        assert_eq!(normalize_country(Some(" fr ")).as_deref(), Some("FR"));
    }
}
