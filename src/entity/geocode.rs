use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::config::env_value;

const NOMINATIM_BASE: &str = "https://nominatim.openstreetmap.org";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, thiserror::Error)]
pub enum GeocodeError {
    #[error("geocoding failed: status {0}")]
    Status(u16),

    #[error("geocoding returned invalid coordinates: {0}")]
    InvalidCoordinates(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

/// Forward geocoding: place name to coordinates.
#[async_trait]
pub trait Geocoder: Send + Sync {
    /// `Ok(None)` means the lookup worked but found nothing.
    async fn geocode(
        &self,
        name: &str,
        country_code: Option<&str>,
    ) -> Result<Option<Coordinates>, GeocodeError>;
}

/// OpenStreetMap Nominatim search API.
///
/// `WANDERLORE_NOMINATIM_URL` overrides the public instance.
#[derive(Clone)]
pub struct NominatimGeocoder {
    http: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct Place {
    lat: String,
    lon: String,
}

impl NominatimGeocoder {
    pub fn from_env(http: Client) -> Self {
        let base_url = env_value("WANDERLORE_NOMINATIM_URL")
            .unwrap_or_else(|| NOMINATIM_BASE.to_string());
        Self::with_base_url(http, &base_url)
    }

    pub fn with_base_url(http: Client, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn geocode(
        &self,
        name: &str,
        country_code: Option<&str>,
    ) -> Result<Option<Coordinates>, GeocodeError> {
        let mut query = vec![("q", name), ("format", "json"), ("limit", "1")];
        if let Some(cc) = country_code {
            query.push(("countrycodes", cc));
        }

        let response = self
            .http
            .get(format!("{}/search", self.base_url))
            .query(&query)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(GeocodeError::Status(status.as_u16()));
        }

        let places: Vec<Place> = response.json().await?;
        let Some(place) = places.into_iter().next() else {
            debug!(name, "geocoder found no match");
            return Ok(None);
        };

        let parse = |raw: &str| {
            raw.trim()
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| GeocodeError::InvalidCoordinates(raw.to_string()))
        };
        Ok(Some(Coordinates {
            lat: parse(&place.lat)?,
            lon: parse(&place.lon)?,
        }))
    }
}
