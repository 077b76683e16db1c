//! Coordinates, great-circle distance and the geocoding collaborator.

use anyhow::Context;
use axum::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::GeocoderConfig;

/// Earth's mean radius in miles, used to turn distances into radians.
pub const EARTH_RADIUS_MILES: f64 = 3963.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Central angle to `other` in radians (haversine).
    pub fn angular_distance(&self, other: &GeoPoint) -> f64 {
        let (lat1, lat2) = (self.latitude.to_radians(), other.latitude.to_radians());
        let dlat = lat2 - lat1;
        let dlon = (other.longitude - self.longitude).to_radians();
        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        2.0 * a.sqrt().min(1.0).asin()
    }
}

/// Linear distance in miles to an angular radius in radians.
pub fn miles_to_radians(miles: f64) -> f64 {
    miles / EARTH_RADIUS_MILES
}

/// Resolves a postal code or free-form address to coordinates.
#[async_trait]
pub trait GeocodingService: Send + Sync {
    /// `Ok(None)` when the lookup succeeded but found nothing.
    async fn resolve(&self, query: &str) -> anyhow::Result<Option<GeoPoint>>;
}

/// Nominatim-compatible HTTP geocoder.
#[derive(Clone)]
pub struct HttpGeocoder {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Place {
    lat: String,
    lon: String,
}

fn first_point(places: &[Place]) -> anyhow::Result<Option<GeoPoint>> {
    let Some(place) = places.first() else {
        return Ok(None);
    };
    let latitude = place.lat.parse::<f64>().context("geocoder latitude")?;
    let longitude = place.lon.parse::<f64>().context("geocoder longitude")?;
    Ok(Some(GeoPoint::new(latitude, longitude)))
}

impl HttpGeocoder {
    pub fn new(client: reqwest::Client, cfg: &GeocoderConfig) -> Self {
        Self {
            client,
            url: cfg.url.clone(),
            api_key: cfg.api_key.clone(),
        }
    }
}

#[async_trait]
impl GeocodingService for HttpGeocoder {
    async fn resolve(&self, query: &str) -> anyhow::Result<Option<GeoPoint>> {
        let mut params = vec![("q", query), ("format", "json"), ("limit", "1")];
        if let Some(key) = self.api_key.as_deref() {
            params.push(("key", key));
        }
        let places: Vec<Place> = self
            .client
            .get(&self.url)
            .query(&params)
            .send()
            .await
            .context("geocoder request")?
            .error_for_status()
            .context("geocoder status")?
            .json()
            .await
            .context("geocoder response")?;
        let point = first_point(&places)?;
        debug!(query, found = point.is_some(), "geocoded");
        Ok(point)
    }
}
