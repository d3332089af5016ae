//! Nominatim fallback for cities without a boundary mesh: one free-text
//! query, first hit wins, failure means no coordinates.
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

const NOMINATIM_URL: &str = "https://nominatim.openstreetmap.org/search";
const USER_AGENT: &str = "distribuidores_app";

#[derive(Deserialize)]
struct Place {
    lat: String,
    lon: String,
}

pub struct Geocoder {
    http: reqwest::Client,
    url: String,
}

impl Default for Geocoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Geocoder {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(5))
                .user_agent(USER_AGENT)
                .build()
                .expect("HTTP client"),
            url: NOMINATIM_URL.to_string(),
        }
    }

    /// Resolves `"{cidade}, {uf}, Brasil"` to coordinates. Timeouts, upstream
    /// errors and empty result sets all degrade to `None`.
    pub async fn resolve(&self, cidade: &str, uf: &str) -> Option<(f64, f64)> {
        let query = format!("{cidade}, {uf}, Brasil");
        let places: Vec<Place> = match self
            .http
            .get(&self.url)
            .query(&[("q", query.as_str()), ("format", "json"), ("limit", "1")])
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
        {
            Ok(response) => match response.json().await {
                Ok(places) => places,
                Err(e) => {
                    warn!("Geocodificação de {query} retornou payload inválido: {e}");
                    return None;
                }
            },
            Err(e) => {
                warn!("Geocodificação de {query} indisponível: {e}");
                return None;
            }
        };

        let place = places.first()?;
        let lat = place.lat.parse().ok()?;
        let lon = place.lon.parse().ok()?;
        Some((lat, lon))
    }
}
