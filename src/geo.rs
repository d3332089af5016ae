//! Seam between the screens and the external geography services, so tests
//! can run against a stub instead of IBGE and Nominatim.
use async_trait::async_trait;
use geojson::GeoJson;

use crate::{
    geocode::Geocoder,
    ibge::{City, IbgeClient, UnitState},
};

#[async_trait]
pub trait GeoProvider: Send + Sync {
    async fn states(&self) -> Vec<UnitState>;
    async fn cities(&self, uf: &str) -> Vec<City>;
    async fn city_labels(&self) -> Vec<String>;
    async fn city_boundary(&self, cidade: &str, uf: &str) -> Option<GeoJson>;
    async fn state_mesh(&self) -> Option<GeoJson>;
    async fn geocode(&self, cidade: &str, uf: &str) -> Option<(f64, f64)>;
}

/// The production wiring: IBGE for reference data and meshes, Nominatim for
/// the coordinate fallback.
pub struct LiveGeo {
    ibge: IbgeClient,
    geocoder: Geocoder,
}

impl Default for LiveGeo {
    fn default() -> Self {
        Self {
            ibge: IbgeClient::new(),
            geocoder: Geocoder::new(),
        }
    }
}

#[async_trait]
impl GeoProvider for LiveGeo {
    async fn states(&self) -> Vec<UnitState> {
        self.ibge.states().await.to_vec()
    }

    async fn cities(&self, uf: &str) -> Vec<City> {
        self.ibge.cities(uf).await.to_vec()
    }

    async fn city_labels(&self) -> Vec<String> {
        self.ibge.city_labels().await.to_vec()
    }

    async fn city_boundary(&self, cidade: &str, uf: &str) -> Option<GeoJson> {
        self.ibge.city_boundary(cidade, uf).await
    }

    async fn state_mesh(&self) -> Option<GeoJson> {
        self.ibge.state_mesh().await
    }

    async fn geocode(&self, cidade: &str, uf: &str) -> Option<(f64, f64)> {
        self.geocoder.resolve(cidade, uf).await
    }
}
