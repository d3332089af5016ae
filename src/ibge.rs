//! # IBGE localities gateway
//!
//! Read-only reference data from the public IBGE APIs: states, municipalities
//! and boundary meshes (GeoJSON). Upstream data changes rarely, so every
//! distinct lookup is memoized for the process lifetime. Network failure
//! degrades to an empty list or `None` with a `warn!`; the screens keep
//! rendering with whatever they have.
use std::{collections::HashMap, sync::Arc, time::Duration};

use geojson::GeoJson;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::RwLock;
use tracing::warn;

const IBGE_BASE: &str = "https://servicodados.ibge.gov.br/api";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitState {
    pub sigla: String,
    pub nome: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct City {
    pub id: u64,
    pub nome: String,
}

pub struct IbgeClient {
    http: reqwest::Client,
    base: String,
    states: RwLock<Option<Arc<Vec<UnitState>>>>,
    cities: RwLock<HashMap<String, Arc<Vec<City>>>>,
    labels: RwLock<Option<Arc<Vec<String>>>>,
    city_meshes: RwLock<HashMap<u64, Option<GeoJson>>>,
    state_mesh: RwLock<Option<Option<GeoJson>>>,
}

impl Default for IbgeClient {
    fn default() -> Self {
        Self::new()
    }
}

impl IbgeClient {
    pub fn new() -> Self {
        Self::with_base(IBGE_BASE)
    }

    /// Same client against another base URL; tests point this at a local
    /// stand-in for the IBGE host.
    pub fn with_base(base: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("HTTP client"),
            base: base.into(),
            states: RwLock::new(None),
            cities: RwLock::new(HashMap::new()),
            labels: RwLock::new(None),
            city_meshes: RwLock::new(HashMap::new()),
            state_mesh: RwLock::new(None),
        }
    }

    /// All states, sorted by name. Empty on upstream failure, uncached so a
    /// later render can retry.
    pub async fn states(&self) -> Arc<Vec<UnitState>> {
        if let Some(cached) = self.states.read().await.as_ref() {
            return cached.clone();
        }

        let url = format!("{}/v1/localidades/estados", self.base);
        match self.fetch_json::<Vec<UnitState>>(&url).await {
            Ok(mut list) => {
                list.sort_by(|a, b| a.nome.cmp(&b.nome));
                let list = Arc::new(list);
                *self.states.write().await = Some(list.clone());
                list
            }
            Err(e) => {
                warn!("IBGE estados indisponível: {e}");
                Arc::new(Vec::new())
            }
        }
    }

    /// Municipalities of one state, sorted by name.
    pub async fn cities(&self, uf: &str) -> Arc<Vec<City>> {
        let key = uf.to_uppercase();
        if let Some(cached) = self.cities.read().await.get(&key) {
            return cached.clone();
        }

        let url = format!("{}/v1/localidades/estados/{key}/municipios", self.base);
        match self.fetch_json::<Vec<City>>(&url).await {
            Ok(mut list) => {
                list.sort_by(|a, b| a.nome.cmp(&b.nome));
                let list = Arc::new(list);
                self.cities.write().await.insert(key, list.clone());
                list
            }
            Err(e) => {
                warn!("IBGE municípios de {key} indisponível: {e}");
                Arc::new(Vec::new())
            }
        }
    }

    /// Every municipality in the country as `"Cidade - UF"`, sorted. Only
    /// cached when the full sweep succeeded.
    pub async fn city_labels(&self) -> Arc<Vec<String>> {
        if let Some(cached) = self.labels.read().await.as_ref() {
            return cached.clone();
        }

        let states = self.states().await;
        let mut labels = Vec::new();
        for state in states.iter() {
            for city in self.cities(&state.sigla).await.iter() {
                labels.push(format!("{} - {}", city.nome, state.sigla));
            }
        }
        labels.sort();

        let labels = Arc::new(labels);
        if !states.is_empty() {
            *self.labels.write().await = Some(labels.clone());
        }
        labels
    }

    /// Boundary mesh of one municipality, looked up by exact name within its
    /// state. The outcome is memoized either way, as the source screens did.
    pub async fn city_boundary(&self, cidade: &str, uf: &str) -> Option<GeoJson> {
        let id = self
            .cities(uf)
            .await
            .iter()
            .find(|c| c.nome == cidade)?
            .id;

        if let Some(cached) = self.city_meshes.read().await.get(&id) {
            return cached.clone();
        }

        let url = format!(
            "{}/v2/malhas/{id}?formato=application/vnd.geo+json&qualidade=intermediaria",
            self.base
        );
        let mesh = match self.fetch_json::<GeoJson>(&url).await {
            Ok(mesh) => Some(mesh),
            Err(e) => {
                warn!("Malha de {cidade} - {uf} indisponível: {e}");
                None
            }
        };
        self.city_meshes.write().await.insert(id, mesh.clone());
        mesh
    }

    /// The state-boundary overlay, every feature annotated with the fixed
    /// stroke style the map layer uses.
    pub async fn state_mesh(&self) -> Option<GeoJson> {
        if let Some(cached) = self.state_mesh.read().await.as_ref() {
            return cached.clone();
        }

        let url = format!(
            "{}/v2/malhas/?formato=application/vnd.geo+json&qualidade=simplificada&incluir=estados",
            self.base
        );
        let mesh = match self.fetch_json::<GeoJson>(&url).await {
            Ok(mut mesh) => {
                style_state_mesh(&mut mesh);
                Some(mesh)
            }
            Err(e) => {
                warn!("Malha de estados indisponível: {e}");
                None
            }
        };
        *self.state_mesh.write().await = Some(mesh.clone());
        mesh
    }

    async fn fetch_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> reqwest::Result<T> {
        self.http
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
    }
}

fn style_state_mesh(mesh: &mut GeoJson) {
    let GeoJson::FeatureCollection(collection) = mesh else {
        return;
    };
    for feature in &mut collection.features {
        let properties = feature.properties.get_or_insert_with(Default::default);
        properties.insert(
            "style".to_string(),
            json!({
                "color": "#000000",
                "weight": 3,
                "dashArray": "0",
                "fillOpacity": 0
            }),
        );
    }
}
