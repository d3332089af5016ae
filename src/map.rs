//! Builds the map document the client renders: one region or marker layer
//! per visible row, plus the state-boundary overlay.
use std::hash::{DefaultHasher, Hash, Hasher};

use geojson::GeoJson;
use serde::Serialize;

use crate::{geo::GeoProvider, roster::Row};

/// Geographic center of Brazil, the fallback position for rows with no
/// usable coordinates.
pub const BRAZIL_CENTER: (f64, f64) = (-14.2350, -51.9253);
pub const DEFAULT_ZOOM: u8 = 5;

/// Stable fill color per distributor name, folded into a hex range that
/// stays clear of near-black and near-white.
pub fn distributor_color(nome: &str) -> String {
    let mut hasher = DefaultHasher::new();
    nome.hash(&mut hasher);
    let color = (hasher.finish() % 0xAAAAAA) as u32 + 0x111111;
    format!("#{color:06X}")
}

#[derive(Debug, Serialize)]
#[serde(tag = "tipo", rename_all = "snake_case")]
pub enum MapLayer {
    /// Choropleth region: the city's boundary mesh filled with the
    /// distributor's color.
    Region {
        geojson: GeoJson,
        cor: String,
        tooltip: String,
    },
    /// Point fallback when no mesh is available.
    Marker {
        latitude: f64,
        longitude: f64,
        popup: String,
    },
}

#[derive(Debug, Serialize)]
pub struct MapDocument {
    pub centro: [f64; 2],
    pub zoom: u8,
    pub camadas: Vec<MapLayer>,
    /// "Divisas Estaduais" overlay, drawn above the distributor layers and
    /// toggleable client-side.
    pub divisas: Option<GeoJson>,
}

pub async fn build_map(rows: &[Row], geo: &dyn GeoProvider) -> MapDocument {
    let mut camadas = Vec::new();

    for row in rows {
        let cor = distributor_color(&row.distribuidor);
        let label = format!("{} ({} - {})", row.distribuidor, row.cidade, row.estado);

        let mesh = geo.city_boundary(&row.cidade, &row.estado).await;
        if let Some(geojson) = mesh.filter(renderable) {
            camadas.push(MapLayer::Region {
                geojson,
                cor,
                tooltip: label,
            });
            continue;
        }

        // No mesh: place a marker at the stored coordinates. An empty cell
        // falls back to the country center, but a cell that fails to parse
        // drops the row from the map entirely.
        let Ok(latitude) = parse_coordinate(&row.latitude, BRAZIL_CENTER.0) else {
            continue;
        };
        let Ok(longitude) = parse_coordinate(&row.longitude, BRAZIL_CENTER.1) else {
            continue;
        };
        camadas.push(MapLayer::Marker {
            latitude,
            longitude,
            popup: label,
        });
    }

    MapDocument {
        centro: [BRAZIL_CENTER.0, BRAZIL_CENTER.1],
        zoom: DEFAULT_ZOOM,
        camadas,
        divisas: geo.state_mesh().await,
    }
}

/// A mesh renders as a region only when it actually carries features.
fn renderable(mesh: &GeoJson) -> bool {
    matches!(mesh, GeoJson::FeatureCollection(fc) if !fc.features.is_empty())
}

fn parse_coordinate(cell: &str, default: f64) -> Result<f64, std::num::ParseFloatError> {
    let cell = cell.trim();
    if cell.is_empty() {
        return Ok(default);
    }
    cell.parse()
}
