use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use axum_extra::extract::{
    Query as MultiQuery,
    cookie::{Cookie, PrivateCookieJar},
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    auth::{Editor, SESSION_COOKIE, Session},
    error::AppError,
    ibge::{City, UnitState},
    map::{self, MapDocument},
    roster::{self, Row},
    state::AppState,
};

// ---------------------------------------------------------------------------
// Login / session
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct LoginRequest {
    pub usuario: String,
    pub senha: String,
}

pub async fn login_handler(
    State(state): State<AppState>,
    jar: PrivateCookieJar,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let nivel = state
        .credentials
        .verify(&payload.usuario, &payload.senha)
        .ok_or(AppError::InvalidCredentials)?;

    let session = Session {
        usuario: payload.usuario,
        nivel,
    };
    info!("Login de {} ({:?})", session.usuario, session.nivel);

    let value = serde_json::to_string(&session).expect("serialize session");
    let jar = jar.add(
        Cookie::build((SESSION_COOKIE, value))
            .path("/")
            .http_only(true)
            .build(),
    );
    Ok((jar, Json(session)))
}

pub async fn logout_handler(jar: PrivateCookieJar) -> impl IntoResponse {
    let jar = jar.remove(Cookie::build((SESSION_COOKIE, "")).path("/").build());
    (jar, StatusCode::NO_CONTENT)
}

pub async fn session_handler(session: Session) -> Json<Session> {
    Json(session)
}

// ---------------------------------------------------------------------------
// Reference data
// ---------------------------------------------------------------------------

pub async fn states_handler(
    State(state): State<AppState>,
    _session: Session,
) -> Json<Vec<UnitState>> {
    Json(state.geo.states().await)
}

pub async fn municipalities_handler(
    State(state): State<AppState>,
    _session: Session,
    Path(uf): Path<String>,
) -> Json<Vec<City>> {
    Json(state.geo.cities(&uf).await)
}

pub async fn city_labels_handler(
    State(state): State<AppState>,
    _session: Session,
) -> Json<Vec<String>> {
    Json(state.geo.city_labels().await)
}

// ---------------------------------------------------------------------------
// Roster CRUD
// ---------------------------------------------------------------------------

/// List rows: coordinates stay internal, as on the list screen.
#[derive(Debug, Serialize)]
pub struct PublicRow {
    pub distribuidor: String,
    pub contato: String,
    pub estado: String,
    pub cidade: String,
}

impl From<&Row> for PublicRow {
    fn from(row: &Row) -> Self {
        Self {
            distribuidor: row.distribuidor.clone(),
            contato: row.contato.clone(),
            estado: row.estado.clone(),
            cidade: row.cidade.clone(),
        }
    }
}

#[derive(Serialize)]
pub struct TableResponse {
    pub revisao: u64,
    pub linhas: Vec<PublicRow>,
}

#[derive(Serialize)]
pub struct MutationResponse {
    pub revisao: u64,
    pub mensagem: String,
}

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub revisao: u64,
    pub nome: String,
    pub contato: String,
    pub estado: String,
    pub cidades: Vec<String>,
}

#[derive(Deserialize)]
pub struct EditRequest {
    pub revisao: u64,
    pub nome: String,
    pub contato: String,
    pub estado: String,
    pub cidades: Vec<String>,
}

#[derive(Deserialize)]
pub struct RevisionQuery {
    pub revisao: u64,
}

pub async fn list_handler(
    State(state): State<AppState>,
    _session: Session,
) -> Json<TableResponse> {
    let roster = state.roster.read().await;
    Json(TableResponse {
        revisao: roster.revision(),
        linhas: roster.rows().iter().map(PublicRow::from).collect(),
    })
}

/// One row per selected city. A city whose boundary mesh is available keeps
/// empty coordinates (the region renders it); otherwise the geocoder fills
/// them in, or leaves them empty when it too comes up short.
async fn resolve_rows(
    state: &AppState,
    nome: &str,
    contato: &str,
    estado: &str,
    cidades: &[String],
) -> Vec<Row> {
    let mut rows = Vec::with_capacity(cidades.len());
    for cidade in cidades {
        let (latitude, longitude) = if state.geo.city_boundary(cidade, estado).await.is_some() {
            (String::new(), String::new())
        } else {
            match state.geo.geocode(cidade, estado).await {
                Some((lat, lon)) => (lat.to_string(), lon.to_string()),
                None => (String::new(), String::new()),
            }
        };
        rows.push(Row {
            distribuidor: nome.to_string(),
            contato: contato.to_string(),
            estado: estado.to_string(),
            cidade: cidade.clone(),
            latitude,
            longitude,
        });
    }
    rows
}

pub async fn register_handler(
    State(state): State<AppState>,
    Editor(session): Editor,
    Json(payload): Json<RegisterRequest>,
) -> Result<Json<MutationResponse>, AppError> {
    let mut roster = state.roster.write().await;
    roster.ensure_revision(payload.revisao)?;

    let nome = payload.nome.trim();
    let contato = payload.contato.trim();
    let cidades = roster::dedupe_cities(&payload.cidades);
    roster.check_register(nome, contato, &payload.estado, &cidades)?;

    let novos = resolve_rows(&state, nome, contato, &payload.estado, &cidades).await;

    let mut table = roster.rows().to_vec();
    table.extend(novos.iter().cloned());
    state.store.write(&table).await?;

    roster.apply_register(novos);
    info!(
        "{} cadastrou '{nome}' ({} cidade(s))",
        session.usuario,
        cidades.len()
    );

    Ok(Json(MutationResponse {
        revisao: roster.revision(),
        mensagem: format!("Distribuidor '{nome}' adicionado!"),
    }))
}

pub async fn edit_handler(
    State(state): State<AppState>,
    Editor(session): Editor,
    Path(original): Path<String>,
    Json(payload): Json<EditRequest>,
) -> Result<Json<MutationResponse>, AppError> {
    let mut roster = state.roster.write().await;
    roster.ensure_revision(payload.revisao)?;

    let nome = payload.nome.trim();
    let contato = payload.contato.trim();
    let cidades = roster::dedupe_cities(&payload.cidades);
    roster.check_edit(&original, nome, contato, &payload.estado, &cidades)?;

    let novos = resolve_rows(&state, nome, contato, &payload.estado, &cidades).await;

    let mut table: Vec<Row> = roster
        .rows()
        .iter()
        .filter(|r| r.distribuidor != original)
        .cloned()
        .collect();
    table.extend(novos.iter().cloned());
    state.store.write(&table).await?;

    roster.apply_edit(&original, novos);
    info!("{} alterou '{original}' -> '{nome}'", session.usuario);

    Ok(Json(MutationResponse {
        revisao: roster.revision(),
        mensagem: "Alterações salvas!".to_string(),
    }))
}

pub async fn delete_handler(
    State(state): State<AppState>,
    Editor(session): Editor,
    Path(nome): Path<String>,
    Query(query): Query<RevisionQuery>,
) -> Result<Json<MutationResponse>, AppError> {
    let mut roster = state.roster.write().await;
    roster.ensure_revision(query.revisao)?;

    if !roster.has_distributor(&nome) {
        return Err(AppError::UnknownDistributor);
    }

    let table: Vec<Row> = roster
        .rows()
        .iter()
        .filter(|r| r.distribuidor != nome)
        .cloned()
        .collect();
    state.store.write(&table).await?;

    let removed = roster.apply_delete(&nome);
    info!("{} removeu '{nome}' ({removed} linha(s))", session.usuario);

    Ok(Json(MutationResponse {
        revisao: roster.revision(),
        mensagem: format!("'{nome}' removido!"),
    }))
}

// ---------------------------------------------------------------------------
// Map
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct MapQuery {
    /// Repeatable `distribuidor=` filter; absent means everyone.
    #[serde(default)]
    pub distribuidor: Vec<String>,
    /// `"Cidade - UF"` exact search; when present it short-circuits the
    /// distributor filter.
    pub cidade: Option<String>,
}

#[derive(Serialize)]
pub struct CitySearch {
    pub encontrados: usize,
    pub linhas: Vec<PublicRow>,
}

#[derive(Serialize)]
pub struct MapResponse {
    pub busca: Option<CitySearch>,
    pub mapa: Option<MapDocument>,
}

pub async fn map_handler(
    State(state): State<AppState>,
    _session: Session,
    MultiQuery(query): MultiQuery<MapQuery>,
) -> Result<Json<MapResponse>, AppError> {
    let roster = state.roster.read().await;

    if let Some(label) = query.cidade.as_deref().filter(|l| !l.trim().is_empty()) {
        let (cidade, uf) = label.rsplit_once(" - ").ok_or_else(|| {
            AppError::Validation("Busca de cidade deve ter o formato 'Cidade - UF'".into())
        })?;

        let linhas: Vec<Row> = roster
            .rows()
            .iter()
            .filter(|r| {
                r.cidade.to_lowercase() == cidade.to_lowercase()
                    && r.estado.to_uppercase() == uf.to_uppercase()
            })
            .cloned()
            .collect();

        let mapa = if linhas.is_empty() {
            None
        } else {
            Some(map::build_map(&linhas, state.geo.as_ref()).await)
        };
        return Ok(Json(MapResponse {
            busca: Some(CitySearch {
                encontrados: linhas.len(),
                linhas: linhas.iter().map(PublicRow::from).collect(),
            }),
            mapa,
        }));
    }

    let filtro: Vec<String> = query
        .distribuidor
        .iter()
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .collect();

    let linhas: Vec<Row> = roster
        .rows()
        .iter()
        .filter(|r| filtro.is_empty() || filtro.iter().any(|n| n == &r.distribuidor))
        .cloned()
        .collect();

    let mapa = map::build_map(&linhas, state.geo.as_ref()).await;
    Ok(Json(MapResponse {
        busca: None,
        mapa: Some(mapa),
    }))
}
