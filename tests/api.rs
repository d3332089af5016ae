//! End-to-end tests over the router: login gate, CRUD flow, revision
//! conflicts and the map endpoint, all against the in-memory store and a
//! stubbed geography provider.
use std::sync::{Arc, atomic::Ordering};

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use geojson::GeoJson;
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;

use distribuidores::{
    auth::{AccessLevel, Account},
    build_router,
    config::{Config, StoreBackend},
    geo::GeoProvider,
    ibge::{City, UnitState},
    state::AppState,
    store::MemoryStore,
};

struct StubGeo;

#[async_trait]
impl GeoProvider for StubGeo {
    async fn states(&self) -> Vec<UnitState> {
        vec![UnitState {
            sigla: "SP".into(),
            nome: "São Paulo".into(),
        }]
    }

    async fn cities(&self, _uf: &str) -> Vec<City> {
        vec![
            City {
                id: 3509502,
                nome: "Campinas".into(),
            },
            City {
                id: 3548500,
                nome: "Santos".into(),
            },
        ]
    }

    async fn city_labels(&self) -> Vec<String> {
        vec!["Campinas - SP".into(), "Santos - SP".into()]
    }

    // Only Campinas has a mesh; Santos exercises the geocoder fallback.
    async fn city_boundary(&self, cidade: &str, _uf: &str) -> Option<GeoJson> {
        (cidade == "Campinas").then(|| {
            r#"{
                "type": "FeatureCollection",
                "features": [{"type": "Feature", "properties": {}, "geometry": {
                    "type": "Polygon",
                    "coordinates": [[[-47.0, -22.9], [-47.1, -22.9], [-47.1, -23.0], [-47.0, -22.9]]]
                }}]
            }"#
            .parse()
            .unwrap()
        })
    }

    async fn state_mesh(&self) -> Option<GeoJson> {
        None
    }

    async fn geocode(&self, cidade: &str, _uf: &str) -> Option<(f64, f64)> {
        (cidade == "Santos").then_some((-23.96, -46.33))
    }
}

struct TestApp {
    router: Router,
    store: Arc<MemoryStore>,
    // keeps usuarios.json alive for the test duration
    _dir: TempDir,
}

async fn setup() -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let users_file = dir.path().join("usuarios.json");

    // default admin (editor) plus one read-only account
    let hash = bcrypt::hash("admin123", 4).unwrap();
    let viewer_hash = bcrypt::hash("viewer123", 4).unwrap();
    let accounts = std::collections::HashMap::from([
        (
            "admin".to_string(),
            Account {
                senha: hash,
                nivel: AccessLevel::Editor,
            },
        ),
        (
            "leitura".to_string(),
            Account {
                senha: viewer_hash,
                nivel: AccessLevel::Viewer,
            },
        ),
    ]);
    std::fs::write(&users_file, serde_json::to_string(&accounts).unwrap()).unwrap();

    let config = Config {
        port: 0,
        cookie_secret: "segredo-de-teste-com-tamanho-suficiente-para-derivar".into(),
        users_file,
        backend: StoreBackend::Csv,
        sheet_id: String::new(),
        sheet_name: String::new(),
        sheets_token: String::new(),
        csv_path: dir.path().join("unused.csv"),
    };

    let store = Arc::new(MemoryStore::default());
    let state = AppState::assemble(config, store.clone(), Arc::new(StubGeo)).await;

    TestApp {
        router: build_router(state),
        store,
        _dir: dir,
    }
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn post_json(uri: &str, cookie: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

async fn login(router: &Router, usuario: &str, senha: &str) -> String {
    let request = post_json(
        "/api/login",
        None,
        json!({ "usuario": usuario, "senha": senha }),
    );
    let response = router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .expect("login sets the session cookie")
        .to_str()
        .unwrap();
    set_cookie.split(';').next().unwrap().to_string()
}

fn register_body(revisao: u64, nome: &str, cidades: &[&str]) -> Value {
    json!({
        "revisao": revisao,
        "nome": nome,
        "contato": "(11) 98765-4321",
        "estado": "SP",
        "cidades": cidades,
    })
}

#[tokio::test]
async fn wrong_credentials_stay_logged_out() {
    let app = setup().await;

    let (status, body) = send(
        &app.router,
        post_json(
            "/api/login",
            None,
            json!({ "usuario": "admin", "senha": "errada" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["erro"], "Usuário ou senha incorretos!");

    // no cookie, still logged out
    let (status, _) = send(&app.router, get("/api/sessao", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn login_round_trip_carries_identity_in_the_cookie() {
    let app = setup().await;
    let cookie = login(&app.router, "admin", "admin123").await;

    let (status, body) = send(&app.router, get("/api/sessao", Some(&cookie))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["usuario"], "admin");
    assert_eq!(body["nivel"], "editor");

    // a forged cookie fails decryption and counts as logged out
    let (status, _) = send(
        &app.router,
        get("/api/sessao", Some("distribuidores_login=forjado")),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn logout_always_returns_to_logged_out() {
    let app = setup().await;
    for (usuario, senha) in [("admin", "admin123"), ("leitura", "viewer123")] {
        let cookie = login(&app.router, usuario, senha).await;
        let (status, _) = send(
            &app.router,
            post_json("/api/logout", Some(&cookie), json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }
}

#[tokio::test]
async fn register_persists_one_row_per_city() {
    let app = setup().await;
    let cookie = login(&app.router, "admin", "admin123").await;

    let (status, body) = send(
        &app.router,
        post_json(
            "/api/distribuidores",
            Some(&cookie),
            register_body(0, "Alfa", &["Campinas", "Santos"]),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["revisao"], 1);
    assert_eq!(body["mensagem"], "Distribuidor 'Alfa' adicionado!");

    let (status, body) = send(&app.router, get("/api/distribuidores", Some(&cookie))).await;
    assert_eq!(status, StatusCode::OK);
    let linhas = body["linhas"].as_array().unwrap();
    assert_eq!(linhas.len(), 2);
    // list hides coordinates
    assert!(linhas[0].get("latitude").is_none());

    // backend got the full table; Campinas renders by mesh (no coordinates),
    // Santos was geocoded
    let rows = app.store.rows.lock().await;
    let campinas = rows.iter().find(|r| r.cidade == "Campinas").unwrap();
    assert_eq!(campinas.latitude, "");
    let santos = rows.iter().find(|r| r.cidade == "Santos").unwrap();
    assert_eq!(santos.latitude, "-23.96");
    assert_eq!(santos.longitude, "-46.33");
}

#[tokio::test]
async fn viewer_reads_but_cannot_mutate() {
    let app = setup().await;
    let cookie = login(&app.router, "leitura", "viewer123").await;

    let (status, _) = send(&app.router, get("/api/distribuidores", Some(&cookie))).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(
        &app.router,
        post_json(
            "/api/distribuidores",
            Some(&cookie),
            register_body(0, "Alfa", &["Campinas"]),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn conflicting_cities_are_all_reported_and_nothing_changes() {
    let app = setup().await;
    let cookie = login(&app.router, "admin", "admin123").await;

    let (status, _) = send(
        &app.router,
        post_json(
            "/api/distribuidores",
            Some(&cookie),
            register_body(0, "Alfa", &["Campinas", "Santos"]),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        &app.router,
        post_json(
            "/api/distribuidores",
            Some(&cookie),
            register_body(1, "Beta", &["Campinas", "Santos"]),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let erro = body["erro"].as_str().unwrap();
    assert!(erro.contains("Campinas (atualmente atribuída a Alfa)"));
    assert!(erro.contains("Santos (atualmente atribuída a Alfa)"));

    assert_eq!(app.store.rows.lock().await.len(), 2);
}

#[tokio::test]
async fn stale_revision_is_a_conflict() {
    let app = setup().await;
    let cookie = login(&app.router, "admin", "admin123").await;

    let (status, _) = send(
        &app.router,
        post_json(
            "/api/distribuidores",
            Some(&cookie),
            register_body(0, "Alfa", &["Campinas"]),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // a second session still at revision 0 gets told, not overwritten
    let (status, body) = send(
        &app.router,
        post_json(
            "/api/distribuidores",
            Some(&cookie),
            register_body(0, "Beta", &["Santos"]),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["erro"].as_str().unwrap().contains("revisão"));
}

#[tokio::test]
async fn edit_and_delete_rewrite_the_row_set() {
    let app = setup().await;
    let cookie = login(&app.router, "admin", "admin123").await;

    send(
        &app.router,
        post_json(
            "/api/distribuidores",
            Some(&cookie),
            register_body(0, "Alfa", &["Campinas", "Santos"]),
        ),
    )
    .await;

    // drop Santos, keep Campinas
    let (status, _) = send(
        &app.router,
        post_json_put(
            "/api/distribuidores/Alfa",
            &cookie,
            register_body(1, "Alfa Renomeado", &["Campinas"]),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let rows = app.store.rows.lock().await.clone();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].distribuidor, "Alfa Renomeado");
    assert_eq!(rows[0].cidade, "Campinas");

    let (status, body) = send(
        &app.router,
        delete("/api/distribuidores/Alfa%20Renomeado?revisao=2", &cookie),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["mensagem"], "'Alfa Renomeado' removido!");
    assert!(app.store.rows.lock().await.is_empty());
}

fn post_json_put(uri: &str, cookie: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("PUT")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::COOKIE, cookie)
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn delete(uri: &str, cookie: &str) -> Request<Body> {
    Request::builder()
        .method("DELETE")
        .uri(uri)
        .header(header::COOKIE, cookie)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn failed_backend_write_aborts_the_mutation() {
    let app = setup().await;
    let cookie = login(&app.router, "admin", "admin123").await;
    app.store.fail_writes.store(true, Ordering::Relaxed);

    let (status, _) = send(
        &app.router,
        post_json(
            "/api/distribuidores",
            Some(&cookie),
            register_body(0, "Alfa", &["Campinas"]),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);

    // memory stayed consistent with the backend: no rows, revision untouched
    let (_, body) = send(&app.router, get("/api/distribuidores", Some(&cookie))).await;
    assert_eq!(body["revisao"], 0);
    assert!(body["linhas"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn map_renders_regions_and_city_search_short_circuits() {
    let app = setup().await;
    let cookie = login(&app.router, "admin", "admin123").await;

    send(
        &app.router,
        post_json(
            "/api/distribuidores",
            Some(&cookie),
            register_body(0, "Alfa", &["Campinas", "Santos"]),
        ),
    )
    .await;

    let (status, body) = send(&app.router, get("/api/mapa", Some(&cookie))).await;
    assert_eq!(status, StatusCode::OK);
    let camadas = body["mapa"]["camadas"].as_array().unwrap();
    assert_eq!(camadas.len(), 2);
    assert_eq!(camadas[0]["tipo"], "region");
    assert_eq!(camadas[1]["tipo"], "marker");

    // exact, case-insensitive city search
    let (status, body) = send(
        &app.router,
        get("/api/mapa?cidade=campinas%20-%20sp", Some(&cookie)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["busca"]["encontrados"], 1);
    assert_eq!(body["busca"]["linhas"][0]["cidade"], "Campinas");
    assert_eq!(body["mapa"]["camadas"].as_array().unwrap().len(), 1);

    // a city nobody serves: table only, no map
    let (_, body) = send(
        &app.router,
        get("/api/mapa?cidade=Ubatuba%20-%20SP", Some(&cookie)),
    )
    .await;
    assert_eq!(body["busca"]["encontrados"], 0);
    assert!(body["mapa"].is_null());

    // distributor filter with no match renders an empty map
    let (_, body) = send(
        &app.router,
        get("/api/mapa?distribuidor=Beta", Some(&cookie)),
    )
    .await;
    assert!(body["mapa"]["camadas"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn map_filter_accepts_repeated_distributor_params() {
    let app = setup().await;
    let cookie = login(&app.router, "admin", "admin123").await;

    send(
        &app.router,
        post_json(
            "/api/distribuidores",
            Some(&cookie),
            register_body(0, "Alfa", &["Campinas"]),
        ),
    )
    .await;
    send(
        &app.router,
        post_json(
            "/api/distribuidores",
            Some(&cookie),
            register_body(1, "Beta, Filho & Cia", &["Santos"]),
        ),
    )
    .await;

    // one name, including one with a comma in it
    let (status, body) = send(
        &app.router,
        get("/api/mapa?distribuidor=Beta%2C%20Filho%20%26%20Cia", Some(&cookie)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let camadas = body["mapa"]["camadas"].as_array().unwrap();
    assert_eq!(camadas.len(), 1);
    assert_eq!(camadas[0]["tipo"], "marker");

    // the parameter repeats, one per selected name
    let (_, body) = send(
        &app.router,
        get(
            "/api/mapa?distribuidor=Alfa&distribuidor=Beta%2C%20Filho%20%26%20Cia",
            Some(&cookie),
        ),
    )
    .await;
    assert_eq!(body["mapa"]["camadas"].as_array().unwrap().len(), 2);

    // an empty value means no filter at all
    let (_, body) = send(&app.router, get("/api/mapa?distribuidor=", Some(&cookie))).await;
    assert_eq!(body["mapa"]["camadas"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn repeated_city_in_the_selection_registers_once() {
    let app = setup().await;
    let cookie = login(&app.router, "admin", "admin123").await;

    let (status, _) = send(
        &app.router,
        post_json(
            "/api/distribuidores",
            Some(&cookie),
            register_body(0, "Alfa", &["Campinas", "Campinas"]),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.store.rows.lock().await.len(), 1);

    // same on edit
    let (status, _) = send(
        &app.router,
        post_json_put(
            "/api/distribuidores/Alfa",
            &cookie,
            register_body(1, "Alfa", &["Santos", "Santos", "Campinas"]),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let rows = app.store.rows.lock().await;
    assert_eq!(rows.len(), 2);
    assert_eq!(rows.iter().filter(|r| r.cidade == "Santos").count(), 1);
}
