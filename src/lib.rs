//! # Distribuidores
//!
//! Internal dashboard backend for a roster of regional distributors, each
//! assigned one or more Brazilian cities. Screens are exposed as a JSON API:
//! login/session, register, list/edit/delete and a map document a
//! Leaflet-style client renders.
//!
//! # General Infrastructure
//! - The roster lives in a shared spreadsheet (Google Sheets or a local CSV),
//!   read once at startup and rewritten whole on every mutation
//! - One authoritative in-memory table per process, guarded by a revision
//!   counter so concurrent editors get a conflict instead of silent data loss
//! - States, cities and boundary meshes come from the IBGE localities API and
//!   are memoized for the process lifetime
//! - Coordinates fall back to Nominatim geocoding when a city has no mesh
use std::time::Duration;

use axum::{
    Router,
    http::{Method, header::CONTENT_TYPE},
    routing::{get, post, put},
};

use signal::{
    ctrl_c,
    unix::{SignalKind, signal},
};
use tokio::{net::TcpListener, signal};
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

pub mod auth;
pub mod config;
pub mod error;
pub mod geo;
pub mod geocode;
pub mod ibge;
pub mod map;
pub mod roster;
pub mod routes;
pub mod state;
pub mod store;

use routes::{
    city_labels_handler, delete_handler, edit_handler, list_handler, login_handler,
    logout_handler, map_handler, municipalities_handler, register_handler, session_handler,
    states_handler,
};
use state::AppState;

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(60 * 60));

    Router::new()
        .route("/api/login", post(login_handler))
        .route("/api/logout", post(logout_handler))
        .route("/api/sessao", get(session_handler))
        .route("/api/estados", get(states_handler))
        .route("/api/estados/{uf}/municipios", get(municipalities_handler))
        .route("/api/municipios", get(city_labels_handler))
        .route("/api/distribuidores", get(list_handler).post(register_handler))
        .route(
            "/api/distribuidores/{nome}",
            put(edit_handler).delete(delete_handler),
        )
        .route("/api/mapa", get(map_handler))
        .layer(cors)
        .with_state(state)
}

pub async fn start_server() {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    info!("Initializing state...");
    let state = AppState::new().await;

    info!("Starting server...");
    let app = build_router(state.clone());

    let address = format!("0.0.0.0:{}", state.config.port);
    info!("Binding to {address}");

    let listener = TcpListener::bind(&address).await.unwrap();
    info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .unwrap();

    println!("Server shutting down...");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        ctrl_c().await.expect("Failed to install Ctrl+C handler");

        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        signal(SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;

        info!("Received terminate signal, shutting down");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
