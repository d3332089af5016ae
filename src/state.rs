use std::{ops::Deref, sync::Arc};

use axum::extract::FromRef;
use axum_extra::extract::cookie::Key;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::{
    auth::Credentials,
    config::{Config, StoreBackend},
    geo::{GeoProvider, LiveGeo},
    roster::Roster,
    store::{CsvStore, RecordStore, SheetsStore},
};

pub struct Inner {
    pub config: Config,
    pub cookie_key: Key,
    pub credentials: Credentials,
    pub roster: RwLock<Roster>,
    pub store: Arc<dyn RecordStore>,
    pub geo: Arc<dyn GeoProvider>,
}

/// Cheaply clonable handle the router carries; the shared parts live behind
/// one `Arc`.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<Inner>,
}

impl Deref for AppState {
    type Target = Inner;

    fn deref(&self) -> &Inner {
        &self.inner
    }
}

impl AppState {
    pub async fn new() -> Self {
        let config = Config::load();

        let store: Arc<dyn RecordStore> = match config.backend {
            StoreBackend::Sheets => Arc::new(SheetsStore::new(
                config.sheet_id.clone(),
                config.sheet_name.clone(),
                config.sheets_token.clone(),
            )),
            StoreBackend::Csv => Arc::new(CsvStore::new(config.csv_path.clone())),
        };

        Self::assemble(config, store, Arc::new(LiveGeo::default())).await
    }

    /// Wires a state from explicit parts; tests inject their own store and
    /// geography stub here.
    pub async fn assemble(
        config: Config,
        store: Arc<dyn RecordStore>,
        geo: Arc<dyn GeoProvider>,
    ) -> Self {
        let credentials = Credentials::load_or_bootstrap(&config.users_file);
        let cookie_key = Key::derive_from(config.cookie_secret.as_bytes());

        // A backend that cannot be read at startup degrades to an empty
        // table; writes are still guarded, so the first mutation surfaces
        // the fault instead of silently clearing the sheet.
        let rows = match store.read().await {
            Ok(rows) => {
                info!("Loaded {} roster row(s) from the backend", rows.len());
                rows
            }
            Err(e) => {
                warn!("Backend unreadable at startup, starting empty: {e}");
                Vec::new()
            }
        };

        Self {
            inner: Arc::new(Inner {
                config,
                cookie_key,
                credentials,
                roster: RwLock::new(Roster::new(rows)),
                store,
                geo,
            }),
        }
    }
}

impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Self {
        state.cookie_key.clone()
    }
}
