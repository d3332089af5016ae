//! # Record store
//!
//! The spreadsheet is the single source of truth for the roster. The contract
//! is deliberately blunt, matching how the sheet is actually operated:
//!
//! - `read` returns every row, defaulting columns the sheet is missing to
//!   empty strings
//! - `write` drops incomplete rows, clears the backend and rewrites the whole
//!   table; it is not transactional
//!
//! Concurrent-edit protection lives above this layer, in the roster's
//! revision counter. A failed write surfaces as [`StoreError`] so the caller
//! can refuse the mutation instead of diverging from the backend.
use async_trait::async_trait;
use serde_json::{Value, json};
use std::path::PathBuf;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::roster::Row;

pub const COLUMNS: [&str; 6] = [
    "Distribuidor",
    "Contato",
    "Estado",
    "Cidade",
    "Latitude",
    "Longitude",
];

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("backend rejected the call ({status}): {body}")]
    Backend { status: u16, body: String },

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn read(&self) -> Result<Vec<Row>, StoreError>;
    async fn write(&self, rows: &[Row]) -> Result<(), StoreError>;
}

/// Keeps only rows worth persisting, same rule for every backend.
fn persistable(rows: &[Row]) -> Vec<&Row> {
    rows.iter().filter(|r| r.is_complete()).collect()
}

// ---------------------------------------------------------------------------
// Google Sheets
// ---------------------------------------------------------------------------

/// Sheets v4 values API: `values/{range}` to read, `:clear` + an overwrite to
/// write. Authenticated with a bearer token minted by the deployment
/// environment for a service account with spreadsheet scopes.
pub struct SheetsStore {
    http: reqwest::Client,
    base: String,
    sheet_id: String,
    sheet_name: String,
    token: String,
}

const SHEETS_BASE: &str = "https://sheets.googleapis.com/v4/spreadsheets";

impl SheetsStore {
    pub fn new(sheet_id: String, sheet_name: String, token: String) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(10))
                .build()
                .expect("HTTP client"),
            base: SHEETS_BASE.to_string(),
            sheet_id,
            sheet_name,
            token,
        }
    }

    /// `…/{sheet_id}/values/{range}`, with the range percent-encoded so sheet
    /// names with spaces or slashes survive as a single path segment. `action`
    /// appends the Sheets RPC suffix (`Sheet1:clear`).
    fn values_url(&self, action: Option<&str>) -> reqwest::Url {
        let mut url = reqwest::Url::parse(&self.base).expect("sheets base url");
        let range = match action {
            Some(action) => format!("{}:{action}", self.sheet_name),
            None => self.sheet_name.clone(),
        };
        url.path_segments_mut()
            .expect("sheets base url has a path")
            .push(&self.sheet_id)
            .push("values")
            .push(&range);
        url
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, StoreError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(StoreError::Backend { status, body })
    }
}

#[async_trait]
impl RecordStore for SheetsStore {
    async fn read(&self) -> Result<Vec<Row>, StoreError> {
        let response = self
            .http
            .get(self.values_url(None))
            .bearer_auth(&self.token)
            .send()
            .await?;
        let body: Value = Self::check(response).await?.json().await?;

        let values: Vec<Vec<String>> = body
            .get("values")
            .and_then(Value::as_array)
            .map(|rows| {
                rows.iter()
                    .map(|cells| {
                        cells
                            .as_array()
                            .map(|cells| {
                                cells
                                    .iter()
                                    .map(|c| c.as_str().unwrap_or_default().to_string())
                                    .collect()
                            })
                            .unwrap_or_default()
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(rows_from_values(values))
    }

    async fn write(&self, rows: &[Row]) -> Result<(), StoreError> {
        let response = self
            .http
            .post(self.values_url(Some("clear")))
            .bearer_auth(&self.token)
            .json(&json!({}))
            .send()
            .await?;
        Self::check(response).await?;

        let mut update_url = self.values_url(None);
        update_url.set_query(Some("valueInputOption=RAW"));
        let response = self
            .http
            .put(update_url)
            .bearer_auth(&self.token)
            .json(&json!({ "values": values_from_rows(rows) }))
            .send()
            .await?;
        Self::check(response).await?;

        Ok(())
    }
}

/// Maps a raw header + cell grid onto rows, defaulting absent columns to
/// empty strings. An empty grid means an empty table.
pub fn rows_from_values(values: Vec<Vec<String>>) -> Vec<Row> {
    let mut iter = values.into_iter();
    let Some(header) = iter.next() else {
        return Vec::new();
    };

    let index_of =
        |name: &str| -> Option<usize> { header.iter().position(|h| h.trim() == name) };
    let columns: Vec<Option<usize>> = COLUMNS.iter().map(|name| index_of(name)).collect();

    iter.map(|cells| {
        let cell = |slot: usize| -> String {
            columns[slot]
                .and_then(|i| cells.get(i))
                .cloned()
                .unwrap_or_default()
        };
        Row {
            distribuidor: cell(0),
            contato: cell(1),
            estado: cell(2),
            cidade: cell(3),
            latitude: cell(4),
            longitude: cell(5),
        }
    })
    .collect()
}

/// Header row plus one line per persistable row.
pub fn values_from_rows(rows: &[Row]) -> Vec<Vec<String>> {
    let mut values = vec![COLUMNS.iter().map(|c| c.to_string()).collect::<Vec<_>>()];
    for row in persistable(rows) {
        values.push(vec![
            row.distribuidor.clone(),
            row.contato.clone(),
            row.estado.clone(),
            row.cidade.clone(),
            row.latitude.clone(),
            row.longitude.clone(),
        ]);
    }
    values
}

// ---------------------------------------------------------------------------
// Local CSV
// ---------------------------------------------------------------------------

/// The original deployment's local variant: one CSV file with the same
/// columns, created with headers on first read.
pub struct CsvStore {
    path: PathBuf,
}

impl CsvStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl RecordStore for CsvStore {
    async fn read(&self) -> Result<Vec<Row>, StoreError> {
        if !self.path.exists() {
            self.write(&[]).await?;
            return Ok(Vec::new());
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(&self.path)?;
        let mut values = Vec::new();
        for record in reader.records() {
            values.push(record?.iter().map(str::to_string).collect());
        }
        Ok(rows_from_values(values))
    }

    async fn write(&self, rows: &[Row]) -> Result<(), StoreError> {
        let mut writer = csv::Writer::from_path(&self.path)?;
        for line in values_from_rows(rows) {
            writer.write_record(&line)?;
        }
        writer.flush()?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// In-memory (tests)
// ---------------------------------------------------------------------------

/// Test double. `fail_writes` simulates an unreachable backend.
pub struct MemoryStore {
    pub rows: Mutex<Vec<Row>>,
    pub fail_writes: std::sync::atomic::AtomicBool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            rows: Mutex::new(Vec::new()),
            fail_writes: std::sync::atomic::AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn read(&self) -> Result<Vec<Row>, StoreError> {
        Ok(self.rows.lock().await.clone())
    }

    async fn write(&self, rows: &[Row]) -> Result<(), StoreError> {
        if self.fail_writes.load(std::sync::atomic::Ordering::Relaxed) {
            return Err(StoreError::Backend {
                status: 503,
                body: "backend unavailable".into(),
            });
        }
        let kept: Vec<Row> = persistable(rows).into_iter().cloned().collect();
        *self.rows.lock().await = kept;
        Ok(())
    }
}
