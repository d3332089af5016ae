use std::{env, fmt::Display, fs::read_to_string, path::PathBuf, str::FromStr};

use tracing::{info, warn};

/// Which backend holds the roster table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// Google Sheets, full-table read and overwrite via the v4 values API.
    Sheets,
    /// A local CSV file, same column layout. Default for development.
    Csv,
}

pub struct Config {
    pub port: u16,
    pub cookie_secret: String,
    pub users_file: PathBuf,
    pub backend: StoreBackend,
    pub sheet_id: String,
    pub sheet_name: String,
    pub sheets_token: String,
    pub csv_path: PathBuf,
}

impl Config {
    pub fn load() -> Self {
        let backend = match var("STORE_BACKEND").as_deref() {
            Ok("sheets") => StoreBackend::Sheets,
            _ => StoreBackend::Csv,
        };

        Self {
            port: try_load("APP_PORT", "8080"),
            cookie_secret: secret_or_default(
                "COOKIE_SECRET",
                "chave_secreta_segura_123_distribuidores",
            ),
            users_file: PathBuf::from(try_load::<String>("USERS_FILE", "usuarios.json")),
            backend,
            sheet_id: try_load("SHEET_ID", ""),
            sheet_name: try_load("SHEET_NAME", "Sheet1"),
            sheets_token: if backend == StoreBackend::Sheets {
                read_secret("SHEETS_TOKEN")
            } else {
                String::new()
            },
            csv_path: PathBuf::from(try_load::<String>("CSV_PATH", "distribuidores.csv")),
        }
    }
}

fn var(key: &str) -> Result<String, ()> {
    env::var(key).map_err(|_| {
        warn!("Environment variable {key} not found, using default");
    })
}

fn try_load<T: FromStr>(key: &str, default: &str) -> T
where
    T::Err: Display,
{
    var(key)
        .unwrap_or_else(|_| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e| {
            warn!("Invalid {key} value: {e}");
        })
        .expect("Environment misconfigured!")
}

fn read_secret(secret_name: &str) -> String {
    let path = format!("/run/secrets/{secret_name}");

    read_to_string(&path)
        .map(|s| s.trim().to_string())
        .map_err(|e| {
            warn!("Failed to read {secret_name} from file: {e}");
        })
        .expect("Secrets misconfigured!")
}

/// Secrets with a development fallback: the secret file wins, then the
/// environment, then the built-in default.
fn secret_or_default(secret_name: &str, default: &str) -> String {
    let path = format!("/run/secrets/{secret_name}");

    if let Ok(value) = read_to_string(&path) {
        return value.trim().to_string();
    }

    var(secret_name).unwrap_or_else(|_| {
        warn!("{secret_name} not set, using built-in development default");
        default.to_string()
    })
}
