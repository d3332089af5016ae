//! Flat-file credentials and the cookie-backed session gate.
//!
//! `usuarios.json` maps username to a bcrypt hash plus an access level. A
//! missing or malformed file is rewritten with the default admin account, so
//! a fresh deployment always has a way in. Identity travels in an encrypted
//! private cookie; anything that fails to decrypt is simply a logged-out
//! request.
use std::{collections::HashMap, fs, path::Path};

use axum::{extract::FromRequestParts, http::request::Parts};
use axum_extra::extract::cookie::{Key, PrivateCookieJar};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{error::AppError, state::AppState};

pub const SESSION_COOKIE: &str = "distribuidores_login";

pub const DEFAULT_ADMIN_USER: &str = "admin";
pub const DEFAULT_ADMIN_PASSWORD: &str = "admin123";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
    Editor,
    Viewer,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub senha: String,
    pub nivel: AccessLevel,
}

pub struct Credentials {
    accounts: HashMap<String, Account>,
}

impl Credentials {
    /// Loads the credential file, bootstrapping it with the default admin
    /// account when absent or unparsable.
    pub fn load_or_bootstrap(path: &Path) -> Self {
        let parsed: Option<HashMap<String, Account>> = fs::read_to_string(path)
            .ok()
            .and_then(|raw| serde_json::from_str(&raw).ok());

        let accounts = match parsed {
            Some(accounts) if !accounts.is_empty() => accounts,
            _ => {
                warn!("Credential file missing or malformed, bootstrapping default admin");
                let hash = bcrypt::hash(DEFAULT_ADMIN_PASSWORD, bcrypt::DEFAULT_COST)
                    .expect("bcrypt hash");
                let accounts = HashMap::from([(
                    DEFAULT_ADMIN_USER.to_string(),
                    Account {
                        senha: hash,
                        nivel: AccessLevel::Editor,
                    },
                )]);
                if let Err(e) = fs::write(
                    path,
                    serde_json::to_string_pretty(&accounts).expect("serialize accounts"),
                ) {
                    warn!("Could not write credential file: {e}");
                }
                accounts
            }
        };

        info!("Loaded {} account(s)", accounts.len());
        Self { accounts }
    }

    /// Username must exist and the password must match its bcrypt hash.
    pub fn verify(&self, usuario: &str, senha: &str) -> Option<AccessLevel> {
        let account = self.accounts.get(usuario)?;
        match bcrypt::verify(senha, &account.senha) {
            Ok(true) => Some(account.nivel),
            Ok(false) => None,
            Err(e) => {
                warn!("Stored hash for {usuario} is unusable: {e}");
                None
            }
        }
    }
}

/// The logged-in identity, as carried by the encrypted cookie.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub usuario: String,
    pub nivel: AccessLevel,
}

impl FromRequestParts<AppState> for Session {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let jar: PrivateCookieJar<Key> = PrivateCookieJar::from_request_parts(parts, state)
            .await
            .map_err(|_| AppError::NotLoggedIn)?;
        let cookie = jar.get(SESSION_COOKIE).ok_or(AppError::NotLoggedIn)?;
        serde_json::from_str(cookie.value()).map_err(|_| AppError::NotLoggedIn)
    }
}

/// Session plus the editor requirement the mutating screens enforce.
pub struct Editor(pub Session);

impl FromRequestParts<AppState> for Editor {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let session = Session::from_request_parts(parts, state).await?;
        if session.nivel != AccessLevel::Editor {
            return Err(AppError::EditorOnly);
        }
        Ok(Editor(session))
    }
}
