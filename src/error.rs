use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("Usuário ou senha incorretos!")]
    InvalidCredentials,

    #[error("Sessão ausente ou inválida")]
    NotLoggedIn,

    #[error("Operação restrita ao nível editor")]
    EditorOnly,

    #[error("Distribuidor não encontrado")]
    UnknownDistributor,

    #[error("A tabela foi alterada por outra sessão (revisão atual {current}, recebida {got})")]
    StaleRevision { current: u64, got: u64 },

    #[error("Falha ao persistir a planilha: {0}")]
    Store(#[from] StoreError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::InvalidCredentials | AppError::NotLoggedIn => StatusCode::UNAUTHORIZED,
            AppError::EditorOnly => StatusCode::FORBIDDEN,
            AppError::UnknownDistributor => StatusCode::NOT_FOUND,
            AppError::StaleRevision { .. } => StatusCode::CONFLICT,
            AppError::Store { .. } => StatusCode::BAD_GATEWAY,
        };

        (status, Json(json!({ "erro": self.to_string() }))).into_response()
    }
}
