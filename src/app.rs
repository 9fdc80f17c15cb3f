use std::sync::Arc;

use axum::response::IntoResponse;
use thiserror::Error;

use crate::{
    game::{GameRepository, GameService, GameServiceImpl},
    persistence::games::GameRepositoryImpl,
    validation,
};

pub type ArcGameService = Arc<Box<dyn GameService + Send + Sync + 'static>>;

pub type ArcGameRepository = Arc<Box<dyn GameRepository + Send + Sync + 'static>>;

#[derive(Clone)]
pub struct AppState {
    pub game_service: ArcGameService,
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("validation failed")]
    Validation(validator::ValidationErrors),

    #[error("database error: {0}")]
    Database(#[from] DatabaseError),
}

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("connection error: {0}")]
    ConnectionError(r2d2::Error),
    #[error("query error: {0}")]
    QueryError(rusqlite::Error),
}

impl ServiceError {
    pub fn not_found<T, R>(msg: T) -> ServiceResult<R>
    where
        T: Into<String>,
    {
        Err(ServiceError::NotFound(msg.into()))
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> axum::http::Response<axum::body::Body> {
        match self {
            // The stored message is internal; the wire body is the fixed
            // framework phrase. Write endpoints echo the message instead,
            // through their own {error, detail} wrapper.
            ServiceError::NotFound(_) => (
                axum::http::StatusCode::NOT_FOUND,
                axum::Json(serde_json::json!({ "detail": "Not found." })),
            )
                .into_response(),
            ServiceError::Validation(errors) => (
                axum::http::StatusCode::BAD_REQUEST,
                axum::Json(validation::validation_detail(&errors)),
            )
                .into_response(),
            ServiceError::Database(e) => {
                log::error!("Database error: {}", e);
                (
                    axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                    axum::Json(serde_json::json!({ "error": "Database error" })),
                )
                    .into_response()
            }
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

pub fn construct_app() -> AppState {
    let game_repository: ArcGameRepository = Arc::new(Box::new(GameRepositoryImpl::new()));

    let game_service: ArcGameService =
        Arc::new(Box::new(GameServiceImpl::new(game_repository.clone())));

    AppState { game_service }
}
