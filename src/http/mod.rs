use axum::{
    Router,
    routing::get,
};
use log::info;
use serde::Serialize;
use tower_http::services::ServeDir;

use crate::AppState;

pub mod games;

/// DRF-style pagination envelope for the collection endpoint.
#[derive(Debug, Serialize)]
pub struct PaginatedResponse<T> {
    count: usize,
    next: Option<String>,
    previous: Option<String>,
    results: Vec<T>,
}

impl<T> PaginatedResponse<T> {
    pub fn new(count: usize, next: Option<String>, previous: Option<String>, results: Vec<T>) -> Self {
        Self {
            count,
            next,
            previous,
            results,
        }
    }
}

/// Per-request context for building absolute URLs, passed explicitly into the
/// serialization functions instead of read from ambient state.
#[derive(Debug, Clone)]
pub struct RequestContext {
    base_url: String,
}

impl RequestContext {
    pub fn new(host: &str) -> Self {
        Self {
            base_url: format!("http://{}", host),
        }
    }

    pub fn media_url(&self, path: &str) -> String {
        format!("{}/media/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub fn games_url(&self) -> String {
        format!("{}/games/", self.base_url)
    }
}

pub async fn run(app: AppState, shutdown_signal: impl Future<Output = ()> + Send + 'static) {
    let media_dir =
        std::env::var("LUDOTECA_MEDIA_DIR").unwrap_or_else(|_| "media".to_string());

    let router = Router::new()
        .route("/games/", get(games::list).post(games::create))
        .route("/games/estadisticas/", get(games::stats))
        .route("/games/plataformas/", get(games::platforms))
        .route("/games/generos/", get(games::genres))
        .route(
            "/games/{id}/",
            get(games::retrieve)
                .put(games::update)
                .patch(games::partial_update)
                .delete(games::destroy),
        )
        .nest_service("/media", ServeDir::new(media_dir));

    let port = std::env::var("LUDOTECA_HTTP_PORT")
        .unwrap_or_else(|_| "8000".to_string())
        .parse::<u16>()
        .expect("LUDOTECA_HTTP_PORT must be a valid u16");

    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port))
        .await
        .unwrap();

    info!("API server listening on port {}", port);
    axum::serve(listener, router.with_state(app))
        .with_graceful_shutdown(shutdown_signal)
        .await
        .unwrap();

    info!("HTTP API shut down gracefully");
}
