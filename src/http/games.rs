use axum::{
    Json,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use axum_extra::extract::Host;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::{
    AppState, ServiceError,
    game::{
        Game, GameGenre, GameId, GamePayload, GameQuery, GameSortBy, GameStats, GameStatus,
        Pagination, SortOrder,
    },
    http::{PaginatedResponse, RequestContext},
    validation::validation_detail,
};

const DEFAULT_PAGE_SIZE: usize = 10;
const MAX_PAGE_SIZE: usize = 100;

#[derive(Debug, Default, Deserialize)]
pub struct GameListParams {
    estado: Option<String>,
    genero: Option<String>,
    plataforma: Option<String>,
    calificacion_min: Option<String>,
    horas_min: Option<String>,
    search: Option<String>,
    ordering: Option<String>,
    page: Option<String>,
    page_size: Option<String>,
}

fn clean_param(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Lenient integer parse: a malformed value behaves as an absent filter.
fn parse_int_param(value: Option<&str>) -> Option<i64> {
    value.and_then(|v| v.trim().parse::<i64>().ok())
}

fn parse_ordering(value: Option<&str>) -> (SortOrder, GameSortBy) {
    let default = (SortOrder::Descending, GameSortBy::CreatedAt);
    let Some(raw) = value.map(str::trim).filter(|s| !s.is_empty()) else {
        return default;
    };
    let (order, field) = match raw.strip_prefix('-') {
        Some(rest) => (SortOrder::Descending, rest),
        None => (SortOrder::Ascending, raw),
    };
    let sort_by = match field {
        "nombre" => GameSortBy::Name,
        "fecha_creacion" => GameSortBy::CreatedAt,
        "calificacion" => GameSortBy::Rating,
        "horas_jugadas" => GameSortBy::HoursPlayed,
        _ => return default,
    };
    (order, sort_by)
}

fn parse_page(value: Option<&str>) -> Option<usize> {
    match value.map(str::trim).filter(|s| !s.is_empty()) {
        None => Some(1),
        Some(raw) => raw.parse::<usize>().ok().filter(|&p| p >= 1),
    }
}

fn parse_page_size(value: Option<&str>) -> usize {
    value
        .and_then(|v| v.trim().parse::<usize>().ok())
        .filter(|&s| s > 0)
        .map(|s| s.min(MAX_PAGE_SIZE))
        .unwrap_or(DEFAULT_PAGE_SIZE)
}

fn build_query(params: &GameListParams) -> GameQuery {
    GameQuery {
        status: clean_param(&params.estado),
        genre: clean_param(&params.genero),
        platform: clean_param(&params.plataforma),
        rating_min: parse_int_param(params.calificacion_min.as_deref()),
        hours_min: parse_int_param(params.horas_min.as_deref()),
        search: clean_param(&params.search),
        sort: Some(parse_ordering(params.ordering.as_deref())),
        pagination: Pagination::default(),
    }
}

/// Rebuilds the collection URL for a sibling page, echoing the active query
/// parameters form-urlencoded. Page one is the bare URL, mirroring the
/// original API.
fn page_link(ctx: &RequestContext, params: &GameListParams, page: usize) -> String {
    let mut query = form_urlencoded::Serializer::new(String::new());
    for (key, value) in [
        ("estado", &params.estado),
        ("genero", &params.genero),
        ("plataforma", &params.plataforma),
        ("calificacion_min", &params.calificacion_min),
        ("horas_min", &params.horas_min),
        ("search", &params.search),
        ("ordering", &params.ordering),
        ("page_size", &params.page_size),
    ] {
        if let Some(value) = clean_param(value) {
            query.append_pair(key, &value);
        }
    }
    if page > 1 {
        query.append_pair("page", &page.to_string());
    }

    let query = query.finish();
    if query.is_empty() {
        ctx.games_url()
    } else {
        format!("{}?{}", ctx.games_url(), query)
    }
}

fn invalid_page() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "detail": "Invalid page." })),
    )
        .into_response()
}

fn service_error_detail(error: &ServiceError) -> Value {
    match error {
        ServiceError::Validation(errors) => validation_detail(errors),
        // The bare message, without the Display prefix of the enum variant.
        ServiceError::NotFound(msg) => json!(msg),
        other => json!(other.to_string()),
    }
}

/// Write endpoints fold every failure into a 400 `{error, detail}` body, the
/// contract the original clients depend on.
fn write_failure(error: &'static str, detail: Value) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": error, "detail": detail })),
    )
        .into_response()
}

#[derive(Debug, Serialize)]
pub struct GameDetailJson {
    id: GameId,
    nombre: String,
    descripcion: Option<String>,
    plataforma: String,
    estado: GameStatus,
    estado_display: &'static str,
    genero: GameGenre,
    genero_display: &'static str,
    imagen: Option<String>,
    imagen_url: Option<String>,
    fecha_lanzamiento: Option<NaiveDate>,
    horas_jugadas: u32,
    calificacion: Option<i32>,
    calificacion_estrellas: i32,
    fecha_creacion: DateTime<Utc>,
    fecha_actualizacion: DateTime<Utc>,
    estado_color: &'static str,
}

impl GameDetailJson {
    pub fn from_game(game: &Game, ctx: &RequestContext) -> Self {
        Self {
            id: game.id,
            nombre: game.name.clone(),
            descripcion: game.description.clone(),
            plataforma: game.platform.clone(),
            estado: game.status,
            estado_display: game.status.label(),
            genero: game.genre,
            genero_display: game.genre.label(),
            imagen: game.image.clone(),
            imagen_url: game.image.as_deref().map(|path| ctx.media_url(path)),
            fecha_lanzamiento: game.release_date,
            horas_jugadas: game.hours_played,
            calificacion: game.rating,
            calificacion_estrellas: game.rating_as_stars(),
            fecha_creacion: game.created_at,
            fecha_actualizacion: game.updated_at,
            estado_color: game.status.color(),
        }
    }
}

/// Reduced projection for the collection listing: no description, no raw
/// image path, no update timestamp.
#[derive(Debug, Serialize)]
pub struct GameListItemJson {
    id: GameId,
    nombre: String,
    plataforma: String,
    estado: GameStatus,
    estado_display: &'static str,
    genero: GameGenre,
    genero_display: &'static str,
    imagen_url: Option<String>,
    calificacion: Option<i32>,
    fecha_creacion: DateTime<Utc>,
    estado_color: &'static str,
}

impl GameListItemJson {
    pub fn from_game(game: &Game, ctx: &RequestContext) -> Self {
        Self {
            id: game.id,
            nombre: game.name.clone(),
            plataforma: game.platform.clone(),
            estado: game.status,
            estado_display: game.status.label(),
            genero: game.genre,
            genero_display: game.genre.label(),
            imagen_url: game.image.as_deref().map(|path| ctx.media_url(path)),
            calificacion: game.rating,
            fecha_creacion: game.created_at,
            estado_color: game.status.color(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StatsJson {
    total_juegos: i64,
    juegos_completados: i64,
    juegos_jugando: i64,
    juegos_sin_iniciar: i64,
    juegos_abandonados: i64,
    total_horas_jugadas: i64,
    calificacion_promedio: f64,
}

impl StatsJson {
    pub fn from_stats(stats: &GameStats) -> Self {
        Self {
            total_juegos: stats.total,
            juegos_completados: stats.completed,
            juegos_jugando: stats.playing,
            juegos_sin_iniciar: stats.not_started,
            juegos_abandonados: stats.abandoned,
            total_horas_jugadas: stats.total_hours,
            calificacion_promedio: stats.avg_rating,
        }
    }
}

pub async fn list(
    State(app): State<AppState>,
    Host(host): Host,
    Query(params): Query<GameListParams>,
) -> Response {
    let ctx = RequestContext::new(&host);

    let Some(page) = parse_page(params.page.as_deref()) else {
        return invalid_page();
    };
    let page_size = parse_page_size(params.page_size.as_deref());

    let mut query = build_query(&params);
    query.pagination = Pagination {
        offset: Some((page - 1) * page_size),
        limit: Some(page_size),
    };

    let result = match app.game_service.list_games(query).await {
        Ok(result) => result,
        Err(e) => return e.into_response(),
    };

    if page > 1 && (page - 1) * page_size >= result.total {
        return invalid_page();
    }

    let next = (page * page_size < result.total).then(|| page_link(&ctx, &params, page + 1));
    let previous = (page > 1).then(|| page_link(&ctx, &params, page - 1));
    let results: Vec<GameListItemJson> = result
        .items
        .iter()
        .map(|game| GameListItemJson::from_game(game, &ctx))
        .collect();

    Json(PaginatedResponse::new(result.total, next, previous, results)).into_response()
}

pub async fn retrieve(
    State(app): State<AppState>,
    Host(host): Host,
    Path(id): Path<GameId>,
) -> Result<Json<GameDetailJson>, ServiceError> {
    let ctx = RequestContext::new(&host);
    let game = app.game_service.get_game(id).await?;
    Ok(Json(GameDetailJson::from_game(&game, &ctx)))
}

pub async fn create(
    State(app): State<AppState>,
    Host(host): Host,
    payload: Result<Json<GamePayload>, JsonRejection>,
) -> Response {
    let ctx = RequestContext::new(&host);
    let payload = match payload {
        Ok(Json(payload)) => payload,
        Err(rejection) => {
            return write_failure("Error al crear el juego", json!(rejection.body_text()));
        }
    };

    match app.game_service.create_game(payload).await {
        Ok(game) => (
            StatusCode::CREATED,
            Json(json!({
                "message": "Juego creado exitosamente",
                "data": GameDetailJson::from_game(&game, &ctx),
            })),
        )
            .into_response(),
        Err(e) => write_failure("Error al crear el juego", service_error_detail(&e)),
    }
}

async fn update_inner(
    app: AppState,
    ctx: RequestContext,
    id: GameId,
    payload: Result<Json<GamePayload>, JsonRejection>,
    partial: bool,
) -> Response {
    let payload = match payload {
        Ok(Json(payload)) => payload,
        Err(rejection) => {
            return write_failure("Error al actualizar el juego", json!(rejection.body_text()));
        }
    };

    match app.game_service.update_game(id, payload, partial).await {
        Ok(game) => (
            StatusCode::OK,
            Json(json!({
                "message": "Juego actualizado exitosamente",
                "data": GameDetailJson::from_game(&game, &ctx),
            })),
        )
            .into_response(),
        Err(e) => write_failure("Error al actualizar el juego", service_error_detail(&e)),
    }
}

pub async fn update(
    State(app): State<AppState>,
    Host(host): Host,
    Path(id): Path<GameId>,
    payload: Result<Json<GamePayload>, JsonRejection>,
) -> Response {
    let ctx = RequestContext::new(&host);
    update_inner(app, ctx, id, payload, false).await
}

pub async fn partial_update(
    State(app): State<AppState>,
    Host(host): Host,
    Path(id): Path<GameId>,
    payload: Result<Json<GamePayload>, JsonRejection>,
) -> Response {
    let ctx = RequestContext::new(&host);
    update_inner(app, ctx, id, payload, true).await
}

pub async fn destroy(State(app): State<AppState>, Path(id): Path<GameId>) -> Response {
    match app.game_service.delete_game(id).await {
        Ok(()) => (
            StatusCode::NO_CONTENT,
            Json(json!({ "message": "Juego eliminado exitosamente" })),
        )
            .into_response(),
        Err(e) => write_failure("Error al eliminar el juego", service_error_detail(&e)),
    }
}

pub async fn stats(State(app): State<AppState>) -> Result<Json<StatsJson>, ServiceError> {
    let stats = app.game_service.get_stats().await?;
    Ok(Json(StatsJson::from_stats(&stats)))
}

pub async fn platforms(State(app): State<AppState>) -> Result<Json<Vec<String>>, ServiceError> {
    let platforms = app.game_service.list_platforms().await?;
    Ok(Json(platforms))
}

pub async fn genres(State(app): State<AppState>) -> Result<Json<Vec<String>>, ServiceError> {
    let genres = app.game_service.list_genres().await?;
    Ok(Json(genres))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn sample_game() -> Game {
        Game {
            id: 7,
            name: "Outer Wilds".to_string(),
            description: Some("Space exploration loop".to_string()),
            platform: "PC".to_string(),
            status: GameStatus::Completed,
            genre: GameGenre::Adventure,
            image: Some("covers/outer-wilds.jpg".to_string()),
            release_date: NaiveDate::from_ymd_opt(2019, 5, 28),
            hours_played: 22,
            rating: Some(10),
            created_at: Utc.timestamp_millis_opt(1_700_000_000_000).unwrap(),
            updated_at: Utc.timestamp_millis_opt(1_700_000_100_000).unwrap(),
        }
    }

    fn ctx() -> RequestContext {
        RequestContext::new("example.com")
    }

    #[test]
    fn test_list_projection_omits_description() {
        let game = sample_game();
        let detail = serde_json::to_value(GameDetailJson::from_game(&game, &ctx())).unwrap();
        let item = serde_json::to_value(GameListItemJson::from_game(&game, &ctx())).unwrap();

        assert_eq!(detail["descripcion"], "Space exploration loop");
        assert!(item.get("descripcion").is_none());
        assert!(item.get("imagen").is_none());
        assert!(item.get("fecha_actualizacion").is_none());
        assert_eq!(item["nombre"], "Outer Wilds");
    }

    #[test]
    fn test_detail_projection_fields() {
        let detail = serde_json::to_value(GameDetailJson::from_game(&sample_game(), &ctx())).unwrap();
        assert_eq!(detail["estado"], "completed");
        assert_eq!(detail["estado_display"], "Completed");
        assert_eq!(detail["estado_color"], "success");
        assert_eq!(detail["genero"], "adventure");
        assert_eq!(detail["genero_display"], "Adventure");
        assert_eq!(detail["calificacion_estrellas"], 10);
        assert_eq!(detail["fecha_lanzamiento"], "2019-05-28");
    }

    #[test]
    fn test_image_url_built_from_host() {
        let item = serde_json::to_value(GameListItemJson::from_game(&sample_game(), &ctx())).unwrap();
        assert_eq!(
            item["imagen_url"],
            "http://example.com/media/covers/outer-wilds.jpg"
        );

        let mut game = sample_game();
        game.image = None;
        let item = serde_json::to_value(GameListItemJson::from_game(&game, &ctx())).unwrap();
        assert_eq!(item["imagen_url"], Value::Null);
    }

    #[test]
    fn test_stars_default_to_zero_without_rating() {
        let mut game = sample_game();
        game.rating = None;
        game.status = GameStatus::Playing;
        let detail = serde_json::to_value(GameDetailJson::from_game(&game, &ctx())).unwrap();
        assert_eq!(detail["calificacion"], Value::Null);
        assert_eq!(detail["calificacion_estrellas"], 0);
    }

    #[test]
    fn test_lenient_int_parse() {
        assert_eq!(parse_int_param(Some("7")), Some(7));
        assert_eq!(parse_int_param(Some(" 7 ")), Some(7));
        assert_eq!(parse_int_param(Some("abc")), None);
        assert_eq!(parse_int_param(Some("")), None);
        assert_eq!(parse_int_param(None), None);
    }

    #[test]
    fn test_malformed_rating_filter_is_dropped() {
        let params = GameListParams {
            calificacion_min: Some("abc".to_string()),
            ..Default::default()
        };
        let query = build_query(&params);
        assert_eq!(query.rating_min, None);

        let params = GameListParams::default();
        assert_eq!(build_query(&params).rating_min, query.rating_min);
    }

    #[test]
    fn test_ordering_parse() {
        assert_eq!(
            parse_ordering(Some("-fecha_creacion")),
            (SortOrder::Descending, GameSortBy::CreatedAt)
        );
        assert_eq!(
            parse_ordering(Some("nombre")),
            (SortOrder::Ascending, GameSortBy::Name)
        );
        assert_eq!(
            parse_ordering(Some("-horas_jugadas")),
            (SortOrder::Descending, GameSortBy::HoursPlayed)
        );
        // Unknown fields fall back to the default ordering.
        assert_eq!(
            parse_ordering(Some("bogus")),
            (SortOrder::Descending, GameSortBy::CreatedAt)
        );
        assert_eq!(
            parse_ordering(None),
            (SortOrder::Descending, GameSortBy::CreatedAt)
        );
    }

    #[test]
    fn test_page_parse() {
        assert_eq!(parse_page(None), Some(1));
        assert_eq!(parse_page(Some("3")), Some(3));
        assert_eq!(parse_page(Some("0")), None);
        assert_eq!(parse_page(Some("abc")), None);
    }

    #[test]
    fn test_page_size_bounds() {
        assert_eq!(parse_page_size(None), 10);
        assert_eq!(parse_page_size(Some("25")), 25);
        assert_eq!(parse_page_size(Some("500")), 100);
        assert_eq!(parse_page_size(Some("abc")), 10);
        assert_eq!(parse_page_size(Some("0")), 10);
    }

    #[test]
    fn test_page_links_echo_filters() {
        let params = GameListParams {
            estado: Some("playing".to_string()),
            page_size: Some("5".to_string()),
            ..Default::default()
        };
        assert_eq!(
            page_link(&ctx(), &params, 3),
            "http://example.com/games/?estado=playing&page_size=5&page=3"
        );
        // Page one keeps the bare URL.
        assert_eq!(
            page_link(&ctx(), &params, 1),
            "http://example.com/games/?estado=playing&page_size=5"
        );
    }

    #[test]
    fn test_page_links_encode_filter_values() {
        let params = GameListParams {
            plataforma: Some("sony playstation 5".to_string()),
            ..Default::default()
        };
        assert_eq!(
            page_link(&ctx(), &params, 2),
            "http://example.com/games/?plataforma=sony+playstation+5&page=2"
        );

        let params = GameListParams {
            search: Some("tom & jerry=1+1".to_string()),
            ..Default::default()
        };
        assert_eq!(
            page_link(&ctx(), &params, 2),
            "http://example.com/games/?search=tom+%26+jerry%3D1%2B1&page=2"
        );
    }

    #[test]
    fn test_write_failure_detail_is_bare_message() {
        let error = ServiceError::NotFound("No Game matches the given query.".to_string());
        assert_eq!(
            service_error_detail(&error),
            json!("No Game matches the given query.")
        );
    }

    #[test]
    fn test_blank_params_are_ignored() {
        let params = GameListParams {
            estado: Some("".to_string()),
            plataforma: Some("  ".to_string()),
            search: Some("zelda".to_string()),
            ..Default::default()
        };
        let query = build_query(&params);
        assert_eq!(query.status, None);
        assert_eq!(query.platform, None);
        assert_eq!(query.search.as_deref(), Some("zelda"));
    }
}
