use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use log::info;
use serde::{Deserialize, Deserializer, Serialize};

use crate::{
    ArcGameRepository, ServiceError, ServiceResult,
    validation::validate_payload,
};

pub type GameId = i64;

/// Completion state of a catalog entry. Transitions are unrestricted; the
/// only enforced rule is that a completed game has at least one hour played.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GameStatus {
    #[default]
    NotStarted,
    Playing,
    Completed,
    Abandoned,
}

impl GameStatus {
    pub fn token(&self) -> &'static str {
        match self {
            GameStatus::NotStarted => "not-started",
            GameStatus::Playing => "playing",
            GameStatus::Completed => "completed",
            GameStatus::Abandoned => "abandoned",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "not-started" => Some(GameStatus::NotStarted),
            "playing" => Some(GameStatus::Playing),
            "completed" => Some(GameStatus::Completed),
            "abandoned" => Some(GameStatus::Abandoned),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            GameStatus::NotStarted => "Not Started",
            GameStatus::Playing => "Playing",
            GameStatus::Completed => "Completed",
            GameStatus::Abandoned => "Abandoned",
        }
    }

    /// CSS-class-like color token used by the frontend badges.
    pub fn color(&self) -> &'static str {
        match self {
            GameStatus::NotStarted => "secondary",
            GameStatus::Playing => "primary",
            GameStatus::Completed => "success",
            GameStatus::Abandoned => "danger",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameGenre {
    #[default]
    Rpg,
    Action,
    Adventure,
    Strategy,
    Sports,
    Other,
}

impl GameGenre {
    pub fn token(&self) -> &'static str {
        match self {
            GameGenre::Rpg => "rpg",
            GameGenre::Action => "action",
            GameGenre::Adventure => "adventure",
            GameGenre::Strategy => "strategy",
            GameGenre::Sports => "sports",
            GameGenre::Other => "other",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "rpg" => Some(GameGenre::Rpg),
            "action" => Some(GameGenre::Action),
            "adventure" => Some(GameGenre::Adventure),
            "strategy" => Some(GameGenre::Strategy),
            "sports" => Some(GameGenre::Sports),
            "other" => Some(GameGenre::Other),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            GameGenre::Rpg => "RPG",
            GameGenre::Action => "Action",
            GameGenre::Adventure => "Adventure",
            GameGenre::Strategy => "Strategy",
            GameGenre::Sports => "Sports",
            GameGenre::Other => "Other",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Game {
    pub id: GameId,
    pub name: String,
    pub description: Option<String>,
    pub platform: String,
    pub status: GameStatus,
    pub genre: GameGenre,
    pub image: Option<String>,
    pub release_date: Option<NaiveDate>,
    pub hours_played: u32,
    pub rating: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Game {
    pub fn rating_as_stars(&self) -> i32 {
        self.rating.unwrap_or(0)
    }

    /// Save-path guards, independent from payload validation: a completed
    /// game is bumped to one hour, an out-of-range stored rating is nulled.
    pub fn apply_save_guards(&mut self) {
        if self.status == GameStatus::Completed && self.hours_played == 0 {
            self.hours_played = 1;
        }
        if let Some(rating) = self.rating {
            if !(1..=10).contains(&rating) {
                self.rating = None;
            }
        }
    }
}

fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Deserialize::deserialize(deserializer).map(Some)
}

/// Incoming write payload. Every field is optional; nullable fields use a
/// nested `Option` so that an explicit `null` clears the stored value while
/// an absent key leaves it untouched.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct GamePayload {
    #[serde(rename = "nombre")]
    pub name: Option<String>,
    #[serde(rename = "descripcion", deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    #[serde(rename = "plataforma")]
    pub platform: Option<String>,
    #[serde(rename = "estado")]
    pub status: Option<GameStatus>,
    #[serde(rename = "genero")]
    pub genre: Option<GameGenre>,
    #[serde(rename = "imagen", deserialize_with = "double_option")]
    pub image: Option<Option<String>>,
    #[serde(rename = "fecha_lanzamiento", deserialize_with = "double_option")]
    pub release_date: Option<Option<NaiveDate>>,
    #[serde(rename = "horas_jugadas")]
    pub hours_played: Option<u32>,
    #[serde(rename = "calificacion", deserialize_with = "double_option")]
    pub rating: Option<Option<i32>>,
}

impl GamePayload {
    /// Copies the provided fields onto the record, leaving absent ones as-is.
    pub fn apply_to(&self, game: &mut Game) {
        if let Some(name) = &self.name {
            game.name = name.clone();
        }
        if let Some(description) = &self.description {
            game.description = description.clone();
        }
        if let Some(platform) = &self.platform {
            game.platform = platform.clone();
        }
        if let Some(status) = self.status {
            game.status = status;
        }
        if let Some(genre) = self.genre {
            game.genre = genre;
        }
        if let Some(image) = &self.image {
            game.image = image.clone();
        }
        if let Some(release_date) = self.release_date {
            game.release_date = release_date;
        }
        if let Some(hours_played) = self.hours_played {
            game.hours_played = hours_played;
        }
        if let Some(rating) = self.rating {
            game.rating = rating;
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GameSortBy {
    Name,
    CreatedAt,
    Rating,
    HoursPlayed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Pagination {
    pub offset: Option<usize>,
    pub limit: Option<usize>,
}

/// Filter set for the collection read. All present filters are AND-combined;
/// status/genre match the raw token (an unknown token matches nothing).
#[derive(Clone, Debug, Default)]
pub struct GameQuery {
    pub status: Option<String>,
    pub genre: Option<String>,
    pub platform: Option<String>,
    pub rating_min: Option<i64>,
    pub hours_min: Option<i64>,
    pub search: Option<String>,
    pub sort: Option<(SortOrder, GameSortBy)>,
    pub pagination: Pagination,
}

#[derive(Clone, Debug)]
pub struct GamePage {
    pub items: Vec<Game>,
    pub total: usize,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct GameStats {
    pub total: i64,
    pub completed: i64,
    pub playing: i64,
    pub not_started: i64,
    pub abandoned: i64,
    pub total_hours: i64,
    pub avg_rating: f64,
}

pub trait GameRepository {
    fn insert(&self, game: &Game) -> ServiceResult<GameId>;
    fn fetch(&self, id: GameId) -> ServiceResult<Option<Game>>;
    fn update(&self, game: &Game) -> ServiceResult<()>;
    fn delete(&self, id: GameId) -> ServiceResult<bool>;
    fn query(&self, query: &GameQuery) -> ServiceResult<GamePage>;
    fn stats(&self) -> ServiceResult<GameStats>;
    fn distinct_platforms(&self) -> ServiceResult<Vec<String>>;
    fn distinct_genres(&self) -> ServiceResult<Vec<String>>;
}

#[async_trait]
pub trait GameService {
    async fn list_games(&self, query: GameQuery) -> ServiceResult<GamePage>;
    async fn get_game(&self, id: GameId) -> ServiceResult<Game>;
    async fn create_game(&self, payload: GamePayload) -> ServiceResult<Game>;
    async fn update_game(
        &self,
        id: GameId,
        payload: GamePayload,
        partial: bool,
    ) -> ServiceResult<Game>;
    async fn delete_game(&self, id: GameId) -> ServiceResult<()>;
    async fn get_stats(&self) -> ServiceResult<GameStats>;
    async fn list_platforms(&self) -> ServiceResult<Vec<String>>;
    async fn list_genres(&self) -> ServiceResult<Vec<String>>;
}

/// Timestamps are persisted with millisecond precision; generate them the
/// same way so a record reads back exactly as it was written.
fn now_millis() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
}

pub struct GameServiceImpl {
    game_repository: ArcGameRepository,
}

impl GameServiceImpl {
    pub fn new(game_repository: ArcGameRepository) -> Self {
        Self { game_repository }
    }

    fn fetch_existing(&self, id: GameId) -> ServiceResult<Game> {
        match self.game_repository.fetch(id)? {
            Some(game) => Ok(game),
            None => ServiceError::not_found("No Game matches the given query."),
        }
    }
}

#[async_trait]
impl GameService for GameServiceImpl {
    async fn list_games(&self, query: GameQuery) -> ServiceResult<GamePage> {
        self.game_repository.query(&query)
    }

    async fn get_game(&self, id: GameId) -> ServiceResult<Game> {
        self.fetch_existing(id)
    }

    async fn create_game(&self, mut payload: GamePayload) -> ServiceResult<Game> {
        validate_payload(&mut payload, true).map_err(ServiceError::Validation)?;

        let now = now_millis();
        let mut game = Game {
            id: 0,
            name: String::new(),
            description: None,
            platform: String::new(),
            status: GameStatus::default(),
            genre: GameGenre::default(),
            image: None,
            release_date: None,
            hours_played: 0,
            rating: None,
            created_at: now,
            updated_at: now,
        };
        payload.apply_to(&mut game);
        game.apply_save_guards();

        game.id = self.game_repository.insert(&game)?;
        info!("Created game {} ({})", game.id, game.name);
        Ok(game)
    }

    async fn update_game(
        &self,
        id: GameId,
        mut payload: GamePayload,
        partial: bool,
    ) -> ServiceResult<Game> {
        let mut game = self.fetch_existing(id)?;
        validate_payload(&mut payload, !partial).map_err(ServiceError::Validation)?;

        payload.apply_to(&mut game);
        game.updated_at = now_millis();
        game.apply_save_guards();

        self.game_repository.update(&game)?;
        Ok(game)
    }

    async fn delete_game(&self, id: GameId) -> ServiceResult<()> {
        if !self.game_repository.delete(id)? {
            return ServiceError::not_found("No Game matches the given query.");
        }
        info!("Deleted game {}", id);
        Ok(())
    }

    async fn get_stats(&self) -> ServiceResult<GameStats> {
        let mut stats = self.game_repository.stats()?;
        stats.avg_rating = (stats.avg_rating * 10.0).round() / 10.0;
        Ok(stats)
    }

    async fn list_platforms(&self) -> ServiceResult<Vec<String>> {
        self.game_repository.distinct_platforms()
    }

    async fn list_genres(&self) -> ServiceResult<Vec<String>> {
        self.game_repository.distinct_genres()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::TimeZone;

    use crate::persistence::games::GameRepositoryImpl;

    use super::*;

    fn service() -> GameServiceImpl {
        let repo: ArcGameRepository = Arc::new(Box::new(GameRepositoryImpl::in_memory()));
        GameServiceImpl::new(repo)
    }

    fn payload(name: &str, platform: &str) -> GamePayload {
        GamePayload {
            name: Some(name.to_string()),
            platform: Some(platform.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_save_guards_bump_completed_hours() {
        let mut game = Game {
            id: 1,
            name: "Hollow Knight".to_string(),
            description: None,
            platform: "Switch".to_string(),
            status: GameStatus::Completed,
            genre: GameGenre::Action,
            image: None,
            release_date: None,
            hours_played: 0,
            rating: None,
            created_at: Utc.timestamp_millis_opt(0).unwrap(),
            updated_at: Utc.timestamp_millis_opt(0).unwrap(),
        };
        game.apply_save_guards();
        assert_eq!(game.hours_played, 1);
    }

    #[test]
    fn test_save_guards_null_invalid_rating() {
        let mut game = Game {
            id: 1,
            name: "Hollow Knight".to_string(),
            description: None,
            platform: "Switch".to_string(),
            status: GameStatus::Playing,
            genre: GameGenre::Action,
            image: None,
            release_date: None,
            hours_played: 4,
            rating: Some(15),
            created_at: Utc.timestamp_millis_opt(0).unwrap(),
            updated_at: Utc.timestamp_millis_opt(0).unwrap(),
        };
        game.apply_save_guards();
        assert_eq!(game.rating, None);

        game.rating = Some(10);
        game.apply_save_guards();
        assert_eq!(game.rating, Some(10));
    }

    #[tokio::test]
    async fn test_create_and_read_back_round_trip() {
        let service = service();
        let mut p = payload("  Elden Ring  ", " PC ");
        p.hours_played = Some(12);
        p.rating = Some(Some(9));

        let created = service.create_game(p).await.unwrap();
        assert_eq!(created.name, "Elden Ring");
        assert_eq!(created.platform, "PC");

        let fetched = service.get_game(created.id).await.unwrap();
        assert_eq!(fetched, created);
    }

    #[tokio::test]
    async fn test_create_rejects_short_name() {
        let service = service();
        let err = service.create_game(payload("A", "PC")).await.unwrap_err();
        match err {
            ServiceError::Validation(errors) => {
                assert!(errors.errors().keys().any(|k| {
                    let k: &str = k.as_ref();
                    k == "nombre"
                }));
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_partial_update_merges_fields() {
        let service = service();
        let created = service.create_game(payload("Celeste", "Switch")).await.unwrap();

        let patch = GamePayload {
            status: Some(GameStatus::Playing),
            hours_played: Some(3),
            ..Default::default()
        };
        let updated = service.update_game(created.id, patch, true).await.unwrap();
        assert_eq!(updated.name, "Celeste");
        assert_eq!(updated.status, GameStatus::Playing);
        assert_eq!(updated.hours_played, 3);
        assert_eq!(updated.created_at, created.created_at);
    }

    #[tokio::test]
    async fn test_full_update_requires_name_and_platform() {
        let service = service();
        let created = service.create_game(payload("Celeste", "Switch")).await.unwrap();

        let patch = GamePayload {
            status: Some(GameStatus::Playing),
            ..Default::default()
        };
        let err = service
            .update_game(created.id, patch, false)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[tokio::test]
    async fn test_update_missing_game_is_not_found() {
        let service = service();
        let err = service
            .update_game(999, payload("Celeste", "Switch"), true)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_game() {
        let service = service();
        let created = service.create_game(payload("Celeste", "Switch")).await.unwrap();

        service.delete_game(created.id).await.unwrap();
        let err = service.get_game(created.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));

        let err = service.delete_game(created.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_explicit_null_clears_rating() {
        let service = service();
        let mut p = payload("Celeste", "Switch");
        p.rating = Some(Some(8));
        let created = service.create_game(p).await.unwrap();
        assert_eq!(created.rating, Some(8));

        let patch = GamePayload {
            rating: Some(None),
            ..Default::default()
        };
        let updated = service.update_game(created.id, patch, true).await.unwrap();
        assert_eq!(updated.rating, None);
    }

    #[tokio::test]
    async fn test_stats_aggregate_hours_and_average() {
        let service = service();
        for (hours, rating) in [(3, Some(8)), (0, None), (7, Some(10))] {
            let mut p = payload("Some Game", "PC");
            p.hours_played = Some(hours);
            p.rating = Some(rating);
            service.create_game(p).await.unwrap();
        }

        let stats = service.get_stats().await.unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.not_started, 3);
        assert_eq!(stats.completed, 0);
        assert_eq!(stats.total_hours, 10);
        assert_eq!(stats.avg_rating, 9.0);
    }

    #[tokio::test]
    async fn test_stats_average_is_rounded() {
        let service = service();
        for rating in [7, 8, 8] {
            let mut p = payload("Some Game", "PC");
            p.rating = Some(Some(rating));
            service.create_game(p).await.unwrap();
        }

        let stats = service.get_stats().await.unwrap();
        assert_eq!(stats.avg_rating, 7.7);
    }

    #[tokio::test]
    async fn test_stats_empty_collection() {
        let service = service();
        let stats = service.get_stats().await.unwrap();
        assert_eq!(stats.total, 0);
        assert_eq!(stats.total_hours, 0);
        assert_eq!(stats.avg_rating, 0.0);
    }

    #[tokio::test]
    async fn test_distinct_platforms_deduplicated() {
        let service = service();
        for platform in ["PC", "Switch", "PC"] {
            service.create_game(payload("Some Game", platform)).await.unwrap();
        }

        let mut platforms = service.list_platforms().await.unwrap();
        platforms.sort();
        assert_eq!(platforms, vec!["PC".to_string(), "Switch".to_string()]);
    }

    #[tokio::test]
    async fn test_default_ordering_newest_first() {
        let service = service();
        let mut ids = Vec::new();
        for name in ["First", "Second", "Third"] {
            ids.push(service.create_game(payload(name, "PC")).await.unwrap().id);
        }

        let page = service.list_games(GameQuery::default()).await.unwrap();
        let listed: Vec<GameId> = page.items.iter().map(|g| g.id).collect();
        ids.reverse();
        assert_eq!(listed, ids);
        assert_eq!(page.total, 3);
    }
}
