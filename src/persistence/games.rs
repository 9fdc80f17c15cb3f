use chrono::{DateTime, NaiveDate, Utc};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{
    Row, ToSql,
    types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef},
};

use crate::{
    DatabaseError, ServiceResult,
    game::{
        Game, GameGenre, GameId, GamePage, GameQuery, GameRepository, GameSortBy, GameStats,
        GameStatus, SortOrder,
    },
    persistence::get_connection,
};

const GAMES_SCHEMA: &str = "CREATE TABLE IF NOT EXISTS games (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    description TEXT,
    platform TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'not-started',
    genre TEXT NOT NULL DEFAULT 'rpg',
    image TEXT,
    release_date TEXT,
    hours_played INTEGER NOT NULL DEFAULT 0,
    rating INTEGER,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);";

const GAME_COLUMNS: &str =
    "id, name, description, platform, status, genre, image, release_date, hours_played, rating, created_at, updated_at";

impl ToSql for GameStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.token()))
    }
}

impl FromSql for GameStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let token = value.as_str()?;
        GameStatus::from_token(token).ok_or_else(|| {
            FromSqlError::Other(format!("unknown status token: {}", token).into())
        })
    }
}

impl ToSql for GameGenre {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.token()))
    }
}

impl FromSql for GameGenre {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let token = value.as_str()?;
        GameGenre::from_token(token)
            .ok_or_else(|| FromSqlError::Other(format!("unknown genre token: {}", token).into()))
    }
}

fn row_to_game(row: &Row<'_>) -> rusqlite::Result<Game> {
    Ok(Game {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        platform: row.get(3)?,
        status: row.get(4)?,
        genre: row.get(5)?,
        image: row.get(6)?,
        // Tolerant read: a malformed stored date reads back as absent.
        release_date: row
            .get::<_, Option<String>>(7)?
            .and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok()),
        hours_played: row.get(8)?,
        rating: row.get(9)?,
        created_at: DateTime::from_timestamp_millis(row.get(10)?)
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
        updated_at: DateTime::from_timestamp_millis(row.get(11)?)
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
    })
}

fn build_filters(query: &GameQuery) -> (String, Vec<Box<dyn ToSql>>) {
    let mut conditions: Vec<&'static str> = Vec::new();
    let mut params: Vec<Box<dyn ToSql>> = Vec::new();

    if let Some(status) = &query.status {
        conditions.push("status = ?");
        params.push(Box::new(status.clone()));
    }
    if let Some(genre) = &query.genre {
        conditions.push("genre = ?");
        params.push(Box::new(genre.clone()));
    }
    if let Some(platform) = &query.platform {
        conditions.push("LOWER(platform) LIKE '%' || LOWER(?) || '%'");
        params.push(Box::new(platform.clone()));
    }
    if let Some(rating_min) = query.rating_min {
        conditions.push("rating >= ?");
        params.push(Box::new(rating_min));
    }
    if let Some(hours_min) = query.hours_min {
        conditions.push("hours_played >= ?");
        params.push(Box::new(hours_min));
    }
    if let Some(search) = &query.search {
        conditions.push(
            "(LOWER(name) LIKE '%' || LOWER(?) || '%' \
             OR LOWER(IFNULL(description, '')) LIKE '%' || LOWER(?) || '%' \
             OR LOWER(platform) LIKE '%' || LOWER(?) || '%')",
        );
        params.push(Box::new(search.clone()));
        params.push(Box::new(search.clone()));
        params.push(Box::new(search.clone()));
    }

    let where_sql = if conditions.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", conditions.join(" AND "))
    };
    (where_sql, params)
}

fn order_clause(sort: Option<(SortOrder, GameSortBy)>) -> String {
    let (order, sort_by) = sort.unwrap_or((SortOrder::Descending, GameSortBy::CreatedAt));
    let column = match sort_by {
        GameSortBy::Name => "name",
        GameSortBy::CreatedAt => "created_at",
        GameSortBy::Rating => "rating",
        GameSortBy::HoursPlayed => "hours_played",
    };
    let direction = match order {
        SortOrder::Ascending => "ASC",
        SortOrder::Descending => "DESC",
    };
    // Id as tie-breaker keeps same-millisecond inserts in a stable order.
    format!(" ORDER BY {} {}, id {}", column, direction, direction)
}

pub struct GameRepositoryImpl {
    pool: Pool<SqliteConnectionManager>,
}

impl GameRepositoryImpl {
    pub fn new() -> Self {
        let db_path = std::env::var("LUDOTECA_DB").expect("LUDOTECA_DB env var not set");
        let manager = SqliteConnectionManager::file(db_path);
        let pool = Pool::builder()
            .max_size(5)
            .build(manager)
            .expect("Failed to create DB pool");
        let conn = pool.get().expect("Failed to get DB connection");
        conn.execute_batch(GAMES_SCHEMA)
            .expect("Failed to ensure games table");
        drop(conn);
        Self { pool }
    }

    #[cfg(test)]
    pub fn in_memory() -> Self {
        // One pooled connection, otherwise each checkout would get its own
        // private in-memory database.
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .expect("Failed to create DB pool");
        let conn = pool.get().expect("Failed to get DB connection");
        conn.execute_batch(GAMES_SCHEMA)
            .expect("Failed to create games table");
        drop(conn);
        Self { pool }
    }
}

impl GameRepository for GameRepositoryImpl {
    fn insert(&self, game: &Game) -> ServiceResult<GameId> {
        let conn = get_connection(&self.pool)?;
        let release_date = game.release_date.map(|d| d.to_string());
        conn.execute(
            "INSERT INTO games (name, description, platform, status, genre, image, release_date, hours_played, rating, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            rusqlite::params![
                game.name,
                game.description,
                game.platform,
                game.status,
                game.genre,
                game.image,
                release_date,
                game.hours_played,
                game.rating,
                game.created_at.timestamp_millis(),
                game.updated_at.timestamp_millis(),
            ],
        )
        .map_err(DatabaseError::QueryError)?;
        Ok(conn.last_insert_rowid())
    }

    fn fetch(&self, id: GameId) -> ServiceResult<Option<Game>> {
        let conn = get_connection(&self.pool)?;
        let sql = format!("SELECT {} FROM games WHERE id = ?1", GAME_COLUMNS);
        match conn.query_row(&sql, [id], row_to_game) {
            Ok(game) => Ok(Some(game)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(DatabaseError::QueryError(e).into()),
        }
    }

    fn update(&self, game: &Game) -> ServiceResult<()> {
        let conn = get_connection(&self.pool)?;
        let release_date = game.release_date.map(|d| d.to_string());
        conn.execute(
            "UPDATE games SET name = ?1, description = ?2, platform = ?3, status = ?4, genre = ?5, image = ?6, release_date = ?7, hours_played = ?8, rating = ?9, updated_at = ?10 \
             WHERE id = ?11",
            rusqlite::params![
                game.name,
                game.description,
                game.platform,
                game.status,
                game.genre,
                game.image,
                release_date,
                game.hours_played,
                game.rating,
                game.updated_at.timestamp_millis(),
                game.id,
            ],
        )
        .map_err(DatabaseError::QueryError)?;
        Ok(())
    }

    fn delete(&self, id: GameId) -> ServiceResult<bool> {
        let conn = get_connection(&self.pool)?;
        let affected = conn
            .execute("DELETE FROM games WHERE id = ?1", [id])
            .map_err(DatabaseError::QueryError)?;
        Ok(affected > 0)
    }

    fn query(&self, query: &GameQuery) -> ServiceResult<GamePage> {
        let conn = get_connection(&self.pool)?;
        let (where_sql, mut params) = build_filters(query);

        let count_sql = format!("SELECT COUNT(*) FROM games{}", where_sql);
        let total: i64 = conn
            .query_row(
                &count_sql,
                rusqlite::params_from_iter(params.iter().map(|p| p.as_ref())),
                |row| row.get(0),
            )
            .map_err(DatabaseError::QueryError)?;

        let select_sql = format!(
            "SELECT {} FROM games{}{} LIMIT ? OFFSET ?",
            GAME_COLUMNS,
            where_sql,
            order_clause(query.sort),
        );
        // LIMIT -1 is "no limit" in SQLite.
        let limit = query.pagination.limit.map(|l| l as i64).unwrap_or(-1);
        let offset = query.pagination.offset.unwrap_or(0) as i64;
        params.push(Box::new(limit));
        params.push(Box::new(offset));

        let mut stmt = conn
            .prepare(&select_sql)
            .map_err(DatabaseError::QueryError)?;
        let items = stmt
            .query_map(
                rusqlite::params_from_iter(params.iter().map(|p| p.as_ref())),
                row_to_game,
            )
            .map_err(DatabaseError::QueryError)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(DatabaseError::QueryError)?;

        Ok(GamePage {
            items,
            total: total as usize,
        })
    }

    fn stats(&self) -> ServiceResult<GameStats> {
        let conn = get_connection(&self.pool)?;
        conn.query_row(
            "SELECT COUNT(*), \
             IFNULL(SUM(CASE WHEN status = 'completed' THEN 1 ELSE 0 END), 0), \
             IFNULL(SUM(CASE WHEN status = 'playing' THEN 1 ELSE 0 END), 0), \
             IFNULL(SUM(CASE WHEN status = 'not-started' THEN 1 ELSE 0 END), 0), \
             IFNULL(SUM(CASE WHEN status = 'abandoned' THEN 1 ELSE 0 END), 0), \
             IFNULL(SUM(hours_played), 0), \
             AVG(rating) \
             FROM games",
            [],
            |row| {
                Ok(GameStats {
                    total: row.get(0)?,
                    completed: row.get(1)?,
                    playing: row.get(2)?,
                    not_started: row.get(3)?,
                    abandoned: row.get(4)?,
                    total_hours: row.get(5)?,
                    avg_rating: row.get::<_, Option<f64>>(6)?.unwrap_or(0.0),
                })
            },
        )
        .map_err(|e| DatabaseError::QueryError(e).into())
    }

    fn distinct_platforms(&self) -> ServiceResult<Vec<String>> {
        let conn = get_connection(&self.pool)?;
        let mut stmt = conn
            .prepare("SELECT DISTINCT platform FROM games")
            .map_err(DatabaseError::QueryError)?;
        let platforms = stmt
            .query_map([], |row| row.get(0))
            .map_err(DatabaseError::QueryError)?
            .collect::<Result<Vec<String>, _>>()
            .map_err(DatabaseError::QueryError)?;
        Ok(platforms)
    }

    fn distinct_genres(&self) -> ServiceResult<Vec<String>> {
        let conn = get_connection(&self.pool)?;
        let mut stmt = conn
            .prepare("SELECT DISTINCT genre FROM games")
            .map_err(DatabaseError::QueryError)?;
        let genres = stmt
            .query_map([], |row| row.get(0))
            .map_err(DatabaseError::QueryError)?
            .collect::<Result<Vec<String>, _>>()
            .map_err(DatabaseError::QueryError)?;
        Ok(genres)
    }
}
