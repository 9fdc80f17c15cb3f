use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;

use crate::DatabaseError;

pub mod games;

pub type DatabaseResult<T> = Result<T, DatabaseError>;

pub fn get_connection(
    pool: &Pool<SqliteConnectionManager>,
) -> DatabaseResult<PooledConnection<SqliteConnectionManager>> {
    pool.get().map_err(DatabaseError::ConnectionError)
}
