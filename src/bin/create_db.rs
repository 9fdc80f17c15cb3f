use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

fn main() {
    dotenvy::dotenv().ok();

    let games_db_sql = "CREATE TABLE games (
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

    let db_path = std::env::var("LUDOTECA_DB").expect("LUDOTECA_DB env var not set");
    let parent = std::path::Path::new(&db_path)
        .parent()
        .expect("Failed to get parent directory of DB path");
    if !parent.exists() {
        std::fs::create_dir_all(parent).expect("Failed to create parent directory for DB");
        println!("Created parent directory for DB at {}", parent.display());
    }

    if std::path::Path::new(&db_path).exists() {
        std::fs::remove_file(&db_path).expect("Failed to remove existing DB");
        println!("Removed existing DB at {}", db_path);
    }

    let manager = SqliteConnectionManager::file(&db_path);
    let pool = Pool::builder()
        .max_size(5)
        .build(manager)
        .expect("Failed to create DB pool");
    let conn = pool.get().expect("Failed to get DB connection");
    conn.execute_batch(games_db_sql)
        .expect("Failed to create games table");

    println!("Created new games DB at {}", db_path);
}
