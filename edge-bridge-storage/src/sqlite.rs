use edge_bridge_error::BridgeResult;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use std::time::Duration;
use tracing::info;

/// Initialize the SQLite database connection with auto-creation support.
/// `mode=rwc` creates the file on first use.
pub async fn init_db(path: &str) -> BridgeResult<DatabaseConnection> {
    let database_url = format!("sqlite://{path}?mode=rwc");

    let mut opts = ConnectOptions::new(&database_url);
    opts.connect_timeout(Duration::from_secs(5))
        .idle_timeout(Duration::from_secs(60))
        .max_connections(8)
        .sqlx_logging(false);

    info!("Connecting to SQLite database at: {path}");
    let db = Database::connect(opts).await?;

    // Performance-oriented PRAGMA settings without WAL, which stays off to
    // remain safe on network filesystems.
    {
        use sea_orm::{ConnectionTrait, DbBackend, Statement};
        let _ = db
            .execute(Statement::from_string(
                DbBackend::Sqlite,
                "PRAGMA synchronous=NORMAL;".to_string(),
            ))
            .await;
        let _ = db
            .execute(Statement::from_string(
                DbBackend::Sqlite,
                "PRAGMA temp_store=MEMORY;".to_string(),
            ))
            .await;
    }

    Ok(db)
}

pub async fn init_in_memory() -> BridgeResult<DatabaseConnection> {
    let mut opts = ConnectOptions::new("sqlite::memory:");
    opts.max_connections(1).sqlx_logging(false);
    Ok(Database::connect(opts).await?)
}
