mod migration;
mod sqlite;

use edge_bridge_error::BridgeResult;
use migration::{Migrator, MigratorTrait};
use sea_orm::DatabaseConnection;
use tracing::info;

/// Open (creating if necessary) the gateway database and bring the schema
/// up to date.
pub async fn open_database(path: &str) -> BridgeResult<DatabaseConnection> {
    let db = sqlite::init_db(path).await?;
    Migrator::up(&db, None).await?;
    info!("Database ready at {path}");
    Ok(db)
}

/// In-memory database for tests. A single pooled connection, otherwise
/// every checkout would see its own empty database.
pub async fn open_in_memory() -> BridgeResult<DatabaseConnection> {
    let db = sqlite::init_in_memory().await?;
    Migrator::up(&db, None).await?;
    Ok(db)
}
