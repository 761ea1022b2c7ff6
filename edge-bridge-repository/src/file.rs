//! File repository: downloaded files keyed by name.

use edge_bridge_error::StorageResult;
use edge_bridge_models::entities::file_info;
use edge_bridge_models::FileInfo;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryOrder, Set};
use tracing::debug;

pub struct FileRepository {
    conn: DatabaseConnection,
}

impl FileRepository {
    pub fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Upsert a file record.
    pub async fn store(&self, info: &FileInfo) -> StorageResult<()> {
        if self.contains(&info.name).await? {
            file_info::Entity::delete_by_id(info.name.as_str())
                .exec(&self.conn)
                .await?;
        }
        file_info::ActiveModel {
            name: Set(info.name.clone()),
            hash: Set(info.hash.clone()),
            path: Set(info.path.clone()),
        }
        .insert(&self.conn)
        .await?;
        debug!(file = %info.name, "File info stored");
        Ok(())
    }

    pub async fn get_file_info(&self, name: &str) -> StorageResult<Option<FileInfo>> {
        let row = file_info::Entity::find_by_id(name).one(&self.conn).await?;
        Ok(row.map(|r| FileInfo {
            name: r.name,
            hash: r.hash,
            path: r.path,
        }))
    }

    pub async fn get_all_file_names(&self) -> StorageResult<Vec<String>> {
        let rows = file_info::Entity::find()
            .order_by_asc(file_info::Column::Name)
            .all(&self.conn)
            .await?;
        Ok(rows.into_iter().map(|r| r.name).collect())
    }

    pub async fn contains(&self, name: &str) -> StorageResult<bool> {
        Ok(file_info::Entity::find_by_id(name)
            .count(&self.conn)
            .await?
            > 0)
    }

    pub async fn remove(&self, name: &str) -> StorageResult<()> {
        file_info::Entity::delete_by_id(name).exec(&self.conn).await?;
        Ok(())
    }

    pub async fn remove_all(&self) -> StorageResult<()> {
        file_info::Entity::delete_many().exec(&self.conn).await?;
        Ok(())
    }
}
