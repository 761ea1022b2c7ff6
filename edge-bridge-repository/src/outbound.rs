//! Persistence backing the platform-bound publish queue.
//!
//! Rows keep enqueue order; a row is deleted only after the broker accepts
//! the publish, so pending messages survive restarts.

use async_trait::async_trait;
use chrono::Utc;
use edge_bridge_error::StorageResult;
use edge_bridge_models::entities::outbound_message;
use edge_bridge_models::Message;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, QueryOrder, Set};

#[derive(Clone, Debug)]
pub struct PersistedMessage {
    pub id: i64,
    pub message: Message,
}

/// Seam between the publishing service and its backing store, so the
/// device-side publisher can run without one and tests can substitute an
/// in-memory fake.
#[async_trait]
pub trait MessagePersistence: Send + Sync {
    /// Append a message; returns its persistence id.
    async fn push(&self, message: &Message) -> StorageResult<i64>;

    /// All pending messages in enqueue order.
    async fn load_all(&self) -> StorageResult<Vec<PersistedMessage>>;

    /// Delete one message after a successful publish.
    async fn remove(&self, id: i64) -> StorageResult<()>;
}

pub struct OutboundMessageStore {
    conn: DatabaseConnection,
}

impl OutboundMessageStore {
    pub fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl MessagePersistence for OutboundMessageStore {
    async fn push(&self, message: &Message) -> StorageResult<i64> {
        let inserted = outbound_message::ActiveModel {
            channel: Set(message.channel.clone()),
            content: Set(message.content.to_vec()),
            enqueued_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(&self.conn)
        .await?;
        Ok(inserted.id)
    }

    async fn load_all(&self) -> StorageResult<Vec<PersistedMessage>> {
        let rows = outbound_message::Entity::find()
            .order_by_asc(outbound_message::Column::Id)
            .all(&self.conn)
            .await?;
        Ok(rows
            .into_iter()
            .map(|r| PersistedMessage {
                id: r.id,
                message: Message::new(r.channel, r.content),
            })
            .collect())
    }

    async fn remove(&self, id: i64) -> StorageResult<()> {
        outbound_message::Entity::delete_by_id(id)
            .exec(&self.conn)
            .await?;
        Ok(())
    }
}
