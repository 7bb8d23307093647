use sqlx::Row;

use tendero_core::domain::message::{Message, MessageId, MessageKind, OrderSnapshot, Sender};
use tendero_core::domain::order::OrderStatus;

use super::{
    decode_error, parse_timestamp, timestamp_to_text, ConversationLog, MessageFilter,
    RepositoryError,
};
use crate::DbPool;

pub struct SqlConversationLog {
    pool: DbPool,
}

impl SqlConversationLog {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_message(row: &sqlx::sqlite::SqliteRow) -> Result<Message, RepositoryError> {
    let id: String = row.try_get("id").map_err(decode_error)?;
    let chat_id: String = row.try_get("chat_id").map_err(decode_error)?;
    let sender: String = row.try_get("sender").map_err(decode_error)?;
    let text: String = row.try_get("text").map_err(decode_error)?;
    let created_at: String = row.try_get("created_at").map_err(decode_error)?;
    let order_status: Option<String> = row.try_get("order_status").map_err(decode_error)?;
    let message_kind: Option<String> = row.try_get("message_kind").map_err(decode_error)?;
    let metadata_json: Option<String> = row.try_get("metadata_json").map_err(decode_error)?;

    let sender = Sender::parse(&sender)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown sender `{sender}`")))?;
    let order_status = order_status
        .map(|raw| {
            OrderStatus::parse(&raw)
                .ok_or_else(|| RepositoryError::Decode(format!("unknown order status `{raw}`")))
        })
        .transpose()?;

    // A corrupted payload must not take the whole history down with it; the message keeps its
    // status tag and reconstruction treats it as unusable.
    let metadata = metadata_json.and_then(|raw| match OrderSnapshot::from_json(&raw) {
        Ok(snapshot) => Some(snapshot),
        Err(error) => {
            tracing::warn!(
                event_name = "conversation.metadata_corrupted",
                message_id = %id,
                chat_id = %chat_id,
                error = %error,
                "discarding unreadable order metadata"
            );
            None
        }
    });

    Ok(Message {
        id: MessageId(id),
        chat_id,
        sender,
        text,
        timestamp: parse_timestamp(&created_at)?,
        order_status,
        kind: message_kind.as_deref().and_then(MessageKind::parse),
        metadata,
    })
}

#[async_trait::async_trait]
impl ConversationLog for SqlConversationLog {
    async fn append_message(&self, message: Message) -> Result<Message, RepositoryError> {
        message.validate()?;
        let metadata_json = message.metadata.as_ref().map(OrderSnapshot::to_json).transpose()?;

        sqlx::query(
            "INSERT INTO conversation_message
                (id, chat_id, sender, text, created_at, order_status, message_kind, metadata_json)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&message.id.0)
        .bind(&message.chat_id)
        .bind(message.sender.as_str())
        .bind(&message.text)
        .bind(timestamp_to_text(&message.timestamp))
        .bind(message.order_status.map(OrderStatus::as_str))
        .bind(message.kind.map(MessageKind::as_str))
        .bind(&metadata_json)
        .execute(&self.pool)
        .await?;

        Ok(message)
    }

    async fn latest_messages(
        &self,
        chat_id: &str,
        limit: u32,
        filter: MessageFilter,
    ) -> Result<Vec<Message>, RepositoryError> {
        let (clause, sender) = match filter {
            MessageFilter::All => ("", None),
            MessageFilter::WithOrderStatus => (" AND order_status IS NOT NULL", None),
            MessageFilter::FromSender(sender) => (" AND sender = ?", Some(sender.as_str())),
        };
        let sql = format!(
            "SELECT id, chat_id, sender, text, created_at, order_status, message_kind, metadata_json
             FROM conversation_message
             WHERE chat_id = ?{clause}
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?"
        );

        let mut query = sqlx::query(&sql).bind(chat_id);
        if let Some(sender) = sender {
            query = query.bind(sender);
        }
        let rows = query.bind(i64::from(limit)).fetch_all(&self.pool).await?;

        rows.iter().map(row_to_message).collect()
    }
}
