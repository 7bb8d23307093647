use std::collections::BTreeMap;

use sqlx::Row;

use tendero_core::domain::message::PersistedLineItem;
use tendero_core::domain::order::{CustomerSlots, LineItem, Order, OrderId, OrderStatus};

use super::{decode_error, parse_timestamp, timestamp_to_text, OrderRepository, RepositoryError};
use crate::DbPool;

pub struct SqlOrderRepository {
    pool: DbPool,
}

impl SqlOrderRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn encode_line_items(order: &Order) -> Result<String, RepositoryError> {
    let items = order.line_items.iter().map(PersistedLineItem::from).collect::<Vec<_>>();
    serde_json::to_string(&items).map_err(|error| RepositoryError::Decode(error.to_string()))
}

fn encode_customer(order: &Order) -> Result<String, RepositoryError> {
    serde_json::to_string(&order.customer.to_key_map())
        .map_err(|error| RepositoryError::Decode(error.to_string()))
}

fn row_to_order(row: &sqlx::sqlite::SqliteRow) -> Result<Order, RepositoryError> {
    let id: String = row.try_get("id").map_err(decode_error)?;
    let chat_id: String = row.try_get("chat_id").map_err(decode_error)?;
    let version: i64 = row.try_get("version").map_err(decode_error)?;
    let status: String = row.try_get("status").map_err(decode_error)?;
    let line_items_json: String = row.try_get("line_items_json").map_err(decode_error)?;
    let customer_json: String = row.try_get("customer_json").map_err(decode_error)?;
    let cancel_reason: Option<String> = row.try_get("cancel_reason").map_err(decode_error)?;
    let created_at: String = row.try_get("created_at").map_err(decode_error)?;
    let updated_at: String = row.try_get("updated_at").map_err(decode_error)?;

    let status = OrderStatus::parse(&status)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown order status `{status}`")))?;
    let items: Vec<PersistedLineItem> = serde_json::from_str(&line_items_json)
        .map_err(|error| RepositoryError::Decode(format!("line items for order {id}: {error}")))?;
    let customer: BTreeMap<String, String> = serde_json::from_str(&customer_json)
        .map_err(|error| RepositoryError::Decode(format!("customer for order {id}: {error}")))?;

    let order = Order {
        id: OrderId(id),
        chat_id,
        version,
        status,
        line_items: items.iter().map(LineItem::from).collect(),
        customer: CustomerSlots::from_key_map(&customer),
        cancel_reason,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    };
    order
        .check_invariants()
        .map_err(|error| RepositoryError::Decode(format!("order {}: {error}", order.id.0)))?;
    Ok(order)
}

fn is_unique_violation(error: &sqlx::Error) -> bool {
    matches!(error, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[async_trait::async_trait]
impl OrderRepository for SqlOrderRepository {
    async fn find_latest(&self, chat_id: &str) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, chat_id, version, status, line_items_json, customer_json, cancel_reason,
                    created_at, updated_at
             FROM customer_order
             WHERE chat_id = ?
             ORDER BY updated_at DESC, rowid DESC
             LIMIT 1",
        )
        .bind(chat_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_order).transpose()
    }

    async fn save(&self, order: &Order, expected_version: i64) -> Result<Order, RepositoryError> {
        if order.status == OrderStatus::None {
            return Err(RepositoryError::Decode(format!(
                "order {} has not been opened and cannot be stored",
                order.id.0
            )));
        }
        order
            .check_invariants()
            .map_err(|error| RepositoryError::Decode(format!("order {}: {error}", order.id.0)))?;

        let line_items_json = encode_line_items(order)?;
        let customer_json = encode_customer(order)?;
        let next_version = expected_version + 1;
        let conflict = || RepositoryError::VersionConflict {
            chat_id: order.chat_id.clone(),
            expected: expected_version,
        };

        if expected_version == 0 {
            let inserted = sqlx::query(
                "INSERT INTO customer_order
                    (id, chat_id, version, status, line_items_json, customer_json, cancel_reason,
                     created_at, updated_at)
                 VALUES (?, ?, 1, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&order.id.0)
            .bind(&order.chat_id)
            .bind(order.status.as_str())
            .bind(&line_items_json)
            .bind(&customer_json)
            .bind(&order.cancel_reason)
            .bind(timestamp_to_text(&order.created_at))
            .bind(timestamp_to_text(&order.updated_at))
            .execute(&self.pool)
            .await;

            match inserted {
                Ok(_) => {}
                // Another writer opened an order for this chat (or reused the id) first.
                Err(error) if is_unique_violation(&error) => return Err(conflict()),
                Err(error) => return Err(error.into()),
            }
        } else {
            let updated = sqlx::query(
                "UPDATE customer_order
                 SET version = ?, status = ?, line_items_json = ?, customer_json = ?,
                     cancel_reason = ?, updated_at = ?
                 WHERE id = ? AND version = ?",
            )
            .bind(next_version)
            .bind(order.status.as_str())
            .bind(&line_items_json)
            .bind(&customer_json)
            .bind(&order.cancel_reason)
            .bind(timestamp_to_text(&order.updated_at))
            .bind(&order.id.0)
            .bind(expected_version)
            .execute(&self.pool)
            .await;

            match updated {
                Ok(result) if result.rows_affected() == 1 => {}
                Ok(_) => return Err(conflict()),
                Err(error) if is_unique_violation(&error) => return Err(conflict()),
                Err(error) => return Err(error.into()),
            }
        }

        tracing::debug!(
            event_name = "order.saved",
            order_id = %order.id.0,
            chat_id = %order.chat_id,
            status = %order.status,
            version = next_version,
            "order persisted"
        );

        let mut saved = order.clone();
        saved.version = next_version;
        Ok(saved)
    }

    async fn retire_latest(&self, chat_id: &str, reason: &str) -> Result<u64, RepositoryError> {
        let retired = sqlx::query(
            "UPDATE customer_order
             SET status = 'cancelled', line_items_json = '[]', customer_json = '{}',
                 cancel_reason = ?, version = version + 1, updated_at = ?
             WHERE id = (
                 SELECT id FROM customer_order
                 WHERE chat_id = ?
                 ORDER BY updated_at DESC, rowid DESC
                 LIMIT 1
             )",
        )
        .bind(reason)
        .bind(timestamp_to_text(&chrono::Utc::now()))
        .bind(chat_id)
        .execute(&self.pool)
        .await?;

        tracing::warn!(
            event_name = "order.retired",
            chat_id = %chat_id,
            rows = retired.rows_affected(),
            reason = %reason,
            "latest order record retired"
        );
        Ok(retired.rows_affected())
    }
}
