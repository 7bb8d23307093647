use chrono::Utc;
use uuid::Uuid;

use tendero_core::domain::order::{Order, OrderStatus};

use super::{timestamp_to_text, RepositoryError, SaleReceipt, SalesRecorder};
use crate::DbPool;

pub struct SqlSalesRecorder {
    pool: DbPool,
}

impl SqlSalesRecorder {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl SalesRecorder for SqlSalesRecorder {
    /// Writes the sale, its lines and the stock decrement in one transaction. Stock never goes
    /// below zero; overselling is tolerated and left for staff to reconcile.
    async fn record_sale(&self, order: &Order) -> Result<SaleReceipt, RepositoryError> {
        if order.status != OrderStatus::Closed {
            return Err(RepositoryError::Decode(format!(
                "order {} is {} and cannot be recorded as a sale",
                order.id.0, order.status
            )));
        }

        let sale_id = Uuid::new_v4().to_string();
        let recorded_at = Utc::now();
        let total = order.total();
        let customer_json = serde_json::to_string(&order.customer.to_key_map())
            .map_err(|error| RepositoryError::Decode(error.to_string()))?;

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO sale (id, order_id, chat_id, total, customer_json, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&sale_id)
        .bind(&order.id.0)
        .bind(&order.chat_id)
        .bind(total.to_string())
        .bind(&customer_json)
        .bind(timestamp_to_text(&recorded_at))
        .execute(&mut *tx)
        .await?;

        for item in &order.line_items {
            sqlx::query(
                "INSERT INTO sale_line
                    (sale_id, product_id, product_name, quantity, unit_price, total)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&sale_id)
            .bind(item.product_id.0)
            .bind(&item.product_name)
            .bind(i64::from(item.quantity))
            .bind(item.unit_price.to_string())
            .bind(item.total.to_string())
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                "UPDATE product SET stock = MAX(stock - ?, 0), updated_at = ? WHERE id = ?",
            )
            .bind(i64::from(item.quantity))
            .bind(timestamp_to_text(&recorded_at))
            .bind(item.product_id.0)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        tracing::info!(
            event_name = "sale.recorded",
            sale_id = %sale_id,
            order_id = %order.id.0,
            chat_id = %order.chat_id,
            total = %total,
            line_count = order.line_items.len(),
            "sale recorded"
        );

        Ok(SaleReceipt { sale_id, order_id: order.id.clone(), total, recorded_at })
    }
}
