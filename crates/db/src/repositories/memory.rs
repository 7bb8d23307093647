use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use tendero_core::domain::message::Message;
use tendero_core::domain::order::{Order, OrderStatus};
use tendero_core::domain::product::{Product, ProductId};

use super::{
    matches_any_term, CatalogRepository, ConversationLog, MessageFilter, OrderRepository,
    RepositoryError, SaleReceipt, SalesRecorder,
};

#[derive(Default)]
pub struct InMemoryCatalogRepository {
    products: RwLock<BTreeMap<i64, Product>>,
}

impl InMemoryCatalogRepository {
    pub fn with_products(products: impl IntoIterator<Item = Product>) -> Self {
        Self {
            products: RwLock::new(
                products.into_iter().map(|product| (product.id.0, product)).collect(),
            ),
        }
    }
}

#[async_trait::async_trait]
impl CatalogRepository for InMemoryCatalogRepository {
    async fn list_active_products(&self) -> Result<Vec<Product>, RepositoryError> {
        let products = self.products.read().await;
        Ok(products.values().filter(|product| product.active).cloned().collect())
    }

    async fn find_by_id(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let products = self.products.read().await;
        Ok(products.get(&id.0).cloned())
    }

    async fn search_by_terms(
        &self,
        terms: &[String],
        limit: usize,
    ) -> Result<Vec<Product>, RepositoryError> {
        let products = self.products.read().await;
        Ok(products
            .values()
            .filter(|product| product.active && matches_any_term(product, terms))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn save(&self, product: Product) -> Result<(), RepositoryError> {
        let mut products = self.products.write().await;
        products.insert(product.id.0, product);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryConversationLog {
    messages: RwLock<Vec<Message>>,
}

#[async_trait::async_trait]
impl ConversationLog for InMemoryConversationLog {
    async fn append_message(&self, message: Message) -> Result<Message, RepositoryError> {
        message.validate()?;
        let mut messages = self.messages.write().await;
        messages.push(message.clone());
        Ok(message)
    }

    async fn latest_messages(
        &self,
        chat_id: &str,
        limit: u32,
        filter: MessageFilter,
    ) -> Result<Vec<Message>, RepositoryError> {
        let messages = self.messages.read().await;
        let mut matching = messages
            .iter()
            .enumerate()
            .filter(|(_, message)| message.chat_id == chat_id && filter.matches(message))
            .collect::<Vec<_>>();
        // Newest first; insertion order breaks timestamp ties like rowid does in SQLite.
        matching.sort_by(|(left_index, left), (right_index, right)| {
            right.timestamp.cmp(&left.timestamp).then_with(|| right_index.cmp(left_index))
        });
        Ok(matching
            .into_iter()
            .take(usize::try_from(limit).unwrap_or(usize::MAX))
            .map(|(_, message)| message.clone())
            .collect())
    }
}

/// Mirrors the SQL store: versions are checked on every write and a conversation holds at most
/// one open order.
#[derive(Default)]
pub struct InMemoryOrderRepository {
    orders: RwLock<HashMap<String, Order>>,
}

#[async_trait::async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn find_latest(&self, chat_id: &str) -> Result<Option<Order>, RepositoryError> {
        let orders = self.orders.read().await;
        Ok(orders
            .values()
            .filter(|order| order.chat_id == chat_id)
            .max_by(|left, right| left.updated_at.cmp(&right.updated_at))
            .cloned())
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

        let conflict = || RepositoryError::VersionConflict {
            chat_id: order.chat_id.clone(),
            expected: expected_version,
        };

        let mut orders = self.orders.write().await;
        let stored_version = orders.get(&order.id.0).map(|stored| stored.version).unwrap_or(0);
        if stored_version != expected_version {
            return Err(conflict());
        }
        let other_open = orders.values().any(|stored| {
            stored.chat_id == order.chat_id && stored.id != order.id && stored.is_open()
        });
        if order.is_open() && other_open {
            return Err(conflict());
        }

        let mut saved = order.clone();
        saved.version = expected_version + 1;
        orders.insert(saved.id.0.clone(), saved.clone());
        Ok(saved)
    }

    async fn retire_latest(&self, chat_id: &str, reason: &str) -> Result<u64, RepositoryError> {
        let mut orders = self.orders.write().await;
        let Some(latest) = orders
            .values_mut()
            .filter(|order| order.chat_id == chat_id)
            .max_by(|left, right| left.updated_at.cmp(&right.updated_at))
        else {
            return Ok(0);
        };
        latest.status = OrderStatus::Cancelled;
        latest.line_items.clear();
        latest.customer = Default::default();
        latest.cancel_reason = Some(reason.to_string());
        latest.version += 1;
        latest.updated_at = Utc::now();
        Ok(1)
    }
}

pub struct InMemorySalesRecorder {
    catalog: Arc<InMemoryCatalogRepository>,
    receipts: RwLock<Vec<SaleReceipt>>,
}

impl InMemorySalesRecorder {
    /// Stock is decremented on `catalog`.
    pub fn new(catalog: Arc<InMemoryCatalogRepository>) -> Self {
        Self { catalog, receipts: RwLock::new(Vec::new()) }
    }

    pub async fn receipts(&self) -> Vec<SaleReceipt> {
        self.receipts.read().await.clone()
    }
}

#[async_trait::async_trait]
impl SalesRecorder for InMemorySalesRecorder {
    async fn record_sale(&self, order: &Order) -> Result<SaleReceipt, RepositoryError> {
        if order.status != OrderStatus::Closed {
            return Err(RepositoryError::Decode(format!(
                "order {} is {} and cannot be recorded as a sale",
                order.id.0, order.status
            )));
        }

        let mut receipts = self.receipts.write().await;
        if receipts.iter().any(|receipt| receipt.order_id == order.id) {
            return Err(RepositoryError::Decode(format!(
                "order {} was already recorded",
                order.id.0
            )));
        }

        {
            let mut products = self.catalog.products.write().await;
            for item in &order.line_items {
                if let Some(product) = products.get_mut(&item.product_id.0) {
                    product.stock = (product.stock - i64::from(item.quantity)).max(0);
                }
            }
        }

        let receipt = SaleReceipt {
            sale_id: Uuid::new_v4().to_string(),
            order_id: order.id.clone(),
            total: order.total(),
            recorded_at: Utc::now(),
        };
        receipts.push(receipt.clone());
        Ok(receipt)
    }
}
