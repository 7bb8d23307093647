use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use tendero_core::domain::message::{Message, MetadataError, Sender};
use tendero_core::domain::order::{Order, OrderId};
use tendero_core::domain::product::{Product, ProductId};
use tendero_core::text::normalize;

pub mod conversation;
pub mod memory;
pub mod order;
pub mod product;
pub mod sales;

pub use conversation::SqlConversationLog;
pub use memory::{
    InMemoryCatalogRepository, InMemoryConversationLog, InMemoryOrderRepository,
    InMemorySalesRecorder,
};
pub use order::SqlOrderRepository;
pub use product::SqlCatalogRepository;
pub use sales::SqlSalesRecorder;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("order for chat `{chat_id}` changed concurrently (expected version {expected})")]
    VersionConflict { chat_id: String, expected: i64 },
    #[error("message metadata rejected: {0}")]
    InvalidMetadata(#[from] MetadataError),
}

/// Read side of the product catalog.
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    async fn list_active_products(&self) -> Result<Vec<Product>, RepositoryError>;
    async fn find_by_id(&self, id: ProductId) -> Result<Option<Product>, RepositoryError>;
    /// Active products whose name or description contains any of `terms`, in id order.
    async fn search_by_terms(
        &self,
        terms: &[String],
        limit: usize,
    ) -> Result<Vec<Product>, RepositoryError>;
    async fn save(&self, product: Product) -> Result<(), RepositoryError>;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MessageFilter {
    #[default]
    All,
    /// Only messages that carry an order status tag.
    WithOrderStatus,
    FromSender(Sender),
}

impl MessageFilter {
    pub fn matches(&self, message: &Message) -> bool {
        match self {
            Self::All => true,
            Self::WithOrderStatus => message.order_status.is_some(),
            Self::FromSender(sender) => message.sender == *sender,
        }
    }
}

/// Append-only message history per conversation.
#[async_trait]
pub trait ConversationLog: Send + Sync {
    /// Validates the order metadata before anything is written.
    async fn append_message(&self, message: Message) -> Result<Message, RepositoryError>;
    /// Newest first.
    async fn latest_messages(
        &self,
        chat_id: &str,
        limit: u32,
        filter: MessageFilter,
    ) -> Result<Vec<Message>, RepositoryError>;
}

/// Versioned order records with optimistic concurrency.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Most recently updated order for the conversation, whatever its status.
    async fn find_latest(&self, chat_id: &str) -> Result<Option<Order>, RepositoryError>;
    /// Writes `order` if the stored version still equals `expected_version` (0 inserts a new
    /// record). Returns the order carrying its new version.
    async fn save(&self, order: &Order, expected_version: i64) -> Result<Order, RepositoryError>;
    /// Cancels the latest record for the conversation and resets its payload to an empty cart,
    /// so a record that no longer decodes stops blocking new orders. Returns the rows touched.
    async fn retire_latest(&self, chat_id: &str, reason: &str) -> Result<u64, RepositoryError>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SaleReceipt {
    pub sale_id: String,
    pub order_id: OrderId,
    pub total: Decimal,
    pub recorded_at: DateTime<Utc>,
}

/// Handoff for finalized orders: persists the sale and adjusts stock.
#[async_trait]
pub trait SalesRecorder: Send + Sync {
    async fn record_sale(&self, order: &Order) -> Result<SaleReceipt, RepositoryError>;
}

/// Fixed-width UTC timestamps so text ordering matches time ordering.
pub(crate) fn timestamp_to_text(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|timestamp| timestamp.with_timezone(&Utc))
        .map_err(|error| RepositoryError::Decode(format!("invalid timestamp `{raw}`: {error}")))
}

pub(crate) fn parse_decimal(raw: &str) -> Result<Decimal, RepositoryError> {
    raw.parse::<Decimal>()
        .map_err(|error| RepositoryError::Decode(format!("invalid decimal `{raw}`: {error}")))
}

pub(crate) fn decode_error(error: sqlx::Error) -> RepositoryError {
    RepositoryError::Decode(error.to_string())
}

/// Substring match on folded name and description, shared by the SQL and in-memory catalogs.
pub(crate) fn matches_any_term(product: &Product, terms: &[String]) -> bool {
    let haystack = normalize(&format!("{} {}", product.name, product.description));
    terms
        .iter()
        .map(|term| normalize(term))
        .filter(|term| !term.is_empty())
        .any(|term| haystack.contains(&term))
}
