use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::order::{
    CustomerSlots, LineItem, Order, OrderStatus, MAX_QUANTITY, MIN_QUANTITY,
};
use crate::domain::product::ProductId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    User,
    Agent,
    Bot,
    System,
}

impl Sender {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Agent => "agent",
            Self::Bot => "bot",
            Self::System => "system",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "user" => Some(Self::User),
            "agent" => Some(Self::Agent),
            "bot" => Some(Self::Bot),
            "system" => Some(Self::System),
            _ => None,
        }
    }
}

/// Reply classification surfaced to callers as `tipo_mensaje`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Catalog,
    ProductInfo,
    OrderUpdate,
    OrderSummary,
    SlotRequest,
    OrderClosed,
    OrderCancelled,
    ValidationError,
    General,
    Error,
}

impl MessageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Catalog => "catalog",
            Self::ProductInfo => "product_info",
            Self::OrderUpdate => "order_update",
            Self::OrderSummary => "order_summary",
            Self::SlotRequest => "slot_request",
            Self::OrderClosed => "order_closed",
            Self::OrderCancelled => "order_cancelled",
            Self::ValidationError => "validation_error",
            Self::General => "general",
            Self::Error => "error",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        [
            Self::Catalog,
            Self::ProductInfo,
            Self::OrderUpdate,
            Self::OrderSummary,
            Self::SlotRequest,
            Self::OrderClosed,
            Self::OrderCancelled,
            Self::ValidationError,
            Self::General,
            Self::Error,
        ]
        .into_iter()
        .find(|kind| kind.as_str() == value)
    }
}

/// Line item as stored inside message metadata.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedLineItem {
    pub product: String,
    pub product_id: i64,
    pub cantidad: u32,
    pub precio: Decimal,
    pub total: Decimal,
}

impl From<&LineItem> for PersistedLineItem {
    fn from(item: &LineItem) -> Self {
        Self {
            product: item.product_name.clone(),
            product_id: item.product_id.0,
            cantidad: item.quantity,
            precio: item.unit_price,
            total: item.total,
        }
    }
}

impl From<&PersistedLineItem> for LineItem {
    fn from(item: &PersistedLineItem) -> Self {
        Self {
            product_id: ProductId(item.product_id),
            product_name: item.product.clone(),
            quantity: item.cantidad,
            unit_price: item.precio,
            total: item.total,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPayload {
    pub line_items: Vec<PersistedLineItem>,
    #[serde(default)]
    pub datos_cliente: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub motivo_cancelacion: Option<String>,
}

impl OrderPayload {
    pub fn total(&self) -> Decimal {
        self.line_items.iter().map(|item| item.total).sum()
    }
}

/// Order state attached to a log message, one variant per order status.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "estado", rename_all = "snake_case")]
pub enum OrderSnapshot {
    Pending(OrderPayload),
    CollectingData(OrderPayload),
    Closed(OrderPayload),
    Cancelled(OrderPayload),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum MetadataError {
    #[error("message status `{status}` does not match metadata variant `{snapshot}`")]
    StatusMismatch { status: String, snapshot: String },
    #[error("message carries order metadata without an order status")]
    MissingStatus,
    #[error("line item for product {product_id} has invalid quantity {quantity}")]
    InvalidQuantity { product_id: i64, quantity: u32 },
    #[error("line item for product {product_id} total does not equal quantity * price")]
    InconsistentTotal { product_id: i64 },
    #[error("metadata could not be decoded: {0}")]
    Decode(String),
}

impl OrderSnapshot {
    /// `None` for orders that were never opened; there is nothing to persist for them.
    pub fn from_order(order: &Order) -> Option<Self> {
        let payload = OrderPayload {
            line_items: order.line_items.iter().map(PersistedLineItem::from).collect(),
            datos_cliente: order.customer.to_key_map(),
            motivo_cancelacion: order.cancel_reason.clone(),
        };
        match order.status {
            OrderStatus::None => None,
            OrderStatus::Pending => Some(Self::Pending(payload)),
            OrderStatus::CollectingData => Some(Self::CollectingData(payload)),
            OrderStatus::Closed => Some(Self::Closed(payload)),
            OrderStatus::Cancelled => Some(Self::Cancelled(payload)),
        }
    }

    pub fn status(&self) -> OrderStatus {
        match self {
            Self::Pending(_) => OrderStatus::Pending,
            Self::CollectingData(_) => OrderStatus::CollectingData,
            Self::Closed(_) => OrderStatus::Closed,
            Self::Cancelled(_) => OrderStatus::Cancelled,
        }
    }

    pub fn payload(&self) -> &OrderPayload {
        match self {
            Self::Pending(payload)
            | Self::CollectingData(payload)
            | Self::Closed(payload)
            | Self::Cancelled(payload) => payload,
        }
    }

    pub fn validate(&self) -> Result<(), MetadataError> {
        for item in &self.payload().line_items {
            if !(MIN_QUANTITY..=MAX_QUANTITY).contains(&item.cantidad) {
                return Err(MetadataError::InvalidQuantity {
                    product_id: item.product_id,
                    quantity: item.cantidad,
                });
            }
            if item.total != item.precio * Decimal::from(item.cantidad) {
                return Err(MetadataError::InconsistentTotal { product_id: item.product_id });
            }
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<String, MetadataError> {
        serde_json::to_string(self).map_err(|error| MetadataError::Decode(error.to_string()))
    }

    pub fn from_json(raw: &str) -> Result<Self, MetadataError> {
        let snapshot: Self =
            serde_json::from_str(raw).map_err(|error| MetadataError::Decode(error.to_string()))?;
        snapshot.validate()?;
        Ok(snapshot)
    }

    /// Rebuilds an order from the snapshot. The version is left at 0 because the log does not
    /// carry one; a later save inserts a fresh versioned record.
    pub fn to_order(&self, chat_id: &str) -> Order {
        let payload = self.payload();
        let mut order = Order::new(chat_id);
        order.status = self.status();
        order.line_items = payload.line_items.iter().map(LineItem::from).collect();
        order.customer = CustomerSlots::from_key_map(&payload.datos_cliente);
        order.cancel_reason = payload.motivo_cancelacion.clone();
        order
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub chat_id: String,
    pub sender: Sender,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub order_status: Option<OrderStatus>,
    pub kind: Option<MessageKind>,
    pub metadata: Option<OrderSnapshot>,
}

impl Message {
    pub fn new(chat_id: impl Into<String>, sender: Sender, text: impl Into<String>) -> Self {
        Self {
            id: MessageId::generate(),
            chat_id: chat_id.into(),
            sender,
            text: text.into(),
            timestamp: Utc::now(),
            order_status: None,
            kind: None,
            metadata: None,
        }
    }

    pub fn with_kind(mut self, kind: MessageKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn with_order(mut self, order: &Order) -> Self {
        self.metadata = OrderSnapshot::from_order(order);
        self.order_status = self.metadata.as_ref().map(OrderSnapshot::status);
        self
    }

    /// Append-boundary check: the status tag and the metadata variant must agree.
    pub fn validate(&self) -> Result<(), MetadataError> {
        let Some(snapshot) = &self.metadata else {
            return Ok(());
        };
        let Some(status) = self.order_status else {
            return Err(MetadataError::MissingStatus);
        };
        if snapshot.status() != status {
            return Err(MetadataError::StatusMismatch {
                status: status.to_string(),
                snapshot: snapshot.status().to_string(),
            });
        }
        snapshot.validate()
    }
}

/// Reconstructs the open order from a message window ordered newest first.
///
/// Only the most recent status-bearing message counts: a later `closed` or `cancelled` message
/// supersedes an earlier open one. An open status without usable metadata is treated as no
/// active order.
pub fn reconstruct_open_order(chat_id: &str, newest_first: &[Message]) -> Option<Order> {
    let latest = newest_first.iter().find(|message| message.order_status.is_some())?;
    let status = latest.order_status?;
    if !status.is_open() {
        return None;
    }

    match &latest.metadata {
        Some(snapshot) if snapshot.status() == status => Some(snapshot.to_order(chat_id)),
        _ => {
            tracing::warn!(
                event_name = "order.reconstruct.metadata_unusable",
                chat_id = %chat_id,
                message_id = %latest.id.0,
                status = %status,
                "open order message has missing or mismatched metadata; treating as no active order"
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;

    use super::{
        reconstruct_open_order, Message, MessageKind, MetadataError, OrderSnapshot, Sender,
    };
    use crate::domain::order::{CustomerSlot, LineItem, Order, OrderStatus};
    use crate::domain::product::{Product, ProductId};

    fn pending_order() -> Order {
        let product = Product {
            id: ProductId(7),
            name: "Fire Extinguisher ABC 10 lb".to_string(),
            description: String::new(),
            price: Decimal::new(85_000, 0),
            stock: 20,
            category: None,
            active: true,
        };
        let mut order = Order::new("chat-9");
        order.add_line_item(LineItem::new(&product, 3).expect("item")).expect("add");
        order
    }

    #[test]
    fn snapshot_uses_persisted_layout_keys() {
        let mut order = pending_order();
        order.customer.set(CustomerSlot::Phone, "3001234567");
        let snapshot = OrderSnapshot::from_order(&order).expect("pending snapshot");
        let json: serde_json::Value =
            serde_json::from_str(&snapshot.to_json().expect("encode")).expect("json");

        assert_eq!(json["estado"], "pending");
        assert_eq!(json["line_items"][0]["product"], "Fire Extinguisher ABC 10 lb");
        assert_eq!(json["line_items"][0]["product_id"], 7);
        assert_eq!(json["line_items"][0]["cantidad"], 3);
        assert_eq!(json["datos_cliente"]["phone"], "3001234567");
    }

    #[test]
    fn snapshot_decode_rejects_inconsistent_totals() {
        let raw = r#"{"estado":"pending","line_items":[{"product":"Helmet","product_id":1,"cantidad":2,"precio":"10","total":"25"}],"datos_cliente":{}}"#;
        let error = OrderSnapshot::from_json(raw).expect_err("total mismatch");
        assert_eq!(error, MetadataError::InconsistentTotal { product_id: 1 });
    }

    #[test]
    fn message_validation_rejects_status_mismatch() {
        let order = pending_order();
        let mut message = Message::new("chat-9", Sender::Agent, "added").with_order(&order);
        assert!(message.validate().is_ok());

        message.order_status = Some(OrderStatus::Closed);
        assert!(matches!(message.validate(), Err(MetadataError::StatusMismatch { .. })));

        message.order_status = None;
        assert_eq!(message.validate(), Err(MetadataError::MissingStatus));
    }

    #[test]
    fn reconstructs_latest_open_order() {
        let order = pending_order();
        let mut opened = Message::new("chat-9", Sender::Agent, "added").with_order(&order);
        opened.timestamp = Utc::now() - Duration::seconds(30);
        let chatter = Message::new("chat-9", Sender::User, "thanks");

        let rebuilt = reconstruct_open_order("chat-9", &[chatter, opened]).expect("open order");
        assert_eq!(rebuilt.status, OrderStatus::Pending);
        assert_eq!(rebuilt.line_items.len(), 1);
        assert_eq!(rebuilt.total(), Decimal::new(255_000, 0));
        assert_eq!(rebuilt.version, 0);
    }

    #[test]
    fn later_cancellation_supersedes_open_order() {
        let mut order = pending_order();
        let opened = Message::new("chat-9", Sender::Agent, "added").with_order(&order);
        order.cancel(None).expect("cancel");
        let cancelled = Message::new("chat-9", Sender::Agent, "cancelled")
            .with_order(&order)
            .with_kind(MessageKind::OrderCancelled);

        assert!(reconstruct_open_order("chat-9", &[cancelled, opened]).is_none());
    }

    #[test]
    fn open_status_without_metadata_is_no_active_order() {
        let mut broken = Message::new("chat-9", Sender::Agent, "added");
        broken.order_status = Some(OrderStatus::Pending);
        assert!(reconstruct_open_order("chat-9", &[broken]).is_none());
    }
}
