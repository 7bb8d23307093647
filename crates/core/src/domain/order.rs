use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::product::{Product, ProductId};
use crate::errors::DomainError;

pub const MIN_QUANTITY: u32 = 1;
pub const MAX_QUANTITY: u32 = 1000;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderId(pub String);

impl OrderId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    None,
    Pending,
    CollectingData,
    Closed,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Pending => "pending",
            Self::CollectingData => "collecting_data",
            Self::Closed => "closed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "none" => Some(Self::None),
            "pending" => Some(Self::Pending),
            "collecting_data" => Some(Self::CollectingData),
            "closed" => Some(Self::Closed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// `pending` and `collecting_data` are the only states an order can be resumed from.
    pub fn is_open(self) -> bool {
        matches!(self, Self::Pending | Self::CollectingData)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub total: Decimal,
}

impl LineItem {
    pub fn new(product: &Product, quantity: u32) -> Result<Self, DomainError> {
        if !(MIN_QUANTITY..=MAX_QUANTITY).contains(&quantity) {
            return Err(DomainError::InvariantViolation(format!(
                "line item quantity {quantity} outside {MIN_QUANTITY}..={MAX_QUANTITY}"
            )));
        }

        Ok(Self {
            product_id: product.id,
            product_name: product.name.clone(),
            quantity,
            unit_price: product.price,
            total: product.price * Decimal::from(quantity),
        })
    }

    pub fn is_consistent(&self) -> bool {
        (MIN_QUANTITY..=MAX_QUANTITY).contains(&self.quantity)
            && self.total == self.unit_price * Decimal::from(self.quantity)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustomerSlot {
    FullName,
    NationalId,
    Phone,
    Address,
    Neighborhood,
    ExtraInstructions,
}

impl CustomerSlot {
    /// Prompt order used when asking the customer for missing data.
    pub const REQUIRED: [CustomerSlot; 6] = [
        CustomerSlot::FullName,
        CustomerSlot::NationalId,
        CustomerSlot::Phone,
        CustomerSlot::Address,
        CustomerSlot::Neighborhood,
        CustomerSlot::ExtraInstructions,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Self::FullName => "full_name",
            Self::NationalId => "national_id",
            Self::Phone => "phone",
            Self::Address => "address",
            Self::Neighborhood => "neighborhood",
            Self::ExtraInstructions => "extra_instructions",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::REQUIRED.into_iter().find(|slot| slot.key() == key)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::FullName => "full name",
            Self::NationalId => "national ID number",
            Self::Phone => "mobile phone number",
            Self::Address => "delivery address",
            Self::Neighborhood => "neighborhood",
            Self::ExtraInstructions => "delivery instructions (or \"none\")",
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerSlots {
    values: BTreeMap<CustomerSlot, String>,
}

impl CustomerSlots {
    pub fn set(&mut self, slot: CustomerSlot, value: impl Into<String>) {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return;
        }
        self.values.insert(slot, trimmed.to_string());
    }

    pub fn get(&self, slot: CustomerSlot) -> Option<&str> {
        self.values.get(&slot).map(String::as_str)
    }

    pub fn missing(&self) -> Vec<CustomerSlot> {
        CustomerSlot::REQUIRED.into_iter().filter(|slot| !self.values.contains_key(slot)).collect()
    }

    pub fn is_complete(&self) -> bool {
        self.missing().is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (CustomerSlot, &str)> {
        self.values.iter().map(|(slot, value)| (*slot, value.as_str()))
    }

    pub fn to_key_map(&self) -> BTreeMap<String, String> {
        self.values.iter().map(|(slot, value)| (slot.key().to_string(), value.clone())).collect()
    }

    /// Unknown keys are dropped rather than rejected; older payloads carried free-form keys.
    pub fn from_key_map(map: &BTreeMap<String, String>) -> Self {
        let mut slots = Self::default();
        for (key, value) in map {
            if let Some(slot) = CustomerSlot::from_key(key) {
                slots.set(slot, value.clone());
            }
        }
        slots
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub chat_id: String,
    /// Optimistic-concurrency version; 0 means never persisted.
    pub version: i64,
    pub status: OrderStatus,
    pub line_items: Vec<LineItem>,
    pub customer: CustomerSlots,
    pub cancel_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn new(chat_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: OrderId::generate(),
            chat_id: chat_id.into(),
            version: 0,
            status: OrderStatus::None,
            line_items: Vec::new(),
            customer: CustomerSlots::default(),
            cancel_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn total(&self) -> Decimal {
        self.line_items.iter().map(|item| item.total).sum()
    }

    pub fn item_count(&self) -> u32 {
        self.line_items.iter().map(|item| item.quantity).sum()
    }

    pub fn is_open(&self) -> bool {
        self.status.is_open()
    }

    pub fn missing_slots(&self) -> Vec<CustomerSlot> {
        self.customer.missing()
    }

    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        matches!(
            (self.status, next),
            (OrderStatus::None, OrderStatus::Pending)
                | (OrderStatus::Pending, OrderStatus::Pending)
                | (OrderStatus::Pending, OrderStatus::CollectingData)
                | (OrderStatus::CollectingData, OrderStatus::CollectingData)
                | (OrderStatus::CollectingData, OrderStatus::Closed)
                | (OrderStatus::Pending, OrderStatus::Cancelled)
                | (OrderStatus::CollectingData, OrderStatus::Cancelled)
        )
    }

    pub fn transition_to(&mut self, next: OrderStatus) -> Result<(), DomainError> {
        if !self.can_transition_to(next) {
            return Err(DomainError::InvalidOrderTransition { from: self.status, to: next });
        }
        if next == OrderStatus::Closed && !self.customer.is_complete() {
            return Err(DomainError::InvariantViolation(format!(
                "order {} cannot close with missing customer data: {}",
                self.id.0,
                self.missing_slots().iter().map(|slot| slot.key()).collect::<Vec<_>>().join(", ")
            )));
        }
        if next == OrderStatus::CollectingData && self.line_items.is_empty() {
            return Err(DomainError::InvariantViolation(format!(
                "order {} cannot start checkout with an empty cart",
                self.id.0
            )));
        }

        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Appends a line item. Allowed while the cart is new, pending, or mid checkout; the status
    /// only moves forward, so an addition during checkout leaves it in `collecting_data`.
    pub fn add_line_item(&mut self, item: LineItem) -> Result<(), DomainError> {
        let next = match self.status {
            OrderStatus::None | OrderStatus::Pending => OrderStatus::Pending,
            OrderStatus::CollectingData => OrderStatus::CollectingData,
            other => return Err(DomainError::InvalidOrderTransition { from: other, to: other }),
        };
        self.line_items.push(item);
        self.transition_to(next)
    }

    pub fn cancel(&mut self, reason: Option<String>) -> Result<(), DomainError> {
        self.transition_to(OrderStatus::Cancelled)?;
        self.cancel_reason = reason.filter(|value| !value.trim().is_empty());
        Ok(())
    }

    pub fn check_invariants(&self) -> Result<(), DomainError> {
        if let Some(item) = self.line_items.iter().find(|item| !item.is_consistent()) {
            return Err(DomainError::InvariantViolation(format!(
                "line item for product {} has inconsistent quantity or total",
                item.product_id
            )));
        }
        if self.status == OrderStatus::Closed && !self.customer.is_complete() {
            return Err(DomainError::InvariantViolation(
                "closed order is missing customer data".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{CustomerSlot, LineItem, Order, OrderStatus};
    use crate::domain::product::{Product, ProductId};
    use crate::errors::DomainError;

    fn product(id: i64, price: i64) -> Product {
        Product {
            id: ProductId(id),
            name: format!("Product {id}"),
            description: String::new(),
            price: Decimal::new(price, 0),
            stock: 10,
            category: None,
            active: true,
        }
    }

    fn fill_customer(order: &mut Order) {
        for slot in CustomerSlot::REQUIRED {
            order.customer.set(slot, format!("value for {}", slot.key()));
        }
    }

    #[test]
    fn total_equals_sum_of_line_totals_after_each_addition() {
        let mut order = Order::new("chat-1");
        for (id, quantity) in [(1, 3), (2, 1), (3, 1000)] {
            let item = LineItem::new(&product(id, 12_500), quantity).expect("valid line item");
            order.add_line_item(item).expect("add item");
            let sum: Decimal = order.line_items.iter().map(|item| item.total).sum();
            assert_eq!(order.total(), sum);
        }
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.total(), Decimal::new(12_500 * 1004, 0));
    }

    #[test]
    fn line_item_rejects_out_of_range_quantity() {
        assert!(LineItem::new(&product(1, 10), 0).is_err());
        assert!(LineItem::new(&product(1, 10), 1001).is_err());
        assert!(LineItem::new(&product(1, 10), 1).is_ok());
        assert!(LineItem::new(&product(1, 10), 1000).is_ok());
    }

    #[test]
    fn cannot_close_with_missing_slots() {
        let mut order = Order::new("chat-1");
        order.add_line_item(LineItem::new(&product(1, 10), 2).expect("item")).expect("add");
        order.transition_to(OrderStatus::CollectingData).expect("pending -> collecting");
        order.customer.set(CustomerSlot::FullName, "Ana Gomez");

        let error = order.transition_to(OrderStatus::Closed).expect_err("slots missing");
        assert!(matches!(error, DomainError::InvariantViolation(_)));
        assert_eq!(order.status, OrderStatus::CollectingData);

        fill_customer(&mut order);
        order.transition_to(OrderStatus::Closed).expect("complete customer closes");
        assert!(order.check_invariants().is_ok());
    }

    #[test]
    fn checkout_requires_items() {
        let mut order = Order::new("chat-1");
        order.status = OrderStatus::Pending;
        assert!(order.transition_to(OrderStatus::CollectingData).is_err());
    }

    #[test]
    fn cancelled_is_terminal() {
        let mut order = Order::new("chat-1");
        order.add_line_item(LineItem::new(&product(1, 10), 1).expect("item")).expect("add");
        order.cancel(Some("too expensive".to_string())).expect("cancel pending order");
        assert_eq!(order.cancel_reason.as_deref(), Some("too expensive"));

        assert!(order.cancel(None).is_err());
        assert!(order.add_line_item(LineItem::new(&product(2, 10), 1).expect("item")).is_err());
        assert!(!order.can_transition_to(OrderStatus::Pending));
    }

    #[test]
    fn fresh_order_cannot_be_cancelled() {
        let mut order = Order::new("chat-1");
        let error = order.cancel(None).expect_err("nothing to cancel");
        assert!(matches!(
            error,
            DomainError::InvalidOrderTransition {
                from: OrderStatus::None,
                to: OrderStatus::Cancelled
            }
        ));
    }

    #[test]
    fn adding_during_checkout_keeps_collecting_data() {
        let mut order = Order::new("chat-1");
        order.add_line_item(LineItem::new(&product(1, 10), 1).expect("item")).expect("add");
        order.transition_to(OrderStatus::CollectingData).expect("checkout");
        order.add_line_item(LineItem::new(&product(2, 5), 3).expect("item")).expect("add more");
        assert_eq!(order.status, OrderStatus::CollectingData);
        assert_eq!(order.total(), Decimal::new(25, 0));
    }

    #[test]
    fn slot_key_map_round_trips_known_keys_only() {
        let mut map = std::collections::BTreeMap::new();
        map.insert("phone".to_string(), "3001234567".to_string());
        map.insert("favorite_color".to_string(), "blue".to_string());

        let slots = super::CustomerSlots::from_key_map(&map);
        assert_eq!(slots.get(CustomerSlot::Phone), Some("3001234567"));
        assert_eq!(slots.to_key_map().len(), 1);
        assert_eq!(slots.missing().len(), 5);
    }
}
