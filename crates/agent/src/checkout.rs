//! Order state machine orchestration.
//!
//! The flow engine decides the next status and the actions to take; the [`Order`] enforces its
//! own invariants when the transition is applied. Both must agree or the turn fails with a
//! domain error and nothing is persisted.

use std::sync::Arc;

use tendero_core::audit::{AuditContext, AuditSink};
use tendero_core::domain::message::MessageKind;
use tendero_core::domain::order::{CustomerSlot, LineItem, Order, OrderStatus};
use tendero_core::errors::DomainError;
use tendero_core::extraction::ResolvedEntity;
use tendero_core::flows::{
    CheckoutFlow, FlowAction, FlowContext, FlowEngine, FlowEvent, TransitionOutcome,
};
use tendero_core::signals::cancellation_reason;
use tendero_core::slots::{HeuristicSlotDetector, SlotDetector};

use crate::templates;

/// Result of one checkout step, before persistence.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckoutReply {
    pub text: String,
    pub kind: MessageKind,
    /// The order was modified and must be saved.
    pub order_changed: bool,
    /// The order closed and goes to the sales recorder after it is saved.
    pub record_sale: bool,
}

impl CheckoutReply {
    fn changed(text: String, kind: MessageKind) -> Self {
        Self { text, kind, order_changed: true, record_sale: false }
    }

    fn unchanged(text: String, kind: MessageKind) -> Self {
        Self { text, kind, order_changed: false, record_sale: false }
    }
}

pub struct CheckoutWorkflow {
    engine: FlowEngine<CheckoutFlow>,
    slots: Arc<dyn SlotDetector>,
    audit: Arc<dyn AuditSink>,
}

impl CheckoutWorkflow {
    pub fn new(slots: Arc<dyn SlotDetector>, audit: Arc<dyn AuditSink>) -> Self {
        Self { engine: FlowEngine::default(), slots, audit }
    }

    pub fn with_audit(audit: Arc<dyn AuditSink>) -> Self {
        Self::new(Arc::new(HeuristicSlotDetector), audit)
    }

    fn apply(
        &self,
        order: &Order,
        event: FlowEvent,
        line_item_count: usize,
        missing: Vec<CustomerSlot>,
        audit: &AuditContext,
    ) -> Result<TransitionOutcome, DomainError> {
        let context = FlowContext { line_item_count, missing_required_slots: missing };
        Ok(self.engine.apply_with_audit(order.status, &event, &context, self.audit.as_ref(), audit)?)
    }

    /// Appends the resolved product. Mid checkout the status stays `collecting_data` and the
    /// next slot prompt follows the confirmation.
    pub fn add_item(
        &self,
        order: &mut Order,
        entity: &ResolvedEntity,
        audit: &AuditContext,
    ) -> Result<CheckoutReply, DomainError> {
        let item = LineItem::new(&entity.product, entity.quantity)?;
        let outcome = self.apply(
            order,
            FlowEvent::ItemAdded,
            order.line_items.len() + 1,
            order.missing_slots(),
            audit,
        )?;
        order.add_line_item(item.clone())?;
        debug_assert_eq!(order.status, outcome.to);

        tracing::info!(
            event_name = "checkout.item_added",
            correlation_id = %audit.correlation_id,
            chat_id = %order.chat_id,
            product_id = %item.product_id,
            quantity = item.quantity,
            quantity_defaulted = entity.quantity_defaulted,
            total = %order.total(),
            "line item added"
        );

        let text = match order.missing_slots().first() {
            Some(next) if outcome.actions.contains(&FlowAction::PromptForNextSlot) => {
                templates::item_added_during_checkout(order, &item, *next)
            }
            _ => templates::item_added(order, &item),
        };
        Ok(CheckoutReply::changed(text, MessageKind::OrderUpdate))
    }

    /// `pending` to `collecting_data`, or straight to `closed` when the customer data is
    /// already complete.
    pub fn confirm(
        &self,
        order: &mut Order,
        audit: &AuditContext,
    ) -> Result<CheckoutReply, DomainError> {
        let outcome = self.apply(
            order,
            FlowEvent::CheckoutConfirmed,
            order.line_items.len(),
            order.missing_slots(),
            audit,
        )?;

        order.transition_to(OrderStatus::CollectingData)?;
        if outcome.to == OrderStatus::Closed {
            return self.close(order, &outcome, audit);
        }

        let first = order.missing_slots().first().copied().ok_or_else(|| {
            DomainError::InvariantViolation("checkout started with no missing slots".to_string())
        })?;
        Ok(CheckoutReply::changed(templates::checkout_started(order, first), MessageKind::SlotRequest))
    }

    /// Routes the message into one missing slot. A rejected value leaves the order untouched.
    pub fn provide_slot(
        &self,
        order: &mut Order,
        message: &str,
        audit: &AuditContext,
    ) -> Result<CheckoutReply, DomainError> {
        let missing = order.missing_slots();
        let detected = match self.slots.detect(message, &missing) {
            Ok(detected) => detected,
            Err(rejection) => {
                tracing::info!(
                    event_name = "checkout.slot_rejected",
                    correlation_id = %audit.correlation_id,
                    chat_id = %order.chat_id,
                    reason = %rejection,
                    "slot value rejected"
                );
                let text = match missing.first() {
                    Some(next) => templates::slot_rejected(&rejection.user_message(), *next),
                    None => rejection.user_message(),
                };
                return Ok(CheckoutReply::unchanged(text, MessageKind::ValidationError));
            }
        };

        let mut remaining = missing;
        remaining.retain(|slot| *slot != detected.slot);
        let outcome = self.apply(
            order,
            FlowEvent::SlotFilled,
            order.line_items.len(),
            remaining.clone(),
            audit,
        )?;
        order.customer.set(detected.slot, detected.value);
        order.transition_to(OrderStatus::CollectingData)?;

        tracing::info!(
            event_name = "checkout.slot_filled",
            correlation_id = %audit.correlation_id,
            chat_id = %order.chat_id,
            slot = detected.slot.key(),
            rule = ?detected.rule,
            remaining = remaining.len(),
            "customer slot filled"
        );

        match remaining.first() {
            _ if outcome.to == OrderStatus::Closed => self.close(order, &outcome, audit),
            Some(next) => Ok(CheckoutReply::changed(
                templates::slot_saved(detected.slot, *next),
                MessageKind::SlotRequest,
            )),
            None => Err(DomainError::InvariantViolation(
                "all slots filled but the flow did not close the order".to_string(),
            )),
        }
    }

    fn close(
        &self,
        order: &mut Order,
        outcome: &TransitionOutcome,
        audit: &AuditContext,
    ) -> Result<CheckoutReply, DomainError> {
        order.transition_to(OrderStatus::Closed)?;
        tracing::info!(
            event_name = "checkout.order_closed",
            correlation_id = %audit.correlation_id,
            chat_id = %order.chat_id,
            order_id = %order.id.0,
            total = %order.total(),
            "order closed"
        );
        Ok(CheckoutReply {
            text: templates::order_closed(order),
            kind: MessageKind::OrderClosed,
            order_changed: true,
            record_sale: outcome.actions.contains(&FlowAction::RecordSale),
        })
    }

    pub fn cancel(
        &self,
        order: &mut Order,
        message: &str,
        audit: &AuditContext,
    ) -> Result<CheckoutReply, DomainError> {
        if !order.is_open() {
            return Ok(CheckoutReply::unchanged(templates::nothing_to_cancel(), MessageKind::General));
        }
        self.apply(order, FlowEvent::CancelRequested, order.line_items.len(), Vec::new(), audit)?;
        let reason = cancellation_reason(message);
        order.cancel(reason.clone())?;

        tracing::info!(
            event_name = "checkout.order_cancelled",
            correlation_id = %audit.correlation_id,
            chat_id = %order.chat_id,
            order_id = %order.id.0,
            reason = reason.as_deref().unwrap_or(""),
            "order cancelled"
        );
        Ok(CheckoutReply::changed(
            templates::order_cancelled(order.cancel_reason.as_deref()),
            MessageKind::OrderCancelled,
        ))
    }

    /// Read-only view of the open order.
    pub fn summary(&self, order: &Order) -> CheckoutReply {
        let text = if order.is_open() {
            templates::order_summary(order)
        } else {
            templates::no_active_order()
        };
        CheckoutReply::unchanged(text, MessageKind::OrderSummary)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rust_decimal::Decimal;

    use tendero_core::audit::{AuditContext, InMemoryAuditSink};
    use tendero_core::domain::message::MessageKind;
    use tendero_core::domain::order::{CustomerSlot, Order, OrderStatus};
    use tendero_core::domain::product::{Product, ProductId};
    use tendero_core::extraction::{EntityExtractor, Extraction, ResolvedEntity};

    use super::CheckoutWorkflow;

    fn gloves() -> Product {
        Product {
            id: ProductId(6),
            name: "Nitrile Gloves".to_string(),
            description: String::new(),
            price: Decimal::new(12_000, 0),
            stock: 200,
            category: None,
            active: true,
        }
    }

    fn entity(text: &str) -> ResolvedEntity {
        match EntityExtractor::default().extract(text, &[gloves()]) {
            Extraction::Resolved(entity) => entity,
            other => panic!("expected gloves, got {other:?}"),
        }
    }

    fn audit() -> AuditContext {
        AuditContext::new(Some("chat-1".to_string()), "req-1", "checkout")
    }

    fn workflow() -> (CheckoutWorkflow, InMemoryAuditSink) {
        let sink = InMemoryAuditSink::default();
        (CheckoutWorkflow::with_audit(Arc::new(sink.clone())), sink)
    }

    #[test]
    fn full_checkout_closes_and_requests_sale() {
        let (workflow, sink) = workflow();
        let mut order = Order::new("chat-1");

        let added = workflow.add_item(&mut order, &entity("I want 4 gloves"), &audit()).expect("add");
        assert_eq!(added.kind, MessageKind::OrderUpdate);
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.total(), Decimal::new(48_000, 0));

        let confirmed = workflow.confirm(&mut order, &audit()).expect("confirm");
        assert_eq!(confirmed.kind, MessageKind::SlotRequest);
        assert!(confirmed.text.ends_with("Please send me your full name."));

        let inputs = ["Ana Gomez", "1020304050", "3001234567", "Calle 45 # 12-30", "Chapinero", "none"];
        let mut last = None;
        for input in inputs {
            last = Some(workflow.provide_slot(&mut order, input, &audit()).expect("slot"));
        }
        let closed = last.expect("replies");
        assert_eq!(order.status, OrderStatus::Closed);
        assert_eq!(closed.kind, MessageKind::OrderClosed);
        assert!(closed.record_sale);
        assert!(closed.text.starts_with("Thank you, Ana Gomez!"));
        assert_eq!(order.customer.get(CustomerSlot::Phone), Some("3001234567"));
        assert!(sink.events().iter().all(|event| event.correlation_id == "req-1"));
    }

    #[test]
    fn rejected_slot_value_changes_nothing() {
        let (workflow, _) = workflow();
        let mut order = Order::new("chat-1");
        workflow.add_item(&mut order, &entity("2 gloves"), &audit()).expect("add");
        workflow.confirm(&mut order, &audit()).expect("confirm");
        let before = order.clone();

        let reply = workflow.provide_slot(&mut order, "12345", &audit()).expect("reply");
        assert_eq!(reply.kind, MessageKind::ValidationError);
        assert!(!reply.order_changed);
        assert_eq!(order, before);
    }

    #[test]
    fn adding_during_checkout_keeps_collecting() {
        let (workflow, _) = workflow();
        let mut order = Order::new("chat-1");
        workflow.add_item(&mut order, &entity("2 gloves"), &audit()).expect("add");
        workflow.confirm(&mut order, &audit()).expect("confirm");

        let reply = workflow.add_item(&mut order, &entity("also 3 gloves"), &audit()).expect("add");
        assert_eq!(order.status, OrderStatus::CollectingData);
        assert_eq!(order.line_items.len(), 2);
        assert!(reply.text.ends_with("Please send me your full name."));
    }

    #[test]
    fn cancel_records_reason_and_summary_reflects_state() {
        let (workflow, _) = workflow();
        let mut order = Order::new("chat-1");
        assert!(!workflow.cancel(&mut order, "cancel", &audit()).expect("reply").order_changed);

        workflow.add_item(&mut order, &entity("2 gloves"), &audit()).expect("add");
        assert!(workflow.summary(&order).text.contains("2 x Nitrile Gloves"));

        let reply = workflow.cancel(&mut order, "cancel, too expensive", &audit()).expect("cancel");
        assert_eq!(reply.kind, MessageKind::OrderCancelled);
        assert_eq!(order.status, OrderStatus::Cancelled);
        assert_eq!(order.cancel_reason.as_deref(), Some("too expensive"));
        assert!(workflow.summary(&order).text.starts_with("You don't have an active order"));
    }

    #[test]
    fn confirming_an_empty_cart_is_a_domain_error() {
        let (workflow, sink) = workflow();
        let mut order = Order::new("chat-1");
        assert!(workflow.confirm(&mut order, &audit()).is_err());
        assert_eq!(sink.events()[0].event_type, "flow.transition_rejected");
    }
}
