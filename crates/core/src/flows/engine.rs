use thiserror::Error;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::order::OrderStatus;
use crate::flows::states::{FlowAction, FlowContext, FlowEvent, TransitionOutcome};

pub trait FlowDefinition: Send + Sync {
    fn initial_state(&self) -> OrderStatus;
    fn transition(
        &self,
        current: OrderStatus,
        event: &FlowEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError>;
}

/// Cart accumulation, slot filling and finalization for a single conversation.
#[derive(Clone, Debug, Default)]
pub struct CheckoutFlow;

impl FlowDefinition for CheckoutFlow {
    fn initial_state(&self) -> OrderStatus {
        OrderStatus::None
    }

    fn transition(
        &self,
        current: OrderStatus,
        event: &FlowEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        transition_checkout(current, event, context)
    }
}

pub struct FlowEngine<F> {
    flow: F,
}

impl<F> FlowEngine<F>
where
    F: FlowDefinition,
{
    pub fn new(flow: F) -> Self {
        Self { flow }
    }

    pub fn initial_state(&self) -> OrderStatus {
        self.flow.initial_state()
    }

    pub fn apply(
        &self,
        current: OrderStatus,
        event: &FlowEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        self.flow.transition(current, event, context)
    }

    pub fn apply_with_audit<S>(
        &self,
        current: OrderStatus,
        event: &FlowEvent,
        context: &FlowContext,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<TransitionOutcome, FlowTransitionError>
    where
        S: AuditSink + ?Sized,
    {
        let result = self.apply(current, event, context);
        match &result {
            Ok(outcome) => {
                sink.emit(
                    AuditEvent::new(
                        audit,
                        "flow.transition_applied",
                        AuditCategory::Flow,
                        AuditOutcome::Success,
                    )
                    .with_metadata("from", outcome.from.as_str())
                    .with_metadata("to", outcome.to.as_str())
                    .with_metadata("event", format!("{:?}", outcome.event)),
                );
            }
            Err(error) => {
                sink.emit(
                    AuditEvent::new(
                        audit,
                        "flow.transition_rejected",
                        AuditCategory::Flow,
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("error", error.to_string()),
                );
            }
        }
        result
    }
}

impl Default for FlowEngine<CheckoutFlow> {
    fn default() -> Self {
        Self::new(CheckoutFlow)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FlowTransitionError {
    #[error("cannot start checkout from {state:?} with an empty cart")]
    EmptyCart { state: OrderStatus },
    #[error("invalid transition from {state:?} using event {event:?}")]
    InvalidTransition { state: OrderStatus, event: FlowEvent },
}

fn transition_checkout(
    current: OrderStatus,
    event: &FlowEvent,
    context: &FlowContext,
) -> Result<TransitionOutcome, FlowTransitionError> {
    use FlowAction::{
        ConfirmCancellation, ConfirmItemAdded, FinalizeOrder, PromptForNextSlot, RecordSale,
    };
    use FlowEvent::{CancelRequested, CheckoutConfirmed, ItemAdded, SlotFilled};
    use OrderStatus::{Cancelled, Closed, CollectingData, None, Pending};

    let (to, actions) = match (current, event) {
        (None, ItemAdded) | (Pending, ItemAdded) => (Pending, vec![ConfirmItemAdded]),
        (CollectingData, ItemAdded) => (CollectingData, vec![ConfirmItemAdded, PromptForNextSlot]),
        (Pending, CheckoutConfirmed) => {
            if context.line_item_count == 0 {
                return Err(FlowTransitionError::EmptyCart { state: current });
            }
            if context.missing_required_slots.is_empty() {
                (Closed, vec![FinalizeOrder, RecordSale])
            } else {
                (CollectingData, vec![PromptForNextSlot])
            }
        }
        (CollectingData, SlotFilled) if context.missing_required_slots.is_empty() => {
            (Closed, vec![FinalizeOrder, RecordSale])
        }
        (CollectingData, SlotFilled) => (CollectingData, vec![PromptForNextSlot]),
        (Pending, CancelRequested) | (CollectingData, CancelRequested) => {
            (Cancelled, vec![ConfirmCancellation])
        }
        _ => {
            return Err(FlowTransitionError::InvalidTransition {
                state: current,
                event: event.clone(),
            });
        }
    };

    Ok(TransitionOutcome { from: current, to, event: event.clone(), actions })
}

#[cfg(test)]
mod tests {
    use crate::audit::{AuditContext, InMemoryAuditSink};
    use crate::domain::order::{CustomerSlot, OrderStatus};
    use crate::flows::engine::{CheckoutFlow, FlowDefinition, FlowEngine, FlowTransitionError};
    use crate::flows::states::{FlowAction, FlowContext, FlowEvent};

    fn context(items: usize, missing: &[CustomerSlot]) -> FlowContext {
        FlowContext { line_item_count: items, missing_required_slots: missing.to_vec() }
    }

    #[test]
    fn checkout_happy_path() {
        let engine = FlowEngine::new(CheckoutFlow);
        let mut state = engine.initial_state();
        assert_eq!(state, OrderStatus::None);

        state = engine
            .apply(state, &FlowEvent::ItemAdded, &context(1, &CustomerSlot::REQUIRED))
            .expect("none -> pending")
            .to;
        assert_eq!(state, OrderStatus::Pending);

        let confirmed = engine
            .apply(state, &FlowEvent::CheckoutConfirmed, &context(1, &CustomerSlot::REQUIRED))
            .expect("pending -> collecting");
        assert_eq!(confirmed.to, OrderStatus::CollectingData);
        assert_eq!(confirmed.actions, vec![FlowAction::PromptForNextSlot]);

        let partial = engine
            .apply(
                confirmed.to,
                &FlowEvent::SlotFilled,
                &context(1, &[CustomerSlot::Neighborhood]),
            )
            .expect("still collecting");
        assert_eq!(partial.to, OrderStatus::CollectingData);

        let closed = engine
            .apply(partial.to, &FlowEvent::SlotFilled, &context(1, &[]))
            .expect("collecting -> closed");
        assert_eq!(closed.to, OrderStatus::Closed);
        assert!(closed.actions.contains(&FlowAction::RecordSale));
    }

    #[test]
    fn confirmation_requires_items() {
        let engine = FlowEngine::default();
        let error = engine
            .apply(OrderStatus::Pending, &FlowEvent::CheckoutConfirmed, &context(0, &[]))
            .expect_err("empty cart");
        assert_eq!(error, FlowTransitionError::EmptyCart { state: OrderStatus::Pending });
    }

    #[test]
    fn cancel_only_from_open_states() {
        let engine = FlowEngine::default();
        for open in [OrderStatus::Pending, OrderStatus::CollectingData] {
            let outcome = engine
                .apply(open, &FlowEvent::CancelRequested, &FlowContext::default())
                .expect("open orders cancel");
            assert_eq!(outcome.to, OrderStatus::Cancelled);
        }
        for closed in [OrderStatus::None, OrderStatus::Closed, OrderStatus::Cancelled] {
            assert!(engine
                .apply(closed, &FlowEvent::CancelRequested, &FlowContext::default())
                .is_err());
        }
    }

    #[test]
    fn slot_events_rejected_outside_checkout() {
        let engine = FlowEngine::default();
        let error = engine
            .apply(OrderStatus::Pending, &FlowEvent::SlotFilled, &FlowContext::default())
            .expect_err("not collecting");
        assert!(matches!(
            error,
            FlowTransitionError::InvalidTransition {
                state: OrderStatus::Pending,
                event: FlowEvent::SlotFilled
            }
        ));
    }

    #[test]
    fn replay_is_deterministic_for_same_event_sequence() {
        let engine = FlowEngine::default();
        let steps = [
            (FlowEvent::ItemAdded, context(1, &CustomerSlot::REQUIRED)),
            (FlowEvent::ItemAdded, context(2, &CustomerSlot::REQUIRED)),
            (FlowEvent::CheckoutConfirmed, context(2, &CustomerSlot::REQUIRED)),
            (FlowEvent::SlotFilled, context(2, &[])),
        ];

        let run = |engine: &FlowEngine<CheckoutFlow>| {
            let mut state = engine.initial_state();
            let mut actions = Vec::new();
            for (event, context) in &steps {
                let outcome = engine.apply(state, event, context).expect("deterministic run");
                actions.push(outcome.actions);
                state = outcome.to;
            }
            (state, actions)
        };

        let first = run(&engine);
        let second = run(&engine);
        assert_eq!(first, second);
        assert_eq!(first.0, OrderStatus::Closed);
        assert_eq!(CheckoutFlow.initial_state(), OrderStatus::None);
    }

    #[test]
    fn flow_transition_emits_audit_event() {
        let engine = FlowEngine::default();
        let sink = InMemoryAuditSink::default();

        engine
            .apply_with_audit(
                OrderStatus::None,
                &FlowEvent::ItemAdded,
                &context(1, &CustomerSlot::REQUIRED),
                &sink,
                &AuditContext::new(Some("chat-7".to_owned()), "req-42", "checkout"),
            )
            .expect("transition should succeed");

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].correlation_id, "req-42");
        assert_eq!(events[0].chat_id.as_deref(), Some("chat-7"));
        assert_eq!(events[0].event_type, "flow.transition_applied");
        assert_eq!(events[0].metadata.get("to").map(String::as_str), Some("pending"));
    }
}
