use serde::{Deserialize, Serialize};

use crate::domain::order::{CustomerSlot, OrderStatus};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowEvent {
    ItemAdded,
    CheckoutConfirmed,
    SlotFilled,
    CancelRequested,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct FlowContext {
    pub line_item_count: usize,
    pub missing_required_slots: Vec<CustomerSlot>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowAction {
    ConfirmItemAdded,
    PromptForNextSlot,
    FinalizeOrder,
    RecordSale,
    ConfirmCancellation,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub event: FlowEvent,
    pub actions: Vec<FlowAction>,
}
