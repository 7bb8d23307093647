//! Fixed reply texts for checkout transitions. These never go through the LLM.

use tendero_core::catalog::format_price;
use tendero_core::domain::order::{CustomerSlot, LineItem, Order, OrderStatus};

pub const GENERATION_FALLBACK: &str =
    "Sorry, I'm having trouble answering right now. Please try again in a moment.";

pub fn item_added(order: &Order, item: &LineItem) -> String {
    format!(
        "Added {} x {} ({}). Your order total is {}. Would you like to add anything else, or \
         shall we confirm the order?",
        item.quantity,
        item.product_name,
        format_price(item.total),
        format_price(order.total())
    )
}

/// Used when an item is added mid checkout: the data collection picks up where it stopped.
pub fn item_added_during_checkout(order: &Order, item: &LineItem, next: CustomerSlot) -> String {
    format!(
        "Added {} x {} ({}). Your order total is now {}. {}",
        item.quantity,
        item.product_name,
        format_price(item.total),
        format_price(order.total()),
        slot_prompt(next)
    )
}

pub fn slot_prompt(slot: CustomerSlot) -> String {
    format!("Please send me your {}.", slot.label())
}

pub fn checkout_started(order: &Order, first: CustomerSlot) -> String {
    format!(
        "Great, your order comes to {}. To arrange delivery I need a few details. {}",
        format_price(order.total()),
        slot_prompt(first)
    )
}

pub fn slot_saved(saved: CustomerSlot, next: CustomerSlot) -> String {
    format!("Thanks, I saved your {}. {}", saved.label(), slot_prompt(next))
}

pub fn slot_rejected(reason: &str, next: CustomerSlot) -> String {
    format!("{reason} {}", slot_prompt(next))
}

pub fn order_closed(order: &Order) -> String {
    let name = order.customer.get(CustomerSlot::FullName).unwrap_or("there");
    format!(
        "Thank you, {name}! Your order is confirmed.\n{}\nWe will contact you to coordinate \
         the delivery.",
        order_lines(order)
    )
}

pub fn order_cancelled(reason: Option<&str>) -> String {
    match reason {
        Some(reason) => format!(
            "Your order has been cancelled (reason noted: {reason}). Let me know if there is \
             anything else I can help with."
        ),
        None => "Your order has been cancelled. Let me know if there is anything else I can \
                 help with."
            .to_string(),
    }
}

pub fn nothing_to_cancel() -> String {
    "You don't have an active order to cancel.".to_string()
}

pub fn order_summary(order: &Order) -> String {
    let mut text = format!("Your current order ({}):\n{}", order.status, order_lines(order));
    let missing = order.missing_slots();
    if order.status == OrderStatus::CollectingData {
        if let Some(next) = missing.first() {
            text.push('\n');
            text.push_str(&slot_prompt(*next));
        }
    }
    text
}

pub fn no_active_order() -> String {
    "You don't have an active order right now. Tell me what you need and I'll add it.".to_string()
}

pub fn empty_message() -> String {
    "Please write a message so I can help you.".to_string()
}

fn order_lines(order: &Order) -> String {
    let mut lines = order
        .line_items
        .iter()
        .map(|item| {
            format!(
                "- {} x {}: {}",
                item.quantity,
                item.product_name,
                format_price(item.total)
            )
        })
        .collect::<Vec<_>>();
    lines.push(format!("Total: {}", format_price(order.total())));
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use tendero_core::domain::order::{CustomerSlot, LineItem, Order, OrderStatus};
    use tendero_core::domain::product::{Product, ProductId};

    use super::{item_added, order_cancelled, order_summary, slot_saved};

    fn order() -> (Order, LineItem) {
        let product = Product {
            id: ProductId(1),
            name: "Fire Extinguisher ABC 10 lb".to_string(),
            description: String::new(),
            price: Decimal::new(85_000, 0),
            stock: 4,
            category: None,
            active: true,
        };
        let item = LineItem::new(&product, 3).expect("item");
        let mut order = Order::new("chat-1");
        order.add_line_item(item.clone()).expect("add");
        (order, item)
    }

    #[test]
    fn item_added_reports_line_and_total() {
        let (order, item) = order();
        let text = item_added(&order, &item);
        assert!(text.starts_with("Added 3 x Fire Extinguisher ABC 10 lb ($255,000)."));
        assert!(text.contains("anything else"));
    }

    #[test]
    fn summary_asks_for_the_next_slot_only_during_checkout() {
        let (mut order, _) = order();
        assert!(!order_summary(&order).contains("Please send me"));

        order.transition_to(OrderStatus::CollectingData).expect("checkout");
        order.customer.set(CustomerSlot::FullName, "Ana Gomez");
        let summary = order_summary(&order);
        assert!(summary.contains("Total: $255,000"));
        assert!(summary.ends_with("Please send me your national ID number."));
    }

    #[test]
    fn slot_and_cancel_texts() {
        assert_eq!(
            slot_saved(CustomerSlot::Phone, CustomerSlot::Address),
            "Thanks, I saved your mobile phone number. Please send me your delivery address."
        );
        assert!(order_cancelled(Some("too expensive")).contains("too expensive"));
    }
}
