//! Post-generation checks. The LLM never sets prices or moves an order; a reply that does either
//! is replaced before it reaches the customer.

use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use rust_decimal::Decimal;

use tendero_core::domain::order::MAX_QUANTITY;
use tendero_core::text::{contains_phrase, normalize};

static PRICE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\s?(\d[\d.,]*)").expect("price pattern compiles"));

const ORDER_STATE_CLAIMS: &[&str] = &[
    "your order is confirmed",
    "your order has been confirmed",
    "your order has been placed",
    "order has been cancelled",
    "i have added",
    "i've added",
    "added to your order",
    "added to your cart",
    "tu pedido esta confirmado",
    "pedido confirmado",
    "agregue a tu pedido",
    "pedido ha sido cancelado",
];

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardrailDecision {
    Allow,
    Deny { reason_code: &'static str, detail: String },
}

impl GuardrailDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GuardrailPolicy {
    pub llm_can_quote_unlisted_prices: bool,
    pub llm_can_claim_order_changes: bool,
}

impl Default for GuardrailPolicy {
    fn default() -> Self {
        Self { llm_can_quote_unlisted_prices: false, llm_can_claim_order_changes: false }
    }
}

impl GuardrailPolicy {
    /// `known_prices` are the catalog and order amounts handed to the model as context. A quoted
    /// amount passes when it equals one of them or a whole multiple within the quantity limit.
    pub fn evaluate(&self, reply: &str, known_prices: &[Decimal]) -> GuardrailDecision {
        if !self.llm_can_claim_order_changes {
            let normalized = normalize(reply);
            if let Some(claim) =
                ORDER_STATE_CLAIMS.iter().find(|phrase| contains_phrase(&normalized, phrase))
            {
                return GuardrailDecision::Deny {
                    reason_code: "order_state_claim",
                    detail: (*claim).to_string(),
                };
            }
        }

        if !self.llm_can_quote_unlisted_prices {
            if let Some(amount) = quoted_amounts(reply)
                .into_iter()
                .find(|amount| !is_known_amount(*amount, known_prices))
            {
                return GuardrailDecision::Deny {
                    reason_code: "unlisted_price",
                    detail: amount.to_string(),
                };
            }
        }

        GuardrailDecision::Allow
    }
}

/// Dollar amounts in the reply. `$85,000`, `$85.000` and `$12,500.50` are all understood.
pub fn quoted_amounts(reply: &str) -> Vec<Decimal> {
    PRICE_PATTERN
        .captures_iter(reply)
        .filter_map(|captures| captures.get(1))
        .filter_map(|raw| parse_amount(raw.as_str()))
        .collect()
}

fn parse_amount(raw: &str) -> Option<Decimal> {
    let trimmed = raw.trim_end_matches(['.', ',']);
    let segments = trimmed.split(['.', ',']).collect::<Vec<_>>();
    let text = match segments.as_slice() {
        [] => return None,
        [whole] => (*whole).to_string(),
        [head @ .., last] if last.len() <= 2 => format!("{}.{last}", head.concat()),
        all => all.concat(),
    };
    Decimal::from_str(&text).ok()
}

fn is_known_amount(amount: Decimal, known_prices: &[Decimal]) -> bool {
    known_prices.iter().filter(|price| !price.is_zero()).any(|price| {
        amount.checked_div(*price).is_some_and(|ratio| {
            ratio.fract().is_zero() && ratio >= Decimal::ONE && ratio <= Decimal::from(MAX_QUANTITY)
        })
    })
}
