//! Keyword detectors that drive the checkout state machine.
//!
//! Matching is whole-phrase on normalized text, so `ok` never fires inside `bookcase`. These are
//! heuristics; the classifier and extractor decide what happens when they disagree.

use crate::text::{contains_phrase, normalize};

const PURCHASE_PHRASES: &[&str] = &[
    "i want",
    "i'd like",
    "i would like",
    "i need",
    "need",
    "also",
    "add",
    "buy",
    "i'll take",
    "quiero",
    "necesito",
    "tambien",
    "agrega",
    "agregar",
    "agregame",
    "anade",
    "comprar",
    "me llevo",
];

const CONFIRMATION_PHRASES: &[&str] = &[
    "yes",
    "yeah",
    "yep",
    "confirm",
    "confirmed",
    "ok",
    "okay",
    "that's all",
    "thats it",
    "that is all",
    "give me the units",
    "go ahead",
    "si",
    "confirmo",
    "confirmar",
    "listo",
    "dale",
    "eso es todo",
    "dame las unidades",
];

const CANCELLATION_PHRASES: &[&str] = &[
    "cancel",
    "cancel order",
    "cancel my order",
    "forget it",
    "never mind",
    "cancelar",
    "cancela",
    "cancelo",
    "anular",
    "ya no quiero",
];

const ORDER_QUERY_PHRASES: &[&str] = &[
    "show my order",
    "show me my order",
    "view my order",
    "check my order",
    "what's in my order",
    "what is in my order",
    "what's in my cart",
    "what is in my cart",
    "show my cart",
    "show me my cart",
    "show cart",
    "view cart",
    "order summary",
    "order status",
    "ver mi pedido",
    "ver pedido",
    "muestrame mi pedido",
    "como va mi pedido",
    "que hay en mi carrito",
    "resumen del pedido",
];

const CATALOG_PHRASES: &[&str] = &[
    "what do you have",
    "what do you sell",
    "what products",
    "show me what you have",
    "show me your products",
    "show me everything",
    "all products",
    "all your products",
    "product list",
    "catalog",
    "catalogue",
    "full list",
    "que tienes",
    "que tienen",
    "que venden",
    "catalogo",
    "todos los productos",
    "lista de productos",
];

const CONFIRMATION_SOLICITING_PHRASES: &[&str] = &[
    "would you like to confirm",
    "do you want to confirm",
    "shall i confirm",
    "confirm your order",
    "confirm the order",
    "deseas confirmar",
    "quieres confirmar",
    "confirmas el pedido",
];

fn any_phrase(text: &str, phrases: &[&str]) -> bool {
    let normalized = normalize(text);
    phrases.iter().any(|phrase| contains_phrase(&normalized, phrase))
}

/// Explicit purchase wording. "Add item" wins over slot filling whenever this fires.
pub fn is_purchase_intent(text: &str) -> bool {
    any_phrase(text, PURCHASE_PHRASES)
}

pub fn is_confirmation(text: &str) -> bool {
    any_phrase(text, CONFIRMATION_PHRASES) && !is_cancellation(text)
}

pub fn is_cancellation(text: &str) -> bool {
    any_phrase(text, CANCELLATION_PHRASES)
}

/// A request to see the cart. Yields to any message that also adds, confirms or cancels, so
/// "add 2 gloves to my order" and "yes, confirm my order" still move the order forward.
pub fn is_order_query(text: &str) -> bool {
    any_phrase(text, ORDER_QUERY_PHRASES)
        && !is_purchase_intent(text)
        && !is_confirmation(text)
        && !is_cancellation(text)
}

pub fn is_catalog_browse(text: &str) -> bool {
    any_phrase(text, CATALOG_PHRASES)
}

/// Heuristic read of a generated reply: true when the assistant asked the customer to confirm.
pub fn solicits_confirmation(reply: &str) -> bool {
    any_phrase(reply, CONFIRMATION_SOLICITING_PHRASES)
}

/// Free text following the cancellation keyword, e.g. `cancel, too expensive` gives
/// `too expensive`. Filler words directly after the keyword are skipped.
pub fn cancellation_reason(text: &str) -> Option<String> {
    const FILLERS: &[&str] = &[
        "my", "the", "this", "order", "it", "please", "because", "since", "pedido", "el", "mi",
        "la", "orden", "porque", "por", "favor",
    ];

    let words = text.split_whitespace().collect::<Vec<_>>();
    let keyword_index = words.iter().position(|word| {
        let folded = normalize(word);
        folded.starts_with("cancel") || folded == "anular"
    })?;

    let reason = words[keyword_index + 1..]
        .iter()
        .skip_while(|word| FILLERS.contains(&normalize(word).as_str()))
        .copied()
        .collect::<Vec<_>>()
        .join(" ");
    let reason = reason.trim_matches(|character: char| character.is_ascii_punctuation()).trim();
    (!reason.is_empty()).then(|| reason.to_string())
}

#[cfg(test)]
mod tests {
    use super::{
        cancellation_reason, is_cancellation, is_catalog_browse, is_confirmation,
        is_order_query, is_purchase_intent, solicits_confirmation,
    };

    #[test]
    fn purchase_intent_keywords() {
        assert!(is_purchase_intent("I want 3 extinguishers"));
        assert!(is_purchase_intent("also 3 gloves"));
        assert!(is_purchase_intent("quiero 2 cascos"));
        assert!(!is_purchase_intent("Carrera 7 # 45-10"));
        assert!(!is_purchase_intent("show my order"));
    }

    #[test]
    fn confirmation_keywords() {
        assert!(is_confirmation("yes"));
        assert!(is_confirmation("Ok, that's all"));
        assert!(is_confirmation("sí, confirmo"));
        assert!(!is_confirmation("bookcase"));
        assert!(!is_confirmation("ok cancel it"));
    }

    #[test]
    fn order_query_and_catalog_browse() {
        assert!(is_order_query("what's in my cart?"));
        assert!(is_order_query("Show my order"));
        assert!(!is_order_query("cancel my order"));
        assert!(is_order_query("¿Cómo va mi pedido?"));
    }

    #[test]
    fn order_wording_inside_other_requests_is_not_a_lookup() {
        assert!(!is_order_query("add 2 nitrile gloves to my order"));
        assert!(is_purchase_intent("add 2 nitrile gloves to my order"));
        assert!(!is_order_query("yes, confirm my order"));
        assert!(is_confirmation("yes, confirm my order"));
        assert!(!is_order_query("I need 3 helmets for my order status report"));
        assert!(!is_order_query("agrega 2 guantes a mi pedido"));
        assert!(is_catalog_browse("what do you have available?"));
        assert!(is_catalog_browse("¿Qué tienen?"));
        assert!(!is_catalog_browse("do you have 10 lb extinguishers"));
    }

    #[test]
    fn cancellation_and_reason() {
        assert!(is_cancellation("cancel"));
        assert!(is_cancellation("Please cancel my order"));
        assert_eq!(cancellation_reason("cancel"), None);
        assert_eq!(
            cancellation_reason("cancel my order, it's too expensive").as_deref(),
            Some("it's too expensive")
        );
        assert_eq!(
            cancellation_reason("cancelar porque ya no lo necesito").as_deref(),
            Some("ya no lo necesito")
        );
    }

    #[test]
    fn detects_confirmation_soliciting_replies() {
        assert!(solicits_confirmation("Great choice! Would you like to confirm the order?"));
        assert!(!solicits_confirmation("Our extinguishers come in 10 and 20 lb sizes."));
    }
}
