use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use tendero_core::text::normalize;

use crate::llm::{complete_with_timeout, LlmClient, LlmRequest};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    /// Questions about products, prices or availability.
    Inventory,
    /// The customer wants to buy something.
    Sale,
    /// Everything else: greetings, store info, small talk.
    Context,
}

impl Intent {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Inventory => "inventory",
            Self::Sale => "sale",
            Self::Context => "context",
        }
    }

    /// Reads a model label. Only the first word counts, so `Sale.` and `sale - they want
    /// gloves` both parse.
    pub fn parse_label(raw: &str) -> Option<Self> {
        let normalized = normalize(raw);
        match normalized.split_whitespace().next()? {
            "inventory" | "inventario" => Some(Self::Inventory),
            "sale" | "venta" => Some(Self::Sale),
            "context" | "contexto" => Some(Self::Context),
            _ => None,
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const CLASSIFIER_PROMPT: &str = "You label customer messages for an industrial safety supply \
store. Answer with exactly one word: inventory, sale or context.\n\
- inventory: the customer asks about products, prices, stock or specifications.\n\
- sale: the customer says they want to buy or order something.\n\
- context: anything else (greetings, delivery hours, payment methods, small talk).\n\n\
Examples:\n\
\"how much is the 20 lb extinguisher?\" -> inventory\n\
\"do you sell dielectric helmets\" -> inventory\n\
\"I need 4 pairs of gloves\" -> sale\n\
\"send me two first aid kits\" -> sale\n\
\"hello, good morning\" -> context\n\
\"do you deliver on saturdays?\" -> context";

/// Single best-effort classification call. Any failure yields [`Intent::Context`].
#[derive(Clone, Debug)]
pub struct IntentClassifier {
    timeout: Duration,
}

impl IntentClassifier {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn system_prompt(&self) -> &'static str {
        CLASSIFIER_PROMPT
    }

    pub async fn classify(&self, client: &dyn LlmClient, message: &str) -> Intent {
        if normalize(message).is_empty() {
            return Intent::Context;
        }

        let request = LlmRequest::new(CLASSIFIER_PROMPT, message.trim());
        match complete_with_timeout(client, &request, self.timeout).await {
            Ok(label) => match Intent::parse_label(&label) {
                Some(intent) => intent,
                None => {
                    tracing::warn!(
                        event_name = "classifier.out_of_vocabulary",
                        provider = client.name(),
                        label = %label,
                        "unrecognised intent label; using context"
                    );
                    Intent::Context
                }
            },
            Err(error) => {
                tracing::warn!(
                    event_name = "classifier.fallback",
                    provider = client.name(),
                    error = %error,
                    "intent classification failed; using context"
                );
                Intent::Context
            }
        }
    }
}

impl Default for IntentClassifier {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}
