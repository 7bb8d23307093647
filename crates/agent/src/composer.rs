use std::time::Duration;

use rust_decimal::Decimal;

use tendero_core::catalog::CATALOG_MARKER;
use tendero_core::domain::message::{Message, Sender};
use tendero_core::signals::solicits_confirmation;

use crate::guardrails::{GuardrailDecision, GuardrailPolicy};
use crate::llm::{complete_with_timeout, LlmClient, LlmRequest};
use crate::templates::GENERATION_FALLBACK;

/// What the model may lean on besides the conversation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ComposeContext {
    /// Retrieval output: a `CATALOG:` listing or a targeted product excerpt.
    Products(String),
    /// The static company-info block.
    Company,
}

#[derive(Clone, Debug)]
pub struct ComposeRequest<'a> {
    pub message: &'a str,
    pub context: ComposeContext,
    /// Oldest first.
    pub history: &'a [Message],
    pub tone: Option<&'a str>,
    pub instructions: Option<&'a str>,
    pub model: Option<String>,
    /// Amounts the reply may quote.
    pub known_prices: &'a [Decimal],
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ComposedReply {
    pub text: String,
    /// False when the fallback text was used.
    pub generated: bool,
    /// The reply asks the customer to confirm; an advisory signal only.
    pub solicits_confirmation: bool,
}

#[derive(Clone, Debug)]
pub struct ResponseComposer {
    company_info: String,
    default_tone: String,
    timeout: Duration,
    guardrails: GuardrailPolicy,
}

impl ResponseComposer {
    pub fn new(
        company_info: impl Into<String>,
        default_tone: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            company_info: company_info.into(),
            default_tone: default_tone.into(),
            timeout,
            guardrails: GuardrailPolicy::default(),
        }
    }

    pub fn with_guardrails(mut self, guardrails: GuardrailPolicy) -> Self {
        self.guardrails = guardrails;
        self
    }

    pub fn build_request(&self, request: &ComposeRequest<'_>) -> LlmRequest {
        let tone = request
            .tone
            .map(str::trim)
            .filter(|tone| !tone.is_empty())
            .unwrap_or(&self.default_tone);

        let mut system = format!(
            "You are the sales assistant of an industrial safety supply store. Answer in the \
             customer's language with a {tone} tone. Only mention products and prices that appear \
             in the context below. Never say that an order was created, changed, confirmed or \
             cancelled: the ordering system does that and tells the customer itself.\n\n"
        );

        match &request.context {
            ComposeContext::Products(listing) if listing.starts_with(CATALOG_MARKER) => {
                system.push_str(
                    "The customer asked for the catalog. Reproduce the full list below without \
                     summarizing or dropping items.\n",
                );
                system.push_str(listing);
            }
            ComposeContext::Products(listing) => {
                system.push_str("Catalog excerpt:\n");
                system.push_str(listing);
            }
            ComposeContext::Company => {
                system.push_str("About the store:\n");
                system.push_str(&self.company_info);
            }
        }

        if !request.history.is_empty() {
            system.push_str("\n\nRecent conversation:\n");
            for message in request.history {
                let speaker = match message.sender {
                    Sender::User => "Customer",
                    Sender::Agent | Sender::Bot => "Assistant",
                    Sender::System => "System",
                };
                system.push_str(&format!("{speaker}: {}\n", message.text.trim()));
            }
        }

        if let Some(instructions) = request.instructions.map(str::trim).filter(|text| !text.is_empty())
        {
            system.push_str("\nAdditional instructions: ");
            system.push_str(instructions);
        }

        LlmRequest::new(system.trim_end(), request.message.trim()).with_model(request.model.clone())
    }

    /// One generation call under the configured timeout. Failures and guardrail denials yield
    /// the fixed fallback text.
    pub async fn compose(
        &self,
        client: &dyn LlmClient,
        request: &ComposeRequest<'_>,
    ) -> ComposedReply {
        let llm_request = self.build_request(request);
        let text = match complete_with_timeout(client, &llm_request, self.timeout).await {
            Ok(text) => text,
            Err(error) => {
                tracing::warn!(
                    event_name = "composer.generation_failed",
                    provider = client.name(),
                    error = %error,
                    "generation failed; using fallback reply"
                );
                return fallback();
            }
        };

        if let GuardrailDecision::Deny { reason_code, detail } =
            self.guardrails.evaluate(&text, request.known_prices)
        {
            tracing::warn!(
                event_name = "composer.guardrail_denied",
                provider = client.name(),
                reason_code,
                detail = %detail,
                "generated reply rejected; using fallback reply"
            );
            return fallback();
        }

        ComposedReply { solicits_confirmation: solicits_confirmation(&text), text, generated: true }
    }
}

fn fallback() -> ComposedReply {
    ComposedReply {
        text: GENERATION_FALLBACK.to_string(),
        generated: false,
        solicits_confirmation: false,
    }
}
