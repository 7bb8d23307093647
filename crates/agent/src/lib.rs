//! Agent runtime: turns one customer message into one reply and at most one order change.
//!
//! Each turn follows a constrained loop:
//! 1. **Detection** - keyword signals, entity extraction and slot detection (`tendero-core`)
//! 2. **Checkout** (`checkout`) - deterministic order transitions through the flow engine
//! 3. **Retrieval** (`retrieval`, `vector`) - catalog grounding for product questions
//! 4. **Generation** (`classifier`, `composer`) - LLM calls for intent labels and free text
//! 5. **Guardrails** (`guardrails`) - generated text is checked before it is sent
//!
//! # Key Types
//!
//! - `AgentRuntime` - Main orchestrator (see `runtime` module)
//! - `LlmClient` - Pluggable trait for OpenAI-compatible and Ollama backends
//! - `GuardrailPolicy` - Rejects generated prices and order-state claims
//!
//! # Safety Principle
//!
//! The LLM is strictly a translator. It NEVER decides prices, quantities,
//! or order transitions. Those are deterministic decisions made by the core.

pub mod checkout;
pub mod classifier;
pub mod composer;
pub mod guardrails;
pub mod llm;
pub mod retrieval;
pub mod runtime;
pub mod templates;
pub mod vector;

pub use checkout::{CheckoutReply, CheckoutWorkflow};
pub use classifier::{Intent, IntentClassifier};
pub use composer::{ComposeContext, ComposeRequest, ComposedReply, ResponseComposer};
pub use guardrails::{GuardrailDecision, GuardrailPolicy};
pub use llm::{HttpLlmClient, LlmClient, LlmError, LlmRequest, LlmRouter};
pub use retrieval::{HybridRetriever, RetrievalResult, RetrievalSettings};
pub use runtime::{AgentRuntime, ChatReply, ChatRequest, RuntimeSettings, Stores};
pub use vector::{EmbeddingIndex, Embedder, HashingEmbedder, VectorError, VectorSearch};
