use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use tendero_agent::{
    AgentRuntime, ChatReply, ChatRequest, LlmClient, LlmError, LlmRequest, LlmRouter,
    RuntimeSettings, Stores,
};
use tendero_core::domain::message::{Message, MessageKind, Sender};
use tendero_core::domain::order::{CustomerSlot, LineItem, Order, OrderStatus};
use tendero_core::domain::product::ProductId;
use tendero_core::extraction::QuantityError;
use tendero_db::{
    connect_with_settings, migrations, CatalogRepository, ConversationLog, DbPool, DemoCatalog,
    MessageFilter, OrderRepository, SqlCatalogRepository, SqlConversationLog, SqlOrderRepository,
};

/// Answers the intent classifier with `label` and everything else with `reply`, recording every
/// request it sees.
struct ScriptedLlm {
    label: &'static str,
    reply: Option<&'static str>,
    requests: Mutex<Vec<LlmRequest>>,
}

impl ScriptedLlm {
    fn new(label: &'static str, reply: &'static str) -> Arc<Self> {
        Arc::new(Self { label, reply: Some(reply), requests: Mutex::new(Vec::new()) })
    }

    fn unavailable() -> Arc<Self> {
        Arc::new(Self { label: "", reply: None, requests: Mutex::new(Vec::new()) })
    }

    fn calls(&self) -> Vec<LlmRequest> {
        self.requests.lock().expect("requests lock").clone()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &LlmRequest) -> Result<String, LlmError> {
        self.requests.lock().expect("requests lock").push(request.clone());
        let Some(reply) = self.reply else {
            return Err(LlmError::Status { status: 503, body: "unavailable".to_string() });
        };
        if request.system_prompt.starts_with("You label customer messages") {
            return Ok(self.label.to_string());
        }
        Ok(reply.to_string())
    }
}

async fn seeded_pool() -> DbPool {
    let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
    migrations::run_pending(&pool).await.expect("migrations");
    DemoCatalog::load(&pool).await.expect("seed demo catalog");
    pool
}

fn runtime(pool: &DbPool, llm: Arc<ScriptedLlm>) -> AgentRuntime {
    let (stores, _index) = Stores::sql(pool.clone(), 64);
    AgentRuntime::new(stores, LlmRouter::new(llm), RuntimeSettings::default())
}

async fn send(runtime: &AgentRuntime, chat_id: &str, message: &str) -> ChatReply {
    runtime.handle_message(ChatRequest::new(chat_id, message)).await
}

async fn extinguisher_stock(pool: &DbPool) -> i64 {
    let catalog = SqlCatalogRepository::new(pool.clone());
    let mut stock = 0;
    for id in 1..=3 {
        stock += catalog.find_by_id(ProductId(id)).await.expect("find").expect("seeded").stock;
    }
    stock
}

#[tokio::test]
async fn conversation_goes_from_first_item_to_recorded_sale() {
    let pool = seeded_pool().await;
    let llm = ScriptedLlm::new("context", "unused");
    let runtime = runtime(&pool, llm.clone());
    let stock_before = extinguisher_stock(&pool).await;

    let added = send(&runtime, "chat-1", "I want 3 extinguishers").await;
    assert_eq!(added.tipo_mensaje, MessageKind::OrderUpdate);
    assert_eq!(added.estado_venta, Some(OrderStatus::Pending));
    assert!(added.respuesta.contains("3 x Fire Extinguisher"));
    assert!(added.respuesta.contains("confirm the order"));
    let metadata = added.metadatos.expect("order metadata");
    assert_eq!(metadata["estado"], "pending");
    assert_eq!(metadata["line_items"].as_array().map(Vec::len), Some(1));
    assert_eq!(metadata["line_items"][0]["cantidad"], 3);

    let confirmed = send(&runtime, "chat-1", "yes").await;
    assert_eq!(confirmed.tipo_mensaje, MessageKind::SlotRequest);
    assert_eq!(confirmed.estado_venta, Some(OrderStatus::CollectingData));
    assert!(confirmed.respuesta.ends_with("Please send me your full name."));

    let phone = send(&runtime, "chat-1", "3001234567").await;
    assert_eq!(phone.estado_venta, Some(OrderStatus::CollectingData));
    assert_eq!(
        phone.respuesta,
        "Thanks, I saved your mobile phone number. Please send me your full name."
    );

    for input in ["Ana Gomez", "1020304050", "Calle 45 # 12-30", "Chapinero"] {
        let reply = send(&runtime, "chat-1", input).await;
        assert_eq!(reply.estado_venta, Some(OrderStatus::CollectingData), "after {input}");
        assert_eq!(reply.tipo_mensaje, MessageKind::SlotRequest, "after {input}");
    }

    let closed = send(&runtime, "chat-1", "none").await;
    assert_eq!(closed.tipo_mensaje, MessageKind::OrderClosed);
    assert_eq!(closed.estado_venta, Some(OrderStatus::Closed));
    assert!(closed.respuesta.starts_with("Thank you, Ana Gomez!"));

    let orders = SqlOrderRepository::new(pool.clone());
    let stored = orders.find_latest("chat-1").await.expect("find").expect("order stored");
    assert_eq!(stored.status, OrderStatus::Closed);
    assert!(stored.customer.is_complete());
    assert_eq!(extinguisher_stock(&pool).await, stock_before - 3);

    let after = send(&runtime, "chat-1", "show my order").await;
    assert_eq!(after.estado_venta, None);
    assert!(after.respuesta.starts_with("You don't have an active order"));
    assert!(llm.calls().is_empty(), "the checkout path never calls the model");
}

#[tokio::test]
async fn cancel_during_data_collection_stops_the_prompts() {
    let pool = seeded_pool().await;
    let runtime = runtime(&pool, ScriptedLlm::new("context", "unused"));

    send(&runtime, "chat-2", "I want 2 nitrile gloves").await;
    send(&runtime, "chat-2", "yes").await;
    let cancelled = send(&runtime, "chat-2", "cancel").await;

    assert_eq!(cancelled.tipo_mensaje, MessageKind::OrderCancelled);
    assert_eq!(cancelled.estado_venta, Some(OrderStatus::Cancelled));
    assert!(!cancelled.respuesta.contains("Please send me"));

    let log = SqlConversationLog::new(pool.clone());
    let latest = log
        .latest_messages("chat-2", 1, MessageFilter::WithOrderStatus)
        .await
        .expect("latest");
    assert_eq!(latest[0].order_status, Some(OrderStatus::Cancelled));
}

#[tokio::test]
async fn catalog_browse_lists_available_products_without_the_model() {
    let pool = seeded_pool().await;
    let llm = ScriptedLlm::new("inventory", "unused");
    let runtime = runtime(&pool, llm.clone());

    let reply = send(&runtime, "chat-3", "what do you have available?").await;

    assert_eq!(reply.tipo_mensaje, MessageKind::Catalog);
    assert_eq!(reply.estado_venta, None);
    assert!(reply.respuesta.starts_with("CATALOG:"));
    assert!(reply.respuesta.contains("Nitrile Gloves"));
    assert!(!reply.respuesta.contains("Traffic Cone"));
    assert!(!reply.respuesta.contains("Respirator"));
    let metadata = reply.metadatos.expect("product ids");
    assert_eq!(metadata["product_ids"].as_array().map(Vec::len), Some(10));
    assert!(llm.calls().is_empty());
}

#[tokio::test]
async fn invalid_quantity_is_explained_and_changes_nothing() {
    let pool = seeded_pool().await;
    let runtime = runtime(&pool, ScriptedLlm::new("context", "unused"));

    let reply = send(&runtime, "chat-4", "-5 helmets").await;

    assert_eq!(reply.tipo_mensaje, MessageKind::ValidationError);
    assert_eq!(reply.respuesta, QuantityError::NonPositive(-5).user_message());
    assert_eq!(reply.estado_venta, None);
    let orders = SqlOrderRepository::new(pool.clone());
    assert!(orders.find_latest("chat-4").await.expect("find").is_none());
}

#[tokio::test]
async fn open_order_is_rebuilt_from_the_log_when_no_record_exists() {
    let pool = seeded_pool().await;
    let catalog = SqlCatalogRepository::new(pool.clone());
    let gloves = catalog.find_by_id(ProductId(6)).await.expect("find").expect("seeded");
    let mut order = Order::new("chat-5");
    order.add_line_item(LineItem::new(&gloves, 4).expect("item")).expect("add");
    SqlConversationLog::new(pool.clone())
        .append_message(
            Message::new("chat-5", Sender::Agent, "Added 4 x Nitrile Gloves")
                .with_kind(MessageKind::OrderUpdate)
                .with_order(&order),
        )
        .await
        .expect("log");

    let runtime = runtime(&pool, ScriptedLlm::new("context", "unused"));
    let reply = send(&runtime, "chat-5", "yes").await;

    assert_eq!(reply.estado_venta, Some(OrderStatus::CollectingData));
    let stored = SqlOrderRepository::new(pool.clone())
        .find_latest("chat-5")
        .await
        .expect("find")
        .expect("order inserted");
    assert_eq!(stored.line_items.len(), 1);
    assert_eq!(stored.line_items[0].quantity, 4);
}

#[tokio::test]
async fn product_question_is_answered_from_the_catalog() {
    let pool = seeded_pool().await;
    let llm = ScriptedLlm::new("inventory", "Yes! The Reflective Vest Orange costs $22,000.");
    let runtime = runtime(&pool, llm.clone());

    let reply = send(&runtime, "chat-6", "do you have reflective vests?").await;

    assert_eq!(reply.tipo_mensaje, MessageKind::ProductInfo);
    assert_eq!(reply.respuesta, "Yes! The Reflective Vest Orange costs $22,000.");
    assert_eq!(reply.estado_venta, None);
    let metadata = reply.metadatos.expect("product ids");
    let ids = metadata["product_ids"].as_array().cloned().unwrap_or_default();
    assert!(ids.iter().any(|id| id == 8));

    let generation = llm
        .calls()
        .into_iter()
        .find(|request| !request.system_prompt.starts_with("You label customer messages"))
        .expect("generation call");
    assert!(generation.system_prompt.contains("Reflective Vest Orange"));
}

#[tokio::test]
async fn model_outage_falls_back_to_a_fixed_apology() {
    let pool = seeded_pool().await;
    let runtime = runtime(&pool, ScriptedLlm::unavailable());

    let reply = send(&runtime, "chat-7", "good morning, who am I talking to?").await;

    assert_eq!(reply.tipo_mensaje, MessageKind::General);
    assert_eq!(
        reply.respuesta,
        "Sorry, I'm having trouble answering right now. Please try again in a moment."
    );
    assert_eq!(reply.estado_venta, None);
}

#[tokio::test]
async fn adding_to_my_order_adds_instead_of_showing_the_cart() {
    let pool = seeded_pool().await;
    let runtime = runtime(&pool, ScriptedLlm::new("context", "unused"));

    let reply = send(&runtime, "chat-8", "add 2 nitrile gloves to my order").await;

    assert_eq!(reply.tipo_mensaje, MessageKind::OrderUpdate);
    assert_eq!(reply.estado_venta, Some(OrderStatus::Pending));
    let metadata = reply.metadatos.expect("order metadata");
    assert_eq!(metadata["line_items"][0]["product_id"], 6);
    assert_eq!(metadata["line_items"][0]["cantidad"], 2);

    let shown = send(&runtime, "chat-8", "what's in my cart?").await;
    assert_eq!(shown.tipo_mensaje, MessageKind::OrderSummary);
    assert!(shown.respuesta.contains("2 x Nitrile Gloves"));
}

#[tokio::test]
async fn confirming_my_order_starts_data_collection() {
    let pool = seeded_pool().await;
    let runtime = runtime(&pool, ScriptedLlm::new("context", "unused"));

    send(&runtime, "chat-9", "I want 2 nitrile gloves").await;
    let reply = send(&runtime, "chat-9", "yes, confirm my order").await;

    assert_eq!(reply.tipo_mensaje, MessageKind::SlotRequest);
    assert_eq!(reply.estado_venta, Some(OrderStatus::CollectingData));
    assert!(reply.respuesta.ends_with("Please send me your full name."));
}

#[tokio::test]
async fn purchase_wording_during_checkout_adds_instead_of_filling_a_slot() {
    let pool = seeded_pool().await;
    let runtime = runtime(&pool, ScriptedLlm::new("context", "unused"));
    let orders = SqlOrderRepository::new(pool.clone());

    send(&runtime, "chat-10", "I want 2 nitrile gloves").await;
    send(&runtime, "chat-10", "yes").await;

    let added = send(&runtime, "chat-10", "also 3 gloves").await;
    assert_eq!(added.tipo_mensaje, MessageKind::OrderUpdate);
    assert_eq!(added.estado_venta, Some(OrderStatus::CollectingData));
    assert!(added.respuesta.ends_with("Please send me your full name."));

    let stored = orders.find_latest("chat-10").await.expect("find").expect("stored");
    assert_eq!(stored.line_items.len(), 2);
    assert_eq!(stored.line_items[1].quantity, 3);
    assert_eq!(stored.missing_slots().len(), CustomerSlot::REQUIRED.len());

    let rejected = send(&runtime, "chat-10", "-5 helmets").await;
    assert_eq!(rejected.tipo_mensaje, MessageKind::ValidationError);
    assert_eq!(rejected.respuesta, QuantityError::NonPositive(-5).user_message());
    assert_eq!(rejected.estado_venta, Some(OrderStatus::CollectingData));

    let unchanged = orders.find_latest("chat-10").await.expect("find").expect("stored");
    assert_eq!(unchanged.version, stored.version);
    assert_eq!(unchanged.line_items.len(), 2);
    assert_eq!(unchanged.missing_slots().len(), CustomerSlot::REQUIRED.len());
}

#[tokio::test]
async fn unreadable_order_record_is_treated_as_no_active_order() {
    let pool = seeded_pool().await;
    let runtime = runtime(&pool, ScriptedLlm::new("context", "Hello! How can I help you today?"));

    send(&runtime, "chat-11", "I want 2 nitrile gloves").await;
    sqlx::query("UPDATE customer_order SET line_items_json = '{not json' WHERE chat_id = ?")
        .bind("chat-11")
        .execute(&pool)
        .await
        .expect("corrupt the stored cart");

    let shown = send(&runtime, "chat-11", "show my order").await;
    assert_eq!(shown.tipo_mensaje, MessageKind::OrderSummary);
    assert_eq!(shown.estado_venta, None);
    assert!(shown.respuesta.starts_with("You don't have an active order"));

    let added = send(&runtime, "chat-11", "I want 3 nitrile gloves").await;
    assert_eq!(added.tipo_mensaje, MessageKind::OrderUpdate);
    assert_eq!(added.estado_venta, Some(OrderStatus::Pending));
    let metadata = added.metadatos.expect("order metadata");
    assert_eq!(metadata["line_items"].as_array().map(Vec::len), Some(1));
    assert_eq!(metadata["line_items"][0]["cantidad"], 3);

    let greeting = send(&runtime, "chat-11", "hello").await;
    assert_eq!(greeting.tipo_mensaje, MessageKind::General);
    assert_eq!(greeting.respuesta, "Hello! How can I help you today?");
}
