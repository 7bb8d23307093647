use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::Instrument;
use uuid::Uuid;

use tendero_core::audit::{
    AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink, TracingAuditSink,
};
use tendero_core::catalog::{group_by_base_name, render_groups};
use tendero_core::config::AppConfig;
use tendero_core::domain::message::{reconstruct_open_order, Message, MessageKind, OrderSnapshot, Sender};
use tendero_core::domain::order::{Order, OrderStatus};
use tendero_core::domain::product::Product;
use tendero_core::errors::ApplicationError;
use tendero_core::extraction::{EntityExtractor, Extraction, QuantityError, ResolvedEntity};
use tendero_core::signals::{
    is_cancellation, is_catalog_browse, is_confirmation, is_order_query, is_purchase_intent,
};
use tendero_db::{
    CatalogRepository, ConversationLog, DbPool, MessageFilter, OrderRepository, RepositoryError,
    SalesRecorder, SqlCatalogRepository, SqlConversationLog, SqlOrderRepository, SqlSalesRecorder,
};

use crate::checkout::{CheckoutReply, CheckoutWorkflow};
use crate::classifier::{Intent, IntentClassifier};
use crate::composer::{ComposeContext, ComposeRequest, ResponseComposer};
use crate::llm::{LlmClient, LlmRouter};
use crate::retrieval::{HybridRetriever, RetrievalSettings};
use crate::templates;
use crate::vector::{EmbeddingIndex, HashingEmbedder, VectorSearch};

/// Messages scanned when the order has to be rebuilt from the log.
const RECONSTRUCTION_WINDOW: u32 = 50;
const UNREADABLE_ORDER_REASON: &str = "unreadable order record";

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    pub chat_id: String,
    #[serde(default)]
    pub tone: Option<String>,
    #[serde(default)]
    pub instructions: Option<String>,
    /// Opaque provider selection forwarded to the [`LlmRouter`].
    #[serde(default)]
    pub llm: Option<String>,
}

impl ChatRequest {
    pub fn new(chat_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self { chat_id: chat_id.into(), message: message.into(), ..Self::default() }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatReply {
    pub respuesta: String,
    /// Status of the conversation's order after this turn; `None` when there is no order.
    pub estado_venta: Option<OrderStatus>,
    pub tipo_mensaje: MessageKind,
    pub metadatos: Option<Value>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuntimeSettings {
    pub company_info: String,
    pub default_tone: String,
    pub history_window: u32,
    pub classify_timeout: Duration,
    pub generate_timeout: Duration,
    pub retrieval: RetrievalSettings,
}

impl RuntimeSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            company_info: config.assistant.company_info.clone(),
            default_tone: config.assistant.default_tone.clone(),
            history_window: config.assistant.history_window,
            classify_timeout: Duration::from_secs(config.llm.classify_timeout_secs),
            generate_timeout: Duration::from_secs(config.llm.generate_timeout_secs),
            retrieval: RetrievalSettings::from(&config.retrieval),
        }
    }
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// The collaborators the runtime reads from and writes to.
#[derive(Clone)]
pub struct Stores {
    pub catalog: Arc<dyn CatalogRepository>,
    pub conversation: Arc<dyn ConversationLog>,
    pub orders: Arc<dyn OrderRepository>,
    pub sales: Arc<dyn SalesRecorder>,
    pub vector: Option<Arc<dyn VectorSearch>>,
}

impl Stores {
    /// SQLite-backed stores sharing one pool. The embedding index is returned separately so the
    /// caller can schedule rebuilds.
    pub fn sql(pool: DbPool, embedding_dimensions: usize) -> (Self, Arc<EmbeddingIndex>) {
        let catalog: Arc<dyn CatalogRepository> = Arc::new(SqlCatalogRepository::new(pool.clone()));
        let index = Arc::new(EmbeddingIndex::new(
            catalog.clone(),
            Arc::new(HashingEmbedder::new(embedding_dimensions)),
        ));
        let stores = Self {
            catalog,
            conversation: Arc::new(SqlConversationLog::new(pool.clone())),
            orders: Arc::new(SqlOrderRepository::new(pool.clone())),
            sales: Arc::new(SqlSalesRecorder::new(pool)),
            vector: Some(index.clone()),
        };
        (stores, index)
    }
}

/// What a routed turn decided, before anything is persisted.
struct Turn {
    text: String,
    kind: MessageKind,
    order_changed: bool,
    record_sale: bool,
    /// Attach the order snapshot to the reply and the logged agent message.
    carries_order: bool,
    /// A generated reply asked the customer to confirm.
    advisory_pending: bool,
    extra: Option<Value>,
}

impl Turn {
    fn plain(text: impl Into<String>, kind: MessageKind) -> Self {
        Self {
            text: text.into(),
            kind,
            order_changed: false,
            record_sale: false,
            carries_order: false,
            advisory_pending: false,
            extra: None,
        }
    }

    fn with_extra(mut self, extra: Value) -> Self {
        self.extra = Some(extra);
        self
    }
}

impl From<CheckoutReply> for Turn {
    fn from(reply: CheckoutReply) -> Self {
        Self {
            text: reply.text,
            kind: reply.kind,
            order_changed: reply.order_changed,
            record_sale: reply.record_sale,
            carries_order: true,
            advisory_pending: false,
            extra: None,
        }
    }
}

/// Per-request inputs threaded through routing.
struct TurnInput<'a> {
    request: &'a ChatRequest,
    text: &'a str,
    user_message: &'a Message,
    llm: Arc<dyn LlmClient>,
    audit: AuditContext,
}

pub struct AgentRuntime {
    stores: Stores,
    llm: LlmRouter,
    extractor: EntityExtractor,
    classifier: IntentClassifier,
    retriever: HybridRetriever,
    composer: ResponseComposer,
    checkout: CheckoutWorkflow,
    audit: Arc<dyn AuditSink>,
    history_window: u32,
}

impl AgentRuntime {
    pub fn new(stores: Stores, llm: LlmRouter, settings: RuntimeSettings) -> Self {
        Self::with_audit_sink(stores, llm, settings, Arc::new(TracingAuditSink))
    }

    pub fn with_audit_sink(
        stores: Stores,
        llm: LlmRouter,
        settings: RuntimeSettings,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        let retriever =
            HybridRetriever::new(stores.catalog.clone(), stores.vector.clone(), settings.retrieval);
        Self {
            retriever,
            llm,
            extractor: EntityExtractor::default(),
            classifier: IntentClassifier::new(settings.classify_timeout),
            composer: ResponseComposer::new(
                settings.company_info,
                settings.default_tone,
                settings.generate_timeout,
            ),
            checkout: CheckoutWorkflow::with_audit(audit.clone()),
            audit,
            history_window: settings.history_window,
            stores,
        }
    }

    /// Handles one inbound message end to end. Never fails: every error becomes a well-formed
    /// reply and the conversation only reports state that was actually persisted.
    pub async fn handle_message(&self, request: ChatRequest) -> ChatReply {
        let correlation_id = Uuid::new_v4().to_string();
        let chat_id = request.chat_id.trim().to_string();
        let span = tracing::info_span!("chat_turn", correlation_id = %correlation_id, chat_id = %chat_id);
        self.handle_turn(request, chat_id, correlation_id).instrument(span).await
    }

    async fn handle_turn(
        &self,
        request: ChatRequest,
        chat_id: String,
        correlation_id: String,
    ) -> ChatReply {
        let text = request.message.trim();
        if text.is_empty() || chat_id.is_empty() {
            return reply_without_order(templates::empty_message(), MessageKind::ValidationError);
        }

        let audit = AuditContext::new(Some(chat_id.clone()), correlation_id.clone(), "runtime");
        self.audit.emit(
            AuditEvent::new(&audit, "chat.message_received", AuditCategory::Ingress, AuditOutcome::Success)
                .with_metadata("length", text.chars().count().to_string()),
        );

        let mut order = match self.load_order(&chat_id).await {
            Ok(order) => order,
            Err(error) => return self.persistence_failure(&audit, "load_order", &error),
        };
        let version = order.version;

        let user_message = match self
            .stores
            .conversation
            .append_message(Message::new(&chat_id, Sender::User, text))
            .await
        {
            Ok(message) => message,
            Err(error) => return self.persistence_failure(&audit, "append_user_message", &error),
        };

        let input = TurnInput {
            request: &request,
            text,
            user_message: &user_message,
            llm: self.llm.select(request.llm.as_deref()),
            audit,
        };
        let turn = match self.route(&input, &mut order).await {
            Ok(turn) => turn,
            Err(error) => return self.turn_failure(&input.audit, error),
        };

        self.persist(input.audit, &chat_id, order, version, turn).await
    }

    /// Latest order record when it is still open. Without any record, the open order is rebuilt
    /// from the conversation log and inserted on the next save. A record that no longer decodes
    /// is retired and the turn starts from an empty cart.
    async fn load_order(&self, chat_id: &str) -> Result<Order, RepositoryError> {
        let latest = match self.stores.orders.find_latest(chat_id).await {
            Ok(latest) => latest,
            Err(RepositoryError::Decode(detail)) => {
                tracing::warn!(
                    event_name = "order.unreadable",
                    chat_id = %chat_id,
                    detail = %detail,
                    "stored order could not be decoded; treating as no active order"
                );
                self.stores.orders.retire_latest(chat_id, UNREADABLE_ORDER_REASON).await?;
                return Ok(Order::new(chat_id));
            }
            Err(error) => return Err(error),
        };
        match latest {
            Some(order) if order.is_open() => Ok(order),
            Some(_) => Ok(Order::new(chat_id)),
            None => {
                let window = self
                    .stores
                    .conversation
                    .latest_messages(chat_id, RECONSTRUCTION_WINDOW, MessageFilter::WithOrderStatus)
                    .await?;
                Ok(reconstruct_open_order(chat_id, &window).unwrap_or_else(|| Order::new(chat_id)))
            }
        }
    }

    async fn route(
        &self,
        input: &TurnInput<'_>,
        order: &mut Order,
    ) -> Result<Turn, ApplicationError> {
        let text = input.text;
        let audit = &input.audit;

        if is_order_query(text) {
            let mut turn = Turn::from(self.checkout.summary(order));
            turn.carries_order = order.is_open();
            return Ok(turn);
        }
        if is_cancellation(text) {
            let mut turn = Turn::from(self.checkout.cancel(order, text, audit)?);
            turn.carries_order = turn.order_changed;
            return Ok(turn);
        }
        if is_catalog_browse(text) {
            let browse = self.retriever.browse().await.map_err(persistence)?;
            let ids = browse.product_ids();
            return Ok(Turn::plain(browse.text, MessageKind::Catalog)
                .with_extra(json!({ "product_ids": ids })));
        }

        let catalog = self.stores.catalog.list_active_products().await.map_err(persistence)?;
        let extraction = self.extractor.extract(text, &catalog);
        let purchase = is_purchase_intent(text);

        if order.status == OrderStatus::CollectingData {
            return Ok(match extraction {
                Extraction::Resolved(entity) if purchase => {
                    Turn::from(self.checkout.add_item(order, &entity, audit)?)
                }
                // A negative or zero count next to a product is never customer data.
                Extraction::Invalid(error)
                    if purchase || matches!(error, QuantityError::NonPositive(_)) =>
                {
                    Turn::plain(error.user_message(), MessageKind::ValidationError)
                }
                _ => Turn::from(self.checkout.provide_slot(order, text, audit)?),
            });
        }

        let resolved_purchase = matches!(extraction, Extraction::Resolved(_)) && purchase;
        if order.status == OrderStatus::Pending && is_confirmation(text) && !resolved_purchase {
            return Ok(Turn::from(self.checkout.confirm(order, audit)?));
        }

        match extraction {
            Extraction::Invalid(error) => {
                Ok(Turn::plain(error.user_message(), MessageKind::ValidationError))
            }
            Extraction::Resolved(entity) if purchase => {
                Ok(Turn::from(self.checkout.add_item(order, &entity, audit)?))
            }
            Extraction::Resolved(entity) => {
                match self.classifier.classify(input.llm.as_ref(), text).await {
                    Intent::Sale => Ok(Turn::from(self.checkout.add_item(order, &entity, audit)?)),
                    Intent::Inventory | Intent::Context => {
                        self.product_info(input, order, Some(&entity)).await
                    }
                }
            }
            Extraction::None => match self.classifier.classify(input.llm.as_ref(), text).await {
                Intent::Inventory | Intent::Sale => self.product_info(input, order, None).await,
                Intent::Context => self.general(input, order).await,
            },
        }
    }

    async fn product_info(
        &self,
        input: &TurnInput<'_>,
        order: &Order,
        entity: Option<&ResolvedEntity>,
    ) -> Result<Turn, ApplicationError> {
        let mut retrieved = self.retriever.search(input.text).await.map_err(persistence)?;
        if let Some(entity) = entity {
            if !retrieved.products.iter().any(|product| product.id == entity.product.id)
                && entity.product.is_available()
            {
                retrieved.products.insert(0, entity.product.clone());
                retrieved.text = format!(
                    "Products matching the question:\n{}",
                    render_groups(&group_by_base_name(&retrieved.products))
                );
            }
        }
        let ids = retrieved.product_ids();
        if retrieved.is_empty() {
            return Ok(Turn::plain(retrieved.text, MessageKind::ProductInfo)
                .with_extra(json!({ "product_ids": ids })));
        }

        let prices = known_prices(&retrieved.products, order);
        let mut turn = self
            .generate(input, order, ComposeContext::Products(retrieved.text), &prices, MessageKind::ProductInfo)
            .await?;
        turn.extra = Some(json!({ "product_ids": ids }));
        Ok(turn)
    }

    async fn general(&self, input: &TurnInput<'_>, order: &Order) -> Result<Turn, ApplicationError> {
        let prices = known_prices(&[], order);
        self.generate(input, order, ComposeContext::Company, &prices, MessageKind::General).await
    }

    async fn generate(
        &self,
        input: &TurnInput<'_>,
        order: &Order,
        context: ComposeContext,
        known_prices: &[Decimal],
        kind: MessageKind,
    ) -> Result<Turn, ApplicationError> {
        let mut history = self
            .stores
            .conversation
            .latest_messages(&order.chat_id, self.history_window, MessageFilter::All)
            .await
            .map_err(persistence)?;
        history.retain(|message| message.id != input.user_message.id);
        history.reverse();

        let composed = self
            .composer
            .compose(
                input.llm.as_ref(),
                &ComposeRequest {
                    message: input.text,
                    context,
                    history: &history,
                    tone: input.request.tone.as_deref(),
                    instructions: input.request.instructions.as_deref(),
                    model: None,
                    known_prices,
                },
            )
            .await;

        self.audit.emit(
            AuditEvent::new(
                &input.audit,
                "generation.completed",
                AuditCategory::Generation,
                if composed.generated { AuditOutcome::Success } else { AuditOutcome::Failed },
            )
            .with_metadata("provider", input.llm.name()),
        );

        let mut turn = Turn::plain(composed.text, kind);
        turn.advisory_pending = composed.solicits_confirmation;
        Ok(turn)
    }

    /// Saves the order first; the reply only reports what was stored. The sale handoff and the
    /// agent log entry come after and cannot undo the save.
    async fn persist(
        &self,
        audit: AuditContext,
        chat_id: &str,
        mut order: Order,
        expected_version: i64,
        turn: Turn,
    ) -> ChatReply {
        if turn.order_changed {
            match self.stores.orders.save(&order, expected_version).await {
                Ok(saved) => order = saved,
                Err(error) => return self.persistence_failure(&audit, "save_order", &error),
            }
        }

        if turn.record_sale {
            match self.stores.sales.record_sale(&order).await {
                Ok(receipt) => self.audit.emit(
                    AuditEvent::new(&audit, "sale.recorded", AuditCategory::Persistence, AuditOutcome::Success)
                        .with_metadata("sale_id", receipt.sale_id)
                        .with_metadata("total", receipt.total.to_string()),
                ),
                Err(error) => {
                    tracing::error!(
                        event_name = "sale.handoff_failed",
                        correlation_id = %audit.correlation_id,
                        chat_id = %chat_id,
                        order_id = %order.id.0,
                        error = %error,
                        "sales recording failed; order stays closed"
                    );
                    self.audit.emit(
                        AuditEvent::new(&audit, "sale.handoff_failed", AuditCategory::Persistence, AuditOutcome::Failed)
                            .with_metadata("order_id", order.id.0.clone()),
                    );
                }
            }
        }

        let carries_order = turn.carries_order && order.status != OrderStatus::None;
        let mut agent_message = Message::new(chat_id, Sender::Agent, turn.text.clone()).with_kind(turn.kind);
        if carries_order {
            agent_message = agent_message.with_order(&order);
        }
        if let Err(error) = self.stores.conversation.append_message(agent_message).await {
            tracing::error!(
                event_name = "conversation.append_reply_failed",
                correlation_id = %audit.correlation_id,
                chat_id = %chat_id,
                error = %error,
                "agent reply could not be logged; order state is already saved"
            );
        }

        let estado_venta = match order.status {
            OrderStatus::None if turn.advisory_pending => Some(OrderStatus::Pending),
            OrderStatus::None => None,
            status if carries_order || status.is_open() => Some(status),
            _ => None,
        };
        let metadatos = if carries_order { Some(order_metadata(&order)) } else { turn.extra };

        ChatReply { respuesta: turn.text, estado_venta, tipo_mensaje: turn.kind, metadatos }
    }

    fn persistence_failure(
        &self,
        audit: &AuditContext,
        operation: &'static str,
        error: &RepositoryError,
    ) -> ChatReply {
        if let RepositoryError::VersionConflict { .. } = error {
            tracing::warn!(
                event_name = "order.version_conflict",
                correlation_id = %audit.correlation_id,
                chat_id = audit.chat_id.as_deref().unwrap_or("unknown"),
                operation,
                error = %error,
                "concurrent update on this conversation; asking the customer to retry"
            );
        } else {
            tracing::error!(
                event_name = "persistence.failed",
                correlation_id = %audit.correlation_id,
                chat_id = audit.chat_id.as_deref().unwrap_or("unknown"),
                operation,
                error = %error,
                "persistence failure; no state change reported"
            );
        }
        self.audit.emit(
            AuditEvent::new(audit, "persistence.failed", AuditCategory::Persistence, AuditOutcome::Failed)
                .with_metadata("operation", operation),
        );
        let interface = ApplicationError::Persistence(error.to_string())
            .into_interface(audit.correlation_id.clone());
        reply_without_order(interface.user_message().to_string(), MessageKind::Error)
    }

    fn turn_failure(&self, audit: &AuditContext, error: ApplicationError) -> ChatReply {
        tracing::error!(
            event_name = "chat.turn_failed",
            correlation_id = %audit.correlation_id,
            chat_id = audit.chat_id.as_deref().unwrap_or("unknown"),
            error = %error,
            "turn failed; nothing persisted"
        );
        let interface = error.into_interface(audit.correlation_id.clone());
        reply_without_order(interface.user_message().to_string(), MessageKind::Error)
    }
}

fn persistence(error: RepositoryError) -> ApplicationError {
    ApplicationError::Persistence(error.to_string())
}

fn reply_without_order(text: String, kind: MessageKind) -> ChatReply {
    ChatReply { respuesta: text, estado_venta: None, tipo_mensaje: kind, metadatos: None }
}

fn known_prices(products: &[Product], order: &Order) -> Vec<Decimal> {
    let mut prices = products.iter().map(|product| product.price).collect::<Vec<_>>();
    prices.extend(order.line_items.iter().flat_map(|item| [item.unit_price, item.total]));
    if !order.line_items.is_empty() {
        prices.push(order.total());
    }
    prices
}

/// Snapshot in the persisted layout plus the derived fields callers display.
fn order_metadata(order: &Order) -> Value {
    let mut value = OrderSnapshot::from_order(order)
        .and_then(|snapshot| serde_json::to_value(snapshot).ok())
        .unwrap_or_else(|| json!({}));
    if let Value::Object(map) = &mut value {
        map.insert("order_id".to_string(), json!(order.id.0));
        map.insert("version".to_string(), json!(order.version));
        map.insert("total".to_string(), json!(order.total().to_string()));
        map.insert(
            "missing_slots".to_string(),
            json!(order.missing_slots().iter().map(|slot| slot.key()).collect::<Vec<_>>()),
        );
    }
    value
}
