//! Ingestion endpoint.
//!
//! - `POST /api/v1/chat`: one customer message in, one reply out

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde::Serialize;
use tendero_agent::runtime::{AgentRuntime, ChatReply, ChatRequest};
use tendero_core::errors::InterfaceError;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct ChatState {
    runtime: Arc<AgentRuntime>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChatError {
    pub error: String,
    pub correlation_id: String,
}

pub fn router(runtime: Arc<AgentRuntime>) -> Router {
    Router::new().route("/api/v1/chat", post(chat)).with_state(ChatState { runtime })
}

async fn chat(
    State(state): State<ChatState>,
    Json(body): Json<ChatRequest>,
) -> Result<Json<ChatReply>, (StatusCode, Json<ChatError>)> {
    if body.message.trim().is_empty() || body.chat_id.trim().is_empty() {
        let rejected = InterfaceError::BadRequest {
            message: "message and chat_id are required".to_string(),
            correlation_id: Uuid::new_v4().to_string(),
        };
        warn!(
            event_name = "chat.request_rejected",
            correlation_id = %rejected.correlation_id(),
            error = %rejected,
            "blank message or chat_id"
        );
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ChatError {
                error: rejected.user_message().to_string(),
                correlation_id: rejected.correlation_id().to_string(),
            }),
        ));
    }

    let chat_id = body.chat_id.trim().to_string();
    let reply = state.runtime.handle_message(body).await;
    info!(
        event_name = "chat.reply_sent",
        chat_id = %chat_id,
        tipo_mensaje = reply.tipo_mensaje.as_str(),
        estado_venta = reply.estado_venta.map(|status| status.as_str()).unwrap_or("null"),
        "chat reply sent"
    );
    Ok(Json(reply))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::{
        body::{to_bytes, Body},
        extract::State,
        http::{Request, StatusCode},
        Json,
    };
    use rust_decimal::Decimal;
    use serde_json::Value;
    use tendero_agent::llm::{LlmClient, LlmError, LlmRequest, LlmRouter};
    use tendero_agent::runtime::{AgentRuntime, ChatRequest, RuntimeSettings, Stores};
    use tendero_core::domain::product::{Product, ProductId};
    use tendero_db::{
        InMemoryCatalogRepository, InMemoryConversationLog, InMemoryOrderRepository,
        InMemorySalesRecorder,
    };
    use tower::ServiceExt;

    use super::{chat, router, ChatState};

    struct Silent;

    #[async_trait]
    impl LlmClient for Silent {
        fn name(&self) -> &str {
            "silent"
        }

        async fn complete(&self, _request: &LlmRequest) -> Result<String, LlmError> {
            Err(LlmError::Empty)
        }
    }

    fn runtime() -> Arc<AgentRuntime> {
        let catalog = Arc::new(InMemoryCatalogRepository::with_products([Product {
            id: ProductId(4),
            name: "Safety Helmet White".to_string(),
            description: "Dielectric hard hat".to_string(),
            price: Decimal::new(45_000, 0),
            stock: 40,
            category: None,
            active: true,
        }]));
        let stores = Stores {
            catalog: catalog.clone(),
            conversation: Arc::new(InMemoryConversationLog::default()),
            orders: Arc::new(InMemoryOrderRepository::default()),
            sales: Arc::new(InMemorySalesRecorder::new(catalog)),
            vector: None,
        };
        Arc::new(AgentRuntime::new(stores, LlmRouter::new(Arc::new(Silent)), RuntimeSettings::default()))
    }

    #[tokio::test]
    async fn blank_message_is_a_bad_request() {
        let result = chat(
            State(ChatState { runtime: runtime() }),
            Json(ChatRequest::new("chat-1", "   ")),
        )
        .await;

        let (status, Json(error)) = result.err().expect("blank message should be rejected");
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            error.error,
            "I couldn't process that request. Please check the details and try again."
        );
        assert!(!error.correlation_id.is_empty());
    }

    #[tokio::test]
    async fn chat_endpoint_speaks_the_ingestion_contract() {
        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/chat")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"message": "I want 2 helmets", "chat_id": "chat-http"}"#))
            .expect("request");

        let response = router(runtime()).oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let reply: Value = serde_json::from_slice(&bytes).expect("json body");
        assert_eq!(reply["tipo_mensaje"], "order_update");
        assert_eq!(reply["estado_venta"], "pending");
        assert_eq!(reply["metadatos"]["line_items"][0]["cantidad"], 2);
        assert!(reply["respuesta"].as_str().unwrap_or_default().starts_with("Added 2 x Safety Helmet White"));
    }

    #[tokio::test]
    async fn missing_optional_fields_still_get_a_reply() {
        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/chat")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"message": "show my order", "chat_id": "chat-empty"}"#))
            .expect("request");

        let response = router(runtime()).oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let reply: Value = serde_json::from_slice(&bytes).expect("json body");
        assert_eq!(reply["tipo_mensaje"], "order_summary");
        assert_eq!(reply["estado_venta"], Value::Null);
        assert_eq!(reply["metadatos"], Value::Null);
    }
}
