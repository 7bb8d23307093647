use std::sync::Arc;

use serde::Serialize;
use tendero_agent::llm::{HttpLlmClient, LlmClient, LlmRouter};
use tendero_agent::runtime::{AgentRuntime, ChatReply, ChatRequest, RuntimeSettings, Stores};
use tendero_core::config::AppConfig;
use tendero_core::domain::message::MessageKind;
use tracing_subscriber::EnvFilter;

use crate::commands::{async_runtime, load_config, migrated_pool, CommandResult};

#[derive(Debug, Serialize)]
struct ChatOutcome<'a> {
    command: &'a str,
    status: &'a str,
    reply: &'a ChatReply,
}

/// Sends one message through the full runtime against the configured database and LLM.
pub fn run(request: ChatRequest) -> CommandResult {
    let config = match load_config("chat") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    init_logging(&config);
    let runtime = match async_runtime("chat") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = migrated_pool(&config).await?;
        let client: Arc<dyn LlmClient> = Arc::new(
            HttpLlmClient::from_config(&config.llm)
                .map_err(|error| ("llm_configuration", error.to_string(), 2u8))?,
        );
        let llm = LlmRouter::new(client.clone()).with_client(config.llm.provider.as_str(), client);

        let (mut stores, _index) = Stores::sql(pool.clone(), config.retrieval.embedding_dimensions);
        if !config.retrieval.vector_enabled {
            stores.vector = None;
        }
        let agent = AgentRuntime::new(stores, llm, RuntimeSettings::from_config(&config));
        let reply = agent.handle_message(request).await;
        pool.close().await;
        Ok::<ChatReply, (&'static str, String, u8)>(reply)
    });

    match result {
        Ok(reply) => render(&reply),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("chat", error_class, message, exit_code)
        }
    }
}

fn render(reply: &ChatReply) -> CommandResult {
    let failed = reply.tipo_mensaje == MessageKind::Error;
    let outcome = ChatOutcome { command: "chat", status: if failed { "error" } else { "ok" }, reply };
    match serde_json::to_string(&outcome) {
        Ok(output) => CommandResult { exit_code: if failed { 7 } else { 0 }, output },
        Err(error) => CommandResult::failure("chat", "serialization", error.to_string(), 1),
    }
}

/// Logs go to stderr so stdout stays a single JSON document.
fn init_logging(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.as_str()));
    let _ = tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .compact()
        .try_init();
}
