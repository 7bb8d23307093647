use std::sync::Arc;

use tendero_agent::llm::{HttpLlmClient, LlmClient, LlmError, LlmRouter};
use tendero_agent::runtime::{AgentRuntime, RuntimeSettings, Stores};
use tendero_agent::vector::EmbeddingIndex;
use tendero_core::config::AppConfig;
use tendero_db::{connect_with_settings, migrations, DbPool};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub runtime: Arc<AgentRuntime>,
    pub vector_index: Option<Arc<EmbeddingIndex>>,
}

impl Application {
    /// Builds the embedding index in the background so the first product question does not pay
    /// for it.
    pub fn warm_vector_index(&self) {
        let Some(index) = &self.vector_index else {
            return;
        };
        let rebuild = index.spawn_rebuild();
        tokio::spawn(async move {
            match rebuild.await {
                Ok(Ok(_)) => {}
                Ok(Err(error)) => tracing::warn!(
                    event_name = "system.bootstrap.vector_index_failed",
                    correlation_id = "bootstrap",
                    error = %error,
                    "initial vector index build failed; searches fall back to lexical"
                ),
                Err(error) => tracing::warn!(
                    event_name = "system.bootstrap.vector_index_failed",
                    correlation_id = "bootstrap",
                    error = %error,
                    "initial vector index task did not complete"
                ),
            }
        });
    }
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("llm client setup failed: {0}")]
    Llm(#[from] LlmError),
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        llm_provider = config.llm.provider.as_str(),
        "starting application bootstrap"
    );

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let client: Arc<dyn LlmClient> = Arc::new(HttpLlmClient::from_config(&config.llm)?);
    let llm = LlmRouter::new(client.clone()).with_client(config.llm.provider.as_str(), client);

    let (mut stores, index) = Stores::sql(db_pool.clone(), config.retrieval.embedding_dimensions);
    let vector_index = if config.retrieval.vector_enabled {
        Some(index)
    } else {
        stores.vector = None;
        None
    };

    let runtime = Arc::new(AgentRuntime::new(stores, llm, RuntimeSettings::from_config(&config)));

    Ok(Application { config, db_pool, runtime, vector_index })
}

#[cfg(test)]
mod tests {
    use tendero_core::config::{AppConfig, ConfigOverrides, LoadOptions};

    use crate::bootstrap::{bootstrap_with_config, Application, BootstrapError};

    async fn bootstrap(database_url: &str, vector_enabled: bool) -> Result<Application, BootstrapError> {
        let config = AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some(database_url.to_string()),
                vector_enabled: Some(vector_enabled),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .expect("config should load from defaults and overrides");
        bootstrap_with_config(config).await
    }

    #[tokio::test]
    async fn bootstrap_applies_migrations_and_wires_the_runtime() {
        let app = bootstrap("sqlite::memory:", true)
            .await
            .expect("bootstrap should succeed with an in-memory database");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE type = 'table' \
             AND name IN ('product', 'conversation_message', 'customer_order', 'sale', 'sale_line')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("schema query");
        assert_eq!(table_count, 5, "bootstrap should expose the baseline tables");
        assert!(app.vector_index.is_some());

        app.db_pool.close().await;
    }

    #[tokio::test]
    async fn disabled_vector_search_skips_the_index() {
        let app = bootstrap("sqlite::memory:", false).await.expect("bootstrap");
        assert!(app.vector_index.is_none());
        app.warm_vector_index();
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_on_an_unreachable_database() {
        let result = bootstrap("sqlite:///nonexistent-dir/for/tendero/test.db", true).await;
        let message = result.err().map(|error| error.to_string()).unwrap_or_default();
        assert!(message.contains("database connection failed"), "got: {message}");
    }
}
