pub mod connection;
pub mod fixtures;
pub mod migrations;
pub mod repositories;

pub use connection::{connect, connect_with_settings, DbPool};
pub use fixtures::{DemoCatalog, SeedResult, VerificationResult};
pub use repositories::{
    CatalogRepository, ConversationLog, InMemoryCatalogRepository, InMemoryConversationLog,
    InMemoryOrderRepository, InMemorySalesRecorder, MessageFilter, OrderRepository,
    RepositoryError, SaleReceipt, SalesRecorder, SqlCatalogRepository, SqlConversationLog,
    SqlOrderRepository, SqlSalesRecorder,
};
