use rust_decimal::Decimal;

use tendero_core::domain::message::{reconstruct_open_order, Message, MessageKind, Sender};
use tendero_core::domain::order::{CustomerSlot, LineItem, OrderStatus};
use tendero_core::domain::product::ProductId;
use tendero_db::{
    connect_with_settings, migrations, CatalogRepository, ConversationLog, DemoCatalog, DbPool,
    MessageFilter, OrderRepository, SalesRecorder, SqlCatalogRepository, SqlConversationLog,
    SqlOrderRepository, SqlSalesRecorder,
};

async fn seeded_pool() -> DbPool {
    let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
    migrations::run_pending(&pool).await.expect("migrations");
    DemoCatalog::load(&pool).await.expect("seed demo catalog");
    pool
}

#[tokio::test]
async fn order_survives_from_first_item_to_recorded_sale() {
    let pool = seeded_pool().await;
    let catalog = SqlCatalogRepository::new(pool.clone());
    let log = SqlConversationLog::new(pool.clone());
    let orders = SqlOrderRepository::new(pool.clone());
    let sales = SqlSalesRecorder::new(pool.clone());

    let extinguisher = catalog.find_by_id(ProductId(1)).await.expect("find").expect("seeded");
    let mut order = tendero_core::Order::new("chat-e2e");
    order.add_line_item(LineItem::new(&extinguisher, 3).expect("item")).expect("add");
    let mut order = orders.save(&order, 0).await.expect("insert");
    log.append_message(
        Message::new("chat-e2e", Sender::Agent, "Added 3 extinguishers")
            .with_order(&order)
            .with_kind(MessageKind::OrderUpdate),
    )
    .await
    .expect("log");

    let window = log
        .latest_messages("chat-e2e", 10, MessageFilter::WithOrderStatus)
        .await
        .expect("window");
    let rebuilt = reconstruct_open_order("chat-e2e", &window).expect("open order in log");
    assert_eq!(rebuilt.total(), Decimal::new(255_000, 0));
    assert_eq!(rebuilt.status, OrderStatus::Pending);

    let version = order.version;
    order.transition_to(OrderStatus::CollectingData).expect("checkout");
    for slot in CustomerSlot::REQUIRED {
        order.customer.set(slot, format!("value for {}", slot.key()));
    }
    order.transition_to(OrderStatus::Closed).expect("close");
    let closed = orders.save(&order, version).await.expect("close saved");
    assert_eq!(closed.version, 2);

    let receipt = sales.record_sale(&closed).await.expect("sale");
    assert_eq!(receipt.total, Decimal::new(255_000, 0));

    let restocked = catalog.find_by_id(ProductId(1)).await.expect("find").expect("seeded");
    assert_eq!(restocked.stock, extinguisher.stock - 3);

    let latest = orders.find_latest("chat-e2e").await.expect("find").expect("stored");
    assert_eq!(latest.status, OrderStatus::Closed);
}

#[tokio::test]
async fn concurrent_writers_on_the_same_version_conflict() {
    let pool = seeded_pool().await;
    let catalog = SqlCatalogRepository::new(pool.clone());
    let orders = SqlOrderRepository::new(pool);

    let gloves = catalog.find_by_id(ProductId(6)).await.expect("find").expect("seeded");
    let mut order = tendero_core::Order::new("chat-race");
    order.add_line_item(LineItem::new(&gloves, 2).expect("item")).expect("add");
    let stored = orders.save(&order, 0).await.expect("insert");

    let mut first = stored.clone();
    first.add_line_item(LineItem::new(&gloves, 1).expect("item")).expect("add");
    let mut second = stored.clone();
    second.add_line_item(LineItem::new(&gloves, 5).expect("item")).expect("add");

    orders.save(&first, stored.version).await.expect("first writer");
    assert!(orders.save(&second, stored.version).await.is_err());

    let latest = orders.find_latest("chat-race").await.expect("find").expect("stored");
    assert_eq!(latest.item_count(), 3);
}
