//! PostgreSQL integration tests
//!
//! These tests share one PostgreSQL container and truncate the tables
//! before each test, so they run serially.
//! Run with:
//!
//! ```bash
//! cargo test -p order-store --test postgres_integration
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use domain::{Money, Order, OrderItem, OrderNumber, OrderStatus, Product, Sku};
use order_store::{OrderQuery, OrderStore, PostgresOrderStore, StoreError, StoreTransaction};
use serial_test::serial;
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_inventory_tables.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh store with its own pool, cleared tables and two products
async fn get_test_store() -> PostgresOrderStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE order_items, orders, products CASCADE")
        .execute(&pool)
        .await
        .unwrap();

    sqlx::query(
        "INSERT INTO products (sku, name, stock_qty, price_cents) VALUES
         ('SKU001', 'Laptop', 50, 129999),
         ('SKU002', 'Mouse', 100, 9999)",
    )
    .execute(&pool)
    .await
    .unwrap();

    PostgresOrderStore::new(pool).with_lock_timeout(Duration::from_millis(200))
}

fn sku(s: &str) -> Sku {
    Sku::new(s)
}

fn order(number: &str, items: Vec<OrderItem>) -> Order {
    Order::place(OrderNumber::new(number), items, Utc::now()).unwrap()
}

async fn insert_order(store: &PostgresOrderStore, order: &Order) {
    let mut tx = store.begin().await.unwrap();
    tx.save_order(order).await.unwrap();
    tx.save_order_items(order.id(), order.items()).await.unwrap();
    tx.commit().await.unwrap();
}

#[tokio::test]
#[serial]
async fn committed_stock_change_is_visible() {
    let store = get_test_store().await;

    let mut tx = store.begin().await.unwrap();
    let mut laptop = tx.lock_product(&sku("SKU001")).await.unwrap().unwrap();
    laptop.reserve(2).unwrap();
    tx.save_product(&laptop).await.unwrap();
    tx.commit().await.unwrap();

    let laptop = store.get_product(&sku("SKU001")).await.unwrap().unwrap();
    assert_eq!(laptop.stock_qty, 48);
    assert_eq!(laptop.price, Money::from_cents(129999));
}

#[tokio::test]
#[serial]
async fn rollback_discards_writes() {
    let store = get_test_store().await;

    let mut tx = store.begin().await.unwrap();
    let mut laptop = tx.lock_product(&sku("SKU001")).await.unwrap().unwrap();
    laptop.reserve(10).unwrap();
    tx.save_product(&laptop).await.unwrap();
    let pending = order("ORD-20260101-AAAAAAAA", vec![]);
    tx.save_order(&pending).await.unwrap();
    tx.rollback().await.unwrap();

    assert_eq!(
        store.get_product(&sku("SKU001")).await.unwrap().unwrap().stock_qty,
        50
    );
    assert!(store.get_order(pending.id()).await.unwrap().is_none());
}

#[tokio::test]
#[serial]
async fn missing_product_locks_nothing() {
    let store = get_test_store().await;

    let mut tx = store.begin().await.unwrap();
    assert!(tx.lock_product(&sku("NOPE")).await.unwrap().is_none());
    tx.rollback().await.unwrap();
}

#[tokio::test]
#[serial]
async fn saving_unlocked_product_is_refused() {
    let store = get_test_store().await;

    let mut tx = store.begin().await.unwrap();
    let product = Product::new("SKU001", "Laptop", 1, Money::from_cents(1));
    let result = tx.save_product(&product).await;
    assert!(matches!(result, Err(StoreError::NotLocked { .. })));
}

#[tokio::test]
#[serial]
async fn second_locker_times_out() {
    let store = get_test_store().await;

    let mut holder = store.begin().await.unwrap();
    holder.lock_product(&sku("SKU001")).await.unwrap();

    let mut waiter = store.begin().await.unwrap();
    let result = waiter.lock_product(&sku("SKU001")).await;
    assert!(matches!(result, Err(StoreError::LockTimeout { .. })));
    assert!(result.unwrap_err().is_retryable());

    holder.rollback().await.unwrap();
}

#[tokio::test]
#[serial]
async fn waiter_sees_committed_stock_after_lock_release() {
    let store = get_test_store().await;

    let mut holder = store.begin().await.unwrap();
    let mut laptop = holder.lock_product(&sku("SKU001")).await.unwrap().unwrap();

    let waiter_store = store.clone();
    let waiter = tokio::spawn(async move {
        let mut tx = waiter_store
            .clone()
            .with_lock_timeout(Duration::from_secs(5))
            .begin()
            .await
            .unwrap();
        let product = tx.lock_product(&sku("SKU001")).await.unwrap().unwrap();
        tx.rollback().await.unwrap();
        product.stock_qty
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    laptop.reserve(5).unwrap();
    holder.save_product(&laptop).await.unwrap();
    holder.commit().await.unwrap();

    assert_eq!(waiter.await.unwrap(), 45);
}

#[tokio::test]
#[serial]
async fn order_round_trips_with_items_in_line_order() {
    let store = get_test_store().await;
    let placed = order(
        "ORD-20260101-00000001",
        vec![
            OrderItem::new("SKU002", 3, Money::from_cents(9999)),
            OrderItem::new("SKU001", 1, Money::from_cents(129999)),
        ],
    );
    insert_order(&store, &placed).await;

    let loaded = store.get_order(placed.id()).await.unwrap().unwrap();
    assert_eq!(loaded.order_number(), placed.order_number());
    assert_eq!(loaded.status(), OrderStatus::Pending);
    assert_eq!(loaded.total_amount(), Money::from_cents(3 * 9999 + 129999));
    assert_eq!(loaded.created_at(), placed.created_at());

    let skus: Vec<_> = loaded.items().iter().map(|i| i.sku.as_str()).collect();
    assert_eq!(skus, ["SKU002", "SKU001"]);
    let mouse = loaded.items()[0].product.as_ref().unwrap();
    assert_eq!(mouse.name, "Mouse");
}

#[tokio::test]
#[serial]
async fn duplicate_order_number_keeps_transaction_usable() {
    let store = get_test_store().await;
    insert_order(&store, &order("ORD-20260101-DUPLICATE", vec![])).await;

    let mut tx = store.begin().await.unwrap();
    let clash = order("ORD-20260101-DUPLICATE", vec![]);
    let result = tx.save_order(&clash).await;
    assert!(matches!(result, Err(StoreError::DuplicateOrderNumber(_))));

    let retry = clash.with_order_number(OrderNumber::new("ORD-20260101-FRESH001"));
    tx.save_order(&retry).await.unwrap();
    tx.commit().await.unwrap();

    assert!(store.get_order(retry.id()).await.unwrap().is_some());
}

#[tokio::test]
#[serial]
async fn cancel_persists_only_status() {
    let store = get_test_store().await;
    let placed = order(
        "ORD-20260101-CANCEL01",
        vec![OrderItem::new("SKU001", 2, Money::from_cents(129999))],
    );
    insert_order(&store, &placed).await;

    let mut tx = store.begin().await.unwrap();
    let mut locked = tx.lock_order(placed.id()).await.unwrap().unwrap();
    assert_eq!(locked.items().len(), 1);
    locked.cancel().unwrap();
    tx.save_order(&locked).await.unwrap();
    tx.commit().await.unwrap();

    let loaded = store.get_order(placed.id()).await.unwrap().unwrap();
    assert_eq!(loaded.status(), OrderStatus::Cancelled);
    assert_eq!(loaded.total_amount(), placed.total_amount());
    assert_eq!(loaded.items().len(), 1);
}

#[tokio::test]
#[serial]
async fn saving_unlocked_existing_order_is_refused() {
    let store = get_test_store().await;
    let placed = order("ORD-20260101-UNLOCKED", vec![]);
    insert_order(&store, &placed).await;

    let mut tx = store.begin().await.unwrap();
    let result = tx.save_order(&placed).await;
    assert!(matches!(result, Err(StoreError::NotLocked { .. })));
}

#[tokio::test]
#[serial]
async fn items_for_foreign_order_are_refused() {
    let store = get_test_store().await;

    let mut tx = store.begin().await.unwrap();
    let stranger = order("ORD-20260101-STRANGER", vec![]);
    let result = tx
        .save_order_items(
            stranger.id(),
            &[OrderItem::new("SKU001", 1, Money::from_cents(1))],
        )
        .await;
    assert!(matches!(result, Err(StoreError::UnknownOrder(_))));
}

#[tokio::test]
#[serial]
async fn list_orders_filters_and_pages() {
    let store = get_test_store().await;

    let mut cancelled = order("ORD-20260101-LIST0001", vec![]);
    insert_order(&store, &cancelled).await;
    for n in 2..=4 {
        tokio::time::sleep(Duration::from_millis(5)).await;
        insert_order(&store, &order(&format!("ORD-20260101-LIST000{n}"), vec![])).await;
    }

    let mut tx = store.begin().await.unwrap();
    cancelled = tx.lock_order(cancelled.id()).await.unwrap().unwrap();
    cancelled.cancel().unwrap();
    tx.save_order(&cancelled).await.unwrap();
    tx.commit().await.unwrap();

    let page = store
        .list_orders(OrderQuery::new().page(1, 2))
        .await
        .unwrap();
    assert_eq!(page.total, 4);
    assert_eq!(page.total_pages(), 2);
    assert_eq!(page.orders.len(), 2);
    assert_eq!(page.orders[0].order_number().as_str(), "ORD-20260101-LIST0004");

    let pending = store
        .list_orders(OrderQuery::new().status(OrderStatus::Pending))
        .await
        .unwrap();
    assert_eq!(pending.total, 3);
    assert!(pending.orders.iter().all(|o| o.status() == OrderStatus::Pending));

    let future = store
        .list_orders(OrderQuery::new().since(Utc::now() + ChronoDuration::hours(1)))
        .await
        .unwrap();
    assert_eq!(future.total, 0);
    assert!(future.orders.is_empty());
}
