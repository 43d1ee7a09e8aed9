//! PostgreSQL integration tests for the order store.
//!
//! Run with:
//!
//! ```bash
//! cargo test -p orders --test postgres_integration -- --test-threads=1
//! ```

use std::sync::Arc;

use common::{CustomerId, ItemId, OrderId};
use orders::{Order, OrderError, OrderItem, OrderPatch, OrderStatus, OrderStore, PostgresOrderStore};
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

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

            let pool = PgPool::connect(&connection_string).await.unwrap();
            PostgresOrderStore::new(pool.clone())
                .run_migrations()
                .await
                .unwrap();
            pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

async fn get_test_store() -> PostgresOrderStore {
    let info = get_container_info().await;
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE orders")
        .execute(&pool)
        .await
        .unwrap();

    PostgresOrderStore::new(pool)
}

fn sample_order(customer: &str) -> Order {
    Order::new(
        CustomerId::new(customer),
        vec![OrderItem {
            id: ItemId::new("1"),
            name: "Burger".to_string(),
            quantity: 2,
            price_id: "price_burger".to_string(),
        }],
    )
}

#[tokio::test]
async fn test_create_and_load_order() {
    let store = get_test_store().await;
    let order = sample_order("cust-1");
    store.create(&order).await.unwrap();

    let loaded = store.get(order.id).await.unwrap();
    assert_eq!(loaded.id, order.id);
    assert_eq!(loaded.customer_id, order.customer_id);
    assert_eq!(loaded.status, OrderStatus::Pending);
    assert_eq!(loaded.items, order.items);
    assert!(loaded.payment_link.is_none());
}

#[tokio::test]
async fn test_missing_order_is_not_found() {
    let store = get_test_store().await;
    let result = store.get(OrderId::new()).await;
    assert!(matches!(result, Err(OrderError::NotFound(_))));
}

#[tokio::test]
async fn test_update_merges_and_guards_status() {
    let store = get_test_store().await;
    let order = sample_order("cust-1");
    store.create(&order).await.unwrap();

    let change = store
        .update(
            order.id,
            &OrderPatch::status(OrderStatus::WaitingPayment).with_payment_link("https://pay/1"),
        )
        .await
        .unwrap();
    assert_eq!(change.previous, OrderStatus::Pending);
    assert_eq!(change.order.payment_link.as_deref(), Some("https://pay/1"));

    let change = store
        .update(order.id, &OrderPatch::status(OrderStatus::Paid))
        .await
        .unwrap();
    assert_eq!(change.previous, OrderStatus::WaitingPayment);

    let err = store
        .update(order.id, &OrderPatch::status(OrderStatus::Pending))
        .await
        .unwrap_err();
    assert!(matches!(err, OrderError::InvalidStatusTransition { .. }));

    let loaded = store.get(order.id).await.unwrap();
    assert_eq!(loaded.status, OrderStatus::Paid);
    assert_eq!(loaded.payment_link.as_deref(), Some("https://pay/1"));
}

#[tokio::test]
async fn test_get_by_status() {
    let store = get_test_store().await;
    let first = sample_order("a");
    let second = sample_order("b");
    store.create(&first).await.unwrap();
    store.create(&second).await.unwrap();
    store
        .update(second.id, &OrderPatch::status(OrderStatus::Ready))
        .await
        .unwrap();

    let pending = store.get_by_status(OrderStatus::Pending).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, first.id);

    let ready = store.get_by_status(OrderStatus::Ready).await.unwrap();
    assert_eq!(ready.len(), 1);
    assert_eq!(ready[0].id, second.id);
}
