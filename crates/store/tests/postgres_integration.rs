//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container and need docker, so they are
//! ignored by default. Run with:
//!
//! ```bash
//! cargo test -p store --test postgres_integration -- --ignored --test-threads=1
//! ```

use std::sync::Arc;

use common::{BatchReference, Sku};
use domain::{Batch, OrderLine, Product};
use serial_test::serial;
use sqlx::PgPool;
use store::{AllocationView, PostgresBackend, StoreError, UnitOfWork};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;
use uuid::Uuid;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

/// Global shared container
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
            PostgresBackend::new(temp_pool.clone())
                .run_migrations()
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

/// Get a fresh backend with its own pool and cleared tables
async fn get_test_backend() -> Arc<PostgresBackend> {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE allocations_view, allocations, batches, products")
        .execute(&pool)
        .await
        .unwrap();

    Arc::new(PostgresBackend::new(pool))
}

fn random_sku() -> Sku {
    Sku::new(format!("sku-{}", Uuid::new_v4()))
}

fn random_ref(name: &str) -> BatchReference {
    BatchReference::new(format!("{name}-{}", Uuid::new_v4()))
}

async fn insert_batch(uow: &UnitOfWork<PostgresBackend>, reference: &BatchReference, sku: &Sku, qty: u32) {
    let mut session = uow.begin().await.unwrap();
    let mut products = session.products().unwrap();
    let batch = Batch::new(reference.clone(), sku.clone(), qty, None);
    match products.get(sku).await.unwrap() {
        Some(product) => product.add_batch(batch).unwrap(),
        None => {
            products.add(Product::new(sku.clone(), vec![batch]));
        }
    }
    session.commit().await.unwrap();
}

#[tokio::test]
#[serial]
#[ignore = "requires docker"]
async fn uow_can_retrieve_a_batch_and_allocate_to_it() {
    let backend = get_test_backend().await;
    let uow = UnitOfWork::new(backend);
    let sku = random_sku();
    let reference = random_ref("batch");
    insert_batch(&uow, &reference, &sku, 100).await;

    let mut session = uow.begin().await.unwrap();
    let mut products = session.products().unwrap();
    let product = products.get(&sku).await.unwrap().unwrap();
    let allocated = product.allocate(OrderLine::new("o1", sku.clone(), 10));
    session.commit().await.unwrap();
    assert_eq!(allocated, Some(reference.clone()));

    let mut session = uow.begin().await.unwrap();
    let mut products = session.products().unwrap();
    let product = products
        .get_by_batch_reference(&reference)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(product.version_number().as_i64(), 1);
    assert_eq!(product.batch(&reference).unwrap().available_quantity(), 90);
}

#[tokio::test]
#[serial]
#[ignore = "requires docker"]
async fn rolls_back_uncommitted_work_by_default() {
    let backend = get_test_backend().await;
    let uow = UnitOfWork::new(backend);
    let sku = random_sku();
    {
        let mut session = uow.begin().await.unwrap();
        session
            .products()
            .unwrap()
            .add(Product::new(sku.clone(), vec![]));
    }

    let mut session = uow.begin().await.unwrap();
    assert!(session.products().unwrap().get(&sku).await.unwrap().is_none());
}

#[tokio::test]
#[serial]
#[ignore = "requires docker"]
async fn batch_quantity_change_persists_bumped_lines() {
    let backend = get_test_backend().await;
    let uow = UnitOfWork::new(backend);
    let sku = random_sku();
    let reference = random_ref("batch");
    insert_batch(&uow, &reference, &sku, 20).await;

    let mut session = uow.begin().await.unwrap();
    let mut products = session.products().unwrap();
    let product = products.get(&sku).await.unwrap().unwrap();
    product.allocate(OrderLine::new("o1", sku.clone(), 10));
    product.allocate(OrderLine::new("o2", sku.clone(), 10));
    product.change_batch_quantity(&reference, 10).unwrap();
    session.commit().await.unwrap();

    let mut session = uow.begin().await.unwrap();
    let mut products = session.products().unwrap();
    let product = products.get(&sku).await.unwrap().unwrap();
    let batch = product.batch(&reference).unwrap();
    assert_eq!(batch.purchased_quantity(), 10);
    assert_eq!(batch.allocations().count(), 1);
    assert_eq!(batch.available_quantity(), 0);
}

#[tokio::test]
#[serial]
#[ignore = "requires docker"]
async fn concurrent_allocations_conflict() {
    let backend = get_test_backend().await;
    let sku = random_sku();
    let reference = random_ref("batch");
    insert_batch(&UnitOfWork::new(backend.clone()), &reference, &sku, 10).await;

    let first_uow = UnitOfWork::new(backend.clone());
    let second_uow = UnitOfWork::new(backend.clone());
    let mut first = first_uow.begin().await.unwrap();
    let mut second = second_uow.begin().await.unwrap();

    first
        .products()
        .unwrap()
        .get(&sku)
        .await
        .unwrap()
        .unwrap()
        .allocate(OrderLine::new("o1", sku.clone(), 1));
    second
        .products()
        .unwrap()
        .get(&sku)
        .await
        .unwrap()
        .unwrap()
        .allocate(OrderLine::new("o2", sku.clone(), 1));

    first.commit().await.unwrap();
    let err = second.commit().await.unwrap_err();
    assert!(err.is_conflict(), "unexpected error: {err}");

    let check_uow = UnitOfWork::new(backend);
    let mut session = check_uow.begin().await.unwrap();
    let mut products = session.products().unwrap();
    let product = products.get(&sku).await.unwrap().unwrap();
    assert_eq!(product.version_number().as_i64(), 1);
    assert_eq!(product.batch(&reference).unwrap().allocations().count(), 1);
}

#[tokio::test]
#[serial]
#[ignore = "requires docker"]
async fn adding_an_existing_product_conflicts() {
    let backend = get_test_backend().await;
    let uow = UnitOfWork::new(backend);
    let sku = random_sku();
    insert_batch(&uow, &random_ref("batch"), &sku, 10).await;

    let mut session = uow.begin().await.unwrap();
    session
        .products()
        .unwrap()
        .add(Product::new(sku.clone(), vec![]));
    let err = session.commit().await.unwrap_err();
    assert!(matches!(err, StoreError::ConcurrencyConflict { .. }));
}

#[tokio::test]
#[serial]
#[ignore = "requires docker"]
async fn batch_reference_owned_by_another_sku_is_refused() {
    let backend = get_test_backend().await;
    let uow = UnitOfWork::new(backend);
    let lamp = random_sku();
    let chair = random_sku();
    let reference = random_ref("batch");
    insert_batch(&uow, &reference, &lamp, 10).await;

    let mut session = uow.begin().await.unwrap();
    session.products().unwrap().add(Product::new(
        chair.clone(),
        vec![Batch::new(reference.clone(), chair.clone(), 5, None)],
    ));
    let err = session.commit().await.unwrap_err();
    assert!(matches!(
        err,
        StoreError::BatchOwnedElsewhere { ref owner, .. } if owner == &lamp
    ));

    let mut session = uow.begin().await.unwrap();
    let mut products = session.products().unwrap();
    let product = products.get(&lamp).await.unwrap().unwrap();
    assert_eq!(product.batch(&reference).unwrap().purchased_quantity(), 10);
    assert!(products.get(&chair).await.unwrap().is_none());
}

#[tokio::test]
#[serial]
#[ignore = "requires docker"]
async fn read_model_round_trip() {
    let backend = get_test_backend().await;
    let uow = UnitOfWork::new(backend);

    let mut session = uow.begin().await.unwrap();
    session
        .insert_allocation_view(&AllocationView::new("o1", "LAMP", "b1"))
        .await
        .unwrap();
    session
        .insert_allocation_view(&AllocationView::new("o1", "CHAIR", "b2"))
        .await
        .unwrap();
    session.commit().await.unwrap();

    let mut session = uow.begin().await.unwrap();
    session
        .delete_allocation_view(&"o1".into(), &"LAMP".into())
        .await
        .unwrap();
    session.commit().await.unwrap();

    let mut session = uow.begin().await.unwrap();
    let rows = session.allocations_for_order(&"o1".into()).await.unwrap();
    assert_eq!(rows, vec![AllocationView::new("o1", "CHAIR", "b2")]);
}
