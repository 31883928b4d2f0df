//! PostgreSQL storage backend built on sqlx.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use common::{BatchReference, OrderId, Sku, Version};
use domain::{Batch, OrderLine, Product};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row};
use tracing::debug;

use crate::backend::{Backend, LoadedProduct, Origin, Transaction};
use crate::{AllocationView, Result, StoreError};

const SERIALIZATION_FAILURE: &str = "40001";
const UNIQUE_VIOLATION: &str = "23505";

/// PostgreSQL-backed storage.
///
/// Every transaction runs at REPEATABLE READ. Products are saved with a
/// version-guarded update, and concurrent writers to the same product row are
/// refused by the database itself.
#[derive(Clone)]
pub struct PostgresBackend {
    pool: PgPool,
}

impl PostgresBackend {
    /// Creates a new PostgreSQL backend.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects a pool of at most `max_connections` to `database_url`.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl Backend for PostgresBackend {
    type Tx = PostgresTransaction;

    async fn begin(&self) -> Result<PostgresTransaction> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ")
            .execute(&mut *tx)
            .await?;
        Ok(PostgresTransaction { tx })
    }
}

/// A REPEATABLE READ transaction. Dropping it without committing rolls back.
pub struct PostgresTransaction {
    tx: sqlx::Transaction<'static, Postgres>,
}

impl PostgresTransaction {
    async fn load_by_sku(&mut self, sku: &Sku) -> Result<Option<LoadedProduct>> {
        let version: Option<i64> =
            sqlx::query_scalar("SELECT version_number FROM products WHERE sku = $1")
                .bind(sku.as_str())
                .fetch_optional(&mut *self.tx)
                .await?;
        let Some(version) = version else {
            return Ok(None);
        };

        let batch_rows = sqlx::query(
            r#"
            SELECT id, reference, purchased_quantity, eta
            FROM batches
            WHERE sku = $1
            ORDER BY id ASC
            "#,
        )
        .bind(sku.as_str())
        .fetch_all(&mut *self.tx)
        .await?;

        let allocation_rows = sqlx::query(
            r#"
            SELECT a.batch_id, a.orderid, a.qty
            FROM allocations a
            JOIN batches b ON b.id = a.batch_id
            WHERE b.sku = $1
            "#,
        )
        .bind(sku.as_str())
        .fetch_all(&mut *self.tx)
        .await?;

        let mut lines: HashMap<i64, Vec<OrderLine>> = HashMap::new();
        for row in allocation_rows {
            let batch_id: i64 = row.try_get("batch_id")?;
            let order_id: String = row.try_get("orderid")?;
            let quantity = quantity_from_row(&row, "qty")?;
            lines
                .entry(batch_id)
                .or_default()
                .push(OrderLine::new(order_id, sku.clone(), quantity));
        }

        let batches = batch_rows
            .into_iter()
            .map(|row| {
                let id: i64 = row.try_get("id")?;
                let reference: String = row.try_get("reference")?;
                let eta: Option<NaiveDate> = row.try_get("eta")?;
                let quantity = quantity_from_row(&row, "purchased_quantity")?;
                Ok(Batch::new(reference, sku.clone(), quantity, eta)
                    .with_allocations(lines.remove(&id).unwrap_or_default()))
            })
            .collect::<Result<Vec<_>>>()?;

        let version = Version::new(version);
        Ok(Some(LoadedProduct {
            product: Product::with_version(sku.clone(), batches, version),
            origin: Origin::Loaded {
                version,
                revision: 0,
            },
        }))
    }

    async fn save_batches(&mut self, product: &Product) -> Result<()> {
        for batch in product.batches() {
            let batch_id: Option<i64> = sqlx::query_scalar(
                r#"
                INSERT INTO batches (reference, sku, purchased_quantity, eta)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (reference) DO UPDATE SET
                    purchased_quantity = EXCLUDED.purchased_quantity,
                    eta = EXCLUDED.eta
                WHERE batches.sku = EXCLUDED.sku
                RETURNING id
                "#,
            )
            .bind(batch.reference().as_str())
            .bind(product.sku().as_str())
            .bind(quantity_to_db(batch.purchased_quantity())?)
            .bind(batch.eta())
            .fetch_optional(&mut *self.tx)
            .await?;
            let Some(batch_id) = batch_id else {
                let owner: String =
                    sqlx::query_scalar("SELECT sku FROM batches WHERE reference = $1")
                        .bind(batch.reference().as_str())
                        .fetch_one(&mut *self.tx)
                        .await?;
                return Err(StoreError::BatchOwnedElsewhere {
                    reference: batch.reference().clone(),
                    owner: Sku::new(owner),
                });
            };

            sqlx::query("DELETE FROM allocations WHERE batch_id = $1")
                .bind(batch_id)
                .execute(&mut *self.tx)
                .await?;

            for line in batch.allocations() {
                sqlx::query(
                    "INSERT INTO allocations (batch_id, orderid, sku, qty) VALUES ($1, $2, $3, $4)",
                )
                .bind(batch_id)
                .bind(line.order_id.as_str())
                .bind(line.sku.as_str())
                .bind(quantity_to_db(line.quantity)?)
                .execute(&mut *self.tx)
                .await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Transaction for PostgresTransaction {
    async fn load_product(&mut self, sku: &Sku) -> Result<Option<LoadedProduct>> {
        self.load_by_sku(sku).await
    }

    async fn load_product_by_batch(
        &mut self,
        reference: &BatchReference,
    ) -> Result<Option<LoadedProduct>> {
        let sku: Option<String> = sqlx::query_scalar("SELECT sku FROM batches WHERE reference = $1")
            .bind(reference.as_str())
            .fetch_optional(&mut *self.tx)
            .await?;
        match sku {
            Some(sku) => self.load_by_sku(&Sku::new(sku)).await,
            None => Ok(None),
        }
    }

    async fn load_products(&mut self) -> Result<Vec<LoadedProduct>> {
        let skus: Vec<String> = sqlx::query_scalar("SELECT sku FROM products ORDER BY sku ASC")
            .fetch_all(&mut *self.tx)
            .await?;
        let mut products = Vec::with_capacity(skus.len());
        for sku in skus {
            if let Some(loaded) = self.load_by_sku(&Sku::new(sku)).await? {
                products.push(loaded);
            }
        }
        Ok(products)
    }

    async fn save_product(&mut self, product: &Product, origin: Origin) -> Result<()> {
        let sku = product.sku();
        match origin {
            Origin::Added => {
                sqlx::query("INSERT INTO products (sku, version_number) VALUES ($1, $2)")
                    .bind(sku.as_str())
                    .bind(product.version_number().as_i64())
                    .execute(&mut *self.tx)
                    .await
                    .map_err(|e| conflict_or_database(e, sku, Version::initial()))?;
            }
            Origin::Loaded { version, .. } => {
                let result = sqlx::query(
                    r#"
                    UPDATE products
                    SET version_number = $2
                    WHERE sku = $1 AND version_number = $3
                    "#,
                )
                .bind(sku.as_str())
                .bind(product.version_number().as_i64())
                .bind(version.as_i64())
                .execute(&mut *self.tx)
                .await
                .map_err(|e| conflict_or_database(e, sku, version))?;

                if result.rows_affected() == 0 {
                    return Err(StoreError::ConcurrencyConflict {
                        sku: sku.clone(),
                        expected: version,
                    });
                }
            }
        }

        self.save_batches(product)
            .await
            .map_err(|e| match e {
                StoreError::Database(db) => conflict_or_database(db, sku, product.version_number()),
                other => other,
            })?;
        debug!(sku = %sku, version = %product.version_number(), "Product saved");
        Ok(())
    }

    async fn insert_allocation_view(&mut self, row: &AllocationView) -> Result<()> {
        sqlx::query("INSERT INTO allocations_view (orderid, sku, batchref) VALUES ($1, $2, $3)")
            .bind(row.order_id.as_str())
            .bind(row.sku.as_str())
            .bind(row.batch_reference.as_str())
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn delete_allocation_view(&mut self, order_id: &OrderId, sku: &Sku) -> Result<()> {
        sqlx::query("DELETE FROM allocations_view WHERE orderid = $1 AND sku = $2")
            .bind(order_id.as_str())
            .bind(sku.as_str())
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn allocations_for_order(&mut self, order_id: &OrderId) -> Result<Vec<AllocationView>> {
        let rows = sqlx::query(
            "SELECT orderid, sku, batchref FROM allocations_view WHERE orderid = $1 ORDER BY id ASC",
        )
        .bind(order_id.as_str())
        .fetch_all(&mut *self.tx)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(AllocationView::new(
                    row.try_get::<String, _>("orderid")?,
                    row.try_get::<String, _>("sku")?,
                    row.try_get::<String, _>("batchref")?,
                ))
            })
            .collect()
    }

    async fn commit(self) -> Result<()> {
        self.tx.commit().await.map_err(|e| {
            if is_serialization_failure(&e) {
                return StoreError::SerializationFailure;
            }
            StoreError::Database(e)
        })
    }

    async fn rollback(self) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

fn is_serialization_failure(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err
        && db_err.code().as_deref() == Some(SERIALIZATION_FAILURE)
    {
        return true;
    }
    false
}

fn conflict_or_database(err: sqlx::Error, sku: &Sku, expected: Version) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = err
        && matches!(
            db_err.code().as_deref(),
            Some(SERIALIZATION_FAILURE) | Some(UNIQUE_VIOLATION)
        )
    {
        return StoreError::ConcurrencyConflict {
            sku: sku.clone(),
            expected,
        };
    }
    StoreError::Database(err)
}

fn quantity_from_row(row: &PgRow, column: &str) -> Result<u32> {
    let value: i32 = row.try_get(column)?;
    u32::try_from(value).map_err(|_| StoreError::InvalidRow(format!("negative {column}: {value}")))
}

fn quantity_to_db(quantity: u32) -> Result<i32> {
    i32::try_from(quantity).map_err(|_| StoreError::InvalidRow(format!("quantity too large: {quantity}")))
}
