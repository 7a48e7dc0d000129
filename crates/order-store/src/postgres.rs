use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{
    Money, Order, OrderItem, OrderItemId, OrderNumber, OrderStatus, Product, ProductInfo, Sku,
};
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::Query;
use sqlx::{PgPool, Postgres, Row};
use uuid::Uuid;

use crate::{
    OrderId, OrderPage, OrderQuery, Result, StoreError,
    store::{DEFAULT_LOCK_TIMEOUT, OrderStore, StoreTransaction},
};

const ORDER_COLUMNS: &str = "id, order_number, status, total_cents, created_at";

const ITEM_SELECT: &str = r#"
    SELECT oi.order_id, oi.id, oi.sku, oi.quantity, oi.unit_price_cents, p.name AS product_name
    FROM order_items oi
    LEFT JOIN products p ON p.sku = oi.sku
"#;

/// PostgreSQL-backed order store.
///
/// Row locks are `SELECT ... FOR UPDATE`; every transaction sets
/// `lock_timeout` so a blocked lock fails instead of waiting forever.
#[derive(Clone)]
pub struct PostgresOrderStore {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PostgresOrderStore {
    /// Creates a new PostgreSQL order store.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    /// Sets how long a transaction waits for a row lock.
    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    /// Runs the database migrations, including the sample product seed.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_product(row: &PgRow) -> Result<Product> {
        let stock_qty: i32 = row.try_get("stock_qty")?;
        let stock_qty = u32::try_from(stock_qty)
            .map_err(|_| StoreError::InvalidRow(format!("negative stock_qty {stock_qty}")))?;

        Ok(Product {
            sku: Sku::new(row.try_get::<String, _>("sku")?),
            name: row.try_get("name")?,
            stock_qty,
            price: Money::from_cents(row.try_get("price_cents")?),
        })
    }

    fn row_to_item(row: &PgRow) -> Result<OrderItem> {
        let quantity: i32 = row.try_get("quantity")?;
        let quantity = u32::try_from(quantity)
            .map_err(|_| StoreError::InvalidRow(format!("negative item quantity {quantity}")))?;
        let sku = Sku::new(row.try_get::<String, _>("sku")?);
        let product = row
            .try_get::<Option<String>, _>("product_name")?
            .map(|name| ProductInfo {
                sku: sku.clone(),
                name,
            });

        Ok(OrderItem {
            id: OrderItemId::from_uuid(row.try_get::<Uuid, _>("id")?),
            sku,
            quantity,
            unit_price: Money::from_cents(row.try_get("unit_price_cents")?),
            product,
        })
    }

    fn row_to_order(row: &PgRow, items: Vec<OrderItem>) -> Result<Order> {
        let status: String = row.try_get("status")?;
        let status = status
            .parse::<OrderStatus>()
            .map_err(|e| StoreError::InvalidRow(e.to_string()))?;

        Ok(Order::from_parts(
            OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
            OrderNumber::new(row.try_get::<String, _>("order_number")?),
            status,
            Money::from_cents(row.try_get("total_cents")?),
            row.try_get::<DateTime<Utc>, _>("created_at")?,
            items,
        ))
    }

    /// Loads items for a set of orders, grouped by order and in line order.
    async fn items_for(&self, order_ids: &[Uuid]) -> Result<HashMap<Uuid, Vec<OrderItem>>> {
        let sql = format!("{ITEM_SELECT} WHERE oi.order_id = ANY($1) ORDER BY oi.order_id, oi.position");
        let rows = sqlx::query(&sql)
            .bind(order_ids)
            .fetch_all(&self.pool)
            .await?;

        let mut grouped: HashMap<Uuid, Vec<OrderItem>> = HashMap::new();
        for row in &rows {
            let order_id: Uuid = row.try_get("order_id")?;
            grouped
                .entry(order_id)
                .or_default()
                .push(Self::row_to_item(row)?);
        }
        Ok(grouped)
    }
}

fn bind_filters<'q>(
    mut sql_query: Query<'q, Postgres, PgArguments>,
    query: &OrderQuery,
) -> Query<'q, Postgres, PgArguments> {
    if let Some(status) = query.status {
        sql_query = sql_query.bind(status.as_str());
    }
    if let Some(from) = query.from {
        sql_query = sql_query.bind(from);
    }
    if let Some(to) = query.to {
        sql_query = sql_query.bind(to);
    }
    sql_query
}

/// Counts lock waits that ran into `lock_timeout`.
fn observe_lock_error(err: sqlx::Error) -> StoreError {
    let err = StoreError::from(err);
    if let StoreError::LockTimeout { resource } = &err {
        metrics::counter!("store_lock_timeouts_total").increment(1);
        tracing::warn!(%resource, "row lock wait timed out");
    }
    err
}

fn to_i32(value: u32, what: &str) -> Result<i32> {
    i32::try_from(value).map_err(|_| StoreError::InvalidRow(format!("{what} {value} out of range")))
}

/// Transaction over a [`PostgresOrderStore`].
///
/// Tracks which rows it locked so writes to unlocked rows are refused the
/// same way the in-memory store refuses them.
pub struct PostgresTransaction {
    tx: sqlx::Transaction<'static, Postgres>,
    locked_products: HashSet<Sku>,
    locked_orders: HashSet<OrderId>,
    /// Orders inserted here, with the next free item position.
    inserted_orders: HashMap<OrderId, i32>,
}

#[async_trait]
impl StoreTransaction for PostgresTransaction {
    #[tracing::instrument(skip(self))]
    async fn lock_product(&mut self, sku: &Sku) -> Result<Option<Product>> {
        let row = sqlx::query(
            r#"
            SELECT sku, name, stock_qty, price_cents
            FROM products
            WHERE sku = $1
            FOR UPDATE
            "#,
        )
        .bind(sku.as_str())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(observe_lock_error)?;

        match row {
            Some(row) => {
                self.locked_products.insert(sku.clone());
                Ok(Some(PostgresOrderStore::row_to_product(&row)?))
            }
            None => Ok(None),
        }
    }

    async fn save_product(&mut self, product: &Product) -> Result<()> {
        if !self.locked_products.contains(&product.sku) {
            return Err(StoreError::NotLocked {
                resource: format!("product {}", product.sku),
            });
        }

        sqlx::query("UPDATE products SET stock_qty = $2 WHERE sku = $1")
            .bind(product.sku.as_str())
            .bind(to_i32(product.stock_qty, "stock_qty")?)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn lock_order(&mut self, order_id: OrderId) -> Result<Option<Order>> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 FOR UPDATE");
        let Some(row) = sqlx::query(&sql)
            .bind(order_id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(observe_lock_error)?
        else {
            return Ok(None);
        };
        self.locked_orders.insert(order_id);

        let item_rows = sqlx::query(
            r#"
            SELECT id, sku, quantity, unit_price_cents, NULL::VARCHAR AS product_name
            FROM order_items
            WHERE order_id = $1
            ORDER BY position
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await?;

        let items = item_rows
            .iter()
            .map(PostgresOrderStore::row_to_item)
            .collect::<Result<Vec<_>>>()?;
        Ok(Some(PostgresOrderStore::row_to_order(&row, items)?))
    }

    async fn save_order(&mut self, order: &Order) -> Result<()> {
        let order_id = order.id();
        if self.locked_orders.contains(&order_id) || self.inserted_orders.contains_key(&order_id)
        {
            sqlx::query("UPDATE orders SET status = $2 WHERE id = $1")
                .bind(order_id.as_uuid())
                .bind(order.status().as_str())
                .execute(&mut *self.tx)
                .await?;
            return Ok(());
        }

        // ON CONFLICT DO NOTHING keeps the transaction alive on a clash, so
        // the caller can retry with another number.
        let inserted = sqlx::query(
            r#"
            INSERT INTO orders (id, order_number, status, total_cents, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(order_id.as_uuid())
        .bind(order.order_number().as_str())
        .bind(order.status().as_str())
        .bind(order.total_amount().cents())
        .bind(order.created_at())
        .execute(&mut *self.tx)
        .await?
        .rows_affected();

        if inserted == 0 {
            let id_taken: bool =
                sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM orders WHERE id = $1)")
                    .bind(order_id.as_uuid())
                    .fetch_one(&mut *self.tx)
                    .await?;
            if id_taken {
                return Err(StoreError::NotLocked {
                    resource: format!("order {order_id}"),
                });
            }
            return Err(StoreError::DuplicateOrderNumber(
                order.order_number().clone(),
            ));
        }

        self.inserted_orders.insert(order_id, 0);
        Ok(())
    }

    async fn save_order_items(&mut self, order_id: OrderId, items: &[OrderItem]) -> Result<()> {
        let next_position = self
            .inserted_orders
            .get_mut(&order_id)
            .ok_or(StoreError::UnknownOrder(order_id))?;

        for item in items {
            sqlx::query(
                r#"
                INSERT INTO order_items (id, order_id, sku, quantity, unit_price_cents, position)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(item.id.as_uuid())
            .bind(order_id.as_uuid())
            .bind(item.sku.as_str())
            .bind(to_i32(item.quantity, "quantity")?)
            .bind(item.unit_price.cents())
            .bind(*next_position)
            .execute(&mut *self.tx)
            .await?;

            *next_position += 1;
        }
        Ok(())
    }

    async fn commit(self) -> Result<()> {
        self.tx
            .commit()
            .await
            .map_err(|e| StoreError::CommitFailed(e.to_string()))
    }

    async fn rollback(self) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

#[async_trait]
impl OrderStore for PostgresOrderStore {
    type Transaction = PostgresTransaction;

    async fn begin(&self) -> Result<PostgresTransaction> {
        let mut tx = self.pool.begin().await?;

        // SET does not take bind parameters; the value is an integer we format.
        let millis = self.lock_timeout.as_millis().max(1);
        let sql = format!("SET LOCAL lock_timeout = '{millis}ms'");
        sqlx::query(&sql).execute(&mut *tx).await?;

        Ok(PostgresTransaction {
            tx,
            locked_products: HashSet::new(),
            locked_orders: HashSet::new(),
            inserted_orders: HashMap::new(),
        })
    }

    async fn get_product(&self, sku: &Sku) -> Result<Option<Product>> {
        let row = sqlx::query("SELECT sku, name, stock_qty, price_cents FROM products WHERE sku = $1")
            .bind(sku.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_product).transpose()
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1");
        let Some(row) = sqlx::query(&sql)
            .bind(order_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
        else {
            return Ok(None);
        };

        let mut items = self.items_for(&[order_id.as_uuid()]).await?;
        let items = items.remove(&order_id.as_uuid()).unwrap_or_default();
        Ok(Some(Self::row_to_order(&row, items)?))
    }

    async fn list_orders(&self, query: OrderQuery) -> Result<OrderPage> {
        let mut conditions = Vec::new();
        let mut param_count = 0;

        // Build dynamic filter
        if query.status.is_some() {
            param_count += 1;
            conditions.push(format!("status = ${param_count}"));
        }
        if query.from.is_some() {
            param_count += 1;
            conditions.push(format!("created_at >= ${param_count}"));
        }
        if query.to.is_some() {
            param_count += 1;
            conditions.push(format!("created_at <= ${param_count}"));
        }
        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        };

        let count_sql = format!("SELECT COUNT(*) AS total FROM orders{where_clause}");
        let total: i64 = bind_filters(sqlx::query(&count_sql), &query)
            .fetch_one(&self.pool)
            .await?
            .try_get("total")?;

        let page_sql = format!(
            "SELECT {ORDER_COLUMNS} FROM orders{where_clause} ORDER BY created_at DESC, id ASC LIMIT ${} OFFSET ${}",
            param_count + 1,
            param_count + 2
        );
        let rows = bind_filters(sqlx::query(&page_sql), &query)
            .bind(i64::from(query.limit))
            .bind(i64::try_from(query.offset()).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;

        let ids = rows
            .iter()
            .map(|row| row.try_get::<Uuid, _>("id"))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let mut items = self.items_for(&ids).await?;

        let orders = rows
            .iter()
            .zip(ids)
            .map(|(row, id)| Self::row_to_order(row, items.remove(&id).unwrap_or_default()))
            .collect::<Result<Vec<_>>>()?;

        Ok(OrderPage {
            orders,
            total: u64::try_from(total).unwrap_or_default(),
            page: query.page,
            limit: query.limit,
        })
    }
}
