use std::collections::{BTreeMap, HashMap, HashSet};
use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError, RwLock as StdRwLock};
use std::time::Duration;

use async_trait::async_trait;
use domain::{Order, OrderItem, OrderNumber, Product, Sku};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::{
    OrderId, OrderPage, OrderQuery, Result, StoreError,
    store::{DEFAULT_LOCK_TIMEOUT, OrderStore, StoreTransaction},
};

/// A stored row. Transactions serialize on `lock`; readers only ever see
/// `committed`, which is written while the row lock is held.
struct Row<T> {
    lock: Arc<Mutex<()>>,
    committed: StdRwLock<T>,
}

impl<T: Clone> Row<T> {
    fn new(value: T) -> Arc<Self> {
        Arc::new(Self {
            lock: Arc::new(Mutex::new(())),
            committed: StdRwLock::new(value),
        })
    }

    fn snapshot(&self) -> T {
        self.committed
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn publish(&self, value: T) {
        *self
            .committed
            .write()
            .unwrap_or_else(PoisonError::into_inner) = value;
    }
}

#[derive(Default)]
struct Tables {
    products: RwLock<HashMap<Sku, Arc<Row<Product>>>>,
    orders: RwLock<HashMap<OrderId, Arc<Row<Order>>>>,
    /// Unique index on order numbers, including numbers claimed by
    /// transactions that have not finished yet.
    order_numbers: StdMutex<HashSet<OrderNumber>>,
    fail_on_commit: AtomicBool,
}

/// In-memory order store for tests and local runs.
///
/// Provides the same locking contract as the PostgreSQL implementation:
/// every row has its own async mutex, a transaction keeps the owned guard of
/// each row it locks until it finishes, and writes are staged until commit.
/// Reads return the last committed value of each row and never wait on a
/// row lock.
///
/// Map locks are never held while waiting for a row lock.
#[derive(Clone)]
pub struct InMemoryOrderStore {
    tables: Arc<Tables>,
    lock_timeout: Duration,
}

impl Default for InMemoryOrderStore {
    fn default() -> Self {
        Self {
            tables: Arc::default(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }
}

impl InMemoryOrderStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store seeded with the given products.
    pub fn with_products(products: impl IntoIterator<Item = Product>) -> Self {
        let rows = products
            .into_iter()
            .map(|product| (product.sku.clone(), Row::new(product)))
            .collect();

        Self {
            tables: Arc::new(Tables {
                products: RwLock::new(rows),
                ..Tables::default()
            }),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    /// Sets how long a transaction waits for a row lock.
    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    /// Deletes a product row. Order items referencing it keep their SKU.
    pub async fn remove_product(&self, sku: &Sku) -> bool {
        self.tables.products.write().await.remove(sku).is_some()
    }

    /// Makes every following commit fail until reset.
    pub fn set_fail_on_commit(&self, fail: bool) {
        self.tables.fail_on_commit.store(fail, Ordering::SeqCst);
    }

    /// Returns the number of committed orders.
    pub async fn order_count(&self) -> usize {
        self.tables.orders.read().await.len()
    }

    async fn hydrate(&self, order: Order) -> Order {
        let products = self.tables.products.read().await;
        let items = order
            .items()
            .iter()
            .map(|item| {
                let product = products.get(&item.sku).map(|row| row.snapshot().info());
                item.clone().with_product(product)
            })
            .collect();
        drop(products);
        order.with_items(items)
    }
}

async fn acquire(lock: Arc<Mutex<()>>, timeout: Duration, resource: String) -> Result<OwnedMutexGuard<()>> {
    match tokio::time::timeout(timeout, lock.lock_owned()).await {
        Ok(guard) => Ok(guard),
        Err(_) => {
            metrics::counter!("store_lock_timeouts_total").increment(1);
            tracing::warn!(%resource, ?timeout, "row lock wait timed out");
            Err(StoreError::LockTimeout { resource })
        }
    }
}

struct Locked<T> {
    row: Arc<Row<T>>,
    _guard: OwnedMutexGuard<()>,
    staged: T,
}

impl<T: Clone> Locked<T> {
    fn publish(self) {
        self.row.publish(self.staged);
    }
}

/// Transaction over an [`InMemoryOrderStore`].
pub struct InMemoryTransaction {
    tables: Arc<Tables>,
    lock_timeout: Duration,
    products: BTreeMap<Sku, Locked<Product>>,
    orders: HashMap<OrderId, Locked<Order>>,
    inserted: Vec<Order>,
    claimed_numbers: Vec<OrderNumber>,
    committed: bool,
}

impl InMemoryTransaction {
    fn release_claimed_numbers(&mut self) {
        if self.claimed_numbers.is_empty() {
            return;
        }
        let mut numbers = self
            .tables
            .order_numbers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for number in self.claimed_numbers.drain(..) {
            numbers.remove(&number);
        }
    }
}

impl Drop for InMemoryTransaction {
    fn drop(&mut self) {
        if !self.committed {
            self.release_claimed_numbers();
        }
    }
}

#[async_trait]
impl StoreTransaction for InMemoryTransaction {
    #[tracing::instrument(skip(self))]
    async fn lock_product(&mut self, sku: &Sku) -> Result<Option<Product>> {
        if let Some(locked) = self.products.get(sku) {
            return Ok(Some(locked.staged.clone()));
        }

        let Some(row) = self.tables.products.read().await.get(sku).cloned() else {
            return Ok(None);
        };
        let guard = acquire(row.lock.clone(), self.lock_timeout, format!("product {sku}")).await?;

        // The product may have been deleted while we waited.
        let still_present = self
            .tables
            .products
            .read()
            .await
            .get(sku)
            .is_some_and(|current| Arc::ptr_eq(current, &row));
        if !still_present {
            return Ok(None);
        }

        let product = row.snapshot();
        self.products.insert(
            sku.clone(),
            Locked {
                row,
                _guard: guard,
                staged: product.clone(),
            },
        );
        Ok(Some(product))
    }

    async fn save_product(&mut self, product: &Product) -> Result<()> {
        let locked = self
            .products
            .get_mut(&product.sku)
            .ok_or_else(|| StoreError::NotLocked {
                resource: format!("product {}", product.sku),
            })?;
        locked.staged = product.clone();
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn lock_order(&mut self, order_id: OrderId) -> Result<Option<Order>> {
        if let Some(locked) = self.orders.get(&order_id) {
            return Ok(Some(locked.staged.clone()));
        }
        if let Some(order) = self.inserted.iter().find(|o| o.id() == order_id) {
            return Ok(Some(order.clone()));
        }

        let Some(row) = self.tables.orders.read().await.get(&order_id).cloned() else {
            return Ok(None);
        };
        let guard = acquire(row.lock.clone(), self.lock_timeout, format!("order {order_id}")).await?;

        let order = row.snapshot();
        self.orders.insert(
            order_id,
            Locked {
                row,
                _guard: guard,
                staged: order.clone(),
            },
        );
        Ok(Some(order))
    }

    async fn save_order(&mut self, order: &Order) -> Result<()> {
        if let Some(locked) = self.orders.get_mut(&order.id()) {
            let stored = &locked.staged;
            locked.staged = Order::from_parts(
                stored.id(),
                stored.order_number().clone(),
                order.status(),
                stored.total_amount(),
                stored.created_at(),
                stored.items().to_vec(),
            );
            return Ok(());
        }

        if let Some(pending) = self.inserted.iter_mut().find(|o| o.id() == order.id()) {
            let items = pending.items().to_vec();
            *pending = order.clone().with_items(items);
            return Ok(());
        }

        if self.tables.orders.read().await.contains_key(&order.id()) {
            return Err(StoreError::NotLocked {
                resource: format!("order {}", order.id()),
            });
        }

        {
            let mut numbers = self
                .tables
                .order_numbers
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if !numbers.insert(order.order_number().clone()) {
                return Err(StoreError::DuplicateOrderNumber(
                    order.order_number().clone(),
                ));
            }
        }
        self.claimed_numbers.push(order.order_number().clone());
        self.inserted.push(order.clone().with_items(Vec::new()));
        Ok(())
    }

    async fn save_order_items(&mut self, order_id: OrderId, items: &[OrderItem]) -> Result<()> {
        let pending = self
            .inserted
            .iter_mut()
            .find(|o| o.id() == order_id)
            .ok_or(StoreError::UnknownOrder(order_id))?;

        let mut stored = pending.items().to_vec();
        stored.extend(items.iter().map(|item| item.clone().with_product(None)));
        *pending = pending.clone().with_items(stored);
        Ok(())
    }

    async fn commit(mut self) -> Result<()> {
        if self.tables.fail_on_commit.load(Ordering::SeqCst) {
            return Err(StoreError::CommitFailed(
                "commit rejected by in-memory store".to_string(),
            ));
        }

        // Publish new orders while every row lock is still held so no reader
        // sees decremented stock without its order.
        {
            let mut orders = self.tables.orders.write().await;
            for order in mem::take(&mut self.inserted) {
                orders.insert(order.id(), Row::new(order));
            }
        }

        for (_, locked) in mem::take(&mut self.orders) {
            locked.publish();
        }
        for (_, locked) in mem::take(&mut self.products) {
            locked.publish();
        }

        self.committed = true;
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        // Staged writes and row guards are dropped; Drop releases claimed numbers.
        drop(self);
        Ok(())
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    type Transaction = InMemoryTransaction;

    async fn begin(&self) -> Result<InMemoryTransaction> {
        Ok(InMemoryTransaction {
            tables: self.tables.clone(),
            lock_timeout: self.lock_timeout,
            products: BTreeMap::new(),
            orders: HashMap::new(),
            inserted: Vec::new(),
            claimed_numbers: Vec::new(),
            committed: false,
        })
    }

    async fn get_product(&self, sku: &Sku) -> Result<Option<Product>> {
        let product = self
            .tables
            .products
            .read()
            .await
            .get(sku)
            .map(|row| row.snapshot());
        Ok(product)
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        let Some(row) = self.tables.orders.read().await.get(&order_id).cloned() else {
            return Ok(None);
        };
        Ok(Some(self.hydrate(row.snapshot()).await))
    }

    async fn list_orders(&self, query: OrderQuery) -> Result<OrderPage> {
        let mut matching: Vec<Order> = self
            .tables
            .orders
            .read()
            .await
            .values()
            .map(|row| row.snapshot())
            .filter(|order| query.matches(order))
            .collect();

        matching.sort_by(|a, b| {
            b.created_at()
                .cmp(&a.created_at())
                .then(a.id().cmp(&b.id()))
        });

        let total = matching.len() as u64;
        let offset = usize::try_from(query.offset()).unwrap_or(usize::MAX);
        let mut orders = Vec::new();
        for order in matching
            .into_iter()
            .skip(offset)
            .take(query.limit as usize)
        {
            orders.push(self.hydrate(order).await);
        }

        Ok(OrderPage {
            orders,
            total,
            page: query.page,
            limit: query.limit,
        })
    }
}
