//! Deterministic product lock ordering.
//!
//! Every path that locks more than one product row goes through
//! [`lock_products`]. Locks are taken once per distinct SKU in ascending SKU
//! order, so two transactions can never wait on each other's product rows in
//! a cycle.

use std::collections::{BTreeMap, BTreeSet};

use domain::{Product, Sku};
use order_store::{StoreError, StoreTransaction};

/// Returns the distinct SKUs in the order they must be locked.
pub fn lock_order_for<'a>(skus: impl IntoIterator<Item = &'a Sku>) -> Vec<Sku> {
    skus.into_iter()
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Locks the product row of every distinct SKU in ascending order.
///
/// SKUs without a product map to `None`; the caller decides whether that is
/// an error.
pub async fn lock_products<T>(
    tx: &mut T,
    skus: &[Sku],
) -> Result<BTreeMap<Sku, Option<Product>>, StoreError>
where
    T: StoreTransaction + ?Sized,
{
    let mut locked = BTreeMap::new();
    for sku in lock_order_for(skus) {
        let product = tx.lock_product(&sku).await?;
        locked.insert(sku, product);
    }
    Ok(locked)
}
