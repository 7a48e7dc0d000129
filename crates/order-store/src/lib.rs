pub mod error;
pub mod memory;
pub mod postgres;
pub mod query;
pub mod store;

pub use common::OrderId;
pub use error::{Result, StoreError};
pub use memory::{InMemoryOrderStore, InMemoryTransaction};
pub use postgres::{PostgresOrderStore, PostgresTransaction};
pub use query::{DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT, OrderPage, OrderQuery};
pub use store::{DEFAULT_LOCK_TIMEOUT, OrderStore, StoreTransaction};
