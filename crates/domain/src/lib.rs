//! Domain layer for the order reservation system.
//!
//! This crate provides the plain data the coordinators work with:
//! - `Product` rows with their stock and price
//! - `Order` and `OrderItem` records with the order status machine
//! - The `CreateOrder` command and its input validation
//! - Order number generation

pub mod command;
pub mod error;
pub mod order;
pub mod order_number;
pub mod product;
pub mod status;
pub mod value_objects;

pub use command::{CreateOrder, MAX_LINE_QUANTITY, RequestedItem, ValidLine, quantities_by_sku};
pub use common::OrderId;
pub use error::{AmountOverflow, StockError, ValidationError};
pub use order::{Order, OrderItem, OrderItemId};
pub use order_number::{OrderNumber, OrderNumberGenerator, RandomOrderNumbers};
pub use product::{MAX_STOCK, Product, ProductInfo};
pub use status::{OrderStatus, UnknownStatus};
pub use value_objects::{Money, Sku};
