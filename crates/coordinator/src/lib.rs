//! Transactional order coordinators.
//!
//! Creating an order reserves stock across every requested SKU and
//! cancelling it releases that stock, each as one atomic unit of work over an
//! [`OrderStore`](order_store::OrderStore). Both coordinators lock product
//! rows through [`locking::lock_products`] so concurrent orders never
//! deadlock.

pub mod error;
pub mod locking;
pub mod release;
pub mod reservation;
pub mod service;

pub use error::{OrderError, Result};
pub use locking::{lock_order_for, lock_products};
pub use release::ReleaseCoordinator;
pub use reservation::{MAX_ORDER_NUMBER_ATTEMPTS, ReservationCoordinator};
pub use service::OrderService;
