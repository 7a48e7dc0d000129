use chrono::{DateTime, Utc};
use domain::{Order, OrderStatus, ValidationError};

/// Page size used when none is given.
pub const DEFAULT_PAGE_LIMIT: u32 = 10;

/// Largest page size a caller may ask for.
pub const MAX_PAGE_LIMIT: u32 = 100;

/// Builder for listing orders.
///
/// Filters by status and creation time range (both bounds inclusive) and
/// pages through results ordered newest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderQuery {
    /// Filter by status.
    pub status: Option<OrderStatus>,

    /// Orders created at or after this instant.
    pub from: Option<DateTime<Utc>>,

    /// Orders created at or before this instant.
    pub to: Option<DateTime<Utc>>,

    /// 1-based page number.
    pub page: u32,

    /// Page size.
    pub limit: u32,
}

impl Default for OrderQuery {
    fn default() -> Self {
        Self {
            status: None,
            from: None,
            to: None,
            page: 1,
            limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

impl OrderQuery {
    /// Creates a query for the first page of all orders.
    pub fn new() -> Self {
        Self::default()
    }

    /// Filters by status.
    pub fn status(mut self, status: OrderStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Filters by orders created at or after `from`.
    pub fn since(mut self, from: DateTime<Utc>) -> Self {
        self.from = Some(from);
        self
    }

    /// Filters by orders created at or before `to`.
    pub fn until(mut self, to: DateTime<Utc>) -> Self {
        self.to = Some(to);
        self
    }

    /// Selects a page.
    pub fn page(mut self, page: u32, limit: u32) -> Self {
        self.page = page;
        self.limit = limit;
        self
    }

    /// Checks page bounds and the time range.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.page < 1 {
            return Err(ValidationError::InvalidQuery {
                field: "page",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.limit < 1 || self.limit > MAX_PAGE_LIMIT {
            return Err(ValidationError::InvalidQuery {
                field: "limit",
                reason: format!("must be between 1 and {MAX_PAGE_LIMIT}"),
            });
        }
        if let (Some(from), Some(to)) = (self.from, self.to)
            && from > to
        {
            return Err(ValidationError::InvalidQuery {
                field: "from",
                reason: "must not be after `to`".to_string(),
            });
        }
        Ok(())
    }

    /// Number of rows to skip.
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.limit)
    }

    /// Returns true if the order passes the status and time filters.
    pub fn matches(&self, order: &Order) -> bool {
        if let Some(status) = self.status
            && order.status() != status
        {
            return false;
        }
        if let Some(from) = self.from
            && order.created_at() < from
        {
            return false;
        }
        if let Some(to) = self.to
            && order.created_at() > to
        {
            return false;
        }
        true
    }
}

/// One page of orders plus the total number of matches.
#[derive(Debug, Clone)]
pub struct OrderPage {
    pub orders: Vec<Order>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
}

impl OrderPage {
    /// Number of pages needed to show every match.
    pub fn total_pages(&self) -> u64 {
        if self.limit == 0 {
            return 0;
        }
        self.total.div_ceil(u64::from(self.limit))
    }
}
