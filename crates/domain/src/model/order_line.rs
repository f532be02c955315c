//! Order line value object.

use common::{OrderId, Sku};
use serde::{Deserialize, Serialize};

/// A line on a customer order.
///
/// Value object: two lines are equal when all three fields are equal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OrderLine {
    /// The order this line belongs to.
    pub orderid: OrderId,

    /// The product ordered.
    pub sku: Sku,

    /// Quantity ordered.
    pub qty: u32,
}

impl OrderLine {
    /// Creates a new order line.
    pub fn new(orderid: impl Into<OrderId>, sku: impl Into<Sku>, qty: u32) -> Self {
        Self {
            orderid: orderid.into(),
            sku: sku.into(),
            qty,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_equality_by_value() {
        assert_eq!(
            OrderLine::new("o1", "LAMP", 2),
            OrderLine::new("o1", "LAMP", 2)
        );
        assert_ne!(
            OrderLine::new("o1", "LAMP", 2),
            OrderLine::new("o1", "LAMP", 3)
        );
    }

    #[test]
    fn test_hash_by_value() {
        let mut lines = HashSet::new();
        lines.insert(OrderLine::new("o1", "LAMP", 2));
        lines.insert(OrderLine::new("o1", "LAMP", 2));
        assert_eq!(lines.len(), 1);
    }
}
