//! Allocation domain model.

mod allocation;
mod batch;
mod order_line;
mod product;

pub use allocation::allocate;
pub use batch::Batch;
pub use order_line::OrderLine;
pub use product::Product;
