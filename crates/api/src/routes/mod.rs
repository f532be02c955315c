//! HTTP route handlers.

pub mod allocation;
pub mod system;
