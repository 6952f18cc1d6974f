//! Database module for PostgreSQL persistence.

mod favorites;
mod pool;

pub use favorites::*;
pub use pool::*;
