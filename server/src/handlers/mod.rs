//! Request handlers for the HTTP API.

mod favorites;

pub use favorites::*;
