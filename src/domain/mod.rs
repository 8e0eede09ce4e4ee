//! Methods exposed over the JSON-RPC dispatcher
//!
//! Each submodule turns an upstream provider into registry method descriptors.

pub mod outlook;
pub mod utils;
pub mod weather;
