//! HTTP JSON-RPC adapter for the configurator backend contract.

pub mod backend;
pub mod envelope;

pub use backend::{JsonRpcBackend, DATABASE_HEADER};
