//! Contract datastore gateways: in-memory, DuckDB, and hosted REST.

mod error;
mod gateway;
mod memory;

pub use error::StoreError;
pub use gateway::ContractGateway;
pub use memory::{MemoryGateway, StoredContract};

#[cfg(feature = "duckdb")]
mod duck;
#[cfg(feature = "duckdb")]
pub use duck::DuckGateway;

#[cfg(feature = "http")]
mod rest;
#[cfg(feature = "http")]
pub use rest::RestGateway;
