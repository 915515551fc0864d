//! Search execution and the query log.

pub mod executor;
pub mod log;
pub mod store;

pub use executor::{ExecuteOptions, QueryExecutor, SearchRequest};
pub use log::{QueryLogEntry, QueryType, SearchHit};
pub use store::{JsonlQueryLogStore, MemoryQueryLogStore, QueryLogStore};
