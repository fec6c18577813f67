#![forbid(unsafe_code)]

//! Access to the remote evaluation store: the `EvaluationStore` contract, an
//! in-memory implementation with server semantics, and the REST client.

pub mod http;
pub mod repository;

pub use repository::{EvaluationStore, InMemoryStore, StorageError};
