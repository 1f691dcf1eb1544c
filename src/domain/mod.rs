//! Domain layer for the storefront catalog
//!
//! Record and query models, the error taxonomy and the data access ports.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::QueryError;
