//! Data access adapters implementing the catalog ports.

pub mod http;
pub mod memory;

pub use http::{HttpCatalogConfig, HttpCatalogSource};
pub use memory::StaticCatalogSource;
