//! Port trait definitions (Hexagonal Architecture)
//!
//! Async interfaces the data access adapters implement:
//! - EventSource: list events by status
//! - TechniqueSource: list techniques
//!
//! The query services depend only on these traits, never on a concrete
//! transport.

pub mod catalog_source;

pub use catalog_source::{EventSource, TechniqueSource};
