//! Scope management: the registry of semantic databases, their reference
//! graph, and the background update queue feeding them.
//!
//! The external parser hands [`CompilationUnit`](crate::dom::CompilationUnit)s
//! to [`DomRegistry::enqueue`]; queries that must see every pending change
//! call [`DomRegistry::force_update`] first.

mod config;
mod queue;
mod registry;

pub use config::QueueConfig;
pub use queue::{UpdateJob, UpdateQueue};
pub use registry::DomRegistry;
