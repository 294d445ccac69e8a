//! Semantic databases and the queries they answer.
//!
//! ## Key Types
//!
//! - [`SemanticDatabase`] - types of one compilation scope, plus its
//!   reference list and instantiation cache
//! - [`SearchRequest`] - a name-resolution query in context
//! - [`InheritanceTree`] - lazy, duplicate-free ancestor walk
//! - [`ExtensionMethod`] - an extension method bound to a receiver type
//!
//! ## Locking
//!
//! Type storage sits behind a `parking_lot::RwLock`; the instantiation
//! cache behind one `Mutex` per database. No lock is held while another
//! query runs, so queries may call each other freely.

mod database;
mod generics;
mod inheritance;
mod resolve;
mod synth;

pub use database::{NamespaceEntry, SemanticDatabase, TypeUpdate};
pub use inheritance::InheritanceTree;
pub use resolve::SearchRequest;
pub use synth::ExtensionMethod;
