//! # typedom
//!
//! Semantic type model for a C#-like language: resolved type definitions
//! per compilation scope, syntactic type references, and the name
//! resolution engine that turns a written type name into a definition.
//!
//! ## Module Structure (dependency order)
//!
//! ```text
//! project → scope registry, reference counting, background updates
//!   ↓
//! db      → SemanticDatabase: storage, resolution, inheritance, generics
//!   ↓
//! dom     → TypeReference, TypeDefinition, members, compilation units
//!   ↓
//! base    → Primitives (FileId, Location)
//! ```
//!
//! Parsing is not part of this crate: callers build
//! [`CompilationUnit`]s and feed them to a [`SemanticDatabase`].

/// Foundation types: FileId, Location
pub mod base;

/// Type model: references, definitions, members, input units
pub mod dom;

/// Semantic databases and resolution queries
pub mod db;

/// Scope registry and update pipeline
pub mod project;

pub use base::{FileId, Location};
pub use db::{ExtensionMethod, InheritanceTree, NamespaceEntry, SearchRequest, SemanticDatabase, TypeUpdate};
pub use dom::{
    CompilationUnit, DomError, Member, TypeBuilder, TypeDefinition, TypeParameter, TypeReference, UsingDirective,
};
pub use project::{DomRegistry, QueueConfig, UpdateJob};
