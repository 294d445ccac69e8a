//! Foundation types shared by every layer of the crate.
//!
//! - [`FileId`] - identity of the file a compilation unit came from
//! - [`Location`] - line/column location of record for declarations
//!
//! This module has NO dependencies on other typedom modules.

mod file_id;
mod location;

pub use file_id::FileId;
pub use location::Location;
