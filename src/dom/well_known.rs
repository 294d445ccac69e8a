//! Names of framework types the engine synthesizes or special-cases.

/// Universal root of the class hierarchy.
pub const OBJECT: &str = "System.Object";
/// Base of every synthesized array type.
pub const ARRAY: &str = "System.Array";
/// Type of the synthesized array indexer's parameter.
pub const INT32: &str = "System.Int32";
/// Name of the synthesized array indexer.
pub const INDEXER_NAME: &str = "Item";

/// Generic collection interface implemented by synthesized arrays.
pub const GENERIC_LIST: &str = "System.Collections.Generic.IList";

/// Generic collection interfaces whose instantiations also yield array types
/// when searching for subclasses.
pub const GENERIC_COLLECTIONS: [&str; 3] = [
    "System.Collections.Generic.IEnumerable",
    "System.Collections.Generic.ICollection",
    GENERIC_LIST,
];

/// Non-generic collection interfaces; every subclass of [`OBJECT`] has an
/// array type implementing them.
pub const OBJECT_COLLECTIONS: [&str; 3] = [
    "System.Collections.IEnumerable",
    "System.Collections.ICollection",
    "System.Collections.IList",
];
