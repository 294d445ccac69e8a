//! The semantic type model.
//!
//! - [`TypeReference`] - a syntactic mention of a type with a canonical form
//! - [`TypeDefinition`] - a resolved type (plain, compound, instantiated, parameter)
//! - [`Member`] and friends - fields, properties, methods, events
//! - [`CompilationUnit`] / [`UsingDirective`] - what the parser hands over
//!
//! Nothing here performs lookups; see [`crate::db`] for that.

mod error;
mod input;
mod members;
mod modifiers;
mod type_def;
mod type_ref;
pub mod well_known;

pub use error::{DomError, Result};
pub use input::{CompilationUnit, UsingDirective};
pub use members::{Member, MemberKind, Parameter, TypeParameter};
pub use modifiers::{
    Accessibility, ClassKind, MethodModifiers, Modifiers, ParameterModifiers, PropertyModifiers,
};
pub use type_def::{
    CompoundType, GenericInstantiation, ParameterType, TypeBody, TypeBuilder, TypeDefinition,
};
pub use type_ref::{TypePart, TypeReference, split_full_name};

pub(crate) use type_def::merge_fragments;
pub(crate) use type_ref::Bindings;

/// Compare two names, optionally ignoring case.
pub(crate) fn names_equal(a: &str, b: &str, case_sensitive: bool) -> bool {
    if case_sensitive {
        a == b
    } else {
        a.chars()
            .flat_map(char::to_lowercase)
            .eq(b.chars().flat_map(char::to_lowercase))
    }
}

/// `name` with `prefix` removed, if it starts with it.
pub(crate) fn strip_name_prefix<'a>(name: &'a str, prefix: &str, case_sensitive: bool) -> Option<&'a str> {
    let head = name.get(..prefix.len())?;
    names_equal(head, prefix, case_sensitive).then(|| &name[prefix.len()..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_equal() {
        assert!(names_equal("Widget", "Widget", true));
        assert!(!names_equal("Widget", "widget", true));
        assert!(names_equal("Widget", "wIDGET", false));
    }

    #[test]
    fn test_strip_name_prefix() {
        assert_eq!(strip_name_prefix("IO.File", "IO", true), Some(".File"));
        assert_eq!(strip_name_prefix("io.File", "IO", false), Some(".File"));
        assert_eq!(strip_name_prefix("IO", "IO.File", true), None);
        assert_eq!(strip_name_prefix("Xy", "IO", true), None);
    }
}
