//! Parser-facing input types.
//!
//! The parser collaborator hands the database one [`CompilationUnit`] per
//! file. Re-sending a unit with the same [`FileId`] replaces everything
//! that file contributed before.

use std::sync::Arc;

use indexmap::IndexMap;

use super::type_def::{TypeBuilder, TypeDefinition};
use super::type_ref::TypeReference;
use crate::base::{FileId, Location};

/// A `using` directive: imported namespaces and/or aliases, in source order.
///
/// The alias key `""` marks a partial namespace: the directive sits inside
/// that namespace and every enclosing namespace is implicitly imported.
#[derive(Clone, Debug, Default)]
pub struct UsingDirective {
    namespaces: Vec<Arc<str>>,
    aliases: IndexMap<Arc<str>, TypeReference>,
    is_namespace_import: bool,
    location: Location,
}

impl UsingDirective {
    /// `using App.Core;`
    pub fn namespace(namespace: &str) -> Self {
        Self {
            namespaces: vec![Arc::from(namespace)],
            is_namespace_import: true,
            ..Self::default()
        }
    }

    /// `using Name = Target;`
    pub fn alias(name: &str, target: TypeReference) -> Self {
        Self::default().with_alias(name, target)
    }

    /// The implicit directive for code declared inside `namespace`.
    pub fn partial_namespace(namespace: &str) -> Self {
        Self::default().with_alias("", TypeReference::new(namespace))
    }

    pub fn with_namespace(mut self, namespace: &str) -> Self {
        self.namespaces.push(Arc::from(namespace));
        self.is_namespace_import = true;
        self
    }

    pub fn with_alias(mut self, name: &str, target: TypeReference) -> Self {
        self.aliases.insert(Arc::from(name), target);
        self
    }

    pub fn at(mut self, location: Location) -> Self {
        self.location = location;
        self
    }

    pub fn namespaces(&self) -> &[Arc<str>] {
        &self.namespaces
    }

    pub fn aliases(&self) -> &IndexMap<Arc<str>, TypeReference> {
        &self.aliases
    }

    pub fn is_namespace_import(&self) -> bool {
        self.is_namespace_import
    }

    pub fn location(&self) -> Location {
        self.location
    }
}

/// Everything one parsed file contributes.
#[derive(Clone, Debug)]
pub struct CompilationUnit {
    file: FileId,
    file_name: Arc<str>,
    usings: Vec<UsingDirective>,
    types: Vec<Arc<TypeDefinition>>,
}

impl CompilationUnit {
    pub fn new(file: FileId, file_name: impl Into<Arc<str>>) -> Self {
        Self {
            file,
            file_name: file_name.into(),
            usings: Vec::new(),
            types: Vec::new(),
        }
    }

    pub fn with_using(mut self, using: UsingDirective) -> Self {
        self.usings.push(using);
        self
    }

    pub fn with_type(mut self, builder: TypeBuilder) -> Self {
        self.add_type(builder);
        self
    }

    pub fn add_using(&mut self, using: UsingDirective) {
        self.usings.push(using);
    }

    /// Build a top-level type into this unit and return it.
    pub fn add_type(&mut self, builder: TypeBuilder) -> Arc<TypeDefinition> {
        let ty = builder.build(Some(self.file));
        self.types.push(ty.clone());
        ty
    }

    pub fn file(&self) -> FileId {
        self.file
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn usings(&self) -> &[UsingDirective] {
        &self.usings
    }

    /// Top-level types in declaration order.
    pub fn types(&self) -> &[Arc<TypeDefinition>] {
        &self.types
    }

    /// Top-level and nested types, outer before inner.
    pub fn all_types(&self) -> Vec<Arc<TypeDefinition>> {
        let mut result = Vec::new();
        let mut stack: Vec<Arc<TypeDefinition>> = self.types.iter().rev().cloned().collect();
        while let Some(ty) = stack.pop() {
            stack.extend(ty.nested_types().iter().rev().cloned());
            result.push(ty);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_types_get_file_identity() {
        let mut unit = CompilationUnit::new(FileId::new(3), "Widget.cs");
        let ty = unit.add_type(TypeBuilder::class("App.Widget"));

        assert_eq!(ty.file(), Some(FileId::new(3)));
        assert_eq!(unit.types().len(), 1);
        assert_eq!(unit.file_name(), "Widget.cs");
    }

    #[test]
    fn test_all_types_walks_nested() {
        let unit = CompilationUnit::new(FileId::new(0), "a.cs")
            .with_type(TypeBuilder::class("App.Outer").with_nested(TypeBuilder::class("Inner")))
            .with_type(TypeBuilder::class("App.Other"));

        let names: Vec<_> = unit.all_types().iter().map(|t| t.full_name().to_string()).collect();
        assert_eq!(names, vec!["App.Outer", "App.Outer.Inner", "App.Other"]);
    }

    #[test]
    fn test_using_directive_shapes() {
        let import = UsingDirective::namespace("App.Core").with_namespace("App.Util");
        assert!(import.is_namespace_import());
        assert_eq!(import.namespaces().len(), 2);

        let alias = UsingDirective::alias("Foo", TypeReference::new("N2.Bar"));
        assert!(!alias.is_namespace_import());
        assert_eq!(alias.aliases()["Foo"].full_name(), "N2.Bar");

        let partial = UsingDirective::partial_namespace("App.Core");
        assert_eq!(partial.aliases()[""].full_name(), "App.Core");
    }
}
