//! Name resolution: what type does this name refer to, here?
//!
//! A [`SearchRequest`] carries the written name plus its context (calling
//! type, compilation unit). [`SemanticDatabase::resolve`] tries each
//! source of names in a fixed order and returns the first hit:
//!
//! 1. generic parameters of the calling type, walking outward
//! 2. a known type by (partially) qualified name
//! 3. nested types of the calling type, its bases, then its enclosing types
//! 4. a `using` alias (its target is looked up without further aliasing)
//! 5. the calling type's enclosing namespaces, most specific first
//! 6. each `using` directive in source order
//!
//! Named lookups stay inside this scope unless the request is marked
//! [`deep`](SearchRequest::deep).

use std::sync::Arc;

use smol_str::SmolStr;
use tracing::trace;

use super::SemanticDatabase;
use super::database::strip_arity;
use crate::dom::{
    CompilationUnit, TypeDefinition, TypeReference, UsingDirective, names_equal,
    strip_name_prefix,
};

// ============================================================================
// REQUEST
// ============================================================================

/// A resolution query. Built once, never mutated by the engine.
#[derive(Clone, Debug)]
pub struct SearchRequest {
    name: SmolStr,
    generic_arguments: Vec<TypeReference>,
    calling_type: Option<Arc<TypeDefinition>>,
    unit: Option<Arc<CompilationUnit>>,
    case_sensitive: bool,
    deep: bool,
    /// Off while resolving base types for the inheritance walk, which
    /// step 3 itself depends on.
    search_nested: bool,
}

impl SearchRequest {
    pub fn new(name: &str) -> Self {
        Self {
            name: SmolStr::new(name),
            generic_arguments: Vec::new(),
            calling_type: None,
            unit: None,
            case_sensitive: true,
            deep: false,
            search_nested: true,
        }
    }

    /// A request for the type a written reference names.
    pub fn from_type_reference(reference: &TypeReference) -> Self {
        Self::new(&reference.full_name()).with_generic_arguments(reference.generic_arguments().to_vec())
    }

    pub fn with_generic_arguments(mut self, arguments: Vec<TypeReference>) -> Self {
        self.generic_arguments = arguments;
        self
    }

    pub fn with_calling_type(mut self, calling_type: Arc<TypeDefinition>) -> Self {
        self.calling_type = Some(calling_type);
        self
    }

    pub fn with_unit(mut self, unit: Arc<CompilationUnit>) -> Self {
        self.unit = Some(unit);
        self
    }

    pub fn case_insensitive(mut self) -> Self {
        self.case_sensitive = false;
        self
    }

    /// Let named lookups fall through to referenced scopes.
    pub fn deep(mut self) -> Self {
        self.deep = true;
        self
    }

    pub(crate) fn without_nested_search(mut self) -> Self {
        self.search_nested = false;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn generic_arguments(&self) -> &[TypeReference] {
        &self.generic_arguments
    }

    pub fn calling_type(&self) -> Option<&Arc<TypeDefinition>> {
        self.calling_type.as_ref()
    }

    pub fn unit(&self) -> Option<&Arc<CompilationUnit>> {
        self.unit.as_ref()
    }

    pub fn is_case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    pub fn is_deep(&self) -> bool {
        self.deep
    }
}

// ============================================================================
// ENGINE
// ============================================================================

impl SemanticDatabase {
    /// Resolve a written type name in context. `None` when nothing matches.
    pub fn resolve(&self, request: &SearchRequest) -> Option<Arc<TypeDefinition>> {
        let name = request.name();
        if name.is_empty() {
            return None;
        }
        let args = request.generic_arguments();
        let cs = request.case_sensitive;
        let calling = request.calling_type.as_ref().map(|ty| self.resolve_type(ty));

        // 1. generic parameter of the calling type or an enclosing type
        if let Some(calling) = &calling {
            if args.is_empty() {
                if let Some(found) = self.find_generic_parameter(calling, name, cs) {
                    trace!(name, step = "generic parameter", "resolved");
                    return Some(found);
                }
            }
        }

        // 2. known type
        if let Some(found) = self.lookup(request, name, args) {
            trace!(name, step = "known type", "resolved");
            return Some(found);
        }

        // 3. nested type reachable from the calling type
        if let Some(calling) = &calling {
            if request.search_nested {
                let segments: Vec<&str> = name.split('.').collect();
                if let Some(found) = self.search_inner_type(calling, &segments, args.len(), cs) {
                    trace!(name, step = "nested type", "resolved");
                    return Some(self.instantiate(&found, args));
                }
            }
        }

        // 4. alias
        if let Some(unit) = &request.unit {
            if let Some(target) = find_alias(name, unit.usings(), cs) {
                let found = self.lookup(request, &target.full_name(), target.generic_arguments());
                if found.is_some() {
                    trace!(name, step = "alias", "resolved");
                    return found;
                }
            }
        }

        // 5. enclosing namespaces of the calling type
        if let Some(calling) = &calling {
            let mut scope = calling.full_name();
            while let Some(idx) = scope.rfind('.') {
                scope = &scope[..idx];
                if let Some(found) = self.lookup(request, &format!("{scope}.{name}"), args) {
                    trace!(name, step = "enclosing namespace", scope, "resolved");
                    return Some(found);
                }
            }
        }

        // 6. using directives, in source order
        if let Some(unit) = &request.unit {
            for using in unit.usings() {
                if let Some(found) = self.search_using(request, using) {
                    trace!(name, step = "using directive", "resolved");
                    return Some(found);
                }
            }
        }

        None
    }

    /// Step 2 lookup honoring the request's depth and case flags.
    fn lookup(&self, request: &SearchRequest, name: &str, args: &[TypeReference]) -> Option<Arc<TypeDefinition>> {
        self.get_type(name, args, request.deep, request.case_sensitive)
    }

    fn find_generic_parameter(
        &self,
        calling: &Arc<TypeDefinition>,
        name: &str,
        case_sensitive: bool,
    ) -> Option<Arc<TypeDefinition>> {
        let mut current = Some(calling.clone());
        while let Some(ty) = current {
            let owner = match &*ty {
                TypeDefinition::Instantiation(inst) => inst.open_type().clone(),
                _ => ty.clone(),
            };
            if let Some(tp) = owner
                .type_parameters()
                .iter()
                .find(|tp| names_equal(tp.name(), name, case_sensitive))
            {
                return Some(self.parameter_type(&owner, tp));
            }
            current = self.declaring_type(&owner);
        }
        None
    }

    /// Follow a dotted name through nested types, starting at `outer`.
    ///
    /// Inner segments may carry `` `N `` suffixes; the last segment uses
    /// `final_arity`.
    pub(crate) fn search_inner_type(
        &self,
        outer: &Arc<TypeDefinition>,
        segments: &[&str],
        final_arity: usize,
        case_sensitive: bool,
    ) -> Option<Arc<TypeDefinition>> {
        let mut current = outer.clone();
        for (i, segment) in segments.iter().enumerate() {
            let (name, arity) = if i + 1 == segments.len() {
                (strip_arity(segment).0, final_arity)
            } else {
                let (name, arity) = strip_arity(segment);
                (name, arity.unwrap_or(0))
            };
            current = self.search_inner_type_once(&current, &name, arity, case_sensitive)?;
        }
        Some(current)
    }

    fn search_inner_type_once(
        &self,
        outer: &Arc<TypeDefinition>,
        name: &str,
        arity: usize,
        case_sensitive: bool,
    ) -> Option<Arc<TypeDefinition>> {
        let mut current = Some(outer.clone());
        while let Some(ty) = current {
            for inherited in self.inheritance_tree(&ty) {
                if let Some(found) = self.find_inner_type_in(&inherited, name, arity, case_sensitive) {
                    return Some(found);
                }
            }
            current = self.declaring_type(&ty);
        }
        None
    }

    fn find_inner_type_in(
        &self,
        outer: &Arc<TypeDefinition>,
        name: &str,
        arity: usize,
        case_sensitive: bool,
    ) -> Option<Arc<TypeDefinition>> {
        if let Some(inner) = outer.find_nested(name, arity, case_sensitive) {
            return Some(inner.clone());
        }
        if arity != 0 {
            return None;
        }
        let owner = match &**outer {
            TypeDefinition::Instantiation(inst) => inst.open_type(),
            _ => outer,
        };
        owner
            .type_parameters()
            .iter()
            .find(|tp| names_equal(tp.name(), name, case_sensitive))
            .map(|tp| self.parameter_type(owner, tp))
    }

    fn search_using(&self, request: &SearchRequest, using: &UsingDirective) -> Option<Arc<TypeDefinition>> {
        let name = request.name();
        let args = request.generic_arguments();

        for namespace in using.namespaces() {
            if let Some(found) = self.lookup(request, &format!("{namespace}.{name}"), args) {
                return Some(found);
            }
        }

        // partial namespace: the declaring namespace and each enclosing one
        if let Some(partial) = using.aliases().get("") {
            let full = partial.full_name();
            let mut namespace = full.as_str();
            while !namespace.is_empty() {
                if let Some(found) = self.lookup(request, &format!("{namespace}.{name}"), args) {
                    return Some(found);
                }
                namespace = namespace.rfind('.').map_or("", |idx| &namespace[..idx]);
            }
        }

        for (alias, target) in using.aliases() {
            if alias.is_empty() {
                continue;
            }
            if let Some(rest) = strip_name_prefix(name, alias, request.case_sensitive) {
                let candidate = format!("{}{rest}", target.full_name());
                if let Some(found) = self.lookup(request, &candidate, args) {
                    return Some(found);
                }
            }
        }
        None
    }
}

/// The first alias named `name`, in directive order.
fn find_alias<'a>(name: &str, usings: &'a [UsingDirective], case_sensitive: bool) -> Option<&'a TypeReference> {
    usings.iter().find_map(|using| {
        using
            .aliases()
            .iter()
            .find(|(alias, _)| !alias.is_empty() && names_equal(alias, name, case_sensitive))
            .map(|(_, target)| target)
    })
}
