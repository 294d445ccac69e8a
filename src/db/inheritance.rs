//! Inheritance queries: ancestor walks, subclass search, member visibility.

use std::collections::VecDeque;
use std::sync::Arc;

use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use super::{SearchRequest, SemanticDatabase};
use crate::dom::well_known::{GENERIC_COLLECTIONS, OBJECT, OBJECT_COLLECTIONS};
use crate::dom::{Accessibility, Member, Result, TypeDefinition, TypeReference};

// ============================================================================
// INHERITANCE TREE
// ============================================================================

/// Lazy walk over a type and every type it inherits from.
///
/// Each type is yielded once, keyed by its decorated full name, so cyclic
/// or malformed base graphs terminate. Types without an explicit base get
/// the root object type as their base.
pub struct InheritanceTree<'a> {
    db: &'a SemanticDatabase,
    stack: Vec<Arc<TypeDefinition>>,
    visited: FxHashSet<String>,
}

impl Iterator for InheritanceTree<'_> {
    type Item = Arc<TypeDefinition>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(current) = self.stack.pop() {
            if !self.visited.insert(current.decorated_full_name()) {
                continue;
            }
            for base in current.base_types() {
                if let Some(resolved) = self.db.resolve_base_type(&current, base) {
                    self.stack.push(resolved);
                }
            }
            if current.base_type().is_none() && current.full_name() != OBJECT {
                if let Some(object) = self.db.find_type(OBJECT, 0, true, true) {
                    self.stack.push(object);
                }
            }
            return Some(current);
        }
        None
    }
}

// ============================================================================
// SUBCLASS INDEX
// ============================================================================

/// Reverse inheritance edges: decorated base name → direct subtypes.
///
/// Rebuilt lazily after any ingest; the generation counter keeps a build
/// that raced with an ingest from being marked current.
pub(crate) struct SubclassIndex {
    generation: u64,
    built_generation: Option<u64>,
    by_base: FxHashMap<String, Vec<Arc<TypeDefinition>>>,
}

impl Default for SubclassIndex {
    fn default() -> Self {
        Self {
            generation: 0,
            built_generation: None,
            by_base: FxHashMap::default(),
        }
    }
}

impl SubclassIndex {
    /// Drop the current build; it holds definitions the ingest replaced.
    pub(crate) fn mark_dirty(&mut self) {
        self.generation += 1;
        self.built_generation = None;
        self.by_base.clear();
    }

    fn is_current(&self) -> bool {
        self.built_generation == Some(self.generation)
    }

    fn direct(&self, base: &str) -> Vec<Arc<TypeDefinition>> {
        self.by_base.get(base).cloned().unwrap_or_default()
    }
}

impl SemanticDatabase {
    /// `ty` (re-fetched) followed by everything it inherits from.
    pub fn inheritance_tree(&self, ty: &Arc<TypeDefinition>) -> InheritanceTree<'_> {
        InheritanceTree {
            db: self,
            stack: vec![self.resolve_type(ty)],
            visited: FxHashSet::default(),
        }
    }

    /// Resolve one base-type edge of `owner`.
    ///
    /// Tries the reference as written first, then resolves it from the
    /// owner's own context (its namespace and its file's `using`s) without
    /// nested-type search, which would need this very walk.
    pub(crate) fn resolve_base_type(
        &self,
        owner: &Arc<TypeDefinition>,
        base: &TypeReference,
    ) -> Option<Arc<TypeDefinition>> {
        if let Some(found) = self.get_type_by_reference(base) {
            return Some(found);
        }
        let context = match &**owner {
            TypeDefinition::Instantiation(inst) => inst.open_type().clone(),
            TypeDefinition::Parameter(param) => param.owner().clone(),
            _ => owner.clone(),
        };
        let mut request = SearchRequest::from_type_reference(base)
            .with_calling_type(context.clone())
            .deep()
            .without_nested_search();
        if let Some(unit) = context.file().and_then(|file| self.unit(file)) {
            request = request.with_unit(unit);
        }
        let found = self.resolve(&request)?;
        base.set_resolved_type(&found);
        Some(found)
    }

    fn direct_subclasses(&self, base: &str) -> Vec<Arc<TypeDefinition>> {
        let generation = {
            let index = self.subclass_index.read();
            if index.is_current() {
                return index.direct(base);
            }
            index.generation
        };

        let edges = self.collect_base_edges();
        let mut index = self.subclass_index.write();
        if !index.is_current() && index.generation == generation {
            debug!(scope = self.uri(), bases = edges.len(), "subclass index rebuilt");
            index.by_base = edges;
            index.built_generation = Some(generation);
            return index.direct(base);
        }
        if index.is_current() {
            return index.direct(base);
        }
        // an ingest landed while building; answer from this build only
        edges.get(base).cloned().unwrap_or_default()
    }

    fn collect_base_edges(&self) -> FxHashMap<String, Vec<Arc<TypeDefinition>>> {
        let types = self.all_types();
        let pairs: Vec<(String, Arc<TypeDefinition>)> = types
            .par_iter()
            .flat_map_iter(|ty| {
                let mut bases: Vec<String> = ty
                    .base_types()
                    .filter_map(|base| self.resolve_base_type(ty, base))
                    .map(|base| base.decorated_full_name())
                    .collect();
                if ty.base_type().is_none() && ty.full_name() != OBJECT {
                    bases.push(OBJECT.to_string());
                }
                bases.into_iter().map(move |base| (base, ty.clone()))
            })
            .collect();

        let mut edges: FxHashMap<String, Vec<Arc<TypeDefinition>>> = FxHashMap::default();
        for (base, ty) in pairs {
            let subtypes = edges.entry(base).or_default();
            if !subtypes.iter().any(|existing| Arc::ptr_eq(existing, &ty)) {
                subtypes.push(ty);
            }
        }
        edges
    }

    /// `ty` and the types deriving from it in this scope.
    ///
    /// `deep` follows subclasses of subclasses. `namespaces` keeps only
    /// types declared in one of the listed namespaces. Instantiated generic
    /// collection interfaces also yield the array of their element type, and
    /// the non-generic collection interfaces yield an array type for every
    /// subclass of the root object type.
    pub fn subclasses(
        &self,
        ty: &Arc<TypeDefinition>,
        deep: bool,
        namespaces: Option<&[&str]>,
    ) -> Vec<Arc<TypeDefinition>> {
        let passes = |candidate: &TypeDefinition| namespaces.is_none_or(|list| list.contains(&candidate.namespace()));

        let mut result = Vec::new();
        let mut visited = FxHashSet::default();
        let mut queue = VecDeque::from([(ty.clone(), 0usize)]);
        while let Some((current, depth)) = queue.pop_front() {
            let key = current.decorated_full_name();
            if !visited.insert(key.clone()) {
                continue;
            }
            if passes(&*current) {
                result.push(current.clone());
            }
            if depth == 0 || deep {
                queue.extend(self.direct_subclasses(&key).into_iter().map(|sub| (sub, depth + 1)));
            }
        }

        if let Some(inst) = ty.as_instantiation() {
            if GENERIC_COLLECTIONS.contains(&inst.open_type().full_name()) {
                if let Some(element) = inst.arguments().first() {
                    result.push(self.array_type(element));
                }
            }
        }
        if OBJECT_COLLECTIONS.contains(&ty.full_name()) {
            if let Some(object) = self.find_type(OBJECT, 0, true, true) {
                for sub in self.subclasses(&object, true, namespaces) {
                    result.push(self.array_type(&TypeReference::for_type(&sub)));
                }
            }
        }
        result
    }

    // ========================================================================
    // VISIBILITY
    // ========================================================================

    /// Members of `ty` accessible from code inside `calling`.
    ///
    /// Without a calling type only public members are visible. Fails on a
    /// member whose modifiers carry no known accessibility.
    pub fn visible_members(
        &self,
        ty: &Arc<TypeDefinition>,
        calling: Option<&Arc<TypeDefinition>>,
    ) -> Result<Vec<Member>> {
        let mut result = Vec::new();
        for member in ty.members() {
            let access = member.modifiers.accessibility()?;
            if self.is_accessible(ty, access, calling) {
                result.push(member.clone());
            }
        }
        Ok(result)
    }

    fn is_accessible(
        &self,
        declaring: &Arc<TypeDefinition>,
        access: Accessibility,
        calling: Option<&Arc<TypeDefinition>>,
    ) -> bool {
        let Some(calling) = calling else {
            return access == Accessibility::Public;
        };
        let inside = || is_same_or_nested(calling, declaring);
        let derived = || {
            inside() || {
                let target = declaring.decorated_full_name();
                self.inheritance_tree(calling)
                    .any(|ancestor| ancestor.decorated_full_name() == target)
            }
        };
        let same_scope = || {
            self.find_type(declaring.full_name(), declaring.arity(), false, true).is_some()
                && self.find_type(calling.full_name(), calling.arity(), false, true).is_some()
        };
        match access {
            Accessibility::Public => true,
            Accessibility::Private => inside(),
            Accessibility::Protected => derived(),
            Accessibility::Internal => same_scope(),
            Accessibility::ProtectedOrInternal => derived() || same_scope(),
            Accessibility::ProtectedAndInternal => derived() && same_scope(),
        }
    }
}

fn is_same_or_nested(inner: &TypeDefinition, outer: &TypeDefinition) -> bool {
    let outer = outer.full_name();
    let inner = inner.full_name();
    inner == outer || inner.strip_prefix(outer).is_some_and(|rest| rest.starts_with('.'))
}
