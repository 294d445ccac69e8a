//! Per-scope type storage and direct lookups.
//!
//! A [`SemanticDatabase`] owns every type declared in one compilation scope
//! (a project or an assembly). Types are stored as per-file fragments and
//! merged into one logical entry per (full name, arity); several fragments
//! of the same type become a [`CompoundType`](crate::dom::CompoundType).
//!
//! Name resolution, inheritance queries and generic instantiation live in
//! sibling modules as further `impl SemanticDatabase` blocks.

use std::borrow::Cow;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use rustc_hash::{FxBuildHasher, FxHashMap, FxHashSet};
use tracing::debug;

use super::inheritance::SubclassIndex;
use crate::base::FileId;
use crate::dom::{
    CompilationUnit, ParameterType, TypeDefinition, TypeReference, merge_fragments, names_equal,
    strip_name_prefix,
};

type NameMap<V> = IndexMap<Arc<str>, V, FxBuildHasher>;

// ============================================================================
// UPDATE RESULT
// ============================================================================

/// Full names affected by ingesting or removing a compilation unit.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TypeUpdate {
    /// Names that did not exist before.
    pub added: Vec<Arc<str>>,
    /// Names that no longer exist.
    pub removed: Vec<Arc<str>>,
    /// Names that existed before and still exist.
    pub modified: Vec<Arc<str>>,
}

impl TypeUpdate {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }

    fn names(&self) -> impl Iterator<Item = &Arc<str>> {
        self.added.iter().chain(&self.removed).chain(&self.modified)
    }
}

/// One result of [`SemanticDatabase::namespace_contents`].
#[derive(Clone, Debug)]
pub enum NamespaceEntry {
    /// A sub-namespace, by its simple name.
    Namespace(Arc<str>),
    Type(Arc<TypeDefinition>),
}

impl NamespaceEntry {
    fn dedupe_key(&self) -> String {
        match self {
            NamespaceEntry::Namespace(name) => format!("namespace {name}"),
            NamespaceEntry::Type(ty) => format!("type {}", ty.decorated_full_name()),
        }
    }
}

// ============================================================================
// STORAGE
// ============================================================================

#[derive(Default)]
struct TypeStore {
    /// Units in ingest order.
    units: IndexMap<FileId, Arc<CompilationUnit>>,
    /// Full name → every fragment declared under it, with its file.
    fragments: NameMap<Vec<(FileId, Arc<TypeDefinition>)>>,
    /// Full name → logical types, one per arity.
    by_name: NameMap<Vec<Arc<TypeDefinition>>>,
    /// Lowercased full name → stored spellings.
    folded: FxHashMap<String, Vec<Arc<str>>>,
}

impl TypeStore {
    fn replace_file(&mut self, file: FileId, unit: Option<Arc<CompilationUnit>>) -> TypeUpdate {
        let old_types = self
            .units
            .shift_remove(&file)
            .map(|old| old.all_types())
            .unwrap_or_default();
        let new_types = unit.as_ref().map(|u| u.all_types()).unwrap_or_default();

        let mut affected: Vec<Arc<str>> = Vec::new();
        let mut seen = FxHashSet::default();
        for ty in old_types.iter().chain(&new_types) {
            if seen.insert(ty.full_name_arc().clone()) {
                affected.push(ty.full_name_arc().clone());
            }
        }
        let existed: FxHashSet<Arc<str>> = affected
            .iter()
            .filter(|name| self.fragments.get(*name).is_some_and(|list| !list.is_empty()))
            .cloned()
            .collect();

        for name in &affected {
            if let Some(list) = self.fragments.get_mut(name) {
                list.retain(|(owner, _)| *owner != file);
            }
        }
        for ty in &new_types {
            self.fragments
                .entry(ty.full_name_arc().clone())
                .or_default()
                .push((file, ty.clone()));
        }
        if let Some(unit) = unit {
            self.units.insert(file, unit);
        }

        let mut update = TypeUpdate::default();
        for name in affected {
            let exists = self.rebuild(&name);
            match (existed.contains(&name), exists) {
                (false, true) => update.added.push(name),
                (true, false) => update.removed.push(name),
                (true, true) => update.modified.push(name),
                (false, false) => {}
            }
        }
        update
    }

    /// Recompute the logical entries for `name`; returns whether any remain.
    fn rebuild(&mut self, name: &Arc<str>) -> bool {
        let fragments = self.fragments.get(name).cloned().unwrap_or_default();
        let folded_key = name.to_lowercase();

        if fragments.is_empty() {
            self.fragments.shift_remove(name);
            self.by_name.shift_remove(name);
            if let Some(spellings) = self.folded.get_mut(&folded_key) {
                spellings.retain(|s| s != name);
                if spellings.is_empty() {
                    self.folded.remove(&folded_key);
                }
            }
            return false;
        }

        let mut by_arity: IndexMap<usize, Vec<Arc<TypeDefinition>>> = IndexMap::new();
        for (_, ty) in fragments {
            by_arity.entry(ty.arity()).or_default().push(ty);
        }
        let logical: Vec<_> = by_arity.into_values().filter_map(merge_fragments).collect();
        self.by_name.insert(name.clone(), logical);

        let spellings = self.folded.entry(folded_key).or_default();
        if !spellings.contains(name) {
            spellings.push(name.clone());
        }
        true
    }

    fn find(&self, name: &str, arity: usize) -> Option<Arc<TypeDefinition>> {
        self.by_name
            .get(name)
            .and_then(|list| list.iter().find(|ty| ty.arity() == arity))
            .cloned()
    }
}

/// Split `` `N `` arity suffixes off every segment of `name`; the arity of
/// the last segment is returned.
pub(crate) fn strip_arity(name: &str) -> (Cow<'_, str>, Option<usize>) {
    if !name.contains('`') {
        return (Cow::Borrowed(name), None);
    }
    let mut plain = String::with_capacity(name.len());
    let mut last = None;
    for (i, segment) in name.split('.').enumerate() {
        if i > 0 {
            plain.push('.');
        }
        let (base, arity) = match segment.rsplit_once('`') {
            Some((base, count)) => match count.parse::<usize>() {
                Ok(n) => (base, Some(n)),
                Err(_) => (segment, None),
            },
            None => (segment, None),
        };
        plain.push_str(base);
        last = arity;
    }
    (Cow::Owned(plain), last)
}

// ============================================================================
// DATABASE
// ============================================================================

/// The registry of type definitions for one compilation scope.
pub struct SemanticDatabase {
    uri: Arc<str>,
    store: RwLock<TypeStore>,
    references: RwLock<Arc<[Arc<SemanticDatabase>]>>,
    /// Instantiations and parameter types, keyed by `{full name}[...]`.
    pub(super) instantiations: Mutex<FxHashMap<Arc<str>, Arc<TypeDefinition>>>,
    pub(super) subclass_index: RwLock<SubclassIndex>,
    ref_count: AtomicUsize,
}

impl SemanticDatabase {
    pub fn new(uri: impl Into<Arc<str>>) -> Self {
        Self {
            uri: uri.into(),
            store: RwLock::new(TypeStore::default()),
            references: RwLock::new(Arc::from(Vec::new())),
            instantiations: Mutex::new(FxHashMap::default()),
            subclass_index: RwLock::new(SubclassIndex::default()),
            ref_count: AtomicUsize::new(0),
        }
    }

    /// Identity of the scope this database describes.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub(crate) fn uri_arc(&self) -> &Arc<str> {
        &self.uri
    }

    // ========================================================================
    // INGEST
    // ========================================================================

    /// Replace everything `unit`'s file contributed with the unit's types.
    pub fn update_from_unit(&self, unit: CompilationUnit) -> TypeUpdate {
        let file = unit.file();
        self.apply(file, Some(Arc::new(unit)))
    }

    /// Drop everything `file` contributed.
    pub fn remove_file(&self, file: FileId) -> TypeUpdate {
        self.apply(file, None)
    }

    fn apply(&self, file: FileId, unit: Option<Arc<CompilationUnit>>) -> TypeUpdate {
        let update = self.store.write().replace_file(file, unit);
        for name in update.names() {
            self.reset_instantiations_of(name);
        }
        if !update.is_empty() {
            self.subclass_index.write().mark_dirty();
        }
        debug!(
            scope = %self.uri,
            %file,
            added = update.added.len(),
            removed = update.removed.len(),
            modified = update.modified.len(),
            "compilation unit applied"
        );
        update
    }

    // ========================================================================
    // CONTENTS
    // ========================================================================

    pub fn unit(&self, file: FileId) -> Option<Arc<CompilationUnit>> {
        self.store.read().units.get(&file).cloned()
    }

    pub fn files(&self) -> Vec<FileId> {
        self.store.read().units.keys().copied().collect()
    }

    /// Top-level types declared in `file`, as that file declares them.
    pub fn types_in_file(&self, file: FileId) -> Vec<Arc<TypeDefinition>> {
        self.unit(file).map(|unit| unit.types().to_vec()).unwrap_or_default()
    }

    /// Logical top-level types.
    pub fn types(&self) -> Vec<Arc<TypeDefinition>> {
        self.all_types()
            .into_iter()
            .filter(|ty| ty.declaring_type_name().is_none())
            .collect()
    }

    /// Logical types, nested ones included.
    pub fn all_types(&self) -> Vec<Arc<TypeDefinition>> {
        self.store.read().by_name.values().flatten().cloned().collect()
    }

    /// Number of logical types.
    pub fn len(&self) -> usize {
        self.store.read().by_name.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.store.read().by_name.is_empty()
    }

    // ========================================================================
    // REFERENCES
    // ========================================================================

    /// Snapshot of the databases this scope depends on.
    pub fn references(&self) -> Arc<[Arc<SemanticDatabase>]> {
        self.references.read().clone()
    }

    /// Swap in a new reference list and return the superseded one.
    ///
    /// Reference counts are not touched; [`DomRegistry`](crate::project::DomRegistry)
    /// pairs this with acquire/release.
    pub fn set_references(&self, references: Vec<Arc<SemanticDatabase>>) -> Arc<[Arc<SemanticDatabase>]> {
        std::mem::replace(&mut *self.references.write(), Arc::from(references))
    }

    /// Visit transitively referenced databases breadth-first, each once,
    /// until `visit` returns a value.
    pub(crate) fn walk_references<T>(
        &self,
        mut visit: impl FnMut(&SemanticDatabase) -> Option<T>,
    ) -> Option<T> {
        let mut visited: FxHashSet<Arc<str>> = FxHashSet::default();
        visited.insert(self.uri.clone());
        let mut queue: VecDeque<Arc<SemanticDatabase>> = self.references().iter().cloned().collect();
        while let Some(db) = queue.pop_front() {
            if !visited.insert(db.uri.clone()) {
                continue;
            }
            if let Some(found) = visit(&db) {
                return Some(found);
            }
            queue.extend(db.references().iter().cloned());
        }
        None
    }

    pub fn ref_count(&self) -> usize {
        self.ref_count.load(Ordering::Acquire)
    }

    pub(crate) fn acquire(&self) -> usize {
        self.ref_count.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Decrement the count (never below zero) and return the new value.
    pub(crate) fn release(&self) -> usize {
        match self
            .ref_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
        {
            Ok(previous) => previous - 1,
            Err(_) => 0,
        }
    }

    // ========================================================================
    // DIRECT LOOKUP
    // ========================================================================

    fn lookup_local(&self, name: &str, arity: usize, case_sensitive: bool) -> Option<Arc<TypeDefinition>> {
        let store = self.store.read();
        if let Some(found) = store.find(name, arity) {
            return Some(found);
        }
        if case_sensitive {
            return None;
        }
        store
            .folded
            .get(&name.to_lowercase())?
            .iter()
            .find_map(|spelling| store.find(spelling, arity))
    }

    pub(crate) fn find_type(
        &self,
        name: &str,
        arity: usize,
        deep: bool,
        case_sensitive: bool,
    ) -> Option<Arc<TypeDefinition>> {
        if let Some(found) = self.lookup_local(name, arity, case_sensitive) {
            return Some(found);
        }
        if !deep {
            return None;
        }
        self.walk_references(|db| db.lookup_local(name, arity, case_sensitive))
    }

    /// Look a type up by full name.
    ///
    /// The arity is the number of `generic_arguments`, or the `` `N ``
    /// suffix of `name` when there are none. Non-empty arguments
    /// instantiate the found type. `deep` also searches referenced scopes.
    pub fn get_type(
        &self,
        name: &str,
        generic_arguments: &[TypeReference],
        deep: bool,
        case_sensitive: bool,
    ) -> Option<Arc<TypeDefinition>> {
        let (plain, suffix) = strip_arity(name);
        let arity = if generic_arguments.is_empty() {
            suffix.unwrap_or(0)
        } else {
            generic_arguments.len()
        };
        let found = self.find_type(&plain, arity, deep, case_sensitive)?;
        Some(self.instantiate(&found, generic_arguments))
    }

    /// Look up the open type `name` with exactly `arity` type parameters.
    pub fn get_type_by_arity(
        &self,
        name: &str,
        arity: usize,
        deep: bool,
        case_sensitive: bool,
    ) -> Option<Arc<TypeDefinition>> {
        let (plain, _) = strip_arity(name);
        self.find_type(&plain, arity, deep, case_sensitive)
    }

    /// The definition a reference names, searching referenced scopes too.
    ///
    /// Array references yield a synthesized array type of their element.
    /// Generic arguments of every part are bound. The result is cached in
    /// the reference's resolved link.
    pub fn get_type_by_reference(&self, reference: &TypeReference) -> Option<Arc<TypeDefinition>> {
        if let Some(element) = reference.element_type() {
            return Some(self.array_type(&element));
        }
        if let Some(cached) = reference.resolved_type() {
            if self.is_current(&cached) {
                return Some(cached);
            }
            reference.clear_resolved_type();
        }

        let ty = self.get_type(
            &reference.decorated_full_name(),
            reference.generic_arguments(),
            true,
            true,
        )?;
        let ty = if ty.is_instantiation() || ty.as_parameter().is_some() || !reference.has_generic_arguments() {
            ty
        } else {
            self.instantiate(&ty, &reference.all_generic_arguments())
        };
        reference.set_resolved_type(&ty);
        Some(ty)
    }

    /// The enclosing type of a nested type, looked up by name.
    pub fn declaring_type(&self, ty: &TypeDefinition) -> Option<Arc<TypeDefinition>> {
        match ty {
            TypeDefinition::Parameter(param) => return Some(param.owner().clone()),
            TypeDefinition::Instantiation(inst) => return self.declaring_type(inst.open_type()),
            _ => {}
        }
        let outer = ty.declaring_type_name()?;
        let enclosing = |db: &SemanticDatabase| {
            let store = db.store.read();
            let candidates = store.by_name.get(outer)?;
            candidates
                .iter()
                .find(|c| c.find_nested(ty.name(), ty.arity(), true).is_some())
                .or_else(|| candidates.first())
                .cloned()
        };
        enclosing(self).or_else(|| self.walk_references(enclosing))
    }

    /// Whether `ty` is still the definition stored under its name, here or
    /// in a referenced scope. Instantiations and parameter types must also
    /// still be the cached instance.
    pub(crate) fn is_current(&self, ty: &Arc<TypeDefinition>) -> bool {
        match &**ty {
            TypeDefinition::Instantiation(inst) => {
                self.is_current(inst.open_type()) && self.is_cached(inst.key(), ty)
            }
            TypeDefinition::Parameter(param) => {
                let key = ParameterType::key_for(param.owner().full_name(), param.parameter().name());
                self.is_current(param.owner()) && self.is_cached(&key, ty)
            }
            // synthesized arrays live outside the store
            _ if ty.element_type().is_some() => true,
            _ => self
                .find_type(ty.full_name(), ty.arity(), true, true)
                .is_some_and(|stored| Arc::ptr_eq(&stored, ty)),
        }
    }

    fn is_cached(&self, key: &str, ty: &Arc<TypeDefinition>) -> bool {
        self.instantiations
            .lock()
            .get(key)
            .is_some_and(|cached| Arc::ptr_eq(cached, ty))
    }

    /// Re-fetch a possibly stale definition by name.
    ///
    /// A compound result keeps the main part of the definition passed in.
    /// Parameter and array types are returned as they are.
    pub fn resolve_type(&self, ty: &Arc<TypeDefinition>) -> Arc<TypeDefinition> {
        if ty.as_parameter().is_some() || ty.element_type().is_some() {
            return ty.clone();
        }
        let fetched = match &**ty {
            TypeDefinition::Instantiation(inst) => {
                let open = inst.open_type();
                self.find_type(open.full_name(), open.arity(), true, true)
                    .map(|open| self.instantiate(&open, inst.arguments()))
            }
            _ => self.find_type(ty.full_name(), ty.arity(), true, true),
        };
        let Some(fetched) = fetched else {
            return ty.clone();
        };
        if let (Some(stale), Some(fresh)) = (ty.as_compound(), fetched.as_compound()) {
            let main = stale.main_part();
            fresh.set_main_part(main.file(), main.location());
        }
        fetched
    }

    // ========================================================================
    // NAMESPACES
    // ========================================================================

    /// Types and sub-namespaces directly inside any of `namespaces`.
    ///
    /// With `include_references`, directly referenced scopes contribute too.
    /// Entries are deduplicated.
    pub fn namespace_contents(
        &self,
        namespaces: &[&str],
        include_references: bool,
        case_sensitive: bool,
    ) -> Vec<NamespaceEntry> {
        let mut prefixes: Vec<&str> = Vec::with_capacity(namespaces.len());
        for ns in namespaces {
            if !prefixes.contains(ns) {
                prefixes.push(ns);
            }
        }

        let mut result = Vec::new();
        let mut seen = FxHashSet::default();
        self.collect_namespace_contents(&prefixes, case_sensitive, &mut result, &mut seen);
        if include_references {
            for db in self.references().iter() {
                db.collect_namespace_contents(&prefixes, case_sensitive, &mut result, &mut seen);
            }
        }
        result
    }

    fn collect_namespace_contents(
        &self,
        prefixes: &[&str],
        case_sensitive: bool,
        result: &mut Vec<NamespaceEntry>,
        seen: &mut FxHashSet<String>,
    ) {
        for ty in self.types() {
            for prefix in prefixes {
                let Some(rest) = strip_name_prefix(ty.full_name(), prefix, case_sensitive) else {
                    continue;
                };
                let rest = if prefix.is_empty() {
                    rest
                } else {
                    match rest.strip_prefix('.') {
                        Some(rest) => rest,
                        None => continue,
                    }
                };
                let entry = match rest.find('.') {
                    Some(idx) => NamespaceEntry::Namespace(Arc::from(&rest[..idx])),
                    None => NamespaceEntry::Type(ty.clone()),
                };
                if seen.insert(entry.dedupe_key()) {
                    result.push(entry);
                }
            }
        }
    }

    /// Whether any type lives in `namespace` or one of its sub-namespaces.
    pub fn namespace_exists(&self, namespace: &str, deep: bool, case_sensitive: bool) -> bool {
        let contains = |db: &SemanticDatabase| {
            db.types().iter().any(|ty| {
                namespace.is_empty()
                    || names_equal(ty.namespace(), namespace, case_sensitive)
                    || strip_name_prefix(ty.namespace(), namespace, case_sensitive)
                        .is_some_and(|rest| rest.starts_with('.'))
            })
        };
        contains(self) || (deep && self.walk_references(|db| contains(db).then_some(())).is_some())
    }

    /// Namespaces (local first, then direct references) that declare a type
    /// the reference could name if that namespace were imported.
    pub fn resolve_possible_namespaces(&self, reference: &TypeReference) -> Vec<String> {
        let target = reference.decorated_full_name();
        let mut result: Vec<String> = Vec::new();
        let mut collect = |db: &SemanticDatabase| {
            for ty in db.types() {
                let ns = ty.namespace();
                let candidate = if ns.is_empty() {
                    target.clone()
                } else {
                    format!("{ns}.{target}")
                };
                if ty.decorated_full_name() == candidate && !result.iter().any(|r| r == ns) {
                    result.push(ns.to_string());
                }
            }
        };
        collect(self);
        for db in self.references().iter() {
            collect(db);
        }
        result
    }
}

impl fmt::Debug for SemanticDatabase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SemanticDatabase")
            .field("uri", &self.uri)
            .field("types", &self.len())
            .field("ref_count", &self.ref_count())
            .finish()
    }
}
