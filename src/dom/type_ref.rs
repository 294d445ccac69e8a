//! Type references - syntactic, as-written mentions of a type.
//!
//! A [`TypeReference`] records what the parser saw (`Foo.Bar<int>[,]*`),
//! not what it means. The canonical form is a total function of the
//! fields and is what caches key on; two references with the same
//! canonical form are interchangeable.

use std::fmt::{self, Write as _};
use std::hash::{Hash, Hasher};
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use smol_str::SmolStr;

use super::error::{DomError, Result};
use super::type_def::TypeDefinition;

/// Type-parameter name → bound argument.
pub(crate) type Bindings = FxHashMap<SmolStr, TypeReference>;

/// Keep the leading identifier characters of a written name
/// (`List`1` → `List`, `Foo<T>` → `Foo`).
fn identifier_prefix(name: &str) -> &str {
    let end = name
        .char_indices()
        .find(|&(_, ch)| !(ch == '_' || unicode_ident::is_xid_continue(ch)))
        .map_or(name.len(), |(idx, _)| idx);
    &name[..end]
}

/// Split `A.B.C` into namespace `A.B` and name `C`.
pub fn split_full_name(full_name: &str) -> (&str, &str) {
    match full_name.rfind('.') {
        Some(idx) => (&full_name[..idx], &full_name[idx + 1..]),
        None => ("", full_name),
    }
}

/// One dotted segment of a reference with its own generic arguments.
#[derive(Clone, Debug)]
pub struct TypePart {
    name: SmolStr,
    generic_arguments: Vec<TypeReference>,
}

impl TypePart {
    pub fn new(name: &str) -> Self {
        Self::with_arguments(name, Vec::new())
    }

    pub fn with_arguments(name: &str, generic_arguments: Vec<TypeReference>) -> Self {
        Self {
            name: SmolStr::new(identifier_prefix(name)),
            generic_arguments,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn generic_arguments(&self) -> &[TypeReference] {
        &self.generic_arguments
    }
}

/// Non-owning link to the definition a reference resolved to.
#[derive(Default)]
struct ResolvedLink(RwLock<Weak<TypeDefinition>>);

impl Clone for ResolvedLink {
    fn clone(&self) -> Self {
        Self(RwLock::new(self.0.read().clone()))
    }
}

/// A syntactic mention of a type.
#[derive(Clone)]
pub struct TypeReference {
    namespace: SmolStr,
    /// Never empty.
    parts: Vec<TypePart>,
    /// One entry per array rank; each is the number of extra dimensions (`[,]` = 1).
    dimensions: Vec<u32>,
    pointer_depth: u32,
    array_pointer_depth: u32,
    nullable: bool,
    by_ref: bool,
    canonical: OnceLock<Arc<str>>,
    resolved: ResolvedLink,
}

impl TypeReference {
    /// A reference to a non-generic type by full name.
    pub fn new(full_name: &str) -> Self {
        Self::generic(full_name, Vec::new())
    }

    /// A reference to `full_name` with generic arguments on its last part.
    pub fn generic(full_name: &str, generic_arguments: Vec<TypeReference>) -> Self {
        let (namespace, name) = split_full_name(full_name);
        Self::build(
            SmolStr::new(namespace),
            vec![TypePart::with_arguments(name, generic_arguments)],
        )
    }

    /// A reference made of explicit parts, e.g. `Outer<T>.Inner<U>`.
    pub fn from_parts(namespace: &str, parts: Vec<TypePart>) -> Result<Self> {
        if parts.is_empty() {
            return Err(DomError::InvalidArgument("a type reference needs at least one part"));
        }
        Ok(Self::build(SmolStr::new(namespace), parts))
    }

    fn build(namespace: SmolStr, parts: Vec<TypePart>) -> Self {
        Self {
            namespace,
            parts,
            dimensions: Vec::new(),
            pointer_depth: 0,
            array_pointer_depth: 0,
            nullable: false,
            by_ref: false,
            canonical: OnceLock::new(),
            resolved: ResolvedLink::default(),
        }
    }

    /// A reference naming an existing definition, already linked to it.
    pub fn for_type(ty: &Arc<TypeDefinition>) -> Self {
        if let Some(element) = ty.element_type() {
            let array = element.array_of();
            array.set_resolved_type(ty);
            return array;
        }

        let result = match &**ty {
            TypeDefinition::Parameter(param) => TypeReference::new(param.parameter().name()),
            TypeDefinition::Instantiation(inst) => {
                let open = inst.open_type();
                let mut parts = nested_chain(open.namespace(), open.full_name());
                if let Some(last) = parts.last_mut() {
                    last.generic_arguments = inst.arguments().to_vec();
                }
                Self::build(SmolStr::new(open.namespace()), parts)
            }
            _ => {
                let mut parts = nested_chain(ty.namespace(), ty.full_name());
                if let Some(last) = parts.last_mut() {
                    last.generic_arguments = ty
                        .type_parameters()
                        .iter()
                        .map(|tp| TypeReference::new(tp.name()))
                        .collect();
                }
                Self::build(SmolStr::new(ty.namespace()), parts)
            }
        };
        result.set_resolved_type(ty);
        result
    }

    // ------------------------------------------------------------------
    // Builders
    // ------------------------------------------------------------------

    pub fn with_nullable(mut self, nullable: bool) -> Self {
        self.set_nullable(nullable);
        self
    }

    pub fn with_by_ref(mut self, by_ref: bool) -> Self {
        self.set_by_ref(by_ref);
        self
    }

    pub fn with_pointer_depth(mut self, depth: u32) -> Self {
        self.set_pointer_depth(depth);
        self
    }

    pub fn with_array_dimensions(mut self, count: usize) -> Self {
        self.set_array_dimensions(count);
        self
    }

    /// This reference with one more single-dimensional array rank.
    pub fn array_of(&self) -> Self {
        let mut result = self.unlinked();
        result.dimensions.push(0);
        result
    }

    /// The element of an array reference (first rank removed).
    pub fn element_type(&self) -> Option<Self> {
        if self.dimensions.is_empty() {
            return None;
        }
        let mut result = self.unlinked();
        result.dimensions.remove(0);
        result.array_pointer_depth = 0;
        Some(result)
    }

    /// A copy without the memoized canonical form or resolved link.
    fn unlinked(&self) -> Self {
        Self {
            canonical: OnceLock::new(),
            resolved: ResolvedLink::default(),
            ..self.clone()
        }
    }

    // ------------------------------------------------------------------
    // Names
    // ------------------------------------------------------------------

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn parts(&self) -> &[TypePart] {
        &self.parts
    }

    /// Name of the last part.
    pub fn name(&self) -> &str {
        self.parts.last().map_or("", |part| part.name())
    }

    /// Generic arguments of the last part.
    pub fn generic_arguments(&self) -> &[TypeReference] {
        self.parts
            .last()
            .map(|part| part.generic_arguments())
            .unwrap_or_default()
    }

    /// Generic arguments of every part, outermost first.
    pub fn all_generic_arguments(&self) -> Vec<TypeReference> {
        self.parts
            .iter()
            .flat_map(|part| part.generic_arguments.iter().cloned())
            .collect()
    }

    pub fn has_generic_arguments(&self) -> bool {
        self.parts.iter().any(|part| !part.generic_arguments.is_empty())
    }

    /// `Namespace.Part1.Part2` without arity or decorations.
    pub fn full_name(&self) -> String {
        let mut result = String::from(self.namespace.as_str());
        for part in &self.parts {
            if !result.is_empty() {
                result.push('.');
            }
            result.push_str(part.name());
        }
        result
    }

    /// Full name with a `` `N `` suffix on each generic part.
    pub fn decorated_full_name(&self) -> String {
        let mut result = String::from(self.namespace.as_str());
        for part in &self.parts {
            if !result.is_empty() {
                result.push('.');
            }
            result.push_str(part.name());
            if !part.generic_arguments.is_empty() {
                let _ = write!(result, "`{}", part.generic_arguments.len());
            }
        }
        result
    }

    /// Stable string uniquely determined by every field; memoized.
    pub fn canonical_form(&self) -> &str {
        self.canonical.get_or_init(|| Arc::from(self.compute_canonical()))
    }

    fn compute_canonical(&self) -> String {
        let mut result = String::from(self.namespace.as_str());
        for part in &self.parts {
            if !result.is_empty() {
                result.push('.');
            }
            result.push_str(part.name());
            let args = &part.generic_arguments;
            if !args.is_empty() {
                let _ = write!(result, "`{}<", args.len());
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        result.push(',');
                    }
                    result.push_str(arg.canonical_form());
                }
                result.push('>');
            }
        }
        self.write_decorations(&mut result);
        result
    }

    fn write_decorations(&self, out: &mut String) {
        if self.nullable {
            out.push('?');
        }
        push_repeated(out, '*', self.pointer_depth);
        for &extra in &self.dimensions {
            out.push('[');
            push_repeated(out, ',', extra);
            out.push(']');
        }
        push_repeated(out, '*', self.array_pointer_depth);
        if self.by_ref {
            out.push('&');
        }
    }

    /// Bare type-parameter shape: one part, no namespace, no arguments.
    pub(crate) fn as_parameter_name(&self) -> Option<&str> {
        match self.parts.as_slice() {
            [part] if self.namespace.is_empty() && part.generic_arguments.is_empty() => {
                Some(part.name())
            }
            _ => None,
        }
    }

    /// Replace type-parameter mentions with their bound arguments.
    pub(crate) fn substitute(&self, bindings: &Bindings) -> Self {
        if bindings.is_empty() {
            return self.clone();
        }
        if let Some(bound) = self.as_parameter_name().and_then(|name| bindings.get(name)) {
            let mut result = bound.unlinked();
            result.dimensions.extend_from_slice(&self.dimensions);
            result.pointer_depth += self.pointer_depth;
            result.array_pointer_depth += self.array_pointer_depth;
            result.nullable |= self.nullable;
            result.by_ref |= self.by_ref;
            return result;
        }
        let mut result = self.unlinked();
        for part in &mut result.parts {
            for arg in &mut part.generic_arguments {
                *arg = arg.substitute(bindings);
            }
        }
        result
    }

    // ------------------------------------------------------------------
    // Decorations
    // ------------------------------------------------------------------

    /// Number of array ranks.
    pub fn array_dimensions(&self) -> usize {
        self.dimensions.len()
    }

    /// Grow (new ranks are single-dimensional) or truncate the rank list.
    pub fn set_array_dimensions(&mut self, count: usize) {
        self.dimensions.resize(count, 0);
        self.canonical.take();
    }

    /// Extra dimensions of rank `index`, `None` when out of range.
    pub fn dimension(&self, index: usize) -> Option<u32> {
        self.dimensions.get(index).copied()
    }

    /// Set the extra dimensions of rank `index`. Out-of-range indices are ignored.
    pub fn set_dimension(&mut self, index: usize, extra: u32) {
        if let Some(slot) = self.dimensions.get_mut(index) {
            *slot = extra;
            self.canonical.take();
        }
    }

    pub fn dimensions(&self) -> &[u32] {
        &self.dimensions
    }

    pub fn pointer_depth(&self) -> u32 {
        self.pointer_depth
    }

    pub fn set_pointer_depth(&mut self, depth: u32) {
        self.pointer_depth = depth;
        self.canonical.take();
    }

    /// Pointer levels written after the array ranks (`int[]*`).
    pub fn array_pointer_depth(&self) -> u32 {
        self.array_pointer_depth
    }

    pub fn set_array_pointer_depth(&mut self, depth: u32) {
        self.array_pointer_depth = depth;
        self.canonical.take();
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn set_nullable(&mut self, nullable: bool) {
        self.nullable = nullable;
        self.canonical.take();
    }

    pub fn is_by_ref(&self) -> bool {
        self.by_ref
    }

    pub fn set_by_ref(&mut self, by_ref: bool) {
        self.by_ref = by_ref;
        self.canonical.take();
    }

    // ------------------------------------------------------------------
    // Resolution link
    // ------------------------------------------------------------------

    /// The definition this reference last resolved to, if it is still alive.
    pub fn resolved_type(&self) -> Option<Arc<TypeDefinition>> {
        self.resolved.0.read().upgrade()
    }

    pub fn set_resolved_type(&self, ty: &Arc<TypeDefinition>) {
        *self.resolved.0.write() = Arc::downgrade(ty);
    }

    pub fn clear_resolved_type(&self) {
        *self.resolved.0.write() = Weak::new();
    }
}

fn push_repeated(out: &mut String, ch: char, count: u32) {
    for _ in 0..count {
        out.push(ch);
    }
}

/// Parts for a possibly nested type: `NS.Outer.Inner` → `[Outer, Inner]`.
fn nested_chain(namespace: &str, full_name: &str) -> Vec<TypePart> {
    let relative = if namespace.is_empty() {
        full_name
    } else {
        full_name
            .strip_prefix(namespace)
            .and_then(|rest| rest.strip_prefix('.'))
            .unwrap_or(full_name)
    };
    relative.split('.').map(TypePart::new).collect()
}

impl PartialEq for TypeReference {
    fn eq(&self, other: &Self) -> bool {
        self.canonical_form() == other.canonical_form()
    }
}

impl Eq for TypeReference {}

impl Hash for TypeReference {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical_form().hash(state);
    }
}

impl fmt::Debug for TypeReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeReference({})", self.canonical_form())
    }
}

/// Source-like rendering: `System.Collections.Generic.List<System.Int32>[]`.
impl fmt::Display for TypeReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::from(self.namespace.as_str());
        for part in &self.parts {
            if !out.is_empty() {
                out.push('.');
            }
            out.push_str(part.name());
            if !part.generic_arguments.is_empty() {
                out.push('<');
                for (i, arg) in part.generic_arguments.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    let _ = write!(out, "{arg}");
                }
                out.push('>');
            }
        }
        self.write_decorations(&mut out);
        f.write_str(&out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int() -> TypeReference {
        TypeReference::new("System.Int32")
    }

    #[test]
    fn test_split_full_name() {
        let r = TypeReference::new("System.Collections.Generic.List");
        assert_eq!(r.namespace(), "System.Collections.Generic");
        assert_eq!(r.name(), "List");
        assert_eq!(TypeReference::new("Widget").namespace(), "");
    }

    #[test]
    fn test_part_names_are_truncated_to_identifiers() {
        let r = TypeReference::new("System.Collections.Generic.List`1");
        assert_eq!(r.name(), "List");
        assert_eq!(TypePart::new("Foo<T>").name(), "Foo");
    }

    #[test]
    fn test_canonical_form_generic() {
        let r = TypeReference::generic("System.Collections.Generic.Dictionary", vec![
            TypeReference::new("System.String"),
            int(),
        ]);
        assert_eq!(
            r.canonical_form(),
            "System.Collections.Generic.Dictionary`2<System.String,System.Int32>"
        );
        assert_eq!(r.decorated_full_name(), "System.Collections.Generic.Dictionary`2");
        assert_eq!(r.full_name(), "System.Collections.Generic.Dictionary");
    }

    #[test]
    fn test_canonical_form_decorations() {
        let mut r = int().with_nullable(true).with_pointer_depth(1).with_array_dimensions(2);
        r.set_dimension(1, 2);
        r.set_array_pointer_depth(1);
        r.set_by_ref(true);
        assert_eq!(r.canonical_form(), "System.Int32?*[][,,]*&");
    }

    #[test]
    fn test_canonical_form_is_memoized_and_stable() {
        let r = TypeReference::generic("App.Box", vec![int()]);
        let first = r.canonical_form().as_ptr();
        let second = r.canonical_form().as_ptr();
        assert_eq!(first, second);
        assert_eq!(r.clone().canonical_form(), r.canonical_form());
    }

    #[test]
    fn test_mutation_refreshes_canonical_form() {
        let mut r = int();
        assert_eq!(r.canonical_form(), "System.Int32");
        r.set_array_dimensions(1);
        assert_eq!(r.canonical_form(), "System.Int32[]");
    }

    #[test]
    fn test_set_array_dimensions_preserves_and_truncates() {
        let mut r = int().with_array_dimensions(2);
        r.set_dimension(0, 1);
        r.set_array_dimensions(3);
        assert_eq!(r.dimensions(), &[1, 0, 0]);
        r.set_array_dimensions(1);
        assert_eq!(r.dimensions(), &[1]);
    }

    #[test]
    fn test_set_dimension_out_of_range_is_noop() {
        let mut r = int().with_array_dimensions(1);
        r.set_dimension(5, 3);
        assert_eq!(r.dimensions(), &[0]);
        assert_eq!(r.dimension(5), None);
        assert_eq!(r.dimension(0), Some(0));
    }

    #[test]
    fn test_element_type() {
        let r = int().with_array_dimensions(2);
        let element = r.element_type().unwrap();
        assert_eq!(element.canonical_form(), "System.Int32[]");
        assert!(int().element_type().is_none());
    }

    #[test]
    fn test_equality_via_canonical_form() {
        assert_eq!(int(), TypeReference::new("System.Int32"));
        assert_ne!(int(), int().with_nullable(true));
    }

    #[test]
    fn test_from_parts_requires_a_part() {
        assert_eq!(
            TypeReference::from_parts("App", Vec::new()).unwrap_err(),
            DomError::InvalidArgument("a type reference needs at least one part")
        );
        let nested = TypeReference::from_parts("App", vec![
            TypePart::with_arguments("Outer", vec![int()]),
            TypePart::new("Inner"),
        ])
        .unwrap();
        assert_eq!(nested.canonical_form(), "App.Outer`1<System.Int32>.Inner");
        assert_eq!(nested.all_generic_arguments().len(), 1);
        assert!(nested.generic_arguments().is_empty());
    }

    #[test]
    fn test_substitute_parameters() {
        let mut bindings = Bindings::default();
        bindings.insert(SmolStr::new("T"), int());

        let list_of_t = TypeReference::generic("System.Collections.Generic.IList", vec![
            TypeReference::new("T"),
        ]);
        assert_eq!(
            list_of_t.substitute(&bindings).canonical_form(),
            "System.Collections.Generic.IList`1<System.Int32>"
        );

        let t_array = TypeReference::new("T").with_array_dimensions(1);
        assert_eq!(t_array.substitute(&bindings).canonical_form(), "System.Int32[]");

        let unrelated = TypeReference::new("App.T");
        assert_eq!(unrelated.substitute(&bindings).canonical_form(), "App.T");
    }

    #[test]
    fn test_display() {
        let r = TypeReference::generic("System.Collections.Generic.List", vec![int()])
            .with_array_dimensions(1);
        assert_eq!(r.to_string(), "System.Collections.Generic.List<System.Int32>[]");
    }
}
