//! Type definitions - resolved semantic entities.
//!
//! [`TypeDefinition`] is a sum type over the four ways a type can exist:
//!
//! - [`TypeDefinition::Plain`] - one physical declaration
//! - [`TypeDefinition::Compound`] - several `partial` fragments merged
//! - [`TypeDefinition::Instantiation`] - an open generic bound to arguments
//! - [`TypeDefinition::Parameter`] - a generic parameter used as a type
//!
//! Every variant carries a [`TypeBody`], so queries are answered the same
//! way regardless of variant. Variant-specific work (merging fragments,
//! substituting arguments) happens once, at construction.
//!
//! Links between types are never owning: a nested type names its
//! declaring type by full name and the database looks it up on demand.

use std::fmt::Write as _;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use indexmap::IndexMap;
use rustc_hash::FxHashSet;
use smol_str::SmolStr;

use super::members::{Member, MemberKind, TypeParameter};
use super::modifiers::{ClassKind, Modifiers};
use super::names_equal;
use super::type_ref::{Bindings, TypeReference, split_full_name};
use crate::base::{FileId, Location};

// ============================================================================
// TYPE BODY
// ============================================================================

/// The queryable shape shared by every variant.
#[derive(Clone, Debug)]
pub struct TypeBody {
    pub(crate) namespace: SmolStr,
    pub(crate) name: SmolStr,
    pub(crate) full_name: Arc<str>,
    pub(crate) class_kind: ClassKind,
    pub(crate) modifiers: Modifiers,
    pub(crate) type_parameters: Vec<TypeParameter>,
    pub(crate) base_type: Option<TypeReference>,
    pub(crate) interfaces: Vec<TypeReference>,
    pub(crate) members: Vec<Member>,
    pub(crate) nested_types: Vec<Arc<TypeDefinition>>,
    /// Full name of the enclosing type.
    pub(crate) declaring_type: Option<Arc<str>>,
    /// Set only on synthesized array types.
    pub(crate) element_type: Option<TypeReference>,
    pub(crate) file: Option<FileId>,
    pub(crate) location: Location,
}

impl TypeBody {
    pub(crate) fn new(namespace: &str, name: &str, full_name: &str, class_kind: ClassKind) -> Self {
        Self {
            namespace: SmolStr::new(namespace),
            name: SmolStr::new(name),
            full_name: Arc::from(full_name),
            class_kind,
            modifiers: Modifiers::empty(),
            type_parameters: Vec::new(),
            base_type: None,
            interfaces: Vec::new(),
            members: Vec::new(),
            nested_types: Vec::new(),
            declaring_type: None,
            element_type: None,
            file: None,
            location: Location::EMPTY,
        }
    }

    /// Base type and interfaces with type-parameter mentions replaced.
    fn substitute(&self, bindings: &Bindings) -> Self {
        let mut body = self.clone();
        body.type_parameters.clear();
        body.base_type = self.base_type.as_ref().map(|ty| ty.substitute(bindings));
        body.interfaces = self.interfaces.iter().map(|ty| ty.substitute(bindings)).collect();
        body.members = self.members.iter().map(|m| m.substitute(bindings)).collect();
        body
    }
}

// ============================================================================
// TYPE DEFINITION
// ============================================================================

#[derive(Debug)]
pub enum TypeDefinition {
    Plain(TypeBody),
    Compound(CompoundType),
    Instantiation(GenericInstantiation),
    Parameter(ParameterType),
}

impl TypeDefinition {
    pub fn body(&self) -> &TypeBody {
        match self {
            TypeDefinition::Plain(body) => body,
            TypeDefinition::Compound(compound) => &compound.body,
            TypeDefinition::Instantiation(inst) => &inst.body,
            TypeDefinition::Parameter(param) => &param.body,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.body().namespace
    }

    pub fn name(&self) -> &str {
        &self.body().name
    }

    /// `Namespace.Outer.Name`; for instantiations, the open type's full name.
    pub fn full_name(&self) -> &str {
        &self.body().full_name
    }

    pub(crate) fn full_name_arc(&self) -> &Arc<str> {
        &self.body().full_name
    }

    /// Number of generic parameters of the (open) type.
    pub fn arity(&self) -> usize {
        match self {
            TypeDefinition::Instantiation(inst) => inst.open.arity(),
            _ => self.body().type_parameters.len(),
        }
    }

    /// Full name with a `` `N `` arity suffix; the identity used by
    /// inheritance walks and the subclass index.
    pub fn decorated_full_name(&self) -> String {
        let mut result = self.full_name().to_string();
        let arity = self.arity();
        if arity > 0 {
            let _ = write!(result, "`{arity}");
        }
        result
    }

    pub fn class_kind(&self) -> ClassKind {
        self.body().class_kind
    }

    pub fn modifiers(&self) -> Modifiers {
        self.body().modifiers
    }

    /// Declared generic parameters; empty for instantiations (they are bound).
    pub fn type_parameters(&self) -> &[TypeParameter] {
        &self.body().type_parameters
    }

    pub fn base_type(&self) -> Option<&TypeReference> {
        self.body().base_type.as_ref()
    }

    pub fn interfaces(&self) -> &[TypeReference] {
        &self.body().interfaces
    }

    /// Base type followed by implemented interfaces.
    pub fn base_types(&self) -> impl Iterator<Item = &TypeReference> {
        self.body().base_type.iter().chain(self.body().interfaces.iter())
    }

    pub fn members(&self) -> &[Member] {
        &self.body().members
    }

    pub fn members_of_kind(&self, kind: MemberKind) -> impl Iterator<Item = &Member> {
        self.members().iter().filter(move |m| m.kind == kind)
    }

    pub fn fields(&self) -> impl Iterator<Item = &Member> {
        self.members_of_kind(MemberKind::Field)
    }

    pub fn properties(&self) -> impl Iterator<Item = &Member> {
        self.members_of_kind(MemberKind::Property)
    }

    pub fn methods(&self) -> impl Iterator<Item = &Member> {
        self.members_of_kind(MemberKind::Method)
    }

    pub fn events(&self) -> impl Iterator<Item = &Member> {
        self.members_of_kind(MemberKind::Event)
    }

    pub fn nested_types(&self) -> &[Arc<TypeDefinition>] {
        &self.body().nested_types
    }

    /// Full name of the enclosing type, if this type is nested.
    pub fn declaring_type_name(&self) -> Option<&str> {
        self.body().declaring_type.as_deref()
    }

    /// Element reference of a synthesized array type.
    pub fn element_type(&self) -> Option<&TypeReference> {
        self.body().element_type.as_ref()
    }

    /// File of record (the main part for compound types).
    pub fn file(&self) -> Option<FileId> {
        match self {
            TypeDefinition::Compound(compound) => compound.main_part().file(),
            _ => self.body().file,
        }
    }

    /// Location of record (the main part for compound types).
    pub fn location(&self) -> Location {
        match self {
            TypeDefinition::Compound(compound) => compound.main_part().location(),
            _ => self.body().location,
        }
    }

    pub fn is_instantiation(&self) -> bool {
        matches!(self, TypeDefinition::Instantiation(_))
    }

    pub fn as_instantiation(&self) -> Option<&GenericInstantiation> {
        match self {
            TypeDefinition::Instantiation(inst) => Some(inst),
            _ => None,
        }
    }

    pub fn as_compound(&self) -> Option<&CompoundType> {
        match self {
            TypeDefinition::Compound(compound) => Some(compound),
            _ => None,
        }
    }

    pub fn as_parameter(&self) -> Option<&ParameterType> {
        match self {
            TypeDefinition::Parameter(param) => Some(param),
            _ => None,
        }
    }

    /// A directly nested type by simple name and arity.
    pub fn find_nested(
        &self,
        name: &str,
        arity: usize,
        case_sensitive: bool,
    ) -> Option<&Arc<TypeDefinition>> {
        self.nested_types()
            .iter()
            .find(|inner| inner.arity() == arity && names_equal(inner.name(), name, case_sensitive))
    }
}

/// One logical type from its fragments: the fragment itself when there is
/// one, a [`CompoundType`] otherwise.
pub(crate) fn merge_fragments(mut fragments: Vec<Arc<TypeDefinition>>) -> Option<Arc<TypeDefinition>> {
    match fragments.len() {
        0 => None,
        1 => fragments.pop(),
        _ => Some(Arc::new(TypeDefinition::Compound(CompoundType::merge(fragments)))),
    }
}

// ============================================================================
// COMPOUND
// ============================================================================

/// Union of the `partial` fragments of one logical type.
#[derive(Debug)]
pub struct CompoundType {
    body: TypeBody,
    parts: Vec<Arc<TypeDefinition>>,
    main_part: AtomicUsize,
}

impl CompoundType {
    /// Merge fragments in the given order; the first is the main part.
    fn merge(parts: Vec<Arc<TypeDefinition>>) -> Self {
        let first = parts[0].body();
        let mut body = TypeBody::new(&first.namespace, &first.name, &first.full_name, first.class_kind);
        body.declaring_type = first.declaring_type.clone();
        body.file = first.file;
        body.location = first.location;

        let mut seen_interfaces = FxHashSet::default();
        let mut nested: IndexMap<(Arc<str>, usize), Vec<Arc<TypeDefinition>>> = IndexMap::new();
        for part in &parts {
            let part_body = part.body();
            body.modifiers |= part_body.modifiers;
            if body.type_parameters.is_empty() {
                body.type_parameters = part_body.type_parameters.clone();
            }
            if body.base_type.is_none() {
                body.base_type = part_body.base_type.clone();
            }
            for iface in &part_body.interfaces {
                if seen_interfaces.insert(iface.canonical_form().to_string()) {
                    body.interfaces.push(iface.clone());
                }
            }
            body.members.extend(part_body.members.iter().cloned());
            for inner in &part_body.nested_types {
                nested
                    .entry((inner.full_name_arc().clone(), inner.arity()))
                    .or_default()
                    .push(inner.clone());
            }
        }
        body.nested_types = nested.into_values().filter_map(merge_fragments).collect();

        Self {
            body,
            parts,
            main_part: AtomicUsize::new(0),
        }
    }

    pub fn parts(&self) -> &[Arc<TypeDefinition>] {
        &self.parts
    }

    /// The fragment whose file and location are reported for the whole type.
    pub fn main_part(&self) -> &Arc<TypeDefinition> {
        let idx = self.main_part.load(Ordering::Acquire);
        &self.parts[idx.min(self.parts.len() - 1)]
    }

    /// Make the fragment declared at `file`/`location` the main part.
    /// Returns false if no fragment matches.
    pub fn set_main_part(&self, file: Option<FileId>, location: Location) -> bool {
        match self
            .parts
            .iter()
            .position(|part| part.file() == file && part.location() == location)
        {
            Some(idx) => {
                self.main_part.store(idx, Ordering::Release);
                true
            }
            None => false,
        }
    }
}

// ============================================================================
// GENERIC INSTANTIATION
// ============================================================================

/// An open generic type bound to concrete arguments.
///
/// Identity is the cache key `{open full name}[{arg},...]`; the database
/// hands out one shared instance per key.
#[derive(Debug)]
pub struct GenericInstantiation {
    open: Arc<TypeDefinition>,
    arguments: Vec<TypeReference>,
    key: Arc<str>,
    body: TypeBody,
}

impl GenericInstantiation {
    pub(crate) fn new(open: Arc<TypeDefinition>, arguments: Vec<TypeReference>) -> Self {
        let bindings: Bindings = open
            .type_parameters()
            .iter()
            .zip(arguments.iter())
            .map(|(tp, arg)| (SmolStr::new(tp.name()), arg.clone()))
            .collect();
        let body = open.body().substitute(&bindings);
        let key = Arc::from(Self::key_for(open.full_name(), &arguments));
        Self {
            open,
            arguments,
            key,
            body,
        }
    }

    /// Cache key for instantiating `full_name` with `arguments`.
    pub fn key_for(full_name: &str, arguments: &[TypeReference]) -> String {
        let mut key = String::with_capacity(full_name.len() + 2);
        key.push_str(full_name);
        key.push('[');
        for (i, arg) in arguments.iter().enumerate() {
            if i > 0 {
                key.push(',');
            }
            key.push_str(arg.canonical_form());
        }
        key.push(']');
        key
    }

    pub fn open_type(&self) -> &Arc<TypeDefinition> {
        &self.open
    }

    pub fn arguments(&self) -> &[TypeReference] {
        &self.arguments
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

// ============================================================================
// PARAMETER AS TYPE
// ============================================================================

/// A generic parameter of an enclosing type, usable where a type is expected.
///
/// Its constraints act as its interfaces; with no explicit base it sits
/// directly under the root object type.
#[derive(Debug)]
pub struct ParameterType {
    owner: Arc<TypeDefinition>,
    parameter: TypeParameter,
    body: TypeBody,
}

impl ParameterType {
    pub(crate) fn new(owner: Arc<TypeDefinition>, parameter: TypeParameter) -> Self {
        let mut body = TypeBody::new("", parameter.name(), parameter.name(), ClassKind::Class);
        body.interfaces = parameter.constraints().to_vec();
        body.declaring_type = Some(owner.full_name_arc().clone());
        body.file = owner.file();
        body.location = owner.location();
        Self {
            owner,
            parameter,
            body,
        }
    }

    /// Cache key; shares the owner's `{full name}[` prefix so resetting the
    /// owner evicts its parameter types too.
    pub fn key_for(owner_full_name: &str, parameter: &str) -> String {
        format!("{owner_full_name}[!{parameter}]")
    }

    pub fn owner(&self) -> &Arc<TypeDefinition> {
        &self.owner
    }

    pub fn parameter(&self) -> &TypeParameter {
        &self.parameter
    }
}

// ============================================================================
// BUILDER
// ============================================================================

/// Builds plain definitions on behalf of the parser collaborator.
#[derive(Clone, Debug)]
pub struct TypeBuilder {
    namespace: SmolStr,
    name: SmolStr,
    class_kind: ClassKind,
    modifiers: Modifiers,
    type_parameters: Vec<TypeParameter>,
    base_type: Option<TypeReference>,
    interfaces: Vec<TypeReference>,
    members: Vec<Member>,
    nested: Vec<TypeBuilder>,
    location: Location,
}

impl TypeBuilder {
    /// A type named by full name; nested builders take their namespace
    /// from the enclosing type instead.
    pub fn new(full_name: &str, class_kind: ClassKind) -> Self {
        let (namespace, name) = split_full_name(full_name);
        Self {
            namespace: SmolStr::new(namespace),
            name: SmolStr::new(name),
            class_kind,
            modifiers: Modifiers::PUBLIC,
            type_parameters: Vec::new(),
            base_type: None,
            interfaces: Vec::new(),
            members: Vec::new(),
            nested: Vec::new(),
            location: Location::EMPTY,
        }
    }

    pub fn class(full_name: &str) -> Self {
        Self::new(full_name, ClassKind::Class)
    }

    pub fn interface(full_name: &str) -> Self {
        Self::new(full_name, ClassKind::Interface)
    }

    pub fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    pub fn with_type_parameter(mut self, parameter: TypeParameter) -> Self {
        self.type_parameters.push(parameter);
        self
    }

    pub fn with_base_type(mut self, base: TypeReference) -> Self {
        self.base_type = Some(base);
        self
    }

    pub fn with_interface(mut self, iface: TypeReference) -> Self {
        self.interfaces.push(iface);
        self
    }

    pub fn with_member(mut self, member: Member) -> Self {
        self.members.push(member);
        self
    }

    pub fn with_nested(mut self, nested: TypeBuilder) -> Self {
        self.nested.push(nested);
        self
    }

    pub fn at(mut self, location: Location) -> Self {
        self.location = location;
        self
    }

    pub fn build(self, file: Option<FileId>) -> Arc<TypeDefinition> {
        self.build_in(file, None, None)
    }

    fn build_in(
        self,
        file: Option<FileId>,
        declaring: Option<&Arc<str>>,
        outer_namespace: Option<&SmolStr>,
    ) -> Arc<TypeDefinition> {
        let namespace = outer_namespace.cloned().unwrap_or(self.namespace);
        let full_name: Arc<str> = match declaring {
            Some(outer) => Arc::from(format!("{outer}.{}", self.name)),
            None if namespace.is_empty() => Arc::from(self.name.as_str()),
            None => Arc::from(format!("{namespace}.{}", self.name)),
        };

        let mut body = TypeBody::new(&namespace, &self.name, &full_name, self.class_kind);
        body.modifiers = self.modifiers;
        body.type_parameters = self.type_parameters;
        body.base_type = self.base_type;
        body.interfaces = self.interfaces;
        body.declaring_type = declaring.cloned();
        body.file = file;
        body.location = self.location;
        body.members = self
            .members
            .into_iter()
            .map(|mut member| {
                member.declaring_type = Some(full_name.clone());
                member
            })
            .collect();
        body.nested_types = self
            .nested
            .into_iter()
            .map(|inner| inner.build_in(file, Some(&full_name), Some(&namespace)))
            .collect();

        Arc::new(TypeDefinition::Plain(body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::members::Parameter;

    fn partial(file: u32, member: &str) -> Arc<TypeDefinition> {
        TypeBuilder::class("App.Widget")
            .with_modifiers(Modifiers::PUBLIC | Modifiers::PARTIAL)
            .with_interface(TypeReference::new("System.IDisposable"))
            .with_member(Member::field(member, TypeReference::new("System.Int32")))
            .at(Location::new(file, 1))
            .build(Some(FileId::new(file)))
    }

    #[test]
    fn test_builder_nested_names() {
        let outer = TypeBuilder::class("App.Outer")
            .with_nested(TypeBuilder::class("Inner").with_nested(TypeBuilder::class("Deep")))
            .build(Some(FileId::new(0)));

        let inner = &outer.nested_types()[0];
        assert_eq!(inner.full_name(), "App.Outer.Inner");
        assert_eq!(inner.namespace(), "App");
        assert_eq!(inner.declaring_type_name(), Some("App.Outer"));
        assert_eq!(inner.nested_types()[0].full_name(), "App.Outer.Inner.Deep");
        assert_eq!(inner.file(), Some(FileId::new(0)));
    }

    #[test]
    fn test_members_know_declaring_type() {
        let ty = TypeBuilder::class("App.Widget")
            .with_member(Member::method("Run"))
            .build(None);
        assert_eq!(ty.methods().next().unwrap().declaring_type.as_deref(), Some("App.Widget"));
    }

    #[test]
    fn test_compound_merges_fragments() {
        let merged = merge_fragments(vec![partial(1, "a"), partial(2, "b")]).unwrap();
        let compound = merged.as_compound().unwrap();

        assert_eq!(compound.parts().len(), 2);
        assert_eq!(merged.fields().count(), 2);
        assert_eq!(merged.interfaces().len(), 1);
        assert_eq!(merged.file(), Some(FileId::new(1)));
    }

    #[test]
    fn test_compound_main_part() {
        let merged = merge_fragments(vec![partial(1, "a"), partial(2, "b")]).unwrap();
        let compound = merged.as_compound().unwrap();

        assert!(compound.set_main_part(Some(FileId::new(2)), Location::new(2, 1)));
        assert_eq!(merged.file(), Some(FileId::new(2)));
        assert_eq!(merged.location(), Location::new(2, 1));
        assert!(!compound.set_main_part(Some(FileId::new(9)), Location::EMPTY));
    }

    #[test]
    fn test_single_fragment_stays_plain() {
        let merged = merge_fragments(vec![partial(1, "a")]).unwrap();
        assert!(matches!(&*merged, TypeDefinition::Plain(_)));
        assert!(merge_fragments(Vec::new()).is_none());
    }

    #[test]
    fn test_instantiation_substitutes_signatures() {
        let open = TypeBuilder::class("App.Box")
            .with_type_parameter(TypeParameter::new("T"))
            .with_interface(TypeReference::generic("System.IEquatable", vec![TypeReference::new("T")]))
            .with_member(
                Member::method("Put").with_parameter(Parameter::new("value", TypeReference::new("T"))),
            )
            .build(None);
        let inst = GenericInstantiation::new(open.clone(), vec![TypeReference::new("System.String")]);

        assert_eq!(inst.key(), "App.Box[System.String]");
        assert!(inst.body.type_parameters.is_empty());
        assert_eq!(inst.body.interfaces[0].canonical_form(), "System.IEquatable`1<System.String>");
        assert_eq!(inst.body.members[0].parameters[0].ty.canonical_form(), "System.String");

        let def = TypeDefinition::Instantiation(inst);
        assert_eq!(def.full_name(), "App.Box");
        assert_eq!(def.arity(), 1);
        assert_eq!(def.decorated_full_name(), "App.Box`1");
    }

    #[test]
    fn test_parameter_type_shape() {
        let owner = TypeBuilder::class("App.Box")
            .with_type_parameter(TypeParameter::new("T").with_constraint(TypeReference::new("System.IComparable")))
            .build(None);
        let param = ParameterType::new(owner.clone(), owner.type_parameters()[0].clone());

        assert_eq!(param.body.full_name.as_ref(), "T");
        assert_eq!(param.body.interfaces.len(), 1);
        assert_eq!(param.body.declaring_type.as_deref(), Some("App.Box"));
        assert_eq!(ParameterType::key_for("App.Box", "T"), "App.Box[!T]");
    }
}
