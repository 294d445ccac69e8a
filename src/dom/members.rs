//! Members of type definitions.

use std::sync::Arc;

use smol_str::SmolStr;

use super::modifiers::{MethodModifiers, Modifiers, ParameterModifiers, PropertyModifiers};
use super::type_ref::{Bindings, TypeReference};
use crate::base::Location;

/// A declared generic type parameter with its constraints.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypeParameter {
    name: SmolStr,
    constraints: Vec<TypeReference>,
}

impl TypeParameter {
    pub fn new(name: &str) -> Self {
        Self {
            name: SmolStr::new(name),
            constraints: Vec::new(),
        }
    }

    pub fn with_constraint(mut self, constraint: TypeReference) -> Self {
        self.constraints.push(constraint);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn constraints(&self) -> &[TypeReference] {
        &self.constraints
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Parameter {
    pub name: SmolStr,
    pub ty: TypeReference,
    pub modifiers: ParameterModifiers,
}

impl Parameter {
    pub fn new(name: &str, ty: TypeReference) -> Self {
        Self {
            name: SmolStr::new(name),
            ty,
            modifiers: ParameterModifiers::empty(),
        }
    }

    pub fn with_modifiers(mut self, modifiers: ParameterModifiers) -> Self {
        self.modifiers = modifiers;
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MemberKind {
    Field,
    Property,
    Method,
    Event,
}

/// A field, property, method or event of a type.
///
/// `return_type` is the field/property/event type or the method's return
/// type (`None` for constructors and `void`).
#[derive(Clone, Debug)]
pub struct Member {
    pub name: Arc<str>,
    pub kind: MemberKind,
    pub modifiers: Modifiers,
    pub return_type: Option<TypeReference>,
    pub parameters: Vec<Parameter>,
    pub type_parameters: Vec<TypeParameter>,
    pub method_modifiers: MethodModifiers,
    pub property_modifiers: PropertyModifiers,
    /// Full name of the declaring type; filled in when the type is built.
    pub declaring_type: Option<Arc<str>>,
    pub location: Location,
}

impl Member {
    fn new(kind: MemberKind, name: &str) -> Self {
        Self {
            name: Arc::from(name),
            kind,
            modifiers: Modifiers::empty(),
            return_type: None,
            parameters: Vec::new(),
            type_parameters: Vec::new(),
            method_modifiers: MethodModifiers::empty(),
            property_modifiers: PropertyModifiers::empty(),
            declaring_type: None,
            location: Location::EMPTY,
        }
    }

    pub fn field(name: &str, ty: TypeReference) -> Self {
        Self::new(MemberKind::Field, name).with_return_type(ty)
    }

    pub fn property(name: &str, ty: TypeReference) -> Self {
        let mut member = Self::new(MemberKind::Property, name).with_return_type(ty);
        member.property_modifiers = PropertyModifiers::HAS_GET | PropertyModifiers::HAS_SET;
        member
    }

    /// An indexer property (`this[...]`).
    pub fn indexer(name: &str, ty: TypeReference, parameters: Vec<Parameter>) -> Self {
        let mut member = Self::property(name, ty);
        member.property_modifiers |= PropertyModifiers::IS_INDEXER;
        member.parameters = parameters;
        member
    }

    pub fn method(name: &str) -> Self {
        Self::new(MemberKind::Method, name)
    }

    pub fn event(name: &str, ty: TypeReference) -> Self {
        Self::new(MemberKind::Event, name).with_return_type(ty)
    }

    pub fn with_return_type(mut self, ty: TypeReference) -> Self {
        self.return_type = Some(ty);
        self
    }

    pub fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    pub fn with_parameter(mut self, parameter: Parameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn with_type_parameter(mut self, parameter: TypeParameter) -> Self {
        self.type_parameters.push(parameter);
        self
    }

    /// Mark the first parameter as the `this` receiver.
    pub fn as_extension(mut self) -> Self {
        self.method_modifiers |= MethodModifiers::EXTENSION;
        self
    }

    pub fn at(mut self, location: Location) -> Self {
        self.location = location;
        self
    }

    /// An unbound extension method: flagged, not yet bound to a receiver,
    /// and still carrying its receiver parameter.
    pub fn is_extension(&self) -> bool {
        self.kind == MemberKind::Method
            && self.method_modifiers.contains(MethodModifiers::EXTENSION)
            && !self.method_modifiers.contains(MethodModifiers::WAS_EXTENDED)
            && !self.parameters.is_empty()
    }

    pub fn is_indexer(&self) -> bool {
        self.property_modifiers.contains(PropertyModifiers::IS_INDEXER)
    }

    pub fn is_static(&self) -> bool {
        self.modifiers.contains(Modifiers::STATIC)
    }

    /// This member with type-parameter mentions in its signature replaced.
    pub(crate) fn substitute(&self, bindings: &Bindings) -> Self {
        let mut member = self.clone();
        member.return_type = self.return_type.as_ref().map(|ty| ty.substitute(bindings));
        for parameter in &mut member.parameters {
            parameter.ty = parameter.ty.substitute(bindings);
        }
        member
    }
}
