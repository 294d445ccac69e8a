//! Synthesized types and members: array pseudo-types and bound extension
//! methods.

use std::sync::Arc;

use rustc_hash::FxHashSet;
use smol_str::SmolStr;

use super::SemanticDatabase;
use crate::dom::well_known::{ARRAY, GENERIC_LIST, INDEXER_NAME, INT32};
use crate::dom::{
    Bindings, ClassKind, DomError, Member, MemberKind, MethodModifiers, Modifiers, Parameter,
    Result, TypeBody, TypeDefinition, TypeReference,
};

impl SemanticDatabase {
    /// A class standing in for `element[]`.
    ///
    /// It derives from the universal array root, implements the generic
    /// list of `element` and has one public indexer returning `element`.
    /// The result is not cached; its file is the element type's file.
    pub fn array_type(&self, element: &TypeReference) -> Arc<TypeDefinition> {
        let full_name = format!("{element}[]");
        let namespace = element.namespace();
        let name = full_name
            .strip_prefix(namespace)
            .and_then(|rest| rest.strip_prefix('.'))
            .unwrap_or(&full_name);

        let mut body = TypeBody::new(namespace, name, &full_name, ClassKind::Class);
        body.modifiers = Modifiers::PUBLIC;
        body.base_type = Some(TypeReference::new(ARRAY));
        body.interfaces
            .push(TypeReference::generic(GENERIC_LIST, vec![element.clone()]));

        let mut indexer = Member::indexer(INDEXER_NAME, element.clone(), vec![Parameter::new(
            "index",
            TypeReference::new(INT32),
        )])
        .with_modifiers(Modifiers::PUBLIC);
        indexer.declaring_type = Some(body.full_name.clone());
        body.members.push(indexer);

        body.element_type = Some(element.clone());
        body.file = self.get_type_by_reference(element).and_then(|ty| ty.file());
        Arc::new(TypeDefinition::Plain(body))
    }

    /// Bind `original` as an extension method of `extension_type`.
    pub fn extension_method_binding(
        &self,
        extension_type: &Arc<TypeDefinition>,
        original: &Member,
        generic_arguments: &[TypeReference],
        method_arguments: &[TypeReference],
    ) -> Result<ExtensionMethod> {
        ExtensionMethod::bind(extension_type, original, generic_arguments, method_arguments)
    }

    /// Every extension method declared in `candidates` that applies to
    /// `receiver`, bound to it.
    ///
    /// A method applies when its receiver parameter is one of the method's
    /// own type parameters, or resolves to a type in the receiver's
    /// inheritance tree.
    pub fn extension_methods_for(
        &self,
        receiver: &Arc<TypeDefinition>,
        candidates: &[Arc<TypeDefinition>],
    ) -> Vec<ExtensionMethod> {
        let ancestors: FxHashSet<String> = self
            .inheritance_tree(receiver)
            .map(|ty| ty.decorated_full_name())
            .collect();

        let mut result = Vec::new();
        for candidate in candidates {
            for method in candidate.methods().filter(|m| m.is_extension()) {
                let Some(this) = method.parameters.first() else {
                    continue;
                };
                let generic_receiver = this
                    .ty
                    .as_parameter_name()
                    .is_some_and(|name| method.type_parameters.iter().any(|tp| tp.name() == name));
                let applies = generic_receiver
                    || self
                        .get_type_by_reference(&this.ty)
                        .is_some_and(|ty| ancestors.contains(&ty.decorated_full_name()));
                if !applies {
                    continue;
                }
                if let Ok(bound) = ExtensionMethod::bind(receiver, method, &[], &[]) {
                    result.push(bound);
                }
            }
        }
        result
    }
}

/// An extension method viewed as a member of the type it extends.
///
/// The receiver parameter is gone, method type parameters bound from the
/// receiver and arguments are substituted, and the declaring type is the
/// extended type.
#[derive(Clone, Debug)]
pub struct ExtensionMethod {
    method: Member,
    original: Member,
    extension_type: Arc<TypeDefinition>,
}

impl ExtensionMethod {
    pub fn bind(
        extension_type: &Arc<TypeDefinition>,
        original: &Member,
        generic_arguments: &[TypeReference],
        method_arguments: &[TypeReference],
    ) -> Result<Self> {
        if original.kind != MemberKind::Method || original.parameters.is_empty() {
            return Err(DomError::NotAnExtensionMethod(original.name.to_string()));
        }

        let mut arguments = Vec::with_capacity(method_arguments.len() + 1);
        arguments.push(receiver_argument(extension_type));
        arguments.extend_from_slice(method_arguments);

        let bindings = bind_method_generics(original, generic_arguments, &arguments);
        let mut method = original.substitute(&bindings);
        method.parameters.remove(0);
        method
            .type_parameters
            .retain(|tp| !bindings.contains_key(tp.name()));
        method.method_modifiers = original.method_modifiers | MethodModifiers::WAS_EXTENDED;
        method.declaring_type = Some(extension_type.full_name_arc().clone());

        Ok(Self {
            method,
            original: original.clone(),
            extension_type: extension_type.clone(),
        })
    }

    /// The bound member as seen on the extended type.
    pub fn member(&self) -> &Member {
        &self.method
    }

    pub fn original(&self) -> &Member {
        &self.original
    }

    pub fn extension_type(&self) -> &Arc<TypeDefinition> {
        &self.extension_type
    }

    pub fn name(&self) -> &str {
        &self.method.name
    }
}

/// The argument standing for the receiver: arrays pass `element[]` (the
/// element read off the synthesized list interface), everything else a
/// reference to the type itself.
fn receiver_argument(ty: &Arc<TypeDefinition>) -> TypeReference {
    if ty.element_type().is_some() || ty.full_name().ends_with("[]") {
        let element = ty
            .base_types()
            .find(|base| base.full_name() == GENERIC_LIST)
            .and_then(|list| list.generic_arguments().first());
        if let Some(element) = element {
            return element.array_of();
        }
    }
    TypeReference::for_type(ty)
}

/// Bind the method's type parameters: explicit arguments first, then
/// positional inference from argument types.
fn bind_method_generics(method: &Member, explicit: &[TypeReference], arguments: &[TypeReference]) -> Bindings {
    let mut bindings = Bindings::default();
    for (tp, arg) in method.type_parameters.iter().zip(explicit) {
        bindings.insert(SmolStr::new(tp.name()), arg.clone());
    }
    if method.type_parameters.is_empty() {
        return bindings;
    }
    let open: FxHashSet<&str> = method.type_parameters.iter().map(|tp| tp.name()).collect();
    for (parameter, arg) in method.parameters.iter().zip(arguments) {
        infer(&parameter.ty, arg, &open, &mut bindings);
    }
    bindings
}

fn infer(parameter: &TypeReference, arg: &TypeReference, open: &FxHashSet<&str>, bindings: &mut Bindings) {
    if let Some(name) = parameter.as_parameter_name().filter(|name| open.contains(name)) {
        if bindings.contains_key(name) {
            return;
        }
        // `T[]` against `int[]` binds `T` to `int`
        let mut bound = arg.clone();
        for _ in 0..parameter.array_dimensions() {
            match bound.element_type() {
                Some(element) => bound = element,
                None => return,
            }
        }
        bindings.insert(SmolStr::new(name), bound);
        return;
    }

    let params = parameter.generic_arguments();
    if params.is_empty() {
        return;
    }
    let args = arg.generic_arguments();
    if args.len() == params.len() {
        for (p, a) in params.iter().zip(args) {
            infer(p, a, open, bindings);
        }
    } else if params.len() == 1 {
        // arrays implement the single-argument collection interfaces
        if let Some(element) = arg.element_type() {
            infer(&params[0], &element, open, bindings);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::FileId;
    use crate::dom::{CompilationUnit, MemberKind, TypeBuilder, TypeParameter};

    fn db(builders: Vec<TypeBuilder>) -> SemanticDatabase {
        let db = SemanticDatabase::new("app");
        let mut unit = CompilationUnit::new(FileId::new(4), "lib.cs");
        for builder in builders {
            unit.add_type(builder);
        }
        db.update_from_unit(unit);
        db
    }

    fn enumerable_of(arg: TypeReference) -> TypeReference {
        TypeReference::generic("System.Collections.Generic.IEnumerable", vec![arg])
    }

    /// `static T First<T>(this IEnumerable<T> source)`
    fn first_method() -> Member {
        Member::method("First")
            .with_modifiers(Modifiers::PUBLIC | Modifiers::STATIC)
            .with_type_parameter(TypeParameter::new("T"))
            .with_parameter(Parameter::new("source", enumerable_of(TypeReference::new("T"))))
            .with_return_type(TypeReference::new("T"))
            .as_extension()
    }

    #[test]
    fn test_array_type_shape() {
        let db = db(vec![TypeBuilder::class("App.Widget")]);
        let array = db.array_type(&TypeReference::new("App.Widget"));

        assert_eq!(array.full_name(), "App.Widget[]");
        assert_eq!(array.name(), "Widget[]");
        assert_eq!(array.base_type().map(|b| b.full_name()), Some(ARRAY.to_string()));
        assert_eq!(array.file(), Some(FileId::new(4)));

        let indexers: Vec<_> = array.members().iter().filter(|m| m.is_indexer()).collect();
        assert_eq!(indexers.len(), 1);
        assert_eq!(indexers[0].kind, MemberKind::Property);
        assert_eq!(indexers[0].return_type.as_ref().map(|t| t.full_name()), Some("App.Widget".to_string()));
        assert_eq!(
            array.interfaces()[0].canonical_form(),
            "System.Collections.Generic.IList`1<App.Widget>"
        );
    }

    #[test]
    fn test_array_reference_resolves_to_array_type() {
        let db = db(vec![TypeBuilder::class("App.Widget")]);
        let reference = TypeReference::new("App.Widget").with_array_dimensions(1);
        let array = db.get_type_by_reference(&reference).unwrap();
        assert_eq!(array.element_type().map(|e| e.full_name()), Some("App.Widget".to_string()));
        assert_eq!(TypeReference::for_type(&array).canonical_form(), "App.Widget[]");
    }

    #[test]
    fn test_bind_requires_receiver_parameter() {
        let ty = TypeBuilder::class("App.Widget").build(None);
        let err = ExtensionMethod::bind(&ty, &Member::method("Nothing"), &[], &[]).unwrap_err();
        assert_eq!(err, DomError::NotAnExtensionMethod("Nothing".into()));
    }

    #[test]
    fn test_bind_drops_receiver_and_marks_extended() {
        let ty = TypeBuilder::class("App.Widget").build(None);
        let twice = Member::method("Twice")
            .with_parameter(Parameter::new("self", TypeReference::new("App.Widget")))
            .with_parameter(Parameter::new("count", TypeReference::new(INT32)))
            .as_extension();

        let bound = ExtensionMethod::bind(&ty, &twice, &[], &[]).unwrap();
        let member = bound.member();
        assert_eq!(member.parameters.len(), 1);
        assert_eq!(member.parameters[0].name.as_str(), "count");
        assert_eq!(member.declaring_type.as_deref(), Some("App.Widget"));
        assert_eq!(
            member.method_modifiers,
            MethodModifiers::EXTENSION | MethodModifiers::WAS_EXTENDED
        );
        assert!(!member.is_extension());
        assert!(bound.original().is_extension());
    }

    #[test]
    fn test_bind_infers_from_instantiated_receiver() {
        let db = db(vec![
            TypeBuilder::interface("System.Collections.Generic.IEnumerable").with_type_parameter(TypeParameter::new("T")),
        ]);
        let open = db.get_type("System.Collections.Generic.IEnumerable`1", &[], false, true).unwrap();
        let receiver = db.instantiate(&open, &[TypeReference::new("System.String")]);

        let bound = db.extension_method_binding(&receiver, &first_method(), &[], &[]).unwrap();
        assert_eq!(bound.member().return_type.as_ref().map(|t| t.full_name()), Some("System.String".to_string()));
        assert!(bound.member().type_parameters.is_empty());
    }

    #[test]
    fn test_bind_infers_from_array_receiver() {
        let db = db(vec![TypeBuilder::class("App.Widget")]);
        let array = db.array_type(&TypeReference::new("App.Widget"));

        let bound = ExtensionMethod::bind(&array, &first_method(), &[], &[]).unwrap();
        assert_eq!(bound.member().return_type.as_ref().map(|t| t.full_name()), Some("App.Widget".to_string()));
    }

    #[test]
    fn test_explicit_generic_arguments_win() {
        let ty = TypeBuilder::class("App.Widget").build(None);
        let bound = ExtensionMethod::bind(&ty, &first_method(), &[TypeReference::new("App.Gadget")], &[]).unwrap();
        assert_eq!(bound.member().return_type.as_ref().map(|t| t.full_name()), Some("App.Gadget".to_string()));
    }

    #[test]
    fn test_extension_methods_for_receiver() {
        let db = db(vec![
            TypeBuilder::class("App.Shape"),
            TypeBuilder::class("App.Circle").with_base_type(TypeReference::new("App.Shape")),
            TypeBuilder::class("App.Other"),
            TypeBuilder::class("App.ShapeExtensions")
                .with_member(
                    Member::method("Area")
                        .with_parameter(Parameter::new("shape", TypeReference::new("App.Shape")))
                        .as_extension(),
                )
                .with_member(
                    Member::method("Describe")
                        .with_type_parameter(TypeParameter::new("T"))
                        .with_parameter(Parameter::new("value", TypeReference::new("T")))
                        .as_extension(),
                )
                .with_member(Member::method("Helper")),
        ]);
        let extensions = vec![db.get_type("App.ShapeExtensions", &[], false, true).unwrap()];

        let circle = db.get_type("App.Circle", &[], false, true).unwrap();
        let names: Vec<_> = db
            .extension_methods_for(&circle, &extensions)
            .iter()
            .map(|m| m.name().to_string())
            .collect();
        assert_eq!(names, vec!["Area", "Describe"]);

        let other = db.get_type("App.Other", &[], false, true).unwrap();
        let names: Vec<_> = db
            .extension_methods_for(&other, &extensions)
            .iter()
            .map(|m| m.name().to_string())
            .collect();
        assert_eq!(names, vec!["Describe"]);
    }
}
