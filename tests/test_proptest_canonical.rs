//! Property tests for the canonical form of type references.
#![cfg(feature = "proptest")]

use proptest::prelude::*;
use typedom::TypeReference;

// ============================================================================
// PROPTEST STRATEGIES
// ============================================================================

fn arb_segment() -> impl Strategy<Value = String> {
    "[A-Z][a-zA-Z0-9_]{0,8}"
}

fn arb_full_name() -> impl Strategy<Value = String> {
    prop::collection::vec(arb_segment(), 1..4).prop_map(|segments| segments.join("."))
}

fn arb_reference() -> impl Strategy<Value = TypeReference> {
    let leaf = (arb_full_name(), 0usize..3, any::<bool>()).prop_map(|(name, dims, nullable)| {
        TypeReference::new(&name)
            .with_array_dimensions(dims)
            .with_nullable(nullable)
    });
    leaf.prop_recursive(3, 12, 3, |inner| {
        (arb_full_name(), prop::collection::vec(inner, 1..3))
            .prop_map(|(name, args)| TypeReference::generic(&name, args))
    })
}

proptest! {
    #[test]
    fn test_canonical_form_is_stable(reference in arb_reference()) {
        let first = reference.canonical_form().to_string();
        prop_assert_eq!(reference.canonical_form(), first.as_str());
        let copy = reference.clone();
        prop_assert_eq!(copy.canonical_form(), first.as_str());
    }

    #[test]
    fn test_equal_fields_equal_canonical_form(name in arb_full_name(), dims in 0usize..3) {
        let a = TypeReference::new(&name).with_array_dimensions(dims);
        let b = TypeReference::new(&name).with_array_dimensions(dims);
        prop_assert_eq!(a.canonical_form(), b.canonical_form());
        prop_assert_eq!(a, b);
    }

    #[test]
    fn test_arguments_change_canonical_form(name in arb_full_name(), arg in arb_full_name()) {
        let plain = TypeReference::new(&name);
        let generic = TypeReference::generic(&name, vec![TypeReference::new(&arg)]);
        prop_assert_ne!(plain.canonical_form(), generic.canonical_form());
    }
}
