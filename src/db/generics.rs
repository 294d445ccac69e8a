//! Generic instantiation with identity caching.
//!
//! Every instantiation request goes through the per-database cache, keyed
//! by `{open full name}[{arg},...]`. Parameter-as-type placeholders share
//! the cache under `{owner full name}[!{parameter}]`, so evicting a type's
//! `{full name}[` prefix drops both.

use std::sync::Arc;

use tracing::{debug, trace};

use super::SemanticDatabase;
use crate::dom::{GenericInstantiation, ParameterType, TypeDefinition, TypeParameter, TypeReference};

impl SemanticDatabase {
    /// Bind `open` to `arguments`.
    ///
    /// Returns `open` itself when there are no arguments or it is already an
    /// instantiation. Repeated calls with equal arguments return the same
    /// instance until the cache is reset.
    pub fn instantiate(&self, open: &Arc<TypeDefinition>, arguments: &[TypeReference]) -> Arc<TypeDefinition> {
        if arguments.is_empty() || open.is_instantiation() {
            return open.clone();
        }
        let key = GenericInstantiation::key_for(open.full_name(), arguments);

        let mut cache = self.instantiations.lock();
        if let Some(existing) = cache.get(key.as_str()) {
            return existing.clone();
        }
        trace!(scope = self.uri(), %key, "instantiating");
        let instance = Arc::new(TypeDefinition::Instantiation(GenericInstantiation::new(
            open.clone(),
            arguments.to_vec(),
        )));
        cache.insert(Arc::from(key), instance.clone());
        instance
    }

    /// The placeholder type for `parameter` of `owner`, cached like an
    /// instantiation.
    pub fn parameter_type(&self, owner: &Arc<TypeDefinition>, parameter: &TypeParameter) -> Arc<TypeDefinition> {
        let key = ParameterType::key_for(owner.full_name(), parameter.name());

        let mut cache = self.instantiations.lock();
        if let Some(existing) = cache.get(key.as_str()) {
            return existing.clone();
        }
        let placeholder = Arc::new(TypeDefinition::Parameter(ParameterType::new(
            owner.clone(),
            parameter.clone(),
        )));
        cache.insert(Arc::from(key), placeholder.clone());
        placeholder
    }

    /// Evict every cached instantiation of `ty` (and its parameter types).
    pub fn reset_instantiations(&self, ty: &TypeDefinition) {
        self.reset_instantiations_of(ty.full_name());
    }

    pub(crate) fn reset_instantiations_of(&self, full_name: &str) {
        let prefix = format!("{full_name}[");
        let mut cache = self.instantiations.lock();
        let before = cache.len();
        cache.retain(|key, _| !key.starts_with(&prefix));
        let evicted = before - cache.len();
        if evicted > 0 {
            debug!(scope = self.uri(), type_name = full_name, evicted, "instantiations reset");
        }
    }

    /// Number of cached instantiations and parameter types.
    pub fn cached_instantiations(&self) -> usize {
        self.instantiations.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::FileId;
    use crate::dom::{CompilationUnit, TypeBuilder};

    fn db_with_box() -> (SemanticDatabase, Arc<TypeDefinition>) {
        let db = SemanticDatabase::new("app");
        let mut unit = CompilationUnit::new(FileId::new(0), "Box.cs");
        unit.add_type(TypeBuilder::class("App.Box").with_type_parameter(TypeParameter::new("T")));
        db.update_from_unit(unit);
        let open = db.get_type("App.Box`1", &[], false, true).unwrap();
        (db, open)
    }

    fn string() -> TypeReference {
        TypeReference::new("System.String")
    }

    #[test]
    fn test_instantiate_is_cached() {
        let (db, open) = db_with_box();
        let first = db.instantiate(&open, &[string()]);
        let second = db.instantiate(&open, &[string()]);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(db.cached_instantiations(), 1);
    }

    #[test]
    fn test_concurrent_instantiate_shares_one_instance() {
        let (db, open) = db_with_box();
        let results: Vec<Arc<TypeDefinition>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| db.instantiate(&open, &[string()])))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert!(results.iter().all(|inst| Arc::ptr_eq(inst, &results[0])));
        assert_eq!(db.cached_instantiations(), 1);
    }

    #[test]
    fn test_instantiate_without_arguments_is_identity() {
        let (db, open) = db_with_box();
        assert!(Arc::ptr_eq(&db.instantiate(&open, &[]), &open));

        let inst = db.instantiate(&open, &[string()]);
        assert!(Arc::ptr_eq(&db.instantiate(&inst, &[string()]), &inst));
    }

    #[test]
    fn test_reset_evicts_by_prefix() {
        let (db, open) = db_with_box();
        let before = db.instantiate(&open, &[string()]);
        let param = db.parameter_type(&open, &open.type_parameters()[0]);
        assert_eq!(db.cached_instantiations(), 2);

        db.reset_instantiations(&open);
        assert_eq!(db.cached_instantiations(), 0);

        let after = db.instantiate(&open, &[string()]);
        assert!(!Arc::ptr_eq(&before, &after));
        assert_eq!(after.as_instantiation().map(|i| i.key().to_string()), Some("App.Box[System.String]".into()));
        assert!(!Arc::ptr_eq(&param, &db.parameter_type(&open, &open.type_parameters()[0])));
    }

    #[test]
    fn test_reset_leaves_similar_names() {
        let (db, open) = db_with_box();
        let mut unit = CompilationUnit::new(FileId::new(1), "BoxSet.cs");
        unit.add_type(TypeBuilder::class("App.BoxSet").with_type_parameter(TypeParameter::new("T")));
        db.update_from_unit(unit);
        let other = db.get_type("App.BoxSet`1", &[], false, true).unwrap();

        db.instantiate(&open, &[string()]);
        db.instantiate(&other, &[string()]);
        db.reset_instantiations(&open);
        assert_eq!(db.cached_instantiations(), 1);
    }

    #[test]
    fn test_reingest_resets_instantiations() {
        let (db, open) = db_with_box();
        db.instantiate(&open, &[string()]);

        let mut unit = CompilationUnit::new(FileId::new(0), "Box.cs");
        unit.add_type(TypeBuilder::class("App.Box").with_type_parameter(TypeParameter::new("T")));
        db.update_from_unit(unit);
        assert_eq!(db.cached_instantiations(), 0);
    }
}
