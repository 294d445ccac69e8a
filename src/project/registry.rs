//! Registry of compilation scopes and their reference graph.
//!
//! Each registered scope owns one [`SemanticDatabase`]. A scope's count is
//! one per registration plus one per scope that references it; when it
//! drops to zero the database is torn down, which releases its own
//! references in turn. Reference cycles are allowed, every transitive walk
//! carries a visited set.

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use tracing::debug;

use super::{QueueConfig, UpdateJob, UpdateQueue};
use crate::db::SemanticDatabase;
use crate::dom::{DomError, Result};

#[derive(Default)]
struct RegistryInner {
    doms: IndexMap<Arc<str>, Arc<SemanticDatabase>>,
    /// Declared reference uris per scope, in declaration order. May name
    /// scopes that are not registered yet.
    declared: IndexMap<Arc<str>, Vec<Arc<str>>>,
}

impl RegistryInner {
    fn dom(&self, uri: &str) -> Result<Arc<SemanticDatabase>> {
        self.doms
            .get(uri)
            .cloned()
            .ok_or_else(|| DomError::UnknownScope(uri.to_string()))
    }

    /// Rebuild `db`'s reference list from its declared uris.
    ///
    /// The new list is built and acquired first, then swapped in; only then
    /// are the superseded entries released.
    fn rebuild_references(&mut self, db: &Arc<SemanticDatabase>) {
        let declared = self.declared.get(db.uri()).cloned().unwrap_or_default();
        let mut seen: FxHashSet<Arc<str>> = FxHashSet::default();
        let references: Vec<Arc<SemanticDatabase>> = declared
            .into_iter()
            .filter(|uri| uri.as_ref() != db.uri() && seen.insert(uri.clone()))
            .filter_map(|uri| self.doms.get(uri.as_ref()).cloned())
            .collect();
        for reference in &references {
            reference.acquire();
        }
        let count = references.len();

        let superseded = db.set_references(references);
        debug!(scope = db.uri(), references = count, released = superseded.len(), "references rebuilt");

        let mut visited = FxHashSet::default();
        for old in superseded.iter() {
            if old.release() == 0 {
                self.teardown(old, &mut visited);
            }
        }
    }

    /// Unload `db`, releasing everything it references. Runs under the
    /// registry lock.
    fn teardown(&mut self, db: &Arc<SemanticDatabase>, visited: &mut FxHashSet<Arc<str>>) {
        if !visited.insert(db.uri_arc().clone()) {
            return;
        }
        // A re-registered scope with the same uri is a different database.
        if self.doms.get(db.uri()).is_some_and(|current| Arc::ptr_eq(current, db)) {
            self.doms.shift_remove(db.uri());
            self.declared.shift_remove(db.uri());
        }

        let released = db.set_references(Vec::new());
        debug!(scope = db.uri(), released = released.len(), "scope torn down");
        for reference in released.iter() {
            if reference.release() == 0 {
                self.teardown(reference, visited);
            }
        }
    }

    /// Scopes that declare a reference to `uri`.
    fn dependents_of(&self, uri: &str) -> Vec<Arc<SemanticDatabase>> {
        self.declared
            .iter()
            .filter(|(owner, refs)| owner.as_ref() != uri && refs.iter().any(|r| r.as_ref() == uri))
            .filter_map(|(owner, _)| self.doms.get(owner.as_ref()).cloned())
            .collect()
    }
}

/// Owner of every registered [`SemanticDatabase`] plus the background
/// update queue that feeds them.
pub struct DomRegistry {
    inner: Mutex<RegistryInner>,
    queue: UpdateQueue,
}

impl Default for DomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DomRegistry {
    pub fn new() -> Self {
        Self::with_config(QueueConfig::default())
    }

    pub fn with_config(config: QueueConfig) -> Self {
        Self {
            inner: Mutex::new(RegistryInner::default()),
            queue: UpdateQueue::new(&config),
        }
    }

    pub fn queue(&self) -> &UpdateQueue {
        &self.queue
    }

    // ========================================================================
    // SCOPE LIFETIME
    // ========================================================================

    /// Register a scope, or acquire it again if it already exists, and set
    /// its declared references.
    ///
    /// References to scopes that are not registered yet are kept and picked
    /// up once those scopes register.
    pub fn register<S: AsRef<str>>(&self, uri: &str, references: &[S]) -> Arc<SemanticDatabase> {
        let declared: Vec<Arc<str>> = references.iter().map(|r| Arc::from(r.as_ref())).collect();
        let mut inner = self.inner.lock();

        if let Some(existing) = inner.doms.get(uri).cloned() {
            existing.acquire();
            inner.declared.insert(existing.uri_arc().clone(), declared);
            inner.rebuild_references(&existing);
            return existing;
        }

        let db = Arc::new(SemanticDatabase::new(uri));
        db.acquire();
        inner.doms.insert(db.uri_arc().clone(), db.clone());
        inner.declared.insert(db.uri_arc().clone(), declared);
        debug!(scope = uri, "scope registered");

        inner.rebuild_references(&db);
        for dependent in inner.dependents_of(uri) {
            inner.rebuild_references(&dependent);
        }
        db
    }

    /// Look up a registered scope, optionally taking a count on it.
    pub fn get_dom(&self, uri: &str, acquire: bool) -> Option<Arc<SemanticDatabase>> {
        let inner = self.inner.lock();
        let db = inner.doms.get(uri)?.clone();
        if acquire {
            db.acquire();
        }
        Some(db)
    }

    /// Give back one count on `uri`; at zero the scope is torn down.
    pub fn unref_dom(&self, uri: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        let db = inner.dom(uri)?;
        if db.release() == 0 {
            let mut visited = FxHashSet::default();
            inner.teardown(&db, &mut visited);
            drop(inner);
            self.queue.discard(uri);
        }
        Ok(())
    }

    pub fn contains(&self, uri: &str) -> bool {
        self.inner.lock().doms.contains_key(uri)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().doms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registered scope uris in registration order.
    pub fn uris(&self) -> Vec<Arc<str>> {
        self.inner.lock().doms.keys().cloned().collect()
    }

    // ========================================================================
    // REFERENCES
    // ========================================================================

    /// Rebuild `uri`'s reference list from its declared references.
    pub fn update_references(&self, uri: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        let db = inner.dom(uri)?;
        inner.rebuild_references(&db);
        Ok(())
    }

    pub fn add_reference(&self, uri: &str, target: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        let db = inner.dom(uri)?;
        let declared = inner.declared.entry(db.uri_arc().clone()).or_default();
        if declared.iter().any(|r| r.as_ref() == target) {
            return Ok(());
        }
        declared.push(Arc::from(target));
        inner.rebuild_references(&db);
        Ok(())
    }

    pub fn remove_reference(&self, uri: &str, target: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        let db = inner.dom(uri)?;
        let Some(declared) = inner.declared.get_mut(uri) else {
            return Ok(());
        };
        let before = declared.len();
        declared.retain(|r| r.as_ref() != target);
        if declared.len() != before {
            inner.rebuild_references(&db);
        }
        Ok(())
    }

    /// Declared reference uris of `uri`, including unregistered ones.
    pub fn declared_references(&self, uri: &str) -> Vec<Arc<str>> {
        self.inner.lock().declared.get(uri).cloned().unwrap_or_default()
    }

    // ========================================================================
    // UPDATES
    // ========================================================================

    pub fn enqueue(&self, uri: &str, job: UpdateJob) -> Result<()> {
        let db = self.inner.lock().dom(uri)?;
        self.queue.enqueue(db, job);
        Ok(())
    }

    /// Apply every queued update for `uri` and the scopes it references
    /// before returning.
    ///
    /// With `update_references` each visited scope's reference list is
    /// rebuilt first, so newly registered references are included. The
    /// registry lock is not held while updates run.
    pub fn force_update(&self, uri: &str, update_references: bool) -> Result<()> {
        let root = self.inner.lock().dom(uri)?;

        let mut visited: FxHashSet<Arc<str>> = FxHashSet::default();
        let mut stack = vec![root];
        while let Some(db) = stack.pop() {
            if !visited.insert(db.uri_arc().clone()) {
                continue;
            }
            if update_references {
                let mut inner = self.inner.lock();
                if inner.doms.get(db.uri()).is_some_and(|current| Arc::ptr_eq(current, &db)) {
                    inner.rebuild_references(&db);
                }
            }
            self.queue.force_update(&db);
            stack.extend(db.references().iter().cloned());
        }
        debug!(scope = uri, scopes = visited.len(), "force update complete");
        Ok(())
    }
}

impl std::fmt::Debug for DomRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DomRegistry")
            .field("scopes", &self.uris())
            .field("queue", &self.queue)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::FileId;
    use crate::dom::{CompilationUnit, TypeBuilder};

    const NONE: &[&str] = &[];

    fn registry() -> DomRegistry {
        DomRegistry::with_config(QueueConfig::inline())
    }

    #[test]
    fn test_register_twice_acquires() {
        let registry = registry();
        let first = registry.register("app", NONE);
        let second = registry.register("app", NONE);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.ref_count(), 2);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_references_take_counts() {
        let registry = registry();
        let lib = registry.register("lib", NONE);
        let app = registry.register("app", &["lib"]);

        assert_eq!(lib.ref_count(), 2);
        assert_eq!(app.references().len(), 1);
        assert!(Arc::ptr_eq(&app.references()[0], &lib));
    }

    #[test]
    fn test_late_registration_fills_references() {
        let registry = registry();
        let app = registry.register("app", &["lib"]);
        assert!(app.references().is_empty());

        let lib = registry.register("lib", NONE);
        assert_eq!(app.references().len(), 1);
        assert_eq!(lib.ref_count(), 2);
    }

    #[test]
    fn test_self_reference_is_skipped() {
        let registry = registry();
        let app = registry.register("app", &["app"]);
        assert!(app.references().is_empty());
        assert_eq!(app.ref_count(), 1);
    }

    #[test]
    fn test_unref_tears_down_and_releases() {
        let registry = registry();
        let lib = registry.register("lib", NONE);
        registry.register("app", &["lib"]);
        registry.unref_dom("lib").unwrap();
        assert_eq!(lib.ref_count(), 1);
        assert!(registry.contains("lib"));

        registry.unref_dom("app").unwrap();
        assert!(registry.is_empty());
        assert_eq!(lib.ref_count(), 0);
    }

    #[test]
    fn test_unref_unknown_scope() {
        let registry = registry();
        assert!(matches!(registry.unref_dom("nope"), Err(DomError::UnknownScope(uri)) if uri == "nope"));
    }

    #[test]
    fn test_remove_reference_releases() {
        let registry = registry();
        let lib = registry.register("lib", NONE);
        let app = registry.register("app", &["lib"]);

        registry.remove_reference("app", "lib").unwrap();
        assert!(app.references().is_empty());
        assert_eq!(lib.ref_count(), 1);

        registry.add_reference("app", "lib").unwrap();
        registry.add_reference("app", "lib").unwrap();
        assert_eq!(lib.ref_count(), 2);
        assert_eq!(registry.declared_references("app").len(), 1);
    }

    #[test]
    fn test_duplicate_declared_references_acquire_once() {
        let registry = registry();
        let lib = registry.register("lib", NONE);
        let app = registry.register("app", &["lib", "app", "lib"]);

        assert_eq!(app.references().len(), 1);
        assert_eq!(lib.ref_count(), 2);
        registry.update_references("app").unwrap();
        assert_eq!(lib.ref_count(), 2);
    }

    #[test]
    fn test_enqueue_and_force_update() {
        let registry = registry();
        let app = registry.register("app", NONE);
        let unit = CompilationUnit::new(FileId::new(0), "Widget.cs").with_type(TypeBuilder::class("App.Widget"));

        registry.enqueue("app", UpdateJob::Ingest(unit)).unwrap();
        assert!(app.is_empty());
        registry.force_update("app", false).unwrap();
        assert_eq!(app.len(), 1);
    }
}
