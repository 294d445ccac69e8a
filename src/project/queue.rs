//! Background update pipeline.
//!
//! Parsed compilation units are queued per scope and applied by worker
//! threads. Jobs for one scope are applied one at a time in enqueue order;
//! jobs for different scopes run in parallel.
//!
//! [`UpdateQueue::force_update`] is the synchronous join point: it applies
//! the scope's pending jobs on the calling thread and then waits for any job
//! a worker already took. The queue lock is never held while a job runs, so
//! a worker applying an update cannot block the caller's lock and vice versa.

use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::{Condvar, Mutex};
use rustc_hash::FxHashMap;
use tracing::{debug, trace, warn};

use super::QueueConfig;
use crate::base::FileId;
use crate::db::SemanticDatabase;
use crate::dom::CompilationUnit;

/// A change to apply to a scope.
#[derive(Debug)]
pub enum UpdateJob {
    /// Insert or replace the types contributed by a file.
    Ingest(CompilationUnit),
    /// Drop everything a file contributed.
    Remove(FileId),
}

impl UpdateJob {
    pub fn file(&self) -> FileId {
        match self {
            UpdateJob::Ingest(unit) => unit.file(),
            UpdateJob::Remove(file) => *file,
        }
    }
}

struct Pending {
    scope: Arc<SemanticDatabase>,
    job: UpdateJob,
}

impl Pending {
    fn apply(self) {
        let file = self.job.file();
        let update = match self.job {
            UpdateJob::Ingest(unit) => self.scope.update_from_unit(unit),
            UpdateJob::Remove(file) => self.scope.remove_file(file),
        };
        trace!(scope = self.scope.uri(), %file, changed = !update.is_empty(), "update applied");
    }
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<Pending>,
    /// Jobs taken off `pending` but not finished, per scope.
    in_flight: FxHashMap<Arc<str>, usize>,
    shutdown: bool,
}

impl QueueState {
    fn is_busy(&self, scope: &str) -> bool {
        self.in_flight.get(scope).is_some_and(|n| *n > 0)
    }

    fn begin(&mut self, scope: &Arc<str>, count: usize) {
        *self.in_flight.entry(scope.clone()).or_default() += count;
    }

    fn finish(&mut self, scope: &str, done: usize) {
        if let Some(count) = self.in_flight.get_mut(scope) {
            *count = count.saturating_sub(done);
            if *count == 0 {
                self.in_flight.remove(scope);
            }
        }
    }

    /// Remove and return every pending job for `scope`, keeping order.
    fn take_scope(&mut self, scope: &str) -> Vec<Pending> {
        let mut taken = Vec::new();
        let mut kept = VecDeque::with_capacity(self.pending.len());
        for pending in self.pending.drain(..) {
            if pending.scope.uri() == scope {
                taken.push(pending);
            } else {
                kept.push_back(pending);
            }
        }
        self.pending = kept;
        taken
    }
}

struct Shared {
    state: Mutex<QueueState>,
    /// Signalled when a job is queued, a scope becomes free, or on shutdown.
    work: Condvar,
    /// Signalled whenever a job finishes.
    done: Condvar,
}

impl Shared {
    /// Tracks `jobs` reserved jobs of a scope. Whatever is not completed
    /// when the guard drops is released then, so a panicking job cannot
    /// leave waiters blocked.
    fn finish_guard<'a>(&'a self, scope: &'a Arc<str>, jobs: usize) -> FinishGuard<'a> {
        FinishGuard {
            shared: self,
            scope,
            remaining: jobs,
        }
    }

    fn finish(&self, scope: &str, jobs: usize) {
        self.state.lock().finish(scope, jobs);
        self.done.notify_all();
        self.work.notify_all();
    }
}

struct FinishGuard<'a> {
    shared: &'a Shared,
    scope: &'a Arc<str>,
    remaining: usize,
}

impl FinishGuard<'_> {
    fn complete_one(&mut self) {
        if self.remaining > 0 {
            self.remaining -= 1;
            self.shared.finish(self.scope, 1);
        }
    }
}

impl Drop for FinishGuard<'_> {
    fn drop(&mut self) {
        if self.remaining > 0 {
            self.shared.finish(self.scope, self.remaining);
        }
    }
}

/// Worker pool applying [`UpdateJob`]s to their scopes.
pub struct UpdateQueue {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
}

impl UpdateQueue {
    pub fn new(config: &QueueConfig) -> Self {
        let shared = Arc::new(Shared {
            state: Mutex::new(QueueState::default()),
            work: Condvar::new(),
            done: Condvar::new(),
        });

        let mut workers = Vec::with_capacity(config.workers);
        for index in 0..config.workers {
            let name = format!("{}-{index}", config.thread_name);
            let worker_shared = shared.clone();
            match thread::Builder::new()
                .name(name.clone())
                .spawn(move || worker_loop(&worker_shared))
            {
                Ok(handle) => workers.push(handle),
                Err(err) => warn!(worker = %name, %err, "failed to spawn update worker"),
            }
        }
        debug!(workers = workers.len(), "update queue started");

        Self { shared, workers }
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Queue `job` for `scope`. Without workers it waits for a
    /// [`force_update`](Self::force_update).
    pub fn enqueue(&self, scope: Arc<SemanticDatabase>, job: UpdateJob) {
        trace!(scope = scope.uri(), file = %job.file(), "update queued");
        self.shared.state.lock().pending.push_back(Pending { scope, job });
        self.shared.work.notify_one();
    }

    /// Number of jobs not yet taken by a worker.
    pub fn pending(&self) -> usize {
        self.shared.state.lock().pending.len()
    }

    pub fn pending_for(&self, scope: &str) -> usize {
        self.shared
            .state
            .lock()
            .pending
            .iter()
            .filter(|p| p.scope.uri() == scope)
            .count()
    }

    /// Block until every job queued for `scope` so far has been applied.
    ///
    /// Jobs still pending run on the calling thread, after any job a worker
    /// is already applying for the same scope.
    pub fn force_update(&self, scope: &SemanticDatabase) {
        let scope_uri = scope.uri_arc().clone();

        let taken = {
            let mut state = self.shared.state.lock();
            while state.is_busy(&scope_uri) {
                self.shared.done.wait(&mut state);
            }
            let taken = state.take_scope(&scope_uri);
            if !taken.is_empty() {
                state.begin(&scope_uri, taken.len());
            }
            taken
        };

        if !taken.is_empty() {
            debug!(scope = %scope_uri, jobs = taken.len(), "forcing update");
        }
        let mut batch = self.shared.finish_guard(&scope_uri, taken.len());
        for pending in taken {
            pending.apply();
            batch.complete_one();
        }
    }

    /// Block until the queue is empty and no job is running. Without
    /// workers the pending jobs are applied on the calling thread.
    pub fn wait_idle(&self) {
        if self.workers.is_empty() {
            loop {
                let next = {
                    let mut state = self.shared.state.lock();
                    state.pending.front().map(|p| p.scope.clone())
                };
                match next {
                    Some(scope) => self.force_update(&scope),
                    None => break,
                }
            }
        }

        let mut state = self.shared.state.lock();
        while !state.pending.is_empty() || !state.in_flight.is_empty() {
            self.shared.done.wait(&mut state);
        }
    }

    /// Drop pending jobs for `scope`; jobs already running still finish.
    pub fn discard(&self, scope: &str) -> usize {
        let dropped = self.shared.state.lock().take_scope(scope).len();
        if dropped > 0 {
            debug!(scope, dropped, "pending updates discarded");
        }
        dropped
    }
}

fn worker_loop(shared: &Shared) {
    debug!(worker = thread::current().name().unwrap_or("?"), "update worker started");
    loop {
        let next = {
            let mut state = shared.state.lock();
            loop {
                if state.shutdown {
                    break None;
                }
                let ready = state
                    .pending
                    .iter()
                    .position(|p| !state.is_busy(p.scope.uri()));
                if let Some(pending) = ready.and_then(|index| state.pending.remove(index)) {
                    let scope = pending.scope.uri_arc().clone();
                    state.begin(&scope, 1);
                    break Some((scope, pending));
                }
                shared.work.wait(&mut state);
            }
        };

        let Some((scope, pending)) = next else { break };
        let _finish = shared.finish_guard(&scope, 1);
        pending.apply();
    }
    debug!(worker = thread::current().name().unwrap_or("?"), "update worker stopped");
}

impl Drop for UpdateQueue {
    fn drop(&mut self) {
        let abandoned = {
            let mut state = self.shared.state.lock();
            state.shutdown = true;
            state.pending.len()
        };
        self.shared.work.notify_all();
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                warn!("update worker panicked");
            }
        }
        debug!(abandoned, "update queue stopped");
    }
}

impl std::fmt::Debug for UpdateQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdateQueue")
            .field("workers", &self.workers.len())
            .field("pending", &self.pending())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::TypeBuilder;

    fn unit(file: u32, full_name: &str) -> CompilationUnit {
        CompilationUnit::new(FileId::new(file), format!("{file}.cs")).with_type(TypeBuilder::class(full_name))
    }

    #[test]
    fn test_inline_queue_waits_for_force_update() {
        let queue = UpdateQueue::new(&QueueConfig::inline());
        let db = Arc::new(SemanticDatabase::new("app"));

        queue.enqueue(db.clone(), UpdateJob::Ingest(unit(0, "App.Widget")));
        assert_eq!(queue.pending_for("app"), 1);
        assert!(db.is_empty());

        queue.force_update(&db);
        assert_eq!(queue.pending(), 0);
        assert!(db.get_type("App.Widget", &[], false, true).is_some());
    }

    #[test]
    fn test_force_update_keeps_job_order() {
        let queue = UpdateQueue::new(&QueueConfig::inline());
        let db = Arc::new(SemanticDatabase::new("app"));

        queue.enqueue(db.clone(), UpdateJob::Ingest(unit(0, "App.First")));
        queue.enqueue(db.clone(), UpdateJob::Remove(FileId::new(0)));
        queue.enqueue(db.clone(), UpdateJob::Ingest(unit(0, "App.Second")));
        queue.force_update(&db);

        assert!(db.get_type("App.First", &[], false, true).is_none());
        assert!(db.get_type("App.Second", &[], false, true).is_some());
    }

    #[test]
    fn test_force_update_only_touches_its_scope() {
        let queue = UpdateQueue::new(&QueueConfig::inline());
        let app = Arc::new(SemanticDatabase::new("app"));
        let lib = Arc::new(SemanticDatabase::new("lib"));

        queue.enqueue(app.clone(), UpdateJob::Ingest(unit(0, "App.Widget")));
        queue.enqueue(lib.clone(), UpdateJob::Ingest(unit(0, "Lib.Gadget")));
        queue.force_update(&app);

        assert_eq!(app.len(), 1);
        assert!(lib.is_empty());
        assert_eq!(queue.pending_for("lib"), 1);
    }

    #[test]
    fn test_workers_apply_updates() {
        let queue = UpdateQueue::new(&QueueConfig::default().with_workers(2));
        assert_eq!(queue.worker_count(), 2);
        let db = Arc::new(SemanticDatabase::new("app"));

        for file in 0..16 {
            queue.enqueue(db.clone(), UpdateJob::Ingest(unit(file, &format!("App.T{file}"))));
        }
        queue.force_update(&db);
        assert_eq!(db.len(), 16);

        queue.wait_idle();
        assert_eq!(queue.pending(), 0);
    }

    #[test]
    fn test_interrupted_batch_releases_scope() {
        let queue = UpdateQueue::new(&QueueConfig::inline());
        let scope: Arc<str> = Arc::from("app");
        queue.shared.state.lock().begin(&scope, 3);

        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let mut batch = queue.shared.finish_guard(&scope, 3);
            batch.complete_one();
            panic!("update failed");
        }));
        assert!(outcome.is_err());
        assert!(!queue.shared.state.lock().is_busy("app"));

        let db = Arc::new(SemanticDatabase::new("app"));
        queue.enqueue(db.clone(), UpdateJob::Ingest(unit(0, "App.Widget")));
        queue.force_update(&db);
        queue.wait_idle();
        assert_eq!(db.len(), 1);
    }

    #[test]
    fn test_discard_drops_pending_jobs() {
        let queue = UpdateQueue::new(&QueueConfig::inline());
        let db = Arc::new(SemanticDatabase::new("app"));
        queue.enqueue(db.clone(), UpdateJob::Ingest(unit(0, "App.Widget")));

        assert_eq!(queue.discard("app"), 1);
        queue.wait_idle();
        assert!(db.is_empty());
    }
}
