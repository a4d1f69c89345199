//! Optimistic mutations against the query cache.
//!
//! Every mutation walks the same state machine:
//!
//! 1. **Begin**: cancel the entry's in-flight read, snapshot the entry and
//!    rewrite it to the intended post-mutation state.
//! 2. **Dispatch**: send the API call from a spawned task.
//! 3. **Settle**: on failure restore the snapshot taken in Begin. Either way
//!    the entry is then invalidated so it converges to server state.
//!
//! Each mutation carries its own snapshot, so a failing mutation only undoes
//! what was visible when it began. Overlapping mutations may snapshot each
//! other's unsaved writes; the refetch after settling drops those.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::api::TodoApi;
use crate::cache::{CachedList, QueryCache};
use crate::error::ApiError;
use crate::models::{CreatedList, DeletedCount, Task, TaskPatch};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MutationKind {
    CreateTask,
    EditTask,
    DeleteTask,
    DeleteAllTasks,
    DeleteTodolist,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Begin,
    Dispatch,
    Succeeded,
    RolledBack,
}

/// Reported for every mutation that settles with an error.
#[derive(Clone, Debug)]
pub struct MutationFailure {
    pub kind: MutationKind,
    pub list_id: String,
    pub error: ApiError,
}

struct PendingMutation {
    kind: MutationKind,
    list_id: String,
    phase: Phase,
    // None for mutations without an optimistic step.
    snapshot: Option<CachedList>,
}

impl PendingMutation {
    fn begin(
        cache: &QueryCache,
        kind: MutationKind,
        list_id: &str,
        optimistic: Option<Box<dyn FnOnce(&mut CachedList) + Send>>,
    ) -> PendingMutation {
        cache.cancel(list_id);
        let snapshot = optimistic.map(|apply| cache.modify(list_id, apply));
        debug!(?kind, list_id, optimistic = snapshot.is_some(), "mutation begin");
        PendingMutation {
            kind,
            list_id: list_id.to_string(),
            phase: Phase::Begin,
            snapshot,
        }
    }

    fn dispatch(&mut self) {
        debug_assert_eq!(self.phase, Phase::Begin);
        self.phase = Phase::Dispatch;
        debug!(kind = ?self.kind, list_id = %self.list_id, "mutation dispatch");
    }

    fn succeed(&mut self) {
        debug_assert_eq!(self.phase, Phase::Dispatch);
        self.phase = Phase::Succeeded;
        debug!(kind = ?self.kind, list_id = %self.list_id, "mutation succeeded");
    }

    async fn settle(&self, cache: &QueryCache) {
        debug_assert_ne!(self.phase, Phase::Dispatch);
        if let Err(err) = cache.invalidate(&self.list_id).await {
            warn!(list_id = %self.list_id, error = %err, "refetch after mutation aborted");
        }
    }

    fn roll_back(&mut self, cache: &QueryCache, err: &ApiError) {
        debug_assert_eq!(self.phase, Phase::Dispatch);
        self.phase = Phase::RolledBack;
        warn!(kind = ?self.kind, list_id = %self.list_id, error = %err, "mutation failed");
        if let Some(snapshot) = self.snapshot.take() {
            cache.set(&self.list_id, snapshot);
        }
    }
}

/// Runs list/task mutations optimistically against a [`QueryCache`].
#[derive(Clone)]
pub struct MutationCoordinator {
    api: Arc<dyn TodoApi>,
    cache: QueryCache,
    pending: Arc<AtomicUsize>,
    failures: UnboundedSender<MutationFailure>,
}

impl MutationCoordinator {
    pub fn new(
        api: Arc<dyn TodoApi>,
        cache: QueryCache,
    ) -> (MutationCoordinator, UnboundedReceiver<MutationFailure>) {
        let (failures, rx) = mpsc::unbounded_channel();
        let coordinator = MutationCoordinator {
            api,
            cache,
            pending: Arc::new(AtomicUsize::new(0)),
            failures,
        };
        (coordinator, rx)
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    /// Number of mutations dispatched but not yet settled.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    pub async fn create_todolist(&self) -> Result<CreatedList, ApiError> {
        self.api.create_todolist().await
    }

    pub fn edit_task(
        &self,
        list_id: &str,
        task_id: &str,
        patch: TaskPatch,
    ) -> JoinHandle<Result<Task, ApiError>> {
        let optimistic = {
            let task_id = task_id.to_string();
            let patch = patch.clone();
            move |data: &mut CachedList| {
                if let Some(list) = data.list_mut() {
                    for task in list.tasks.iter_mut().filter(|t| t.id == task_id) {
                        task.apply(&patch);
                    }
                }
            }
        };
        let mutation = PendingMutation::begin(
            &self.cache,
            MutationKind::EditTask,
            list_id,
            Some(Box::new(optimistic)),
        );
        let task_id = task_id.to_string();
        self.spawn(
            mutation,
            move |api| async move { api.edit_task(&task_id, patch).await },
            |_, _| {},
        )
    }

    pub fn delete_task(&self, list_id: &str, task_id: &str) -> JoinHandle<Result<Task, ApiError>> {
        let optimistic = {
            let task_id = task_id.to_string();
            move |data: &mut CachedList| {
                if let Some(list) = data.list_mut() {
                    list.tasks.retain(|t| t.id != task_id);
                }
            }
        };
        let mutation = PendingMutation::begin(
            &self.cache,
            MutationKind::DeleteTask,
            list_id,
            Some(Box::new(optimistic)),
        );
        let task_id = task_id.to_string();
        self.spawn(
            mutation,
            move |api| async move { api.delete_task(&task_id).await },
            |_, _| {},
        )
    }

    pub fn delete_all_tasks(&self, list_id: &str) -> JoinHandle<Result<DeletedCount, ApiError>> {
        let mutation = PendingMutation::begin(
            &self.cache,
            MutationKind::DeleteAllTasks,
            list_id,
            Some(Box::new(|data: &mut CachedList| {
                if let Some(list) = data.list_mut() {
                    list.tasks.clear();
                }
            })),
        );
        let list_id = list_id.to_string();
        self.spawn(
            mutation,
            move |api| async move { api.delete_all_tasks(&list_id).await },
            |_, _| {},
        )
    }

    pub fn delete_todolist(&self, list_id: &str) -> JoinHandle<Result<(), ApiError>> {
        let mutation = PendingMutation::begin(
            &self.cache,
            MutationKind::DeleteTodolist,
            list_id,
            Some(Box::new(|data: &mut CachedList| *data = CachedList::NotFound)),
        );
        let list_id = list_id.to_string();
        self.spawn(
            mutation,
            move |api| async move { api.delete_todolist(&list_id).await },
            |_, _| {},
        )
    }

    /// Nothing is shown before the server answers; the created task is
    /// appended on success and the entry is then refetched.
    pub fn create_task(&self, list_id: &str) -> JoinHandle<Result<Task, ApiError>> {
        let mutation = PendingMutation::begin(&self.cache, MutationKind::CreateTask, list_id, None);
        let list_id = list_id.to_string();
        self.spawn(
            mutation,
            move |api| async move { api.create_task(&list_id).await },
            |data: &mut CachedList, task: &Task| {
                if let Some(list) = data.list_mut() {
                    list.tasks.push(task.clone());
                }
            },
        )
    }

    fn spawn<T, F, Fut>(
        &self,
        mut mutation: PendingMutation,
        dispatch: F,
        reconcile: fn(&mut CachedList, &T),
    ) -> JoinHandle<Result<T, ApiError>>
    where
        T: Send + 'static,
        F: FnOnce(Arc<dyn TodoApi>) -> Fut,
        Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
    {
        let cache = self.cache.clone();
        let pending = self.pending.clone();
        let failures = self.failures.clone();

        pending.fetch_add(1, Ordering::SeqCst);
        mutation.dispatch();
        let call = dispatch(self.api.clone());

        tokio::spawn(async move {
            let result = call.await;
            match &result {
                Ok(value) => {
                    cache.modify(&mutation.list_id, |data| reconcile(data, value));
                    mutation.succeed();
                }
                Err(err) => {
                    mutation.roll_back(&cache, err);
                    let _ = failures.send(MutationFailure {
                        kind: mutation.kind,
                        list_id: mutation.list_id.clone(),
                        error: err.clone(),
                    });
                }
            }
            mutation.settle(&cache).await;
            pending.fetch_sub(1, Ordering::SeqCst);
            result
        })
    }
}
