//! Client-side cache of "list with tasks" query results.
//!
//! One entry per list id. Reads run as spawned tasks guarded by a
//! cancellation token and a fetch sequence number, so a read that was
//! cancelled or superseded never writes its (stale) result.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::api::TodoApi;
use crate::models::TodoList;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Clone, Debug, Default, PartialEq)]
pub enum CachedList {
    #[default]
    Unloaded,
    NotFound,
    Loaded(TodoList),
}

impl CachedList {
    pub fn list(&self) -> Option<&TodoList> {
        match self {
            CachedList::Loaded(list) => Some(list),
            _ => None,
        }
    }

    pub fn list_mut(&mut self) -> Option<&mut TodoList> {
        match self {
            CachedList::Loaded(list) => Some(list),
            _ => None,
        }
    }
}

struct InFlight {
    seq: u64,
    token: CancellationToken,
}

#[derive(Default)]
struct Entry {
    data: CachedList,
    in_flight: Option<InFlight>,
}

struct Inner {
    api: Arc<dyn TodoApi>,
    entries: Mutex<HashMap<String, Entry>>,
    next_seq: AtomicU64,
}

#[derive(Clone)]
pub struct QueryCache {
    inner: Arc<Inner>,
}

impl QueryCache {
    pub fn new(api: Arc<dyn TodoApi>) -> QueryCache {
        QueryCache {
            inner: Arc::new(Inner {
                api,
                entries: Mutex::new(HashMap::new()),
                next_seq: AtomicU64::new(0),
            }),
        }
    }

    pub fn get(&self, list_id: &str) -> CachedList {
        self.inner
            .entries
            .lock()
            .get(list_id)
            .map(|entry| entry.data.clone())
            .unwrap_or_default()
    }

    pub fn set(&self, list_id: &str, data: CachedList) {
        let mut entries = self.inner.entries.lock();
        entries.entry(list_id.to_string()).or_default().data = data;
    }

    /// Rewrites the entry in place and returns what it held before.
    pub fn modify(&self, list_id: &str, f: impl FnOnce(&mut CachedList)) -> CachedList {
        let mut entries = self.inner.entries.lock();
        let entry = entries.entry(list_id.to_string()).or_default();
        let previous = entry.data.clone();
        f(&mut entry.data);
        previous
    }

    pub fn is_fetching(&self, list_id: &str) -> bool {
        self.inner
            .entries
            .lock()
            .get(list_id)
            .is_some_and(|entry| entry.in_flight.is_some())
    }

    /// Cancels the in-flight read of this entry, if any.
    pub fn cancel(&self, list_id: &str) {
        let mut entries = self.inner.entries.lock();
        if let Some(in_flight) = entries.get_mut(list_id).and_then(|e| e.in_flight.take()) {
            debug!(list_id, seq = in_flight.seq, "cancelled in-flight fetch");
            in_flight.token.cancel();
        }
    }

    /// Starts a fetch if nothing is cached and nothing is on its way.
    pub fn ensure(&self, list_id: &str) -> Option<JoinHandle<()>> {
        let idle_and_empty = {
            let entries = self.inner.entries.lock();
            match entries.get(list_id) {
                Some(entry) => entry.data == CachedList::Unloaded && entry.in_flight.is_none(),
                None => true,
            }
        };
        idle_and_empty.then(|| self.fetch(list_id))
    }

    /// Marks the entry stale and refetches it from the server.
    pub fn invalidate(&self, list_id: &str) -> JoinHandle<()> {
        debug!(list_id, "invalidated");
        self.fetch(list_id)
    }

    /// Fetches the list, superseding any read already in flight.
    pub fn fetch(&self, list_id: &str) -> JoinHandle<()> {
        let token = CancellationToken::new();
        let seq = self.inner.next_seq.fetch_add(1, Ordering::Relaxed) + 1;
        {
            let mut entries = self.inner.entries.lock();
            let entry = entries.entry(list_id.to_string()).or_default();
            let next = InFlight {
                seq,
                token: token.clone(),
            };
            if let Some(previous) = entry.in_flight.replace(next) {
                previous.token.cancel();
            }
        }

        let cache = self.clone();
        let list_id = list_id.to_string();
        tokio::spawn(async move {
            let result = tokio::select! {
                _ = token.cancelled() => {
                    debug!(list_id = %list_id, seq, "fetch dropped after cancel");
                    return;
                }
                result = cache.inner.api.get_tasks(&list_id) => result,
            };

            let mut entries = cache.inner.entries.lock();
            let Some(entry) = entries.get_mut(&list_id) else {
                return;
            };
            let current = entry.in_flight.as_ref().is_some_and(|f| f.seq == seq);
            if !current || token.is_cancelled() {
                debug!(list_id = %list_id, seq, "discarding superseded fetch");
                return;
            }
            entry.in_flight = None;
            match result {
                Ok(Some(list)) => entry.data = CachedList::Loaded(list),
                Ok(None) => entry.data = CachedList::NotFound,
                Err(err) => warn!(list_id = %list_id, error = %err, "fetch failed, keeping cached data"),
            }
        })
    }
}
