//! Tracking of in-flight connections.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::task::{AbortHandle, JoinSet};

use crate::server::socket::ConnectionId;

/// The set of connections that have been accepted and not yet closed.
///
/// Written by the accept loop on every accept and by each connection task
/// when it finishes, so all access goes through a mutex.
#[derive(Debug, Clone, Default)]
pub struct ActiveConnections {
    inner: Arc<Mutex<HashMap<ConnectionId, AbortHandle>>>,
}

impl ActiveConnections {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ConnectionId, AbortHandle>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Spawn `task` onto `tasks` and track it under `id`.
    ///
    /// The entry is removed when the task's future is dropped, whether it
    /// finished, panicked, or was aborted.
    pub fn spawn<F>(&self, tasks: &mut JoinSet<()>, id: ConnectionId, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let guard = Tracked { id, connections: self.clone() };

        // Hold the lock across spawn so a fast task cannot remove itself
        // before it has been inserted.
        let mut active = self.lock();
        let handle = tasks.spawn(async move {
            let _guard = guard;
            task.await;
        });
        active.insert(id, handle);
    }

    /// Abort every tracked task, dropping its connection. Returns how many
    /// were aborted.
    pub fn abort_all(&self) -> usize {
        let active = self.lock();
        for handle in active.values() {
            handle.abort();
        }
        active.len()
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.lock().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn remove(&self, id: ConnectionId) {
        self.lock().remove(&id);
    }
}

struct Tracked {
    id: ConnectionId,
    connections: ActiveConnections,
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.connections.remove(self.id);
    }
}
