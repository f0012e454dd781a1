// crates/strata/src/loader/inflight.rs
// At most one in-flight read per key; late callers join the running read

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use strata_types::LayerKey;

pub type SharedRead<T> = Shared<BoxFuture<'static, T>>;

/// What `join_or_start` did for a caller
pub enum Flight<T: Clone> {
    /// An identical read was already running
    Joined(SharedRead<T>),
    /// This caller started the read
    Started(SharedRead<T>),
    /// The starter declined to read and answered directly
    Declined(T),
}

struct Running<T: Clone> {
    id: u64,
    read: SharedRead<T>,
}

pub struct InFlight<T: Clone> {
    reads: Mutex<(u64, HashMap<LayerKey, Running<T>>)>,
}

impl<T: Clone + Send + Sync + 'static> InFlight<T> {
    pub fn new() -> Self {
        Self {
            reads: Mutex::new((0, HashMap::new())),
        }
    }

    /// Join the read running for `key`, or call `start` to begin one.
    ///
    /// `start` runs under the table lock and receives the id to pass to
    /// [`finish`](Self::finish). It must not block.
    pub fn join_or_start<F>(&self, key: &LayerKey, start: F) -> Flight<T>
    where
        F: FnOnce(u64) -> Result<BoxFuture<'static, T>, T>,
    {
        let mut guard = self.reads.lock().unwrap_or_else(PoisonError::into_inner);
        let (next_id, reads) = &mut *guard;

        if let Some(running) = reads.get(key) {
            return Flight::Joined(running.read.clone());
        }

        *next_id += 1;
        let id = *next_id;
        match start(id) {
            Ok(fut) => {
                let read = fut.shared();
                reads.insert(
                    key.clone(),
                    Running {
                        id,
                        read: read.clone(),
                    },
                );
                Flight::Started(read)
            }
            Err(answer) => Flight::Declined(answer),
        }
    }

    /// Remove the entry for `key` if it still belongs to read `id`
    pub fn finish(&self, key: &LayerKey, id: u64) {
        let mut guard = self.reads.lock().unwrap_or_else(PoisonError::into_inner);
        let reads = &mut guard.1;
        if reads.get(key).is_some_and(|r| r.id == id) {
            reads.remove(key);
        }
    }

    pub fn len(&self) -> usize {
        self.reads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .1
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Clone + Send + Sync + 'static> Default for InFlight<T> {
    fn default() -> Self {
        Self::new()
    }
}
