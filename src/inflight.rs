//! Single-flight registry: coalesces concurrent computations for the same key.
//!
//! The first caller for a key spawns the computation as a tokio task and
//! registers a shared handle to it; later callers for that key join the same
//! handle until the task finishes. The task removes its own registry entry
//! before its result becomes observable, so a call arriving after completion
//! always starts a fresh computation.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use futures::future::{BoxFuture, FutureExt, Shared};
use thiserror::Error;
use tokio::task::{AbortHandle, JoinError};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlightError {
    /// The task was aborted, normally by [`SingleFlight::cancel_all`].
    #[error("request was cancelled")]
    Cancelled,
    #[error("request task panicked")]
    Panicked,
}

impl From<JoinError> for FlightError {
    fn from(err: JoinError) -> Self {
        if err.is_cancelled() {
            FlightError::Cancelled
        } else {
            FlightError::Panicked
        }
    }
}

type SharedFlight<T> = Shared<BoxFuture<'static, Result<T, FlightError>>>;

struct Flight<T> {
    id: u64,
    future: SharedFlight<T>,
    abort: AbortHandle,
}

struct Registry<T> {
    flights: HashMap<String, Flight<T>>,
    next_id: u64,
}

pub struct SingleFlight<T> {
    registry: Arc<Mutex<Registry<T>>>,
}

impl<T> Default for SingleFlight<T> {
    fn default() -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry {
                flights: HashMap::new(),
                next_id: 0,
            })),
        }
    }
}

impl<T> SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `make()` for `key`, or joins the computation already running for it.
    ///
    /// `make` is only called when no computation for `key` is pending. The
    /// computation runs on its own task, so it completes (and its side
    /// effects happen) even if every caller stops waiting.
    ///
    /// Must be called within a tokio runtime.
    pub async fn run<F, Fut>(&self, key: &str, make: F) -> Result<T, FlightError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let future = {
            let mut registry = lock(&self.registry);

            if let Some(flight) = registry.flights.get(key) {
                tracing::debug!(key = %key, "Joining in-flight request");
                flight.future.clone()
            } else {
                let id = registry.next_id;
                registry.next_id += 1;

                let guard = FlightGuard {
                    registry: Arc::downgrade(&self.registry),
                    key: key.to_owned(),
                    id,
                };
                let computation = make();
                // The registry lock is held until the entry is inserted, so the
                // guard cannot run its removal before the entry exists.
                let handle = tokio::spawn(async move {
                    let _guard = guard;
                    computation.await
                });
                let abort = handle.abort_handle();
                let future = handle
                    .map(|joined| joined.map_err(FlightError::from))
                    .boxed()
                    .shared();

                registry.flights.insert(
                    key.to_owned(),
                    Flight {
                        id,
                        future: future.clone(),
                        abort,
                    },
                );
                future
            }
        };

        future.await
    }

    /// Number of keys with a pending computation.
    pub fn len(&self) -> usize {
        lock(&self.registry).flights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Aborts every pending computation. Their waiters receive
    /// [`FlightError::Cancelled`]. Returns how many were aborted.
    pub fn cancel_all(&self) -> usize {
        let flights: Vec<Flight<T>> = lock(&self.registry)
            .flights
            .drain()
            .map(|(_, flight)| flight)
            .collect();

        for flight in &flights {
            flight.abort.abort();
        }
        flights.len()
    }
}

/// Removes the registry entry when the computation task finishes, panics or
/// is aborted.
struct FlightGuard<T> {
    registry: Weak<Mutex<Registry<T>>>,
    key: String,
    id: u64,
}

impl<T> Drop for FlightGuard<T> {
    fn drop(&mut self) {
        let Some(registry) = self.registry.upgrade() else {
            return;
        };
        let mut registry = lock(&registry);
        // Only remove our own entry; after cancel_all the key may belong to a newer flight
        if registry
            .flights
            .get(&self.key)
            .is_some_and(|flight| flight.id == self.id)
        {
            registry.flights.remove(&self.key);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
