//! # Listener Dispatch
//!
//! Keyed listener groups with priority ordering and one-shot waits. The
//! connection dispatches every inbound message through a group keyed by
//! message-type id; job replies go through a second group keyed by job id.
//!
//! Two kinds of consumer:
//!
//! - **Listeners**: persistent callbacks, invoked for every matching
//!   message in descending priority order. Higher priority runs first;
//!   protocol-internal listeners use a high priority so they observe
//!   handshake traffic before application code.
//! - **Waiters**: one-shot futures. Each matching message drains all
//!   pending waiters for its key exactly once. A wait can be registered
//!   before its triggering request is sent, so the reply cannot race past
//!   the waiter.
//!
//! Callbacks never run on the dispatching task: each delivery is handed
//! off to the blocking pool, so a listener that blocks delays its own
//! key's waiters rather than ingestion of later messages. In-flight
//! deliveries are bounded by a semaphore sized from
//! [`ClientConfig::dispatch_workers`](crate::config::ClientConfig).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use tokio::sync::{oneshot, Semaphore};
use tracing::warn;

use crate::error::{ProtocolError, Result};

/// Priority used by protocol-internal listeners so they run ahead of
/// application listeners registered at the default.
pub const INTERNAL_LISTENER_PRIORITY: i32 = 5000;
/// Priority assigned when callers do not care about ordering.
pub const DEFAULT_LISTENER_PRIORITY: i32 = 0;

type Callback<M> = Arc<dyn Fn(M) -> Result<()> + Send + Sync>;

struct ListenerItem<K, M> {
    token: u64,
    key: K,
    priority: i32,
    callback: Callback<M>,
}

struct Waiter<K, M> {
    token: u64,
    key: K,
    tx: oneshot::Sender<M>,
}

struct State<K, M> {
    listeners: Vec<ListenerItem<K, M>>,
    waiters: Vec<Waiter<K, M>>,
}

/// An in-flight one-shot wait. Register with [`ListenerGroup::begin_wait`]
/// before sending the request, then await it with
/// [`ListenerGroup::finish_wait`].
pub struct WaitHandle<M> {
    token: u64,
    rx: oneshot::Receiver<M>,
}

/// Keyed listener registry with bounded, priority-ordered dispatch.
pub struct ListenerGroup<K, M> {
    state: RwLock<State<K, M>>,
    limiter: Arc<Semaphore>,
    next_token: AtomicU64,
}

impl<K, M> ListenerGroup<K, M>
where
    K: PartialEq + Send + Sync + 'static,
    M: Clone + Send + Sync + 'static,
{
    pub fn new(dispatch_workers: usize) -> Self {
        Self {
            state: RwLock::new(State {
                listeners: Vec::new(),
                waiters: Vec::new(),
            }),
            limiter: Arc::new(Semaphore::new(dispatch_workers.max(1))),
            next_token: AtomicU64::new(1),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, State<K, M>> {
        self.state.read().expect("listener state lock poisoned")
    }

    fn write(&self) -> RwLockWriteGuard<'_, State<K, M>> {
        self.state.write().expect("listener state lock poisoned")
    }

    /// Register a persistent callback for `key`. Returns a token for
    /// [`remove`](Self::remove).
    pub fn register(
        &self,
        key: K,
        priority: i32,
        callback: impl Fn(M) -> Result<()> + Send + Sync + 'static,
    ) -> u64 {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        self.write().listeners.push(ListenerItem {
            token,
            key,
            priority,
            callback: Arc::new(callback),
        });
        token
    }

    /// Remove a listener by token. Returns false if it was already gone.
    pub fn remove(&self, token: u64) -> bool {
        let mut state = self.write();
        let before = state.listeners.len();
        state.listeners.retain(|l| l.token != token);
        state.listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.read().listeners.len()
    }

    /// Deliver `message` to every listener and pending waiter registered
    /// for `key`. Callbacks are handed off to the blocking pool and run
    /// there in descending priority order; ties run in registration order.
    /// Waiters fire after the key's callbacks have finished, so state a
    /// listener installs is visible once a wait on the same key resolves.
    /// A failing callback is logged and does not stop delivery.
    pub async fn dispatch(&self, key: &K, message: M) {
        let (callbacks, waiters) = {
            let mut state = self.write();

            let mut callbacks: Vec<(i32, Callback<M>)> = state
                .listeners
                .iter()
                .filter(|l| &l.key == key)
                .map(|l| (l.priority, Arc::clone(&l.callback)))
                .collect();
            callbacks.sort_by(|a, b| b.0.cmp(&a.0));

            let mut waiters = Vec::new();
            let mut i = 0;
            while i < state.waiters.len() {
                if &state.waiters[i].key == key {
                    waiters.push(state.waiters.remove(i));
                } else {
                    i += 1;
                }
            }
            (callbacks, waiters)
        };

        if callbacks.is_empty() {
            for waiter in waiters {
                // Receiver may have been dropped by a timed-out wait.
                let _ = waiter.tx.send(message.clone());
            }
            return;
        }

        // The semaphore is never closed; acquire only fails after close.
        let permit = Arc::clone(&self.limiter).acquire_owned().await.ok();
        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            for (_, callback) in callbacks {
                if let Err(err) = callback(message.clone()) {
                    warn!(error = %err, "listener callback failed");
                }
            }
            for waiter in waiters {
                // Receiver may have been dropped by a timed-out wait.
                let _ = waiter.tx.send(message.clone());
            }
        });
    }

    /// Register a one-shot wait for the next message keyed `key`. The wait
    /// is live from this call, so a request sent afterwards cannot have its
    /// reply slip past.
    pub fn begin_wait(&self, key: K) -> WaitHandle<M> {
        let (tx, rx) = oneshot::channel();
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        self.write().waiters.push(Waiter { token, key, tx });
        WaitHandle { token, rx }
    }

    /// Await a registered wait with a deadline. Timing out deregisters the
    /// waiter; a wait failed by [`fail_all`](Self::fail_all) reports the
    /// connection as closed.
    pub async fn finish_wait(&self, handle: WaitHandle<M>, timeout: Duration) -> Result<M> {
        match tokio::time::timeout(timeout, handle.rx).await {
            Ok(Ok(message)) => Ok(message),
            Ok(Err(_)) => Err(ProtocolError::ConnectionClosed),
            Err(_) => {
                self.write().waiters.retain(|w| w.token != handle.token);
                Err(ProtocolError::Timeout)
            }
        }
    }

    /// Abandon a registered wait without consuming a message.
    pub fn cancel_wait(&self, handle: WaitHandle<M>) {
        self.write().waiters.retain(|w| w.token != handle.token);
    }

    /// Register and await in one step, for callers with no request to send
    /// in between.
    pub async fn wait_for(&self, key: K, timeout: Duration) -> Result<M> {
        let handle = self.begin_wait(key);
        self.finish_wait(handle, timeout).await
    }

    /// Drop every pending waiter, waking each with a closed-connection
    /// error. Persistent listeners are kept.
    pub fn fail_all(&self) {
        self.write().waiters.clear();
    }
}

/// Job-id allocation plus a listener group keyed by job id. Replies carry
/// the requester's job id in their header target field and are routed here
/// by the client.
pub struct JobHandler<M> {
    group: ListenerGroup<i64, M>,
    next_job_id: AtomicU64,
}

impl<M> JobHandler<M>
where
    M: Clone + Send + Sync + 'static,
{
    pub fn new(dispatch_workers: usize) -> Self {
        Self {
            group: ListenerGroup::new(dispatch_workers),
            next_job_id: AtomicU64::new(1),
        }
    }

    /// Mint a fresh source job id, unique for the lifetime of the client.
    pub fn mint_job_id(&self) -> i64 {
        self.next_job_id.fetch_add(1, Ordering::Relaxed) as i64
    }

    pub fn begin_wait(&self, job_id: i64) -> WaitHandle<M> {
        self.group.begin_wait(job_id)
    }

    pub async fn finish_wait(&self, handle: WaitHandle<M>, timeout: Duration) -> Result<M> {
        self.group.finish_wait(handle, timeout).await
    }

    pub fn cancel_wait(&self, handle: WaitHandle<M>) {
        self.group.cancel_wait(handle);
    }

    /// Route a reply to the wait registered under `job_id`.
    pub async fn complete(&self, job_id: i64, message: M) {
        self.group.dispatch(&job_id, message).await;
    }

    pub fn fail_all(&self) {
        self.group.fail_all();
    }
}
