//! The action store: FIFO dispatch, atomic reduction, fan-out to effects
//!
//! `dispatch` enqueues onto an unbounded channel (state-mutating actions are
//! never dropped); a single dispatcher task applies the reducer to the
//! current snapshot, swaps the state pointer, and publishes
//! `(previous, next, action)` on a broadcast channel. Effects dispatching
//! further actions simply enqueue them - recursion becomes iteration.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use super::action::Action;
use super::reducer::{reduce, ReducerContext};
use super::state::StoreState;
use crate::error::{Error, Result};

/// Broadcast capacity for state changes. Generous: a lagging effect loses
/// oldest events, and state-mutating work must therefore live in the
/// dispatcher/reducer, not in subscribers.
const CHANGE_CHANNEL_CAPACITY: usize = 4096;

/// A reduced action, published to subscribers.
#[derive(Debug, Clone)]
pub struct StateChange {
    /// Snapshot before the action
    pub previous: Arc<StoreState>,
    /// Snapshot after the action
    pub next: Arc<StoreState>,
    /// The action that produced the change
    pub action: Action,
}

/// Single-dispatcher action store.
pub struct Store {
    tx: mpsc::UnboundedSender<Action>,
    state: Arc<RwLock<Arc<StoreState>>>,
    changes: broadcast::Sender<StateChange>,
    dispatcher: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl Store {
    /// Create the store and spawn its dispatcher task.
    pub fn new(ctx: ReducerContext) -> Arc<Self> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Action>();
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        let state = Arc::new(RwLock::new(Arc::new(StoreState::default())));

        let store = Arc::new(Self {
            tx,
            state: state.clone(),
            changes: changes.clone(),
            dispatcher: parking_lot::Mutex::new(None),
        });

        let handle = tokio::spawn(async move {
            while let Some(action) = rx.recv().await {
                let previous = state.read().clone();
                let next = Arc::new(reduce(&previous, &action, ctx));
                *state.write() = next.clone();

                tracing::trace!(
                    "Dispatched '{}' for session {:?}",
                    action.kind(),
                    action.session_id()
                );

                // Err just means no subscriber is listening right now
                let _ = changes.send(StateChange {
                    previous,
                    next,
                    action,
                });
            }
            tracing::debug!("Store dispatcher stopped");
        });
        *store.dispatcher.lock() = Some(handle);

        store
    }

    /// Enqueue an action. Fails only after shutdown.
    pub fn dispatch(&self, action: Action) -> Result<()> {
        self.tx
            .send(action)
            .map_err(|e| Error::Store(format!("dispatch after shutdown: {}", e.0.kind())))
    }

    /// Current immutable state snapshot.
    pub fn state(&self) -> Arc<StoreState> {
        self.state.read().clone()
    }

    /// Subscribe to every state change.
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.changes.subscribe()
    }

    /// Stop the dispatcher. Queued actions are dropped.
    pub fn shutdown(&self) {
        if let Some(handle) = self.dispatcher.lock().take() {
            handle.abort();
        }
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        self.shutdown();
    }
}
