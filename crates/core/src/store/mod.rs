//! Action store: event bus + immutable state
//!
//! Actions go in through [`Store::dispatch`]; pure reducers fold them into
//! the immutable state map; subscribers (effects, transports) receive every
//! `(previous, next, action)` triple. The store knows nothing about FSMs,
//! queues, or providers - all policy lives in effects.

pub mod action;
pub mod reducer;
pub mod state;
#[allow(clippy::module_inception)]
pub mod store;

pub use action::{Action, ActionKind, ActionRole, WakeSource};
pub use reducer::ReducerContext;
pub use state::{
    expired_session_ids, find_session_by_request_id, session_audio_config, Session, StoreState,
    StoreStats,
};
pub use store::{StateChange, Store};
