//! Session and concurrency coordination for the bot.
//!
//! This crate owns the state machines between a decoded platform event and a
//! model call: which conversation an event belongs to ([`scope`]), what that
//! conversation remembers ([`session`]), the shared typing indicator
//! ([`gate`]), recovery from quota and overload failures ([`retry`]), and the
//! index of delivered responses for reaction follow-ups ([`registry`]).

pub mod gate;
pub mod registry;
pub mod retry;
pub mod scope;
pub mod session;

pub use gate::{ConcurrencyGate, TypingGuard, TypingSignal, STOP_GRACE_PERIOD, TYPING_REFRESH_INTERVAL};
pub use registry::{ResponseRegistry, TrackedResponse, MAX_TRACKED_RESPONSES};
pub use retry::{
    KeyPool, NoRetryUi, RetryCoordinator, RetryError, RetryPrompt, RetryUi, MAX_RETRY_ATTEMPTS,
    RETRY_IDLE_TIMEOUT,
};
pub use scope::{resolve_scope, ScopeInput, ScopeKey};
pub use session::{PendingContext, SessionSettings, SessionStore, DEFAULT_MAX_HISTORY};
