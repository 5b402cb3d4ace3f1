//! Single-writer async runtime and event stream APIs.

/// Event stream types emitted by the runtime.
pub mod events;
/// Handle and command loop implementation.
pub mod handle;

pub use events::IdentityEvent;
pub use handle::{GradingSource, IdentityHandle, RuntimeConfig, RuntimeError, spawn_identity_service};
