//! Breakpoint interception.
//!
//! A task that executes `yield_debugger` is suspended and its
//! [`ExecutionContext`] is handed to the registered [`Listener`] over the
//! hub's debug channel. The listener's handling unit inspects the context and
//! then releases the task through the suspension's private control channel.
//!
//! # Protocol
//!
//! ```text
//! task                         debug channel            listener unit
//!  │ yield_debugger                  │                         │
//!  │ capture context                 │                         │
//!  │ send(Suspension) ──────────────▶│                         │
//!  │ receive(control) ...            │ ◀────────── receive()   │
//!  │                                 │       handler(&context) │
//!  │ ◀───────────────────────────────┼──────── resume()        │
//!  │ continue                        │                         │
//! ```
//!
//! Both blocking points are condition-variable backed and unbounded unless
//! [`DebugConfig::handoff_timeout`](crate::DebugConfig) is set.
//!
//! # Starvation
//!
//! Each [`Listener::wait_for_breakpoint`] call services exactly one
//! breakpoint. When more tasks hit breakpoints than there are outstanding
//! waits, the extra tasks stay blocked until another wait is issued.

mod channel;
mod context;
mod hook;
mod hub;
mod listener;
mod stats;
mod suspension;

pub use channel::Channel;
pub use context::{ExecutionContext, FrameSummary, ScopeChain};
pub(crate) use hook::yield_debugger;
pub use hub::DebugHub;
pub use listener::{BreakpointReport, BreakpointWaiter, Listener, ListenerId};
pub use stats::{DebugStats, DebugStatsSnapshot};
pub use suspension::{Suspension, SuspensionId, SuspensionState};

use std::time::Duration;
use thiserror::Error;

/// Failures of the breakpoint protocol.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DebugError {
    /// A listener is already bound to the debug channel.
    #[error("a debug listener is already registered")]
    AlreadyRegistered,

    /// The channel was closed with no value pending.
    #[error("debug channel closed")]
    ChannelClosed,

    /// A breakpoint fired with no listener registered.
    #[error("breakpoint hit with no debug listener registered")]
    NoListener,

    /// The suspension has already been resumed.
    #[error("suspension already resumed")]
    AlreadyResumed,

    /// A bounded handoff did not complete in time.
    #[error("debug handoff timed out after {0:?}")]
    Timeout(Duration),

    /// The breakpoint handler panicked.
    #[error("breakpoint handler panicked: {0}")]
    HandlerPanicked(String),

    /// The handling unit's thread could not be started.
    #[error("failed to start breakpoint handler: {0}")]
    Spawn(String),
}
