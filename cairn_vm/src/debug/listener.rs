//! The breakpoint listener.
//!
//! A [`Listener`] binds itself to a [`DebugHub`] and services breakpoints one
//! at a time: each [`Listener::wait_for_breakpoint`] call starts a handling
//! unit that receives exactly one suspension, runs the handler on its
//! context, and resumes the task.
//!
//! # Example
//!
//! ```
//! use cairn_vm::debug::{DebugHub, Listener};
//! use std::sync::Arc;
//!
//! let hub = Arc::new(DebugHub::new());
//! let listener = Listener::new(Arc::clone(&hub));
//! listener.register().unwrap();
//! assert!(listener.register().is_err());
//!
//! let waiter = listener
//!     .wait_for_breakpoint(|ctx| println!("stopped at {}", ctx.ip()))
//!     .unwrap();
//! listener.unregister();
//! assert!(waiter.join().is_err());
//! ```

use super::context::ExecutionContext;
use super::hub::DebugHub;
use super::suspension::SuspensionId;
use super::DebugError;
use crate::error::panic_message;
use crate::task::TaskRef;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Process-unique listener identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener#{}", self.0)
    }
}

// =============================================================================
// Listener
// =============================================================================

/// Observer of breakpoint notifications.
///
/// Dropping a registered listener unregisters it.
pub struct Listener {
    id: ListenerId,
    hub: Arc<DebugHub>,
    units: AtomicU64,
}

impl Listener {
    /// Create an unregistered listener for `hub`.
    pub fn new(hub: Arc<DebugHub>) -> Self {
        Self {
            id: ListenerId::next(),
            hub,
            units: AtomicU64::new(0),
        }
    }

    /// Create an unregistered listener for the process-wide hub.
    pub fn global() -> Self {
        Self::new(DebugHub::global())
    }

    /// Identifier.
    #[inline]
    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// The hub this listener binds to.
    #[inline]
    pub fn hub(&self) -> &Arc<DebugHub> {
        &self.hub
    }

    /// Bind as the hub's listener.
    ///
    /// Fails with [`DebugError::AlreadyRegistered`] if any listener,
    /// including this one, is already bound.
    pub fn register(&self) -> Result<(), DebugError> {
        self.hub.bind(self.id)
    }

    /// Release the binding.
    ///
    /// Outstanding handling units fail with [`DebugError::ChannelClosed`] and
    /// a breakpoint not yet received releases its task the same way. Returns
    /// `false` if this listener was not bound.
    pub fn unregister(&self) -> bool {
        self.hub.unbind(self.id)
    }

    /// Whether this listener holds the binding.
    pub fn is_registered(&self) -> bool {
        self.hub.bound_listener() == Some(self.id)
    }

    /// Service the next breakpoint with `handler`.
    ///
    /// Starts a handling unit that receives one suspension, runs `handler`
    /// on its context, and then resumes the task. The task is resumed even
    /// if the handler panics; the panic is reported through
    /// [`BreakpointWaiter::join`].
    pub fn wait_for_breakpoint<F>(&self, handler: F) -> Result<BreakpointWaiter, DebugError>
    where
        F: FnOnce(&ExecutionContext) + Send + 'static,
    {
        let channel = self.hub.channel_for(self.id)?;
        let hub = Arc::clone(&self.hub);
        let timeout = hub.config().handoff_timeout;
        let unit = self.units.fetch_add(1, Ordering::Relaxed);

        let handle = thread::Builder::new()
            .name(format!("cairn-debug-{}-{}", self.id.0, unit))
            .spawn(move || -> Result<BreakpointReport, DebugError> {
                let suspension = channel.receive_with(timeout)?;
                drop(channel);

                let context = suspension.context_arc();
                debug!(
                    task = %suspension.task(),
                    suspension = %suspension.id(),
                    ip = context.ip(),
                    "handling breakpoint"
                );

                let start = Instant::now();
                let outcome = catch_unwind(AssertUnwindSafe(|| handler(&context)));
                let handler_time = start.elapsed();
                hub.stats().record_handler_time(handler_time);

                let resumed = suspension.resume();
                if let Err(payload) = outcome {
                    let message = panic_message(payload.as_ref());
                    warn!(suspension = %suspension.id(), %message, "breakpoint handler panicked");
                    return Err(DebugError::HandlerPanicked(message));
                }
                resumed?;

                Ok(BreakpointReport {
                    suspension: suspension.id(),
                    task: suspension.task().clone(),
                    context,
                    handler_time,
                })
            })
            .map_err(|e| DebugError::Spawn(e.to_string()))?;

        Ok(BreakpointWaiter { handle })
    }

    /// Resume the next breakpoint without inspecting it.
    pub fn resume_next(&self) -> Result<BreakpointWaiter, DebugError> {
        self.wait_for_breakpoint(|_| {})
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.unregister();
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("id", &self.id)
            .field("registered", &self.is_registered())
            .finish()
    }
}

// =============================================================================
// Waiter and Report
// =============================================================================

/// Handle to a running handling unit.
#[derive(Debug)]
pub struct BreakpointWaiter {
    handle: JoinHandle<Result<BreakpointReport, DebugError>>,
}

impl BreakpointWaiter {
    /// Whether the unit has finished.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the unit to finish its breakpoint cycle.
    pub fn join(self) -> Result<BreakpointReport, DebugError> {
        self.handle
            .join()
            .map_err(|payload| DebugError::HandlerPanicked(panic_message(payload.as_ref())))?
    }
}

/// Outcome of one serviced breakpoint.
#[derive(Debug, Clone)]
pub struct BreakpointReport {
    /// The suspension that was serviced.
    pub suspension: SuspensionId,
    /// The task that was suspended.
    pub task: TaskRef,
    /// The captured context.
    pub context: Arc<ExecutionContext>,
    /// Wall-clock time spent in the handler.
    pub handler_time: Duration,
}

impl BreakpointReport {
    /// Position the task was suspended at.
    #[inline]
    pub fn ip(&self) -> u32 {
        self.context.ip()
    }

    /// Qualified name of the suspended function.
    #[inline]
    pub fn function(&self) -> &str {
        self.context.function_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_register_twice_fails() {
        let hub = Arc::new(DebugHub::new());
        let first = Listener::new(Arc::clone(&hub));
        let second = Listener::new(Arc::clone(&hub));

        first.register().unwrap();
        assert_eq!(first.register(), Err(DebugError::AlreadyRegistered));
        assert_eq!(second.register(), Err(DebugError::AlreadyRegistered));
        assert!(first.is_registered());
        assert!(!second.is_registered());
    }

    #[test]
    fn test_rebind_after_unregister() {
        let hub = Arc::new(DebugHub::new());
        let first = Listener::new(Arc::clone(&hub));
        first.register().unwrap();
        assert!(first.unregister());
        assert!(!first.unregister());

        let second = Listener::new(Arc::clone(&hub));
        second.register().unwrap();
        assert!(second.is_registered());
    }

    #[test]
    fn test_drop_unregisters() {
        let hub = Arc::new(DebugHub::new());
        {
            let listener = Listener::new(Arc::clone(&hub));
            listener.register().unwrap();
            assert!(hub.is_bound());
        }
        assert!(!hub.is_bound());
    }

    #[test]
    fn test_wait_requires_registration() {
        let hub = Arc::new(DebugHub::new());
        let listener = Listener::new(hub);
        assert_eq!(
            listener.wait_for_breakpoint(|_| {}).unwrap_err(),
            DebugError::NoListener
        );
    }

    #[test]
    fn test_unregister_fails_outstanding_waiters() {
        let hub = Arc::new(DebugHub::new());
        let listener = Listener::new(hub);
        listener.register().unwrap();
        let waiter = listener.resume_next().unwrap();

        std::thread::sleep(Duration::from_millis(10));
        assert!(!waiter.is_finished());
        listener.unregister();
        assert_eq!(waiter.join().unwrap_err(), DebugError::ChannelClosed);
    }

    #[test]
    fn test_waiter_timeout() {
        let timeout = Duration::from_millis(10);
        let hub = Arc::new(DebugHub::with_config(crate::DebugConfig::with_timeout(timeout)));
        let listener = Listener::new(hub);
        listener.register().unwrap();
        let waiter = listener.resume_next().unwrap();
        assert_eq!(waiter.join().unwrap_err(), DebugError::Timeout(timeout));
    }
}
