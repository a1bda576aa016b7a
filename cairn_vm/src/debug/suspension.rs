//! Suspension records and the resume handshake.
//!
//! A suspension is split in two halves when a breakpoint fires:
//!
//! - [`Suspension`] travels over the debug channel to the listener and is the
//!   only way to release the task.
//! - [`SuspensionToken`] stays with the task, which blocks on it until the
//!   resume signal arrives.
//!
//! Both share one single-use control channel.

use super::channel::Channel;
use super::context::ExecutionContext;
use super::DebugError;
use crate::task::TaskRef;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Process-unique suspension identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SuspensionId(u64);

impl SuspensionId {
    /// Allocate the next identifier.
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw value.
    #[inline]
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SuspensionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "suspension#{}", self.0)
    }
}

// =============================================================================
// State
// =============================================================================

/// Lifecycle of a suspension.
///
/// `Created → AwaitingResume → Resumed`, or `Abandoned` from either of the
/// first two states when the handoff fails.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SuspensionState {
    /// The breakpoint fired and the context was captured.
    Created = 0,
    /// The task is blocked on its control channel.
    AwaitingResume = 1,
    /// The resume signal was received.
    Resumed = 2,
    /// The handoff failed before a resume was received.
    Abandoned = 3,
}

impl SuspensionState {
    #[inline]
    fn from_u8(v: u8) -> Self {
        match v {
            0 => SuspensionState::Created,
            1 => SuspensionState::AwaitingResume,
            2 => SuspensionState::Resumed,
            _ => SuspensionState::Abandoned,
        }
    }

    /// Whether no further transition is possible.
    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(self, SuspensionState::Resumed | SuspensionState::Abandoned)
    }
}

struct Shared {
    state: AtomicU8,
    resume_sent: AtomicBool,
    control: Channel<()>,
}

impl Shared {
    #[inline]
    fn state(&self) -> SuspensionState {
        SuspensionState::from_u8(self.state.load(Ordering::Acquire))
    }

    #[inline]
    fn transition(&self, from: SuspensionState, to: SuspensionState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Move to `Abandoned` unless already terminal.
    fn abandon(&self) -> bool {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            if SuspensionState::from_u8(current).is_terminal() {
                return false;
            }
            match self.state.compare_exchange_weak(
                current,
                SuspensionState::Abandoned as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }
}

// =============================================================================
// Suspension
// =============================================================================

/// A suspended task as seen by the listener.
///
/// Dropping a suspension that was never resumed closes its control channel,
/// so the task fails with [`DebugError::ChannelClosed`] instead of hanging.
pub struct Suspension {
    id: SuspensionId,
    task: TaskRef,
    context: Arc<ExecutionContext>,
    shared: Arc<Shared>,
}

impl Suspension {
    /// Create the listener half and the task half of a new suspension.
    pub(crate) fn new(task: TaskRef, context: ExecutionContext) -> (Suspension, SuspensionToken) {
        let id = SuspensionId::next();
        let shared = Arc::new(Shared {
            state: AtomicU8::new(SuspensionState::Created as u8),
            resume_sent: AtomicBool::new(false),
            control: Channel::new(),
        });
        let token = SuspensionToken {
            id,
            shared: Arc::clone(&shared),
        };
        let suspension = Suspension {
            id,
            task,
            context: Arc::new(context),
            shared,
        };
        (suspension, token)
    }

    /// Identifier.
    #[inline]
    pub fn id(&self) -> SuspensionId {
        self.id
    }

    /// The suspended task.
    #[inline]
    pub fn task(&self) -> &TaskRef {
        &self.task
    }

    /// Captured context.
    #[inline]
    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    /// Shared handle to the captured context, usable after resuming.
    #[inline]
    pub fn context_arc(&self) -> Arc<ExecutionContext> {
        Arc::clone(&self.context)
    }

    /// Current lifecycle state.
    #[inline]
    pub fn state(&self) -> SuspensionState {
        self.shared.state()
    }

    /// Whether a resume signal has been sent.
    #[inline]
    pub fn is_resumed(&self) -> bool {
        self.shared.resume_sent.load(Ordering::Acquire)
    }

    /// Release the task.
    ///
    /// Only the first call sends; later calls fail with
    /// [`DebugError::AlreadyResumed`]. Fails with
    /// [`DebugError::ChannelClosed`] if the task already gave up waiting.
    pub fn resume(&self) -> Result<(), DebugError> {
        if self.shared.resume_sent.swap(true, Ordering::AcqRel) {
            return Err(DebugError::AlreadyResumed);
        }
        self.shared.control.send(())
    }
}

impl Drop for Suspension {
    fn drop(&mut self) {
        if !self.shared.resume_sent.load(Ordering::Acquire) {
            self.shared.control.close();
        }
    }
}

impl fmt::Debug for Suspension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Suspension")
            .field("id", &self.id)
            .field("task", &self.task)
            .field("ip", &self.context.ip())
            .field("state", &self.state())
            .finish()
    }
}

// =============================================================================
// Token
// =============================================================================

/// The task's half of a suspension.
pub(crate) struct SuspensionToken {
    id: SuspensionId,
    shared: Arc<Shared>,
}

impl SuspensionToken {
    #[inline]
    pub(crate) fn id(&self) -> SuspensionId {
        self.id
    }

    #[inline]
    pub(crate) fn state(&self) -> SuspensionState {
        self.shared.state()
    }

    /// Block until resumed.
    ///
    /// On failure the suspension is marked abandoned and the error returned.
    pub(crate) fn await_resume(&self, timeout: Option<Duration>) -> Result<(), DebugError> {
        if !self
            .shared
            .transition(SuspensionState::Created, SuspensionState::AwaitingResume)
        {
            return Err(DebugError::ChannelClosed);
        }
        let received = self.shared.control.receive_with(timeout);
        self.settle(received)
    }

    /// Turn the outcome of a wait into the suspension's final state.
    ///
    /// A resume that was sent after the wait gave up but before the channel
    /// closed still counts, so the task and the listener agree.
    fn settle(&self, received: Result<(), DebugError>) -> Result<(), DebugError> {
        let resumed = match received {
            Ok(()) => Ok(()),
            Err(err) => match self.shared.control.close_and_drain() {
                Some(()) => Ok(()),
                None => Err(err),
            },
        };
        match resumed {
            Ok(()) => {
                self.shared
                    .transition(SuspensionState::AwaitingResume, SuspensionState::Resumed);
                Ok(())
            }
            Err(err) => {
                self.shared.abandon();
                Err(err)
            }
        }
    }

    /// Mark the suspension abandoned and close its control channel.
    ///
    /// A resume signal still pending in the channel is discarded.
    pub(crate) fn abandon(&self) -> bool {
        self.shared.control.close_and_drain();
        self.shared.abandon()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Frame;
    use crate::module::Module;
    use crate::task::TaskId;
    use cairn_compiler::FunctionBuilder;
    use std::thread;

    fn pair() -> (Suspension, SuspensionToken) {
        let module = Module::new("M");
        let mut builder = FunctionBuilder::new("f");
        builder.emit_yield_debugger();
        let function = module.define_function(builder.finish().unwrap());
        let frame = Frame::new(function, &[]).unwrap();
        let task = TaskRef::new(TaskId::next(), None);
        let context = ExecutionContext::capture(task.clone(), &frame, &[]);
        Suspension::new(task, context)
    }

    #[test]
    fn test_resume_releases_waiter() {
        let (suspension, token) = pair();
        assert_eq!(suspension.state(), SuspensionState::Created);

        let waiter = thread::spawn(move || {
            let result = token.await_resume(None);
            (result, token.state())
        });

        while suspension.state() != SuspensionState::AwaitingResume {
            thread::yield_now();
        }
        suspension.resume().unwrap();

        let (result, state) = waiter.join().unwrap();
        assert_eq!(result, Ok(()));
        assert_eq!(state, SuspensionState::Resumed);
        assert_eq!(suspension.state(), SuspensionState::Resumed);
    }

    #[test]
    fn test_second_resume_fails() {
        let (suspension, token) = pair();
        suspension.resume().unwrap();
        assert_eq!(suspension.resume(), Err(DebugError::AlreadyResumed));
        assert!(suspension.is_resumed());

        // The signal sent before the task blocked is still delivered once.
        assert_eq!(token.await_resume(None), Ok(()));
        assert_eq!(token.state(), SuspensionState::Resumed);
    }

    #[test]
    fn test_drop_without_resume_abandons() {
        let (suspension, token) = pair();
        drop(suspension);
        assert_eq!(token.await_resume(None), Err(DebugError::ChannelClosed));
        assert_eq!(token.state(), SuspensionState::Abandoned);
    }

    #[test]
    fn test_timeout_abandons() {
        let (suspension, token) = pair();
        let timeout = Duration::from_millis(10);
        assert_eq!(token.await_resume(Some(timeout)), Err(DebugError::Timeout(timeout)));
        assert_eq!(suspension.state(), SuspensionState::Abandoned);
        assert_eq!(suspension.resume(), Err(DebugError::ChannelClosed));
    }

    #[test]
    fn test_resume_racing_a_timeout_still_counts() {
        let (suspension, token) = pair();
        assert!(
            token
                .shared
                .transition(SuspensionState::Created, SuspensionState::AwaitingResume)
        );
        // The wait gave up, then the listener's signal landed before the close.
        suspension.resume().unwrap();
        let timeout = Duration::from_millis(10);
        assert_eq!(token.settle(Err(DebugError::Timeout(timeout))), Ok(()));
        assert_eq!(token.state(), SuspensionState::Resumed);
        assert!(token.shared.control.is_closed());
    }

    #[test]
    fn test_abandon_discards_pending_resume() {
        let (suspension, token) = pair();
        suspension.resume().unwrap();
        assert!(token.abandon());
        assert!(token.shared.control.is_empty());
        assert_eq!(token.await_resume(None), Err(DebugError::ChannelClosed));
        assert_eq!(token.state(), SuspensionState::Abandoned);
    }

    #[test]
    fn test_abandon_is_terminal() {
        let (suspension, token) = pair();
        assert!(token.abandon());
        assert!(!token.abandon());
        assert_eq!(suspension.state(), SuspensionState::Abandoned);
        assert!(suspension.state().is_terminal());
    }

    #[test]
    fn test_ids_are_unique() {
        let (a, _ta) = pair();
        let (b, _tb) = pair();
        assert_ne!(a.id(), b.id());
        assert_eq!(a.id(), _ta.id());
    }
}
