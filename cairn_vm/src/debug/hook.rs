//! The `yield_debugger` instruction handler.

use super::context::ExecutionContext;
use super::hub::DebugHub;
use super::suspension::Suspension;
use super::DebugError;
use crate::task::TaskRef;
use tracing::{debug, warn};

/// Suspend `task` at a breakpoint and block until the listener resumes it.
///
/// The suspension is sent over the hub's debug channel; the call then waits
/// on the suspension's control channel. Fails fast with
/// [`DebugError::NoListener`] when nothing is bound.
pub(crate) fn yield_debugger(
    hub: &DebugHub,
    task: &TaskRef,
    context: ExecutionContext,
) -> Result<(), DebugError> {
    let timeout = hub.config().handoff_timeout;
    hub.stats().record_breakpoint();

    let ip = context.ip();
    let (suspension, token) = Suspension::new(task.clone(), context);
    debug!(
        %task,
        suspension = %token.id(),
        function = suspension.context().function_name(),
        ip,
        "breakpoint hit"
    );

    let sent = hub
        .debug_channel()
        .and_then(|channel| channel.send_with(suspension, timeout));
    if let Err(err) = sent {
        token.abandon();
        hub.stats().record_abandoned();
        warn!(%task, suspension = %token.id(), error = %err, "breakpoint not delivered");
        return Err(err);
    }

    match token.await_resume(timeout) {
        Ok(()) => {
            hub.stats().record_resume();
            debug!(%task, suspension = %token.id(), "resumed");
            Ok(())
        }
        Err(err) => {
            hub.stats().record_abandoned();
            warn!(%task, suspension = %token.id(), error = %err, "suspension abandoned");
            Err(err)
        }
    }
}
