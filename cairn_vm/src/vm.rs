//! The shared VM handle.

use crate::config::VmConfig;
use crate::debug::DebugHub;
use crate::error::VmResult;
use crate::function::Function;
use crate::interpreter::Interpreter;
use crate::task::{Task, TaskHandle, TaskId, TaskRef};
use cairn_core::Value;
use std::sync::Arc;

struct VmInner {
    config: VmConfig,
    hub: Arc<DebugHub>,
}

/// Configuration and debug wiring shared by every task.
///
/// Cloning is cheap; clones share the same hub.
#[derive(Clone)]
pub struct Vm {
    inner: Arc<VmInner>,
}

impl Vm {
    /// Create a VM wired to the process-wide [`DebugHub`].
    ///
    /// The global hub is configured from the environment, so
    /// `config.debug` does not apply here; use [`Vm::isolated`] or
    /// [`Vm::with_hub`] to control it.
    pub fn new(config: VmConfig) -> Self {
        Self::with_hub(config, DebugHub::global())
    }

    /// Create a VM with its own hub built from `config.debug`.
    pub fn isolated(config: VmConfig) -> Self {
        let hub = Arc::new(DebugHub::with_config(config.debug));
        Self::with_hub(config, hub)
    }

    /// Create a VM wired to `hub`.
    pub fn with_hub(config: VmConfig, hub: Arc<DebugHub>) -> Self {
        Self {
            inner: Arc::new(VmInner { config, hub }),
        }
    }

    /// Configuration.
    #[inline]
    pub fn config(&self) -> &VmConfig {
        &self.inner.config
    }

    /// The hub breakpoints are sent to.
    #[inline]
    pub fn debug_hub(&self) -> &Arc<DebugHub> {
        &self.inner.hub
    }

    /// Run `function` on a new task.
    pub fn spawn(&self, function: Arc<Function>, args: Vec<Value>) -> VmResult<TaskHandle> {
        Task::new(self).spawn(function, args)
    }

    /// Run `function` to completion on the calling thread.
    pub fn call(&self, function: Arc<Function>, args: &[Value]) -> VmResult<Value> {
        let task = TaskRef::new(TaskId::next(), None);
        Interpreter::new(self.clone(), task).run(function, args)
    }
}

impl std::fmt::Debug for Vm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vm")
            .field("config", &self.inner.config)
            .field("hub", &self.inner.hub)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DebugConfig;
    use std::time::Duration;

    #[test]
    fn test_clones_share_hub() {
        let vm = Vm::isolated(VmConfig::default());
        let other = vm.clone();
        assert!(Arc::ptr_eq(vm.debug_hub(), other.debug_hub()));
    }

    #[test]
    fn test_isolated_uses_debug_config() {
        let config = VmConfig {
            debug: DebugConfig::with_timeout(Duration::from_secs(1)),
            ..VmConfig::default()
        };
        let vm = Vm::isolated(config);
        assert_eq!(vm.debug_hub().config().handoff_timeout, Some(Duration::from_secs(1)));
        assert!(!Arc::ptr_eq(vm.debug_hub(), &DebugHub::global()));
    }

    #[test]
    fn test_new_uses_global_hub() {
        let vm = Vm::new(VmConfig::default());
        assert!(Arc::ptr_eq(vm.debug_hub(), &DebugHub::global()));
    }
}
