//! Tasks: independently scheduled threads of execution.
//!
//! Each task runs on its own named OS thread with its own call stack.

use crate::error::{VmError, VmResult, panic_message};
use crate::function::Function;
use crate::interpreter::Interpreter;
use crate::vm::Vm;
use cairn_core::Value;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::debug;

/// Process-unique task identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl TaskId {
    /// Allocate the next identifier.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw value.
    #[inline]
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}", self.0)
    }
}

/// Identity of a task, cheap to clone.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskRef {
    id: TaskId,
    name: Option<Arc<str>>,
}

impl TaskRef {
    /// Create a task identity.
    pub fn new(id: TaskId, name: Option<Arc<str>>) -> Self {
        Self { id, name }
    }

    /// Identifier.
    #[inline]
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Optional name.
    #[inline]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

impl fmt::Display for TaskRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{}({})", self.id, name),
            None => write!(f, "{}", self.id),
        }
    }
}

// =============================================================================
// Task Builder
// =============================================================================

/// Configures and starts a task.
#[derive(Debug)]
pub struct Task {
    vm: Vm,
    name: Option<Arc<str>>,
}

impl Task {
    /// Start configuring a task on `vm`.
    pub fn new(vm: &Vm) -> Self {
        Self {
            vm: vm.clone(),
            name: None,
        }
    }

    /// Name the task.
    pub fn name(mut self, name: impl Into<Arc<str>>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Call `function` with `args` on a new thread.
    pub fn spawn(self, function: Arc<Function>, args: Vec<Value>) -> VmResult<TaskHandle> {
        let task = TaskRef::new(TaskId::next(), self.name);
        let thread_name = match task.name() {
            Some(name) => format!("cairn-{}", name),
            None => format!("cairn-task-{}", task.id().as_u64()),
        };

        let vm = self.vm;
        let task_ref = task.clone();
        let handle = thread::Builder::new()
            .name(thread_name)
            .spawn(move || {
                debug!(task = %task_ref, function = function.name(), "task started");
                let result = Interpreter::new(vm, task_ref.clone()).run(function, &args);
                debug!(task = %task_ref, ok = result.is_ok(), "task finished");
                result
            })
            .map_err(|e| VmError::Spawn(e.to_string()))?;

        Ok(TaskHandle { task, handle })
    }
}

/// Handle to a running task.
#[derive(Debug)]
pub struct TaskHandle {
    task: TaskRef,
    handle: JoinHandle<VmResult<Value>>,
}

impl TaskHandle {
    /// Task identity.
    #[inline]
    pub fn task(&self) -> &TaskRef {
        &self.task
    }

    /// Task identifier.
    #[inline]
    pub fn id(&self) -> TaskId {
        self.task.id()
    }

    /// Whether the task has finished.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the task's result.
    pub fn join(self) -> VmResult<Value> {
        self.handle
            .join()
            .map_err(|payload| VmError::TaskPanicked(panic_message(payload.as_ref())))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::Module;
    use cairn_compiler::FunctionBuilder;

    #[test]
    fn test_ids_increase() {
        let a = TaskId::next();
        let b = TaskId::next();
        assert!(b > a);
    }

    #[test]
    fn test_task_ref_display() {
        let id = TaskId::next();
        assert_eq!(TaskRef::new(id, None).to_string(), format!("{}", id));
        assert_eq!(
            TaskRef::new(id, Some("worker".into())).to_string(),
            format!("{}(worker)", id)
        );
    }

    #[test]
    fn test_spawn_and_join() {
        let module = Module::new("T");
        let mut builder = FunctionBuilder::new("double");
        let x = builder.define_param("x");
        let r = builder.alloc_register();
        builder.emit_add(r, x, x);
        builder.emit_return(r);
        let function = module.define_function(builder.finish().unwrap());

        let vm = Vm::isolated(Default::default());
        let handle = Task::new(&vm)
            .name("doubler")
            .spawn(function, vec![Value::int(21)])
            .unwrap();
        assert_eq!(handle.task().name(), Some("doubler"));
        assert_eq!(handle.join().unwrap(), Value::int(42));
    }
}
