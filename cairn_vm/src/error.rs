//! VM error type.

use crate::debug::DebugError;
use cairn_compiler::{BytecodeError, Opcode};
use cairn_core::CairnError;
use std::sync::Arc;
use thiserror::Error;

/// Result alias for VM operations.
pub type VmResult<T> = Result<T, VmError>;

/// Failures raised while running a task.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VmError {
    /// The breakpoint protocol failed (no listener, closed channel, ...).
    #[error(transparent)]
    Debug(#[from] DebugError),

    /// A value operation failed.
    #[error(transparent)]
    Value(#[from] CairnError),

    /// Bytecode could not be built or rewritten.
    #[error(transparent)]
    Bytecode(#[from] BytecodeError),

    /// A call named a function that no enclosing module defines.
    #[error("undefined function '{name}' for {module}")]
    UnknownFunction {
        /// Callee name.
        name: Arc<str>,
        /// Module the lookup started from.
        module: String,
    },

    /// A global was read before it was assigned.
    #[error("undefined global '{name}' in {module}")]
    UndefinedGlobal {
        /// Global name.
        name: Arc<str>,
        /// Module path.
        module: String,
    },

    /// A function was called with the wrong number of arguments.
    #[error("wrong number of arguments for {function} (given {given}, expected {expected})")]
    ArityMismatch {
        /// Callee name.
        function: Arc<str>,
        /// Declared parameter count.
        expected: usize,
        /// Supplied argument count.
        given: usize,
    },

    /// Call depth exceeded `VmConfig::max_recursion_depth`.
    #[error("stack level too deep (limit {0})")]
    RecursionLimit(usize),

    /// An instruction could not be executed.
    #[error("invalid instruction {raw:#010x} at {function}+{pc}")]
    InvalidInstruction {
        /// Function being executed.
        function: Arc<str>,
        /// Instruction index.
        pc: u32,
        /// Raw instruction bits.
        raw: u32,
    },

    /// An instruction named a register outside its frame's register file.
    #[error("register r{register} out of range at {function}+{pc} (frame has {count})")]
    RegisterOutOfRange {
        /// Function being executed.
        function: Arc<str>,
        /// Instruction index.
        pc: u32,
        /// The offending register.
        register: u8,
        /// Registers in the frame.
        count: usize,
    },

    /// A rewrite found a different instruction than the one it edits.
    #[error("expected {expected:?} at {function}+{pc}, found {found:?}")]
    UnexpectedInstruction {
        /// Function being rewritten.
        function: Arc<str>,
        /// Instruction index.
        pc: usize,
        /// Opcode the edit targets.
        expected: Opcode,
        /// Opcode present, if the stream is long enough.
        found: Option<Opcode>,
    },

    /// The module a function was defined in no longer exists.
    #[error("module for {0} has been dropped")]
    ModuleDropped(Arc<str>),

    /// The task's thread could not be started.
    #[error("failed to spawn task: {0}")]
    Spawn(String),

    /// The task's thread panicked.
    #[error("task panicked: {0}")]
    TaskPanicked(String),
}

/// Render a panic payload for error messages.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "<non-string panic payload>".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_errors_convert() {
        let err: VmError = DebugError::NoListener.into();
        assert_eq!(err, VmError::Debug(DebugError::NoListener));
        assert_eq!(err.to_string(), DebugError::NoListener.to_string());
    }

    #[test]
    fn test_value_errors_convert() {
        let err: VmError = CairnError::type_error("bad").into();
        assert_eq!(err.to_string(), "TypeError: bad");
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
        let payload: Box<dyn std::any::Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(payload.as_ref()), "<non-string panic payload>");
    }
}
