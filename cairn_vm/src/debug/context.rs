//! Execution context captured at a breakpoint.

use crate::frame::Frame;
use crate::module::Module;
use crate::scope::StaticScope;
use crate::task::{TaskId, TaskRef};
use cairn_compiler::CodeObject;
use cairn_core::Value;
use smallvec::SmallVec;
use std::fmt;
use std::sync::{Arc, Weak};

// =============================================================================
// Scope Chain
// =============================================================================

/// Lexical scope of a suspended frame.
///
/// Both references are weak: holding a context never keeps a module alive.
#[derive(Debug, Clone)]
pub struct ScopeChain {
    module: Weak<Module>,
    parent: Option<Weak<StaticScope>>,
}

impl ScopeChain {
    /// Snapshot the chain of a static scope.
    pub fn of(scope: &StaticScope) -> Self {
        Self {
            module: scope.module_weak().clone(),
            parent: scope.parent_weak().cloned(),
        }
    }

    /// The module the frame's code was defined in.
    pub fn module(&self) -> Option<Arc<Module>> {
        self.module.upgrade()
    }

    /// The enclosing scope, if any.
    pub fn parent(&self) -> Option<Arc<StaticScope>> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }
}

// =============================================================================
// Frame Summary
// =============================================================================

/// One backtrace entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameSummary {
    /// Qualified function name.
    pub function: Arc<str>,
    /// Instruction index of the next instruction to run.
    pub ip: u32,
    /// Source line for `ip`, when known.
    pub line: Option<u32>,
}

impl FrameSummary {
    fn of(frame: &Frame) -> Self {
        Self {
            function: frame.code.qualname.clone(),
            ip: frame.ip,
            line: frame.current_line(),
        }
    }
}

impl fmt::Display for FrameSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "{}+{} (line {})", self.function, self.ip, line),
            None => write!(f, "{}+{}", self.function, self.ip),
        }
    }
}

// =============================================================================
// Execution Context
// =============================================================================

/// Immutable snapshot of a suspended call.
///
/// The position is the index of the instruction that runs once the task
/// resumes, i.e. the one right after the breakpoint marker.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    task: TaskRef,
    ip: u32,
    line: Option<u32>,
    code: Arc<CodeObject>,
    scope: ScopeChain,
    locals: Box<[(Arc<str>, Value)]>,
    backtrace: SmallVec<[FrameSummary; 4]>,
}

impl ExecutionContext {
    /// Capture `frame`, with `callers` ordered outermost first.
    pub(crate) fn capture(task: TaskRef, frame: &Frame, callers: &[Frame]) -> Self {
        let locals = frame
            .code
            .locals
            .iter()
            .zip(frame.registers.iter())
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();

        let backtrace = std::iter::once(frame)
            .chain(callers.iter().rev())
            .map(FrameSummary::of)
            .collect();

        Self {
            task,
            ip: frame.ip,
            line: frame.current_line(),
            code: Arc::clone(&frame.code),
            scope: ScopeChain::of(frame.function.scope()),
            locals,
            backtrace,
        }
    }

    /// The suspended task.
    #[inline]
    pub fn task(&self) -> &TaskRef {
        &self.task
    }

    /// Identity of the suspended task.
    #[inline]
    pub fn task_id(&self) -> TaskId {
        self.task.id()
    }

    /// Bytecode position.
    #[inline]
    pub fn ip(&self) -> u32 {
        self.ip
    }

    /// Source line for the position.
    #[inline]
    pub fn line(&self) -> Option<u32> {
        self.line
    }

    /// The code unit being executed when the breakpoint fired.
    #[inline]
    pub fn code(&self) -> &Arc<CodeObject> {
        &self.code
    }

    /// Whether the snapshot was taken while running `code`.
    pub fn is_code(&self, code: &Arc<CodeObject>) -> bool {
        Arc::ptr_eq(&self.code, code)
    }

    /// Qualified name of the suspended function.
    #[inline]
    pub fn function_name(&self) -> &str {
        &self.code.qualname
    }

    /// Lexical scope chain.
    #[inline]
    pub fn scope(&self) -> &ScopeChain {
        &self.scope
    }

    /// Defining module, if it is still alive.
    pub fn module(&self) -> Option<Arc<Module>> {
        self.scope.module()
    }

    /// Path of the defining module, e.g. `Outer::Inner`.
    pub fn module_name(&self) -> Option<String> {
        self.scope.module().map(|m| m.path())
    }

    /// Named locals at the time of capture.
    #[inline]
    pub fn locals(&self) -> &[(Arc<str>, Value)] {
        &self.locals
    }

    /// Look up a local by name.
    pub fn local(&self, name: &str) -> Option<&Value> {
        self.locals
            .iter()
            .find(|(local, _)| &**local == name)
            .map(|(_, value)| value)
    }

    /// Call stack, innermost first.
    #[inline]
    pub fn backtrace(&self) -> &[FrameSummary] {
        &self.backtrace
    }

    /// Number of active frames.
    #[inline]
    pub fn depth(&self) -> usize {
        self.backtrace.len()
    }
}

impl fmt::Display for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}+{}", self.task, self.function_name(), self.ip)?;
        if let Some(line) = self.line {
            write!(f, " (line {})", line)?;
        }
        if let Some(module) = self.module_name() {
            write!(f, " in {}", module)?;
        }
        Ok(())
    }
}
