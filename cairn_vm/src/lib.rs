//! Virtual machine for Cairn with breakpoint interception.
//!
//! The VM runs code objects produced by `cairn_compiler` on independently
//! scheduled [`Task`]s. Executing a `yield_debugger` instruction suspends the
//! task and hands an [`ExecutionContext`] to the registered
//! [`Listener`](debug::Listener), which releases the task when its handler has
//! run. See the [`debug`] module for the protocol.

pub mod config;
pub mod debug;
pub mod error;
pub mod frame;
pub mod function;
pub mod interpreter;
pub mod module;
pub mod samples;
pub mod scope;
pub mod task;
pub mod vm;

pub use config::{DebugConfig, VmConfig};
pub use debug::{DebugError, DebugHub, ExecutionContext, Listener};
pub use error::{VmError, VmResult};
pub use function::Function;
pub use interpreter::Interpreter;
pub use module::Module;
pub use scope::StaticScope;
pub use task::{Task, TaskHandle, TaskId, TaskRef};
pub use vm::Vm;
