//! Bytecode definitions for the Cairn VM.
//!
//! The compiler crate owns everything that describes *what* runs: packed
//! instructions, code objects, the function builder used to emit them, and the
//! decoder/encoder pair used to rewrite an instruction stream after the fact.

pub mod bytecode;

pub use bytecode::{BytecodeError, CodeObject, FunctionBuilder, Instruction, Opcode};
