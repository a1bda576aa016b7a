//! Register-based bytecode system.
//!
//! Key components:
//!
//! - [`Instruction`] - 32-bit packed instruction format
//! - [`Opcode`] - Enumeration of all bytecode operations
//! - [`CodeObject`] - Compiled function representation
//! - [`FunctionBuilder`] - High-level API for bytecode construction
//! - [`Encoder`] / [`decode`] - Instruction-stream rewriting

mod builder;
mod code_object;
mod encoder;
mod instruction;

pub use builder::{FunctionBuilder, Label};
pub use code_object::{CodeFlags, CodeObject, LineTableEntry, disassemble};
pub use encoder::{BytecodeError, DecodedInstruction, Encoder, decode};
pub use instruction::{ConstIndex, Instruction, InstructionFormat, Opcode, Register};
