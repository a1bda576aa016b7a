//! Code object representation for compiled functions.
//!
//! A `CodeObject` contains all the compiled bytecode and metadata needed
//! to execute a function or block. This is the fundamental unit of compilation
//! and the "defining code unit" a debugger reports for a suspended frame.

use super::instruction::{Instruction, Opcode};
use cairn_core::Value;
use std::sync::Arc;

/// A compiled code object representing a function or block.
///
/// Code objects are immutable once created and can be shared across threads.
/// Rewriting a function's bytecode produces a *new* code object (see
/// [`CodeObject::with_instructions`]); frames already running keep the one
/// they started with.
#[derive(Debug, Clone)]
pub struct CodeObject {
    /// Function name.
    pub name: Arc<str>,

    /// Qualified name (includes enclosing module names).
    pub qualname: Arc<str>,

    /// Filename where this code was defined.
    pub filename: Arc<str>,

    /// First line number in source.
    pub first_lineno: u32,

    /// Bytecode instructions (32-bit each).
    pub instructions: Box<[Instruction]>,

    /// Constant pool (indexed by LoadConst).
    pub constants: Box<[Value]>,

    /// Names of the leading registers (parameters first).
    pub locals: Box<[Arc<str>]>,

    /// Global and callee names (indexed by LoadGlobal, StoreGlobal, Call).
    pub names: Box<[Arc<str>]>,

    /// Number of positional parameters.
    pub arg_count: u16,

    /// Number of virtual registers used.
    pub register_count: u16,

    /// Code flags.
    pub flags: CodeFlags,

    /// Line number table (instruction index -> line number).
    pub line_table: Box<[LineTableEntry]>,
}

/// Code object flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CodeFlags(u32);

impl CodeFlags {
    /// No flags.
    pub const NONE: CodeFlags = CodeFlags(0);
    /// Code is a block body rather than a method.
    pub const BLOCK: CodeFlags = CodeFlags(1 << 0);
    /// Code is nested inside a module body.
    pub const NESTED: CodeFlags = CodeFlags(1 << 1);
    /// Code contains at least one `yield_debugger` instruction.
    pub const HAS_BREAKPOINTS: CodeFlags = CodeFlags(1 << 2);

    /// Check if a flag is set.
    #[inline]
    pub const fn contains(self, other: CodeFlags) -> bool {
        (self.0 & other.0) == other.0
    }

    /// Combine flags.
    #[inline]
    pub const fn union(self, other: CodeFlags) -> CodeFlags {
        CodeFlags(self.0 | other.0)
    }

    /// Get raw value.
    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }
}

impl std::ops::BitOr for CodeFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        self.union(rhs)
    }
}

impl std::ops::BitOrAssign for CodeFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Line table entry mapping instruction ranges to source lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineTableEntry {
    /// Starting instruction index (inclusive).
    pub start_pc: u32,
    /// Ending instruction index (exclusive).
    pub end_pc: u32,
    /// Source line number.
    pub line: u32,
}

impl CodeObject {
    /// Create a new empty code object.
    pub fn new(name: impl Into<Arc<str>>, filename: impl Into<Arc<str>>) -> Self {
        let name = name.into();
        CodeObject {
            qualname: name.clone(),
            name,
            filename: filename.into(),
            first_lineno: 1,
            instructions: Box::new([]),
            constants: Box::new([]),
            locals: Box::new([]),
            names: Box::new([]),
            arg_count: 0,
            register_count: 0,
            flags: CodeFlags::NONE,
            line_table: Box::new([]),
        }
    }

    /// Get the line number for a given instruction index.
    pub fn line_for_pc(&self, pc: u32) -> Option<u32> {
        self.line_table
            .iter()
            .find(|entry| entry.start_pc <= pc && pc < entry.end_pc)
            .map(|entry| entry.line)
    }

    /// Instruction indices of every `yield_debugger` marker.
    pub fn breakpoint_offsets(&self) -> Vec<u32> {
        self.instructions
            .iter()
            .enumerate()
            .filter(|(_, inst)| inst.opcode() == Some(Opcode::YieldDebugger))
            .map(|(pc, _)| pc as u32)
            .collect()
    }

    /// Check if this code is a block body.
    #[inline]
    pub fn is_block(&self) -> bool {
        self.flags.contains(CodeFlags::BLOCK)
    }

    /// Copy this code object with a replacement instruction stream.
    ///
    /// The breakpoint flag is recomputed; everything else is carried over.
    pub fn with_instructions(&self, instructions: Box<[Instruction]>) -> CodeObject {
        let mut code = self.clone();
        let has_breakpoints = instructions
            .iter()
            .any(|inst| inst.opcode() == Some(Opcode::YieldDebugger));
        code.instructions = instructions;
        code.flags = CodeFlags(code.flags.0 & !CodeFlags::HAS_BREAKPOINTS.0);
        if has_breakpoints {
            code.flags |= CodeFlags::HAS_BREAKPOINTS;
        }
        code
    }
}

/// Disassemble a code object to a string.
pub fn disassemble(code: &CodeObject) -> String {
    use std::fmt::Write;

    let mut output = String::new();

    // Writing into a String cannot fail.
    let _ = writeln!(output, "Code object: {}", code.qualname);
    let _ = writeln!(output, "  File: {}", code.filename);
    let _ = writeln!(output, "  First line: {}", code.first_lineno);
    let _ = writeln!(output, "  Args: {}", code.arg_count);
    let _ = writeln!(output, "  Registers: {}", code.register_count);
    let _ = writeln!(output, "  Flags: {:08x}", code.flags.bits());

    if !code.constants.is_empty() {
        let _ = writeln!(output, "\nConstants:");
        for (i, c) in code.constants.iter().enumerate() {
            let _ = writeln!(output, "  {:4}: {}", i, c);
        }
    }

    if !code.names.is_empty() {
        let _ = writeln!(output, "\nNames:");
        for (i, n) in code.names.iter().enumerate() {
            let _ = writeln!(output, "  {:4}: {}", i, n);
        }
    }

    if !code.locals.is_empty() {
        let _ = writeln!(output, "\nLocals:");
        for (i, l) in code.locals.iter().enumerate() {
            let _ = writeln!(output, "  {:4}: {}", i, l);
        }
    }

    let _ = writeln!(output, "\nDisassembly:");
    for (i, inst) in code.instructions.iter().enumerate() {
        let line = code.line_for_pc(i as u32);
        let line_str = line.map_or("    ".to_string(), |l| format!("{:4}", l));
        let _ = writeln!(output, "{} {:4}: {}", line_str, i, inst);
    }

    output
}
