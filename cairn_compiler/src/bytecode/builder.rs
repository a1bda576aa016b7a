//! Function builder for bytecode emission.
//!
//! The `FunctionBuilder` provides a high-level API for constructing bytecode
//! with register allocation and label resolution.

use super::code_object::{CodeFlags, CodeObject, LineTableEntry};
use super::encoder::BytecodeError;
use super::instruction::{ConstIndex, Instruction, Opcode, Register};
use cairn_core::Value;
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// A label for jump targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label(u32);

/// A forward reference to a label that needs patching.
#[derive(Debug)]
struct ForwardRef {
    /// Instruction index containing the jump.
    instruction_index: usize,
    /// The label being jumped to.
    label: Label,
}

/// Key type for constant deduplication.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ConstantKey {
    None,
    Bool(bool),
    Int(i64),
    Str(Arc<str>),
}

impl ConstantKey {
    fn from_value(value: &Value) -> Self {
        match value {
            Value::None => ConstantKey::None,
            Value::Bool(b) => ConstantKey::Bool(*b),
            Value::Int(i) => ConstantKey::Int(*i),
            Value::Str(s) => ConstantKey::Str(s.clone()),
        }
    }
}

/// Builder for constructing code objects.
///
/// Errors (register exhaustion, oversized pools, unbound labels) are recorded
/// as they happen and reported once by [`FunctionBuilder::finish`], so emission
/// code stays free of error plumbing.
///
/// # Example
/// ```
/// use cairn_compiler::FunctionBuilder;
///
/// let mut builder = FunctionBuilder::new("ret_7");
/// let r0 = builder.alloc_register();
/// builder.emit_yield_debugger();
/// builder.emit_load_int(r0, 7);
/// builder.emit_return(r0);
///
/// let code = builder.finish().unwrap();
/// assert_eq!(code.breakpoint_offsets(), vec![0]);
/// ```
pub struct FunctionBuilder {
    /// Function name.
    name: Arc<str>,
    /// Qualified name.
    qualname: Arc<str>,
    /// Filename.
    filename: Arc<str>,
    /// First line number.
    first_lineno: u32,
    /// Current line number (for line table).
    current_line: u32,

    /// Emitted instructions.
    instructions: Vec<Instruction>,

    /// Constant pool.
    constants: Vec<Value>,
    /// Constant deduplication map.
    constant_map: FxHashMap<ConstantKey, ConstIndex>,

    /// Names of the leading registers.
    locals: Vec<Arc<str>>,

    /// Global and callee names.
    names: Vec<Arc<str>>,
    /// Name to index map.
    name_map: FxHashMap<Arc<str>, u16>,

    /// Number of parameters.
    arg_count: u16,

    /// Code flags.
    flags: CodeFlags,

    /// Next register to allocate.
    next_register: u16,
    /// Maximum registers used (high water mark).
    max_registers: u16,
    /// Register free list for reuse.
    free_registers: Vec<Register>,

    /// Label counter.
    next_label: u32,
    /// Label to instruction index map.
    labels: FxHashMap<Label, usize>,
    /// Forward references that need patching.
    forward_refs: Vec<ForwardRef>,

    /// Line number table entries.
    line_table: Vec<LineTableEntry>,
    /// Start PC for current line.
    line_start_pc: u32,

    /// First error encountered during emission.
    error: Option<BytecodeError>,
}

impl FunctionBuilder {
    /// Maximum number of registers a frame may use.
    pub const MAX_REGISTERS: u16 = 256;

    /// Create a new function builder.
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        let name = name.into();
        Self {
            qualname: name.clone(),
            name,
            filename: "<unknown>".into(),
            first_lineno: 1,
            current_line: 1,
            instructions: Vec::new(),
            constants: Vec::new(),
            constant_map: FxHashMap::default(),
            locals: Vec::new(),
            names: Vec::new(),
            name_map: FxHashMap::default(),
            arg_count: 0,
            flags: CodeFlags::NONE,
            next_register: 0,
            max_registers: 0,
            free_registers: Vec::new(),
            next_label: 0,
            labels: FxHashMap::default(),
            forward_refs: Vec::new(),
            line_table: Vec::new(),
            line_start_pc: 0,
            error: None,
        }
    }

    fn record_error(&mut self, error: BytecodeError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    // =========================================================================
    // Configuration
    // =========================================================================

    /// Set the qualified name.
    pub fn set_qualname(&mut self, qualname: impl Into<Arc<str>>) {
        self.qualname = qualname.into();
    }

    /// Set the filename.
    pub fn set_filename(&mut self, filename: impl Into<Arc<str>>) {
        self.filename = filename.into();
    }

    /// Set the first line number.
    pub fn set_first_lineno(&mut self, line: u32) {
        self.first_lineno = line;
        self.current_line = line;
    }

    /// Set the current line number for subsequent instructions.
    pub fn set_line(&mut self, line: u32) {
        if line != self.current_line {
            self.close_line_range();
            self.current_line = line;
            self.line_start_pc = self.instructions.len() as u32;
        }
    }

    fn close_line_range(&mut self) {
        let current_pc = self.instructions.len() as u32;
        if current_pc > self.line_start_pc {
            self.line_table.push(LineTableEntry {
                start_pc: self.line_start_pc,
                end_pc: current_pc,
                line: self.current_line,
            });
        }
    }

    /// Add code flags.
    pub fn add_flags(&mut self, flags: CodeFlags) {
        self.flags |= flags;
    }

    // =========================================================================
    // Register Management
    // =========================================================================

    /// Allocate a new virtual register.
    #[inline]
    pub fn alloc_register(&mut self) -> Register {
        // Try to reuse a freed register first
        if let Some(reg) = self.free_registers.pop() {
            return reg;
        }

        if self.next_register >= Self::MAX_REGISTERS {
            self.record_error(BytecodeError::RegisterOverflow);
            return Register(u8::MAX);
        }
        let reg = Register(self.next_register as u8);
        self.next_register += 1;
        self.max_registers = self.max_registers.max(self.next_register);
        reg
    }

    /// Free a register for reuse.
    #[inline]
    pub fn free_register(&mut self, reg: Register) {
        if reg.index() >= self.locals.len() {
            self.free_registers.push(reg);
        }
    }

    /// Define a named local and return its register.
    ///
    /// Named locals occupy the leading registers, so they must be defined
    /// before any temporary is allocated.
    pub fn define_local(&mut self, name: impl Into<Arc<str>>) -> Register {
        let name = name.into();
        if let Some(pos) = self.locals.iter().position(|l| *l == name) {
            return Register(pos as u8);
        }
        if self.next_register as usize != self.locals.len() {
            self.record_error(BytecodeError::LocalAfterTemporary(name.to_string()));
        }
        let reg = self.alloc_register();
        self.locals.push(name);
        reg
    }

    /// Define a parameter. Parameters are named locals counted in `arg_count`.
    pub fn define_param(&mut self, name: impl Into<Arc<str>>) -> Register {
        let reg = self.define_local(name);
        self.arg_count += 1;
        reg
    }

    // =========================================================================
    // Constant Pool
    // =========================================================================

    /// Add a constant and return its index.
    pub fn add_constant(&mut self, value: Value) -> ConstIndex {
        let key = ConstantKey::from_value(&value);
        if let Some(&idx) = self.constant_map.get(&key) {
            return idx;
        }
        if self.constants.len() > u16::MAX as usize {
            self.record_error(BytecodeError::TooManyConstants);
            return ConstIndex::new(0);
        }
        let idx = ConstIndex::new(self.constants.len() as u16);
        self.constants.push(value);
        self.constant_map.insert(key, idx);
        idx
    }

    /// Add an integer constant.
    pub fn add_int(&mut self, value: i64) -> ConstIndex {
        self.add_constant(Value::int(value))
    }

    /// Add a string constant.
    pub fn add_str(&mut self, value: &str) -> ConstIndex {
        self.add_constant(Value::string(value))
    }

    // =========================================================================
    // Names (globals, callees)
    // =========================================================================

    /// Add a name and return its index.
    pub fn add_name(&mut self, name: impl Into<Arc<str>>) -> u16 {
        let name = name.into();
        if let Some(&idx) = self.name_map.get(&name) {
            return idx;
        }
        if self.names.len() > u16::MAX as usize {
            self.record_error(BytecodeError::TooManyNames);
            return 0;
        }
        let idx = self.names.len() as u16;
        self.name_map.insert(name.clone(), idx);
        self.names.push(name);
        idx
    }

    // =========================================================================
    // Labels
    // =========================================================================

    /// Create a new label for a jump target.
    pub fn create_label(&mut self) -> Label {
        let label = Label(self.next_label);
        self.next_label += 1;
        label
    }

    /// Mark the current position as the target for a label.
    pub fn bind_label(&mut self, label: Label) {
        let pc = self.instructions.len();
        self.labels.insert(label, pc);
    }

    /// Get the current instruction offset.
    pub fn current_offset(&self) -> usize {
        self.instructions.len()
    }

    // =========================================================================
    // Instruction Emission
    // =========================================================================

    /// Emit a raw instruction.
    #[inline]
    pub fn emit(&mut self, inst: Instruction) {
        self.instructions.push(inst);
    }

    /// Emit a NOP instruction.
    pub fn emit_nop(&mut self) {
        self.emit(Instruction::op(Opcode::Nop));
    }

    // --- Load/Store ---

    /// Load a constant into a register.
    pub fn emit_load_const(&mut self, dst: Register, idx: ConstIndex) {
        self.emit(Instruction::op_di(Opcode::LoadConst, dst, idx.0));
    }

    /// Load an integer literal into a register.
    ///
    /// Values that fit in 16 bits are encoded as an immediate; anything larger
    /// goes through the constant pool.
    pub fn emit_load_int(&mut self, dst: Register, value: i64) {
        match i16::try_from(value) {
            Ok(small) => self.emit(Instruction::op_di(Opcode::LoadSmallInt, dst, small as u16)),
            Err(_) => {
                let idx = self.add_int(value);
                self.emit_load_const(dst, idx);
            }
        }
    }

    /// Load nil into a register.
    pub fn emit_load_none(&mut self, dst: Register) {
        self.emit(Instruction::op_d(Opcode::LoadNone, dst));
    }

    /// Load true into a register.
    pub fn emit_load_true(&mut self, dst: Register) {
        self.emit(Instruction::op_d(Opcode::LoadTrue, dst));
    }

    /// Load false into a register.
    pub fn emit_load_false(&mut self, dst: Register) {
        self.emit(Instruction::op_d(Opcode::LoadFalse, dst));
    }

    /// Load a module global into a register.
    pub fn emit_load_global(&mut self, dst: Register, name: &str) {
        let idx = self.add_name(name);
        self.emit(Instruction::op_di(Opcode::LoadGlobal, dst, idx));
    }

    /// Store a register into a module global.
    pub fn emit_store_global(&mut self, name: &str, src: Register) {
        let idx = self.add_name(name);
        self.emit(Instruction::op_di(Opcode::StoreGlobal, src, idx));
    }

    /// Move value between registers.
    pub fn emit_move(&mut self, dst: Register, src: Register) {
        if dst != src {
            self.emit(Instruction::op_ds(Opcode::Move, dst, src));
        }
    }

    // --- Arithmetic ---

    /// `dst = lhs + rhs`
    pub fn emit_add(&mut self, dst: Register, lhs: Register, rhs: Register) {
        self.emit(Instruction::op_dss(Opcode::Add, dst, lhs, rhs));
    }

    /// `dst = lhs - rhs`
    pub fn emit_sub(&mut self, dst: Register, lhs: Register, rhs: Register) {
        self.emit(Instruction::op_dss(Opcode::Sub, dst, lhs, rhs));
    }

    /// `dst = lhs * rhs`
    pub fn emit_mul(&mut self, dst: Register, lhs: Register, rhs: Register) {
        self.emit(Instruction::op_dss(Opcode::Mul, dst, lhs, rhs));
    }

    /// `dst = lhs < rhs`
    pub fn emit_lt(&mut self, dst: Register, lhs: Register, rhs: Register) {
        self.emit(Instruction::op_dss(Opcode::Lt, dst, lhs, rhs));
    }

    // --- Control Flow ---

    /// Unconditional jump to a label.
    pub fn emit_jump(&mut self, label: Label) {
        self.forward_refs.push(ForwardRef {
            instruction_index: self.instructions.len(),
            label,
        });
        self.emit(Instruction::op_i(Opcode::Jump, 0));
    }

    /// Jump to a label when `cond` is falsy.
    pub fn emit_jump_if_false(&mut self, cond: Register, label: Label) {
        self.forward_refs.push(ForwardRef {
            instruction_index: self.instructions.len(),
            label,
        });
        self.emit(Instruction::op_di(Opcode::JumpIfFalse, cond, 0));
    }

    /// Call a module function by name.
    ///
    /// Arguments are read from the `argc` registers following `dst`; the
    /// result is written to `dst`.
    pub fn emit_call(&mut self, dst: Register, callee: &str, argc: u8) {
        let idx = self.add_name(callee);
        let Ok(name) = u8::try_from(idx) else {
            self.record_error(BytecodeError::NameIndexOutOfRange(idx));
            return;
        };
        self.emit(Instruction::op_dss(
            Opcode::Call,
            dst,
            Register(name),
            Register(argc),
        ));
    }

    /// Emit a breakpoint marker.
    pub fn emit_yield_debugger(&mut self) {
        self.flags |= CodeFlags::HAS_BREAKPOINTS;
        self.emit(Instruction::op(Opcode::YieldDebugger));
    }

    /// Return a register's value.
    pub fn emit_return(&mut self, src: Register) {
        self.emit(Instruction::op_d(Opcode::Return, src));
    }

    // =========================================================================
    // Finalization
    // =========================================================================

    /// Resolve labels and produce the code object.
    pub fn finish(mut self) -> Result<CodeObject, BytecodeError> {
        if let Some(error) = self.error.take() {
            return Err(error);
        }

        for fwd in std::mem::take(&mut self.forward_refs) {
            let target = *self
                .labels
                .get(&fwd.label)
                .ok_or(BytecodeError::UnboundLabel(fwd.label.0))?;
            let target = u16::try_from(target).map_err(|_| BytecodeError::JumpOutOfRange(target))?;
            let inst = self.instructions[fwd.instruction_index];
            self.instructions[fwd.instruction_index] = inst.with_imm16(target);
        }

        self.close_line_range();

        Ok(CodeObject {
            name: self.name,
            qualname: self.qualname,
            filename: self.filename,
            first_lineno: self.first_lineno,
            instructions: self.instructions.into_boxed_slice(),
            constants: self.constants.into_boxed_slice(),
            locals: self.locals.into_boxed_slice(),
            names: self.names.into_boxed_slice(),
            arg_count: self.arg_count,
            register_count: self.max_registers,
            flags: self.flags,
            line_table: self.line_table.into_boxed_slice(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_function() {
        let mut builder = FunctionBuilder::new("ret_7");
        let r0 = builder.alloc_register();
        builder.emit_load_int(r0, 7);
        builder.emit_return(r0);

        let code = builder.finish().unwrap();
        assert_eq!(code.instructions.len(), 2);
        assert_eq!(code.register_count, 1);
        assert_eq!(code.instructions[0].opcode(), Some(Opcode::LoadSmallInt));
        assert_eq!(code.instructions[0].imm16() as i16, 7);
        assert!(code.constants.is_empty());
    }

    #[test]
    fn test_large_int_uses_constant_pool() {
        let mut builder = FunctionBuilder::new("big");
        let r0 = builder.alloc_register();
        builder.emit_load_int(r0, 1 << 40);
        builder.emit_load_int(r0, -3);

        let code = builder.finish().unwrap();
        assert_eq!(code.instructions[0].opcode(), Some(Opcode::LoadConst));
        assert_eq!(&*code.constants, &[Value::int(1 << 40)]);
        assert_eq!(code.instructions[1].opcode(), Some(Opcode::LoadSmallInt));
        assert_eq!(code.instructions[1].imm16() as i16, -3);
    }

    #[test]
    fn test_constant_deduplication() {
        let mut builder = FunctionBuilder::new("test");
        let a = builder.add_int(7);
        let b = builder.add_int(7);
        let c = builder.add_str("7");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_params_are_leading_named_registers() {
        let mut builder = FunctionBuilder::new("ret_7");
        let call_block = builder.define_param("call_block");
        let call_method = builder.define_param("call_method");
        let tmp = builder.alloc_register();
        builder.emit_return(tmp);

        let code = builder.finish().unwrap();
        assert_eq!(call_block, Register(0));
        assert_eq!(call_method, Register(1));
        assert_eq!(code.arg_count, 2);
        assert_eq!(code.locals.len(), 2);
        assert_eq!(&*code.locals[1], "call_method");
    }

    #[test]
    fn test_local_after_temporary_is_rejected() {
        let mut builder = FunctionBuilder::new("test");
        builder.alloc_register();
        builder.define_local("late");
        let err = builder.finish().unwrap_err();
        assert_eq!(err, BytecodeError::LocalAfterTemporary("late".to_string()));
    }

    #[test]
    fn test_forward_jump_is_patched() {
        let mut builder = FunctionBuilder::new("test");
        let cond = builder.alloc_register();
        let end = builder.create_label();
        builder.emit_load_false(cond);
        builder.emit_jump_if_false(cond, end);
        builder.emit_nop();
        builder.bind_label(end);
        builder.emit_return(cond);

        let code = builder.finish().unwrap();
        assert_eq!(code.instructions[1].opcode(), Some(Opcode::JumpIfFalse));
        assert_eq!(code.instructions[1].imm16(), 3);
        assert_eq!(code.instructions[1].a(), cond.0);
    }

    #[test]
    fn test_unbound_label_is_an_error() {
        let mut builder = FunctionBuilder::new("test");
        let nowhere = builder.create_label();
        builder.emit_jump(nowhere);
        assert!(matches!(
            builder.finish(),
            Err(BytecodeError::UnboundLabel(_))
        ));
    }

    #[test]
    fn test_register_overflow_is_reported() {
        let mut builder = FunctionBuilder::new("test");
        for _ in 0..=FunctionBuilder::MAX_REGISTERS {
            builder.alloc_register();
        }
        assert_eq!(builder.finish().unwrap_err(), BytecodeError::RegisterOverflow);
    }

    #[test]
    fn test_line_table() {
        let mut builder = FunctionBuilder::new("test");
        builder.set_first_lineno(4);
        let r0 = builder.alloc_register();
        builder.emit_yield_debugger();
        builder.set_line(5);
        builder.emit_load_int(r0, 7);
        builder.emit_return(r0);

        let code = builder.finish().unwrap();
        assert_eq!(code.line_for_pc(0), Some(4));
        assert_eq!(code.line_for_pc(1), Some(5));
        assert_eq!(code.line_for_pc(2), Some(5));
        assert!(code.flags.contains(CodeFlags::HAS_BREAKPOINTS));
    }

    #[test]
    fn test_call_encodes_name_and_argc() {
        let mut builder = FunctionBuilder::new("test");
        let dst = builder.alloc_register();
        builder.emit_call(dst, "called_from_ret_7", 0);
        let code = builder.finish().unwrap();
        let inst = code.instructions[0];
        assert_eq!(inst.opcode(), Some(Opcode::Call));
        assert_eq!(&*code.names[inst.b() as usize], "called_from_ret_7");
        assert_eq!(inst.c(), 0);
    }
}
