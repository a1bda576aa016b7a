//! Packed 32-bit instruction format.
//!
//! ```text
//! 31        24 23        16 15         8 7          0
//! ┌───────────┬────────────┬────────────┬───────────┐
//! │  opcode   │     a      │     b      │     c     │
//! └───────────┴────────────┴────────────┴───────────┘
//!                          └──────── imm16 ─────────┘
//! ```

use std::fmt;

// =============================================================================
// Operand Newtypes
// =============================================================================

/// A virtual register index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Register(pub u8);

impl Register {
    /// Register index as `usize`.
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Index into a code object's constant pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConstIndex(pub u16);

impl ConstIndex {
    /// Create a constant index.
    #[inline]
    pub const fn new(idx: u16) -> Self {
        Self(idx)
    }
}

// =============================================================================
// Opcode
// =============================================================================

/// Operand layout of an opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstructionFormat {
    /// No operands.
    None,
    /// `a` = destination register.
    D,
    /// `a` = register, `imm16` = index or target.
    DI,
    /// `a` = destination, `b` = source.
    DS,
    /// `a` = destination, `b` and `c` = sources.
    DSS,
    /// `imm16` only.
    I,
}

impl InstructionFormat {
    /// Number of operands a decoded instruction of this format carries.
    pub const fn operand_count(self) -> usize {
        match self {
            InstructionFormat::None => 0,
            InstructionFormat::D | InstructionFormat::I => 1,
            InstructionFormat::DI | InstructionFormat::DS => 2,
            InstructionFormat::DSS => 3,
        }
    }
}

/// Bytecode operations.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    /// Do nothing.
    Nop = 0,
    /// `a = constants[imm16]`
    LoadConst = 1,
    /// `a = imm16 as i16`
    LoadSmallInt = 2,
    /// `a = nil`
    LoadNone = 3,
    /// `a = true`
    LoadTrue = 4,
    /// `a = false`
    LoadFalse = 5,
    /// `a = module.globals[names[imm16]]`
    LoadGlobal = 6,
    /// `module.globals[names[imm16]] = a`
    StoreGlobal = 7,
    /// `a = b`
    Move = 8,
    /// `a = b + c`
    Add = 9,
    /// `a = b - c`
    Sub = 10,
    /// `a = b * c`
    Mul = 11,
    /// `a = b < c`
    Lt = 12,
    /// `pc = imm16`
    Jump = 13,
    /// `if !a { pc = imm16 }`
    JumpIfFalse = 14,
    /// `a = call names[b](a+1 ..= a+c)`
    Call = 15,
    /// Suspend the running task and hand its context to the debugger.
    YieldDebugger = 16,
    /// Return `a` to the caller.
    Return = 17,
}

impl Opcode {
    /// Whether `imm16` holds a two's-complement `i16` rather than an index.
    #[inline]
    pub const fn has_signed_immediate(self) -> bool {
        matches!(self, Opcode::LoadSmallInt)
    }

    /// Every opcode, in encoding order.
    pub const ALL: [Opcode; 18] = [
        Opcode::Nop,
        Opcode::LoadConst,
        Opcode::LoadSmallInt,
        Opcode::LoadNone,
        Opcode::LoadTrue,
        Opcode::LoadFalse,
        Opcode::LoadGlobal,
        Opcode::StoreGlobal,
        Opcode::Move,
        Opcode::Add,
        Opcode::Sub,
        Opcode::Mul,
        Opcode::Lt,
        Opcode::Jump,
        Opcode::JumpIfFalse,
        Opcode::Call,
        Opcode::YieldDebugger,
        Opcode::Return,
    ];

    /// Decode an opcode byte.
    #[inline]
    pub fn from_u8(byte: u8) -> Option<Opcode> {
        Self::ALL.get(byte as usize).copied()
    }

    /// Operand layout.
    pub const fn format(self) -> InstructionFormat {
        match self {
            Opcode::Nop | Opcode::YieldDebugger => InstructionFormat::None,
            Opcode::LoadNone | Opcode::LoadTrue | Opcode::LoadFalse | Opcode::Return => {
                InstructionFormat::D
            }
            Opcode::LoadConst
            | Opcode::LoadSmallInt
            | Opcode::LoadGlobal
            | Opcode::StoreGlobal
            | Opcode::JumpIfFalse => InstructionFormat::DI,
            Opcode::Move => InstructionFormat::DS,
            Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Lt | Opcode::Call => {
                InstructionFormat::DSS
            }
            Opcode::Jump => InstructionFormat::I,
        }
    }

    /// Mnemonic used by the disassembler.
    pub const fn name(self) -> &'static str {
        match self {
            Opcode::Nop => "nop",
            Opcode::LoadConst => "load_const",
            Opcode::LoadSmallInt => "load_int",
            Opcode::LoadNone => "load_none",
            Opcode::LoadTrue => "load_true",
            Opcode::LoadFalse => "load_false",
            Opcode::LoadGlobal => "load_global",
            Opcode::StoreGlobal => "store_global",
            Opcode::Move => "move",
            Opcode::Add => "add",
            Opcode::Sub => "sub",
            Opcode::Mul => "mul",
            Opcode::Lt => "lt",
            Opcode::Jump => "jump",
            Opcode::JumpIfFalse => "jump_if_false",
            Opcode::Call => "call",
            Opcode::YieldDebugger => "yield_debugger",
            Opcode::Return => "ret",
        }
    }
}

// =============================================================================
// Instruction
// =============================================================================

/// A packed 32-bit instruction.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Instruction(u32);

impl Instruction {
    /// Build from raw bits.
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Raw bits.
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    const fn pack(op: Opcode, a: u8, b: u8, c: u8) -> Self {
        Self(((op as u32) << 24) | ((a as u32) << 16) | ((b as u32) << 8) | c as u32)
    }

    /// Instruction without operands.
    #[inline]
    pub const fn op(op: Opcode) -> Self {
        Self::pack(op, 0, 0, 0)
    }

    /// Instruction with a destination register.
    #[inline]
    pub const fn op_d(op: Opcode, dst: Register) -> Self {
        Self::pack(op, dst.0, 0, 0)
    }

    /// Instruction with a register and a 16-bit immediate.
    #[inline]
    pub const fn op_di(op: Opcode, dst: Register, imm: u16) -> Self {
        Self::pack(op, dst.0, (imm >> 8) as u8, imm as u8)
    }

    /// Instruction with a destination and one source register.
    #[inline]
    pub const fn op_ds(op: Opcode, dst: Register, src: Register) -> Self {
        Self::pack(op, dst.0, src.0, 0)
    }

    /// Instruction with a destination and two source operands.
    #[inline]
    pub const fn op_dss(op: Opcode, dst: Register, src1: Register, src2: Register) -> Self {
        Self::pack(op, dst.0, src1.0, src2.0)
    }

    /// Instruction with only a 16-bit immediate.
    #[inline]
    pub const fn op_i(op: Opcode, imm: u16) -> Self {
        Self::pack(op, 0, (imm >> 8) as u8, imm as u8)
    }

    /// Decode the opcode byte.
    #[inline]
    pub fn opcode(self) -> Option<Opcode> {
        Opcode::from_u8(self.opcode_byte())
    }

    /// Raw opcode byte.
    #[inline]
    pub const fn opcode_byte(self) -> u8 {
        (self.0 >> 24) as u8
    }

    /// Operand `a`.
    #[inline]
    pub const fn a(self) -> u8 {
        (self.0 >> 16) as u8
    }

    /// Operand `b`.
    #[inline]
    pub const fn b(self) -> u8 {
        (self.0 >> 8) as u8
    }

    /// Operand `c`.
    #[inline]
    pub const fn c(self) -> u8 {
        self.0 as u8
    }

    /// Operands `b:c` as a 16-bit immediate.
    #[inline]
    pub const fn imm16(self) -> u16 {
        self.0 as u16
    }

    /// Destination register (`a`).
    #[inline]
    pub const fn dst(self) -> Register {
        Register(self.a())
    }

    /// Patch the 16-bit immediate, used for jump target resolution.
    #[inline]
    pub(crate) const fn with_imm16(self, imm: u16) -> Self {
        Self((self.0 & 0xFFFF_0000) | imm as u32)
    }
}

impl fmt::Debug for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Instruction({:#010x}: {})", self.0, self)
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(op) = self.opcode() else {
            return write!(f, "<invalid {:#04x}>", self.opcode_byte());
        };
        match op.format() {
            InstructionFormat::None => write!(f, "{}", op.name()),
            InstructionFormat::D => write!(f, "{} r{}", op.name(), self.a()),
            InstructionFormat::DI if op.has_signed_immediate() => {
                write!(f, "{} r{}, #{}", op.name(), self.a(), self.imm16() as i16)
            }
            InstructionFormat::DI => write!(f, "{} r{}, #{}", op.name(), self.a(), self.imm16()),
            InstructionFormat::DS => write!(f, "{} r{}, r{}", op.name(), self.a(), self.b()),
            InstructionFormat::DSS if op == Opcode::Call => write!(
                f,
                "{} r{}, name#{}, argc={}",
                op.name(),
                self.a(),
                self.b(),
                self.c()
            ),
            InstructionFormat::DSS => write!(
                f,
                "{} r{}, r{}, r{}",
                op.name(),
                self.a(),
                self.b(),
                self.c()
            ),
            InstructionFormat::I => write!(f, "{} @{}", op.name(), self.imm16()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_round_trip_through_byte() {
        for op in Opcode::ALL {
            assert_eq!(Opcode::from_u8(op as u8), Some(op));
        }
        assert_eq!(Opcode::from_u8(200), None);
    }

    #[test]
    fn test_packing_di() {
        let inst = Instruction::op_di(Opcode::LoadConst, Register(3), 0x1234);
        assert_eq!(inst.opcode(), Some(Opcode::LoadConst));
        assert_eq!(inst.a(), 3);
        assert_eq!(inst.imm16(), 0x1234);
    }

    #[test]
    fn test_packing_dss() {
        let inst = Instruction::op_dss(Opcode::Add, Register(1), Register(2), Register(3));
        assert_eq!((inst.a(), inst.b(), inst.c()), (1, 2, 3));
        assert_eq!(inst.to_string(), "add r1, r2, r3");
    }

    #[test]
    fn test_patch_imm16_keeps_register() {
        let inst = Instruction::op_di(Opcode::JumpIfFalse, Register(9), 0).with_imm16(42);
        assert_eq!(inst.a(), 9);
        assert_eq!(inst.imm16(), 42);
    }

    #[test]
    fn test_display_small_int_is_signed() {
        let inst = Instruction::op_di(Opcode::LoadSmallInt, Register(0), (-3i16) as u16);
        assert_eq!(inst.to_string(), "load_int r0, #-3");
        let inst = Instruction::op_di(Opcode::LoadConst, Register(0), 0xFFFD);
        assert_eq!(inst.to_string(), "load_const r0, #65533");
    }

    #[test]
    fn test_display_invalid_opcode() {
        let inst = Instruction::from_raw(0xFF00_0000);
        assert_eq!(inst.opcode(), None);
        assert_eq!(inst.to_string(), "<invalid 0xff>");
    }

    #[test]
    fn test_format_operand_counts() {
        assert_eq!(Opcode::YieldDebugger.format().operand_count(), 0);
        assert_eq!(Opcode::Return.format().operand_count(), 1);
        assert_eq!(Opcode::LoadConst.format().operand_count(), 2);
        assert_eq!(Opcode::Call.format().operand_count(), 3);
    }
}
