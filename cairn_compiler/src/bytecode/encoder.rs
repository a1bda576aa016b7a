//! Instruction-stream decoding and re-encoding.
//!
//! Decoding turns packed instructions into an editable form where every
//! operand is a plain integer. Editing an operand (for example the constant
//! index a function returns) and re-encoding yields a new stream that can be
//! installed with [`CodeObject::with_instructions`](super::CodeObject::with_instructions).
//!
//! Registers and indices decode as non-negative values. The immediate of an
//! opcode with [`Opcode::has_signed_immediate`] decodes sign-extended and must
//! fit an `i16` when encoded.

use super::instruction::{Instruction, InstructionFormat, Opcode, Register};
use std::fmt;
use thiserror::Error;

// =============================================================================
// Errors
// =============================================================================

/// Failures while building, decoding or encoding bytecode.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BytecodeError {
    /// More than 256 registers were requested.
    #[error("register overflow: a frame may use at most 256 registers")]
    RegisterOverflow,

    /// The constant pool exceeded its 16-bit index space.
    #[error("too many constants")]
    TooManyConstants,

    /// The name table exceeded its 16-bit index space.
    #[error("too many names")]
    TooManyNames,

    /// A callee name index does not fit the 8-bit call operand.
    #[error("name index {0} does not fit a call operand")]
    NameIndexOutOfRange(u16),

    /// A named local was defined after temporaries were allocated.
    #[error("local '{0}' defined after temporary registers")]
    LocalAfterTemporary(String),

    /// A jump refers to a label that was never bound.
    #[error("label {0} was never bound")]
    UnboundLabel(u32),

    /// A jump target does not fit the 16-bit immediate.
    #[error("jump target {0} is out of range")]
    JumpOutOfRange(usize),

    /// An instruction carries an unknown opcode byte.
    #[error("unknown opcode {byte:#04x} at offset {offset}")]
    UnknownOpcode {
        /// Instruction index.
        offset: usize,
        /// The offending byte.
        byte: u8,
    },

    /// A decoded instruction has the wrong number of operands.
    #[error("{opcode:?} takes {expected} operand(s), found {found}")]
    OperandCount {
        /// The opcode being encoded.
        opcode: Opcode,
        /// Operands the format requires.
        expected: usize,
        /// Operands supplied.
        found: usize,
    },

    /// A decoded operand does not fit its slot.
    #[error("{opcode:?} operand {index} = {value} is outside {min}..={max}")]
    OperandRange {
        /// The opcode being encoded.
        opcode: Opcode,
        /// Operand position.
        index: usize,
        /// Supplied value.
        value: i32,
        /// Smallest value the slot holds.
        min: i32,
        /// Largest value the slot holds.
        max: i32,
    },
}

// =============================================================================
// Decoded Form
// =============================================================================

/// An instruction with its operands unpacked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedInstruction {
    /// The operation.
    pub opcode: Opcode,
    /// Operands in format order (`a`, then `b`/`imm16`, then `c`).
    pub operands: Vec<i32>,
}

impl DecodedInstruction {
    /// Create a decoded instruction.
    pub fn new(opcode: Opcode, operands: &[i32]) -> Self {
        Self {
            opcode,
            operands: operands.to_vec(),
        }
    }
}

impl fmt::Display for DecodedInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.opcode.name())?;
        for (i, operand) in self.operands.iter().enumerate() {
            let sep = if i == 0 { " " } else { ", " };
            write!(f, "{}{}", sep, operand)?;
        }
        Ok(())
    }
}

/// Decode a packed instruction stream.
pub fn decode(instructions: &[Instruction]) -> Result<Vec<DecodedInstruction>, BytecodeError> {
    instructions
        .iter()
        .enumerate()
        .map(|(offset, inst)| {
            let opcode = inst.opcode().ok_or(BytecodeError::UnknownOpcode {
                offset,
                byte: inst.opcode_byte(),
            })?;
            let imm = if opcode.has_signed_immediate() {
                i32::from(inst.imm16() as i16)
            } else {
                i32::from(inst.imm16())
            };
            let (a, b, c) = (i32::from(inst.a()), i32::from(inst.b()), i32::from(inst.c()));
            let operands = match opcode.format() {
                InstructionFormat::None => vec![],
                InstructionFormat::D => vec![a],
                InstructionFormat::I => vec![imm],
                InstructionFormat::DI => vec![a, imm],
                InstructionFormat::DS => vec![a, b],
                InstructionFormat::DSS => vec![a, b, c],
            };
            Ok(DecodedInstruction { opcode, operands })
        })
        .collect()
}

// =============================================================================
// Encoder
// =============================================================================

/// Packs decoded instructions back into the 32-bit format.
#[derive(Debug, Default, Clone, Copy)]
pub struct Encoder;

impl Encoder {
    /// Create an encoder.
    pub fn new() -> Self {
        Self
    }

    /// Encode one instruction, validating operand count and ranges.
    pub fn encode(&self, decoded: &DecodedInstruction) -> Result<Instruction, BytecodeError> {
        let opcode = decoded.opcode;
        let format = opcode.format();
        let expected = format.operand_count();
        if decoded.operands.len() != expected {
            return Err(BytecodeError::OperandCount {
                opcode,
                expected,
                found: decoded.operands.len(),
            });
        }

        let out_of_range = |index: usize, min: i32, max: i32| BytecodeError::OperandRange {
            opcode,
            index,
            value: decoded.operands[index],
            min,
            max,
        };
        let byte = |index: usize| -> Result<Register, BytecodeError> {
            u8::try_from(decoded.operands[index])
                .map(Register)
                .map_err(|_| out_of_range(index, 0, u8::MAX.into()))
        };
        let imm = |index: usize| -> Result<u16, BytecodeError> {
            let value = decoded.operands[index];
            if opcode.has_signed_immediate() {
                i16::try_from(value)
                    .map(|v| v as u16)
                    .map_err(|_| out_of_range(index, i16::MIN.into(), i16::MAX.into()))
            } else {
                u16::try_from(value).map_err(|_| out_of_range(index, 0, u16::MAX.into()))
            }
        };

        Ok(match format {
            InstructionFormat::None => Instruction::op(opcode),
            InstructionFormat::D => Instruction::op_d(opcode, byte(0)?),
            InstructionFormat::I => Instruction::op_i(opcode, imm(0)?),
            InstructionFormat::DI => Instruction::op_di(opcode, byte(0)?, imm(1)?),
            InstructionFormat::DS => Instruction::op_ds(opcode, byte(0)?, byte(1)?),
            InstructionFormat::DSS => Instruction::op_dss(opcode, byte(0)?, byte(1)?, byte(2)?),
        })
    }

    /// Encode a whole stream.
    pub fn encode_stream(
        &self,
        stream: &[DecodedInstruction],
    ) -> Result<Box<[Instruction]>, BytecodeError> {
        stream.iter().map(|decoded| self.encode(decoded)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::FunctionBuilder;

    fn ret_7_stream() -> Box<[Instruction]> {
        let mut builder = FunctionBuilder::new("ret_7");
        let r0 = builder.alloc_register();
        builder.emit_load_none(r0);
        builder.emit_yield_debugger();
        builder.emit_load_int(r0, 7);
        builder.emit_return(r0);
        builder.finish().unwrap().instructions
    }

    #[test]
    fn test_decode_exposes_operands() {
        let decoded = decode(&ret_7_stream()).unwrap();
        assert_eq!(decoded.len(), 4);
        assert_eq!(decoded[1], DecodedInstruction::new(Opcode::YieldDebugger, &[]));
        assert_eq!(decoded[2], DecodedInstruction::new(Opcode::LoadSmallInt, &[0, 7]));
        assert_eq!(decoded[3].to_string(), "ret 0");
    }

    #[test]
    fn test_reencoding_unchanged_stream_is_identical() {
        let original = ret_7_stream();
        let encoded = Encoder::new()
            .encode_stream(&decode(&original).unwrap())
            .unwrap();
        assert_eq!(encoded, original);
    }

    #[test]
    fn test_edit_returned_immediate() {
        let mut decoded = decode(&ret_7_stream()).unwrap();
        let len = decoded.len();
        decoded[len - 2].operands[1] = 3;
        let encoded = Encoder::new().encode_stream(&decoded).unwrap();
        assert_eq!(encoded[len - 2].imm16(), 3);
        assert_eq!(encoded[len - 2].a(), 0);
    }

    #[test]
    fn test_small_int_immediate_is_signed() {
        let mut decoded = decode(&ret_7_stream()).unwrap();
        let len = decoded.len();
        decoded[len - 2].operands[1] = -3;
        let encoded = Encoder::new().encode_stream(&decoded).unwrap();
        assert_eq!(encoded[len - 2].imm16() as i16, -3);

        let again = decode(&encoded).unwrap();
        assert_eq!(again[len - 2].operands, vec![0, -3]);
    }

    #[test]
    fn test_small_int_immediate_range() {
        let encoder = Encoder::new();
        for value in [40_000, i32::from(i16::MIN) - 1] {
            let err = encoder
                .encode(&DecodedInstruction::new(Opcode::LoadSmallInt, &[0, value]))
                .unwrap_err();
            assert_eq!(
                err,
                BytecodeError::OperandRange {
                    opcode: Opcode::LoadSmallInt,
                    index: 1,
                    value,
                    min: -32768,
                    max: 32767,
                }
            );
        }
        assert!(encoder
            .encode(&DecodedInstruction::new(Opcode::LoadSmallInt, &[0, 32767]))
            .is_ok());
    }

    #[test]
    fn test_index_immediate_rejects_negative() {
        let err = Encoder::new()
            .encode(&DecodedInstruction::new(Opcode::LoadConst, &[0, -1]))
            .unwrap_err();
        assert!(matches!(
            err,
            BytecodeError::OperandRange {
                value: -1,
                min: 0,
                max: 65535,
                ..
            }
        ));
    }

    #[test]
    fn test_unknown_opcode() {
        let err = decode(&[Instruction::from_raw(0xEE00_0000)]).unwrap_err();
        assert_eq!(err, BytecodeError::UnknownOpcode { offset: 0, byte: 0xEE });
    }

    #[test]
    fn test_operand_count_mismatch() {
        let err = Encoder::new()
            .encode(&DecodedInstruction::new(Opcode::Return, &[]))
            .unwrap_err();
        assert!(matches!(
            err,
            BytecodeError::OperandCount {
                expected: 1,
                found: 0,
                ..
            }
        ));
    }

    #[test]
    fn test_operand_range() {
        let err = Encoder::new()
            .encode(&DecodedInstruction::new(Opcode::Move, &[300, 1]))
            .unwrap_err();
        assert!(matches!(
            err,
            BytecodeError::OperandRange {
                index: 0,
                value: 300,
                ..
            }
        ));
    }
}
