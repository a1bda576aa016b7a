//! Call frames.
//!
//! Each frame owns a register file sized from its code object. Named locals
//! (parameters first) occupy the leading registers.

use crate::error::{VmError, VmResult};
use crate::function::Function;
use cairn_compiler::{CodeObject, Instruction, bytecode::Register};
use cairn_core::Value;
use smallvec::SmallVec;
use std::sync::Arc;

/// Registers kept inline before spilling to the heap.
pub const INLINE_REGISTERS: usize = 16;

/// An activation record.
#[derive(Debug)]
pub struct Frame {
    /// The function being executed.
    pub function: Arc<Function>,

    /// Code snapshot taken when the call started.
    pub code: Arc<CodeObject>,

    /// Index of the next instruction.
    pub ip: u32,

    /// Caller register that receives the return value.
    pub return_reg: Option<Register>,

    /// Register file.
    pub registers: SmallVec<[Value; INLINE_REGISTERS]>,
}

impl Frame {
    /// Create a frame for `function` with `args` in its parameter registers.
    pub fn new(function: Arc<Function>, args: &[Value]) -> VmResult<Self> {
        let code = function.code();
        let expected = code.arg_count as usize;
        if args.len() != expected {
            return Err(VmError::ArityMismatch {
                function: code.qualname.clone(),
                expected,
                given: args.len(),
            });
        }

        let size = (code.register_count as usize).max(args.len());
        let mut registers: SmallVec<[Value; INLINE_REGISTERS]> = SmallVec::with_capacity(size);
        registers.extend(args.iter().cloned());
        registers.resize(size, Value::None);

        Ok(Self {
            function,
            code,
            ip: 0,
            return_reg: None,
            registers,
        })
    }

    /// Fetch the next instruction and advance.
    #[inline]
    pub fn fetch(&mut self) -> Option<Instruction> {
        let inst = self.code.instructions.get(self.ip as usize).copied()?;
        self.ip += 1;
        Some(inst)
    }

    /// Read a register.
    #[inline]
    pub fn get(&self, reg: Register) -> VmResult<&Value> {
        self.registers
            .get(reg.index())
            .ok_or_else(|| self.out_of_range(reg))
    }

    /// Write a register.
    #[inline]
    pub fn set(&mut self, reg: Register, value: Value) -> VmResult<()> {
        match self.registers.get_mut(reg.index()) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(self.out_of_range(reg)),
        }
    }

    #[cold]
    fn out_of_range(&self, reg: Register) -> VmError {
        VmError::RegisterOutOfRange {
            function: self.code.qualname.clone(),
            pc: self.ip.saturating_sub(1),
            register: reg.0,
            count: self.registers.len(),
        }
    }

    /// Source line of the next instruction.
    #[inline]
    pub fn current_line(&self) -> Option<u32> {
        self.code.line_for_pc(self.ip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::Module;
    use cairn_compiler::FunctionBuilder;

    fn add_function() -> Arc<Function> {
        let module = Module::new("F");
        let mut builder = FunctionBuilder::new("add");
        let a = builder.define_param("a");
        let b = builder.define_param("b");
        let r = builder.alloc_register();
        builder.emit_add(r, a, b);
        builder.emit_return(r);
        module.define_function(builder.finish().unwrap())
    }

    #[test]
    fn test_new_frame_places_args() {
        let frame = Frame::new(add_function(), &[Value::int(1), Value::int(2)]).unwrap();
        assert_eq!(frame.registers.len(), 3);
        assert_eq!(frame.get(Register(0)), Ok(&Value::int(1)));
        assert_eq!(frame.get(Register(1)), Ok(&Value::int(2)));
        assert!(frame.get(Register(2)).unwrap().is_none());
        assert_eq!(frame.ip, 0);
    }

    #[test]
    fn test_register_outside_file_is_an_error() {
        let mut frame = Frame::new(add_function(), &[Value::int(1), Value::int(2)]).unwrap();
        frame.fetch();
        let expected = VmError::RegisterOutOfRange {
            function: "add".into(),
            pc: 0,
            register: 200,
            count: 3,
        };
        assert_eq!(frame.get(Register(200)), Err(expected.clone()));
        assert_eq!(frame.set(Register(200), Value::int(0)), Err(expected));
        assert_eq!(frame.set(Register(2), Value::int(9)), Ok(()));
        assert_eq!(frame.get(Register(2)), Ok(&Value::int(9)));
    }

    #[test]
    fn test_arity_checked() {
        let err = Frame::new(add_function(), &[Value::int(1)]).unwrap_err();
        assert_eq!(
            err,
            VmError::ArityMismatch {
                function: "add".into(),
                expected: 2,
                given: 1,
            }
        );
    }

    #[test]
    fn test_fetch_advances() {
        let mut frame = Frame::new(add_function(), &[Value::int(1), Value::int(2)]).unwrap();
        assert!(frame.fetch().is_some());
        assert_eq!(frame.ip, 1);
        assert!(frame.fetch().is_some());
        assert!(frame.fetch().is_none());
        assert_eq!(frame.ip, 2);
    }
}
