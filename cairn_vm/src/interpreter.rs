//! Tier-0 interpreter.
//!
//! Runs one task's call stack to completion. The instruction pointer is
//! advanced before an instruction executes, so a breakpoint observes the
//! position of the instruction that follows it.

use crate::debug::{self, ExecutionContext};
use crate::error::{VmError, VmResult};
use crate::frame::Frame;
use crate::function::Function;
use crate::module::Module;
use crate::task::TaskRef;
use crate::vm::Vm;
use cairn_compiler::bytecode::Register;
use cairn_compiler::{Instruction, Opcode};
use cairn_core::Value;
use std::sync::Arc;
use tracing::trace;

/// What the dispatch loop does after an instruction.
enum Step {
    Continue,
    Call {
        dst: Register,
        callee: Arc<Function>,
        args: Vec<Value>,
    },
    Return(Value),
    Breakpoint,
}

/// Interpreter state for one task.
pub struct Interpreter {
    vm: Vm,
    task: TaskRef,
    frames: Vec<Frame>,
}

impl Interpreter {
    /// Create an interpreter for `task`.
    pub fn new(vm: Vm, task: TaskRef) -> Self {
        Self {
            vm,
            task,
            frames: Vec::new(),
        }
    }

    /// The task this interpreter runs.
    #[inline]
    pub fn task(&self) -> &TaskRef {
        &self.task
    }

    /// Call `function` and run until it returns.
    pub fn run(&mut self, function: Arc<Function>, args: &[Value]) -> VmResult<Value> {
        let base = self.frames.len();
        self.push_frame(Frame::new(function, args)?)?;
        let result = self.execute(base);
        self.frames.truncate(base);
        result
    }

    fn push_frame(&mut self, frame: Frame) -> VmResult<()> {
        let limit = self.vm.config().max_recursion_depth;
        if self.frames.len() >= limit {
            return Err(VmError::RecursionLimit(limit));
        }
        trace!(task = %self.task, function = %frame.code.qualname, depth = self.frames.len(), "call");
        self.frames.push(frame);
        Ok(())
    }

    fn execute(&mut self, base: usize) -> VmResult<Value> {
        loop {
            match self.step()? {
                Step::Continue => {}
                Step::Call { dst, callee, args } => {
                    let mut frame = Frame::new(callee, &args)?;
                    frame.return_reg = Some(dst);
                    self.push_frame(frame)?;
                }
                Step::Return(value) => {
                    let finished = self.frames.pop();
                    if self.frames.len() <= base {
                        return Ok(value);
                    }
                    let dst = finished.and_then(|f| f.return_reg);
                    if let (Some(caller), Some(dst)) = (self.frames.last_mut(), dst) {
                        caller.set(dst, value)?;
                    }
                }
                Step::Breakpoint => self.breakpoint()?,
            }
        }
    }

    fn breakpoint(&self) -> VmResult<()> {
        let Some((current, callers)) = self.frames.split_last() else {
            return Ok(());
        };
        let context = ExecutionContext::capture(self.task.clone(), current, callers);
        debug::yield_debugger(self.vm.debug_hub(), &self.task, context)?;
        Ok(())
    }

    fn step(&mut self) -> VmResult<Step> {
        let Some(frame) = self.frames.last_mut() else {
            return Ok(Step::Return(Value::None));
        };
        let Some(inst) = frame.fetch() else {
            return Ok(Step::Return(Value::None));
        };
        let Some(opcode) = inst.opcode() else {
            return Err(invalid(frame, inst));
        };

        let a = Register(inst.a());
        let b = Register(inst.b());
        let c = Register(inst.c());

        match opcode {
            Opcode::Nop => {}
            Opcode::LoadConst => {
                let value = frame
                    .code
                    .constants
                    .get(inst.imm16() as usize)
                    .cloned()
                    .ok_or_else(|| invalid(frame, inst))?;
                frame.set(a, value)?;
            }
            Opcode::LoadSmallInt => frame.set(a, Value::int(inst.imm16() as i16 as i64))?,
            Opcode::LoadNone => frame.set(a, Value::None)?,
            Opcode::LoadTrue => frame.set(a, Value::bool(true))?,
            Opcode::LoadFalse => frame.set(a, Value::bool(false))?,
            Opcode::LoadGlobal => {
                let name = global_name(frame, inst, inst.imm16())?;
                let module = frame.function.module()?;
                let value = lookup_global(&module, &name).ok_or_else(|| VmError::UndefinedGlobal {
                    name,
                    module: module.path(),
                })?;
                frame.set(a, value)?;
            }
            Opcode::StoreGlobal => {
                let name = global_name(frame, inst, inst.imm16())?;
                let module = frame.function.module()?;
                module.set_global(name, frame.get(a)?.clone());
            }
            Opcode::Move => {
                let value = frame.get(b)?.clone();
                frame.set(a, value)?;
            }
            Opcode::Add => {
                let value = frame.get(b)?.add(frame.get(c)?)?;
                frame.set(a, value)?;
            }
            Opcode::Sub => {
                let value = frame.get(b)?.sub(frame.get(c)?)?;
                frame.set(a, value)?;
            }
            Opcode::Mul => {
                let value = frame.get(b)?.mul(frame.get(c)?)?;
                frame.set(a, value)?;
            }
            Opcode::Lt => {
                let value = frame.get(b)?.lt(frame.get(c)?)?;
                frame.set(a, value)?;
            }
            Opcode::Jump => frame.ip = inst.imm16() as u32,
            Opcode::JumpIfFalse => {
                if !frame.get(a)?.is_truthy() {
                    frame.ip = inst.imm16() as u32;
                }
            }
            Opcode::Call => {
                let name = global_name(frame, inst, inst.b() as u16)?;
                let module = frame.function.module()?;
                let callee = module.resolve_function(&name).ok_or_else(|| VmError::UnknownFunction {
                    name,
                    module: module.path(),
                })?;
                let first = a.index() + 1;
                let args = frame
                    .registers
                    .get(first..first + c.index())
                    .ok_or_else(|| invalid(frame, inst))?
                    .to_vec();
                return Ok(Step::Call {
                    dst: a,
                    callee,
                    args,
                });
            }
            Opcode::YieldDebugger => return Ok(Step::Breakpoint),
            Opcode::Return => return Ok(Step::Return(frame.get(a)?.clone())),
        }
        Ok(Step::Continue)
    }
}

fn invalid(frame: &Frame, inst: Instruction) -> VmError {
    VmError::InvalidInstruction {
        function: frame.code.qualname.clone(),
        pc: frame.ip.saturating_sub(1),
        raw: inst.raw(),
    }
}

fn global_name(frame: &Frame, inst: Instruction, idx: u16) -> VmResult<Arc<str>> {
    frame
        .code
        .names
        .get(idx as usize)
        .cloned()
        .ok_or_else(|| invalid(frame, inst))
}

/// Read a global from `module` or the nearest enclosing module defining it.
fn lookup_global(module: &Arc<Module>, name: &str) -> Option<Value> {
    let mut current = Some(module);
    while let Some(m) = current {
        if let Some(value) = m.get_global(name) {
            return Some(value);
        }
        current = m.parent();
    }
    None
}
