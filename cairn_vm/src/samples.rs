//! The `ContextSpecs::A` fixture program.
//!
//! `ret_7` stops at a breakpoint, optionally runs a block three times and a
//! helper method, then returns 7. The returned integer can be rewritten in
//! place through the bytecode decoder and encoder.

use crate::error::{VmError, VmResult};
use crate::function::Function;
use crate::module::Module;
use cairn_compiler::bytecode::{CodeFlags, Opcode, disassemble};
use cairn_compiler::{CodeObject, FunctionBuilder};
use cairn_core::Value;
use std::fmt::Write;
use std::sync::Arc;

const FILENAME: &str = "context_specs.cairn";

/// Position `ret_7` resumes at after its breakpoint.
pub const RET_7_RESUME_IP: u32 = 2;

/// The built fixture modules.
#[derive(Debug, Clone)]
pub struct ContextSpecs {
    /// `ContextSpecs`.
    pub root: Arc<Module>,
    /// `ContextSpecs::A`, where every fixture function lives.
    pub a: Arc<Module>,
}

impl ContextSpecs {
    /// Build the fixture.
    pub fn build() -> VmResult<Self> {
        let root = Module::new("ContextSpecs");
        let a = Module::nested(&root, "A");

        a.define_function(ret_7()?);
        a.define_function(ret_7_block()?);
        a.define_function(called_from_ret_7()?);
        a.define_function(call_ret_7()?);

        Ok(Self { root, a })
    }

    /// Look up a fixture function.
    pub fn function(&self, name: &str) -> VmResult<Arc<Function>> {
        self.a
            .function(name)
            .ok_or_else(|| VmError::UnknownFunction {
                name: name.into(),
                module: self.a.path(),
            })
    }

    /// The `ret_7` function.
    pub fn ret_7(&self) -> VmResult<Arc<Function>> {
        self.function("ret_7")
    }

    /// Arguments for `ret_7` and `call_ret_7`.
    pub fn args(call_block: bool, call_method: bool) -> Vec<Value> {
        vec![Value::bool(call_block), Value::bool(call_method)]
    }

    /// Make `ret_7` return `value` from its next call on.
    ///
    /// Rewrites the operand of the second-to-last instruction (the final
    /// `load_int`) and returns the code object that was replaced. Fails
    /// without installing anything if that instruction is not a `load_int`.
    pub fn change_ret(&self, value: i16) -> VmResult<Arc<CodeObject>> {
        let function = self.ret_7()?;
        let qualname = function.code().qualname.clone();
        function.rewrite_with(|insts| {
            let pc = insts.len().saturating_sub(2);
            match insts.get_mut(pc) {
                Some(load) if load.opcode == Opcode::LoadSmallInt => {
                    load.operands[1] = i32::from(value);
                    Ok(())
                }
                other => Err(VmError::UnexpectedInstruction {
                    function: qualname,
                    pc,
                    expected: Opcode::LoadSmallInt,
                    found: other.map(|inst| inst.opcode),
                }),
            }
        })
    }

    /// Whether the block body has run.
    pub fn called_block(&self) -> bool {
        self.a.get_global("called_block").is_some_and(|v| v.is_truthy())
    }

    /// Whether `called_from_ret_7` has run.
    pub fn called_from_ret_7(&self) -> bool {
        self.a
            .get_global("called_from_ret_7")
            .is_some_and(|v| v.is_truthy())
    }

    /// Disassembly of `ret_7` and its static scope.
    pub fn describe(&self) -> VmResult<String> {
        let function = self.ret_7()?;
        let scope = function.scope();
        let mut out = String::from("ret_7 bytecode:\n");
        out.push_str(&disassemble(&function.code()));
        let module = scope.module().map(|m| m.path()).unwrap_or_default();
        let parent = scope
            .parent()
            .and_then(|p| p.module())
            .map(|m| m.path())
            .unwrap_or_default();
        let _ = writeln!(out, "Static scope: {}  {}", module, parent);
        Ok(out)
    }
}

fn builder(name: &str, line: u32) -> FunctionBuilder {
    let mut b = FunctionBuilder::new(name);
    b.set_qualname(format!("ContextSpecs::A#{}", name));
    b.set_filename(FILENAME);
    b.set_first_lineno(line);
    b
}

fn ret_7() -> VmResult<CodeObject> {
    let mut b = builder("ret_7", 4);
    let call_block = b.define_param("call_block");
    let call_method = b.define_param("call_method");
    let result = b.alloc_register();

    b.set_line(6);
    b.emit_load_none(result);
    b.emit_yield_debugger();

    // [1, 2, 3].each { |a| ... }
    let after_block = b.create_label();
    b.set_line(7);
    b.emit_jump_if_false(call_block, after_block);
    let i = b.alloc_register();
    let limit = b.alloc_register();
    let one = b.alloc_register();
    let cond = b.alloc_register();
    let dst = b.alloc_register();
    let arg = b.alloc_register();
    let head = b.create_label();
    b.set_line(8);
    b.emit_load_int(i, 1);
    b.emit_load_int(limit, 4);
    b.emit_load_int(one, 1);
    b.bind_label(head);
    b.emit_lt(cond, i, limit);
    b.emit_jump_if_false(cond, after_block);
    b.emit_move(arg, i);
    b.emit_call(dst, "ret_7_block", 1);
    b.emit_add(i, i, one);
    b.emit_jump(head);
    b.bind_label(after_block);

    let after_method = b.create_label();
    b.set_line(10);
    b.emit_jump_if_false(call_method, after_method);
    b.set_line(11);
    b.emit_call(dst, "called_from_ret_7", 0);
    b.bind_label(after_method);

    b.set_line(13);
    b.emit_load_int(result, 7);
    b.emit_return(result);
    Ok(b.finish()?)
}

fn ret_7_block() -> VmResult<CodeObject> {
    let mut b = builder("ret_7_block", 8);
    b.set_qualname("ContextSpecs::A#ret_7{block}");
    b.add_flags(CodeFlags::BLOCK | CodeFlags::NESTED);
    let a = b.define_param("a");
    let two = b.alloc_register();
    let flag = b.alloc_register();
    b.emit_load_int(two, 2);
    b.emit_mul(two, a, two);
    b.emit_load_true(flag);
    b.emit_store_global("called_block", flag);
    b.emit_return(flag);
    Ok(b.finish()?)
}

fn called_from_ret_7() -> VmResult<CodeObject> {
    let mut b = builder("called_from_ret_7", 54);
    let flag = b.alloc_register();
    b.set_line(55);
    b.emit_load_true(flag);
    b.emit_store_global("called_from_ret_7", flag);
    b.emit_return(flag);
    Ok(b.finish()?)
}

fn call_ret_7() -> VmResult<CodeObject> {
    let mut b = builder("call_ret_7", 49);
    let call_block = b.define_param("call_block");
    let call_method = b.define_param("call_method");
    let dst = b.alloc_register();
    let block_arg = b.alloc_register();
    let method_arg = b.alloc_register();
    b.set_line(50);
    b.emit_move(block_arg, call_block);
    b.emit_move(method_arg, call_method);
    b.emit_call(dst, "ret_7", 2);
    b.emit_return(dst);
    Ok(b.finish()?)
}
