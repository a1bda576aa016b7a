//! Function objects.

use crate::error::{VmError, VmResult};
use crate::module::Module;
use crate::scope::StaticScope;
use cairn_compiler::bytecode::{DecodedInstruction, Encoder, decode};
use cairn_compiler::CodeObject;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

/// A named function bound to the scope it was defined in.
///
/// The code can be swapped at any time. Frames already running keep the
/// code object they started with.
pub struct Function {
    name: Arc<str>,
    code: RwLock<Arc<CodeObject>>,
    scope: Arc<StaticScope>,
}

impl Function {
    pub(crate) fn new(code: CodeObject, scope: Arc<StaticScope>) -> Self {
        Self {
            name: code.name.clone(),
            code: RwLock::new(Arc::new(code)),
            scope,
        }
    }

    /// Function name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub(crate) fn name_arc(&self) -> Arc<str> {
        Arc::clone(&self.name)
    }

    /// The code that the next call will run.
    pub fn code(&self) -> Arc<CodeObject> {
        Arc::clone(&self.code.read())
    }

    /// Install new code, returning the previous code object.
    pub fn replace_code(&self, code: CodeObject) -> Arc<CodeObject> {
        std::mem::replace(&mut *self.code.write(), Arc::new(code))
    }

    /// Rewrite the instruction stream.
    ///
    /// The current instructions are decoded, handed to `edit`, re-encoded and
    /// installed. Nothing is installed if `edit` or encoding fails.
    pub fn rewrite_with<F>(&self, edit: F) -> VmResult<Arc<CodeObject>>
    where
        F: FnOnce(&mut Vec<DecodedInstruction>) -> VmResult<()>,
    {
        let mut code = self.code.write();
        let mut decoded = decode(&code.instructions)?;
        edit(&mut decoded)?;
        let instructions = Encoder::new().encode_stream(&decoded)?;
        let rewritten = code.with_instructions(instructions);
        Ok(std::mem::replace(&mut *code, Arc::new(rewritten)))
    }

    /// Defining scope.
    #[inline]
    pub fn scope(&self) -> &Arc<StaticScope> {
        &self.scope
    }

    /// Defining module.
    pub fn module(&self) -> VmResult<Arc<Module>> {
        self.scope
            .module()
            .ok_or_else(|| VmError::ModuleDropped(self.name_arc()))
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("name", &self.name)
            .field("qualname", &self.code().qualname)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_compiler::{FunctionBuilder, Opcode};

    fn ret(value: i64) -> CodeObject {
        let mut builder = FunctionBuilder::new("answer");
        let r = builder.alloc_register();
        builder.emit_load_int(r, value);
        builder.emit_return(r);
        builder.finish().unwrap()
    }

    #[test]
    fn test_replace_code_keeps_old_snapshot() {
        let module = Module::new("M");
        let function = module.define_function(ret(1));
        let before = function.code();
        let previous = function.replace_code(ret(2));
        assert!(Arc::ptr_eq(&before, &previous));
        assert!(!Arc::ptr_eq(&before, &function.code()));
        assert_eq!(before.instructions[0].imm16(), 1);
    }

    #[test]
    fn test_rewrite_with_edits_immediate() {
        let module = Module::new("M");
        let function = module.define_function(ret(7));
        let old = function
            .rewrite_with(|insts| {
                let load = &mut insts[0];
                assert_eq!(load.opcode, Opcode::LoadSmallInt);
                load.operands[1] = 12;
                Ok(())
            })
            .unwrap();
        assert_eq!(old.instructions[0].imm16(), 7);
        assert_eq!(function.code().instructions[0].imm16(), 12);
    }

    #[test]
    fn test_failed_rewrite_installs_nothing() {
        let module = Module::new("M");
        let function = module.define_function(ret(7));
        let before = function.code();
        let err = function
            .rewrite_with(|insts| {
                insts[0].operands.push(0);
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(err, VmError::Bytecode(_)));
        assert!(Arc::ptr_eq(&before, &function.code()));
    }

    #[test]
    fn test_rewrite_with_negative_and_oversized_immediates() {
        let module = Module::new("M");
        let function = module.define_function(ret(7));
        function
            .rewrite_with(|insts| {
                insts[0].operands[1] = -3;
                Ok(())
            })
            .unwrap();
        assert_eq!(function.code().instructions[0].imm16() as i16, -3);

        let before = function.code();
        let err = function
            .rewrite_with(|insts| {
                insts[0].operands[1] = 40_000;
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(
            err,
            VmError::Bytecode(cairn_compiler::BytecodeError::OperandRange { value: 40_000, .. })
        ));
        assert!(Arc::ptr_eq(&before, &function.code()));
    }

    #[test]
    fn test_rejected_edit_installs_nothing() {
        let module = Module::new("M");
        let function = module.define_function(ret(7));
        let before = function.code();
        let err = function
            .rewrite_with(|insts| {
                insts[0].operands[1] = 1;
                Err(VmError::ModuleDropped("answer".into()))
            })
            .unwrap_err();
        assert_eq!(err, VmError::ModuleDropped("answer".into()));
        assert!(Arc::ptr_eq(&before, &function.code()));
    }

    #[test]
    fn test_module_dropped() {
        let function = {
            let module = Module::new("Gone");
            module.define_function(ret(0))
        };
        assert_eq!(
            function.module().unwrap_err(),
            VmError::ModuleDropped("answer".into())
        );
    }
}
