//! Modules: named namespaces holding globals and functions.

use crate::function::Function;
use crate::scope::StaticScope;
use cairn_compiler::CodeObject;
use cairn_core::Value;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::Arc;

/// A namespace.
///
/// Modules nest: a nested module keeps its parent alive, and function lookup
/// falls back to enclosing modules.
pub struct Module {
    name: Arc<str>,
    parent: Option<Arc<Module>>,
    scope: Arc<StaticScope>,
    globals: RwLock<FxHashMap<Arc<str>, Value>>,
    functions: RwLock<FxHashMap<Arc<str>, Arc<Function>>>,
}

impl Module {
    /// Create a top-level module.
    pub fn new(name: impl Into<Arc<str>>) -> Arc<Module> {
        Self::build(name.into(), None)
    }

    /// Create a module nested in `parent`.
    pub fn nested(parent: &Arc<Module>, name: impl Into<Arc<str>>) -> Arc<Module> {
        Self::build(name.into(), Some(Arc::clone(parent)))
    }

    fn build(name: Arc<str>, parent: Option<Arc<Module>>) -> Arc<Module> {
        Arc::new_cyclic(|this| {
            let parent_scope = parent.as_ref().map(|p| Arc::downgrade(&p.scope));
            Module {
                name,
                scope: Arc::new(StaticScope::new(this.clone(), parent_scope)),
                parent,
                globals: RwLock::new(FxHashMap::default()),
                functions: RwLock::new(FxHashMap::default()),
            }
        })
    }

    /// Short name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Enclosing module.
    #[inline]
    pub fn parent(&self) -> Option<&Arc<Module>> {
        self.parent.as_ref()
    }

    /// The module body's lexical scope.
    #[inline]
    pub fn scope(&self) -> &Arc<StaticScope> {
        &self.scope
    }

    /// Fully qualified path, e.g. `Outer::Inner`.
    pub fn path(&self) -> String {
        match &self.parent {
            Some(parent) => format!("{}::{}", parent.path(), self.name),
            None => self.name.to_string(),
        }
    }

    // =========================================================================
    // Globals
    // =========================================================================

    /// Read a global.
    pub fn get_global(&self, name: &str) -> Option<Value> {
        self.globals.read().get(name).cloned()
    }

    /// Assign a global.
    pub fn set_global(&self, name: impl Into<Arc<str>>, value: Value) {
        self.globals.write().insert(name.into(), value);
    }

    /// Whether a global has been assigned.
    pub fn has_global(&self, name: &str) -> bool {
        self.globals.read().contains_key(name)
    }

    // =========================================================================
    // Functions
    // =========================================================================

    /// Define (or redefine) a function named after its code object.
    pub fn define_function(self: &Arc<Self>, code: CodeObject) -> Arc<Function> {
        let function = Arc::new(Function::new(code, Arc::clone(&self.scope)));
        self.functions
            .write()
            .insert(function.name_arc(), Arc::clone(&function));
        function
    }

    /// Look up a function defined directly in this module.
    pub fn function(&self, name: &str) -> Option<Arc<Function>> {
        self.functions.read().get(name).cloned()
    }

    /// Look up a function here or in any enclosing module.
    pub fn resolve_function(&self, name: &str) -> Option<Arc<Function>> {
        if let Some(function) = self.function(name) {
            return Some(function);
        }
        self.parent.as_ref().and_then(|p| p.resolve_function(name))
    }

    /// Names of functions defined directly in this module, sorted.
    pub fn function_names(&self) -> Vec<Arc<str>> {
        let mut names: Vec<_> = self.functions.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("path", &self.path())
            .field("functions", &self.function_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_compiler::FunctionBuilder;

    fn code(name: &str) -> CodeObject {
        let mut builder = FunctionBuilder::new(name);
        let r = builder.alloc_register();
        builder.emit_load_none(r);
        builder.emit_return(r);
        builder.finish().unwrap()
    }

    #[test]
    fn test_path() {
        let outer = Module::new("ContextSpecs");
        let inner = Module::nested(&outer, "A");
        assert_eq!(outer.path(), "ContextSpecs");
        assert_eq!(inner.path(), "ContextSpecs::A");
        assert_eq!(inner.name(), "A");
        assert!(Arc::ptr_eq(inner.parent().unwrap(), &outer));
    }

    #[test]
    fn test_scope_points_back() {
        let outer = Module::new("Outer");
        let inner = Module::nested(&outer, "Inner");
        assert!(Arc::ptr_eq(&inner.scope().module().unwrap(), &inner));
        assert!(Arc::ptr_eq(&inner.scope().parent().unwrap(), outer.scope()));
        assert!(outer.scope().parent().is_none());

        let chain: Vec<_> = inner.scope().modules().iter().map(|m| m.path()).collect();
        assert_eq!(chain, ["Outer::Inner", "Outer"]);
    }

    #[test]
    fn test_globals() {
        let module = Module::new("G");
        assert_eq!(module.get_global("x"), None);
        module.set_global("x", Value::int(1));
        assert!(module.has_global("x"));
        assert_eq!(module.get_global("x"), Some(Value::int(1)));
    }

    #[test]
    fn test_function_lookup_walks_parents() {
        let outer = Module::new("Outer");
        let inner = Module::nested(&outer, "Inner");
        outer.define_function(code("helper"));
        inner.define_function(code("local"));

        assert!(inner.function("helper").is_none());
        assert!(inner.resolve_function("helper").is_some());
        assert!(inner.resolve_function("local").is_some());
        assert!(outer.resolve_function("local").is_none());
        assert_eq!(inner.function_names(), vec![Arc::<str>::from("local")]);
    }

    #[test]
    fn test_redefine_replaces() {
        let module = Module::new("M");
        let first = module.define_function(code("f"));
        let second = module.define_function(code("f"));
        assert!(!Arc::ptr_eq(&first, &second));
        assert!(Arc::ptr_eq(&module.function("f").unwrap(), &second));
    }
}
