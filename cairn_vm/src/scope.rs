//! Static (lexical) scopes.

use crate::module::Module;
use std::fmt;
use std::sync::{Arc, Weak};

/// Lexical scope of a module body.
///
/// Functions capture the scope of the module they are defined in. The scope
/// refers to its module and to the enclosing module's scope weakly, so
/// scopes never keep modules alive.
pub struct StaticScope {
    module: Weak<Module>,
    parent: Option<Weak<StaticScope>>,
}

impl StaticScope {
    pub(crate) fn new(module: Weak<Module>, parent: Option<Weak<StaticScope>>) -> Self {
        Self { module, parent }
    }

    /// The module this scope belongs to.
    pub fn module(&self) -> Option<Arc<Module>> {
        self.module.upgrade()
    }

    /// The enclosing scope.
    pub fn parent(&self) -> Option<Arc<StaticScope>> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    pub(crate) fn module_weak(&self) -> &Weak<Module> {
        &self.module
    }

    pub(crate) fn parent_weak(&self) -> Option<&Weak<StaticScope>> {
        self.parent.as_ref()
    }

    /// Modules from this scope outwards, stopping at the first dropped one.
    pub fn modules(&self) -> Vec<Arc<Module>> {
        let mut chain = Vec::new();
        let mut module = self.module();
        while let Some(current) = module {
            module = current.parent().cloned();
            chain.push(current);
        }
        chain
    }
}

impl fmt::Debug for StaticScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticScope")
            .field("module", &self.module().map(|m| m.path()))
            .field("has_parent", &self.parent.is_some())
            .finish()
    }
}
