use super::Suppression;
use std::sync::{Arc, Mutex};

/// A stack of suppression scopes.
///
/// Each pushed scope adds its entries on top of the outer scopes; the active
/// set is the union, innermost first so inner declarations win declaration
/// order within the scoped tier. Popping restores the outer set. Handles are
/// clonable so the pipeline and callers can share one manager.
#[derive(Clone, Default)]
pub struct ScopedSuppressions {
    stack: Arc<Mutex<Vec<Vec<Suppression>>>>,
}

/// RAII guard: dropping pops the scope it opened.
pub struct ScopeGuard {
    stack: Arc<Mutex<Vec<Vec<Suppression>>>>,
}

impl ScopedSuppressions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a scope; the returned guard pops it on drop.
    #[must_use = "dropping the guard immediately pops the scope"]
    pub fn push(&self, suppressions: Vec<Suppression>) -> ScopeGuard {
        self.stack
            .lock()
            .expect("suppression scope lock poisoned")
            .push(suppressions);
        ScopeGuard {
            stack: Arc::clone(&self.stack),
        }
    }

    /// Snapshot of the active entries, innermost scope first.
    pub fn active(&self) -> Vec<Suppression> {
        let stack = self.stack.lock().expect("suppression scope lock poisoned");
        stack.iter().rev().flatten().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        let stack = self.stack.lock().expect("suppression scope lock poisoned");
        stack.iter().all(|scope| scope.is_empty())
    }
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        if let Ok(mut stack) = self.stack.lock() {
            stack.pop();
        }
    }
}
