use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};

use crate::{
    error::{ExecError, SandboxError},
    options::EvalOptions,
};

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of an execution context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(u64);

impl ContextId {
    pub fn next() -> Self {
        Self(NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx{}", self.0)
    }
}

/// Synthetic identity of one fragment evaluation within a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UnitId {
    pub context: ContextId,
    pub index: usize,
}

impl UnitId {
    pub fn new(context: ContextId, index: usize) -> Self {
        Self { context, index }
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.context, self.index)
    }
}

/// A source of execution contexts.
pub trait Runtime {
    type Context: Context;

    /// Creates a fresh context: applies the memory quota and links exactly the
    /// granted capability modules.
    fn create_context(&self, options: &EvalOptions) -> Result<Self::Context, SandboxError>;
}

/// A disposable namespace shared by the fragments of one document.
///
/// Dropping the context releases everything it owns.
pub trait Context {
    fn id(&self) -> ContextId;

    /// Runs `code` to completion or until `options.time_limit()` expires and
    /// returns the text it printed. Output produced before a failure is dropped.
    fn run(&mut self, unit: UnitId, code: &str, options: &EvalOptions)
    -> Result<String, ExecError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_ids_are_unique() {
        let a = ContextId::next();
        let b = ContextId::next();
        assert_ne!(a, b);
    }

    #[test]
    fn test_unit_display() {
        let context = ContextId(7);
        assert_eq!(UnitId::new(context, 3).to_string(), "ctx7/3");
    }
}
