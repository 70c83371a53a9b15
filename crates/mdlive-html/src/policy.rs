use std::fmt;

use rustc_hash::{FxHashMap, FxHashSet};
use smol_str::SmolStr;

/// An operation as seen by a [`Policy`]: where it lives and how it is called.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpRef<'a> {
    pub module: &'a str,
    pub name: &'a str,
    pub arity: usize,
}

impl fmt::Display for OpRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}/{}", self.module, self.name, self.arity)
    }
}

/// The module on whose behalf a spec is built.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeclaringContext {
    module: SmolStr,
}

impl DeclaringContext {
    pub fn new(module: impl Into<SmolStr>) -> Self {
        Self {
            module: module.into(),
        }
    }

    pub fn module(&self) -> &str {
        &self.module
    }
}

pub trait Policy {
    fn is_allowed(&self, op: &OpRef<'_>, context: &DeclaringContext) -> bool;
}

impl<F> Policy for F
where
    F: Fn(&OpRef<'_>, &DeclaringContext) -> bool,
{
    fn is_allowed(&self, op: &OpRef<'_>, context: &DeclaringContext) -> bool {
        self(op, context)
    }
}

/// Allows operations listed for everyone or for the declaring module.
///
/// Entries are qualified by the module that owns the operation, so an
/// operation registered under another module with the same name is not
/// covered.
#[derive(Debug, Clone, Default)]
pub struct Whitelist {
    global: FxHashSet<(SmolStr, SmolStr)>,
    per_module: FxHashMap<SmolStr, FxHashSet<(SmolStr, SmolStr)>>,
}

impl Whitelist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allow(mut self, module: impl Into<SmolStr>, name: impl Into<SmolStr>) -> Self {
        self.global.insert((module.into(), name.into()));
        self
    }

    pub fn allow_in(
        mut self,
        declaring: impl Into<SmolStr>,
        module: impl Into<SmolStr>,
        name: impl Into<SmolStr>,
    ) -> Self {
        self.per_module
            .entry(declaring.into())
            .or_default()
            .insert((module.into(), name.into()));
        self
    }

    fn contains(set: &FxHashSet<(SmolStr, SmolStr)>, op: &OpRef<'_>) -> bool {
        set.contains(&(SmolStr::new(op.module), SmolStr::new(op.name)))
    }
}

impl Policy for Whitelist {
    fn is_allowed(&self, op: &OpRef<'_>, context: &DeclaringContext) -> bool {
        Self::contains(&self.global, op)
            || self
                .per_module
                .get(context.module())
                .is_some_and(|set| Self::contains(set, op))
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn op<'a>(module: &'a str, name: &'a str) -> OpRef<'a> {
        OpRef {
            module,
            name,
            arity: 1,
        }
    }

    #[rstest]
    #[case::global("page", op("html", "text"), true)]
    #[case::other_owner("page", op("fs", "text"), false)]
    #[case::per_module("admin", op("fs", "read"), true)]
    #[case::per_module_elsewhere("page", op("fs", "read"), false)]
    #[case::unlisted("admin", op("net", "fetch"), false)]
    fn test_whitelist(#[case] declaring: &str, #[case] op: OpRef<'_>, #[case] allowed: bool) {
        let policy = Whitelist::new()
            .allow("html", "text")
            .allow_in("admin", "fs", "read");

        assert_eq!(
            policy.is_allowed(&op, &DeclaringContext::new(declaring)),
            allowed
        );
    }

    #[test]
    fn test_closure_policy() {
        let policy = |op: &OpRef<'_>, _: &DeclaringContext| op.arity == 0;
        let ctx = DeclaringContext::new("m");

        assert!(!policy.is_allowed(&op("a", "b"), &ctx));
    }

    #[test]
    fn test_op_ref_display() {
        assert_eq!(op("html", "text").to_string(), "html:text/1");
    }
}
