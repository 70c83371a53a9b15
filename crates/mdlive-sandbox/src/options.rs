use std::{collections::BTreeSet, time::Duration};

use smol_str::SmolStr;

use crate::error::SandboxError;

pub const DEFAULT_TIME_LIMIT: Duration = Duration::from_secs(5);
pub const DEFAULT_MEMORY_LIMIT: usize = 16 * 1024 * 1024;

/// Name of the single host module a context can be granted.
pub const HOST_MODULE: &str = "host";

/// Host modules a fragment is allowed to import.
///
/// The set is fixed when the execution context is created. Nothing outside the
/// set is ever linked, so fragments have no ambient imports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilitySet {
    modules: BTreeSet<SmolStr>,
}

impl CapabilitySet {
    /// A set granting exactly one host module.
    pub fn grant(module: &str) -> Result<Self, SandboxError> {
        if module != HOST_MODULE {
            return Err(SandboxError::UnknownCapability(module.to_string()));
        }

        Ok(Self {
            modules: BTreeSet::from([SmolStr::new(module)]),
        })
    }

    /// A set granting nothing: fragments can only compute and define exports.
    pub fn none() -> Self {
        Self {
            modules: BTreeSet::new(),
        }
    }

    pub fn allows(&self, module: &str) -> bool {
        self.modules.contains(module)
    }

    pub fn modules(&self) -> impl Iterator<Item = &str> {
        self.modules.iter().map(SmolStr::as_str)
    }
}

impl Default for CapabilitySet {
    fn default() -> Self {
        Self {
            modules: BTreeSet::from([SmolStr::new_static(HOST_MODULE)]),
        }
    }
}

/// Immutable configuration carried unchanged through a whole traversal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvalOptions {
    time_limit: Duration,
    memory_limit: usize,
    capabilities: CapabilitySet,
}

impl Default for EvalOptions {
    fn default() -> Self {
        Self {
            time_limit: DEFAULT_TIME_LIMIT,
            memory_limit: DEFAULT_MEMORY_LIMIT,
            capabilities: CapabilitySet::default(),
        }
    }
}

impl EvalOptions {
    pub fn new(time_limit: Duration) -> Result<Self, SandboxError> {
        Self::default().with_time_limit(time_limit)
    }

    pub fn with_time_limit(mut self, time_limit: Duration) -> Result<Self, SandboxError> {
        if time_limit.is_zero() {
            return Err(SandboxError::InvalidTimeLimit);
        }
        self.time_limit = time_limit;
        Ok(self)
    }

    /// Sets the program-space quota in bytes.
    pub fn with_memory_limit(mut self, memory_limit: usize) -> Result<Self, SandboxError> {
        if memory_limit == 0 {
            return Err(SandboxError::InvalidMemoryLimit);
        }
        self.memory_limit = memory_limit;
        Ok(self)
    }

    pub fn with_capabilities(mut self, capabilities: CapabilitySet) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn time_limit(&self) -> Duration {
        self.time_limit
    }

    pub fn memory_limit(&self) -> usize {
        self.memory_limit
    }

    pub fn capabilities(&self) -> &CapabilitySet {
        &self.capabilities
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn test_defaults() {
        let options = EvalOptions::default();
        assert_eq!(options.time_limit(), DEFAULT_TIME_LIMIT);
        assert_eq!(options.memory_limit(), DEFAULT_MEMORY_LIMIT);
        assert!(options.capabilities().allows(HOST_MODULE));
    }

    #[rstest]
    #[case::zero(Duration::ZERO, false)]
    #[case::one_milli(Duration::from_millis(1), true)]
    #[case::seconds(Duration::from_secs(3), true)]
    fn test_time_limit_must_be_positive(#[case] limit: Duration, #[case] ok: bool) {
        assert_eq!(EvalOptions::new(limit).is_ok(), ok);
    }

    #[test]
    fn test_memory_limit_must_be_positive() {
        assert!(matches!(
            EvalOptions::default().with_memory_limit(0),
            Err(SandboxError::InvalidMemoryLimit)
        ));
    }

    #[rstest]
    #[case::host("host", true)]
    #[case::wasi("wasi_snapshot_preview1", false)]
    #[case::env("env", false)]
    fn test_grant(#[case] module: &str, #[case] ok: bool) {
        assert_eq!(CapabilitySet::grant(module).is_ok(), ok);
    }

    #[test]
    fn test_none_allows_nothing() {
        let caps = CapabilitySet::none();
        assert!(!caps.allows(HOST_MODULE));
        assert_eq!(caps.modules().count(), 0);
    }
}
