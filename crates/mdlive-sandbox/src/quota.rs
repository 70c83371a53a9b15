//! Program-space budget shared by every fragment of one execution context.
//!
//! Instances created by earlier fragments stay alive in the store for the rest
//! of the document, so the budget is charged cumulatively: linear memories,
//! tables and the output buffer of the running fragment all draw from the same
//! number of bytes.

use thiserror::Error;
use wasmtime::ResourceLimiter;

/// Bytes charged per table element.
pub(crate) const TABLE_ELEMENT_SIZE: usize = std::mem::size_of::<usize>();

pub(crate) const MAX_INSTANCES: usize = 1_000;
pub(crate) const MAX_MEMORIES: usize = 1_000;
pub(crate) const MAX_TABLES: usize = 1_000;

/// Raised when a context runs out of its budget.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub(crate) struct QuotaExceeded(pub(crate) String);

#[derive(Debug)]
pub(crate) struct Quota {
    limit: usize,
    storage: usize,
    output: usize,
    pending: usize,
    instances: usize,
    memories: usize,
    tables: usize,
}

impl Quota {
    pub(crate) fn new(limit: usize) -> Self {
        Self {
            limit,
            storage: 0,
            output: 0,
            pending: 0,
            instances: 0,
            memories: 0,
            tables: 0,
        }
    }

    pub(crate) fn used(&self) -> usize {
        self.storage + self.output
    }

    /// Accounts for one more instance with the given number of memories and
    /// tables.
    pub(crate) fn admit(&mut self, memories: usize, tables: usize) -> Result<(), QuotaExceeded> {
        let instances = self.instances + 1;
        let memories = self.memories + memories;
        let tables = self.tables + tables;

        if instances > MAX_INSTANCES {
            return Err(QuotaExceeded(format!(
                "instance count exceeds {}",
                MAX_INSTANCES
            )));
        }
        if memories > MAX_MEMORIES {
            return Err(QuotaExceeded(format!(
                "memory count exceeds {}",
                MAX_MEMORIES
            )));
        }
        if tables > MAX_TABLES {
            return Err(QuotaExceeded(format!("table count exceeds {}", MAX_TABLES)));
        }

        self.instances = instances;
        self.memories = memories;
        self.tables = tables;
        Ok(())
    }

    /// Charges text appended to the output buffer.
    pub(crate) fn charge_output(&mut self, bytes: usize) -> Result<(), QuotaExceeded> {
        self.check(bytes, "output")?;
        self.output += bytes;
        Ok(())
    }

    /// Returns the output charge once the buffer has left the context.
    pub(crate) fn release_output(&mut self) {
        self.output = 0;
    }

    fn check(&self, bytes: usize, what: &str) -> Result<(), QuotaExceeded> {
        match self.used().checked_add(bytes) {
            Some(total) if total <= self.limit => Ok(()),
            _ => Err(QuotaExceeded(format!(
                "{} of {} bytes would exceed the {} byte limit",
                what, bytes, self.limit
            ))),
        }
    }

    fn grow_storage(&mut self, bytes: usize, what: &str) -> Result<(), QuotaExceeded> {
        self.check(bytes, what)?;
        self.storage += bytes;
        self.pending = bytes;
        Ok(())
    }

    fn refund_pending(&mut self) {
        self.storage -= self.pending;
        self.pending = 0;
    }
}

impl ResourceLimiter for Quota {
    fn memory_growing(
        &mut self,
        current: usize,
        desired: usize,
        _maximum: Option<usize>,
    ) -> wasmtime::Result<bool> {
        self.grow_storage(desired.saturating_sub(current), "memory growth")?;
        Ok(true)
    }

    fn memory_grow_failed(&mut self, error: wasmtime::Error) -> wasmtime::Result<()> {
        tracing::debug!(error = %error, "memory growth failed");
        self.refund_pending();
        Ok(())
    }

    fn table_growing(
        &mut self,
        current: usize,
        desired: usize,
        _maximum: Option<usize>,
    ) -> wasmtime::Result<bool> {
        let elements = desired.saturating_sub(current);
        let bytes = elements
            .checked_mul(TABLE_ELEMENT_SIZE)
            .ok_or_else(|| QuotaExceeded(format!("table of {} elements", desired)))?;
        self.grow_storage(bytes, "table growth")?;
        Ok(true)
    }

    fn table_grow_failed(&mut self, error: wasmtime::Error) -> wasmtime::Result<()> {
        tracing::debug!(error = %error, "table growth failed");
        self.refund_pending();
        Ok(())
    }

    fn instances(&self) -> usize {
        MAX_INSTANCES
    }

    fn memories(&self) -> usize {
        MAX_MEMORIES
    }

    fn tables(&self) -> usize {
        MAX_TABLES
    }
}
