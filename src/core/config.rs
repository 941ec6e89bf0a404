//! Session configuration.
//!
//! `JitConfig` carries the tunables of one emission session. Architecture data
//! (which registers are reserved, lent out as temps, or used for arguments) is not
//! configured here; it lives in the target's register tables.

/// Default emission buffer size used by [`crate::core::CodeBuffer::with_config`].
pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// Initial number of literal pool slots reserved per session.
pub const DEFAULT_POOL_CAPACITY: usize = 12;

/// Tunables for a [`crate::riscv::Jit`] session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JitConfig {
    /// Log every emitted instruction word at `trace` level.
    pub trace_emission: bool,
    /// Maximum flush-and-retry iterations when registering a pending literal.
    /// Registration succeeds at the latest right after a flush.
    pub pool_retry_limit: usize,
    /// Initial capacity of the literal pool entry list.
    pub pool_capacity_hint: usize,
    /// Size of buffers created through `CodeBuffer::with_config`.
    pub buffer_size: usize,
}

impl Default for JitConfig {
    fn default() -> Self {
        Self {
            trace_emission: false,
            pool_retry_limit: 2,
            pool_capacity_hint: DEFAULT_POOL_CAPACITY,
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

impl JitConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_trace_emission(mut self, enabled: bool) -> Self {
        self.trace_emission = enabled;
        self
    }

    pub fn with_pool_retry_limit(mut self, limit: usize) -> Self {
        assert!(limit >= 2, "a flush always needs one retry");
        self.pool_retry_limit = limit;
        self
    }

    pub fn with_pool_capacity_hint(mut self, capacity: usize) -> Self {
        self.pool_capacity_hint = capacity;
        self
    }

    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides_defaults() {
        let config = JitConfig::new()
            .with_trace_emission(true)
            .with_pool_retry_limit(3)
            .with_buffer_size(4096);
        assert!(config.trace_emission);
        assert_eq!(config.pool_retry_limit, 3);
        assert_eq!(config.buffer_size, 4096);
        assert_eq!(config.pool_capacity_hint, DEFAULT_POOL_CAPACITY);
    }

    #[test]
    #[should_panic(expected = "retry")]
    fn retry_limit_below_two_is_rejected() {
        let _ = JitConfig::new().with_pool_retry_limit(1);
    }
}
