//! VM configuration resolved from defaults and environment variables.
//!
//! Settings are resolved once when a [`Vm`](crate::Vm) is created; the
//! interpreter and the debug protocol read them without further lookups.
//!
//! | Variable                    | Effect                                     |
//! |-----------------------------|--------------------------------------------|
//! | `CAIRN_MAX_RECURSION`       | Maximum call depth per task                |
//! | `CAIRN_HANDOFF_TIMEOUT_MS`  | Bound on breakpoint handoff waits (0 = off)|

use std::time::Duration;

/// Default maximum call depth.
pub const DEFAULT_MAX_RECURSION_DEPTH: usize = 1000;

// =============================================================================
// Debug Configuration
// =============================================================================

/// Settings for the breakpoint protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DebugConfig {
    /// Optional bound on every blocking handoff.
    ///
    /// `None` (the default) blocks indefinitely: a suspended task waits for
    /// its resume signal and a listener unit waits for its breakpoint for as
    /// long as it takes.
    pub handoff_timeout: Option<Duration>,
}

impl DebugConfig {
    /// Configuration with a bounded handoff.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            handoff_timeout: Some(timeout),
        }
    }

    /// Resolve from environment variables.
    pub fn from_env() -> Self {
        Self {
            handoff_timeout: env_u64("CAIRN_HANDOFF_TIMEOUT_MS")
                .filter(|&ms| ms > 0)
                .map(Duration::from_millis),
        }
    }
}

// =============================================================================
// VM Configuration
// =============================================================================

/// Complete VM configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VmConfig {
    /// Maximum call depth before `VmError::RecursionLimit`.
    pub max_recursion_depth: usize,

    /// Breakpoint protocol settings.
    pub debug: DebugConfig,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            max_recursion_depth: DEFAULT_MAX_RECURSION_DEPTH,
            debug: DebugConfig::default(),
        }
    }
}

impl VmConfig {
    /// Resolve configuration from environment variables.
    ///
    /// Unset or unparsable variables fall back to the defaults.
    pub fn from_env() -> Self {
        let max_recursion_depth = env_u64("CAIRN_MAX_RECURSION")
            .filter(|&n| n > 0)
            .map_or(DEFAULT_MAX_RECURSION_DEPTH, |n| n as usize);

        Self {
            max_recursion_depth,
            debug: DebugConfig::from_env(),
        }
    }
}

/// Parse an unsigned environment variable.
#[inline]
fn env_u64(var: &str) -> Option<u64> {
    std::env::var(var).ok()?.trim().parse().ok()
}
