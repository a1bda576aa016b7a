//! Runtime configuration aggregated from CLI flags and environment variables.
//!
//! Resolved once at startup. Flags override the environment; `-E` skips the
//! environment entirely.

use crate::args::CairnArgs;
use cairn_vm::VmConfig;
use std::time::Duration;

/// Complete driver configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// VM settings, including the breakpoint handoff bound.
    pub vm: VmConfig,

    /// Print the full context at the breakpoint (`--break`).
    pub show_break: bool,

    /// Replacement return value for `ret_7` (`--ret`).
    pub ret: Option<i16>,

    /// Run the block after resuming (`--call-block`).
    pub call_block: bool,

    /// Call the helper after resuming (`--call-method`).
    pub call_method: bool,

    /// Print the fixture bytecode first (`--disassemble`).
    pub disassemble: bool,

    /// Logging verbosity (`-v`, `-vv`).
    pub verbose: u32,

    /// Ignore environment variables (`-E`).
    pub ignore_environment: bool,
}

impl RuntimeConfig {
    /// Resolve configuration from parsed CLI args and environment variables.
    pub fn from_args(args: &CairnArgs) -> Self {
        let ignore_env = args.ignore_environment;

        let mut vm = if ignore_env {
            VmConfig::default()
        } else {
            VmConfig::from_env()
        };

        // `--timeout-ms 0` forces an unbounded handoff even if the
        // environment set one.
        if let Some(ms) = args.timeout_ms {
            vm.debug.handoff_timeout = (ms > 0).then(|| Duration::from_millis(ms));
        }

        Self {
            vm,
            show_break: args.show_break,
            ret: args.ret,
            call_block: args.call_block,
            call_method: args.call_method,
            disassemble: args.disassemble,
            verbose: args.verbose,
            ignore_environment: ignore_env,
        }
    }

    /// Default `tracing` filter for the verbosity level.
    pub fn log_filter(&self) -> String {
        let level = match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        };
        format!("warn,cairn={level},cairn_vm={level}")
    }
}
