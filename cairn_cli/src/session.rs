//! One debugging session over the `ContextSpecs::A` fixture.

use crate::config::RuntimeConfig;
use cairn_core::Value;
use cairn_vm::debug::{BreakpointReport, DebugStatsSnapshot, Listener};
use cairn_vm::samples::ContextSpecs;
use cairn_vm::{ExecutionContext, Task, Vm, VmResult};
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// What a session observed.
#[derive(Debug)]
pub struct SessionReport {
    /// Disassembly, when requested.
    pub disassembly: Option<String>,
    /// The serviced breakpoint.
    pub breakpoint: BreakpointReport,
    /// `ret_7`'s result.
    pub value: Value,
    /// Whether the block ran.
    pub called_block: bool,
    /// Whether the helper ran.
    pub called_method: bool,
    /// Protocol counters.
    pub stats: DebugStatsSnapshot,
}

/// Build the fixture, run `ret_7` on a task and service its breakpoint.
pub fn run(config: &RuntimeConfig) -> VmResult<SessionReport> {
    let specs = ContextSpecs::build()?;
    let disassembly = if config.disassemble {
        Some(specs.describe()?)
    } else {
        None
    };
    if let Some(value) = config.ret {
        specs.change_ret(value)?;
        info!(value, "rewrote ret_7 return value");
    }

    let vm = Vm::isolated(config.vm);
    let listener = Listener::new(Arc::clone(vm.debug_hub()));
    listener.register()?;

    let show = config.show_break;
    let waiter = listener.wait_for_breakpoint(move |ctx| {
        if show {
            print!("{}", render_context(ctx));
        }
    })?;

    let task = Task::new(&vm).name("main").spawn(
        specs.ret_7()?,
        ContextSpecs::args(config.call_block, config.call_method),
    )?;
    let result = task.join();
    if result.is_err() {
        // Fail any handling unit still waiting for a breakpoint.
        listener.unregister();
    }
    let value = result?;
    let breakpoint = waiter.join()?;
    info!(task = %breakpoint.task, ip = breakpoint.ip(), time = ?breakpoint.handler_time, "breakpoint serviced");

    Ok(SessionReport {
        disassembly,
        breakpoint,
        value,
        called_block: specs.called_block(),
        called_method: specs.called_from_ret_7(),
        stats: vm.debug_hub().stats().snapshot(),
    })
}

/// Multi-line rendering of a captured context.
pub fn render_context(ctx: &ExecutionContext) -> String {
    ContextReport(ctx).to_string()
}

struct ContextReport<'a>(&'a ExecutionContext);

impl fmt::Display for ContextReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ctx = self.0;
        writeln!(f, "breakpoint: {}", ctx)?;
        if !ctx.locals().is_empty() {
            writeln!(f, "  locals:")?;
            for (name, value) in ctx.locals() {
                writeln!(f, "    {} = {}", name, value)?;
            }
        }
        writeln!(f, "  backtrace:")?;
        for (depth, frame) in ctx.backtrace().iter().enumerate() {
            writeln!(f, "    #{} {}", depth, frame)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args::parse_args;
    use cairn_vm::samples::RET_7_RESUME_IP;

    fn config(args: &[&str]) -> RuntimeConfig {
        RuntimeConfig::from_args(&parse_args(args.iter().copied()).unwrap())
    }

    #[test]
    fn test_default_session() {
        let report = run(&config(&["-E"])).unwrap();
        assert_eq!(report.value, Value::int(7));
        assert_eq!(report.breakpoint.ip(), RET_7_RESUME_IP);
        assert!(!report.called_block);
        assert!(!report.called_method);
        assert!(report.disassembly.is_none());
        assert_eq!(report.stats.breakpoints, 1);
        assert_eq!(report.stats.resumes, 1);
    }

    #[test]
    fn test_session_with_rewrite_and_calls() {
        let report = run(&config(&[
            "-E",
            "--ret",
            "12",
            "--call-block",
            "--call-method",
            "--disassemble",
        ]))
        .unwrap();
        assert_eq!(report.value, Value::int(12));
        assert!(report.called_block);
        assert!(report.called_method);
        assert!(report.disassembly.unwrap().contains("yield_debugger"));
    }

    #[test]
    fn test_render_context() {
        let report = run(&config(&["-E", "--call-block"])).unwrap();
        let text = render_context(&report.breakpoint.context);
        assert!(text.starts_with("breakpoint: "));
        assert!(text.contains("ContextSpecs::A#ret_7+2"));
        assert!(text.contains("call_block = true"));
        assert!(text.contains("#0 ContextSpecs::A#ret_7+2 (line 7)"));
    }
}
