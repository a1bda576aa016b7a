//! Cairn: runs the breakpoint fixture under a debug listener.

mod args;
mod config;
mod error;
mod session;

use args::{ExecutionMode, USAGE};
use config::RuntimeConfig;
use error::EXIT_SUCCESS;
use std::process::ExitCode;
use tracing_subscriber::{EnvFilter, fmt};

fn main() -> ExitCode {
    let args = match args::parse_args(std::env::args_os().skip(1)) {
        Ok(args) => args,
        Err(err) => return error::report_usage_error(&err),
    };

    match args.mode {
        ExecutionMode::PrintHelp => {
            print!("{}", USAGE);
            return ExitCode::from(EXIT_SUCCESS);
        }
        ExecutionMode::PrintVersion => {
            println!("Cairn {}", cairn_core::VERSION);
            return ExitCode::from(EXIT_SUCCESS);
        }
        ExecutionMode::Run => {}
    }

    let config = RuntimeConfig::from_args(&args);
    init_logging(&config);

    match session::run(&config) {
        Ok(report) => {
            if let Some(disassembly) = &report.disassembly {
                println!("{}", disassembly);
            }
            if !config.show_break {
                println!("breakpoint: {}", report.breakpoint.context);
            }
            println!("=> {}", report.value);
            if config.call_block {
                println!("called_block: {}", report.called_block);
            }
            if config.call_method {
                println!("called_from_ret_7: {}", report.called_method);
            }
            ExitCode::from(EXIT_SUCCESS)
        }
        Err(err) => error::report_vm_error(&err),
    }
}

/// Install the `tracing` subscriber. `RUST_LOG` wins unless `-E` was given.
fn init_logging(config: &RuntimeConfig) {
    let from_env = if config.ignore_environment {
        None
    } else {
        EnvFilter::try_from_default_env().ok()
    };
    let filter = from_env.unwrap_or_else(|| EnvFilter::new(config.log_filter()));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
