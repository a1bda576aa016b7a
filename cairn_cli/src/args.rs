//! Command-line argument parser.
//!
//! Hand-rolled: the flag set is small and fixed.

use std::ffi::OsString;

/// What the driver should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Run the fixture under the debugger.
    Run,
    /// Print version and exit: `cairn -V` or `cairn --version`
    PrintVersion,
    /// Print help and exit: `cairn -h` or `cairn --help`
    PrintHelp,
}

/// Parsed CLI arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CairnArgs {
    /// What to do.
    pub mode: ExecutionMode,

    /// `--break`: print the full context at the breakpoint.
    pub show_break: bool,

    /// `--ret N`: rewrite the value `ret_7` returns.
    pub ret: Option<i16>,

    /// `--call-block`: run the block after the breakpoint.
    pub call_block: bool,

    /// `--call-method`: call the helper method after the breakpoint.
    pub call_method: bool,

    /// `--disassemble`: print the fixture bytecode first.
    pub disassemble: bool,

    /// `-E`: ignore `CAIRN_*` and `RUST_LOG` environment variables.
    pub ignore_environment: bool,

    /// `-v`: verbosity, repeatable.
    pub verbose: u32,

    /// `--timeout-ms N`: bound every breakpoint handoff.
    pub timeout_ms: Option<u64>,
}

impl Default for CairnArgs {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::Run,
            show_break: false,
            ret: None,
            call_block: false,
            call_method: false,
            disassemble: false,
            ignore_environment: false,
            verbose: 0,
            timeout_ms: None,
        }
    }
}

/// Error during argument parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgError {
    /// A flag that takes a value was last on the line.
    MissingValue(&'static str),
    /// A flag value did not parse.
    InvalidValue {
        /// The flag.
        flag: &'static str,
        /// The rejected value.
        value: String,
    },
    /// Unknown flag or stray argument.
    UnknownFlag(String),
}

impl std::fmt::Display for ArgError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArgError::MissingValue(flag) => write!(f, "Argument expected for the {} option", flag),
            ArgError::InvalidValue { flag, value } => {
                write!(f, "Invalid value for {}: {}", flag, value)
            }
            ArgError::UnknownFlag(flag) => write!(f, "Unknown option: {}", flag),
        }
    }
}

impl std::error::Error for ArgError {}

/// Usage text for `--help`.
pub const USAGE: &str = "\
usage: cairn [option] ...
Runs ContextSpecs::A#ret_7 on a task with a breakpoint listener attached.

Options:
  --break          print the captured context at the breakpoint
  --ret N          rewrite the returned integer before running (-32768..32767)
  --call-block     run the block after resuming
  --call-method    call the helper method after resuming
  --disassemble    print the fixture bytecode and static scope
  --timeout-ms N   bound each breakpoint handoff (0 = unbounded)
  -E               ignore CAIRN_* and RUST_LOG environment variables
  -v               more logging; repeat for trace output
  -h, --help       print this help message and exit
  -V, --version    print the version and exit
";

/// Parse arguments, skipping nothing: pass `std::env::args_os().skip(1)`.
pub fn parse_args<I, S>(args: I) -> Result<CairnArgs, ArgError>
where
    I: IntoIterator<Item = S>,
    S: Into<OsString>,
{
    let args: Vec<String> = args
        .into_iter()
        .map(|s| s.into().to_string_lossy().into_owned())
        .collect();

    parse_args_vec(&args)
}

/// Parse from a pre-collected `Vec<String>`.
pub fn parse_args_vec(args: &[String]) -> Result<CairnArgs, ArgError> {
    let mut result = CairnArgs::default();
    let mut iter = args.iter();

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-h" | "--help" => {
                result.mode = ExecutionMode::PrintHelp;
                return Ok(result);
            }
            "-V" | "--version" => {
                result.mode = ExecutionMode::PrintVersion;
                return Ok(result);
            }
            "--break" => result.show_break = true,
            "--call-block" => result.call_block = true,
            "--call-method" => result.call_method = true,
            "--disassemble" => result.disassemble = true,
            "-E" => result.ignore_environment = true,
            "--ret" => {
                let value = iter.next().ok_or(ArgError::MissingValue("--ret"))?;
                result.ret = Some(parse_value("--ret", value)?);
            }
            "--timeout-ms" => {
                let value = iter.next().ok_or(ArgError::MissingValue("--timeout-ms"))?;
                result.timeout_ms = Some(parse_value("--timeout-ms", value)?);
            }
            // `-v`, `-vv`, `-vvv`
            flag if flag.len() > 1 && flag.starts_with('-') && flag[1..].chars().all(|c| c == 'v') => {
                result.verbose += (flag.len() - 1) as u32;
            }
            other => return Err(ArgError::UnknownFlag(other.to_string())),
        }
    }

    Ok(result)
}

fn parse_value<T: std::str::FromStr>(flag: &'static str, value: &str) -> Result<T, ArgError> {
    value.parse().map_err(|_| ArgError::InvalidValue {
        flag,
        value: value.to_string(),
    })
}
