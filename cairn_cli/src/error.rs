//! Error reporting and exit code handling.

use crate::args::{ArgError, USAGE};
use cairn_vm::{DebugError, VmError};
use std::process::ExitCode;

/// Successful execution.
pub const EXIT_SUCCESS: u8 = 0;
/// Runtime or debugger error.
pub const EXIT_ERROR: u8 = 1;
/// Command-line usage error (bad flags, missing values).
pub const EXIT_USAGE_ERROR: u8 = 2;

/// Print a usage error and return its exit code.
pub fn report_usage_error(error: &ArgError) -> ExitCode {
    eprintln!("cairn: {}", error);
    eprintln!("{}", USAGE.lines().next().unwrap_or_default());
    eprintln!("Try `cairn -h' for more information.");
    ExitCode::from(EXIT_USAGE_ERROR)
}

/// Print a runtime error and return its exit code.
pub fn report_vm_error(error: &VmError) -> ExitCode {
    eprint!("{}", format_vm_error(error));
    ExitCode::from(EXIT_ERROR)
}

/// Render a runtime error, with a hint for debugger failures.
pub fn format_vm_error(error: &VmError) -> String {
    let hint = match error {
        VmError::Debug(DebugError::Timeout(_)) => {
            Some("no handler resumed the task in time; raise --timeout-ms or pass 0")
        }
        VmError::Debug(DebugError::NoListener) => Some("no debug listener was registered"),
        _ => None,
    };
    match hint {
        Some(hint) => format!("cairn: error: {}\n  hint: {}\n", error, hint),
        None => format!("cairn: error: {}\n", error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_format_plain_error() {
        let err = VmError::RecursionLimit(10);
        assert_eq!(format_vm_error(&err), "cairn: error: stack level too deep (limit 10)\n");
    }

    #[test]
    fn test_format_timeout_has_hint() {
        let err = VmError::Debug(DebugError::Timeout(Duration::from_millis(5)));
        let text = format_vm_error(&err);
        assert!(text.starts_with("cairn: error: debug handoff timed out"));
        assert!(text.contains("hint: no handler resumed"));
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(report_vm_error(&VmError::RecursionLimit(1)), ExitCode::from(EXIT_ERROR));
        assert_eq!(
            report_usage_error(&ArgError::UnknownFlag("-x".into())),
            ExitCode::from(EXIT_USAGE_ERROR)
        );
        assert_eq!(EXIT_SUCCESS, 0);
    }
}
