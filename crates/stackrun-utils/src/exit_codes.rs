//! Exit code constants for stackrun.
//!
//! # Exit Code Table
//!
//! | Code | Constant | Description |
//! |------|----------|-------------|
//! | 0 | `SUCCESS` | Every phase completed |
//! | 1 | `INTERNAL` | General/internal failure |
//! | 2 | `CLI_ARGS` | Invalid CLI arguments or configuration |
//! | 3 | `FETCH_FAILED` | A plugin source could not be materialized |
//! | 4 | `LOG_SETUP` | Log destinations could not be created |
//!
//! Hook failures and interrupts do not have a constant: the run exits with the
//! failing hook's own status, or `128 + signal` for an interrupt.

/// Process exit status of a run.
///
/// Use the named constants for stackrun's own failure modes and
/// [`from_i32`](Self::from_i32) to carry a hook's raw status through.
///
/// # Example
///
/// ```rust
/// use stackrun_utils::ExitCode;
///
/// assert_eq!(ExitCode::SUCCESS.as_i32(), 0);
/// assert_eq!(ExitCode::from_i32(17).as_i32(), 17);
/// assert_eq!(ExitCode::from_signal(2).as_i32(), 130);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExitCode(i32);

impl ExitCode {
    /// Every phase completed
    pub const SUCCESS: ExitCode = ExitCode(0);

    /// Internal error - general failure
    pub const INTERNAL: ExitCode = ExitCode(1);

    /// CLI arguments error - invalid arguments or configuration
    pub const CLI_ARGS: ExitCode = ExitCode(2);

    /// A plugin source could not be fetched
    pub const FETCH_FAILED: ExitCode = ExitCode(3);

    /// Detail or summary log could not be created
    pub const LOG_SETUP: ExitCode = ExitCode(4);

    /// Get the numeric exit code value.
    ///
    /// Use this with `std::process::exit()`.
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        self.0
    }

    /// Create an ExitCode from a raw i32 value.
    #[must_use]
    pub const fn from_i32(code: i32) -> Self {
        ExitCode(code)
    }

    /// Shell convention for a process ended by `signal`.
    #[must_use]
    pub const fn from_signal(signal: i32) -> Self {
        ExitCode(128 + signal)
    }

    /// Status for a step that reported failure.
    ///
    /// A zero status cannot be propagated as a failure, so it collapses to
    /// [`INTERNAL`](Self::INTERNAL).
    #[must_use]
    pub const fn from_failure_status(status: i32) -> Self {
        if status == 0 {
            Self::INTERNAL
        } else {
            ExitCode(status)
        }
    }

    #[must_use]
    pub const fn is_success(self) -> bool {
        self.0 == 0
    }
}

impl From<i32> for ExitCode {
    fn from(code: i32) -> Self {
        ExitCode(code)
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code.0
    }
}
