use std::ffi::OsString;
use std::fmt;
use std::path::PathBuf;
use std::process::Command;
use tokio::process::Command as TokioCommand;

// ============================================================================
// CommandSpec - argv-style process specification
// ============================================================================

/// Specification for a command to execute.
///
/// Hook programs, source fetches and the diagnostic collector all go through
/// this type. Arguments are discrete `OsString` elements; no shell ever sees
/// them.
///
/// # Example
///
/// ```rust
/// use stackrun_runner::CommandSpec;
/// use std::ffi::OsString;
///
/// let cmd = CommandSpec::new("git")
///     .arg("clone")
///     .args(["--branch", "stable"])
///     .cwd("/opt/stack");
///
/// assert_eq!(cmd.program, OsString::from("git"));
/// assert_eq!(cmd.args.len(), 3);
/// ```
#[derive(Debug, Clone, Default)]
pub struct CommandSpec {
    /// The program to execute
    pub program: OsString,
    /// Arguments as discrete elements (NOT shell strings)
    pub args: Vec<OsString>,
    /// Optional working directory
    pub cwd: Option<PathBuf>,
    /// Environment overrides, applied in order (later entries win)
    pub env: Vec<(OsString, OsString)>,
}

impl CommandSpec {
    /// Create a new `CommandSpec` with the given program.
    #[must_use]
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    /// Add a single argument to the command.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add multiple arguments to the command.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set the working directory for the command.
    #[must_use]
    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Set an environment variable for the command.
    #[must_use]
    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Set multiple environment variables for the command.
    #[must_use]
    pub fn envs<I, K, V>(mut self, envs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<OsString>,
        V: Into<OsString>,
    {
        self.env
            .extend(envs.into_iter().map(|(key, value)| (key.into(), value.into())));
        self
    }

    /// Program name for error messages.
    #[must_use]
    pub fn program_name(&self) -> String {
        self.program.to_string_lossy().into_owned()
    }

    /// Convert this `CommandSpec` into a `std::process::Command`.
    #[must_use]
    pub fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);

        if let Some(ref cwd) = self.cwd {
            cmd.current_dir(cwd);
        }

        for (key, value) in &self.env {
            cmd.env(key, value);
        }

        cmd
    }

    /// Convert this `CommandSpec` into a `tokio::process::Command`.
    #[must_use]
    pub fn to_tokio_command(&self) -> TokioCommand {
        let mut cmd = TokioCommand::new(&self.program);
        cmd.args(&self.args);

        if let Some(ref cwd) = self.cwd {
            cmd.current_dir(cwd);
        }

        for (key, value) in &self.env {
            cmd.env(key, value);
        }

        cmd
    }
}

/// Renders the argv the way an operator would retype it; used in diagnostics only.
impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.to_string_lossy())?;
        for arg in &self.args {
            let arg = arg.to_string_lossy();
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " '{arg}'")?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}
