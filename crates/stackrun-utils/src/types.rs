use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Phases of an installation run.
///
/// The sequence is fixed and total. Plugins choose which phases they respond
/// to, but a phase itself is never skipped or reordered.
///
/// # Phase Order
///
/// ```text
/// override-defaults → source → pre-install → install → post-config → extra → test-config
/// ```
///
/// # Example
///
/// ```rust
/// use stackrun_utils::types::Phase;
///
/// assert_eq!(Phase::PreInstall.as_str(), "pre-install");
/// assert_eq!("install".parse::<Phase>().unwrap(), Phase::Install);
/// assert_eq!(Phase::ALL.first(), Some(&Phase::OverrideDefaults));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    /// Plugins adjust default settings before anything else reads them.
    OverrideDefaults,
    /// Plugins load their own helper definitions into the shared context.
    Source,
    /// Prerequisites are installed before the main services.
    PreInstall,
    /// Services are installed.
    Install,
    /// Services are configured after every plugin finished installing.
    PostConfig,
    /// Extra services and data are added to a configured stack.
    Extra,
    /// Test tooling is configured against the finished stack.
    TestConfig,
}

impl Phase {
    /// Every phase in execution order.
    pub const ALL: [Phase; 7] = [
        Phase::OverrideDefaults,
        Phase::Source,
        Phase::PreInstall,
        Phase::Install,
        Phase::PostConfig,
        Phase::Extra,
        Phase::TestConfig,
    ];

    /// Canonical name used in hook file names, logs and the CLI.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::OverrideDefaults => "override-defaults",
            Self::Source => "source",
            Self::PreInstall => "pre-install",
            Self::Install => "install",
            Self::PostConfig => "post-config",
            Self::Extra => "extra",
            Self::TestConfig => "test-config",
        }
    }

    /// Zero-based position of the phase in [`Phase::ALL`].
    #[must_use]
    pub fn position(&self) -> usize {
        Self::ALL
            .iter()
            .position(|phase| phase == self)
            .unwrap_or(Self::ALL.len())
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string does not name a known phase.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown phase '{0}'")]
pub struct UnknownPhase(pub String);

impl FromStr for Phase {
    type Err = UnknownPhase;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|phase| phase.as_str() == s)
            .ok_or_else(|| UnknownPhase(s.to_string()))
    }
}
