use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Default base path of the detail log, relative to the project root
pub const DEFAULT_LOG_FILE: &str = "logs/stackrun.log";

/// Dated log files older than this many days are purged at startup
pub const DEFAULT_LOG_RETENTION_DAYS: u32 = 7;

/// Where plugins without an explicit path are materialized
pub const DEFAULT_PLUGINS_DIR: &str = ".stackrun/plugins";

/// Where a configuration value came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigSource {
    /// Value provided via CLI argument (highest precedence).
    Cli,
    /// Value loaded from configuration file.
    ConfigFile(PathBuf),
    /// Built-in default value (lowest precedence).
    Defaults,
}

impl ConfigSource {
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Cli => "cli",
            Self::ConfigFile(_) => "config",
            Self::Defaults => "default",
        }
    }
}

/// One entry of the plugin source list.
///
/// A spec without `repo` is a local plugin: `path` must already hold it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginSpec {
    pub name: String,
    /// Repository locator handed to the fetcher
    #[serde(default)]
    pub repo: Option<String>,
    /// Branch, tag or commit to check out
    #[serde(default, rename = "ref")]
    pub git_ref: Option<String>,
    /// Materialization directory; defaults to `<plugins_dir>/<name>`
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl PluginSpec {
    #[must_use]
    pub fn local(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            repo: None,
            git_ref: None,
            path: Some(path.into()),
            enabled: true,
        }
    }

    #[must_use]
    pub fn remote(
        name: impl Into<String>,
        repo: impl Into<String>,
        git_ref: impl Into<String>,
        path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            repo: Some(repo.into()),
            git_ref: Some(git_ref.into()),
            path: Some(path.into()),
            enabled: true,
        }
    }

    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Command-line overrides; `None` means "not given on the command line".
#[derive(Debug, Clone, Default)]
pub struct CliArgs {
    pub config_path: Option<PathBuf>,
    pub verbose: Option<bool>,
    pub progress: Option<bool>,
    pub log_file: Option<PathBuf>,
    pub log_retention_days: Option<u32>,
    /// `KEY=VALUE` context overrides, applied after the `[context]` table
    pub set: Vec<String>,
}

/// Effective configuration of a run.
///
/// All paths are absolute, resolved against [`Config::root`].
#[derive(Debug, Clone)]
pub struct Config {
    /// Project root: the directory holding `.stackrun/`, or the start directory
    pub root: PathBuf,
    /// Config file that was loaded, if any
    pub config_path: Option<PathBuf>,
    /// Echo the detail stream to the terminal and log at debug level
    pub verbose: bool,
    /// Drive the spinner when stdout is a terminal
    pub progress: bool,
    /// Base path `P` of the detail log
    pub log_file: PathBuf,
    pub log_retention_days: u32,
    /// argv of the diagnostic-state collector run on failure
    pub collector: Option<Vec<String>>,
    /// JSON-lines file receiving one pass/fail record per run
    pub results_file: Option<PathBuf>,
    pub plugins_dir: PathBuf,
    /// Plugin source list in encounter order
    pub plugins: Vec<PluginSpec>,
    /// Initial install context in order
    pub context: Vec<(String, String)>,
    pub source_attribution: HashMap<String, ConfigSource>,
}

impl Config {
    /// Materialization directory of `spec`.
    #[must_use]
    pub fn plugin_path(&self, spec: &PluginSpec) -> PathBuf {
        match &spec.path {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => self.root.join(path),
            None => self.plugins_dir.join(&spec.name),
        }
    }

    /// Effective scalar settings with source attribution, sorted by key.
    #[must_use]
    pub fn effective_config(&self) -> Vec<(String, String, String)> {
        let source = |key: &str| {
            self.source_attribution
                .get(key)
                .unwrap_or(&ConfigSource::Defaults)
                .label()
                .to_string()
        };

        let mut entries = vec![
            ("verbose", self.verbose.to_string()),
            ("progress", self.progress.to_string()),
            ("log_file", self.log_file.display().to_string()),
            ("log_retention_days", self.log_retention_days.to_string()),
            ("plugins_dir", self.plugins_dir.display().to_string()),
        ];
        if let Some(collector) = &self.collector {
            entries.push(("collector", collector.join(" ")));
        }
        if let Some(results_file) = &self.results_file {
            entries.push(("results_file", results_file.display().to_string()));
        }

        let mut out: Vec<(String, String, String)> = entries
            .into_iter()
            .map(|(key, value)| (key.to_string(), value, source(key)))
            .collect();
        out.sort();
        out
    }
}
