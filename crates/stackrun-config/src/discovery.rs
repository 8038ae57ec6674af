use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use stackrun_phase_api::context::{is_valid_key, parse_assignment};

use crate::error::ConfigError;
use crate::model::{
    CliArgs, Config, ConfigSource, DEFAULT_LOG_FILE, DEFAULT_LOG_RETENTION_DAYS,
    DEFAULT_PLUGINS_DIR, PluginSpec,
};

const CONFIG_DIR: &str = ".stackrun";
const CONFIG_FILE: &str = "config.toml";

/// TOML configuration file structure
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlConfig {
    defaults: Option<TomlDefaults>,
    logging: Option<TomlLogging>,
    diagnostics: Option<TomlDiagnostics>,
    context: Option<toml::Table>,
    #[serde(default)]
    plugins: Vec<PluginSpec>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlDefaults {
    verbose: Option<bool>,
    progress: Option<bool>,
    plugins_dir: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlLogging {
    file: Option<PathBuf>,
    retention_days: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlDiagnostics {
    collector: Option<Vec<String>>,
    results_file: Option<PathBuf>,
}

impl Config {
    /// Discover and load configuration with precedence: CLI > file > defaults
    pub fn discover(cli_args: &CliArgs) -> Result<Self, ConfigError> {
        let start_dir = std::env::current_dir().map_err(|e| ConfigError::DiscoveryFailed {
            reason: format!("cannot determine working directory: {e}"),
        })?;
        Self::discover_from(&start_dir, cli_args)
    }

    /// Discover and load configuration starting from a specific directory
    ///
    /// Path-driven variant used by tests to avoid process-global state.
    pub fn discover_from(start_dir: &Path, cli_args: &CliArgs) -> Result<Self, ConfigError> {
        let config_path = match &cli_args.config_path {
            Some(explicit) => Some(absolutize(start_dir, explicit)),
            None => Self::discover_config_file_from(start_dir),
        };

        let (file_config, root) = match &config_path {
            Some(path) => (Self::load_config_file(path)?, project_root(path)),
            None => (TomlConfig::default(), start_dir.to_path_buf()),
        };

        let mut source_attribution = HashMap::new();
        let file_source = config_path.clone().map(ConfigSource::ConfigFile);
        let mut pick = |key: &str, cli: bool, file: bool| {
            let source = if cli {
                ConfigSource::Cli
            } else if file {
                file_source.clone().unwrap_or(ConfigSource::Defaults)
            } else {
                ConfigSource::Defaults
            };
            source_attribution.insert(key.to_string(), source);
        };

        let defaults = file_config.defaults.unwrap_or_default();
        let logging = file_config.logging.unwrap_or_default();
        let diagnostics = file_config.diagnostics.unwrap_or_default();

        pick("verbose", cli_args.verbose.is_some(), defaults.verbose.is_some());
        let verbose = cli_args.verbose.or(defaults.verbose).unwrap_or(false);

        pick("progress", cli_args.progress.is_some(), defaults.progress.is_some());
        let progress = cli_args.progress.or(defaults.progress).unwrap_or(true);

        pick("log_file", cli_args.log_file.is_some(), logging.file.is_some());
        let log_file = match &cli_args.log_file {
            Some(path) => absolutize(start_dir, path),
            None => root.join(logging.file.unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_FILE))),
        };

        pick(
            "log_retention_days",
            cli_args.log_retention_days.is_some(),
            logging.retention_days.is_some(),
        );
        let log_retention_days = cli_args
            .log_retention_days
            .or(logging.retention_days)
            .unwrap_or(DEFAULT_LOG_RETENTION_DAYS);
        if log_retention_days == 0 {
            return Err(ConfigError::InvalidValue {
                key: "log_retention_days".to_string(),
                value: "0 (must be at least 1)".to_string(),
            });
        }

        pick("plugins_dir", false, defaults.plugins_dir.is_some());
        let plugins_dir = root.join(
            defaults
                .plugins_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_PLUGINS_DIR)),
        );

        pick("collector", false, diagnostics.collector.is_some());
        let collector = match diagnostics.collector {
            Some(argv) if argv.is_empty() => {
                return Err(ConfigError::InvalidValue {
                    key: "diagnostics.collector".to_string(),
                    value: "empty command".to_string(),
                });
            }
            other => other,
        };

        pick("results_file", false, diagnostics.results_file.is_some());
        let results_file = diagnostics.results_file.map(|path| root.join(path));

        for spec in &file_config.plugins {
            validate_plugin(spec)?;
        }

        let mut context = Vec::new();
        for (key, value) in file_config.context.unwrap_or_default() {
            if !is_valid_key(&key) {
                return Err(ConfigError::InvalidValue {
                    key: format!("context.{key}"),
                    value: "keys must be valid environment variable names".to_string(),
                });
            }
            let value = match value {
                toml::Value::String(s) => s,
                other => other.to_string(),
            };
            context.push((key, value));
        }
        for raw in &cli_args.set {
            let (key, value) =
                parse_assignment(raw).ok_or_else(|| ConfigError::InvalidAssignment(raw.clone()))?;
            context.push((key.to_string(), value.to_string()));
        }

        Ok(Config {
            root,
            config_path,
            verbose,
            progress,
            log_file,
            log_retention_days,
            collector,
            results_file,
            plugins_dir,
            plugins: file_config.plugins,
            context,
            source_attribution,
        })
    }

    /// Walk upward from `start_dir` looking for `.stackrun/config.toml`,
    /// stopping at the filesystem root or a repository root.
    #[must_use]
    pub fn discover_config_file_from(start_dir: &Path) -> Option<PathBuf> {
        let mut current_dir = start_dir;

        loop {
            let config_path = current_dir.join(CONFIG_DIR).join(CONFIG_FILE);
            if config_path.is_file() {
                return Some(config_path);
            }

            if current_dir.join(".git").exists()
                || current_dir.join(".hg").exists()
                || current_dir.join(".svn").exists()
            {
                return None;
            }

            current_dir = current_dir.parent()?;
        }
    }

    fn load_config_file(path: &Path) -> Result<TomlConfig, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::InvalidFile {
            path: path.to_path_buf(),
            reason: e.message().to_string(),
        })
    }
}

/// `<root>/.stackrun/config.toml` → `<root>`; any other file → its directory.
fn project_root(config_path: &Path) -> PathBuf {
    let dir = config_path.parent().unwrap_or_else(|| Path::new("."));
    match (dir.file_name(), dir.parent()) {
        (Some(name), Some(parent)) if name == CONFIG_DIR => parent.to_path_buf(),
        _ => dir.to_path_buf(),
    }
}

fn absolutize(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

fn validate_plugin(spec: &PluginSpec) -> Result<(), ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidPlugin {
        name: spec.name.clone(),
        reason: reason.to_string(),
    };

    if spec.name.trim().is_empty() {
        return Err(invalid("name must not be empty"));
    }
    if spec.name.contains(['/', '\\']) || spec.name == "." || spec.name == ".." {
        return Err(invalid("name must be a single path component"));
    }
    match (&spec.repo, &spec.git_ref) {
        (None, Some(_)) => Err(invalid("'ref' requires 'repo'")),
        (Some(_), None) => Err(invalid("'repo' requires a pinned 'ref'")),
        (None, None) if spec.path.is_none() => {
            Err(invalid("a local plugin needs 'path' (or set 'repo' and 'ref')"))
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_config(root: &Path, body: &str) -> PathBuf {
        let dir = root.join(CONFIG_DIR);
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(CONFIG_FILE);
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_defaults_without_config_file() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join(".git")).unwrap();

        let config = Config::discover_from(temp.path(), &CliArgs::default()).unwrap();

        assert!(config.config_path.is_none());
        assert_eq!(config.root, temp.path());
        assert_eq!(config.log_file, temp.path().join(DEFAULT_LOG_FILE));
        assert_eq!(config.log_retention_days, 7);
        assert!(!config.verbose);
        assert!(config.progress);
        assert!(config.plugins.is_empty());
        assert_eq!(
            config.source_attribution.get("verbose"),
            Some(&ConfigSource::Defaults)
        );
    }

    #[test]
    fn test_discovers_config_from_subdirectory() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join(".git")).unwrap();
        let path = write_config(
            temp.path(),
            r#"
            [logging]
            file = "var/log/stack.sh.log"
            retention_days = 3
            "#,
        );
        let nested = temp.path().join("a/b");
        fs::create_dir_all(&nested).unwrap();

        let config = Config::discover_from(&nested, &CliArgs::default()).unwrap();

        assert_eq!(config.config_path.as_deref(), Some(path.as_path()));
        assert_eq!(config.root, temp.path());
        assert_eq!(config.log_file, temp.path().join("var/log/stack.sh.log"));
        assert_eq!(config.log_retention_days, 3);
        assert_eq!(
            config.source_attribution.get("log_file"),
            Some(&ConfigSource::ConfigFile(path))
        );
    }

    #[test]
    fn test_cli_overrides_file() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join(".git")).unwrap();
        write_config(
            temp.path(),
            r#"
            [defaults]
            verbose = false
            progress = true

            [logging]
            retention_days = 3
            "#,
        );
        let cli = CliArgs {
            verbose: Some(true),
            progress: Some(false),
            log_retention_days: Some(14),
            ..CliArgs::default()
        };

        let config = Config::discover_from(temp.path(), &cli).unwrap();

        assert!(config.verbose);
        assert!(!config.progress);
        assert_eq!(config.log_retention_days, 14);
        assert_eq!(
            config.source_attribution.get("log_retention_days"),
            Some(&ConfigSource::Cli)
        );
    }

    #[test]
    fn test_plugins_and_context_keep_file_order() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join(".git")).unwrap();
        write_config(
            temp.path(),
            r#"
            [context]
            SERVICE_HOST = "10.0.0.5"
            DATABASE_TYPE = "mysql"
            API_WORKERS = 2

            [[plugins]]
            name = "zaqar"
            repo = "https://opendev.org/openstack/zaqar"
            ref = "master"

            [[plugins]]
            name = "aodh"
            path = "local/aodh"
            enabled = false
            "#,
        );
        let cli = CliArgs {
            set: vec!["DATABASE_TYPE=postgresql".to_string()],
            ..CliArgs::default()
        };

        let config = Config::discover_from(temp.path(), &cli).unwrap();

        let names: Vec<&str> = config.plugins.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["zaqar", "aodh"]);
        assert!(!config.plugins[1].enabled);
        assert_eq!(
            config.plugin_path(&config.plugins[0]),
            temp.path().join(".stackrun/plugins/zaqar")
        );

        let keys: Vec<&str> = config.context.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(
            keys,
            vec!["SERVICE_HOST", "DATABASE_TYPE", "API_WORKERS", "DATABASE_TYPE"]
        );
        assert_eq!(config.context[2].1, "2");
        assert_eq!(config.context[3].1, "postgresql");
    }

    #[test]
    fn test_rejects_ref_without_repo() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join(".git")).unwrap();
        write_config(
            temp.path(),
            r#"
            [[plugins]]
            name = "broken"
            ref = "master"
            path = "x"
            "#,
        );

        let err = Config::discover_from(temp.path(), &CliArgs::default()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPlugin { ref name, .. } if name == "broken"));
    }

    #[test]
    fn test_rejects_zero_retention_and_bad_assignment() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join(".git")).unwrap();

        let cli = CliArgs {
            log_retention_days: Some(0),
            ..CliArgs::default()
        };
        assert!(matches!(
            Config::discover_from(temp.path(), &cli),
            Err(ConfigError::InvalidValue { .. })
        ));

        let cli = CliArgs {
            set: vec!["no-equals-sign".to_string()],
            ..CliArgs::default()
        };
        assert!(matches!(
            Config::discover_from(temp.path(), &cli),
            Err(ConfigError::InvalidAssignment(_))
        ));
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join(".git")).unwrap();
        write_config(temp.path(), "[logging]\nfiel = \"typo.log\"\n");

        let err = Config::discover_from(temp.path(), &CliArgs::default()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidFile { .. }));
    }

    #[test]
    fn test_explicit_config_path() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("ci.toml");
        fs::write(&path, "[defaults]\nverbose = true\n").unwrap();
        let cli = CliArgs {
            config_path: Some(PathBuf::from("ci.toml")),
            ..CliArgs::default()
        };

        let config = Config::discover_from(temp.path(), &cli).unwrap();
        assert!(config.verbose);
        assert_eq!(config.root, temp.path());
    }
}
