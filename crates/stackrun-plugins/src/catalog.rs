use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use stackrun_config::{Config, PluginSpec};
use stackrun_phase_api::{Hook, HookSet, Phase, PluginUnit};

use crate::error::{CatalogError, FetchError};
use crate::fetch::SourceFetcher;
use crate::script::ScriptPlugin;

/// Where a plugin's code comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginSource {
    /// Registered in-process; nothing to materialize
    Builtin,
    /// Already on disk; materializing only checks the directory exists
    Local { path: PathBuf },
    /// Checked out from a repository at a pinned ref
    Git {
        repo: String,
        git_ref: String,
        path: PathBuf,
    },
}

impl PluginSource {
    /// Source of a configured plugin whose checkout lives at `path`.
    #[must_use]
    pub fn from_spec(spec: &PluginSpec, path: PathBuf) -> Self {
        match (&spec.repo, &spec.git_ref) {
            (Some(repo), Some(git_ref)) => Self::Git {
                repo: repo.clone(),
                git_ref: git_ref.clone(),
                path,
            },
            _ => Self::Local { path },
        }
    }

    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Builtin => None,
            Self::Local { path } | Self::Git { path, .. } => Some(path),
        }
    }
}

impl fmt::Display for PluginSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Builtin => f.write_str("built-in"),
            Self::Local { path } => write!(f, "local {}", path.display()),
            Self::Git { repo, git_ref, .. } => write!(f, "{repo}@{git_ref}"),
        }
    }
}

/// A registered plugin.
#[derive(Debug, Clone)]
pub struct Plugin {
    pub name: String,
    pub source: PluginSource,
    pub enabled: bool,
    /// Position in the registry; decides invocation order in every phase
    pub order: usize,
    hooks: HookSet,
}

impl Plugin {
    #[must_use]
    pub fn hooks(&self) -> &HookSet {
        &self.hooks
    }

    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.source.path()
    }
}

/// Ordered registry of plugins and the hooks they expose.
#[derive(Debug, Default)]
pub struct PluginCatalog {
    plugins: Vec<Plugin>,
}

impl PluginCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every `[[plugins]]` entry of `config` in file order.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let mut catalog = Self::new();
        for spec in &config.plugins {
            catalog.register(spec, config.plugin_path(spec));
        }
        catalog
    }

    /// Register a configured plugin materialized at `path`.
    ///
    /// A name seen before overwrites that entry in place, so the plugin keeps
    /// its first registration position. Returns the registration order.
    pub fn register(&mut self, spec: &PluginSpec, path: PathBuf) -> usize {
        let source = PluginSource::from_spec(spec, path);
        self.insert(&spec.name, source, spec.enabled, HookSet::new())
    }

    /// Register an in-process plugin together with its hooks.
    pub fn register_unit(&mut self, unit: &dyn PluginUnit) -> usize {
        self.insert(unit.name(), PluginSource::Builtin, true, unit.hooks())
    }

    fn insert(&mut self, name: &str, source: PluginSource, enabled: bool, hooks: HookSet) -> usize {
        if let Some(existing) = self.plugins.iter_mut().find(|p| p.name == name) {
            tracing::debug!(
                plugin = name,
                order = existing.order,
                "plugin redefined; keeping its registration position"
            );
            existing.source = source;
            existing.enabled = enabled;
            existing.hooks = hooks;
            return existing.order;
        }

        let order = self.plugins.len();
        tracing::debug!(plugin = name, order, %source, enabled, "registered plugin");
        self.plugins.push(Plugin {
            name: name.to_string(),
            source,
            enabled,
            order,
            hooks,
        });
        order
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Plugin> {
        self.plugins.iter().find(|p| p.name == name)
    }

    /// Plugins in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Plugin> {
        self.plugins.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Bring one plugin's source onto disk at its pinned ref.
    pub async fn materialize(
        &self,
        name: &str,
        fetcher: &dyn SourceFetcher,
    ) -> Result<(), FetchError> {
        let plugin = self
            .get(name)
            .ok_or_else(|| FetchError::UnknownPlugin(name.to_string()))?;

        match &plugin.source {
            PluginSource::Builtin => Ok(()),
            PluginSource::Local { path } => {
                if path.is_dir() {
                    Ok(())
                } else {
                    Err(FetchError::MissingLocalPath {
                        plugin: plugin.name.clone(),
                        path: path.clone(),
                    })
                }
            }
            PluginSource::Git {
                repo,
                git_ref,
                path,
            } => {
                tracing::info!(plugin = %plugin.name, %repo, %git_ref, "fetching plugin source");
                fetcher.fetch(&plugin.name, repo, git_ref, path).await
            }
        }
    }

    /// Materialize every enabled plugin in order, stopping at the first failure.
    ///
    /// Disabled plugins are never fetched. Returns how many were materialized.
    pub async fn materialize_all(&self, fetcher: &dyn SourceFetcher) -> Result<usize, FetchError> {
        let mut count = 0;
        for plugin in self.plugins.iter().filter(|p| p.enabled) {
            self.materialize(&plugin.name, fetcher).await?;
            count += 1;
        }
        Ok(count)
    }

    /// Bind a discovered hook set to a registered plugin.
    pub fn attach_hooks(&mut self, name: &str, hooks: HookSet) -> Result<(), CatalogError> {
        let plugin = self
            .plugins
            .iter_mut()
            .find(|p| p.name == name)
            .ok_or_else(|| CatalogError::UnknownPlugin(name.to_string()))?;
        plugin.hooks = hooks;
        Ok(())
    }

    /// Scan the `hooks/` directory of every on-disk plugin.
    ///
    /// Disabled plugins are skipped, matching [`materialize_all`](Self::materialize_all).
    /// Plugins whose directory does not exist yet end up with no hooks.
    pub fn discover_script_hooks(&mut self) -> Result<(), CatalogError> {
        for plugin in self.plugins.iter_mut().filter(|p| p.enabled) {
            let Some(path) = plugin.source.path() else {
                continue;
            };
            let discovered =
                ScriptPlugin::discover(&plugin.name, path).map_err(|e| CatalogError::Discovery {
                    plugin: plugin.name.clone(),
                    reason: e.to_string(),
                })?;
            plugin.hooks = discovered.into_hooks();
        }
        Ok(())
    }

    /// Hooks to run for `phase`, in registration order.
    ///
    /// Disabled plugins are skipped, as are plugins without a hook for the
    /// phase: a missing hook is a no-op, not an error.
    #[must_use]
    pub fn hooks_for(&self, phase: Phase) -> Vec<(&Plugin, Arc<dyn Hook>)> {
        let mut out = Vec::new();
        for plugin in &self.plugins {
            if !plugin.enabled {
                continue;
            }
            match plugin.hooks.get(phase) {
                Some(hook) => out.push((plugin, Arc::clone(hook))),
                None => {
                    tracing::debug!(plugin = %plugin.name, %phase, "plugin does not implement phase");
                }
            }
        }
        out
    }

    /// Phases each plugin implements, in registration order.
    #[must_use]
    pub fn coverage(&self) -> Vec<(&Plugin, Vec<Phase>)> {
        self.plugins
            .iter()
            .map(|plugin| (plugin, plugin.hooks.phases().collect()))
            .collect()
    }
}
