//! Plugin registry for stackrun.
//!
//! Plugins are registered in the order the source list names them and that
//! order never changes: it decides hook invocation order in every phase.
//! Sources are materialized before any phase runs, then each plugin's
//! `hooks/` directory is scanned into a [`HookSet`](stackrun_phase_api::HookSet).

pub mod catalog;
pub mod error;
pub mod fetch;
pub mod script;

pub use catalog::{Plugin, PluginCatalog, PluginSource};
pub use error::{CatalogError, FetchError};
pub use fetch::{GitFetcher, SourceFetcher};
pub use script::{HOOKS_DIR, ScriptHook, ScriptPlugin};
