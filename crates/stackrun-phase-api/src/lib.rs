//! Contract between the phase scheduler and plugin hooks.
//!
//! A plugin contributes a [`HookSet`]: at most one [`Hook`] per [`Phase`].
//! Hooks receive the run's [`InstallContext`] by mutable reference; that
//! context is the only channel plugins share state through.

pub mod context;
pub mod hook;

pub use context::InstallContext;
pub use hook::{FnHook, Hook, HookCall, HookFailure, HookIo, HookSet, PluginUnit};
pub use stackrun_utils::Phase;
