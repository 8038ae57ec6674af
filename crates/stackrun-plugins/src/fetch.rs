use async_trait::async_trait;
use std::ffi::OsString;
use std::path::Path;

use stackrun_runner::{CommandSpec, LineSink, ProcessSupervisor, run_streaming};

use crate::error::FetchError;

/// Brings a plugin's source onto disk at a pinned ref.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch(
        &self,
        plugin: &str,
        repo: &str,
        git_ref: &str,
        dest: &Path,
    ) -> Result<(), FetchError>;
}

/// Fetcher driving the `git` command line.
///
/// A fresh destination is cloned and checked out at the ref. An existing
/// checkout fetches the ref and checks out `FETCH_HEAD`, so moving a pin
/// does not require a reclone. Git output goes to the detail log.
#[derive(Debug, Clone)]
pub struct GitFetcher {
    program: OsString,
    detail: LineSink,
    supervisor: ProcessSupervisor,
}

impl GitFetcher {
    #[must_use]
    pub fn new(detail: LineSink, supervisor: ProcessSupervisor) -> Self {
        Self {
            program: OsString::from("git"),
            detail,
            supervisor,
        }
    }

    /// Use a different git executable.
    #[must_use]
    pub fn with_program(mut self, program: impl Into<OsString>) -> Self {
        self.program = program.into();
        self
    }

    async fn git(
        &self,
        plugin: &str,
        repo: &str,
        git_ref: &str,
        cmd: CommandSpec,
    ) -> Result<(), FetchError> {
        self.detail.line(format!("+ {cmd}"));
        let status = run_streaming(&cmd, &self.detail, &self.supervisor)
            .await
            .map_err(|source| FetchError::Git {
                plugin: plugin.to_string(),
                source,
            })?;
        if status == 0 {
            Ok(())
        } else {
            Err(FetchError::Failed {
                plugin: plugin.to_string(),
                repo: repo.to_string(),
                git_ref: git_ref.to_string(),
                status,
            })
        }
    }
}

#[async_trait]
impl SourceFetcher for GitFetcher {
    async fn fetch(
        &self,
        plugin: &str,
        repo: &str,
        git_ref: &str,
        dest: &Path,
    ) -> Result<(), FetchError> {
        let in_checkout = || CommandSpec::new(&self.program).arg("-C").arg(dest);

        if dest.join(".git").exists() {
            tracing::debug!(plugin, dest = %dest.display(), "updating existing checkout");
            self.git(
                plugin,
                repo,
                git_ref,
                in_checkout().args(["fetch", "--quiet"]).arg(repo).arg(git_ref),
            )
            .await?;
            return self
                .git(
                    plugin,
                    repo,
                    git_ref,
                    in_checkout().args(["checkout", "--quiet", "FETCH_HEAD"]),
                )
                .await;
        }

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| FetchError::Io {
                    plugin: plugin.to_string(),
                    reason: format!("{}: {e}", parent.display()),
                })?;
        }
        self.git(
            plugin,
            repo,
            git_ref,
            CommandSpec::new(&self.program)
                .args(["clone", "--quiet"])
                .arg(repo)
                .arg(dest),
        )
        .await?;
        self.git(
            plugin,
            repo,
            git_ref,
            in_checkout().args(["checkout", "--quiet"]).arg(git_ref),
        )
        .await
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::PathBuf;
    use tempfile::TempDir;

    /// Stand-in git that records its argv and exits with `status`.
    fn fake_git(dir: &Path, status: i32) -> (PathBuf, PathBuf) {
        let log = dir.join("argv.log");
        let program = dir.join("fake-git");
        fs::write(
            &program,
            format!(
                "#!/bin/sh\necho \"$*\" >> '{}'\nexit {status}\n",
                log.display()
            ),
        )
        .unwrap();
        fs::set_permissions(&program, fs::Permissions::from_mode(0o755)).unwrap();
        (program, log)
    }

    fn fetcher(program: &Path) -> GitFetcher {
        let (detail, _rx) = LineSink::channel();
        GitFetcher::new(detail, ProcessSupervisor::new()).with_program(program)
    }

    #[tokio::test]
    async fn test_fresh_destination_is_cloned_then_checked_out() {
        let temp = TempDir::new().unwrap();
        let (program, log) = fake_git(temp.path(), 0);
        let dest = temp.path().join("plugins/heat");

        fetcher(&program)
            .fetch("heat", "https://git.example/heat", "stable/2026.1", &dest)
            .await
            .unwrap();

        let argv = fs::read_to_string(log).unwrap();
        let lines: Vec<&str> = argv.lines().collect();
        assert_eq!(
            lines,
            vec![
                format!("clone --quiet https://git.example/heat {}", dest.display()),
                format!("-C {} checkout --quiet stable/2026.1", dest.display()),
            ]
        );
        assert!(dest.parent().unwrap().is_dir());
    }

    #[tokio::test]
    async fn test_existing_checkout_fetches_ref() {
        let temp = TempDir::new().unwrap();
        let (program, log) = fake_git(temp.path(), 0);
        let dest = temp.path().join("heat");
        fs::create_dir_all(dest.join(".git")).unwrap();

        fetcher(&program)
            .fetch("heat", "https://git.example/heat", "master", &dest)
            .await
            .unwrap();

        let argv = fs::read_to_string(log).unwrap();
        assert!(argv.contains("fetch --quiet https://git.example/heat master"));
        assert!(argv.contains("checkout --quiet FETCH_HEAD"));
        assert!(!argv.contains("clone"));
    }

    #[tokio::test]
    async fn test_git_failure_is_fatal_with_status() {
        let temp = TempDir::new().unwrap();
        let (program, log) = fake_git(temp.path(), 128);

        let err = fetcher(&program)
            .fetch("heat", "https://unreachable.example/heat", "master", &temp.path().join("heat"))
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Failed { status: 128, .. }));
        assert_eq!(fs::read_to_string(log).unwrap().lines().count(), 1);
    }
}
