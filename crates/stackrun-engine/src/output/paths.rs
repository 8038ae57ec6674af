use chrono::{DateTime, Local};
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// Format of the `T` suffix on dated log files
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d-%H%M%S";

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// File names of one run's logs.
///
/// For a base path `P` and start time `T` the run writes `P.T` and
/// `P.summary.T`; `P` and `P.summary` are links to the newest of each.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogPaths {
    pub base: PathBuf,
    pub detail: PathBuf,
    pub summary: PathBuf,
    pub summary_link: PathBuf,
}

impl LogPaths {
    #[must_use]
    pub fn new(base: impl Into<PathBuf>, started: DateTime<Local>) -> Self {
        let base = base.into();
        let stamp = started.format(TIMESTAMP_FORMAT).to_string();
        Self {
            detail: with_suffix(&base, &stamp),
            summary: with_suffix(&base, &format!("summary.{stamp}")),
            summary_link: with_suffix(&base, "summary"),
            base,
        }
    }

    /// Directory holding all log files.
    #[must_use]
    pub fn dir(&self) -> &Path {
        match self.base.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }
}

/// `P` + `.suffix`, without treating any part of `P` as an extension.
fn with_suffix(base: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(base.as_os_str());
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

/// Retention window for `days` days.
#[must_use]
pub fn retention(days: u32) -> Duration {
    Duration::from_secs(u64::from(days) * SECONDS_PER_DAY)
}

/// Delete dated log files of `base` older than `max_age`.
///
/// Only regular files whose name starts with `<file name of P>.` are
/// considered; links (including `P.summary`) and directories are left
/// alone. Returns the deleted paths.
pub fn purge_stale(base: &Path, max_age: Duration, now: SystemTime) -> io::Result<Vec<PathBuf>> {
    let Some(file_name) = base.file_name().and_then(|n| n.to_str()) else {
        return Ok(Vec::new());
    };
    let prefix = format!("{file_name}.");
    let dir = match base.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut purged = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        if !name.to_str().is_some_and(|n| n.starts_with(&prefix)) {
            continue;
        }
        let meta = std::fs::symlink_metadata(entry.path())?;
        if !meta.file_type().is_file() {
            continue;
        }
        let age = now
            .duration_since(meta.modified()?)
            .unwrap_or(Duration::ZERO);
        if age > max_age {
            let path = entry.path();
            std::fs::remove_file(&path)?;
            purged.push(path);
        }
    }
    purged.sort();
    Ok(purged)
}

/// Point `link` at `target`, replacing whatever `link` was.
///
/// The link holds the target's file name so the log directory can be moved
/// as a whole.
#[cfg(unix)]
pub fn repoint(link: &Path, target: &Path) -> io::Result<()> {
    match std::fs::symlink_metadata(link) {
        Ok(meta) if meta.is_dir() => {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} is a directory", link.display()),
            ));
        }
        Ok(_) => std::fs::remove_file(link)?,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    let relative = target.file_name().map_or(target, Path::new);
    std::os::unix::fs::symlink(relative, link)
}

/// Symlinks need elevated rights on Windows; the stable name is a copy made
/// at startup instead.
#[cfg(not(unix))]
pub fn repoint(link: &Path, target: &Path) -> io::Result<()> {
    std::fs::copy(target, link).map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::fs::{self, File};
    use tempfile::TempDir;

    fn started() -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 10, 16, 9, 5, 7).unwrap()
    }

    #[test]
    fn test_log_paths_naming() {
        let paths = LogPaths::new("/opt/stack/logs/stack.sh.log", started());
        assert_eq!(
            paths.detail,
            PathBuf::from("/opt/stack/logs/stack.sh.log.2026-10-16-090507")
        );
        assert_eq!(
            paths.summary,
            PathBuf::from("/opt/stack/logs/stack.sh.log.summary.2026-10-16-090507")
        );
        assert_eq!(
            paths.summary_link,
            PathBuf::from("/opt/stack/logs/stack.sh.log.summary")
        );
        assert_eq!(paths.dir(), Path::new("/opt/stack/logs"));
        assert_eq!(LogPaths::new("bare.log", started()).dir(), Path::new("."));
    }

    #[test]
    fn test_purge_removes_exactly_the_stale_files() {
        let temp = TempDir::new().unwrap();
        let base = temp.path().join("stack.log");
        let now = SystemTime::now();
        let old = now - Duration::from_secs(8 * SECONDS_PER_DAY);

        let mut stale = Vec::new();
        for day in 0..10 {
            let path = temp.path().join(format!("stack.log.2026-10-{:02}-120000", day + 1));
            let file = File::create(&path).unwrap();
            if day < 3 {
                file.set_modified(old).unwrap();
                stale.push(path);
            }
        }
        let unrelated = temp.path().join("other.log.2026-10-01-120000");
        File::create(&unrelated).unwrap().set_modified(old).unwrap();

        let purged = purge_stale(&base, retention(7), now).unwrap();

        assert_eq!(purged, stale);
        let remaining = fs::read_dir(temp.path()).unwrap().count();
        assert_eq!(remaining, 8);
        assert!(unrelated.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_purge_leaves_links_alone() {
        let temp = TempDir::new().unwrap();
        let base = temp.path().join("stack.log");
        let target = temp.path().join("stack.log.2026-10-01-120000");
        File::create(&target).unwrap();
        repoint(&temp.path().join("stack.log.summary"), &target).unwrap();

        let far_future = SystemTime::now() + Duration::from_secs(365 * SECONDS_PER_DAY);
        let purged = purge_stale(&base, retention(7), far_future).unwrap();

        assert_eq!(purged, vec![target]);
        assert!(
            fs::symlink_metadata(temp.path().join("stack.log.summary"))
                .unwrap()
                .file_type()
                .is_symlink()
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_repoint_replaces_previous_link() {
        let temp = TempDir::new().unwrap();
        let link = temp.path().join("stack.log");
        let first = temp.path().join("stack.log.2026-10-15-080000");
        let second = temp.path().join("stack.log.2026-10-16-080000");
        fs::write(&first, "old run").unwrap();
        fs::write(&second, "new run").unwrap();

        repoint(&link, &first).unwrap();
        repoint(&link, &second).unwrap();

        assert_eq!(fs::read_to_string(&link).unwrap(), "new run");
        assert_eq!(
            fs::read_link(&link).unwrap(),
            PathBuf::from("stack.log.2026-10-16-080000")
        );
    }

    #[test]
    fn test_purge_on_missing_directory_is_empty() {
        let temp = TempDir::new().unwrap();
        let base = temp.path().join("nope/stack.log");
        assert!(purge_stale(&base, retention(7), SystemTime::now()).unwrap().is_empty());
    }
}
