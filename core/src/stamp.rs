use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use crate::lock;

/// Last-modified marker of a target. Absence is modelled as `Option<Stamp>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Stamp(SystemTime);

impl Stamp {
    pub fn from_secs(secs: u64) -> Self {
        Self(SystemTime::UNIX_EPOCH + Duration::from_secs(secs))
    }

    pub fn time(&self) -> SystemTime {
        self.0
    }
}

impl From<SystemTime> for Stamp {
    fn from(time: SystemTime) -> Self {
        Self(time)
    }
}

impl fmt::Display for Stamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.duration_since(SystemTime::UNIX_EPOCH) {
            Ok(since) => write!(f, "{}.{:09}", since.as_secs(), since.subsec_nanos()),
            Err(_) => write!(f, "<before epoch>"),
        }
    }
}

/// Where freshness tags come from. `Ok(None)` means the target does not exist.
#[async_trait]
pub trait FreshnessSource: Send + Sync {
    async fn stamp(&self, name: &str) -> io::Result<Option<Stamp>>;
}

/// Stats target names as paths below `root`.
#[derive(Debug, Clone)]
pub struct FsStat {
    root: PathBuf,
}

impl FsStat {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn resolve(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

#[async_trait]
impl FreshnessSource for FsStat {
    async fn stamp(&self, name: &str) -> io::Result<Option<Stamp>> {
        match tokio::fs::metadata(self.resolve(name)).await {
            Ok(metadata) => Ok(Some(Stamp::from(metadata.modified()?))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// In-memory freshness source driven by a logical clock.
#[derive(Debug, Default)]
pub struct MemoryStat {
    inner: Mutex<MemoryState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    clock: u64,
    stamps: HashMap<String, Stamp>,
    failing: HashMap<String, io::ErrorKind>,
}

impl MemoryStat {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `name` as modified now and returns its new stamp.
    pub fn touch(&self, name: &str) -> Stamp {
        let mut state = lock(&self.inner);
        state.clock += 1;
        let stamp = Stamp::from_secs(state.clock);
        state.stamps.insert(name.to_string(), stamp);
        stamp
    }

    /// Sets an explicit stamp; later touches are still newer than it.
    pub fn set(&self, name: &str, stamp: Stamp) {
        let mut state = lock(&self.inner);
        let secs = stamp
            .time()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|since| since.as_secs())
            .unwrap_or(0);
        state.clock = state.clock.max(secs);
        state.stamps.insert(name.to_string(), stamp);
    }

    pub fn remove(&self, name: &str) {
        lock(&self.inner).stamps.remove(name);
    }

    /// Makes every stat of `name` fail with `kind`.
    pub fn fail_with(&self, name: &str, kind: io::ErrorKind) {
        lock(&self.inner).failing.insert(name.to_string(), kind);
    }

    pub fn get(&self, name: &str) -> Option<Stamp> {
        lock(&self.inner).stamps.get(name).copied()
    }
}

#[async_trait]
impl FreshnessSource for MemoryStat {
    async fn stamp(&self, name: &str) -> io::Result<Option<Stamp>> {
        let state = lock(&self.inner);
        if let Some(kind) = state.failing.get(name) {
            return Err(io::Error::new(*kind, format!("cannot stat {}", name)));
        }
        Ok(state.stamps.get(name).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stamp_ordering() {
        assert!(Stamp::from_secs(1) < Stamp::from_secs(2));
        assert_eq!(Stamp::from_secs(5), Stamp::from_secs(5));
        assert_eq!(Stamp::from_secs(3).to_string(), "3.000000000");
    }

    #[test]
    fn test_memory_touch_is_monotonic() {
        let stat = MemoryStat::new();
        let a = stat.touch("a");
        let b = stat.touch("b");
        let a2 = stat.touch("a");
        assert!(a < b);
        assert!(b < a2);
        assert_eq!(stat.get("a"), Some(a2));

        stat.set("c", Stamp::from_secs(100));
        assert!(stat.touch("d") > Stamp::from_secs(100));
    }

    #[tokio::test]
    async fn test_memory_stamp_absent_and_failing() {
        let stat = MemoryStat::new();
        assert_eq!(stat.stamp("missing").await.unwrap(), None);

        stat.fail_with("locked", io::ErrorKind::PermissionDenied);
        let err = stat.stamp("locked").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
    }

    #[tokio::test]
    async fn test_fs_stat() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("present.txt"), "x").unwrap();

        let stat = FsStat::new(dir.path());
        assert!(stat.stamp("present.txt").await.unwrap().is_some());
        assert!(stat.stamp("absent.txt").await.unwrap().is_none());
    }
}
