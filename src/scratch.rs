//! Scratch storage shared by all requests.
//!
//! Every request gets a [`ScratchSet`] keyed by a fresh UUID. Artifact paths
//! are registered with the set when they are handed out and removed when the
//! set is dropped, whichever way the request ends.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use uuid::Uuid;

// A cancelled fetch can still have a file create running on the blocking
// pool when the set is dropped; the second sweep catches it.
const LATE_SWEEP_DELAY: Duration = Duration::from_millis(250);

#[derive(Clone, Debug)]
pub struct ScratchDir {
    root: PathBuf,
}

impl ScratchDir {
    /// Create the directory if it does not exist yet. The stored root is
    /// canonical, so every artifact path derived from it is absolute.
    pub fn init(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        std::fs::create_dir_all(path)?;
        let root = std::fs::canonicalize(path)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn new_set(&self) -> ScratchSet {
        ScratchSet {
            root: self.root.clone(),
            id: Uuid::new_v4(),
            paths: Vec::new(),
        }
    }
}

pub struct ScratchSet {
    root: PathBuf,
    id: Uuid,
    paths: Vec<PathBuf>,
}

impl ScratchSet {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Reserve `<root>/<role>-<id>.<extension>`. Nothing is created on disk.
    pub fn path(&mut self, role: &str, extension: &str) -> PathBuf {
        let path = self.root.join(format!("{role}-{}.{extension}", self.id));
        self.paths.push(path.clone());
        path
    }
}

impl fmt::Debug for ScratchSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScratchSet")
            .field("id", &self.id)
            .field("paths", &self.paths)
            .finish()
    }
}

impl Drop for ScratchSet {
    fn drop(&mut self) {
        let id = self.id;
        let paths = std::mem::take(&mut self.paths);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(move || {
                    remove_all(id, &paths);
                    std::thread::sleep(LATE_SWEEP_DELAY);
                    remove_all(id, &paths);
                });
            }
            Err(_) => remove_all(id, &paths),
        }
    }
}

fn remove_all(id: Uuid, paths: &[PathBuf]) {
    for path in paths {
        match std::fs::remove_file(path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(
                    request_id = %id,
                    path = %path.display(),
                    error = %e,
                    "Failed to remove scratch file"
                );
            }
        }
    }
}

/// Poll until none of `paths` exist. Removal inside a runtime happens on
/// the blocking pool, so callers that need it finished wait here.
#[cfg(test)]
pub(crate) async fn wait_until_removed<P: AsRef<Path>>(paths: &[P]) -> bool {
    for _ in 0..100 {
        if paths.iter().all(|p| !p.as_ref().exists()) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
