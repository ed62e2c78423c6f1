//! Scratch files: the per-render output channel between adapter and bridge.
//!
//! Every render call owns exactly one `ScratchFile`. Its name is a random
//! UUID inside a shared namespace directory, so concurrent renders never
//! collide, and the file is removed when the guard is dropped whatever the
//! outcome of the render.

use log::{debug, warn};
use std::io;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Name of the namespace directory created under the system temp directory
pub const SCRATCH_NAMESPACE: &str = "tilt-bridge";

/// Default scratch directory: `<system temp>/tilt-bridge`
pub fn default_scratch_dir() -> PathBuf {
    std::env::temp_dir().join(SCRATCH_NAMESPACE)
}

/// A uniquely named temporary output path, deleted on drop.
///
/// The bridge only reserves the name; the adapter creates the file.
#[derive(Debug)]
pub struct ScratchFile {
    path: PathBuf,
}

impl ScratchFile {
    /// Reserve a fresh path inside `dir`, creating the directory if needed.
    pub fn create_in(dir: &Path) -> io::Result<Self> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("{}.html", Uuid::new_v4()));
        debug!("reserved scratch file {}", path.display());
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read everything the adapter wrote.
    pub fn read(&self) -> io::Result<Vec<u8>> {
        std::fs::read(&self.path)
    }

    /// Remove the file now. A file that was never written is not an error.
    pub fn remove(&self) -> io::Result<()> {
        match std::fs::remove_file(&self.path) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if let Err(e) = self.remove() {
            warn!("failed to remove scratch file {}: {}", self.path.display(), e);
        }
    }
}
