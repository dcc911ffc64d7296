//! Making a day's granule available on local disk.
//!
//! The transfer itself is delegated to a [`Fetcher`]. Production uses
//! [`WgetMirror`], which shells out to `wget` in recursive mirror mode so the
//! archive's host/path hierarchy is reproduced under the local root.
//!
//! Two workers acquiring the same date at once may both fetch; callers that
//! schedule work are expected not to submit a date twice.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::error::{IngestionError, Result};
use crate::locator::{sidecar_path, FileLocator, RawFileRef};

/// Transfers a remote file so that it ends up at `local_path`.
pub trait Fetcher: Send + Sync {
    /// Run the transfer and return the tool's exit status (0 is success).
    fn fetch(&self, remote_url: &str, local_path: &Path) -> std::io::Result<i32>;
}

/// `wget` in recursive mirror mode with Earthdata cookie authentication.
#[derive(Debug, Clone)]
pub struct WgetMirror {
    cookie_file: PathBuf,
    work_dir: PathBuf,
}

impl WgetMirror {
    /// `work_dir` must be the local root the locator builds paths under.
    pub fn new(cookie_file: impl Into<PathBuf>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            cookie_file: cookie_file.into(),
            work_dir: work_dir.into(),
        }
    }

    fn command(&self, remote_url: &str) -> Command {
        let mut cmd = Command::new("wget");
        cmd.arg("--load-cookies")
            .arg(&self.cookie_file)
            .arg("--save-cookies")
            .arg(&self.cookie_file)
            .args([
                "--keep-session-cookies",
                "--no-check-certificate",
                "--auth-no-challenge=on",
                "-r",
                "--reject",
                "index.html*",
                "-np",
                "-e",
                "robots=off",
            ])
            .arg(remote_url)
            .current_dir(&self.work_dir);
        cmd
    }
}

impl Fetcher for WgetMirror {
    fn fetch(&self, remote_url: &str, local_path: &Path) -> std::io::Result<i32> {
        debug!(url = %remote_url, target = %local_path.display(), "Running wget");
        let status = self.command(remote_url).status()?;
        // Killed by a signal: no exit code.
        Ok(status.code().unwrap_or(-1))
    }
}

/// Ensures a date's raw granule is present locally.
#[derive(Clone)]
pub struct Acquirer {
    locator: FileLocator,
    fetcher: Arc<dyn Fetcher>,
}

impl Acquirer {
    pub fn new(locator: FileLocator, fetcher: Arc<dyn Fetcher>) -> Self {
        Self { locator, fetcher }
    }

    /// Local path of `date`'s granule, fetching it when forced or absent.
    pub fn ensure_local(&self, date: NaiveDate, force: bool) -> Result<PathBuf> {
        let raw = self.locator.locate(date);
        self.acquire(&raw, force)?;
        Ok(raw.local_path)
    }

    /// Fetch `raw` iff `force` or its local file does not exist.
    ///
    /// A fetch removes the granule's cached index first. No retry. A non-zero exit status, or a zero status that leaves no file
    /// behind, is an [`IngestionError::Acquisition`].
    pub fn acquire(&self, raw: &RawFileRef, force: bool) -> Result<()> {
        if !force && raw.local_path.exists() {
            debug!(date = %raw.date, path = %raw.local_path.display(), "Granule already present");
            return Ok(());
        }

        if let Some(parent) = raw.local_path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| IngestionError::LocalDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        // Byte offsets in an existing index describe the file being replaced.
        let sidecar = sidecar_path(&raw.local_path);
        match std::fs::remove_file(&sidecar) {
            Ok(()) => debug!(sidecar = %sidecar.display(), "Dropped index of replaced granule"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(sidecar = %sidecar.display(), error = %e, "Failed to drop stale index"),
        }

        info!(date = %raw.date, url = %raw.remote_url, force = force, "Fetching granule");
        let status = self.fetcher.fetch(&raw.remote_url, &raw.local_path)?;
        if status != 0 {
            warn!(date = %raw.date, status = status, "Fetcher exited with an error");
            return Err(IngestionError::acquisition(raw.date, status));
        }
        if !raw.local_path.exists() {
            warn!(date = %raw.date, path = %raw.local_path.display(), "Fetch left no file");
            return Err(IngestionError::missing_after_fetch(raw.date));
        }

        Ok(())
    }
}
