//! Follow a file with a `tail -F` child process.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::BufReader;
use tokio::process::{Child, ChildStdout, Command};

use super::{LineSource, ReaderSource, SourceError};
use crate::line::Line;

/// Number of existing lines replayed when the tail starts.
pub const DEFAULT_TAIL_LINES: usize = 10;

/// How long the tail process gets to exit after SIGTERM.
const TERMINATE_TIMEOUT: Duration = Duration::from_secs(2);

/// Lines appended to a file, read through `tail -F`.
///
/// `-F` keeps following the path across rotation and truncation. The child
/// process is killed if the source is dropped without being closed.
#[derive(Debug)]
pub struct TailSource {
    path: PathBuf,
    child: Child,
    lines: ReaderSource<BufReader<ChildStdout>>,
}

impl TailSource {
    /// Start following `path`, replaying its last `replay` lines first.
    ///
    /// # Errors
    ///
    /// Returns `SourceError::Unavailable` if the file cannot be opened for
    /// reading, is a directory, or the `tail` process cannot be started.
    pub async fn open(path: impl AsRef<Path>, replay: usize) -> Result<Self, SourceError> {
        Self::open_with_binary("tail", path, replay).await
    }

    /// Start following `path` using a custom `tail` binary.
    ///
    /// # Errors
    ///
    /// Returns `SourceError::Unavailable` if the file cannot be opened for
    /// reading, is a directory, or the binary cannot be started.
    pub async fn open_with_binary(
        binary: &str,
        path: impl AsRef<Path>,
        replay: usize,
    ) -> Result<Self, SourceError> {
        let path = path.as_ref().to_path_buf();

        // `tail -F` retries forever on paths it cannot read, so check here.
        Self::check_readable(&path)
            .await
            .map_err(|source| SourceError::Unavailable {
                path: path.clone(),
                source,
            })?;

        let mut child = Command::new(binary)
            .arg("-n")
            .arg(replay.to_string())
            .arg("-F")
            .arg(&path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SourceError::Unavailable {
                path: path.clone(),
                source,
            })?;

        let stdout = child.stdout.take().ok_or(SourceError::NoStdout)?;

        tracing::debug!(path = %path.display(), pid = ?child.id(), "Tail process started");

        Ok(Self {
            path,
            child,
            lines: ReaderSource::new(BufReader::new(stdout)),
        })
    }

    async fn check_readable(path: &Path) -> std::io::Result<()> {
        let file = tokio::fs::File::open(path).await?;
        if file.metadata().await?.is_dir() {
            return Err(std::io::Error::other("is a directory"));
        }
        Ok(())
    }

    /// The file being followed.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Process ID of the tail process, if it is still running.
    #[must_use]
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    #[cfg(unix)]
    async fn terminate(&mut self) -> std::io::Result<()> {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let Some(pid) = self.id() else {
            return Ok(());
        };

        let nix_pid = Pid::from_raw(i32::try_from(pid).unwrap_or(i32::MAX));
        let _ = kill(nix_pid, Signal::SIGTERM);

        match tokio::time::timeout(TERMINATE_TIMEOUT, self.child.wait()).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(e),
            Err(_) => self.child.kill().await,
        }
    }

    #[cfg(not(unix))]
    async fn terminate(&mut self) -> std::io::Result<()> {
        self.child.kill().await
    }
}

#[async_trait]
impl LineSource for TailSource {
    async fn next_line(&mut self) -> Result<Option<Line>, SourceError> {
        if let Some(line) = self.lines.next_line().await? {
            return Ok(Some(line));
        }

        let status = self.child.wait().await?;
        if status.success() {
            tracing::info!(path = %self.path.display(), "Tail process exited");
            Ok(None)
        } else {
            Err(SourceError::Exited(status))
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.terminate().await {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to stop tail process");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_missing_file_is_unavailable() {
        let result = TailSource::open("/tmp/nonexistent-tuku-source-12345.log", 0).await;
        match result {
            Err(SourceError::Unavailable { path, source }) => {
                assert_eq!(path, PathBuf::from("/tmp/nonexistent-tuku-source-12345.log"));
                assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
            }
            other => panic!("Expected Unavailable, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_directory_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let result = TailSource::open(dir.path(), 0).await;
        match result {
            Err(SourceError::Unavailable { path, .. }) => assert_eq!(path, dir.path()),
            other => panic!("Expected Unavailable, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unreadable_file_is_unavailable() {
        use std::os::unix::fs::PermissionsExt;

        let file = NamedTempFile::new().unwrap();
        std::fs::set_permissions(file.path(), std::fs::Permissions::from_mode(0o000)).unwrap();

        // Root ignores file modes.
        if std::fs::File::open(file.path()).is_ok() {
            return;
        }

        let result = TailSource::open(file.path(), 0).await;
        match result {
            Err(SourceError::Unavailable { source, .. }) => {
                assert_eq!(source.kind(), std::io::ErrorKind::PermissionDenied);
            }
            other => panic!("Expected Unavailable, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_binary_is_unavailable() {
        let file = NamedTempFile::new().unwrap();
        let result =
            TailSource::open_with_binary("/nonexistent/tuku-tail-binary", file.path(), 0).await;
        assert!(matches!(result, Err(SourceError::Unavailable { .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_replays_and_follows_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "old 1").unwrap();
        writeln!(file, "old 2").unwrap();
        file.flush().unwrap();

        let mut source = TailSource::open(file.path(), 1).await.unwrap();
        assert_eq!(source.path(), file.path());

        let line = timeout(WAIT, source.next_line()).await.unwrap().unwrap();
        assert_eq!(line.unwrap().as_str(), "old 2");

        writeln!(file, "new line").unwrap();
        file.flush().unwrap();

        let line = timeout(WAIT, source.next_line()).await.unwrap().unwrap();
        assert_eq!(line.unwrap().as_str(), "new line");

        source.close().await;
        assert!(source.id().is_none());
    }
}
