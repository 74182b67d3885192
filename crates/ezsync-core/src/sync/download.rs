// Atomic single-file download.
//
// The body is streamed into a hidden `.part` file next to the destination,
// flushed and fsynced, then renamed over the final path. Until the rename
// succeeds the final path is untouched; any early return (error or
// cancellation) drops the guard, which removes the part file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use ezsync_api::ListingClient;
use filetime::FileTime;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::CoreError;

/// How a download attempt ended, when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadOutcome {
    Completed { bytes: u64 },
    Cancelled,
}

/// RAII guard: deletes the part file unless disarmed after the rename.
struct PartFile {
    path: PathBuf,
    disarmed: bool,
}

impl PartFile {
    fn beside(dest: &Path) -> Self {
        let dir = dest.parent().unwrap_or_else(|| Path::new("."));
        let name = dest
            .file_name()
            .map_or_else(|| "download".into(), |n| n.to_string_lossy());
        Self {
            path: dir.join(format!(".{name}.{}.part", uuid::Uuid::new_v4().simple())),
            disarmed: false,
        }
    }
}

impl Drop for PartFile {
    fn drop(&mut self) {
        if self.disarmed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "removed partial download"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                path = %self.path.display(),
                error = %e,
                "failed to clean up temporary file"
            ),
        }
    }
}

/// Download `url` to `dest` and stamp it with `modified_at` (epoch
/// seconds, skipped when 0).
///
/// Each body chunk must arrive within `chunk_timeout`. Cancellation is
/// observed while waiting for the response and for every chunk.
pub async fn download_file(
    client: &ListingClient,
    url: &Url,
    dest: &Path,
    modified_at: i64,
    chunk_timeout: Duration,
    cancel: &CancellationToken,
) -> Result<DownloadOutcome, CoreError> {
    let mut resp = tokio::select! {
        biased;
        () = cancel.cancelled() => return Ok(DownloadOutcome::Cancelled),
        resp = client.download(url) => resp?,
    };
    let empty = resp.content_length() == Some(0);

    let mut part = PartFile::beside(dest);
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&part.path)
        .await
        .map_err(|e| CoreError::io(&part.path, e))?;

    let mut bytes = 0u64;
    if empty {
        debug!(path = %dest.display(), "zero-length file, skipping body read");
    } else {
        loop {
            let chunk = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    info!(path = %dest.display(), "download cancelled");
                    return Ok(DownloadOutcome::Cancelled);
                }
                chunk = tokio::time::timeout(chunk_timeout, resp.chunk()) => chunk,
            };
            let chunk = match chunk {
                Ok(Ok(Some(chunk))) => chunk,
                Ok(Ok(None)) => break,
                Ok(Err(e)) => return Err(ezsync_api::Error::Transport(e).into()),
                Err(_) => {
                    return Err(CoreError::DownloadStalled {
                        url: url.to_string(),
                        secs: chunk_timeout.as_secs(),
                    });
                }
            };
            file.write_all(&chunk)
                .await
                .map_err(|e| CoreError::io(&part.path, e))?;
            bytes += u64::try_from(chunk.len()).unwrap_or(u64::MAX);
        }
    }

    file.flush().await.map_err(|e| CoreError::io(&part.path, e))?;
    file.sync_all()
        .await
        .map_err(|e| CoreError::io(&part.path, e))?;
    drop(file);

    tokio::fs::rename(&part.path, dest)
        .await
        .map_err(|e| CoreError::io(dest, e))?;
    part.disarmed = true;

    if modified_at != 0 {
        if let Err(e) = filetime::set_file_mtime(dest, FileTime::from_unix_time(modified_at, 0)) {
            warn!(path = %dest.display(), error = %e, "could not set modification time");
        }
    }

    info!(path = %dest.display(), bytes, "file written");
    Ok(DownloadOutcome::Completed { bytes })
}
