// ── Directory sync engine ──
//
// Mirrors the card's directory tree into a local root. A counting pass
// (`compute_total`) fixes the total before anything is downloaded so
// percentages are meaningful from the first file; `transfer` then walks the
// tree again depth-first, files before subdirectories, in device order.
//
// Both passes walk with an explicit stack rather than recursion. Listings
// are fetched fresh on every visit.

pub mod download;
pub mod progress;
pub mod staleness;

use std::path::{Path, PathBuf};
use std::time::Duration;

use ezsync_api::{DirectoryListing, ListingClient};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::config::StalenessPolicy;
use crate::error::CoreError;
use crate::message::Reporter;

pub use download::{DownloadOutcome, download_file};
pub use progress::SyncProgress;
pub use staleness::should_download;

/// Result of probing the remote root before a scan.
#[derive(Debug)]
pub enum ListingStatus {
    /// The root lists at least one entry.
    Entries(DirectoryListing),
    /// The root answered with nothing to list.
    Empty,
    /// The root answered with a page that is not a listing (captive
    /// portal, card still booting).
    NoContainer,
    /// The root could not be fetched at all.
    Unreachable(CoreError),
}

/// One directory still to be visited.
struct Frame {
    url: Url,
    local: PathBuf,
}

pub struct SyncEngine {
    client: ListingClient,
    policy: StalenessPolicy,
    chunk_timeout: Duration,
}

impl SyncEngine {
    pub fn new(client: ListingClient, policy: StalenessPolicy, chunk_timeout: Duration) -> Self {
        Self {
            client,
            policy,
            chunk_timeout,
        }
    }

    /// Fetch the root listing once and classify it.
    pub async fn probe(&self, remote_root: &Url) -> ListingStatus {
        match self.client.list(remote_root).await {
            Ok(listing) if listing.no_container => ListingStatus::NoContainer,
            Ok(listing) if listing.is_empty() => ListingStatus::Empty,
            Ok(listing) => ListingStatus::Entries(listing),
            Err(e) => ListingStatus::Unreachable(e.into()),
        }
    }

    /// Count the files `transfer` would download. Downloads nothing.
    ///
    /// Stops early (with a partial count) if `cancel` fires.
    pub async fn compute_total(
        &self,
        remote_root: &Url,
        local_root: &Path,
        cancel: &CancellationToken,
    ) -> u64 {
        let mut total = 0u64;
        let mut stack = vec![Frame {
            url: remote_root.clone(),
            local: local_root.to_path_buf(),
        }];

        while let Some(frame) = stack.pop() {
            if cancel.is_cancelled() {
                break;
            }
            let listing = self.list_or_empty(&frame.url).await;

            total += listing
                .files
                .iter()
                .filter(|f| is_safe_name(&f.name))
                .filter(|f| {
                    should_download(&frame.local.join(&f.name), f.modified_at, self.policy)
                })
                .map(|_| 1u64)
                .sum::<u64>();

            push_children(&mut stack, &frame, &listing);
        }

        debug!(total, "scan complete");
        total
    }

    /// Download every stale file, returning how many were written.
    ///
    /// At most `total` files are counted: a file that turned stale after
    /// the counting pass is left for the next run.
    pub async fn transfer(
        &self,
        remote_root: &Url,
        local_root: &Path,
        total: u64,
        cancel: &CancellationToken,
        reporter: &Reporter,
    ) -> u64 {
        let mut progress = SyncProgress::new(total);
        let mut stack = vec![Frame {
            url: remote_root.clone(),
            local: local_root.to_path_buf(),
        }];

        'dirs: while let Some(frame) = stack.pop() {
            if cancel.is_cancelled() {
                break;
            }
            if let Err(e) = tokio::fs::create_dir_all(&frame.local).await {
                error!(path = %frame.local.display(), error = %e, "cannot create local directory, skipping subtree");
                reporter
                    .error(format!(
                        "Cannot create directory {}: {e}",
                        frame.local.display()
                    ))
                    .await;
                continue;
            }

            let listing = self.list_or_empty(&frame.url).await;

            for file in &listing.files {
                if cancel.is_cancelled() {
                    break 'dirs;
                }
                if !is_safe_name(&file.name) {
                    continue;
                }
                let local_path = frame.local.join(&file.name);
                if !should_download(&local_path, file.modified_at, self.policy) {
                    continue;
                }
                if progress.is_complete() {
                    debug!(file = %file.name, "remote changed since scan, leaving for next run");
                    continue;
                }

                let url = match ListingClient::file_url(&frame.url, &file.query) {
                    Ok(url) => url,
                    Err(e) => {
                        warn!(file = %file.name, error = %e, "bad download link");
                        continue;
                    }
                };

                let index = progress.processed_files() + 1;
                progress.set_operation(format!("Downloading file \"{}\"", file.name));
                reporter
                    .info(format!(
                        "Downloading file \"{}\" {index}/{total} ({}%)",
                        file.name,
                        percent_of(index, total)
                    ))
                    .await;

                match download_file(
                    &self.client,
                    &url,
                    &local_path,
                    file.modified_at,
                    self.chunk_timeout,
                    cancel,
                )
                .await
                {
                    Ok(DownloadOutcome::Completed { .. }) => {
                        progress.advance();
                        reporter.progress(&progress).await;
                    }
                    Ok(DownloadOutcome::Cancelled) => break 'dirs,
                    Err(e) => {
                        warn!(file = %file.name, error = %e, "download failed, skipping file");
                        reporter
                            .error(format!("Error downloading file \"{}\": {e}", file.name))
                            .await;
                    }
                }
            }

            push_children(&mut stack, &frame, &listing);
        }

        if cancel.is_cancelled() {
            info!(processed = progress.processed_files(), "transfer cancelled");
        }
        progress.processed_files()
    }

    /// List a directory; a failure is logged and treated as empty so one
    /// unreadable subtree does not stop the rest.
    async fn list_or_empty(&self, url: &Url) -> DirectoryListing {
        match self.client.list(url).await {
            Ok(listing) => listing,
            Err(e) => {
                error!(%url, error = %e, "listing failed, treating directory as empty");
                DirectoryListing::default()
            }
        }
    }
}

/// Push subdirectories so they pop in device order.
fn push_children(stack: &mut Vec<Frame>, parent: &Frame, listing: &DirectoryListing) {
    for dir in listing.dirs.iter().rev() {
        if !is_safe_name(&dir.name) {
            warn!(name = %dir.name, "skipping directory with unsafe name");
            continue;
        }
        match ListingClient::subdir_url(&parent.url, &dir.href) {
            Ok(url) => stack.push(Frame {
                url,
                local: parent.local.join(&dir.name),
            }),
            Err(e) => warn!(name = %dir.name, error = %e, "bad directory link"),
        }
    }
}

/// A listing name that maps to exactly one path component.
fn is_safe_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\'])
}

fn percent_of(n: u64, total: u64) -> u64 {
    if total == 0 { 0 } else { (n * 100 / total).min(100) }
}
