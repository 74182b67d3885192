use std::io::ErrorKind;
use std::path::Path;

use filetime::FileTime;
use tracing::warn;

use crate::config::StalenessPolicy;

/// Decide whether the remote file should be fetched over `local`.
///
/// A missing local file is always fetched. Otherwise `keep_old` keeps
/// whatever is on disk, `overwrite` refetches unconditionally, and the
/// default refetches only when the local mtime is older than `remote_ts`.
pub fn should_download(local: &Path, remote_ts: i64, policy: StalenessPolicy) -> bool {
    let meta = match std::fs::metadata(local) {
        Ok(meta) => meta,
        Err(e) if e.kind() == ErrorKind::NotFound => return true,
        Err(e) => {
            warn!(path = %local.display(), error = %e, "cannot stat local file, refetching");
            return true;
        }
    };

    if policy.keep_old {
        return false;
    }
    if policy.overwrite {
        return true;
    }
    FileTime::from_last_modification_time(&meta).unix_seconds() < remote_ts
}
