use std::path::Path;

use url::Url;

/// Receives download progress for a repodata refresh. This is the seam where
/// a status bar or progress dialog attaches; every method has a no-op
/// default.
pub trait Reporter: Send + Sync {
    fn on_download_start(&self, _url: &Url) {}

    /// Incremental progress; `bytes_total` is absent when the server did not
    /// announce a content length.
    fn on_download_progress(&self, _url: &Url, _bytes_downloaded: u64, _bytes_total: Option<u64>) {}

    fn on_download_complete(&self, _url: &Url, _path: &Path) {}

    /// The local copy already matched the remote size; no body was fetched.
    fn on_download_skipped(&self, _url: &Url, _path: &Path) {}
}

/// Discards all progress events.
pub struct NoReporter;

impl Reporter for NoReporter {}
