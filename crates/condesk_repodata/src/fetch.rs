use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use condesk_consts::consts;
use condesk_task_queue::TaskQueue;
use fs_err::tokio as async_fs;
use futures::StreamExt;
use reqwest::header::CONTENT_LENGTH;
use reqwest_middleware::ClientWithMiddleware;
use tokio::io::AsyncWriteExt;
use tracing::instrument;
use url::Url;

use crate::error::FetchRepodataError;
use crate::reporter::{NoReporter, Reporter};

/// Keeps a local cache of per-channel repository indexes current.
///
/// Downloads run through a dedicated [`TaskQueue`], one at a time in channel
/// order. Each URL is validated with a HEAD size comparison before any body
/// is fetched, and `.bz2` payloads are stored twice: the compressed artifact
/// (whose size the next HEAD check is compared against) and the decompressed
/// document the reconciliation step consumes.
pub struct RepodataSource {
    client: ClientWithMiddleware,
    queue: TaskQueue,
    cache_dir: PathBuf,
    reporter: Arc<dyn Reporter>,
}

/// What a refresh produced: the decompressed index documents that are now
/// current on disk, plus one recorded error per channel that failed. A batch
/// only counts as a total failure when `files` is empty.
#[derive(Debug, Default)]
pub struct UpdateOutcome {
    pub files: Vec<PathBuf>,
    pub errors: Vec<(Url, FetchRepodataError)>,
}

impl UpdateOutcome {
    /// The most recently recorded error, which is what a status bar shows.
    pub fn last_error(&self) -> Option<&FetchRepodataError> {
        self.errors.last().map(|(_, error)| error)
    }

    /// True when not a single channel produced an index document.
    pub fn is_total_failure(&self) -> bool {
        self.files.is_empty()
    }
}

impl RepodataSource {
    pub fn new(client: ClientWithMiddleware, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            client,
            queue: TaskQueue::new("repodata"),
            cache_dir: cache_dir.into(),
            reporter: Arc::new(NoReporter),
        }
    }

    /// Set the [`Reporter`] that receives download progress.
    #[must_use]
    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// The directory downloaded artifacts live in.
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// The repository index URL for a channel and platform subdirectory.
    pub fn repodata_url(channel: &Url, platform: &str) -> Url {
        let spec = format!(
            "{}/{platform}/{}",
            channel.as_str().trim_end_matches('/'),
            consts::REPODATA_FILE_COMPRESSED
        );
        Url::parse(&spec).expect("a channel url joined with a platform subdir is a valid url")
    }

    /// The deterministic cache file for a repodata URL: the URL with its
    /// scheme stripped and every `/` replaced by `_`.
    pub fn cache_path(&self, url: &Url) -> PathBuf {
        let name = url
            .as_str()
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .replace('/', "_");
        self.cache_dir.join(name)
    }

    /// Bring the cached index of every channel up to date.
    ///
    /// Channels are processed in order; a channel that cannot be reached or
    /// parsed only contributes an error record, never aborts the batch.
    #[instrument(skip(self, channels), fields(channels = channels.len()))]
    pub async fn update(&self, channels: &[Url], platform: &str) -> UpdateOutcome {
        let mut submitted = Vec::with_capacity(channels.len());
        for channel in channels {
            let url = Self::repodata_url(channel, platform);
            let path = self.cache_path(&url);
            let client = self.client.clone();
            let reporter = self.reporter.clone();
            let job_url = url.clone();
            submitted.push((
                url,
                self.queue
                    .submit(async move { fetch_one(client, job_url, path, reporter).await }),
            ));
        }

        let mut outcome = UpdateOutcome::default();
        for (url, handle) in submitted {
            match handle.finished().await {
                Ok(Ok(path)) => outcome.files.push(path),
                Ok(Err(error)) => {
                    tracing::warn!("channel index {url} failed: {error}");
                    outcome.errors.push((url, error));
                }
                Err(_cancelled) => outcome.errors.push((url, FetchRepodataError::Cancelled)),
            }
        }
        outcome
    }

    /// Abort every in-flight and queued download.
    pub fn terminate_all(&self) {
        self.queue.terminate_all();
    }
}

/// Fetch a single URL into the cache, returning the path of the decompressed
/// document.
async fn fetch_one(
    client: ClientWithMiddleware,
    url: Url,
    path: PathBuf,
    reporter: Arc<dyn Reporter>,
) -> Result<PathBuf, FetchRepodataError> {
    if let Some(parent) = path.parent() {
        async_fs::create_dir_all(parent).await?;
    }

    // A local copy is revalidated with a metadata-only request; matching
    // sizes mean the body is not fetched again.
    if let Ok(local) = async_fs::metadata(&path).await {
        if let Some(remote_len) = head_content_length(&client, &url).await? {
            if remote_len == local.len() {
                let document = ensure_decompressed(&path, false).await?;
                reporter.on_download_skipped(&url, &path);
                return Ok(document);
            }
        }
    }

    reporter.on_download_start(&url);
    let response = client.get(url.clone()).send().await?;
    if !response.status().is_success() {
        return Err(FetchRepodataError::HttpStatus {
            url,
            status: response.status(),
        });
    }

    let total = response.content_length();
    let mut file = tokio::fs::File::create(&path).await?;
    let mut downloaded = 0u64;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        downloaded += chunk.len() as u64;
        reporter.on_download_progress(&url, downloaded, total);
    }
    file.flush().await?;

    let document = ensure_decompressed(&path, true).await?;
    reporter.on_download_complete(&url, &path);
    Ok(document)
}

async fn head_content_length(
    client: &ClientWithMiddleware,
    url: &Url,
) -> Result<Option<u64>, FetchRepodataError> {
    let response = client.head(url.clone()).send().await?;
    if !response.status().is_success() {
        return Err(FetchRepodataError::HttpStatus {
            url: url.clone(),
            status: response.status(),
        });
    }
    Ok(response
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse().ok()))
}

/// Make sure the decompressed sibling of a `.bz2` artifact exists and return
/// it; plain files are their own document. With `force` the sibling is
/// rewritten even if present, which is required after every fresh download.
async fn ensure_decompressed(path: &Path, force: bool) -> Result<PathBuf, FetchRepodataError> {
    let Some(document) = strip_bz2(path) else {
        return Ok(path.to_path_buf());
    };
    if !force && async_fs::metadata(&document).await.is_ok() {
        return Ok(document);
    }

    let compressed = path.to_path_buf();
    let target = document.clone();
    tokio::task::spawn_blocking(move || -> Result<(), std::io::Error> {
        let raw = fs_err::read(&compressed)?;
        let mut decompressed = Vec::new();
        bzip2::read::BzDecoder::new(raw.as_slice()).read_to_end(&mut decompressed)?;
        fs_err::write(&target, decompressed)
    })
    .await?
    .map_err(|source| FetchRepodataError::Decompress {
        path: path.to_path_buf(),
        source: Arc::new(source),
    })?;
    Ok(document)
}

/// `…/repodata.json.bz2` → `…/repodata.json`; `None` for uncompressed paths.
fn strip_bz2(path: &Path) -> Option<PathBuf> {
    let name = path.file_name()?.to_str()?;
    let stripped = name.strip_suffix(".bz2")?;
    Some(path.with_file_name(stripped))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repodata_urls_append_platform_and_file() {
        let channel = Url::parse("https://conda.anaconda.org/conda-forge").unwrap();
        assert_eq!(
            RepodataSource::repodata_url(&channel, "linux-64").as_str(),
            "https://conda.anaconda.org/conda-forge/linux-64/repodata.json.bz2"
        );
    }

    #[tokio::test]
    async fn cache_paths_are_deterministic_url_manglings() {
        let client = ClientWithMiddleware::default();
        let source = RepodataSource::new(client, "/cache");
        let url =
            Url::parse("https://conda.anaconda.org/conda-forge/linux-64/repodata.json.bz2").unwrap();
        assert_eq!(
            source.cache_path(&url),
            PathBuf::from("/cache/conda.anaconda.org_conda-forge_linux-64_repodata.json.bz2")
        );
    }

    #[test]
    fn bz2_suffix_stripping() {
        assert_eq!(
            strip_bz2(Path::new("/cache/repodata.json.bz2")),
            Some(PathBuf::from("/cache/repodata.json"))
        );
        assert_eq!(strip_bz2(Path::new("/cache/repodata.json")), None);
    }
}
