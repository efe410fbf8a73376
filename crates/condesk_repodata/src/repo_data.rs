use std::io::Read;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// One parsed repository index document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepoData {
    #[serde(default)]
    pub info: serde_json::Value,

    /// Canonical name (`{name}-{version}-{build}`) to package entry.
    #[serde(default)]
    pub packages: IndexMap<String, PackageEntry>,
}

/// A single entry of a channel's package index. Channels disagree about which
/// optional fields they fill in, so everything except `size` degrades to
/// `None` silently; fields this front-end never consumes (hashes, build
/// numbers, dependency lists of other packages) are ignored entirely.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PackageEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,

    /// Set to `"app"` for application packages.
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_entry: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_type: Option<String>,
}

impl PackageEntry {
    /// Whether the channel marks this artifact as an installable application.
    pub fn is_app(&self) -> bool {
        self.kind.as_deref() == Some("app")
    }
}

/// Parse the repository index documents at `paths`.
///
/// `.bz2` files are decompressed transparently. A file that is missing,
/// truncated or not valid JSON contributes nothing: its document is skipped
/// with a warning and the remaining documents are still returned; a single
/// corrupt channel must not take down the whole reconciliation.
pub fn load_repodata(paths: &[PathBuf]) -> Vec<RepoData> {
    let mut documents = Vec::with_capacity(paths.len());
    for path in paths {
        match load_one(path) {
            Ok(data) => documents.push(data),
            Err(error) => {
                tracing::warn!("skipping repodata document {}: {error}", path.display());
            }
        }
    }
    documents
}

fn load_one(path: &Path) -> Result<RepoData, std::io::Error> {
    let raw = fs_err::read(path)?;
    let decompressed = if path.extension().is_some_and(|ext| ext == "bz2") {
        let mut buffer = Vec::new();
        bzip2::read::BzDecoder::new(raw.as_slice()).read_to_end(&mut buffer)?;
        buffer
    } else {
        raw
    };
    serde_json::from_slice(&decompressed).map_err(std::io::Error::other)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn write_bz2(path: &Path, contents: &[u8]) {
        let file = fs_err::File::create(path).unwrap();
        let mut encoder = bzip2::write::BzEncoder::new(file, bzip2::Compression::default());
        encoder.write_all(contents).unwrap();
        encoder.finish().unwrap();
    }

    #[test]
    fn parses_packages_and_ignores_unknown_fields() {
        let doc = r#"{
            "info": {"subdir": "linux-64"},
            "packages": {
                "numpy-1.10.0-py36_0": {
                    "size": 100,
                    "license": "BSD",
                    "md5": "ffffffffffffffffffffffffffffffff",
                    "build_number": 0
                }
            }
        }"#;
        let data: RepoData = serde_json::from_str(doc).unwrap();
        let entry = &data.packages["numpy-1.10.0-py36_0"];
        assert_eq!(entry.size, Some(100));
        assert_eq!(entry.license.as_deref(), Some("BSD"));
        assert!(!entry.is_app());
    }

    #[test]
    fn malformed_documents_are_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.json");
        let bad = dir.path().join("bad.json");
        let missing = dir.path().join("missing.json");
        fs_err::write(&good, r#"{"packages": {"a-1.0-0": {"size": 1}}}"#).unwrap();
        fs_err::write(&bad, "{ not json").unwrap();

        let documents = load_repodata(&[good, bad, missing]);
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].packages.len(), 1);
    }

    #[test]
    fn reads_compressed_documents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("repodata.json.bz2");
        write_bz2(&path, br#"{"packages": {"a-1.0-0": {"size": 7}}}"#);

        let documents = load_repodata(&[path]);
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].packages["a-1.0-0"].size, Some(7));
    }
}
