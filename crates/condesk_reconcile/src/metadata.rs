use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Descriptive metadata for one package name, sourced from the bundled
/// `metadata.json` and/or registry listings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PackageMetadata {
    #[serde(default, alias = "description")]
    pub summary: String,

    #[serde(default, alias = "home_page")]
    pub home: String,

    #[serde(default)]
    pub license: String,

    #[serde(default, alias = "version", skip_serializing_if = "Option::is_none")]
    pub latest_version: Option<String>,
}

#[derive(Debug, Clone, Error)]
pub enum MetadataError {
    #[error(transparent)]
    Io(Arc<std::io::Error>),

    #[error("metadata document is not valid JSON: {0}")]
    Parse(Arc<serde_json::Error>),
}

/// Name-keyed metadata lookups for the reconciliation pass.
///
/// Lookups are case-insensitive. When an exact name is absent, the name with
/// its first `-`-suffix stripped is tried (`pandas-datareader` falls back to
/// `pandas`), and finally an empty entry is returned; metadata never fails a
/// reconciliation.
#[derive(Debug, Clone, Default)]
pub struct MetadataStore {
    entries: HashMap<String, PackageMetadata>,
}

impl MetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the bundled `metadata.json` document: a mapping of package name
    /// to `{home, license, summary, version}`.
    pub fn from_json_file(path: &Path) -> Result<Self, MetadataError> {
        let raw = fs_err::read(path).map_err(|err| MetadataError::Io(Arc::new(err)))?;
        let parsed: HashMap<String, PackageMetadata> =
            serde_json::from_slice(&raw).map_err(|err| MetadataError::Parse(Arc::new(err)))?;
        Ok(Self::from_entries(parsed))
    }

    pub fn from_entries(entries: impl IntoIterator<Item = (String, PackageMetadata)>) -> Self {
        let mut store = Self::new();
        for (name, metadata) in entries {
            store.insert(name, metadata);
        }
        store
    }

    /// Insert or overwrite the entry for `name`. Registry-fetched entries are
    /// merged in through this on top of the bundled data.
    pub fn insert(&mut self, name: impl AsRef<str>, metadata: PackageMetadata) {
        self.entries
            .insert(name.as_ref().to_lowercase(), metadata);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up metadata for a bare package name.
    pub fn lookup(&self, name: &str) -> PackageMetadata {
        let lowered = name.to_lowercase();
        if let Some(found) = self.entries.get(&lowered) {
            return found.clone();
        }
        if let Some(prefix) = lowered.split('-').next() {
            if prefix != lowered {
                if let Some(found) = self.entries.get(prefix) {
                    return found.clone();
                }
            }
        }
        PackageMetadata::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> MetadataStore {
        MetadataStore::from_entries([
            (
                "numpy".to_string(),
                PackageMetadata {
                    summary: "Array computing".to_string(),
                    home: "http://numpy.org".to_string(),
                    license: "BSD".to_string(),
                    latest_version: Some("1.11.0".to_string()),
                },
            ),
            (
                "pandas".to_string(),
                PackageMetadata {
                    summary: "Data frames".to_string(),
                    ..PackageMetadata::default()
                },
            ),
        ])
    }

    #[test]
    fn lookup_is_case_insensitive() {
        assert_eq!(store().lookup("NumPy").summary, "Array computing");
    }

    #[test]
    fn lookup_falls_back_to_the_stripped_suffix() {
        assert_eq!(store().lookup("pandas-datareader").summary, "Data frames");
    }

    #[test]
    fn unknown_names_yield_empty_metadata() {
        assert_eq!(store().lookup("nosuchthing"), PackageMetadata::default());
    }

    #[test]
    fn parses_the_bundled_metadata_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metadata.json");
        fs_err::write(
            &path,
            r#"{"numpy": {"home": "http://numpy.org", "license": "BSD",
                          "summary": "Array computing", "version": "1.11.0"}}"#,
        )
        .unwrap();

        let store = MetadataStore::from_json_file(&path).unwrap();
        let found = store.lookup("numpy");
        assert_eq!(found.latest_version.as_deref(), Some("1.11.0"));
        assert_eq!(found.home, "http://numpy.org");
    }
}
