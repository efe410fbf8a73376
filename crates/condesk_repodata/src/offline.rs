use std::path::{Path, PathBuf};
use std::sync::Arc;

use condesk_consts::consts;
use indexmap::IndexMap;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum OfflineIndexError {
    #[error("environment prefix {0} is not readable")]
    UnreadablePrefix(PathBuf),

    #[error(transparent)]
    Io(Arc<std::io::Error>),
}

impl From<std::io::Error> for OfflineIndexError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(Arc::new(err))
    }
}

/// Build a stand-in repository index from the environment's own linked
/// package metadata.
///
/// Used when every channel was unreachable: each `conda-meta/{canonical}.json`
/// sidecar becomes one `packages` entry keyed by its canonical name, after
/// dropping the `files` and `icondata` fields (large, and irrelevant to
/// reconciliation). The synthesized document is written to `offline.json`
/// under `data_dir` and its path returned, so the normal loading path applies
/// unchanged.
pub fn synthesize_offline_repodata(
    prefix: &Path,
    data_dir: &Path,
) -> Result<PathBuf, OfflineIndexError> {
    if !prefix.is_dir() {
        return Err(OfflineIndexError::UnreadablePrefix(prefix.to_path_buf()));
    }

    let meta_dir = prefix.join(consts::CONDA_META_DIR);
    let mut packages = IndexMap::new();
    if meta_dir.is_dir() {
        let mut sidecars: Vec<PathBuf> = fs_err::read_dir(&meta_dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .collect();
        sidecars.sort();

        for sidecar in sidecars {
            let Some(canonical) = sidecar.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            let raw = fs_err::read(&sidecar)?;
            let mut entry: serde_json::Value = match serde_json::from_slice(&raw) {
                Ok(value) => value,
                Err(error) => {
                    tracing::warn!("skipping sidecar {}: {error}", sidecar.display());
                    continue;
                }
            };
            if let Some(object) = entry.as_object_mut() {
                object.remove("files");
                object.remove("icondata");
            }
            packages.insert(canonical.to_string(), entry);
        }
    }

    fs_err::create_dir_all(data_dir)?;
    let document = serde_json::json!({
        "info": [],
        "packages": packages,
    });
    let path = data_dir.join(consts::OFFLINE_REPODATA_FILE);
    let pretty = serde_json::to_vec_pretty(&document).map_err(std::io::Error::other)?;
    fs_err::write(&path, pretty)?;
    Ok(path)
}
