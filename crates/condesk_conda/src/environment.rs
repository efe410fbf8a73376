use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use condesk_consts::consts;

use crate::error::EnvironmentError;

/// A reference to one conda environment: by registered name, by absolute
/// prefix, or explicitly "whatever environment is currently active". The
/// three cases are mutually exclusive by construction; operations that cannot
/// run against the current environment reject [`EnvironmentRef::Current`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvironmentRef {
    Name(String),
    Prefix(PathBuf),
    Current,
}

impl EnvironmentRef {
    pub fn by_name(name: impl Into<String>) -> Self {
        Self::Name(name.into())
    }

    pub fn by_prefix(prefix: impl Into<PathBuf>) -> Self {
        Self::Prefix(prefix.into())
    }

    /// The `--name`/`--prefix` arguments selecting this environment.
    pub(crate) fn args(&self) -> Vec<String> {
        match self {
            Self::Name(name) => vec!["--name".to_string(), name.clone()],
            Self::Prefix(prefix) => {
                vec!["--prefix".to_string(), prefix.to_string_lossy().into_owned()]
            }
            Self::Current => Vec::new(),
        }
    }
}

/// The set of canonical names linked into `prefix`, read from the
/// `conda-meta/{canonical}.json` sidecars.
///
/// A missing or unreadable prefix is a hard error: it reflects a wrong or
/// corrupted environment selection that the user has to fix. An environment
/// without a `conda-meta` directory simply has nothing linked.
pub fn linked(prefix: &Path) -> Result<BTreeSet<String>, EnvironmentError> {
    if !prefix.is_dir() {
        return Err(EnvironmentError::Unreadable(prefix.to_path_buf()));
    }

    let meta_dir = prefix.join(consts::CONDA_META_DIR);
    if !meta_dir.is_dir() {
        return Ok(BTreeSet::new());
    }

    let mut canonical_names = BTreeSet::new();
    for entry in fs_err::read_dir(&meta_dir)? {
        let entry = entry?;
        let file_name = entry.file_name();
        if let Some(canonical) = file_name.to_str().and_then(|name| name.strip_suffix(".json")) {
            canonical_names.insert(canonical.to_string());
        }
    }
    Ok(canonical_names)
}
