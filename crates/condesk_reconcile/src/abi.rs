use condesk_version::CanonicalName;

/// Build-tag fragments derived from the python and numpy versions linked in
/// the active environment, e.g. `py36_` and `np110`.
///
/// These decide which build variants of a candidate artifact are offered:
/// `numpy-1.11.0-py27_0` is useless in a python 3.6 environment. Environments
/// without a linked python (or numpy) simply skip the corresponding check
/// rather than pruning everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AbiTags {
    py: Option<String>,
    np: Option<String>,
}

impl AbiTags {
    /// Derive the tags from the environment's linked canonical names.
    pub fn from_linked<'a>(linked: impl IntoIterator<Item = &'a CanonicalName>) -> Self {
        let mut tags = Self::default();
        for canonical in linked {
            match canonical.name() {
                "python" => tags.py = Some(format!("py{}_", squash_version(canonical.version()))),
                "numpy" => tags.np = Some(format!("np{}", squash_version(canonical.version()))),
                _ => {}
            }
        }
        tags
    }

    /// Whether a candidate with this build string is compatible with the
    /// environment. Builds that embed no `py`/`np` tag are platform
    /// independent and always kept.
    pub fn retains(&self, build: &str) -> bool {
        let mentions_py = build.contains("py");
        let mentions_np = build.contains("np");

        if mentions_np && mentions_py {
            self.py.as_deref().is_none_or(|py| {
                let needle = format!("{}{}", self.np.as_deref().unwrap_or_default(), py);
                build.contains(&needle)
            })
        } else if mentions_py {
            self.py.as_deref().is_none_or(|py| build.contains(py))
        } else if mentions_np {
            self.np.as_deref().is_none_or(|np| build.contains(np))
        } else {
            true
        }
    }
}

/// `"3.6.1"` → `"36"`, `"1.10.4"` → `"110"`: the dots are dropped and the
/// final digit (the micro release, which never changes the ABI) is cut off.
fn squash_version(version: &str) -> String {
    let digits: String = version.split('.').collect();
    let mut squashed = digits;
    squashed.pop();
    squashed
}
