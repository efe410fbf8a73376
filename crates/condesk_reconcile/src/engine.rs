use std::collections::{BTreeSet, HashMap};

use condesk_repodata::{PackageEntry, RepoData};
use condesk_version::{CanonicalName, compare, sort_versions};
use indexmap::IndexMap;

use crate::abi::AbiTags;
use crate::metadata::MetadataStore;
use crate::record::{PackageAction, PackageRecord, PackageStatus, PackageType};
use crate::table::PackageTable;

/// What is currently present in the target environment: the canonical names
/// linked by the package manager and the canonical names reported by pip.
#[derive(Debug, Clone, Default)]
pub struct EnvironmentSnapshot {
    pub linked: BTreeSet<CanonicalName>,
    pub pip: BTreeSet<CanonicalName>,
}

impl EnvironmentSnapshot {
    pub fn new(
        linked: impl IntoIterator<Item = CanonicalName>,
        pip: impl IntoIterator<Item = CanonicalName>,
    ) -> Self {
        Self {
            linked: linked.into_iter().collect(),
            pip: pip.into_iter().collect(),
        }
    }

    /// Build a snapshot from raw canonical name strings, dropping (and
    /// logging) anything that does not split into name-version-build.
    pub fn from_names<'a>(
        linked: impl IntoIterator<Item = &'a str>,
        pip: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        Self::new(parse_names(linked), parse_names(pip))
    }
}

fn parse_names<'a>(names: impl IntoIterator<Item = &'a str>) -> Vec<CanonicalName> {
    names
        .into_iter()
        .filter_map(|name| match name.parse::<CanonicalName>() {
            Ok(canonical) => Some(canonical),
            Err(error) => {
                tracing::warn!("{error}");
                None
            }
        })
        .collect()
}

/// Combine the loaded repository indexes with the environment snapshot into a
/// fresh [`PackageTable`]: exactly one record per distinct bare name across
/// the indexes, the linked set and the pip set.
///
/// The produced table replaces any previous one wholesale; callers holding a
/// table with staged actions must drain or warn before refreshing.
pub fn reconcile(
    indexes: &[RepoData],
    env: &EnvironmentSnapshot,
    metadata: &MetadataStore,
) -> PackageTable {
    let merged = merge_indexes(indexes);
    let groups = group_by_name(&merged);
    let tags = AbiTags::from_linked(&env.linked);

    let linked_versions: HashMap<String, String> = env
        .linked
        .iter()
        .map(|c| (c.name().to_lowercase(), c.version().to_string()))
        .collect();
    let pip_versions: HashMap<String, String> = env
        .pip
        .iter()
        .map(|c| (c.name().to_lowercase(), c.version().to_string()))
        .collect();

    let names: BTreeSet<String> = groups
        .keys()
        .cloned()
        .chain(linked_versions.keys().cloned())
        .chain(pip_versions.keys().cloned())
        .collect();

    let mut records = Vec::with_capacity(names.len());
    for name in names {
        let candidates = groups.get(&name).cloned().unwrap_or_default();
        let canonical_versions = prune_and_sort(candidates, &tags);
        let versions = distinct_versions(&canonical_versions);

        let (package_type, installed_version) = if let Some(version) = pip_versions.get(&name) {
            (PackageType::Pip, Some(version.clone()))
        } else if let Some(version) = linked_versions.get(&name) {
            (PackageType::Conda, Some(version.clone()))
        } else {
            (PackageType::Conda, None)
        };

        let status = classify(installed_version.as_deref(), &versions, package_type);

        let meta = metadata.lookup(&name);
        let license = artifact_license(&merged, &canonical_versions, installed_version.as_deref())
            .unwrap_or(meta.license);

        records.push(PackageRecord {
            name,
            package_type,
            description: meta.summary,
            home_url: meta.home,
            license,
            installed_version,
            versions,
            canonical_versions,
            status,
            action: PackageAction::None,
            action_version: None,
        });
    }

    PackageTable::from_records(records)
}

/// Union the `packages` mappings of every index document. On a canonical-name
/// collision the later document wins field-by-field, except that a declared
/// `size` is never clobbered by a document that omits it.
pub(crate) fn merge_indexes(indexes: &[RepoData]) -> IndexMap<String, PackageEntry> {
    let mut merged: IndexMap<String, PackageEntry> = IndexMap::new();
    for document in indexes {
        for (canonical, entry) in &document.packages {
            match merged.entry(canonical.clone()) {
                indexmap::map::Entry::Occupied(mut existing) => {
                    let size = entry.size.or(existing.get().size);
                    let mut replacement = entry.clone();
                    replacement.size = size;
                    existing.insert(replacement);
                }
                indexmap::map::Entry::Vacant(slot) => {
                    slot.insert(entry.clone());
                }
            }
        }
    }
    merged
}

/// Group every merged canonical name under its lowercased bare name. Keys
/// that do not split fall back to the entry's own name/version/build fields;
/// entries with neither are dropped with a warning.
fn group_by_name(merged: &IndexMap<String, PackageEntry>) -> IndexMap<String, Vec<CanonicalName>> {
    let mut groups: IndexMap<String, Vec<CanonicalName>> = IndexMap::new();
    for (canonical_str, entry) in merged {
        let canonical = match canonical_str.parse::<CanonicalName>() {
            Ok(canonical) => canonical,
            Err(_) => match (&entry.name, &entry.version, &entry.build) {
                (Some(name), Some(version), Some(build)) => {
                    CanonicalName::new(name.clone(), version.clone(), build.clone())
                }
                _ => {
                    tracing::warn!("dropping malformed index key `{canonical_str}`");
                    continue;
                }
            },
        };
        groups
            .entry(canonical.name().to_lowercase())
            .or_default()
            .push(canonical);
    }
    groups
}

/// Drop ABI-incompatible builds and order what remains newest-first. The full
/// canonical strings are run through the version ordering, which works
/// because entries in one group share their name prefix.
fn prune_and_sort(candidates: Vec<CanonicalName>, tags: &AbiTags) -> Vec<CanonicalName> {
    let mut by_string: HashMap<String, CanonicalName> = candidates
        .into_iter()
        .filter(|canonical| tags.retains(canonical.build()))
        .map(|canonical| (canonical.to_string(), canonical))
        .collect();
    let strings: Vec<String> = by_string.keys().cloned().collect();
    sort_versions(&strings, true)
        .into_iter()
        .filter_map(|string| by_string.remove(&string))
        .collect()
}

/// The distinct version numbers of the retained artifacts, newest first.
/// Duplicate versions from build variants collapse to one.
fn distinct_versions(canonical_versions: &[CanonicalName]) -> Vec<String> {
    let distinct: BTreeSet<String> = canonical_versions
        .iter()
        .map(|canonical| canonical.version().to_string())
        .collect();
    let strings: Vec<String> = distinct.into_iter().collect();
    sort_versions(&strings, true)
}

/// The six-state status machine of the reconciliation engine.
///
/// `versions` must be in descending order. An installed version missing from
/// the candidate set (version skew between the linked data and what the
/// indexes currently advertise) degrades to a presence-in-range check and
/// never errors.
fn classify(
    installed: Option<&str>,
    versions: &[String],
    package_type: PackageType,
) -> PackageStatus {
    let Some(installed) = installed else {
        return if versions.is_empty() {
            PackageStatus::NotInstallable
        } else {
            PackageStatus::NotInstalled
        };
    };

    // Pip-managed packages have no conda candidates to compare against, and a
    // linked package without surviving candidates is installed but not
    // comparable.
    let (Some(newest), Some(oldest)) = (versions.first(), versions.last()) else {
        return PackageStatus::Installed;
    };
    if package_type == PackageType::Pip {
        return PackageStatus::Installed;
    }

    let (upgradable, downgradable) = if versions.iter().any(|version| version == installed) {
        (
            versions.len() > 1 && installed != newest,
            versions.len() > 1 && installed != oldest,
        )
    } else {
        (
            compare(installed, newest) == std::cmp::Ordering::Less,
            compare(installed, oldest) == std::cmp::Ordering::Greater,
        )
    };

    match (upgradable, downgradable) {
        (true, true) => PackageStatus::Mixgradable,
        (true, false) => PackageStatus::Upgradable,
        (false, true) => PackageStatus::Downgradable,
        (false, false) => PackageStatus::Installed,
    }
}

/// The license declared by the installed artifact, or failing that the newest
/// one. `None` defers to the metadata store.
fn artifact_license(
    merged: &IndexMap<String, PackageEntry>,
    canonical_versions: &[CanonicalName],
    installed: Option<&str>,
) -> Option<String> {
    canonical_versions
        .iter()
        .find(|canonical| Some(canonical.version()) == installed)
        .or_else(|| canonical_versions.first())
        .and_then(|canonical| merged.get(&canonical.to_string()))
        .and_then(|entry| entry.license.clone())
}
