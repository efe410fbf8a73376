use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::record::{PackageAction, PackageRecord, PackageStatus, PackageType};

/// The in-memory model driving the package list: reconciliation output plus
/// user-staged actions.
///
/// The table exclusively owns its records. A reconciliation pass replaces the
/// whole table; records never survive a refresh by identity, only by
/// name-based re-lookup, and staged actions are discarded with the old table.
#[derive(Debug, Clone, Default)]
pub struct PackageTable {
    records: Vec<PackageRecord>,
    by_name: HashMap<String, usize>,
}

/// One staged action ready for the apply step, in table order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagedAction {
    pub name: String,
    pub package_type: PackageType,
    pub action: PackageAction,
    /// Target version for install/upgrade/downgrade; irrelevant for remove.
    pub version: Option<String>,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ActionError {
    #[error("unknown package `{0}`")]
    UnknownPackage(String),

    #[error("cannot {action} `{name}` while it is {status}")]
    InvalidForStatus {
        name: String,
        action: PackageAction,
        status: PackageStatus,
    },

    #[error("`{name}` has no candidate version {version}")]
    UnknownVersion { name: String, version: String },

    #[error("a downgrade of `{name}` needs an explicit target version")]
    VersionRequired { name: String },
}

/// The status groups offered by the package list's filter box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusFilter {
    Installed,
    NotInstalled,
    Upgradable,
    Downgradable,
    AllInstallable,
    All,
}

impl StatusFilter {
    pub fn matches(self, status: PackageStatus) -> bool {
        match self {
            Self::Installed => status.is_installed(),
            Self::NotInstalled => status == PackageStatus::NotInstalled,
            Self::Upgradable => status.is_upgradable(),
            Self::Downgradable => status.is_downgradable(),
            Self::AllInstallable => status != PackageStatus::NotInstallable,
            Self::All => true,
        }
    }
}

/// Combined status and text filter applied by the presentation layer.
#[derive(Debug, Clone)]
pub struct PackageFilter {
    pub status: StatusFilter,
    pub search: String,
}

impl Default for PackageFilter {
    fn default() -> Self {
        Self {
            status: StatusFilter::All,
            search: String::new(),
        }
    }
}

impl PackageFilter {
    pub fn matches(&self, record: &PackageRecord) -> bool {
        if !self.status.matches(record.status) {
            return false;
        }
        if self.search.is_empty() {
            return true;
        }
        let needle = self.search.to_lowercase();
        record.name.contains(&needle) || record.description.to_lowercase().contains(&needle)
    }
}

impl PackageTable {
    /// Build a table from reconciliation output. Records are kept in
    /// name-sorted order.
    pub fn from_records(mut records: Vec<PackageRecord>) -> Self {
        records.sort_by(|a, b| a.name.cmp(&b.name));
        let by_name = records
            .iter()
            .enumerate()
            .map(|(index, record)| (record.name.clone(), index))
            .collect();
        Self { records, by_name }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PackageRecord> {
        self.records.iter()
    }

    /// Records accepted by `filter`, in table order.
    pub fn filtered<'a>(&'a self, filter: &'a PackageFilter) -> Vec<&'a PackageRecord> {
        self.records
            .iter()
            .filter(|record| filter.matches(record))
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<&PackageRecord> {
        self.by_name
            .get(&name.to_lowercase())
            .map(|&index| &self.records[index])
    }

    /// Stage an action on a package, validating it against the record's
    /// current status and candidate versions.
    ///
    /// Install and upgrade default to the newest candidate when no version is
    /// given; a downgrade has no obvious default and requires one.
    /// `PackageAction::None` clears a previously staged action.
    pub fn set_action(
        &mut self,
        name: &str,
        action: PackageAction,
        version: Option<String>,
    ) -> Result<(), ActionError> {
        let index = *self
            .by_name
            .get(&name.to_lowercase())
            .ok_or_else(|| ActionError::UnknownPackage(name.to_string()))?;
        let record = &mut self.records[index];

        let allowed = match action {
            PackageAction::None => true,
            PackageAction::Install => record.status.is_installable(),
            PackageAction::Remove => record.status.is_removable(),
            PackageAction::Upgrade => record.status.is_upgradable(),
            PackageAction::Downgrade => record.status.is_downgradable(),
        };
        if !allowed {
            return Err(ActionError::InvalidForStatus {
                name: record.name.clone(),
                action,
                status: record.status,
            });
        }

        let action_version = match action {
            PackageAction::None | PackageAction::Remove => None,
            PackageAction::Install | PackageAction::Upgrade => match version {
                Some(version) => Some(validate_version(record, version)?),
                None => record.latest_version().map(str::to_string),
            },
            PackageAction::Downgrade => match version {
                Some(version) => Some(validate_version(record, version)?),
                None => {
                    return Err(ActionError::VersionRequired {
                        name: record.name.clone(),
                    });
                }
            },
        };

        record.action = action;
        record.action_version = action_version;
        Ok(())
    }

    /// Drop every staged action.
    pub fn clear_actions(&mut self) {
        for record in &mut self.records {
            record.action = PackageAction::None;
            record.action_version = None;
        }
    }

    pub fn has_pending_actions(&self) -> bool {
        self.records.iter().any(PackageRecord::has_pending_action)
    }

    /// The staged actions in table order, ready for the apply step.
    pub fn staged_actions(&self) -> Vec<StagedAction> {
        self.records
            .iter()
            .filter(|record| record.has_pending_action())
            .map(|record| StagedAction {
                name: record.name.clone(),
                package_type: record.package_type,
                action: record.action,
                version: record.action_version.clone(),
            })
            .collect()
    }
}

fn validate_version(record: &PackageRecord, version: String) -> Result<String, ActionError> {
    if record.versions.iter().any(|known| *known == version) {
        Ok(version)
    } else {
        Err(ActionError::UnknownVersion {
            name: record.name.clone(),
            version,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, status: PackageStatus, versions: &[&str]) -> PackageRecord {
        PackageRecord {
            name: name.to_string(),
            package_type: PackageType::Conda,
            description: String::new(),
            home_url: String::new(),
            license: String::new(),
            installed_version: status.is_installed().then(|| "1.0".to_string()),
            versions: versions.iter().map(|v| v.to_string()).collect(),
            canonical_versions: Vec::new(),
            status,
            action: PackageAction::None,
            action_version: None,
        }
    }

    fn table() -> PackageTable {
        PackageTable::from_records(vec![
            record("zlib", PackageStatus::Installed, &["1.0"]),
            record("numpy", PackageStatus::Upgradable, &["1.1", "1.0"]),
            record("scipy", PackageStatus::NotInstalled, &["0.17.0"]),
            record("legacy", PackageStatus::NotInstallable, &[]),
        ])
    }

    #[test]
    fn records_are_name_sorted_and_indexed() {
        let table = table();
        let names: Vec<&str> = table.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["legacy", "numpy", "scipy", "zlib"]);
        assert!(table.get("NumPy").is_some());
        assert!(table.get("nope").is_none());
    }

    #[test]
    fn install_defaults_to_the_newest_candidate() {
        let mut table = table();
        table
            .set_action("scipy", PackageAction::Install, None)
            .unwrap();
        let scipy = table.get("scipy").unwrap();
        assert_eq!(scipy.action, PackageAction::Install);
        assert_eq!(scipy.action_version.as_deref(), Some("0.17.0"));
    }

    #[test]
    fn actions_are_validated_against_status() {
        let mut table = table();
        assert!(matches!(
            table.set_action("zlib", PackageAction::Install, None),
            Err(ActionError::InvalidForStatus { .. })
        ));
        assert!(matches!(
            table.set_action("legacy", PackageAction::Install, None),
            Err(ActionError::InvalidForStatus { .. })
        ));
        assert!(matches!(
            table.set_action("scipy", PackageAction::Remove, None),
            Err(ActionError::InvalidForStatus { .. })
        ));
        assert!(matches!(
            table.set_action("ghost", PackageAction::Remove, None),
            Err(ActionError::UnknownPackage(_))
        ));
    }

    #[test]
    fn downgrade_requires_an_explicit_version() {
        let mut table = PackageTable::from_records(vec![record(
            "pandas",
            PackageStatus::Downgradable,
            &["1.0", "0.9"],
        )]);
        assert!(matches!(
            table.set_action("pandas", PackageAction::Downgrade, None),
            Err(ActionError::VersionRequired { .. })
        ));
        table
            .set_action("pandas", PackageAction::Downgrade, Some("0.9".to_string()))
            .unwrap();
        assert_eq!(
            table.get("pandas").unwrap().action_version.as_deref(),
            Some("0.9")
        );
    }

    #[test]
    fn unknown_target_versions_are_rejected() {
        let mut table = table();
        assert!(matches!(
            table.set_action("scipy", PackageAction::Install, Some("9.9".to_string())),
            Err(ActionError::UnknownVersion { .. })
        ));
    }

    #[test]
    fn staged_actions_drain_in_table_order() {
        let mut table = table();
        table
            .set_action("scipy", PackageAction::Install, None)
            .unwrap();
        table.set_action("zlib", PackageAction::Remove, None).unwrap();
        table
            .set_action("numpy", PackageAction::Upgrade, None)
            .unwrap();

        let staged = table.staged_actions();
        let names: Vec<&str> = staged.iter().map(|action| action.name.as_str()).collect();
        assert_eq!(names, ["numpy", "scipy", "zlib"]);

        table.clear_actions();
        assert!(!table.has_pending_actions());
        assert!(table.staged_actions().is_empty());
    }

    #[test]
    fn filters_combine_status_and_text() {
        let table = table();
        let upgradable = PackageFilter {
            status: StatusFilter::Upgradable,
            search: String::new(),
        };
        assert_eq!(table.filtered(&upgradable).len(), 1);

        let installed = PackageFilter {
            status: StatusFilter::Installed,
            search: String::new(),
        };
        // Upgradable counts as installed; not-installed and not-installable
        // do not.
        assert_eq!(table.filtered(&installed).len(), 2);

        let text = PackageFilter {
            status: StatusFilter::All,
            search: "num".to_string(),
        };
        assert_eq!(table.filtered(&text)[0].name, "numpy");

        let all_installable = PackageFilter {
            status: StatusFilter::AllInstallable,
            search: String::new(),
        };
        assert_eq!(table.filtered(&all_installable).len(), 3);
    }
}
