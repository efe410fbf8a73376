use condesk_version::CanonicalName;
use serde::{Deserialize, Serialize};
use strum::Display;

/// Where an installed package came from. A name present in the pip-installed
/// set is always classified as pip, even when a conda index also lists it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PackageType {
    Conda,
    Pip,
}

/// The computed relationship between the installed version (if any) and the
/// candidate versions the loaded indexes offer for this environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum PackageStatus {
    /// Installed and neither newer nor older candidates exist.
    Installed,
    /// Not installed, with at least one installable candidate.
    NotInstalled,
    /// Installed at the oldest candidate; newer candidates exist.
    Upgradable,
    /// Installed at the newest candidate; older candidates exist.
    Downgradable,
    /// Installed strictly between the oldest and newest candidates.
    Mixgradable,
    /// Known only from linked/pip data; no candidate survives build pruning.
    NotInstallable,
}

impl PackageStatus {
    pub fn is_installed(self) -> bool {
        matches!(
            self,
            Self::Installed | Self::Upgradable | Self::Downgradable | Self::Mixgradable
        )
    }

    pub fn is_installable(self) -> bool {
        self == Self::NotInstalled
    }

    pub fn is_removable(self) -> bool {
        self.is_installed()
    }

    pub fn is_upgradable(self) -> bool {
        matches!(self, Self::Upgradable | Self::Mixgradable)
    }

    pub fn is_downgradable(self) -> bool {
        matches!(self, Self::Downgradable | Self::Mixgradable)
    }
}

/// A user-staged action, pending until the apply step runs it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PackageAction {
    #[default]
    None,
    Install,
    Remove,
    Upgrade,
    Downgrade,
}

/// One row of the package table: everything known about a distinct package
/// name after a reconciliation pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageRecord {
    /// Bare package name, lowercased.
    pub name: String,

    pub package_type: PackageType,

    pub description: String,
    pub home_url: String,
    pub license: String,

    /// Version linked into the environment (conda) or reported by pip;
    /// `None` is the "not installed" sentinel.
    pub installed_version: Option<String>,

    /// Distinct candidate version numbers, newest first, restricted to builds
    /// compatible with the environment's python/numpy ABI.
    pub versions: Vec<String>,

    /// The candidate artifacts behind `versions`, newest first.
    pub canonical_versions: Vec<CanonicalName>,

    pub status: PackageStatus,

    pub action: PackageAction,

    /// The version a staged install/upgrade/downgrade targets.
    pub action_version: Option<String>,
}

impl PackageRecord {
    /// The version string shown in the version column.
    pub fn display_version(&self) -> &str {
        self.installed_version
            .as_deref()
            .or_else(|| self.versions.first().map(String::as_str))
            .unwrap_or("-")
    }

    /// The newest candidate version, if any candidate survived pruning.
    pub fn latest_version(&self) -> Option<&str> {
        self.versions.first().map(String::as_str)
    }

    pub fn has_pending_action(&self) -> bool {
        self.action != PackageAction::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_capabilities() {
        assert!(PackageStatus::Installed.is_removable());
        assert!(PackageStatus::Mixgradable.is_upgradable());
        assert!(PackageStatus::Mixgradable.is_downgradable());
        assert!(PackageStatus::NotInstalled.is_installable());
        assert!(!PackageStatus::NotInstallable.is_installable());
        assert!(!PackageStatus::NotInstalled.is_removable());
    }

    #[test]
    fn statuses_render_kebab_case() {
        assert_eq!(PackageStatus::NotInstalled.to_string(), "not-installed");
        assert_eq!(PackageType::Conda.to_string(), "conda");
        assert_eq!(PackageAction::None.to_string(), "none");
    }
}
