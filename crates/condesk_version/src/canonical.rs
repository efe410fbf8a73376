use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The `{name}-{version}-{build}` identifier used throughout the conda
/// ecosystem for one concrete package artifact.
///
/// Names routinely contain hyphens (`zope.interface-4.1.3-py35_0`,
/// `backports-abc-0.4-py27_0`), so splitting takes exactly the last two
/// `-`-delimited fields as version and build and leaves the remainder as the
/// name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CanonicalName {
    name: String,
    version: String,
    build: String,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("`{0}` is not a canonical package name (expected `name-version-build`)")]
pub struct ParseCanonicalNameError(String);

impl CanonicalName {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        build: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            build: build.into(),
        }
    }

    /// The bare package name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The version field, only comparable through the version ordering.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// The build string, which may embed `py*`/`np*` ABI tags.
    pub fn build(&self) -> &str {
        &self.build
    }

    /// Render the `name=version` match specification consumed by the package
    /// manager's install and dry-run operations.
    pub fn match_spec(&self) -> String {
        format!("{}={}", self.name, self.version)
    }
}

impl FromStr for CanonicalName {
    type Err = ParseCanonicalNameError;

    fn from_str(canonical: &str) -> Result<Self, Self::Err> {
        let mut fields = canonical.rsplitn(3, '-');
        let build = fields.next().filter(|f| !f.is_empty());
        let version = fields.next().filter(|f| !f.is_empty());
        let name = fields.next().filter(|f| !f.is_empty());
        match (name, version, build) {
            (Some(name), Some(version), Some(build)) => Ok(Self::new(name, version, build)),
            _ => Err(ParseCanonicalNameError(canonical.to_string())),
        }
    }
}

impl Display for CanonicalName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.name, self.version, self.build)
    }
}

impl TryFrom<String> for CanonicalName {
    type Error = ParseCanonicalNameError;

    fn try_from(canonical: String) -> Result<Self, Self::Error> {
        canonical.parse()
    }
}

impl From<CanonicalName> for String {
    fn from(canonical: CanonicalName) -> Self {
        canonical.to_string()
    }
}
