//! Version ordering and canonical package names for the conda ecosystem.
//!
//! Every version comparison in the workspace routes through [`sort_versions`]
//! or [`compare`]; plain string comparison of version numbers is always wrong
//! (`"1.10" < "1.9"` lexically).

mod canonical;
mod sort;

pub use canonical::{CanonicalName, ParseCanonicalNameError};
pub use sort::{compare, sort_versions};
