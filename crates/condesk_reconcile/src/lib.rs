//! The package reconciliation engine.
//!
//! [`reconcile`] combines every loaded repository index with the set of
//! packages linked into the active environment and the set of pip-installed
//! packages, and produces the [`PackageTable`]: one row per distinct package
//! name, carrying its type, installed and candidate versions, computed
//! status, and any user-staged action. The table is rebuilt wholesale on
//! every refresh; staged actions do not survive a refresh.

mod abi;
mod engine;
mod metadata;
mod record;
mod table;

pub use abi::AbiTags;
pub use engine::{EnvironmentSnapshot, reconcile};
pub use metadata::{MetadataError, MetadataStore, PackageMetadata};
pub use record::{PackageAction, PackageRecord, PackageStatus, PackageType};
pub use table::{ActionError, PackageFilter, PackageTable, StagedAction, StatusFilter};
