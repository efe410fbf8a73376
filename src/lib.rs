//! condesk is the headless core of a desktop package manager for conda
//! environments.
//!
//! A [`Condesk`] handle is constructed once at application start and passed
//! by reference to whatever presentation layer sits on top. It owns the
//! serialized façades over the external collaborators (the conda binary, the
//! package registry, the channel servers) and drives the two workflows the
//! UI needs:
//!
//! - [`Condesk::refresh`]: bring channel indexes up to date (falling back to
//!   an offline index synthesized from the environment itself), read the
//!   linked and pip package sets, and reconcile everything into a fresh
//!   [`PackageTable`].
//! - [`Condesk::apply`]: run a batch of user-staged actions through conda and
//!   pip, one at a time, aggregating per-step results into a [`BatchReport`].

mod context;
mod report;

pub use condesk_client::{RegistryClient, RegistryError, RegistryPackage};
pub use condesk_conda::{CondaApi, CondaError, EnvironmentError, EnvironmentRef};
pub use condesk_config::{Config, ConfigError};
pub use condesk_reconcile::{
    ActionError, EnvironmentSnapshot, MetadataStore, PackageAction, PackageFilter, PackageRecord,
    PackageStatus, PackageTable, PackageType, StagedAction, StatusFilter,
};
pub use condesk_repodata::{RepodataSource, Reporter, UpdateOutcome};
pub use condesk_version::{CanonicalName, compare, sort_versions};
pub use context::{BuildError, Condesk, CondeskBuilder, RefreshError};
pub use report::{BatchReport, StepReport};
