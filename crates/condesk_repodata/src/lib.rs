//! Fetching, caching and parsing of per-channel repository indexes.
//!
//! Channels serve a `repodata.json.bz2` per platform subdirectory. The
//! [`RepodataSource`] keeps a local cache of those documents current (HEAD
//! size check, streamed download, dual compressed/decompressed artifacts),
//! tolerating unreachable channels, and [`load_repodata`] turns whatever made
//! it to disk into parsed [`RepoData`] documents. When nothing is reachable
//! at all, [`synthesize_offline_repodata`] builds a stand-in index from the
//! environment's own `conda-meta` sidecars so the rest of the pipeline keeps
//! working offline.

mod error;
mod fetch;
mod offline;
mod repo_data;
mod reporter;

pub use error::FetchRepodataError;
pub use fetch::{RepodataSource, UpdateOutcome};
pub use offline::{OfflineIndexError, synthesize_offline_repodata};
pub use repo_data::{PackageEntry, RepoData, load_repodata};
pub use reporter::{NoReporter, Reporter};
