use std::sync::LazyLock;

use url::Url;

pub const APP_NAME: &str = "condesk";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const CONFIG_FILE: &str = "config.toml";

/// Per-channel repository index as served by conda channels.
pub const REPODATA_FILE: &str = "repodata.json";
pub const REPODATA_FILE_COMPRESSED: &str = "repodata.json.bz2";

/// Index synthesized from `conda-meta` when every channel is unreachable.
pub const OFFLINE_REPODATA_FILE: &str = "offline.json";

/// Bundled description/homepage/license metadata keyed by package name.
pub const PACKAGE_METADATA_FILE: &str = "metadata.json";

/// Subdirectory of an environment prefix holding linked-package sidecars.
pub const CONDA_META_DIR: &str = "conda-meta";

pub const CACHE_DIR: &str = "channels";
pub const TOKENS_DIR: &str = "tokens";

/// The channels assumed when the user configured none.
pub const DEFAULT_CHANNELS: &[&str] = &["conda-forge"];

pub static DEFAULT_REGISTRY_DOMAIN: LazyLock<Url> =
    LazyLock::new(|| Url::parse("https://api.anaconda.org").expect("hardcoded url is valid"));

pub static PACKAGE_METADATA_URL: LazyLock<Url> = LazyLock::new(|| {
    Url::parse("https://repo.continuum.io/pkgs/metadata.json").expect("hardcoded url is valid")
});
