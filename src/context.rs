use std::path::{Path, PathBuf};
use std::sync::Arc;

use condesk_client::{RegistryClient, RegistryError, RegistryPackage};
use condesk_conda::{CondaApi, CondaError, EnvironmentError};
use condesk_config::{Config, ConfigError};
use condesk_consts::consts;
use condesk_reconcile::{
    EnvironmentSnapshot, MetadataStore, PackageMetadata, PackageTable, reconcile,
};
use condesk_repodata::{
    OfflineIndexError, RepodataSource, Reporter, load_repodata, synthesize_offline_repodata,
};
use miette::Diagnostic;
use parking_lot::RwLock;
use reqwest_middleware::ClientWithMiddleware;
use thiserror::Error;
use tracing::instrument;
use url::Url;

/// The application context: every external collaborator behind one handle,
/// constructed once and passed by reference. There is deliberately no global
/// instance.
pub struct Condesk {
    config: Config,
    conda: CondaApi,
    registry: RegistryClient,
    repodata: RepodataSource,
    metadata: RwLock<MetadataStore>,
    http: ClientWithMiddleware,
}

#[derive(Debug, Error, Diagnostic)]
pub enum BuildError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(help("install conda or point the builder at an executable"))]
    Conda(#[from] CondaError),

    #[error("failed to construct the HTTP client")]
    Http(#[source] Arc<reqwest::Error>),
}

/// Why a refresh produced no table.
#[derive(Debug, Error, Diagnostic)]
pub enum RefreshError {
    #[error(transparent)]
    #[diagnostic(help("select an existing environment prefix and try again"))]
    Environment(#[from] EnvironmentError),

    #[error(transparent)]
    Offline(#[from] OfflineIndexError),
}

#[derive(Default)]
pub struct CondeskBuilder {
    config: Option<Config>,
    conda_executable: Option<PathBuf>,
    http: Option<ClientWithMiddleware>,
    reporter: Option<Arc<dyn Reporter>>,
}

impl CondeskBuilder {
    /// Use an explicit configuration instead of loading the user's file.
    #[must_use]
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    /// Use a specific conda executable instead of searching the path.
    #[must_use]
    pub fn with_conda_executable(mut self, conda_executable: impl Into<PathBuf>) -> Self {
        self.conda_executable = Some(conda_executable.into());
        self
    }

    /// Use a pre-built HTTP client (proxies from the configuration are then
    /// the caller's responsibility).
    #[must_use]
    pub fn with_http_client(mut self, http: ClientWithMiddleware) -> Self {
        self.http = Some(http);
        self
    }

    /// Attach a download progress reporter.
    #[must_use]
    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn finish(self) -> Result<Condesk, BuildError> {
        let config = match self.config {
            Some(config) => config,
            None => Config::load_global()?,
        };

        let http = match self.http {
            Some(http) => http,
            None => {
                let mut builder = reqwest::Client::builder();
                for proxy in config.reqwest_proxies()? {
                    builder = builder.proxy(proxy);
                }
                let client = builder
                    .build()
                    .map_err(|err| BuildError::Http(Arc::new(err)))?;
                reqwest_middleware::ClientBuilder::new(client).build()
            }
        };

        let conda = match self.conda_executable {
            Some(executable) => CondaApi::with_executable(executable),
            None => CondaApi::discover()?,
        };

        let mut repodata = RepodataSource::new(http.clone(), config.cache_dir());
        if let Some(reporter) = self.reporter {
            repodata = repodata.with_reporter(reporter);
        }

        let registry = RegistryClient::new(http.clone(), config.registry_domain());
        if let Err(error) = registry.load_token() {
            tracing::warn!("could not load a stored registry token: {error}");
        }

        Ok(Condesk {
            config,
            conda,
            registry,
            repodata,
            metadata: RwLock::new(MetadataStore::new()),
            http,
        })
    }
}

impl Condesk {
    pub fn builder() -> CondeskBuilder {
        CondeskBuilder::default()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn conda(&self) -> &CondaApi {
        &self.conda
    }

    pub fn registry(&self) -> &RegistryClient {
        &self.registry
    }

    /// Rebuild the package table for the environment at `prefix`.
    ///
    /// Channel indexes are refreshed first; when every channel fails (fully
    /// offline) an index synthesized from the environment's own metadata
    /// keeps the table usable. The produced table replaces any previous one
    /// wholesale, including staged actions.
    #[instrument(skip(self))]
    pub async fn refresh(&self, prefix: &Path) -> Result<PackageTable, RefreshError> {
        let channels = self.config.channel_base_urls();
        let platform = self.config.platform();

        let outcome = self.repodata.update(&channels, &platform).await;
        let files = if outcome.is_total_failure() {
            if let Some(error) = outcome.last_error() {
                tracing::warn!("no channel reachable ({error}); synthesizing an offline index");
            }
            vec![synthesize_offline_repodata(
                prefix,
                self.repodata.cache_dir(),
            )?]
        } else {
            outcome.files
        };
        let indexes = load_repodata(&files);

        let linked = self.conda.linked(prefix)?;
        let pip = match self.conda.pip_list(prefix).await {
            Ok(pip) => pip,
            Err(CondaError::Environment(error)) => return Err(error.into()),
            Err(error) => {
                // Environments without python have no pip; nothing to list.
                tracing::debug!("pip listing unavailable: {error}");
                Vec::new()
            }
        };

        let snapshot = EnvironmentSnapshot::from_names(
            linked.iter().map(String::as_str),
            pip.iter().map(String::as_str),
        );
        let metadata = self.metadata.read();
        Ok(reconcile(&indexes, &snapshot, &metadata))
    }

    /// Download the bundled package metadata document into the cache and load
    /// it into the store used by subsequent refreshes.
    pub async fn update_metadata(&self) -> Result<(), RegistryError> {
        let url: Url = consts::PACKAGE_METADATA_URL.clone();
        let response = self.http.get(url.clone()).send().await?;
        if !response.status().is_success() {
            return Err(RegistryError::HttpStatus {
                url,
                status: response.status(),
            });
        }
        let raw = response.bytes().await?;

        let path = self.config.cache_dir().join(consts::PACKAGE_METADATA_FILE);
        if let Some(parent) = path.parent() {
            let _ = fs_err::tokio::create_dir_all(parent).await;
        }
        if let Err(error) = fs_err::tokio::write(&path, &raw).await {
            tracing::warn!("could not cache package metadata: {error}");
        }

        match serde_json::from_slice::<std::collections::HashMap<String, PackageMetadata>>(&raw) {
            Ok(entries) => {
                let mut metadata = self.metadata.write();
                for (name, entry) in entries {
                    metadata.insert(name, entry);
                }
            }
            Err(error) => tracing::warn!("ignoring malformed package metadata: {error}"),
        }
        Ok(())
    }

    /// Merge registry package listings (private/organization packages) into
    /// the metadata store.
    pub fn merge_registry_packages(&self, packages: Vec<RegistryPackage>) {
        let mut metadata = self.metadata.write();
        for package in packages {
            metadata.insert(
                package.name.clone(),
                PackageMetadata {
                    summary: package.summary,
                    home: package.home,
                    license: package.license,
                    latest_version: package.latest_version,
                },
            );
        }
    }

    /// Abandon all in-flight work on every backing resource: outstanding
    /// conda invocations, downloads and registry calls.
    pub fn terminate_all(&self) {
        self.conda.terminate_all();
        self.repodata.terminate_all();
        self.registry.terminate_all();
    }
}
