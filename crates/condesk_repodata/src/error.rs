use std::path::PathBuf;
use std::sync::Arc;

use reqwest::StatusCode;
use reqwest_middleware::Error as ReqwestMiddlewareError;
use thiserror::Error;
use url::Url;

/// Errors that can occur while refreshing a single channel's repository
/// index. One failing channel never fails the batch; these are recorded per
/// URL and reported alongside the files that did arrive.
#[derive(Debug, Clone, Error)]
pub enum FetchRepodataError {
    #[error(transparent)]
    Io(Arc<std::io::Error>),

    #[error("failed to download {url}: {status}")]
    HttpStatus { url: Url, status: StatusCode },

    #[error(transparent)]
    Reqwest(Arc<reqwest::Error>),

    #[error(transparent)]
    ReqwestMiddleware(Arc<ReqwestMiddlewareError>),

    #[error("failed to decompress {path}")]
    Decompress {
        path: PathBuf,
        #[source]
        source: Arc<std::io::Error>,
    },

    #[error(transparent)]
    Join(Arc<tokio::task::JoinError>),

    #[error("the download was cancelled")]
    Cancelled,
}

impl From<std::io::Error> for FetchRepodataError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(Arc::new(err))
    }
}

impl From<reqwest::Error> for FetchRepodataError {
    fn from(err: reqwest::Error) -> Self {
        Self::Reqwest(Arc::new(err))
    }
}

impl From<ReqwestMiddlewareError> for FetchRepodataError {
    fn from(err: ReqwestMiddlewareError) -> Self {
        Self::ReqwestMiddleware(Arc::new(err))
    }
}

impl From<tokio::task::JoinError> for FetchRepodataError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Join(Arc::new(err))
    }
}
