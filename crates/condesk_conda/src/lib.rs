//! A serialized façade over the conda binary and per-environment pip.
//!
//! The binary is treated as an opaque collaborator with a known input/output
//! contract: arguments are built by [`command`], invocations run one at a
//! time through a [`condesk_task_queue::TaskQueue`] (conda takes filesystem
//! locks and must never run twice concurrently against the same
//! environment), stdout is parsed as JSON and stderr is surfaced verbatim.

mod api;
mod command;
mod environment;
mod error;

pub use api::{CondaApi, PipPackage};
pub use command::{clone_env, create, dependencies, install, remove};
pub use environment::{EnvironmentRef, linked};
pub use error::{CondaError, EnvironmentError};
