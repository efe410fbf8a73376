//! Pure argument builders for conda invocations.
//!
//! Every operation is JSON-mode and non-interactive. Channel lists always
//! imply `--override-channels` so the invocation sees exactly the channels
//! the front-end is configured with, and an authentication token is spliced
//! into non-default channel URLs as a `t/{token}` path segment.

use crate::environment::EnvironmentRef;
use crate::error::CondaError;

/// Channels that never get a token spliced in.
const DEFAULT_CHANNELS: &[&str] = &[
    "https://repo.continuum.io/pkgs/pro",
    "https://repo.continuum.io/pkgs/free",
];

/// `conda install` for a list of `name=version` specs.
pub fn install(
    env: &EnvironmentRef,
    specs: &[String],
    channels: &[String],
    token: Option<&str>,
) -> Vec<String> {
    let mut args = string_vec(["install", "--yes", "--json", "--quiet"]);
    args.extend(env.args());
    args.extend(channel_args(channels, token));
    args.extend(specs.iter().cloned());
    args
}

/// `conda remove`. Unlike install, conda refuses to guess the environment
/// here, so [`EnvironmentRef::Current`] is rejected.
pub fn remove(env: &EnvironmentRef, specs: &[String]) -> Result<Vec<String>, CondaError> {
    if *env == EnvironmentRef::Current {
        return Err(CondaError::EnvironmentRequired("remove".to_string()));
    }
    let mut args = string_vec(["remove", "--yes", "--json", "--quiet"]);
    args.extend(env.args());
    args.extend(specs.iter().cloned());
    Ok(args)
}

/// `conda create` for a fresh environment with the given specs.
pub fn create(
    env: &EnvironmentRef,
    specs: &[String],
    channels: &[String],
) -> Result<Vec<String>, CondaError> {
    if *env == EnvironmentRef::Current {
        return Err(CondaError::EnvironmentRequired("create".to_string()));
    }
    let mut args = string_vec(["create", "--yes", "--json", "--quiet"]);
    args.extend(env.args());
    args.extend(channel_args(channels, None));
    args.extend(specs.iter().cloned());
    Ok(args)
}

/// `conda create --clone` of an existing environment.
pub fn clone_env(env: &EnvironmentRef, source: &str) -> Result<Vec<String>, CondaError> {
    if *env == EnvironmentRef::Current {
        return Err(CondaError::EnvironmentRequired("clone".to_string()));
    }
    let mut args = string_vec(["create", "--yes", "--json", "--quiet"]);
    args.extend(env.args());
    args.push("--clone".to_string());
    args.push(source.to_string());
    Ok(args)
}

/// A dependency dry-run: what would installing `specs` change? The answer is
/// the solver's JSON plan; nothing is modified.
pub fn dependencies(env: &EnvironmentRef, specs: &[String], channels: &[String]) -> Vec<String> {
    let mut args = string_vec(["install", "--dry-run", "--json"]);
    args.extend(env.args());
    args.extend(channel_args(channels, None));
    args.extend(specs.iter().cloned());
    args
}

fn channel_args(channels: &[String], token: Option<&str>) -> Vec<String> {
    if channels.is_empty() {
        return Vec::new();
    }
    let mut args = vec!["--override-channels".to_string()];
    for channel in channels {
        args.push("--channel".to_string());
        args.push(token_channel(channel, token));
    }
    args
}

/// Splice `t/{token}` in front of the final URL segment of a non-default
/// channel, which is how the commercial registry authenticates channel
/// access.
fn token_channel(channel: &str, token: Option<&str>) -> String {
    match token {
        Some(token) if !DEFAULT_CHANNELS.contains(&channel) => {
            match channel.rsplit_once('/') {
                Some((base, last)) => format!("{base}/t/{token}/{last}"),
                None => channel.to_string(),
            }
        }
        _ => channel.to_string(),
    }
}

fn string_vec<const N: usize>(args: [&str; N]) -> Vec<String> {
    args.iter().map(|arg| arg.to_string()).collect()
}
