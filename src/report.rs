use std::fmt::Write;

use condesk_conda::{CondaError, EnvironmentRef};
use condesk_reconcile::{PackageAction, PackageType, StagedAction};
use tracing::instrument;

use crate::context::Condesk;

/// The aggregated result of applying a batch of staged actions.
///
/// Every action is attempted even when an earlier one failed; the per-step
/// results are collected and reported at the end of the batch. The one
/// exception is a failure that invalidates the environment itself, which
/// aborts the remainder.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub steps: Vec<StepReport>,
    /// True when the batch stopped early because the environment became
    /// unusable.
    pub aborted: bool,
}

#[derive(Debug)]
pub struct StepReport {
    pub action: StagedAction,
    pub error: Option<CondaError>,
}

impl BatchReport {
    pub fn succeeded(&self) -> bool {
        !self.aborted && self.steps.iter().all(|step| step.error.is_none())
    }

    pub fn failures(&self) -> impl Iterator<Item = &StepReport> {
        self.steps.iter().filter(|step| step.error.is_some())
    }

    /// The end-of-batch listing shown to the user: one line per failed step.
    pub fn summary(&self) -> String {
        let mut summary = String::new();
        for step in self.failures() {
            if let Some(error) = &step.error {
                let _ = writeln!(
                    summary,
                    "{} {} failed: {error}",
                    step.action.action, step.action.name
                );
            }
        }
        if self.aborted {
            summary.push_str("remaining actions were skipped\n");
        }
        summary
    }
}

impl Condesk {
    /// Run a batch of staged actions against an environment, one at a time.
    ///
    /// Callers pass `PackageTable::staged_actions()` output; afterwards a
    /// refresh rebuilds the table against the mutated environment.
    #[instrument(skip(self, actions), fields(actions = actions.len()))]
    pub async fn apply(&self, env: &EnvironmentRef, actions: Vec<StagedAction>) -> BatchReport {
        let channels: Vec<String> = self
            .config()
            .channel_base_urls()
            .iter()
            .map(|url| url.as_str().trim_end_matches('/').to_string())
            .collect();
        let token = self.registry().token();

        let mut report = BatchReport::default();
        for action in actions {
            let result = self.run_action(env, &action, &channels, token.as_deref()).await;
            let fatal = matches!(result, Err(CondaError::Environment(_)));
            report.steps.push(StepReport {
                action,
                error: result.err(),
            });
            if fatal {
                report.aborted = true;
                break;
            }
        }
        report
    }

    async fn run_action(
        &self,
        env: &EnvironmentRef,
        action: &StagedAction,
        channels: &[String],
        token: Option<&str>,
    ) -> Result<(), CondaError> {
        match action.action {
            PackageAction::None => Ok(()),
            PackageAction::Install | PackageAction::Upgrade | PackageAction::Downgrade => {
                let spec = match &action.version {
                    Some(version) => format!("{}={version}", action.name),
                    None => action.name.clone(),
                };
                self.conda()
                    .install(env, &[spec], channels, token)
                    .await
                    .map(|_| ())
            }
            PackageAction::Remove => match (action.package_type, env) {
                (PackageType::Pip, EnvironmentRef::Prefix(prefix)) => {
                    self.conda()
                        .pip_remove(prefix, std::slice::from_ref(&action.name))
                        .await
                }
                _ => self
                    .conda()
                    .remove(env, std::slice::from_ref(&action.name))
                    .await
                    .map(|_| ()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn staged(name: &str, action: PackageAction) -> StagedAction {
        StagedAction {
            name: name.to_string(),
            package_type: PackageType::Conda,
            action,
            version: Some("1.0".to_string()),
        }
    }

    #[test]
    fn summary_lists_every_failure() {
        let report = BatchReport {
            steps: vec![
                StepReport {
                    action: staged("numpy", PackageAction::Upgrade),
                    error: None,
                },
                StepReport {
                    action: staged("scipy", PackageAction::Install),
                    error: Some(CondaError::Failed {
                        operation: "install".to_string(),
                        stderr: "UnsatisfiableError".to_string(),
                    }),
                },
            ],
            aborted: false,
        };

        assert!(!report.succeeded());
        assert_eq!(report.failures().count(), 1);
        let summary = report.summary();
        assert!(summary.contains("install scipy failed"));
        assert!(summary.contains("UnsatisfiableError"));
        assert!(!summary.contains("numpy"));
    }

    #[test]
    fn empty_batch_succeeds() {
        let report = BatchReport::default();
        assert!(report.succeeded());
        assert!(report.summary().is_empty());
    }
}
