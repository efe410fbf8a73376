use std::path::Path;

use condesk::{
    Condesk, Config, EnvironmentRef, PackageAction, PackageStatus, PackageType, RefreshError,
    StagedAction,
};
use tempfile::{TempDir, tempdir};

fn seeded_prefix() -> TempDir {
    let prefix = tempdir().unwrap();
    let meta = prefix.path().join("conda-meta");
    std::fs::create_dir_all(&meta).unwrap();
    std::fs::write(
        meta.join("python-3.6.1-0.json"),
        r#"{"name": "python", "version": "3.6.1", "size": 10}"#,
    )
    .unwrap();
    std::fs::write(
        meta.join("numpy-1.10.0-py36_0.json"),
        r#"{"name": "numpy", "version": "1.10.0", "size": 20,
            "files": ["lib/python3.6/site-packages/numpy/__init__.py"],
            "icondata": "zzzz"}"#,
    )
    .unwrap();
    prefix
}

fn offline_app(cache: &Path) -> Condesk {
    // Every channel points at a closed port, forcing the offline fallback.
    let config = Config {
        channels: vec!["http://127.0.0.1:9/void".to_string()],
        platform: Some("linux-64".to_string()),
        cache_dir: Some(cache.to_path_buf()),
        ..Config::default()
    };
    Condesk::builder()
        .with_config(config)
        .with_conda_executable("/bin/false")
        .finish()
        .unwrap()
}

#[tokio::test]
async fn fully_offline_refresh_synthesizes_a_table_from_the_environment() {
    let prefix = seeded_prefix();
    let cache = tempdir().unwrap();
    let app = offline_app(cache.path());

    let table = app.refresh(prefix.path()).await.unwrap();

    let numpy = table.get("numpy").unwrap();
    assert_eq!(numpy.package_type, PackageType::Conda);
    assert_eq!(numpy.installed_version.as_deref(), Some("1.10.0"));
    assert_eq!(numpy.status, PackageStatus::Installed);

    let python = table.get("python").unwrap();
    assert_eq!(python.status, PackageStatus::Installed);

    // The synthesized index is a real cache artifact of the refresh.
    assert!(cache.path().join("offline.json").is_file());
}

#[tokio::test]
async fn refresh_against_a_missing_prefix_is_a_blocking_error() {
    let cache = tempdir().unwrap();
    let app = offline_app(cache.path());

    let error = app
        .refresh(Path::new("/no/such/prefix"))
        .await
        .expect_err("a missing environment cannot be reconciled");
    assert!(matches!(
        error,
        RefreshError::Offline(_) | RefreshError::Environment(_)
    ));
}

#[tokio::test]
async fn failing_actions_are_aggregated_not_aborting() {
    let prefix = seeded_prefix();
    let cache = tempdir().unwrap();
    let app = offline_app(cache.path());

    let actions = vec![
        StagedAction {
            name: "scipy".to_string(),
            package_type: PackageType::Conda,
            action: PackageAction::Install,
            version: Some("0.17.0".to_string()),
        },
        StagedAction {
            name: "numpy".to_string(),
            package_type: PackageType::Conda,
            action: PackageAction::Remove,
            version: None,
        },
    ];

    let env = EnvironmentRef::by_prefix(prefix.path());
    let report = app.apply(&env, actions).await;

    // `/bin/false` fails every invocation: both steps are attempted and both
    // failures are reported; nothing aborts the batch.
    assert!(!report.succeeded());
    assert!(!report.aborted);
    assert_eq!(report.steps.len(), 2);
    assert_eq!(report.failures().count(), 2);
    assert!(report.summary().contains("install scipy failed"));
    assert!(report.summary().contains("remove numpy failed"));
}
