mod common;

use common::{attr, config, Harness, BACKUP};
use otc_framework::diff::PlanAction;
use otc_framework::transport::Method;
use otc_framework::Value;
use otc_mock_cloud::EntityKind;
use serde_json::json;

const INSTANCE: &str = "7c3d2e1f-rds-instance";

/// A manual backup is created, polled until complete, and imported by `<instance>/<backup>`.
#[tokio::test(start_paused = true)]
async fn test_backup_create_and_import() {
    let h = Harness::start().await;
    let cfg = config(json!({
        "instance_id": INSTANCE,
        "name": "backup-nightly",
        "databases": [{"name": "orders"}],
    }));
    let backup = h.create(BACKUP, cfg.clone()).await;

    assert_eq!(attr(&backup, "status"), "COMPLETED");
    assert_eq!(attr(&backup, "type"), "manual");
    assert_eq!(backup.get("size"), Some(&Value::Int(2048)));
    assert_eq!(attr(&backup, "datastore.0.type"), "PostgreSQL");
    assert_eq!(attr(&backup, "databases.0.name"), "orders");

    let polls = h.cloud.calls_to(Method::Get, "/backups");
    assert!(polls.iter().all(|c| c.query.as_deref().unwrap_or_default().contains("instance_id=")));

    let plan = h.plan(BACKUP, Some(&backup), &cfg);
    assert_eq!(plan.action(), PlanAction::NoOp, "unexpected diff: {:?}", plan.diff);

    let imported = h
        .provider
        .import_state(BACKUP, &format!("{INSTANCE}/{}", backup.id))
        .await
        .expect("Failed to route import")
        .into_result()
        .expect("Failed to import backup");
    assert_eq!(imported.id, backup.id);
    assert_eq!(attr(&imported, "instance_id"), INSTANCE);
    assert_eq!(attr(&imported, "name"), "backup-nightly");
}

/// Importing a backup that does not exist fails instead of producing an empty state.
#[tokio::test(start_paused = true)]
async fn test_import_of_missing_backup_fails() {
    let h = Harness::start().await;

    let outcome = h
        .provider
        .import_state(BACKUP, &format!("{INSTANCE}/no-such-backup"))
        .await
        .expect("Failed to route import");

    assert!(outcome.state.is_gone());
    let err = outcome.error.expect("import must fail");
    assert!(err.to_string().contains("cannot import non-existent remote object"), "{err}");
}

/// Backup names are validated before anything is sent.
#[tokio::test(start_paused = true)]
async fn test_short_backup_name_is_rejected() {
    let h = Harness::start().await;
    h.cloud.clear_calls();
    let plan = h
        .provider
        .plan(BACKUP, None, &config(json!({"instance_id": INSTANCE, "name": "bk"})))
        .expect("Failed to plan");

    assert!(!plan.is_valid());
    assert!(h.cloud.calls().is_empty());
}

/// A backup removed behind the provider's back reads as gone.
#[tokio::test(start_paused = true)]
async fn test_backup_deleted_out_of_band() {
    let h = Harness::start().await;
    let backup = h
        .create(BACKUP, config(json!({"instance_id": INSTANCE, "name": "backup-temp"})))
        .await;

    assert!(h.cloud.delete_out_of_band(EntityKind::Backup, &backup.id).await);
    let outcome = h.provider.read(BACKUP, backup.clone()).await.expect("Failed to route read");
    assert!(outcome.is_ok());
    assert!(outcome.state.is_gone());
}
