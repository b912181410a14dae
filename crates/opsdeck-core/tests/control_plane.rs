//! End-to-end tests through the control plane.

use std::sync::Arc;
use std::time::Duration;

use opsdeck_core::backup::RecoveryStep;
use opsdeck_core::{
    BackupStatus, CacheConfig, CancellationToken, ControlPlane, Error, EvictionPolicy,
    HealthStatus, MemoryGateway, MigrationStatus, OpsConfig, RecoveryPlan, RiskLevel,
};

struct TestContext {
    plane: ControlPlane,
    gateway: Arc<MemoryGateway>,
    token: CancellationToken,
}

impl TestContext {
    fn new() -> Self {
        Self::with_config(OpsConfig::ephemeral())
    }

    fn with_config(config: OpsConfig) -> Self {
        let gateway = Arc::new(
            MemoryGateway::new()
                .with_table("projects", 4096)
                .with_table("ideas", 1024)
                .with_connections(3),
        );
        let plane = ControlPlane::open(config, gateway.clone()).unwrap();
        Self {
            plane,
            gateway,
            token: CancellationToken::new(),
        }
    }
}

#[tokio::test]
async fn test_migration_deployment_flow() {
    let ctx = TestContext::new();
    let migrations = ctx.plane.migrations();

    let projects = migrations
        .define(
            "create_projects",
            "projects table",
            "CREATE TABLE projects (id uuid primary key, name text not null);",
            "DROP TABLE projects;",
            vec![],
        )
        .unwrap();
    let ideas = migrations
        .define(
            "create_ideas",
            "ideas table",
            "CREATE TABLE ideas (id uuid primary key, project_id uuid references projects);",
            "DROP TABLE ideas;",
            vec![projects.id.clone()],
        )
        .unwrap();

    let plan = migrations
        .plan("launch", "initial schema", &[projects.id.clone(), ideas.id.clone()])
        .unwrap();
    assert_eq!(plan.risk.level, RiskLevel::Low);

    let err = migrations.execute(&ideas.id, &ctx.token).await.unwrap_err();
    assert!(matches!(err, Error::Dependency { .. }));

    for id in [&projects.id, &ideas.id] {
        let report = migrations.execute(id, &ctx.token).await.unwrap();
        assert!(report.is_success());
    }

    let summary = migrations.status();
    assert_eq!(summary.total, 2);
    assert_eq!(summary.completed, 2);

    let report = migrations.rollback(&ideas.id, &ctx.token).await.unwrap();
    assert_eq!(report.status, MigrationStatus::RolledBack);
    assert_eq!(ctx.gateway.executed().len(), 3);
}

#[tokio::test]
async fn test_backup_and_recovery_flow() {
    let ctx = TestContext::new();
    let backups = ctx.plane.backups();

    let backup = backups.create_backup("pre-deploy", &ctx.token).await.unwrap();
    assert_eq!(backup.status, BackupStatus::Completed);
    assert_eq!(backup.size, 5120);

    let plan = backups.build_recovery_plan(&backup.id).unwrap();
    let result = backups.execute_recovery_plan(&plan, &ctx.token).await;
    assert!(result.success);
    assert_eq!(result.completed_steps.len(), 6);
    assert!(ctx
        .gateway
        .executed()
        .iter()
        .any(|s| s.contains(&backup.id)));

    assert_eq!(backups.check_backup_health().status, HealthStatus::Healthy);
}

#[tokio::test]
async fn test_recovery_halts_on_critical_failure() {
    let ctx = TestContext::new();
    ctx.gateway.fail_scripts_containing("ops_suspend_services");

    let plan = RecoveryPlan::new(
        "bak_manual",
        vec![
            RecoveryStep::new("verify", "verify", "SELECT ops_verify_backup('bak_manual');", 1, true),
            RecoveryStep::new("stop", "stop", "SELECT ops_suspend_services();", 2, true),
            RecoveryStep::new(
                "restoreSchema",
                "restore schema",
                "SELECT ops_restore_schema('bak_manual');",
                3,
                true,
            ),
        ],
    );

    let result = ctx
        .plane
        .backups()
        .execute_recovery_plan(&plan, &ctx.token)
        .await;
    assert!(!result.success);
    assert_eq!(result.completed_steps, vec!["verify"]);
    assert_eq!(result.failed_steps, vec!["stop"]);
    assert_eq!(result.skipped_steps, vec!["restoreSchema"]);
    assert!(!result.errors.is_empty());
}

#[tokio::test]
async fn test_cache_and_telemetry_feed_health() {
    let ctx = TestContext::with_config(OpsConfig::ephemeral().with_cache(CacheConfig {
        max_size: 2,
        ttl: Duration::from_secs(60),
        policy: EvictionPolicy::Fifo,
    }));

    let cache = ctx.plane.cache();
    cache.set("a", serde_json::json!(1));
    cache.set("b", serde_json::json!(2));
    cache.set("c", serde_json::json!(3));
    assert!(cache.get("a").is_none());
    assert!(cache.get("b").is_some());
    assert!(cache.get("c").is_some());

    let telemetry = ctx.plane.telemetry();
    telemetry.record("SELECT * FROM projects", 1200.0);
    telemetry.record("SELECT * FROM projects", 800.0);
    let metric = telemetry.get("SELECT * FROM projects").unwrap();
    assert_eq!(metric.count, 2);
    assert!((metric.avg_time - 1000.0).abs() < f64::EPSILON);

    let report = ctx.plane.health().scan().await;
    assert!((report.performance.cache_hit_rate - 2.0 / 3.0).abs() < 1e-9);
    assert!(report.alerts.iter().any(|a| a.contains("slow queries")));
    assert_eq!(ctx.plane.health().trends().len(), 1);
    assert!(!ctx.plane.health().alerts().list(false).is_empty());
}

#[tokio::test]
async fn test_repeated_scans_read_through_cache() {
    let ctx = TestContext::new();
    let health = ctx.plane.health();

    health.scan().await;
    let first = ctx.plane.cache().stats();
    assert_eq!(first.size, 1);
    assert_eq!(first.total_hits, 0);

    health.scan().await;
    health.scan().await;
    let stats = ctx.plane.cache().stats();
    assert_eq!(stats.size, 1);
    assert_eq!(stats.total_hits, 2);

    let telemetry = ctx.plane.telemetry();
    assert_eq!(telemetry.get("gateway:metadata:tableSizes").unwrap().count, 1);
    assert_eq!(telemetry.get("gateway:metadata:connections").unwrap().count, 3);

    // Executed scripts drop cached reads and show up in telemetry.
    let m = ctx
        .plane
        .migrations()
        .define("create_tags", "", "CREATE TABLE tags (id int);", "DROP TABLE tags;", vec![])
        .unwrap();
    ctx.plane.migrations().execute(&m.id, &ctx.token).await.unwrap();
    assert!(ctx.plane.cache().is_empty());
    assert_eq!(telemetry.get("CREATE TABLE tags (id int);").unwrap().count, 1);

    let report = health.scan().await;
    assert_eq!(report.database.table_count, Some(2));
    assert_eq!(telemetry.get("gateway:metadata:tableSizes").unwrap().count, 2);
}

#[tokio::test]
async fn test_report_serializes_camel_case() {
    let ctx = TestContext::new();
    let report = ctx.plane.health().report().await;
    let json = serde_json::to_value(&report).unwrap();

    assert!(json.get("generatedAt").is_some());
    assert!(json["migrations"].get("rolledBack").is_some());
    assert!(json["performance"].get("cacheHitRate").is_some());
    assert!(json["database"].get("tableCount").is_some());
    assert_eq!(json["backups"]["status"], "warning");
}
