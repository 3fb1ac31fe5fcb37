//! Migration pipeline scenarios against the in-memory platform.

#![allow(clippy::expect_used)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use hangar_api_types::{
    AutoscaleConfig, META_PREVIOUS_ALLOC, META_RELEASE_VERSION, Mount, PlatformVersion,
};
use hangar_cli::application::services::database::COORDINATION_SECRET;
use hangar_cli::application::services::migrator::{
    self, MigrateOptions, MigrationFailure, MigrationPlan, MigrationReport, Migrator, Recovery,
};
use hangar_cli::domain::error::failed_step;
use hangar_cli::domain::{
    MigrationTuning, Milestone, Step, ValidationError, is_aborted, is_already_locked, is_timeout,
};
use tokio_util::sync::CancellationToken;

use crate::fakes::{
    APP, FakePlatform, MemoryWriter, RecordingReporter, ScriptedPrompter, alloc, app_config,
    volume,
};

fn two_unit_app() -> Arc<FakePlatform> {
    Arc::new(FakePlatform::legacy(vec![
        alloc("aaaaaaaa-1", "app", "ord"),
        alloc("bbbbbbbb-2", "app", "ord"),
    ]))
}

fn opts() -> MigrateOptions {
    MigrateOptions {
        app: APP.into(),
        ..MigrateOptions::default()
    }
}

async fn plan(platform: &Arc<FakePlatform>, opts: MigrateOptions) -> MigrationPlan {
    let writer = MemoryWriter::default();
    migrator::prepare(
        platform.as_ref(),
        platform.as_ref(),
        platform.as_ref(),
        &writer,
        opts,
    )
    .await
    .expect("migration plan")
}

async fn execute(
    platform: &Arc<FakePlatform>,
    plan: &MigrationPlan,
    prompter: &ScriptedPrompter,
    reporter: &RecordingReporter,
    cancel: CancellationToken,
) -> Result<MigrationReport, MigrationFailure> {
    let tuning = MigrationTuning::default();
    let migrator = Migrator {
        cp: platform.as_ref(),
        fleet: Arc::clone(platform),
        db: platform.as_ref(),
        reporter,
        tuning: &tuning,
        cancel,
    };
    migrator.run(plan, prompter).await
}

async fn migrate(platform: &Arc<FakePlatform>, prompter: &ScriptedPrompter) -> Result<MigrationReport, MigrationFailure> {
    let plan = plan(platform, opts()).await;
    let reporter = RecordingReporter::default();
    execute(platform, &plan, prompter, &reporter, CancellationToken::new()).await
}

// ── Happy paths ───────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_clean_migration_moves_app_to_target() {
    let platform = two_unit_app();

    let report = migrate(&platform, &ScriptedPrompter::non_interactive())
        .await
        .expect("migration succeeds");

    let s = platform.snapshot();
    assert_eq!(s.app.platform_version, PlatformVersion::Target);
    assert!(s.allocations.is_empty(), "legacy allocations left running");
    assert_eq!(s.live_machines().len(), 2);
    assert!(s.lock.is_none(), "app lock not released");
    assert!(s.leases.is_empty(), "machine leases not released");
    assert_eq!(s.lease_releases, 2);
    assert_eq!(report.release.version, 1);
    assert_eq!(report.machines.len(), 2);

    let replaced: Vec<&str> = s
        .live_machines()
        .iter()
        .filter_map(|m| m.config.metadata.get(META_PREVIOUS_ALLOC))
        .map(String::as_str)
        .collect();
    assert_eq!(replaced, vec!["aaaaaaaa-1", "bbbbbbbb-2"]);
    assert!(s
        .live_machines()
        .iter()
        .all(|m| m.config.metadata.get(META_RELEASE_VERSION).map(String::as_str) == Some("1")));
}

#[tokio::test(start_paused = true)]
async fn test_without_volumes_legacy_units_stop_after_machines_start() {
    let platform = two_unit_app();

    migrate(&platform, &ScriptedPrompter::non_interactive())
        .await
        .expect("migration succeeds");

    let s = platform.snapshot();
    let launched = s.first_call("launch").expect("machines launched");
    let checked = s.first_call("check_statuses").expect("health checks read");
    let scaled = s.first_call("set_group_counts").expect("legacy scaled down");
    assert!(launched < scaled, "zero-downtime migration scaled down first");
    assert!(checked < scaled, "legacy scaled down before health checks passed");
}

#[tokio::test(start_paused = true)]
async fn test_forked_volumes_force_downtime_and_are_mounted() {
    let mut with_volume = alloc("aaaaaaaa-1", "app", "ord");
    with_volume.attached_volumes = vec!["vol-1".into()];
    let platform = Arc::new(FakePlatform::legacy(vec![with_volume]).with(|s| {
        s.config.mounts = vec![Mount {
            source: "data".into(),
            destination: "/data".into(),
            processes: vec![],
        }];
        s.volumes = vec![volume("vol-1", "data", "aaaaaaaa-1")];
    }));

    let plan = plan(&platform, opts()).await;
    assert!(plan.requires_downtime());
    let reporter = RecordingReporter::default();
    let report = execute(
        &platform,
        &plan,
        &ScriptedPrompter::non_interactive(),
        &reporter,
        CancellationToken::new(),
    )
    .await
    .expect("migration succeeds");

    let s = platform.snapshot();
    let scaled = s.first_call("set_group_counts").expect("legacy scaled down");
    let launched = s.first_call("launch").expect("machines launched");
    assert!(scaled < launched, "volume migration launched before scaling down");

    let fork = s
        .volumes
        .iter()
        .find(|v| v.machines_only)
        .expect("forked volume");
    let machine = s.live_machines()[0].clone();
    assert_eq!(machine.config.mounts.len(), 1);
    assert_eq!(machine.config.mounts[0].volume, fork.id);
    assert_eq!(machine.config.mounts[0].path, "/data");
    assert_eq!(
        report.replaced_volumes.get("data"),
        Some(&vec!["vol-1".to_string()])
    );
}

#[tokio::test(start_paused = true)]
async fn test_adopted_autoscale_creates_standby_machines() {
    let platform = Arc::new(
        FakePlatform::legacy(vec![alloc("aaaaaaaa-1", "app", "ord")]).with(|s| {
            s.autoscale = Some(AutoscaleConfig {
                enabled: true,
                min_count: 1,
                max_count: 3,
                balance_regions: false,
            });
        }),
    );

    let plan = plan(
        &platform,
        MigrateOptions {
            adopt_autoscale: true,
            ..opts()
        },
    )
    .await;
    assert_eq!(plan.summary.machines.get("app"), Some(&1));
    assert_eq!(plan.summary.standby.get("app"), Some(&2));

    let reporter = RecordingReporter::default();
    execute(
        &platform,
        &plan,
        &ScriptedPrompter::non_interactive(),
        &reporter,
        CancellationToken::new(),
    )
    .await
    .expect("migration succeeds");

    let s = platform.snapshot();
    assert_eq!(s.live_machines().len(), 3);
    let stopped = s.live_machines().iter().filter(|m| m.state == "stopped").count();
    assert_eq!(stopped, 2);
    assert_eq!(s.autoscale.as_ref().map(|a| a.enabled), Some(false));
}

fn database_app() -> Arc<FakePlatform> {
    let allocs = (1..=2)
        .map(|i| {
            let mut a = alloc(&format!("db{i}aaaaa-{i}"), "app", "ord");
            a.private_ip = Some(format!("10.0.0.{i}"));
            a.attached_volumes = vec![format!("pg-{i}")];
            a
        })
        .collect();
    Arc::new(FakePlatform::legacy(allocs).with(|s| {
        s.app.database = true;
        s.coordination_url = Some("consul://coord.internal/web".into());
        s.db_leader = Some("10.0.0.1".into());
        s.volumes = vec![
            volume("pg-1", "pg_data", "db1aaaaa-1"),
            volume("pg-2", "pg_data", "db2aaaaa-2"),
        ];
    }))
}

#[tokio::test(start_paused = true)]
async fn test_database_migration_hands_leadership_to_machines() {
    let platform = database_app();

    let plan = plan(&platform, opts()).await;
    assert!(!plan.requires_downtime());
    assert!(plan.config_path.is_none());
    let reporter = RecordingReporter::default();
    let report = execute(
        &platform,
        &plan,
        &ScriptedPrompter::non_interactive(),
        &reporter,
        CancellationToken::new(),
    )
    .await
    .expect("database migration succeeds");

    let s = platform.snapshot();
    assert_eq!(s.app.platform_version, PlatformVersion::Target);
    assert!(s.called("enable_readonly"));
    assert!(!s.db_readonly, "new leader left read-only");
    let leader = s.db_leader.clone().expect("a leader");
    assert!(leader.starts_with("fdaa::"), "leader {leader} is not a machine");
    assert!(s.secrets.contains_key(COORDINATION_SECRET));
    let created: Vec<&str> = s
        .volumes
        .iter()
        .filter(|v| v.machines_only)
        .map(|v| v.name.as_str())
        .collect();
    assert_eq!(created, vec!["pg_data_machines", "pg_data_machines"]);
    assert!(report.log.entries().contains(&Milestone::DatabaseWritable));
}

// ── Preconditions ─────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_unknown_process_group_fails_before_any_mutation() {
    let platform = Arc::new(FakePlatform::legacy(vec![alloc("cccccccc-3", "worker", "ord")]));
    let writer = MemoryWriter::default();

    let err = migrator::prepare(
        platform.as_ref(),
        platform.as_ref(),
        platform.as_ref(),
        &writer,
        opts(),
    )
    .await
    .expect_err("unknown group must be rejected");

    assert_eq!(failed_step(&err), Some(Step::Validate));
    let validation = err
        .chain()
        .find_map(|e| e.downcast_ref::<ValidationError>())
        .expect("validation error in chain");
    assert!(matches!(
        validation,
        ValidationError::UnknownProcessGroup { group, .. } if group == "worker"
    ));
    let s = platform.snapshot();
    for mutating in ["lock_app", "set_platform_version", "set_group_counts", "launch"] {
        assert!(!s.called(mutating), "{mutating} called during validation");
    }
}

#[tokio::test(start_paused = true)]
async fn test_attached_volume_without_mount_is_refused() {
    let mut with_volume = alloc("aaaaaaaa-1", "app", "ord");
    with_volume.attached_volumes = vec!["vol-1".into()];
    let platform = Arc::new(FakePlatform::legacy(vec![with_volume]).with(|s| {
        s.config.mounts = vec![];
        s.volumes = vec![volume("vol-1", "data", "aaaaaaaa-1")];
    }));
    let writer = MemoryWriter::default();

    let err = migrator::prepare(
        platform.as_ref(),
        platform.as_ref(),
        platform.as_ref(),
        &writer,
        opts(),
    )
    .await
    .expect_err("unmounted volume must be rejected");

    assert_eq!(failed_step(&err), Some(Step::Validate));
    assert!(err.chain().any(|e| matches!(
        e.downcast_ref::<ValidationError>(),
        Some(ValidationError::MissingMountPath { unit, .. }) if unit == "aaaaaaaa-1"
    )));
    let s = platform.snapshot();
    for mutating in ["lock_app", "set_group_counts", "launch", "fork_volume"] {
        assert!(!s.called(mutating), "{mutating} called during validation");
    }
}

#[tokio::test(start_paused = true)]
async fn test_invalid_deployed_config_points_at_local_config() {
    let platform = two_unit_app();
    platform.state().config.app_name = String::new();
    let writer = MemoryWriter::default();

    let err = migrator::prepare(
        platform.as_ref(),
        platform.as_ref(),
        platform.as_ref(),
        &writer,
        opts(),
    )
    .await
    .expect_err("invalid deployed config");

    assert!(format!("{err:#}").contains("--use-local-config"));
    assert!(err.chain().any(|e| matches!(
        e.downcast_ref::<ValidationError>(),
        Some(ValidationError::InvalidConfig { .. })
    )));
}

#[tokio::test(start_paused = true)]
async fn test_local_config_replaces_the_deployed_one() {
    let platform = two_unit_app();
    platform.state().config.app_name = String::new();
    let path = PathBuf::from("hangar.yaml");
    let mut local = app_config();
    local.primary_region = "ord".into();
    let writer = MemoryWriter {
        files: [(path.clone(), local)].into(),
        ..MemoryWriter::default()
    };

    let plan = migrator::prepare(
        platform.as_ref(),
        platform.as_ref(),
        platform.as_ref(),
        &writer,
        MigrateOptions {
            local_config: Some(path),
            ..opts()
        },
    )
    .await
    .expect("local config is valid");

    assert_eq!(plan.config.app_name, APP);
    assert!(!platform.snapshot().called("get_app_config"));
}

#[tokio::test(start_paused = true)]
async fn test_local_config_for_another_app_is_refused() {
    let platform = two_unit_app();
    let path = PathBuf::from("hangar.yaml");
    let mut local = app_config();
    local.app_name = "someone-elses-app".into();
    let writer = MemoryWriter {
        files: [(path.clone(), local)].into(),
        ..MemoryWriter::default()
    };

    let err = migrator::prepare(
        platform.as_ref(),
        platform.as_ref(),
        platform.as_ref(),
        &writer,
        MigrateOptions {
            local_config: Some(path),
            ..opts()
        },
    )
    .await
    .expect_err("wrong app");

    assert!(err.chain().any(|e| matches!(
        e.downcast_ref::<ValidationError>(),
        Some(ValidationError::LocalConfigMismatch { found, .. }) if found == "someone-elses-app"
    )));
}

#[tokio::test(start_paused = true)]
async fn test_enabled_autoscale_is_refused_unless_adopted() {
    let platform = Arc::new(FakePlatform::legacy(vec![alloc("aaaaaaaa-1", "app", "ord")]).with(|s| {
        s.autoscale = Some(AutoscaleConfig {
            enabled: true,
            min_count: 1,
            max_count: 2,
            balance_regions: false,
        });
    }));
    let writer = MemoryWriter::default();

    let err = migrator::prepare(
        platform.as_ref(),
        platform.as_ref(),
        platform.as_ref(),
        &writer,
        opts(),
    )
    .await
    .expect_err("autoscaled app must be refused");
    assert!(format!("{err:#}").contains("--adopt-autoscale"));
}

#[tokio::test(start_paused = true)]
async fn test_already_migrated_app_is_refused() {
    let platform = Arc::new(
        FakePlatform::legacy(vec![]).with(|s| s.app.platform_version = PlatformVersion::Target),
    );
    let writer = MemoryWriter::default();

    let err = migrator::prepare(
        platform.as_ref(),
        platform.as_ref(),
        platform.as_ref(),
        &writer,
        opts(),
    )
    .await
    .expect_err("target app must be refused");
    assert!(err
        .chain()
        .any(|e| matches!(e.downcast_ref::<ValidationError>(), Some(ValidationError::AlreadyMigrated { .. }))));
}

// ── Failures and recovery ─────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_lock_contention_stops_before_any_change() {
    let platform = two_unit_app();
    let plan = plan(&platform, opts()).await;
    let foreign = hangar_api_types::AppLock {
        lock_id: "someone-else".into(),
        expiration: chrono::Utc::now() + chrono::TimeDelta::minutes(30),
    };
    platform.state().lock = Some(foreign.clone());

    let reporter = RecordingReporter::default();
    let failure = execute(
        &platform,
        &plan,
        &ScriptedPrompter::interactive(&[], &[]),
        &reporter,
        CancellationToken::new(),
    )
    .await
    .expect_err("locked app must not migrate");

    assert!(is_already_locked(&failure.error));
    assert!(failure.log.is_empty());
    assert!(matches!(failure.recovery, Recovery::RolledBack));
    let s = platform.snapshot();
    assert_eq!(s.lock, Some(foreign));
    assert_eq!(s.app.platform_version, PlatformVersion::Legacy);
    assert_eq!(s.allocations.len(), 2);
    assert!(s.machines.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_lock_contention_leaves_another_runs_database_fence_alone() {
    let platform = database_app();
    platform.state().autoscale = Some(AutoscaleConfig {
        enabled: true,
        min_count: 2,
        max_count: 2,
        balance_regions: false,
    });
    let plan = plan(
        &platform,
        MigrateOptions {
            adopt_autoscale: true,
            ..opts()
        },
    )
    .await;
    {
        // Another migration already holds the lock and has fenced writes.
        let mut s = platform.state();
        s.lock = Some(hangar_api_types::AppLock {
            lock_id: "someone-else".into(),
            expiration: chrono::Utc::now() + chrono::TimeDelta::minutes(30),
        });
        s.db_readonly = true;
        s.calls.clear();
    }

    let reporter = RecordingReporter::default();
    let failure = execute(
        &platform,
        &plan,
        &ScriptedPrompter::non_interactive(),
        &reporter,
        CancellationToken::new(),
    )
    .await
    .expect_err("locked app must not migrate");

    assert!(is_already_locked(&failure.error));
    assert_eq!(failed_step(&failure.error), Some(Step::AcquireLock));
    assert!(failure.log.is_empty(), "log: {:?}", failure.log);
    let s = platform.snapshot();
    assert_eq!(s.calls.first().copied(), Some("lock_app"), "calls: {:?}", s.calls);
    for mutating in [
        "set_autoscale",
        "set_secrets",
        "enable_readonly",
        "disable_readonly",
        "restart_router",
    ] {
        assert!(!s.called(mutating), "{mutating} called without the lock");
    }
    assert!(s.db_readonly, "the other run's read-only fence was lifted");
    assert_eq!(s.autoscale.as_ref().map(|a| a.enabled), Some(true));
}

#[tokio::test(start_paused = true)]
async fn test_failed_machine_barrier_rolls_everything_back() {
    let platform = two_unit_app();
    let plan = plan(&platform, opts()).await;
    platform.state().fail.insert("wait_for_state");

    let reporter = RecordingReporter::default();
    let failure = execute(
        &platform,
        &plan,
        &ScriptedPrompter::non_interactive(),
        &reporter,
        CancellationToken::new(),
    )
    .await
    .expect_err("barrier timeout fails the migration");

    assert!(is_timeout(&failure.error));
    assert_eq!(failed_step(&failure.error), Some(Step::CreateUnits));
    assert!(matches!(failure.recovery, Recovery::RolledBack));
    let s = platform.snapshot();
    assert_eq!(s.app.platform_version, PlatformVersion::Legacy);
    assert!(s.live_machines().is_empty(), "created machine not destroyed");
    assert!(s.lock.is_none());
    assert_eq!(s.allocations.len(), 2);
    assert!(reporter.contains("successfully recovered"));
}

#[tokio::test(start_paused = true)]
async fn test_failing_health_checks_keep_legacy_units_running() {
    let platform = two_unit_app();
    let plan = plan(&platform, opts()).await;
    platform.state().checks_failing = true;

    let reporter = RecordingReporter::default();
    let failure = execute(
        &platform,
        &plan,
        &ScriptedPrompter::non_interactive(),
        &reporter,
        CancellationToken::new(),
    )
    .await
    .expect_err("unhealthy machines fail the migration");

    assert!(is_timeout(&failure.error));
    assert_eq!(failed_step(&failure.error), Some(Step::Redeploy));
    assert!(matches!(failure.recovery, Recovery::RolledBack));
    let s = platform.snapshot();
    assert!(s.called("check_statuses"));
    assert!(!s.called("set_group_counts"), "legacy scaled down before machines were healthy");
    assert_eq!(s.allocations.len(), 2);
    assert!(s.live_machines().is_empty());
    assert_eq!(s.app.platform_version, PlatformVersion::Legacy);
}

#[tokio::test(start_paused = true)]
async fn test_skipping_health_checks_scales_down_once_machines_start() {
    let platform = two_unit_app();
    let plan = plan(
        &platform,
        MigrateOptions {
            skip_health_checks: true,
            ..opts()
        },
    )
    .await;
    assert!(!plan.summary.health_checks);
    platform.state().checks_failing = true;

    let reporter = RecordingReporter::default();
    execute(
        &platform,
        &plan,
        &ScriptedPrompter::non_interactive(),
        &reporter,
        CancellationToken::new(),
    )
    .await
    .expect("migration succeeds without waiting on checks");

    let s = platform.snapshot();
    assert!(!s.called("check_statuses"));
    assert!(s.allocations.is_empty());
    assert_eq!(s.app.platform_version, PlatformVersion::Target);
}

#[tokio::test(start_paused = true)]
async fn test_rollback_deletes_forks_and_restores_counts() {
    let mut with_volume = alloc("aaaaaaaa-1", "app", "ord");
    with_volume.attached_volumes = vec!["vol-1".into()];
    let platform = Arc::new(FakePlatform::legacy(vec![with_volume]).with(|s| {
        s.config.mounts = vec![Mount {
            source: "data".into(),
            destination: "/data".into(),
            processes: vec![],
        }];
        s.volumes = vec![volume("vol-1", "data", "aaaaaaaa-1")];
    }));
    let plan = plan(&platform, opts()).await;
    platform.state().fail.insert("create_release");

    let reporter = RecordingReporter::default();
    let failure = execute(
        &platform,
        &plan,
        &ScriptedPrompter::non_interactive(),
        &reporter,
        CancellationToken::new(),
    )
    .await
    .expect_err("release failure fails the migration");

    assert_eq!(failed_step(&failure.error), Some(Step::CreateRelease));
    assert!(matches!(failure.recovery, Recovery::RolledBack));
    let s = platform.snapshot();
    assert_eq!(s.volumes.len(), 1, "fork not deleted");
    assert_eq!(s.volumes[0].id, "vol-1");
    assert_eq!(s.allocations.len(), 1, "legacy counts not restored");
    assert_eq!(s.app.platform_version, PlatformVersion::Legacy);
    assert!(s.lock.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_abort_during_scale_down_rolls_back_without_prompting() {
    let platform = two_unit_app();
    let plan = plan(&platform, opts()).await;
    platform.state().scale_down_stalls = true;

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(30)).await;
        interrupt.cancel();
    });

    let prompter = ScriptedPrompter::interactive(&[true], &[]);
    let reporter = RecordingReporter::default();
    let failure = execute(&platform, &plan, &prompter, &reporter, cancel)
        .await
        .expect_err("abort fails the migration");

    assert!(is_aborted(&failure.error));
    assert!(prompter.questions().is_empty(), "abort must not offer troubleshooting");
    assert!(matches!(failure.recovery, Recovery::RolledBack));
    let s = platform.snapshot();
    assert_eq!(s.app.platform_version, PlatformVersion::Legacy);
    assert!(s.live_machines().is_empty());
    assert!(s.leases.is_empty());
    assert!(reporter.contains("received abort signal"));
}

#[tokio::test(start_paused = true)]
async fn test_interactive_failure_can_be_left_for_troubleshooting() {
    let platform = two_unit_app();
    let plan = plan(&platform, opts()).await;
    platform.state().fail.insert("update");

    let prompter = ScriptedPrompter::interactive(&[true], &[]);
    let reporter = RecordingReporter::default();
    let failure = execute(
        &platform,
        &plan,
        &prompter,
        &reporter,
        CancellationToken::new(),
    )
    .await
    .expect_err("redeploy failure fails the migration");

    assert_eq!(failed_step(&failure.error), Some(Step::Redeploy));
    assert!(matches!(failure.recovery, Recovery::LeftForTroubleshooter));
    assert_eq!(prompter.questions().len(), 1);
    let s = platform.snapshot();
    assert_eq!(s.app.platform_version, PlatformVersion::Detached);
    assert_eq!(s.live_machines().len(), 2, "partial state must be kept");
    assert!(s.lock.is_none());
    assert!(s.leases.is_empty());
}

// ── Completion ────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_failed_config_save_does_not_fail_migration() {
    let platform = two_unit_app();
    let plan = plan(
        &platform,
        MigrateOptions {
            config_path: Some(PathBuf::from("hangar.yaml")),
            ..opts()
        },
    )
    .await;
    let reporter = RecordingReporter::default();

    let failing = MemoryWriter {
        fail: true,
        ..MemoryWriter::default()
    };
    assert!(!migrator::save_config(&plan, &failing, &reporter));
    assert!(reporter.contains("but the migration was successful"));

    let writer = MemoryWriter::default();
    assert!(migrator::save_config(&plan, &writer, &reporter));
    let written = writer.written.lock().expect("writer log");
    assert_eq!(written[0].0, PathBuf::from("hangar.yaml"));
    assert_eq!(written[0].1.primary_region, "ord");
}
