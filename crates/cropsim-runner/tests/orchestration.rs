//! Integration tests for guarded execution, batches and sweeps.
//!
//! Small shell scripts stand in for the simulation program.

#![cfg(unix)]

use cropsim_core::CropsimError;
use chrono::Utc;
use cropsim_runner::{
    run_batch, run_sweep, ActiveList, Case, CaseRegistry, DriverConfig, InvocationMode,
    ListSnapshot, LockRecord, Orchestrator, PointStatus, RunConfig, RunnerError,
};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

const PREVIOUS_LIST: &str = "case-other/project.ACp\ncase-more/project.ACp\n";

/// Writes a CSV result whose biomass echoes the case's field_capacity, and
/// copies the active list as seen during the run into the case directory.
const ECHO_PARAM_SCRIPT: &str = r#"
fc=$(grep '^field_capacity=' params.txt | cut -d= -f2)
[ -z "$fc" ] && fc=0.32
cat "$LIST" > active_during_run.txt
echo "Day,Rain,ET,Biomass"
echo "1,2.0,1.5,$fc"
echo "2,0.5,2.5,$fc"
"#;

struct Fixture {
    _dir: tempfile::TempDir,
    root: PathBuf,
    registry: CaseRegistry,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        let config = DriverConfig::new(&root);
        let registry = CaseRegistry::from_config(&config);
        fs::create_dir_all(config.active_list.parent().unwrap()).unwrap();
        fs::write(&config.active_list, PREVIOUS_LIST).unwrap();
        Self {
            _dir: dir,
            root,
            registry,
        }
    }

    fn list(&self) -> &ActiveList {
        self.registry.active_list()
    }

    fn case(&self, name: &str) -> Case {
        self.registry
            .create_case(name, &[("crop_type", "Maize"), ("field_capacity", "0.32")])
            .unwrap()
    }

    /// Write an executable `/bin/sh` script; `$LIST` expands to the list path.
    fn script(&self, name: &str, body: &str) -> PathBuf {
        let path = self.root.join(name);
        let text = format!(
            "#!/bin/sh\nLIST='{}'\n{}",
            self.list().path().display(),
            body
        );
        fs::write(&path, text).unwrap();
        let mut perms = fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&path, perms).unwrap();
        path
    }

    fn orchestrator(&self, executable: &Path) -> Orchestrator {
        let config = DriverConfig::new(&self.root)
            .with_executable(executable)
            .run_config(InvocationMode::ActiveList)
            .unwrap();
        Orchestrator::new(self.list().clone(), config)
    }

    fn assert_list_restored(&self) {
        assert_eq!(
            self.list().read().unwrap().as_deref(),
            Some(PREVIOUS_LIST),
            "active list not restored"
        );
        assert!(!self.list().is_locked(), "lock file left behind");
    }
}

#[tokio::test]
async fn successful_run_holds_list_exclusively_then_restores_it() {
    let fx = Fixture::new();
    let case = fx.case("case-a");
    let exe = fx.script("sim.sh", ECHO_PARAM_SCRIPT);

    let result = fx.orchestrator(&exe).run_case(&case).await.unwrap();

    assert!(result.passed());
    assert_eq!(result.exit_code, Some(0));
    assert_eq!(
        fs::read_to_string(case.root.join("active_during_run.txt")).unwrap(),
        "case-a/project.ACp\n"
    );
    fx.assert_list_restored();

    let records = cropsim_core::ingest(&result.output_path).unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].biomass_kg_ha, Some(0.32));
    assert_eq!(result.output_sha256.as_deref().map(str::len), Some(64));
}

#[tokio::test]
async fn non_zero_exit_is_reported_and_list_restored() {
    let fx = Fixture::new();
    let case = fx.case("case-a");
    let exe = fx.script("fail.sh", "echo 'boom' >&2\nexit 3\n");

    let result = fx.orchestrator(&exe).run_case(&case).await.unwrap();

    assert!(!result.success);
    assert_eq!(result.exit_code, Some(3));
    assert!(fs::read_to_string(&result.log_path).unwrap().contains("boom"));
    fx.assert_list_restored();
}

#[tokio::test]
async fn launch_error_is_logged_and_list_restored() {
    let fx = Fixture::new();
    let case = fx.case("case-a");
    let exe = fx.root.join("not-executable");
    fs::write(&exe, "#!/bin/sh\nexit 0\n").unwrap();
    let mut perms = fs::metadata(&exe).unwrap().permissions();
    perms.set_mode(0o644);
    fs::set_permissions(&exe, perms).unwrap();

    let result = fx.orchestrator(&exe).run_case(&case).await.unwrap();

    assert!(!result.success);
    assert_eq!(result.exit_code, None);
    let log = fs::read_to_string(&result.log_path).unwrap();
    assert!(log.contains("Error during execution"), "log was: {log}");
    fx.assert_list_restored();
}

#[tokio::test]
async fn missing_executable_fails_before_touching_list() {
    let fx = Fixture::new();
    let case = fx.case("case-a");
    let orch = Orchestrator::new(fx.list().clone(), RunConfig::new(fx.root.join("absent")));

    let err = orch.run_case(&case).await.unwrap_err();

    assert!(matches!(err, RunnerError::ExecutableNotFound(_)));
    fx.assert_list_restored();
    assert!(!case.result_path().exists());
}

#[tokio::test]
async fn timeout_kills_the_run() {
    let fx = Fixture::new();
    let case = fx.case("case-a");
    let exe = fx.script("hang.sh", "sleep 10\n");
    let config = RunConfig::new(&exe).with_timeout(Duration::from_millis(300));
    let orch = Orchestrator::new(fx.list().clone(), config);

    let result = orch.run_case(&case).await.unwrap();

    assert!(!result.success);
    assert!(result.timed_out);
    assert_eq!(result.exit_code, None);
    assert!(fs::read_to_string(&result.log_path)
        .unwrap()
        .contains("timed out"));
    fx.assert_list_restored();
}

#[tokio::test]
async fn parameter_file_mode_passes_the_file() {
    let fx = Fixture::new();
    let case = fx.case("case-a");
    let exe = fx.script(
        "param.sh",
        "[ -f \"$1\" ] || exit 9\nn=$(grep -c '=' \"$1\")\necho 'Day Rain'\necho \"1 $n\"\n",
    );
    let config = RunConfig::new(&exe).with_mode(InvocationMode::ParameterFile);
    let orch = Orchestrator::new(fx.list().clone(), config);

    let result = orch.run_case(&case).await.unwrap();

    assert!(result.passed(), "exit code {:?}", result.exit_code);
    let records = cropsim_core::ingest(&result.output_path).unwrap();
    // crop_type, field_capacity, created
    assert_eq!(records[0].rainfall_mm, Some(3.0));
    fx.assert_list_restored();
}

#[tokio::test]
async fn batch_continues_past_a_failed_case() {
    let fx = Fixture::new();
    let cases = vec![fx.case("case-a"), fx.case("case-bad"), fx.case("case-c")];
    let exe = fx.script(
        "batch.sh",
        &format!(
            "[ \"$(basename \"$(pwd -P)\")\" = case-bad ] && exit 3\n{}",
            ECHO_PARAM_SCRIPT
        ),
    );

    let report = run_batch(&fx.orchestrator(&exe), &cases).await;

    assert_eq!(report.total(), 3);
    assert_eq!(report.failed(), 1);
    let names: Vec<&str> = report.entries.iter().map(|e| e.case.as_str()).collect();
    assert_eq!(names, vec!["case-a", "case-bad", "case-c"]);
    assert!(!report.entries[1].success);
    assert!(report.entries[1].error.is_some());
    assert_eq!(
        report.entries[2].summary.as_ref().map(|s| s.total_rainfall),
        Some(2.5)
    );
    assert!(report.render().contains("[FAILED] case-bad (exit 3)"));
    fx.assert_list_restored();
}

#[tokio::test]
async fn sweep_runs_values_in_order_and_restores_parameter() {
    let fx = Fixture::new();
    let mut case = fx.case("case-a");
    let exe = fx.script("sim.sh", ECHO_PARAM_SCRIPT);
    let prefix = fx.root.join("exports/fc");

    let points = run_sweep(
        &fx.orchestrator(&exe),
        &mut case,
        "field_capacity",
        &[0.30, 0.32, 0.34],
        Some(prefix.as_path()),
    )
    .await
    .unwrap();

    assert_eq!(points.len(), 3);
    let seen: Vec<f64> = points.iter().map(|p| p.summary.max_biomass).collect();
    assert_eq!(seen, vec![0.3, 0.32, 0.34]);
    for (i, point) in points.iter().enumerate() {
        assert_eq!(point.index, i);
        assert_eq!(point.status, PointStatus::Ok);
        assert!(point.run.passed());
        for path in &point.exports {
            assert!(path.is_file(), "{} missing", path.display());
        }
    }
    assert!(fx.root.join("exports/fc_2.csv").is_file());
    assert!(fx.root.join("exports/fc_2.json").is_file());

    assert_eq!(case.raw_parameter("field_capacity"), Some("0.32"));
    let reopened = Case::open(&case.root).unwrap();
    assert_eq!(reopened.raw_parameter("field_capacity"), Some("0.32"));
    fx.assert_list_restored();
}

#[tokio::test]
async fn sweep_rejects_unknown_parameter_before_running() {
    let fx = Fixture::new();
    let mut case = fx.case("case-a");
    let exe = fx.script("sim.sh", ECHO_PARAM_SCRIPT);

    for name in ["leaf_colour", "initial_swc"] {
        let err = run_sweep(&fx.orchestrator(&exe), &mut case, name, &[1.0], None)
            .await
            .unwrap_err();
        assert!(err.completed.is_empty());
        assert!(matches!(
            err.source,
            RunnerError::Core(CropsimError::UnknownParameter(_))
        ));
    }
    assert!(!case.result_path().exists());
}

#[tokio::test]
async fn sweep_records_failed_point_and_continues() {
    let fx = Fixture::new();
    let mut case = fx.case("case-a");
    let exe = fx.script(
        "flaky.sh",
        &format!(
            "grep -q '^field_capacity=0.5$' params.txt && exit 1\n{}",
            ECHO_PARAM_SCRIPT
        ),
    );

    let points = run_sweep(
        &fx.orchestrator(&exe),
        &mut case,
        "field_capacity",
        &[0.4, 0.5, 0.6],
        None,
    )
    .await
    .unwrap();

    let statuses: Vec<PointStatus> = points.iter().map(|p| p.status).collect();
    assert_eq!(
        statuses,
        vec![PointStatus::Ok, PointStatus::RunFailed, PointStatus::Ok]
    );
    assert_eq!(points[1].summary.simulation_days, 0);
    assert_eq!(case.raw_parameter("field_capacity"), Some("0.32"));
}

#[tokio::test]
async fn sweep_error_keeps_completed_points_and_restores() {
    let fx = Fixture::new();
    let mut case = fx.case("case-a");
    // On the third value the result artifact is replaced by a directory,
    // which ingestion cannot read.
    let exe = fx.script(
        "broken.sh",
        &format!(
            "if grep -q '^field_capacity=0.34$' params.txt; then rm -f output/result.txt; mkdir output/result.txt; exit 0; fi\n{}",
            ECHO_PARAM_SCRIPT
        ),
    );

    let err = run_sweep(
        &fx.orchestrator(&exe),
        &mut case,
        "field_capacity",
        &[0.30, 0.32, 0.34],
        None,
    )
    .await
    .unwrap_err();

    assert_eq!(err.completed.len(), 2);
    assert_eq!(err.completed[1].value, 0.32);
    assert_eq!(case.raw_parameter("field_capacity"), Some("0.32"));
    assert_eq!(
        Case::open(&case.root).unwrap().raw_parameter("field_capacity"),
        Some("0.32")
    );
    fx.assert_list_restored();
}

#[tokio::test]
async fn simulated_batch_needs_no_executable() {
    let fx = Fixture::new();
    let cases = vec![fx.case("case-a"), fx.case("case-b")];
    let orch = Orchestrator::new(fx.list().clone(), RunConfig::simulated(12));

    let report = run_batch(&orch, &cases).await;

    assert!(report.all_succeeded());
    let summary = report.entries[0].summary.as_ref().unwrap();
    assert_eq!(summary.simulation_days, 12);
    fx.assert_list_restored();
}

#[tokio::test]
async fn sweep_tolerates_output_that_is_not_utf8() {
    let fx = Fixture::new();
    let mut case = fx.case("case-a");
    let exe = fx.script(
        "latin1.sh",
        "printf 'Day,Rain,Note\\n1,2.0,ok\\n2,3.0,caf\\351\\n'\n",
    );

    let points = run_sweep(
        &fx.orchestrator(&exe),
        &mut case,
        "field_capacity",
        &[0.30, 0.34],
        None,
    )
    .await
    .unwrap();

    assert_eq!(points.len(), 2);
    for point in &points {
        assert_eq!(point.status, PointStatus::Ok);
        assert_eq!(point.summary.simulation_days, 2);
        assert_eq!(point.summary.total_rainfall, 5.0);
    }
    assert_eq!(case.raw_parameter("field_capacity"), Some("0.32"));
    fx.assert_list_restored();
}

#[tokio::test]
async fn configured_working_dir_is_used_for_the_run() {
    let fx = Fixture::new();
    let case = fx.case("case-a");
    let seen = fx.root.join("seen_pwd.txt");
    let exe = fx.script(
        "rooted.sh",
        &format!(
            "pwd -P > '{}'\ncat LIST/ListProjects.txt > seen_list.txt || exit 7\necho 'Day Rain'\necho '1 1.0'\n",
            seen.display()
        ),
    );
    let config = DriverConfig::new(&fx.root)
        .with_executable(&exe)
        .with_working_dir(&fx.root)
        .run_config(InvocationMode::ActiveList)
        .unwrap();
    let orch = Orchestrator::new(fx.list().clone(), config);

    let result = orch.run_case(&case).await.unwrap();

    assert!(result.passed(), "exit code {:?}", result.exit_code);
    assert_eq!(
        fs::read_to_string(&seen).unwrap().trim_end(),
        fs::canonicalize(&fx.root).unwrap().to_str().unwrap()
    );
    assert_eq!(
        fs::read_to_string(fx.root.join("seen_list.txt")).unwrap(),
        "case-a/project.ACp\n"
    );
    assert_eq!(result.output_path, case.result_path());
    fx.assert_list_restored();
}

#[tokio::test]
async fn lock_left_by_a_killed_driver_is_recovered() {
    let fx = Fixture::new();
    let case = fx.case("case-a");
    fx.registry.write_project_descriptor(&case, 1, 2024).unwrap();
    // What a driver killed mid-run leaves behind.
    fs::write(fx.list().path(), "case-a/project.ACp\n").unwrap();
    let record = LockRecord {
        pid: 4_194_304,
        acquired_at: Utc::now(),
        snapshot: ListSnapshot::Content(PREVIOUS_LIST.to_string()),
    };
    fs::write(fx.list().lock_path(), serde_json::to_string(&record).unwrap()).unwrap();

    let exe = fx.script("sim.sh", ECHO_PARAM_SCRIPT);
    let result = fx.orchestrator(&exe).run_case(&case).await.unwrap();

    assert!(result.passed());
    fx.assert_list_restored();
    fx.registry.register(&case).unwrap();
    assert_eq!(fx.list().entries().unwrap().len(), 3);
}

#[tokio::test]
async fn cancelled_run_restores_list() {
    let fx = Fixture::new();
    let case = fx.case("case-a");
    let exe = fx.script("hang.sh", "sleep 10\n");
    let orch = fx.orchestrator(&exe);

    let outcome = tokio::time::timeout(Duration::from_millis(300), orch.run_case(&case)).await;

    assert!(outcome.is_err(), "run should still have been going");
    fx.assert_list_restored();
}
