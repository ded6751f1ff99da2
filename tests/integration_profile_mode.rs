#![cfg(unix)]

use async_trait::async_trait;
use npb_harness::{
    Harness, HarnessConfig, HarnessError, ModuleAvailability, ModuleLoader, ProfilePlan,
    ProfilerJob, ProfilerOutcome, ProfilerTrigger, ReportTail,
};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

struct FakeModule(ModuleAvailability);

#[async_trait]
impl ModuleLoader for FakeModule {
    async fn load(&self, _module: &str) -> ModuleAvailability {
        self.0.clone()
    }
}

/// Write a stand-in profiler that records its arguments to `args.txt`.
fn fake_profiler(dir: &Path) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let script = dir.join("AMDuProfPcm");
    let record = dir.join("args.txt");
    std::fs::write(
        &script,
        format!("#!/bin/sh\necho \"$@\" > '{}'\n", record.display()),
    )
    .expect("write fake profiler");
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755))
        .expect("chmod fake profiler");
    script
}

fn config_in(dir: &Path) -> HarnessConfig {
    HarnessConfig {
        profiler_exe: fake_profiler(dir),
        output_dir: dir.join("out"),
        ..HarnessConfig::default()
    }
}

#[tokio::test]
async fn profiler_starts_after_estimate_with_truncated_duration() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = config_in(dir.path());
    let job = ProfilerJob::new(&config, "/bin/foo", 9.7);

    let started_at = Instant::now();
    let outcome = job
        .schedule(ProfilerTrigger::Estimated(Duration::from_secs_f64(2.0)), started_at)
        .await
        .expect("schedule");

    match outcome {
        ProfilerOutcome::Completed {
            launched_after,
            status,
        } => {
            assert!(launched_after >= Duration::from_secs(2), "{:?}", launched_after);
            assert!(status.success());
        }
        ProfilerOutcome::Skipped => panic!("profiler should have run"),
    }

    let args = std::fs::read_to_string(dir.path().join("args.txt")).expect("args recorded");
    let expected = format!("-m memory -a -d 9 -o {}", dir.path().join("out/foo.csv").display());
    assert_eq!(args.trim(), expected);
}

#[tokio::test]
async fn profile_run_reports_artifact() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = config_in(dir.path());
    let out_dir = config.output_dir.clone();

    let report = Harness::new(config)
        .profile(
            "echo ' Initialization time = 0'; sleep 0.3",
            ProfilePlan {
                init_duration: Some(0.1),
                run_duration: 1.5,
            },
            &FakeModule(ModuleAvailability::Available),
        )
        .await
        .expect("profile run");

    assert!(out_dir.is_dir());
    assert_eq!(report.tail, ReportTail::Artifact(out_dir.join("echo.csv")));
    assert!(report
        .to_string()
        .ends_with(&format!("Profiling complete; output: {}", out_dir.join("echo.csv").display())));

    let args = std::fs::read_to_string(dir.path().join("args.txt")).expect("args recorded");
    assert!(args.contains("-d 1 "), "{}", args);
}

#[tokio::test]
async fn marker_trigger_launches_on_live_split() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = config_in(dir.path());

    Harness::new(config)
        .profile(
            "sleep 0.2; echo ' Initialization time = 0.2'; sleep 0.2",
            ProfilePlan {
                init_duration: None,
                run_duration: 3.0,
            },
            &FakeModule(ModuleAvailability::Available),
        )
        .await
        .expect("profile run");

    assert!(dir.path().join("args.txt").exists());
}

#[tokio::test]
async fn marker_trigger_without_split_skips_profiler() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = config_in(dir.path());

    Harness::new(config)
        .profile(
            "echo no marker here",
            ProfilePlan {
                init_duration: None,
                run_duration: 3.0,
            },
            &FakeModule(ModuleAvailability::Available),
        )
        .await
        .expect("profile run");

    assert!(!dir.path().join("args.txt").exists());
}

#[tokio::test]
async fn module_failure_aborts_before_spawning() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = config_in(dir.path());
    let witness = dir.path().join("benchmark-ran");

    let err = Harness::new(config)
        .profile(
            &format!("touch '{}'", witness.display()),
            ProfilePlan {
                init_duration: Some(0.0),
                run_duration: 1.0,
            },
            &FakeModule(ModuleAvailability::Unavailable {
                reason: "modprobe exited with exit status: 1".to_string(),
            }),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, HarnessError::ModuleUnavailable { .. }));
    assert!(!witness.exists());
    assert!(!dir.path().join("args.txt").exists());
}
