use llmperf_build::{adapter_for, run_tests, CommandTemplate, ProjectProfile};
use llmperf_core::{BuildTool, Project};
use tempfile::tempdir;

fn script_profile() -> ProjectProfile {
    let mut p = ProjectProfile::builtin(Project::Kafka);
    p.build_tool = BuildTool::Script;
    p.compile = Some(CommandTemplate::new(["sh", "-c", "test -f {module}/Foo.java"]));
    p.test = Some(CommandTemplate::new(["sh", "-c", "grep -q PASS {module}/{test}.result"]));
    p
}

#[test]
fn compile_reports_exit_status() {
    let dir = tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("modA")).unwrap();
    let adapter = adapter_for(&script_profile()).unwrap();

    assert!(!adapter.compile(dir.path(), "modA").unwrap().passed);
    std::fs::write(dir.path().join("modA/Foo.java"), "class Foo {}").unwrap();
    assert!(adapter.compile(dir.path(), "modA").unwrap().passed);
}

#[test]
fn every_selected_test_runs_even_after_a_failure() {
    let dir = tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("modA")).unwrap();
    std::fs::write(dir.path().join("modA/ATest.result"), "FAIL").unwrap();
    std::fs::write(dir.path().join("modA/BTest.result"), "PASS").unwrap();
    let adapter = adapter_for(&script_profile()).unwrap();

    let ids = vec!["modA/src/test/ATest.java".to_string(), "modA/src/test/BTest.java".to_string()];
    let report = run_tests(adapter.as_ref(), dir.path(), &ids).unwrap();
    assert_eq!(report.outcomes.len(), 2);
    assert!(!report.outcomes[0].passed);
    assert!(report.outcomes[1].passed);
    assert!(!report.passed());
    assert_eq!(report.failed().count(), 1);
}

#[test]
fn zero_exit_with_reported_failures_is_a_failure() {
    let dir = tempdir().unwrap();
    let mut p = script_profile();
    p.test = Some(CommandTemplate::new(["sh", "-c", "echo 'Tests run: 3, Failures: 1, Errors: 0, Skipped: 0'"]));
    let adapter = adapter_for(&p).unwrap();
    let report = run_tests(adapter.as_ref(), dir.path(), &["modA/FooTest.java".to_string()]).unwrap();
    assert!(!report.passed());
    assert_eq!(report.outcomes[0].counts.unwrap().failures, 1);
}

#[test]
fn selected_test_that_runs_nothing_fails() {
    let dir = tempdir().unwrap();
    let mut p = script_profile();
    p.test = Some(CommandTemplate::new(["sh", "-c", "echo 'Tests run: 0, Failures: 0, Errors: 0, Skipped: 0'"]));
    let adapter = adapter_for(&p).unwrap();
    let report = run_tests(adapter.as_ref(), dir.path(), &["modA/RenamedTest.java".to_string()]).unwrap();
    assert!(report.outcomes[0].exec.passed);
    assert_eq!(report.outcomes[0].counts.unwrap().run, 0);
    assert!(!report.passed());
}

#[test]
fn no_tests_is_vacuous_success() {
    let dir = tempdir().unwrap();
    let adapter = adapter_for(&script_profile()).unwrap();
    let report = run_tests(adapter.as_ref(), dir.path(), &[]).unwrap();
    assert!(report.passed());
    assert!(report.outcomes.is_empty());
}
