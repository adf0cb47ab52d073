use std::io::Write;

use llmperf_core::Project;
use llmperf_tasks::TaskRegistry;
use tempfile::NamedTempFile;

#[test]
fn loads_tab_separated_table_from_disk() {
    let mut f = NamedTempFile::new().unwrap();
    writeln!(f, "repository\tid\tcommit_hash\tsource_code\tjmh_case\tunittest\tcommit_url").unwrap();
    writeln!(
        f,
        "RoaringBitmap\tRB-3\t0a1b2c\tRoaringBitmap/src/main/java/org/roaringbitmap/Util.java\tUtilBenchmark\t\t"
    )
    .unwrap();
    let reg = TaskRegistry::load(f.path()).unwrap();
    assert_eq!(reg.tasks().len(), 1);
    assert_eq!(reg.tasks()[0].project, Project::RoaringBitmap);
    assert_eq!(reg.tasks()[0].build_module(), "RoaringBitmap");
}

#[test]
fn missing_file_is_malformed_input() {
    let err = TaskRegistry::load(std::path::Path::new("/nonexistent/tasks.csv")).unwrap_err();
    assert!(err.is_fatal_for_run());
}
