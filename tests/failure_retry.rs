use std::path::PathBuf;
use std::sync::Arc;

use kiln::cache::{CacheOptions, CacheStores};
use kiln::event::InputEvent;
use kiln::run::{Runner, RunnerOptions};
use kiln_test_utils::builders::EntryFixture;
use kiln_test_utils::reporters::RecordingReporter;
use kiln_test_utils::transforms::CompileTransform;
use kiln_test_utils::{init_tracing, with_timeout};

fn make_runner(fixture: &EntryFixture, reporter: Arc<RecordingReporter>) -> Runner {
    let options = CacheOptions {
        root: fixture.root().join(".kiln"),
        ..CacheOptions::default()
    };
    Runner::new(
        Arc::new(CompileTransform::new("compile")),
        vec![fixture.root()],
        Arc::new(CacheStores::new(&options)),
        reporter,
        RunnerOptions::default(),
    )
}

fn updated_paths(reporter: &RecordingReporter) -> Vec<PathBuf> {
    reporter
        .inputs()
        .into_iter()
        .flat_map(|(_, events)| events)
        .filter_map(|e| match e {
            InputEvent::Updated { path, .. } => Some(path),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn lenient_run_records_failure_and_keeps_going() {
    init_tracing();
    with_timeout(async {
        let fixture = EntryFixture::new();
        fixture.write("bad.ts", "boom");
        fixture.write("good.ts", "let g");

        let reporter = Arc::new(RecordingReporter::new());
        make_runner(&fixture, Arc::clone(&reporter))
            .run_incremental()
            .await
            .expect("lenient run completes despite per-file failure");

        assert_eq!(fixture.read("dist/good.js"), "LET G");
        assert!(!fixture.exists("dist/bad.js"));

        let idle = reporter.idle_failures();
        assert_eq!(idle.len(), 1);
        assert_eq!(idle[0], vec![PathBuf::from("bad.ts")]);
    })
    .await;
}

#[tokio::test]
async fn failed_file_is_retried_without_a_filesystem_change() {
    init_tracing();
    with_timeout(async {
        let fixture = EntryFixture::new();
        fixture.write("bad.ts", "boom");
        fixture.write("good.ts", "let g");

        make_runner(&fixture, Arc::new(RecordingReporter::new()))
            .run_incremental()
            .await
            .expect("first lenient run completes");

        // Nothing touched on disk; the failure alone drives the retry.
        let reporter = Arc::new(RecordingReporter::new());
        make_runner(&fixture, Arc::clone(&reporter))
            .run_incremental()
            .await
            .expect("retry run completes");

        assert!(updated_paths(&reporter).contains(&PathBuf::from("bad.ts")));
        assert_eq!(reporter.built_count(), 0, "still failing, nothing built");
    })
    .await;
}

#[tokio::test]
async fn fixed_file_builds_and_clears_its_failure() {
    init_tracing();
    with_timeout(async {
        let fixture = EntryFixture::new();
        fixture.write("bad.ts", "boom");

        make_runner(&fixture, Arc::new(RecordingReporter::new()))
            .run_incremental()
            .await
            .expect("first lenient run completes");

        fixture.write("bad.ts", "let fixed");

        let reporter = Arc::new(RecordingReporter::new());
        make_runner(&fixture, Arc::clone(&reporter))
            .run_incremental()
            .await
            .expect("fix run completes");

        assert_eq!(fixture.read("dist/bad.js"), "LET FIXED");
        let idle = reporter.idle_failures();
        assert_eq!(idle.last(), Some(&Vec::new()), "no failures outstanding");

        // The failure record is gone: a further run retries nothing.
        let reporter = Arc::new(RecordingReporter::new());
        make_runner(&fixture, Arc::clone(&reporter))
            .run_incremental()
            .await
            .expect("quiescent run completes");
        assert!(!updated_paths(&reporter).contains(&PathBuf::from("bad.ts")));
        assert_eq!(reporter.built_count(), 0);
    })
    .await;
}

#[tokio::test]
async fn deleting_a_failing_file_clears_its_failure() {
    init_tracing();
    with_timeout(async {
        let fixture = EntryFixture::new();
        fixture.write("bad.ts", "boom");
        fixture.write("good.ts", "let g");

        make_runner(&fixture, Arc::new(RecordingReporter::new()))
            .run_incremental()
            .await
            .expect("first lenient run completes");

        fixture.remove("bad.ts");

        let reporter = Arc::new(RecordingReporter::new());
        make_runner(&fixture, Arc::clone(&reporter))
            .run_incremental()
            .await
            .expect("deletion run completes");

        // The next run does not keep retrying a file that no longer exists.
        let reporter = Arc::new(RecordingReporter::new());
        make_runner(&fixture, Arc::clone(&reporter))
            .run_incremental()
            .await
            .expect("quiescent run completes");
        assert!(!updated_paths(&reporter).contains(&PathBuf::from("bad.ts")));
    })
    .await;
}
