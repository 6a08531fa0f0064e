use std::sync::Arc;
use std::time::Duration;

use kiln::cache::{CacheOptions, CacheStores};
use kiln::pipeline::BoxTransform;
use kiln::run::{Runner, RunnerOptions};
use kiln_test_utils::builders::EntryFixture;
use kiln_test_utils::reporters::RecordingReporter;
use kiln_test_utils::transforms::{BrokenTransform, CompileTransform};
use kiln_test_utils::{init_tracing, with_timeout};

fn make_runner(
    fixture: &EntryFixture,
    transform: BoxTransform,
    reporter: Arc<RecordingReporter>,
) -> Runner {
    let options = CacheOptions {
        root: fixture.root().join(".kiln"),
        ..CacheOptions::default()
    };
    Runner::new(
        transform,
        vec![fixture.root()],
        Arc::new(CacheStores::new(&options)),
        reporter,
        RunnerOptions::default(),
    )
}

/// Poll until `check` passes, failing the test if it never does.
async fn wait_for(check: impl Fn() -> bool) {
    with_timeout(async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
}

#[tokio::test]
async fn subscription_rebuilds_on_real_filesystem_events() {
    init_tracing();
    with_timeout(async {
        let fixture = EntryFixture::new();
        fixture.write("x.ts", "let x");

        let reporter = Arc::new(RecordingReporter::new());
        let runner = make_runner(
            &fixture,
            Arc::new(CompileTransform::new("compile")),
            Arc::clone(&reporter),
        );

        let subscription = runner.watch().await.expect("watch starts");
        assert_eq!(fixture.read("dist/x.js"), "LET X");

        // A real write must reach the runner through notify, not through the
        // batch the engine's own artifact writes would otherwise trigger.
        fixture.write("x.ts", "let x = 7");
        wait_for(|| fixture.read("dist/x.js") == "LET X = 7").await;

        subscription.unsubscribe().await.expect("unsubscribe succeeds");
    })
    .await;
}

#[tokio::test]
async fn unsubscribe_waits_for_the_in_flight_batch() {
    init_tracing();
    with_timeout(async {
        let fixture = EntryFixture::new();
        fixture.write("x.ts", "let x");

        let runner = make_runner(
            &fixture,
            Arc::new(CompileTransform::new("compile")),
            Arc::new(RecordingReporter::new()),
        );
        let subscription = runner.watch().await.expect("watch starts");

        // Enqueue a batch and immediately tear down; the commit must land
        // before unsubscribe resolves, with no polling afterwards.
        fixture.write("x.ts", "let x = 8");
        assert!(runner.inject_change(&fixture.path("x.ts")));
        subscription.unsubscribe().await.expect("unsubscribe succeeds");

        assert_eq!(fixture.read("dist/x.js"), "LET X = 8");
    })
    .await;
}

#[tokio::test]
async fn concurrent_watch_batches_end_with_an_idle_notification() {
    init_tracing();
    with_timeout(async {
        let fixture = EntryFixture::new();
        let names = ["a", "b", "c", "d", "e", "f", "g", "h"];
        for name in names {
            fixture.write(&format!("{name}.ts"), "let v");
        }

        let reporter = Arc::new(RecordingReporter::new());
        let runner = make_runner(
            &fixture,
            Arc::new(CompileTransform::new("compile")),
            Arc::clone(&reporter),
        );
        runner.build().await.expect("initial build succeeds");
        let idle_before = reporter.idle_count();

        for name in names {
            fixture.write(&format!("{name}.ts"), "let v = 2");
            assert!(runner.inject_change(&fixture.path(&format!("{name}.ts"))));
        }

        // Whichever batch drains the queue performs the sync and reports
        // idle; the notification must never be lost between finishers.
        wait_for(|| reporter.idle_count() > idle_before).await;
        for name in names {
            wait_for(|| fixture.read(&format!("dist/{name}.js")) == "LET V = 2").await;
        }
    })
    .await;
}

#[tokio::test]
async fn failed_watch_batch_still_syncs_and_reports_idle() {
    init_tracing();
    with_timeout(async {
        let fixture = EntryFixture::new();
        fixture.write("x.ts", "let x");

        let reporter = Arc::new(RecordingReporter::new());
        let runner = make_runner(
            &fixture,
            Arc::new(BrokenTransform::new("broken")),
            Arc::clone(&reporter),
        );

        // The batch itself errors; the drain must still reach idle so
        // sibling batches' deltas are not stranded in memory.
        assert!(runner.inject_change(&fixture.path("x.ts")));
        wait_for(|| reporter.idle_count() >= 1).await;
    })
    .await;
}
