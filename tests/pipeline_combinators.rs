use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use kiln::asset::Asset;
use kiln::event::InputEvent;
use kiln::pipeline::{dispatch, parallel, series, BoxTransform};
use kiln_test_utils::transforms::{EmitTransform, TapTransform};
use kiln_test_utils::{init_tracing, with_timeout};

type Calls = Arc<Mutex<Vec<(String, Vec<InputEvent>)>>>;

fn batch() -> Arc<[InputEvent]> {
    vec![InputEvent::Initial {
        entry: PathBuf::from("pkgs/app"),
    }]
    .into()
}

/// Run a composed transform over a batch and collect everything it emits.
async fn collect(transform: BoxTransform, events: Arc<[InputEvent]>) -> Vec<Asset> {
    let (tx, mut rx) = mpsc::channel::<Asset>(64);
    let collector = tokio::spawn(async move {
        let mut assets = Vec::new();
        while let Some(asset) = rx.recv().await {
            assets.push(asset);
        }
        assets
    });

    transform.run(events, tx).await.expect("pipeline run succeeds");
    collector.await.expect("collector task completes")
}

fn dist_paths(assets: &[Asset]) -> Vec<PathBuf> {
    assets
        .iter()
        .filter_map(|a| a.dist_path().map(|p| p.to_path_buf()))
        .collect()
}

#[tokio::test]
async fn series_runs_stages_in_order_over_the_same_batch() {
    init_tracing();
    with_timeout(async {
        let calls: Calls = Arc::new(Mutex::new(Vec::new()));
        let pipeline = series(vec![
            Arc::new(TapTransform::new("first", Arc::clone(&calls))),
            Arc::new(TapTransform::new("second", Arc::clone(&calls))),
        ]);

        let events = batch();
        collect(pipeline, events.clone()).await;

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].0, "first");
        assert_eq!(calls[1].0, "second");
        // Both stages saw the full batch.
        assert_eq!(calls[0].1, events.to_vec());
        assert_eq!(calls[1].1, events.to_vec());
    })
    .await;
}

#[tokio::test]
async fn series_emits_each_stage_completely_before_the_next() {
    init_tracing();
    with_timeout(async {
        let pipeline = series(vec![
            Arc::new(EmitTransform::new(
                "one",
                vec![("dist/a.txt", "a"), ("dist/b.txt", "b")],
            )),
            Arc::new(EmitTransform::new("two", vec![("dist/c.txt", "c")])),
        ]);

        let assets = collect(pipeline, batch()).await;
        let entry = PathBuf::from("pkgs/app");
        assert_eq!(
            dist_paths(&assets),
            vec![
                entry.join("dist/a.txt"),
                entry.join("dist/b.txt"),
                entry.join("dist/c.txt"),
            ]
        );
    })
    .await;
}

#[tokio::test]
async fn parallel_multicasts_the_batch_to_every_stage() {
    init_tracing();
    with_timeout(async {
        let calls: Calls = Arc::new(Mutex::new(Vec::new()));
        let pipeline = parallel(vec![
            Arc::new(TapTransform::new("left", Arc::clone(&calls))),
            Arc::new(TapTransform::new("right", Arc::clone(&calls))),
        ]);

        let events = batch();
        collect(pipeline, events.clone()).await;

        let calls = calls.lock().unwrap();
        // Order is unspecified; both stages ran with the full batch.
        let names: HashSet<&str> = calls.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, HashSet::from(["left", "right"]));
        for (_, seen) in calls.iter() {
            assert_eq!(seen, &events.to_vec());
        }
    })
    .await;
}

#[tokio::test]
async fn parallel_emits_every_stage_output() {
    init_tracing();
    with_timeout(async {
        let pipeline = parallel(vec![
            Arc::new(EmitTransform::new("one", vec![("dist/a.txt", "a")])),
            Arc::new(EmitTransform::new("two", vec![("dist/b.txt", "b")])),
        ]);

        let assets = collect(pipeline, batch()).await;
        let entry = PathBuf::from("pkgs/app");
        let paths: HashSet<PathBuf> = dist_paths(&assets).into_iter().collect();
        assert_eq!(
            paths,
            HashSet::from([entry.join("dist/a.txt"), entry.join("dist/b.txt")])
        );
    })
    .await;
}

#[tokio::test]
async fn dispatch_keeps_one_asset_per_dist_path() {
    init_tracing();
    with_timeout(async {
        // Both stages claim dist/a.txt; only one claim survives.
        let pipeline = dispatch(vec![
            Arc::new(EmitTransform::new(
                "one",
                vec![("dist/a.txt", "from one"), ("dist/b.txt", "b")],
            )),
            Arc::new(EmitTransform::new(
                "two",
                vec![("dist/a.txt", "from two"), ("dist/c.txt", "c")],
            )),
        ]);

        let assets = collect(pipeline, batch()).await;
        let entry = PathBuf::from("pkgs/app");

        let paths = dist_paths(&assets);
        let unique: HashSet<&PathBuf> = paths.iter().collect();
        assert_eq!(paths.len(), unique.len(), "no duplicate dist paths");

        let contested = entry.join("dist/a.txt");
        assert_eq!(paths.iter().filter(|p| **p == contested).count(), 1);
        assert!(unique.contains(&entry.join("dist/b.txt")));
        assert!(unique.contains(&entry.join("dist/c.txt")));
    })
    .await;
}

#[tokio::test]
async fn combinator_names_describe_their_stages() {
    init_tracing();
    let calls: Calls = Arc::new(Mutex::new(Vec::new()));
    let pipeline = series(vec![
        Arc::new(TapTransform::new("a", Arc::clone(&calls))),
        Arc::new(TapTransform::new("b", Arc::clone(&calls))),
    ]);
    assert_eq!(pipeline.name(), "series(a, b)");

    let nested = dispatch(vec![
        pipeline,
        Arc::new(TapTransform::new("c", calls)),
    ]);
    assert_eq!(nested.name(), "dispatch(series(a, b), c)");
}

mod property {
    use super::*;
    use proptest::collection::vec;
    use proptest::prelude::*;

    fn stage_outputs() -> impl Strategy<Value = Vec<Vec<String>>> {
        // Up to 4 stages, each emitting up to 6 outputs from a tiny path
        // alphabet, so collisions across stages are common.
        vec(vec("dist/[a-e]\\.txt", 0..6), 1..5)
    }

    proptest! {
        #[test]
        fn dispatch_never_emits_duplicate_dist_paths(stages in stage_outputs()) {
            let rt = tokio::runtime::Runtime::new().expect("runtime");
            rt.block_on(async {
                let expected: HashSet<String> =
                    stages.iter().flatten().cloned().collect();

                let stages: Vec<BoxTransform> = stages
                    .iter()
                    .enumerate()
                    .map(|(i, outputs)| {
                        let outputs: Vec<(&str, &str)> =
                            outputs.iter().map(|p| (p.as_str(), "x")).collect();
                        Arc::new(EmitTransform::new(&format!("s{i}"), outputs))
                            as BoxTransform
                    })
                    .collect();

                let assets = collect(dispatch(stages), batch()).await;
                let entry = PathBuf::from("pkgs/app");

                let paths = dist_paths(&assets);
                let unique: HashSet<&PathBuf> = paths.iter().collect();
                prop_assert_eq!(paths.len(), unique.len());

                // Every claimed path shows up exactly once, none invented.
                let got: HashSet<String> = paths
                    .iter()
                    .filter_map(|p| p.strip_prefix(&entry).ok())
                    .map(|p| p.display().to_string())
                    .collect();
                prop_assert_eq!(got, expected);
                Ok(())
            })?;
        }
    }
}
