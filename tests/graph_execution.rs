use std::sync::{Arc, Mutex};

use kiln::errors::KilnError;
use kiln::graph::{DependencyNode, GraphRunner};
use kiln_test_utils::{init_tracing, with_timeout};

fn node(name: &str, deps: &[&str]) -> DependencyNode {
    DependencyNode::new(
        name,
        format!("pkgs/{name}"),
        "default",
        deps.iter().map(|s| s.to_string()).collect(),
    )
}

#[tokio::test]
async fn diamond_builds_dependencies_first() {
    init_tracing();
    with_timeout(async {
        let order: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let runner = GraphRunner::new(vec![
            node("app", &["lib_a", "lib_b"]),
            node("lib_a", &["core"]),
            node("lib_b", &["core"]),
            node("core", &[]),
        ]);

        let seen = Arc::clone(&order);
        runner
            .run(move |n| {
                let seen = Arc::clone(&seen);
                async move {
                    seen.lock().unwrap().push(n.name);
                    Ok(())
                }
            })
            .await
            .expect("graph run succeeds");

        let order = order.lock().unwrap();
        assert_eq!(order.len(), 4);
        assert_eq!(order[0], "core");
        assert_eq!(order[3], "app");
        let mid: Vec<&str> = order[1..3].iter().map(|s| s.as_str()).collect();
        assert!(mid.contains(&"lib_a") && mid.contains(&"lib_b"));
    })
    .await;
}

#[tokio::test]
async fn independent_nodes_all_run() {
    init_tracing();
    with_timeout(async {
        let order: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let runner = GraphRunner::new(vec![node("a", &[]), node("b", &[]), node("c", &[])]);

        let seen = Arc::clone(&order);
        runner
            .run(move |n| {
                let seen = Arc::clone(&seen);
                async move {
                    seen.lock().unwrap().push(n.name);
                    Ok(())
                }
            })
            .await
            .expect("graph run succeeds");

        let mut order = order.lock().unwrap().clone();
        order.sort();
        assert_eq!(order, vec!["a", "b", "c"]);
    })
    .await;
}

#[tokio::test]
async fn cycle_fails_with_the_full_path() {
    init_tracing();
    with_timeout(async {
        let started: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let runner = GraphRunner::new(vec![
            node("a", &["b"]),
            node("b", &["c"]),
            node("c", &["a"]),
        ]);

        let seen = Arc::clone(&started);
        let err = runner
            .run(move |n| {
                let seen = Arc::clone(&seen);
                async move {
                    seen.lock().unwrap().push(n.name);
                    Ok(())
                }
            })
            .await
            .expect_err("cyclic graph fails");

        match err {
            KilnError::DependencyCycle(msg) => assert_eq!(msg, "a -> b -> c -> a"),
            other => panic!("expected DependencyCycle, got {other:?}"),
        }
        assert!(started.lock().unwrap().is_empty(), "no node ever started");
    })
    .await;
}

#[tokio::test]
async fn failure_prevents_dependents_from_starting() {
    init_tracing();
    with_timeout(async {
        let started: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let runner = GraphRunner::new(vec![node("app", &["core"]), node("core", &[])]);

        let seen = Arc::clone(&started);
        let err = runner
            .run(move |n| {
                let seen = Arc::clone(&seen);
                async move {
                    seen.lock().unwrap().push(n.name.clone());
                    if n.name == "core" {
                        return Err(KilnError::ConfigError("core is broken".to_string()));
                    }
                    Ok(())
                }
            })
            .await
            .expect_err("failing node fails the graph");

        assert!(matches!(err, KilnError::ConfigError(_)));
        assert_eq!(*started.lock().unwrap(), vec!["core"]);
    })
    .await;
}
