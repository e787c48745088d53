//! Scheduler loop smoke test: immediate first evaluation, async firing,
//! graceful stop

use pipewright::core::project::{Project, ProjectsConfig};
use pipewright::events::EventBroker;
use pipewright::persistence::{RunStatus, RunStore, SqliteStore};
use pipewright::scheduler::Scheduler;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_watch_loop_fires_on_startup_and_stops_cleanly() {
    let tmp = tempfile::tempdir().unwrap();
    let project_dir = tmp.path().join("demo");
    std::fs::create_dir(&project_dir).unwrap();
    std::fs::write(
        project_dir.join("pipewright.yml"),
        r#"
parts:
  build:
    steps:
      - name: "compile"
        run: "echo built"
schedules:
  - every: "1h"
"#,
    )
    .unwrap();

    let projects = ProjectsConfig {
        projects: vec![Project {
            name: "demo".to_string(),
            path: "demo".to_string(),
            description: None,
        }],
    };

    let store = Arc::new(SqliteStore::in_memory().await.unwrap());
    let broker = Arc::new(EventBroker::new());
    let mut subscription = broker.subscribe();

    let scheduler = Arc::new(Scheduler::new(
        projects,
        Arc::clone(&store) as Arc<dyn RunStore>,
        Arc::clone(&broker),
        tmp.path().to_path_buf(),
    ));

    let runner = tokio::spawn({
        let scheduler = Arc::clone(&scheduler);
        async move { scheduler.run().await }
    });

    // The first evaluation is immediate; wait for the async firing to land
    let mut runs = Vec::new();
    for _ in 0..500 {
        runs = store.get_runs(10).await.unwrap();
        if runs.len() == 1 && runs[0].status != RunStatus::Running {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(runs.len(), 1, "startup tick should have fired the schedule");
    assert_eq!(runs[0].project, "demo");
    assert_eq!(runs[0].status, RunStatus::Success);

    // The broadcast contract: ack frame, then the lifecycle notification
    let ack = subscription.receiver.recv().await.unwrap();
    assert!(ack.starts_with("event: connected\n"));
    let frame = subscription.receiver.recv().await.unwrap();
    assert!(frame.starts_with("event: run_started\n"));
    assert!(frame.contains("\"project\":\"demo\""));

    scheduler.stop();
    tokio::time::timeout(Duration::from_secs(5), runner)
        .await
        .expect("scheduler should halt after stop")
        .unwrap();

    // Stopping does not retroactively touch recorded history
    assert_eq!(store.get_runs(10).await.unwrap().len(), 1);
}
