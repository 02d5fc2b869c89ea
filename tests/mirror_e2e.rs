//! End-to-end tests driving `Mirror` against a fake ShareDB server and
//! wiremock HTTP endpoints.

mod common;

use brain_mirror::{Event, Mirror};
use common::*;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn single_session_writes_expected_export() {
    let sync = ShareDbServer::start(small_workspace(), None).await;
    let http = MockServer::start().await;
    mock_refresh(&http, "session-token.2").await;
    mock_leaf(&http, "L1", 200, "hello").await;

    let dir = tempfile::tempdir().unwrap();
    let mirror = Mirror::new(test_config(&dir, &http.uri(), &sync.url)).unwrap();

    let credential = mirror.refresh_credential().await.unwrap();
    let report = mirror
        .run_session(&credential, &CancellationToken::new())
        .await
        .unwrap();

    let export = std::fs::read(dir.path().join("Export.md")).unwrap();
    assert_eq!(export, b"#Workspace\n#Getting started\nhello\n#Archive\n");
    assert_eq!((report.visited, report.resolved), (3, 3));
    assert!(report.skipped.is_empty());

    // The refreshed token authenticates the socket.
    assert_eq!(sync.cookies(), vec!["app-uid=app-1; token=session-token.2"]);
    let mut subscriptions = sync.subscriptions();
    assert_eq!(subscriptions[..2], ["ot_brain/brain-1", "ot_cell/R"]);
    subscriptions[2..].sort();
    assert_eq!(subscriptions[2..], ["ot_cell/L1", "ot_cell/L2"]);
}

#[tokio::test]
async fn leaf_failure_still_exports_every_heading() {
    let workspace = small_workspace()
        .cell("R", "Workspace", "TREE", &["L1", "L3", "L2"])
        .cell("L3", "Notes", "LEAF", &[]);
    let sync = ShareDbServer::start(workspace, None).await;
    let http = MockServer::start().await;
    mock_leaf(&http, "L1", 500, "boom").await;
    mock_leaf(&http, "L3", 200, "some notes\n").await;

    let dir = tempfile::tempdir().unwrap();
    let mirror = Mirror::new(test_config(&dir, &http.uri(), &sync.url)).unwrap();

    let report = mirror
        .run_session(
            &brain_mirror::Credential::new("initial-token"),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    let export = std::fs::read_to_string(dir.path().join("Export.md")).unwrap();
    assert_eq!(
        export,
        "#Workspace\n#Getting started\n#Notes\nsome notes\n#Archive\n"
    );
    assert_eq!(report.leaves_failed, 1);
    assert_eq!(report.leaves_inlined, 1);
}

#[tokio::test]
async fn missing_cells_are_skipped_not_fatal() {
    let workspace = small_workspace().cell("R", "Workspace", "TREE", &["L1", "gone", "L2"]);
    let sync = ShareDbServer::start(workspace, None).await;
    let http = MockServer::start().await;
    mock_leaf(&http, "L1", 200, "hello").await;

    let dir = tempfile::tempdir().unwrap();
    let mirror = Mirror::new(test_config(&dir, &http.uri(), &sync.url)).unwrap();

    let report = mirror
        .run_session(
            &brain_mirror::Credential::new("initial-token"),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(report.skipped, vec![brain_mirror::NodeId::from("gone")]);
    let export = std::fs::read_to_string(dir.path().join("Export.md")).unwrap();
    assert_eq!(export, "#Workspace\n#Getting started\nhello\n#gone\n#Archive\n");
}

#[tokio::test]
async fn connection_lost_during_leaf_download_still_exports() {
    let sync = ShareDbServer::start(small_workspace(), Some(Duration::from_millis(300))).await;
    let http = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/export/cells/L1.md"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("hello")
                .set_delay(Duration::from_millis(800)),
        )
        .mount(&http)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let mirror = Mirror::new(test_config(&dir, &http.uri(), &sync.url)).unwrap();
    let mut events = mirror.subscribe();

    let report = mirror
        .run_session(
            &brain_mirror::Credential::new("initial-token"),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(report.leaves_inlined, 1);
    let export = std::fs::read_to_string(dir.path().join("Export.md")).unwrap();
    assert_eq!(export, "#Workspace\n#Getting started\nhello\n#Archive\n");
    assert!(!dir.path().join("Export.md.part").exists());

    let mut completed_before_write = false;
    while let Ok(event) = events.try_recv() {
        match event {
            Event::ResolutionComplete { .. } => completed_before_write = true,
            Event::ExportWritten { .. } => break,
            _ => {}
        }
    }
    assert!(completed_before_write);
}

#[tokio::test]
async fn run_loop_backs_up_and_reexports_after_disconnect() {
    let sync = ShareDbServer::start(small_workspace(), Some(Duration::from_millis(300))).await;
    let http = MockServer::start().await;
    mock_refresh(&http, "fresh").await;
    mock_leaf(&http, "L1", 200, "hello").await;
    Mock::given(method("GET"))
        .and(path("/export/brains/brain-1.zip"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(zip_archive(&[("Team/Getting started.md", "hello\n")])),
        )
        .mount(&http)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(&dir, &http.uri(), &sync.url);
    config.backup.enabled = true;
    let mirror = Mirror::new(config).unwrap();
    let mut events = mirror.subscribe();

    let runner = mirror.clone();
    let handle = tokio::spawn(async move { runner.run().await });

    let mut exports = Vec::new();
    let mut disconnects = 0;
    let mut backups = 0;
    let collect = async {
        while exports.len() < 2 {
            match events.recv().await.unwrap() {
                Event::ExportWritten { session, .. } => exports.push(session),
                Event::Disconnected { .. } => disconnects += 1,
                Event::BackupExtracted { files, .. } => {
                    assert_eq!(files, 1);
                    backups += 1;
                }
                _ => {}
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(10), collect)
        .await
        .expect("two sessions must complete");

    assert_ne!(exports[0], exports[1], "each connection gets a fresh session");
    assert!(disconnects >= 1);
    assert!(backups >= 2, "every cycle starts with a backup");
    assert!(dir.path().join("markdown/Team/Getting started.md").exists());

    mirror.shutdown().await.unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("run must stop after shutdown")
        .unwrap()
        .unwrap();

    let export = std::fs::read_to_string(dir.path().join("Export.md")).unwrap();
    assert_eq!(export, "#Workspace\n#Getting started\nhello\n#Archive\n");
}
