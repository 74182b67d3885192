#![allow(clippy::unwrap_used)]
// SyncEngine against a wiremock card and a temporary local root.

mod common;

use std::time::Duration;

use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use ezsync_api::{IgnoreList, ListingClient};
use ezsync_core::message::{self, SessionMessage};
use ezsync_core::sync::{DownloadOutcome, download_file};
use ezsync_core::{CoreError, ListingStatus, StalenessPolicy, SyncEngine};

use common::{
    STAMP_1, STAMP_2, b_page, fast_transport, file_line, mount_dir, mount_file, mtime, page,
    part_files, remote_ts, root_page, root_url,
};

fn engine(policy: StalenessPolicy) -> SyncEngine {
    let transport = fast_transport();
    let client =
        ListingClient::with_client(reqwest::Client::new(), &transport, IgnoreList::default());
    SyncEngine::new(client, policy, transport.chunk_timeout)
}

fn drain(rx: &mut tokio::sync::mpsc::Receiver<SessionMessage>) -> Vec<SessionMessage> {
    let mut out = Vec::new();
    while let Ok(msg) = rx.try_recv() {
        out.push(msg);
    }
    out
}

// ── Scenario: root file plus one subdirectory ───────────────────────

#[tokio::test]
async fn test_mirrors_tree_with_remote_mtimes() {
    let server = MockServer::start().await;
    // One counting pass plus one transfer pass, root and B/ each.
    mount_dir(&server, "A:", root_page(), 2).await;
    mount_dir(&server, "A:\\B", b_page(), 2).await;
    mount_file(&server, "file1.txt", b"one").await;
    mount_file(&server, "file2.txt", b"two").await;

    let local = tempfile::tempdir().unwrap();
    let engine = engine(StalenessPolicy::default());
    let cancel = CancellationToken::new();
    let (reporter, mut rx) = message::channel(64);

    let total = engine
        .compute_total(&root_url(&server), local.path(), &cancel)
        .await;
    assert_eq!(total, 2);

    let processed = engine
        .transfer(&root_url(&server), local.path(), total, &cancel, &reporter)
        .await;
    assert_eq!(processed, 2);

    let file1 = local.path().join("file1.txt");
    let file2 = local.path().join("B").join("file2.txt");
    assert_eq!(std::fs::read(&file1).unwrap(), b"one");
    assert_eq!(std::fs::read(&file2).unwrap(), b"two");
    assert_eq!(mtime(&file1), remote_ts(STAMP_1));
    assert_eq!(mtime(&file2), remote_ts(STAMP_2));

    // Progress never goes backwards and never passes the total.
    let updates: Vec<_> = drain(&mut rx)
        .into_iter()
        .filter_map(|m| match m {
            SessionMessage::Progress(p) => Some(p),
            _ => None,
        })
        .collect();
    assert_eq!(updates.len(), 2);
    assert!(updates.windows(2).all(|w| w[0].processed_files <= w[1].processed_files));
    assert!(updates.iter().all(|u| u.processed_files <= u.total_files));
    assert!((updates[1].percent - 100.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn test_resync_of_unchanged_tree_downloads_nothing() {
    let server = MockServer::start().await;
    mount_dir(&server, "A:", root_page(), 3).await;
    mount_dir(&server, "A:\\B", b_page(), 3).await;
    Mock::given(method("GET"))
        .and(path("/download"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"data".to_vec()))
        .expect(2)
        .mount(&server)
        .await;

    let local = tempfile::tempdir().unwrap();
    let engine = engine(StalenessPolicy::default());
    let cancel = CancellationToken::new();
    let (reporter, _rx) = message::channel(64);

    let total = engine
        .compute_total(&root_url(&server), local.path(), &cancel)
        .await;
    engine
        .transfer(&root_url(&server), local.path(), total, &cancel, &reporter)
        .await;

    let again = engine
        .compute_total(&root_url(&server), local.path(), &cancel)
        .await;
    assert_eq!(again, 0);
}

#[tokio::test]
async fn test_newer_local_file_is_not_counted_or_downloaded() {
    let server = MockServer::start().await;
    mount_dir(&server, "A:", page(&[file_line("file1.txt", "A:", STAMP_1)]), 2).await;
    Mock::given(method("GET"))
        .and(path("/download"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"remote".to_vec()))
        .expect(0)
        .mount(&server)
        .await;

    let local = tempfile::tempdir().unwrap();
    let file1 = local.path().join("file1.txt");
    std::fs::write(&file1, b"local").unwrap();
    let newer = remote_ts(STAMP_1) + 500;
    filetime::set_file_mtime(&file1, filetime::FileTime::from_unix_time(newer, 0)).unwrap();

    let engine = engine(StalenessPolicy::default());
    let cancel = CancellationToken::new();
    let (reporter, _rx) = message::channel(64);

    let total = engine
        .compute_total(&root_url(&server), local.path(), &cancel)
        .await;
    assert_eq!(total, 0);

    let processed = engine
        .transfer(&root_url(&server), local.path(), 1, &cancel, &reporter)
        .await;
    assert_eq!(processed, 0);
    assert_eq!(std::fs::read(&file1).unwrap(), b"local");
}

#[tokio::test]
async fn test_overwrite_refetches_fresh_files() {
    let server = MockServer::start().await;
    mount_dir(&server, "A:", page(&[file_line("file1.txt", "A:", STAMP_1)]), 1).await;

    let local = tempfile::tempdir().unwrap();
    let file1 = local.path().join("file1.txt");
    std::fs::write(&file1, b"local").unwrap();
    let newer = remote_ts(STAMP_1) + 500;
    filetime::set_file_mtime(&file1, filetime::FileTime::from_unix_time(newer, 0)).unwrap();

    let engine = engine(StalenessPolicy {
        overwrite: true,
        keep_old: false,
    });
    let total = engine
        .compute_total(&root_url(&server), local.path(), &CancellationToken::new())
        .await;
    assert_eq!(total, 1);
}

// ── Degraded paths ──────────────────────────────────────────────────

#[tokio::test]
async fn test_unreadable_subtree_degrades_to_empty() {
    let server = MockServer::start().await;
    mount_dir(&server, "A:", root_page(), 1).await;
    Mock::given(method("GET"))
        .and(path("/dir"))
        .and(query_param("dir", "A:\\B"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let local = tempfile::tempdir().unwrap();
    let total = engine(StalenessPolicy::default())
        .compute_total(&root_url(&server), local.path(), &CancellationToken::new())
        .await;
    assert_eq!(total, 1);
}

#[tokio::test]
async fn test_failed_download_is_skipped_and_not_counted() {
    let server = MockServer::start().await;
    mount_dir(&server, "A:", root_page(), 1).await;
    mount_dir(&server, "A:\\B", b_page(), 1).await;
    Mock::given(method("GET"))
        .and(path("/download"))
        .and(query_param("file", "file1.txt"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    mount_file(&server, "file2.txt", b"two").await;

    let local = tempfile::tempdir().unwrap();
    let (reporter, mut rx) = message::channel(64);
    let processed = engine(StalenessPolicy::default())
        .transfer(
            &root_url(&server),
            local.path(),
            2,
            &CancellationToken::new(),
            &reporter,
        )
        .await;

    assert_eq!(processed, 1);
    assert!(!local.path().join("file1.txt").exists());
    assert!(local.path().join("B").join("file2.txt").exists());
    assert!(part_files(local.path()).is_empty());
    assert!(drain(&mut rx).iter().any(|m| matches!(
        m,
        SessionMessage::Status { message, .. } if message.contains("file1.txt") && message.starts_with("Error")
    )));
}

#[tokio::test]
async fn test_transfer_stops_counting_at_total() {
    let server = MockServer::start().await;
    mount_dir(&server, "A:", root_page(), 1).await;
    mount_dir(&server, "A:\\B", b_page(), 1).await;
    mount_file(&server, "file1.txt", b"one").await;
    mount_file(&server, "file2.txt", b"two").await;

    let local = tempfile::tempdir().unwrap();
    let (reporter, _rx) = message::channel(64);
    let processed = engine(StalenessPolicy::default())
        .transfer(
            &root_url(&server),
            local.path(),
            1,
            &CancellationToken::new(),
            &reporter,
        )
        .await;

    assert_eq!(processed, 1);
    assert!(!local.path().join("B").join("file2.txt").exists());
}

#[tokio::test]
async fn test_probe_distinguishes_empty_from_unreachable() {
    let server = MockServer::start().await;
    mount_dir(&server, "A:", page(&[]), 1).await;
    let engine = engine(StalenessPolicy::default());

    assert!(matches!(
        engine.probe(&root_url(&server)).await,
        ListingStatus::Empty
    ));

    let missing = url::Url::parse(&format!("{}/dir?dir=Z:", server.uri())).unwrap();
    assert!(matches!(
        engine.probe(&missing).await,
        ListingStatus::Unreachable(CoreError::Listing {
            status: Some(404),
            ..
        })
    ));
}

#[tokio::test]
async fn test_root_page_without_listing_is_flagged() {
    let server = MockServer::start().await;
    mount_dir(
        &server,
        "A:",
        "<html><body>Sign in to continue</body></html>".to_owned(),
        1,
    )
    .await;
    let engine = engine(StalenessPolicy::default());

    assert!(matches!(
        engine.probe(&root_url(&server)).await,
        ListingStatus::NoContainer
    ));
}

// ── Single-file download ────────────────────────────────────────────

fn client() -> ListingClient {
    ListingClient::with_client(reqwest::Client::new(), &fast_transport(), IgnoreList::default())
}

#[tokio::test]
async fn test_zero_length_file_is_created() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/download"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let local = tempfile::tempdir().unwrap();
    let dest = local.path().join("EMPTY.TXT");
    let url = ListingClient::file_url(&root_url(&server), "file=EMPTY.TXT").unwrap();

    let outcome = download_file(
        &client(),
        &url,
        &dest,
        remote_ts(STAMP_1),
        Duration::from_secs(2),
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(outcome, DownloadOutcome::Completed { bytes: 0 });
    assert_eq!(std::fs::metadata(&dest).unwrap().len(), 0);
    assert_eq!(mtime(&dest), remote_ts(STAMP_1));
}

#[tokio::test]
async fn test_cancelled_download_leaves_no_artifacts() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/download"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(vec![7u8; 4096])
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let local = tempfile::tempdir().unwrap();
    let dest = local.path().join("BIG.EDF");
    std::fs::write(&dest, b"previous").unwrap();
    let url = ListingClient::file_url(&root_url(&server), "file=BIG.EDF").unwrap();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let outcome = download_file(
        &client(),
        &url,
        &dest,
        0,
        Duration::from_secs(10),
        &cancel,
    )
    .await
    .unwrap();

    assert_eq!(outcome, DownloadOutcome::Cancelled);
    assert_eq!(std::fs::read(&dest).unwrap(), b"previous");
    assert!(part_files(local.path()).is_empty());
}

#[tokio::test]
async fn test_stalled_body_is_reported_as_download_error() {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    // Headers and the first bytes arrive, then the card goes quiet.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 1024];
        assert!(stream.read(&mut buf).await.unwrap() > 0);
        stream
            .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 4096\r\n\r\nabc")
            .await
            .unwrap();
        stream.flush().await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
    });

    let local = tempfile::tempdir().unwrap();
    let dest = local.path().join("SLOW.EDF");
    let url = url::Url::parse(&format!("http://{addr}/download?file=SLOW.EDF")).unwrap();

    let result = download_file(
        &client(),
        &url,
        &dest,
        0,
        Duration::from_millis(200),
        &CancellationToken::new(),
    )
    .await;

    let err = result.unwrap_err();
    assert!(matches!(err, CoreError::DownloadStalled { .. }), "{err:?}");
    assert!(err.to_string().starts_with("Download of"));
    assert!(!dest.exists());
    assert!(part_files(local.path()).is_empty());
}

#[tokio::test]
async fn test_failed_rename_keeps_destination_intact() {
    let server = MockServer::start().await;
    mount_file(&server, "CLASH", b"new bytes").await;

    let local = tempfile::tempdir().unwrap();
    // A non-empty directory sits at the destination, so the final rename fails.
    let dest = local.path().join("CLASH");
    std::fs::create_dir(&dest).unwrap();
    std::fs::write(dest.join("keep.txt"), b"keep").unwrap();
    let url = ListingClient::file_url(&root_url(&server), "file=CLASH").unwrap();

    let result = download_file(
        &client(),
        &url,
        &dest,
        0,
        Duration::from_secs(2),
        &CancellationToken::new(),
    )
    .await;

    assert!(matches!(result, Err(CoreError::Io { .. })));
    assert_eq!(std::fs::read(dest.join("keep.txt")).unwrap(), b"keep");
    assert!(part_files(local.path()).is_empty());
}
