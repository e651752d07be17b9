//! Dispatch, retry policy and the single-path API.

mod support;

use async_trait::async_trait;
use mockall::mock;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use support::{config, Blob, MemoryBackend};
use xfer::*;

mock! {
    pub Strategy {}

    #[async_trait]
    impl OperationStrategy for Strategy {
        fn name(&self) -> &'static str;
        fn supports(&self, src: Protocol, dst: Protocol) -> bool;
        async fn copy(
            &self,
            src: &TransferTarget,
            dst: &TransferTarget,
            reporter: &mut ProgressReporter,
            control: &TransferControl,
        ) -> OperationResult<String>;
        async fn move_file(
            &self,
            src: &TransferTarget,
            dst: &TransferTarget,
            reporter: &mut ProgressReporter,
            control: &TransferControl,
        ) -> OperationResult<String>;
        async fn delete(&self, target: &TransferTarget, permanent: bool) -> OperationResult<()>;
        async fn rename(&self, target: &TransferTarget, new_name: &str) -> OperationResult<String>;
        async fn exists(&self, target: &TransferTarget) -> OperationResult<bool>;
        async fn create_directory(&self, target: &TransferTarget) -> OperationResult<()>;
        async fn get_file_info(&self, target: &TransferTarget) -> OperationResult<FileInfo>;
        async fn list(&self, target: &TransferTarget) -> OperationResult<Vec<FileInfo>>;
    }
}

fn mock_strategy() -> MockStrategy {
    let mut mock = MockStrategy::new();
    mock.expect_name().return_const("mock");
    mock.expect_supports().return_const(true);
    mock
}

fn with_mock(scratch: &std::path::Path, mock: MockStrategy) -> TransferOrchestrator {
    TransferOrchestrator::builder(config(scratch))
        .strategy(Protocol::Local, Protocol::Local, Arc::new(mock))
        .build()
        .unwrap()
}

#[tokio::test]
async fn authentication_failure_reaches_the_strategy_once() {
    let scratch = tempfile::tempdir().unwrap();
    let mut mock = mock_strategy();
    mock.expect_copy()
        .times(1)
        .returning(|_, _, _, _| Err(TransferError::authentication("530 Login incorrect").with_code(530)));
    let xfer = with_mock(scratch.path(), mock);

    let err = xfer.copy("/src/a.txt", "/dst/a.txt", None).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Authentication);
    assert_eq!(err.code.as_deref(), Some("530"));
    assert_eq!(err.source_path.as_deref(), Some("/src/a.txt"));
    assert_eq!(err.dest_path.as_deref(), Some("/dst/a.txt"));
}

#[tokio::test]
async fn network_failure_is_retried_then_succeeds() {
    let scratch = tempfile::tempdir().unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = calls.clone();
    let mut mock = mock_strategy();
    mock.expect_copy().times(2).returning(move |_, dst, _, _| {
        if seen.fetch_add(1, Ordering::SeqCst) == 0 {
            Err(TransferError::network("connection reset"))
        } else {
            Ok(dst.to_uri())
        }
    });
    let xfer = with_mock(scratch.path(), mock);

    let path = xfer.copy("/src/a.txt", "/dst/a.txt", None).await.unwrap();
    assert_eq!(path, "/dst/a.txt");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn other_kinds_are_never_retried() {
    for kind in [
        ErrorKind::NotFound,
        ErrorKind::Permission,
        ErrorKind::StorageFull,
        ErrorKind::Protocol,
        ErrorKind::Cancelled,
        ErrorKind::Unknown,
    ] {
        let scratch = tempfile::tempdir().unwrap();
        let mut mock = mock_strategy();
        mock.expect_move_file()
            .times(1)
            .returning(move |_, _, _, _| Err(TransferError::new(kind, "nope")));
        let xfer = with_mock(scratch.path(), mock);
        let err = xfer.move_file("/a", "/b", None).await.unwrap_err();
        assert_eq!(err.kind, kind);
    }
}

#[tokio::test]
async fn retry_budget_comes_from_config() {
    let scratch = tempfile::tempdir().unwrap();
    let mut mock = mock_strategy();
    mock.expect_exists()
        .times(4)
        .returning(|_| Err(TransferError::network("timed out").with_code("ETIMEDOUT")));
    let xfer = TransferOrchestrator::builder(TransferConfig {
        max_network_retries: 3,
        ..config(scratch.path())
    })
    .strategy(Protocol::Local, Protocol::Local, Arc::new(mock))
    .build()
    .unwrap();

    let err = xfer.exists("/x").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Network);
    assert_eq!(err.source_path.as_deref(), Some("/x"));
}

#[tokio::test]
async fn progress_stays_monotonic_across_a_retry() {
    let scratch = tempfile::tempdir().unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = calls.clone();
    let mut mock = mock_strategy();
    mock.expect_copy().times(2).returning(move |_, dst, reporter, _| {
        if seen.fetch_add(1, Ordering::SeqCst) == 0 {
            reporter.update(600, Some(1000));
            Err(TransferError::network("reset"))
        } else {
            reporter.update(100, Some(1000));
            reporter.finish(1000, Some(1000));
            Ok(dst.to_uri())
        }
    });
    let xfer = with_mock(scratch.path(), mock);
    let (cb, progress) = support::collector();

    xfer.copy("/a", "/b", Some(cb)).await.unwrap();

    let bytes: Vec<u64> = progress.lock().unwrap().iter().map(|p| p.bytes_transferred).collect();
    assert_eq!(bytes, vec![600, 1000]);
}

#[tokio::test]
async fn invalid_paths_and_unserved_schemes_are_reported() {
    let scratch = tempfile::tempdir().unwrap();
    let xfer = TransferOrchestrator::builder(config(scratch.path())).build().unwrap();

    let err = xfer.copy("relative.txt", "/b", None).await.unwrap_err();
    assert_eq!(err.code.as_deref(), Some("EINVALIDPATH"));
    assert_eq!(err.source_path.as_deref(), Some("relative.txt"));

    let err = xfer.copy("/a", "sftp://box/a", None).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Protocol);
    assert_eq!(err.code.as_deref(), Some("EUNSUPPORTED"));

    let err = xfer.rename("/a", "../escape").await.unwrap_err();
    assert_eq!(err.code.as_deref(), Some("EINVALIDPATH"));
}

#[tokio::test]
async fn local_single_path_operations() {
    let scratch = tempfile::tempdir().unwrap();
    let xfer = TransferOrchestrator::builder(config(scratch.path())).build().unwrap();
    let root = scratch.path().join("work");
    let root_str = root.to_str().unwrap();

    xfer.create_directory(root_str).await.unwrap();
    let file = root.join("note.txt");
    std::fs::write(&file, b"remember").unwrap();
    let file_str = file.to_str().unwrap();

    assert!(xfer.exists(file_str).await.unwrap());
    assert_eq!(xfer.get_file_info(file_str).await.unwrap().size, 8);
    let listed = xfer.list(root_str).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].name, "note.txt");

    let renamed = xfer.rename(file_str, "memo.txt").await.unwrap();
    assert_eq!(renamed, root.join("memo.txt").to_str().unwrap());

    xfer.delete(&renamed, false).await.unwrap();
    assert!(!xfer.exists(&renamed).await.unwrap());
    assert_eq!(std::fs::read_dir(scratch.path().join("trash")).unwrap().count(), 1);

    let err = xfer.delete(&renamed, true).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
    assert_eq!(err.source_path.as_deref(), Some(renamed.as_str()));
}

#[tokio::test]
async fn remote_single_path_operations() {
    let scratch = tempfile::tempdir().unwrap();
    let ftp = Arc::new(MemoryBackend::new(Protocol::Ftp));
    ftp.put("ftp://mirror/pub/a.iso", Blob::Bytes(vec![0; 42]));
    let xfer = TransferOrchestrator::builder(config(scratch.path()))
        .backend(ftp.clone())
        .build()
        .unwrap();

    let info = xfer.get_file_info("ftp://mirror/pub/a.iso").await.unwrap();
    assert_eq!(info.size, 42);
    assert_eq!(xfer.list("ftp://mirror/pub").await.unwrap().len(), 1);

    let renamed = xfer.rename("ftp://mirror/pub/a.iso", "b.iso").await.unwrap();
    assert_eq!(renamed, "ftp://mirror/pub/b.iso");
    assert!(!xfer.exists("ftp://mirror/pub/a.iso").await.unwrap());

    xfer.create_directory("ftp://mirror/pub/new").await.unwrap();
    xfer.delete("ftp://mirror/pub/b.iso", false).await.unwrap();
    assert!(ftp.file("ftp://mirror/pub/b.iso").is_none());

    assert!(xfer
        .test_connection(Protocol::Ftp, ConnectionParams::new(Protocol::Ftp, "mirror"))
        .await
        .unwrap());
    assert!(xfer
        .test_connection(Protocol::Local, ConnectionParams::new(Protocol::Local, ""))
        .await
        .unwrap());
    let err = xfer
        .test_connection(Protocol::Smb, ConnectionParams::new(Protocol::Smb, "nas"))
        .await
        .unwrap_err();
    assert_eq!(err.code.as_deref(), Some("EUNSUPPORTED"));

    xfer.shutdown().await;
    assert_eq!(ftp.pool().stats().live, 0);
}

#[tokio::test]
async fn resolver_installs_every_protocol() {
    let scratch = tempfile::tempdir().unwrap();
    let xfer = TransferOrchestrator::builder(config(scratch.path()))
        .resolver(Arc::new(StaticCredentialResolver::new()))
        .without_maintenance()
        .build()
        .unwrap();
    for p in [Protocol::Ftp, Protocol::Sftp, Protocol::Smb, Protocol::WebDav] {
        assert!(xfer.registry().backend(p).is_some(), "{p}");
        assert_eq!(xfer.registry().resolve(Protocol::Local, p).unwrap().name(), "direct");
        assert_eq!(xfer.registry().resolve(p, p).unwrap().name(), "remote");
    }
    assert_eq!(
        xfer.registry().resolve(Protocol::Smb, Protocol::WebDav).unwrap().name(),
        "staged"
    );
    // local/local + 4 same-scheme + 8 direct + 12 staged
    assert_eq!(xfer.registry().pairs().len(), 25);
}
