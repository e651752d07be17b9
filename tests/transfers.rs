//! Copy/move composition across backends, driven through the orchestrator.

mod support;

use std::sync::Arc;
use std::time::Duration;
use support::{collector, config, staging_is_empty, Blob, MemoryBackend};
use xfer::*;

fn orchestrator(scratch: &std::path::Path, backends: &[Arc<MemoryBackend>]) -> TransferOrchestrator {
    let mut builder = TransferOrchestrator::builder(config(scratch));
    for b in backends {
        builder = builder.backend(b.clone());
    }
    builder.build().unwrap()
}

#[tokio::test]
async fn same_key_move_is_a_single_native_rename() {
    let scratch = tempfile::tempdir().unwrap();
    let sftp = Arc::new(MemoryBackend::new(Protocol::Sftp));
    sftp.put("sftp://box/in/a.bin", Blob::Bytes(vec![1; 1000]));
    let xfer = orchestrator(scratch.path(), &[sftp.clone()]);

    let moved = xfer
        .move_file("sftp://box/in/a.bin", "sftp://box/out/a.bin", None)
        .await
        .unwrap();

    assert_eq!(moved, "sftp://box/out/a.bin");
    assert_eq!(sftp.count("rename"), 1);
    for op in ["download", "upload", "delete"] {
        assert_eq!(sftp.count(op), 0, "{op} must not run: {:?}", sftp.calls());
    }
    assert!(sftp.file("sftp://box/in/a.bin").is_none());
    assert_eq!(sftp.file("sftp://box/out/a.bin").unwrap().len(), 1000);
}

#[tokio::test]
async fn move_between_hosts_copies_then_deletes() {
    let scratch = tempfile::tempdir().unwrap();
    let sftp = Arc::new(MemoryBackend::new(Protocol::Sftp));
    sftp.put("sftp://one/a.bin", Blob::Bytes(b"payload".to_vec()));
    let xfer = orchestrator(scratch.path(), &[sftp.clone()]);

    xfer.move_file("sftp://one/a.bin", "sftp://two/a.bin", None).await.unwrap();

    let ops = sftp.ops();
    assert_eq!(sftp.count("rename"), 0);
    let upload = ops.iter().position(|o| o == "upload").unwrap();
    let delete = ops.iter().position(|o| o == "delete").unwrap();
    assert!(upload < delete, "{ops:?}");
    assert_eq!(sftp.file("sftp://two/a.bin").unwrap(), b"payload");
    assert!(sftp.file("sftp://one/a.bin").is_none());
    assert!(staging_is_empty(scratch.path()));
}

#[tokio::test]
async fn cross_protocol_move_copies_then_deletes() {
    let scratch = tempfile::tempdir().unwrap();
    let sftp = Arc::new(MemoryBackend::new(Protocol::Sftp));
    let ftp = Arc::new(MemoryBackend::new(Protocol::Ftp));
    sftp.put("sftp://box/a.jpg", Blob::Bytes(vec![7; 4096]));
    let xfer = orchestrator(scratch.path(), &[sftp.clone(), ftp.clone()]);

    let moved = xfer.move_file("sftp://box/a.jpg", "ftp://mirror/pub/a.jpg", None).await.unwrap();

    assert_eq!(moved, "ftp://mirror/pub/a.jpg");
    assert_eq!(ftp.file("ftp://mirror/pub/a.jpg").unwrap(), vec![7; 4096]);
    assert!(sftp.file("sftp://box/a.jpg").is_none());
    assert_eq!(sftp.count("delete"), 1);
    assert_eq!(sftp.count("rename") + ftp.count("rename"), 0);
}

#[tokio::test]
async fn failed_copy_never_deletes_the_source() {
    let scratch = tempfile::tempdir().unwrap();
    let sftp = Arc::new(MemoryBackend::new(Protocol::Sftp));
    let ftp = Arc::new(MemoryBackend::new(Protocol::Ftp));
    sftp.put("sftp://box/a.jpg", Blob::Bytes(vec![7; 4096]));
    ftp.fail_next("upload", TransferError::permission("553 not allowed").with_code(553));
    let xfer = orchestrator(scratch.path(), &[sftp.clone(), ftp.clone()]);

    let err = xfer
        .move_file("sftp://box/a.jpg", "ftp://mirror/pub/a.jpg", None)
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::Permission);
    assert_eq!(err.code.as_deref(), Some("553"));
    assert_eq!(err.source_path.as_deref(), Some("sftp://box/a.jpg"));
    assert_eq!(err.dest_path.as_deref(), Some("ftp://mirror/pub/a.jpg"));
    assert_eq!(sftp.count("delete"), 0);
    assert_eq!(ftp.count("delete"), 0);
    assert!(sftp.file("sftp://box/a.jpg").is_some());
    assert!(staging_is_empty(scratch.path()));
}

#[tokio::test]
async fn staging_file_is_removed_on_every_exit() {
    let scratch = tempfile::tempdir().unwrap();
    let smb = Arc::new(MemoryBackend::new(Protocol::Smb));
    let ftp = Arc::new(MemoryBackend::new(Protocol::Ftp));
    smb.put("smb://nas/media/a.bin", Blob::Bytes(vec![1; 200_000]));
    let xfer = orchestrator(scratch.path(), &[smb.clone(), ftp.clone()]);

    xfer.copy("smb://nas/media/a.bin", "ftp://mirror/a.bin", None).await.unwrap();
    assert!(scratch.path().join("stage").is_dir());
    assert!(staging_is_empty(scratch.path()));

    smb.fail_next("download", TransferError::protocol("NT_STATUS_INTERNAL_ERROR", "boom"));
    let err = xfer.copy("smb://nas/media/a.bin", "ftp://mirror/b.bin", None).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Protocol);
    assert!(staging_is_empty(scratch.path()));

    ftp.fail_next("upload", TransferError::storage_full("452 disk full"));
    let err = xfer.copy("smb://nas/media/a.bin", "ftp://mirror/c.bin", None).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::StorageFull);
    assert!(staging_is_empty(scratch.path()));

    let control = TransferControl::new();
    control.cancel();
    let err = xfer
        .copy_with_control("smb://nas/media/a.bin", "ftp://mirror/d.bin", None, &control)
        .await
        .unwrap_err();
    assert!(err.is_cancelled());
    assert!(staging_is_empty(scratch.path()));
}

#[tokio::test]
async fn dropped_staged_copy_leaves_no_temp_file() {
    let scratch = tempfile::tempdir().unwrap();
    let mut slow = MemoryBackend::new(Protocol::Smb);
    slow.chunk_delay = Some(Duration::from_secs(30));
    let smb = Arc::new(slow);
    let ftp = Arc::new(MemoryBackend::new(Protocol::Ftp));
    smb.put("smb://nas/media/a.bin", Blob::Bytes(vec![1; 1000]));
    let xfer = orchestrator(scratch.path(), &[smb.clone(), ftp.clone()]);

    let copy = xfer.copy("smb://nas/media/a.bin", "ftp://mirror/a.bin", None);
    let timed_out = tokio::time::timeout(Duration::from_millis(200), copy).await;
    assert!(timed_out.is_err());
    assert!(staging_is_empty(scratch.path()));
}

#[tokio::test]
async fn staged_progress_is_monotonic_and_ends_at_total() {
    let scratch = tempfile::tempdir().unwrap();
    let sftp = Arc::new(MemoryBackend::new(Protocol::Sftp));
    let ftp = Arc::new(MemoryBackend::new(Protocol::Ftp));
    sftp.put("sftp://box/big.bin", Blob::Bytes(vec![5; 300_000]));
    let xfer = orchestrator(scratch.path(), &[sftp.clone(), ftp.clone()]);
    let (cb, seen) = collector();

    xfer.copy("sftp://box/big.bin", "ftp://mirror/big.bin", Some(cb)).await.unwrap();

    let seen = seen.lock().unwrap();
    let bytes: Vec<u64> = seen.iter().map(|p| p.bytes_transferred).collect();
    assert!(bytes.windows(2).all(|w| w[0] <= w[1]), "{bytes:?}");
    assert!(bytes.contains(&150_000), "download phase ends at half: {bytes:?}");
    let last = seen.last().unwrap();
    assert_eq!(last.bytes_transferred, 300_000);
    assert_eq!(last.total_bytes, Some(300_000));
}

#[tokio::test]
async fn direct_transfers_skip_staging() {
    let scratch = tempfile::tempdir().unwrap();
    let sftp = Arc::new(MemoryBackend::new(Protocol::Sftp));
    let xfer = orchestrator(scratch.path(), &[sftp.clone()]);
    let local = scratch.path().join("up.bin");
    std::fs::write(&local, vec![9u8; 70_000]).unwrap();
    let (cb, seen) = collector();

    xfer.copy(local.to_str().unwrap(), "sftp://box/up.bin", Some(cb)).await.unwrap();
    assert_eq!(sftp.file("sftp://box/up.bin").unwrap().len(), 70_000);
    assert_eq!(seen.lock().unwrap().last().unwrap().bytes_transferred, 70_000);

    let back = scratch.path().join("down.bin");
    xfer.move_file("sftp://box/up.bin", back.to_str().unwrap(), None).await.unwrap();
    assert_eq!(std::fs::read(&back).unwrap().len(), 70_000);
    assert!(sftp.file("sftp://box/up.bin").is_none());
    assert!(!scratch.path().join("stage").exists());
}

#[tokio::test]
async fn identical_key_copies_share_one_connection() {
    let scratch = tempfile::tempdir().unwrap();
    let mut backend = MemoryBackend::new(Protocol::Smb);
    backend.chunk_delay = Some(Duration::from_millis(50));
    let smb = Arc::new(backend);
    smb.put("smb://nas/media/a.jpg", Blob::Bytes(vec![1; 10_000]));
    smb.put("smb://nas/media/b.jpg", Blob::Bytes(vec![2; 10_000]));
    let xfer = orchestrator(scratch.path(), &[smb.clone()]);
    let a = scratch.path().join("a.jpg");
    let b = scratch.path().join("b.jpg");

    let (ra, rb) = tokio::join!(
        xfer.copy("smb://nas/media/a.jpg", a.to_str().unwrap(), None),
        xfer.copy("smb://nas/media/b.jpg", b.to_str().unwrap(), None),
    );
    ra.unwrap();
    rb.unwrap();

    assert_eq!(std::fs::read(&a).unwrap(), vec![1; 10_000]);
    assert_eq!(std::fs::read(&b).unwrap(), vec![2; 10_000]);
    let stats = smb.pool().stats();
    assert_eq!(stats.created, 1);
    assert!(stats.live <= 1);
    assert_eq!(smb.peak_in_use(), 1);
}

#[tokio::test]
async fn cancelling_mid_download_returns_cancelled() {
    const TEN_MB: u64 = 10 * 1024 * 1024;
    let scratch = tempfile::tempdir().unwrap();
    let sftp = Arc::new(MemoryBackend::new(Protocol::Sftp));
    sftp.put("sftp://box/movie.mkv", Blob::Zeroes(100 * 1024 * 1024));
    let xfer = orchestrator(scratch.path(), &[sftp.clone()]);
    let out = scratch.path().join("movie.mkv");

    let control = TransferControl::new();
    let trigger = control.clone();
    let cb: ProgressCallback = Arc::new(move |p| {
        if p.bytes_transferred >= TEN_MB {
            trigger.cancel();
        }
    });

    let err = xfer
        .copy_with_control("sftp://box/movie.mkv", out.to_str().unwrap(), Some(cb), &control)
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::Cancelled);
    assert_eq!(sftp.count("download"), 1, "cancellation is never retried");
    let written = std::fs::metadata(&out).unwrap().len();
    assert!(written >= TEN_MB);
    assert!(written <= TEN_MB + DEFAULT_BUFFER_SIZE as u64, "{written}");
}

#[tokio::test]
async fn network_failures_are_retried_once() {
    let scratch = tempfile::tempdir().unwrap();
    let sftp = Arc::new(MemoryBackend::new(Protocol::Sftp));
    sftp.put("sftp://box/a.bin", Blob::Bytes(vec![3; 500]));
    let xfer = orchestrator(scratch.path(), &[sftp.clone()]);
    let out = scratch.path().join("a.bin");

    sftp.fail_next("download", TransferError::network("reset").with_code("ECONNRESET"));
    xfer.copy("sftp://box/a.bin", out.to_str().unwrap(), None).await.unwrap();
    assert_eq!(sftp.count("download"), 2);

    sftp.fail_next("download", TransferError::network("reset"));
    sftp.fail_next("download", TransferError::network("reset again"));
    let err = xfer.copy("sftp://box/a.bin", out.to_str().unwrap(), None).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Network);
    assert_eq!(sftp.count("download"), 4);

    sftp.fail_next("download", TransferError::authentication("denied"));
    let err = xfer.copy("sftp://box/a.bin", out.to_str().unwrap(), None).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Authentication);
    assert_eq!(sftp.count("download"), 5);
}

#[tokio::test]
async fn local_copy_onto_itself_keeps_the_source() {
    let scratch = tempfile::tempdir().unwrap();
    let xfer = orchestrator(scratch.path(), &[]);
    let file = scratch.path().join("keep.bin");
    std::fs::write(&file, vec![5u8; 1000]).unwrap();
    let path = file.to_str().unwrap();

    let err = xfer.copy(path, path, None).await.unwrap_err();
    assert_eq!(err.code.as_deref(), Some("ESAMEFILE"));
    assert_eq!(err.source_path.as_deref(), Some(path));
    assert_eq!(std::fs::metadata(&file).unwrap().len(), 1000);

    xfer.move_file(path, path, None).await.unwrap();
    assert_eq!(std::fs::metadata(&file).unwrap().len(), 1000);
}
