// ── LocalStrategy – local ↔ local ───────────────────────────────────────────

use crate::transfer::strategy::OperationStrategy;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info};
use std::path::{Path, PathBuf};
use xfer_core::{
    pump, FileInfo, OperationResult, ProgressReporter, Protocol, PumpOptions, TransferConfig, TransferControl,
    TransferError, TransferTarget,
};

pub struct LocalStrategy {
    config: TransferConfig,
}

impl LocalStrategy {
    pub fn new(config: TransferConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl OperationStrategy for LocalStrategy {
    fn name(&self) -> &'static str {
        "local"
    }

    fn supports(&self, src: Protocol, dst: Protocol) -> bool {
        src == Protocol::Local && dst == Protocol::Local
    }

    async fn copy(
        &self,
        src: &TransferTarget,
        dst: &TransferTarget,
        reporter: &mut ProgressReporter,
        control: &TransferControl,
    ) -> OperationResult<String> {
        copy_file(&self.config, path_of(src), path_of(dst), reporter, control).await?;
        Ok(dst.to_uri())
    }

    async fn move_file(
        &self,
        src: &TransferTarget,
        dst: &TransferTarget,
        reporter: &mut ProgressReporter,
        control: &TransferControl,
    ) -> OperationResult<String> {
        control.checkpoint()?;
        let size = tokio::fs::metadata(path_of(src))
            .await
            .map_err(|e| TransferError::from_io("stat", e))?
            .len();
        match tokio::fs::rename(path_of(src), path_of(dst)).await {
            Ok(()) => {
                reporter.finish(size, Some(size));
                Ok(dst.to_uri())
            }
            Err(e) if crosses_devices(&e) => {
                debug!("{} and {} are on different devices, copying", src, dst);
                copy_file(&self.config, path_of(src), path_of(dst), reporter, control).await?;
                remove(path_of(src)).await?;
                Ok(dst.to_uri())
            }
            Err(e) => Err(TransferError::from_io("rename", e)),
        }
    }

    async fn delete(&self, target: &TransferTarget, permanent: bool) -> OperationResult<()> {
        if permanent {
            remove(path_of(target)).await
        } else {
            let parked = trash(&self.config.trash_dir(), path_of(target)).await?;
            info!("moved {} to trash at {}", target, parked.display());
            Ok(())
        }
    }

    async fn rename(&self, target: &TransferTarget, new_name: &str) -> OperationResult<String> {
        rename_in_place(target, new_name).await
    }

    async fn exists(&self, target: &TransferTarget) -> OperationResult<bool> {
        exists(path_of(target)).await
    }

    async fn create_directory(&self, target: &TransferTarget) -> OperationResult<()> {
        tokio::fs::create_dir(path_of(target))
            .await
            .map_err(|e| TransferError::from_io("mkdir", e))
    }

    async fn get_file_info(&self, target: &TransferTarget) -> OperationResult<FileInfo> {
        file_info(path_of(target)).await
    }

    async fn list(&self, target: &TransferTarget) -> OperationResult<Vec<FileInfo>> {
        list_dir(path_of(target)).await
    }
}

// ─── Filesystem helpers shared with the direct strategy ─────────────────────

pub(crate) fn path_of(target: &TransferTarget) -> &Path {
    Path::new(&target.remote_path)
}

/// Stream `from` into a new file at `to`.
pub(crate) async fn copy_file(
    config: &TransferConfig,
    from: &Path,
    to: &Path,
    reporter: &mut ProgressReporter,
    control: &TransferControl,
) -> OperationResult<u64> {
    let mut source = tokio::fs::File::open(from)
        .await
        .map_err(|e| TransferError::from_io("open source", e))?;
    let meta = source.metadata().await.map_err(|e| TransferError::from_io("stat", e))?;
    if meta.is_dir() {
        return Err(TransferError::protocol("EISDIR", format!("{} is a directory", from.display())));
    }
    // Creating the destination truncates it, which would wipe the source.
    if same_file(from, to).await {
        return Err(TransferError::protocol(
            "ESAMEFILE",
            format!("{} and {} are the same file", from.display(), to.display()),
        ));
    }
    let mut sink = tokio::fs::File::create(to)
        .await
        .map_err(|e| TransferError::from_io("create destination", e))?;
    let opts = PumpOptions {
        buffer_size: config.buffer_size,
        read_timeout: None,
        total: Some(meta.len()),
    };
    let copied = pump(&mut source, &mut sink, &opts, reporter, control).await?;
    sink.sync_all().await.map_err(|e| TransferError::from_io("sync", e))?;
    Ok(copied)
}

async fn same_file(a: &Path, b: &Path) -> bool {
    match (tokio::fs::canonicalize(a).await, tokio::fs::canonicalize(b).await) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Delete a file, or a directory when it is empty.
pub(crate) async fn remove(path: &Path) -> OperationResult<()> {
    let meta = tokio::fs::symlink_metadata(path)
        .await
        .map_err(|e| TransferError::from_io("stat", e))?;
    let result = if meta.is_dir() {
        tokio::fs::remove_dir(path).await
    } else {
        tokio::fs::remove_file(path).await
    };
    result.map_err(|e| TransferError::from_io("delete", e))
}

/// Move `path` under `trash_dir` with a collision-free name.
pub(crate) async fn trash(trash_dir: &Path, path: &Path) -> OperationResult<PathBuf> {
    let meta = tokio::fs::symlink_metadata(path)
        .await
        .map_err(|e| TransferError::from_io("stat", e))?;
    tokio::fs::create_dir_all(trash_dir)
        .await
        .map_err(|e| TransferError::from_io("create trash", e))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let parked = trash_dir.join(format!("{}-{}", uuid::Uuid::new_v4().simple(), name));
    match tokio::fs::rename(path, &parked).await {
        Ok(()) => Ok(parked),
        Err(e) if crosses_devices(&e) && meta.is_file() => {
            tokio::fs::copy(path, &parked)
                .await
                .map_err(|e| TransferError::from_io("copy to trash", e))?;
            remove(path).await?;
            Ok(parked)
        }
        Err(e) => Err(TransferError::from_io("move to trash", e)),
    }
}

pub(crate) async fn rename_in_place(target: &TransferTarget, new_name: &str) -> OperationResult<String> {
    let from = path_of(target);
    let to = from.with_file_name(new_name);
    tokio::fs::rename(from, &to)
        .await
        .map_err(|e| TransferError::from_io("rename", e))?;
    Ok(to.to_string_lossy().into_owned())
}

pub(crate) async fn exists(path: &Path) -> OperationResult<bool> {
    match tokio::fs::symlink_metadata(path).await {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(TransferError::from_io("stat", e)),
    }
}

pub(crate) async fn file_info(path: &Path) -> OperationResult<FileInfo> {
    let meta = tokio::fs::metadata(path)
        .await
        .map_err(|e| TransferError::from_io("stat", e))?;
    Ok(to_file_info(path, &meta))
}

pub(crate) async fn list_dir(path: &Path) -> OperationResult<Vec<FileInfo>> {
    let mut dir = tokio::fs::read_dir(path)
        .await
        .map_err(|e| TransferError::from_io("list", e))?;
    let mut entries = Vec::new();
    while let Some(entry) = dir
        .next_entry()
        .await
        .map_err(|e| TransferError::from_io("list", e))?
    {
        // Entries can vanish between readdir and stat.
        let Ok(meta) = entry.metadata().await else { continue };
        entries.push(to_file_info(&entry.path(), &meta));
    }
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}

fn to_file_info(path: &Path, meta: &std::fs::Metadata) -> FileInfo {
    FileInfo {
        name: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        path: path.to_string_lossy().into_owned(),
        is_directory: meta.is_dir(),
        size: if meta.is_dir() { 0 } else { meta.len() },
        modified: meta.modified().ok().map(DateTime::<Utc>::from),
        permissions: mode_string(meta),
    }
}

#[cfg(unix)]
fn mode_string(meta: &std::fs::Metadata) -> Option<String> {
    use std::os::unix::fs::PermissionsExt;
    Some(format!("{:o}", meta.permissions().mode() & 0o7777))
}

#[cfg(not(unix))]
fn mode_string(meta: &std::fs::Metadata) -> Option<String> {
    Some(if meta.permissions().readonly() { "r" } else { "rw" }.into())
}

/// EXDEV on unix, ERROR_NOT_SAME_DEVICE on windows.
fn crosses_devices(e: &std::io::Error) -> bool {
    if cfg!(windows) {
        e.raw_os_error() == Some(17)
    } else {
        e.raw_os_error() == Some(18)
    }
}
