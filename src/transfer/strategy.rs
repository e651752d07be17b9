// ── OperationStrategy – one file-operation contract per scheme pair ─────────
//
// Strategies take protocol-neutral targets, borrow pooled connections only
// for the duration of a call, and pass classified failures through as they
// come out of the backends.

use async_trait::async_trait;
use xfer_core::{
    FileInfo, OperationResult, ProgressReporter, Protocol, RemoteBackend, TransferControl, TransferError,
    TransferTarget,
};

#[async_trait]
pub trait OperationStrategy: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    /// Whether this strategy serves transfers from `src` to `dst`.
    fn supports(&self, src: Protocol, dst: Protocol) -> bool;

    /// Copy one file; returns the destination URI.
    async fn copy(
        &self,
        src: &TransferTarget,
        dst: &TransferTarget,
        reporter: &mut ProgressReporter,
        control: &TransferControl,
    ) -> OperationResult<String>;

    /// Move one file; the source is only removed after the copy succeeded.
    async fn move_file(
        &self,
        src: &TransferTarget,
        dst: &TransferTarget,
        reporter: &mut ProgressReporter,
        control: &TransferControl,
    ) -> OperationResult<String>;

    async fn delete(&self, target: &TransferTarget, permanent: bool) -> OperationResult<()>;

    /// Rename in place; returns the new URI.
    async fn rename(&self, target: &TransferTarget, new_name: &str) -> OperationResult<String>;

    async fn exists(&self, target: &TransferTarget) -> OperationResult<bool>;

    async fn create_directory(&self, target: &TransferTarget) -> OperationResult<()>;

    async fn get_file_info(&self, target: &TransferTarget) -> OperationResult<FileInfo>;

    async fn list(&self, target: &TransferTarget) -> OperationResult<Vec<FileInfo>>;
}

/// Stat a remote source and fill in its size. Directories are refused:
/// transfers are per file.
pub(crate) async fn sized_source(backend: &dyn RemoteBackend, src: &TransferTarget) -> OperationResult<TransferTarget> {
    let info = backend.stat(src).await?;
    if info.is_directory {
        return Err(TransferError::protocol(
            "EISDIR",
            format!("{} is a directory", src.remote_path),
        ));
    }
    let mut sized = src.clone();
    sized.size_bytes = Some(info.size);
    Ok(sized)
}

/// Remove a remote file or empty directory.
pub(crate) async fn remove_remote(backend: &dyn RemoteBackend, target: &TransferTarget) -> OperationResult<()> {
    if target.is_directory || backend.stat(target).await?.is_directory {
        backend.remove_dir(target).await
    } else {
        backend.delete(target).await
    }
}

pub(crate) async fn rename_remote(
    backend: &dyn RemoteBackend,
    target: &TransferTarget,
    new_name: &str,
) -> OperationResult<String> {
    let renamed = target.with_name(new_name);
    backend.rename(target, &renamed).await?;
    Ok(renamed.to_uri())
}

/// Reject names that would escape the parent directory.
pub fn validate_name(new_name: &str) -> OperationResult<()> {
    if new_name.is_empty() || new_name == "." || new_name == ".." || new_name.contains(['/', '\\']) {
        return Err(TransferError::protocol(
            "EINVALIDPATH",
            format!("'{}' is not a valid file name", new_name),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_with_separators_are_refused() {
        assert!(validate_name("b.txt").is_ok());
        assert!(validate_name("with space.jpg").is_ok());
        for bad in ["", ".", "..", "a/b", "a\\b"] {
            let err = validate_name(bad).unwrap_err();
            assert_eq!(err.code.as_deref(), Some("EINVALIDPATH"), "{bad:?}");
        }
    }
}
