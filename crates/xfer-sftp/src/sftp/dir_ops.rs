// ── Directory & metadata operations ──────────────────────────────────────────

use crate::sftp::session::SftpSession;
use crate::sftp::types::file_info;
use std::path::{Path, PathBuf};
use xfer_core::types::join_path;
use xfer_core::{FileInfo, OperationResult};

impl SftpSession {
    // ── List directory ───────────────────────────────────────────────────────

    pub async fn list(&mut self, path: &str) -> OperationResult<Vec<FileInfo>> {
        let dir = path.to_string();
        let raw = self
            .run(&format!("readdir '{}'", path), move |h| h.sftp.readdir(Path::new(&dir)))
            .await?;

        Ok(raw
            .into_iter()
            .filter_map(|(entry_path, stat)| {
                let name = entry_path.file_name()?.to_string_lossy().to_string();
                if name == "." || name == ".." {
                    return None;
                }
                Some(file_info(&join_path(path, &name), &stat))
            })
            .collect())
    }

    // ── stat ─────────────────────────────────────────────────────────────────

    pub async fn stat(&mut self, path: &str) -> OperationResult<FileInfo> {
        let p = PathBuf::from(path);
        let stat = self.run(&format!("stat '{}'", path), move |h| h.sftp.stat(&p)).await?;
        Ok(file_info(path, &stat))
    }

    /// Resolve a path on the server (`.` gives the login directory).
    pub async fn realpath(&mut self, path: &str) -> OperationResult<String> {
        let p = PathBuf::from(path);
        let resolved = self.run("realpath", move |h| h.sftp.realpath(&p)).await?;
        Ok(resolved.to_string_lossy().to_string())
    }

    // ── Mutations ────────────────────────────────────────────────────────────

    pub async fn mkdir(&mut self, path: &str) -> OperationResult<()> {
        let p = PathBuf::from(path);
        self.run(&format!("mkdir '{}'", path), move |h| h.sftp.mkdir(&p, 0o755)).await
    }

    pub async fn rmdir(&mut self, path: &str) -> OperationResult<()> {
        let p = PathBuf::from(path);
        self.run(&format!("rmdir '{}'", path), move |h| h.sftp.rmdir(&p)).await
    }

    pub async fn unlink(&mut self, path: &str) -> OperationResult<()> {
        let p = PathBuf::from(path);
        self.run(&format!("unlink '{}'", path), move |h| h.sftp.unlink(&p)).await
    }

    pub async fn rename(&mut self, from: &str, to: &str) -> OperationResult<()> {
        let (src, dst) = (PathBuf::from(from), PathBuf::from(to));
        self.run(&format!("rename '{}' → '{}'", from, to), move |h| {
            h.sftp.rename(&src, &dst, None)
        })
        .await
    }
}
