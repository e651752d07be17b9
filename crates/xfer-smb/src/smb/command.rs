//! smbclient process runner.
//!
//! Every call is one `smbclient` process. Credentials travel in the `-A`
//! file, never in argv, and output is scanned for `NT_STATUS_*` because
//! smbclient exits 0 after a failed `-c` command more often than not.

use crate::smb::error::{find_status, SmbError};
use crate::smb::parser::is_entry_line;
use crate::smb::types::SmbSessionConfig;
use log::{debug, trace};
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use tokio::process::{Child, Command};

/// What the process is asked to do.
#[derive(Debug, Clone, Copy)]
pub enum Invocation<'a> {
    /// `smbclient //host/share -c "<command>"`
    Share { share: &'a str, command: &'a str },
    /// `smbclient -L //host`
    ListShares,
}

fn build(config: &SmbSessionConfig, auth_file: &Path, invocation: Invocation<'_>) -> Command {
    let mut cmd = Command::new(&config.smbclient_path);
    match invocation {
        Invocation::Share { share, .. } => {
            cmd.arg(config.service(share));
        }
        Invocation::ListShares => {
            cmd.arg("-L").arg(format!("//{}", config.host));
        }
    }
    cmd.arg("-A").arg(auth_file).arg("-p").arg(config.port.to_string());
    if let Some(wg) = &config.workgroup {
        cmd.arg("-W").arg(wg);
    }
    if let Some(proto) = &config.protocol_max {
        cmd.arg("-m").arg(proto);
    }
    if config.password.is_empty() {
        cmd.arg("-N");
    }
    if let Invocation::Share { command, .. } = invocation {
        cmd.arg("-c").arg(command);
    }
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .env("LC_ALL", "C")
        .kill_on_drop(true);
    cmd
}

/// Start smbclient without waiting for it.
pub(crate) fn spawn(
    config: &SmbSessionConfig,
    auth_file: &Path,
    invocation: Invocation<'_>,
) -> Result<Child, SmbError> {
    match invocation {
        Invocation::Share { share, command } => debug!("smbclient {} -c '{}'", config.service(share), command),
        Invocation::ListShares => debug!("smbclient -L //{}", config.host),
    }
    build(config, auth_file, invocation).spawn().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            SmbError::Missing(config.smbclient_path.clone())
        } else {
            SmbError::Io(e)
        }
    })
}

/// Run to completion within the command timeout and return stdout.
pub(crate) async fn run(
    config: &SmbSessionConfig,
    auth_file: &Path,
    invocation: Invocation<'_>,
) -> Result<String, SmbError> {
    let child = spawn(config, auth_file, invocation)?;
    let output = tokio::time::timeout(config.command_timeout, child.wait_with_output())
        .await
        .map_err(|_| SmbError::Timeout(config.command_timeout))??;
    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    trace!("smbclient stdout ({} bytes): {}", stdout.len(), preview(&stdout, 300));
    check(output.status, &stdout, &stderr)?;
    Ok(stdout)
}

/// At most `max` characters of `s`, cut on a char boundary.
fn preview(s: &str, max: usize) -> &str {
    s.char_indices().nth(max).map_or(s, |(i, _)| &s[..i])
}

/// Turn a finished process into `Ok` or the status it reported.
pub(crate) fn check(status: ExitStatus, stdout: &str, stderr: &str) -> Result<(), SmbError> {
    // Listing lines are names chosen by users; never read a status out of them.
    let reported = stdout
        .lines()
        .chain(stderr.lines())
        .filter(|l| !is_entry_line(l))
        .find_map(|l| find_status(l).map(|s| (s.to_string(), l.trim().to_string())));
    if let Some((status, detail)) = reported {
        return Err(SmbError::Status { status, detail });
    }
    if !status.success() {
        let detail = if stderr.trim().is_empty() { stdout } else { stderr };
        return Err(SmbError::Exit {
            code: status.code().unwrap_or(-1),
            detail: detail.trim().to_string(),
        });
    }
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::process::ExitStatusExt;

    #[test]
    fn status_wins_over_a_clean_exit() {
        let err = check(ExitStatus::from_raw(0), "", "NT_STATUS_OBJECT_NAME_NOT_FOUND listing \\x\n").unwrap_err();
        assert!(matches!(err, SmbError::Status { ref status, .. } if status == "NT_STATUS_OBJECT_NAME_NOT_FOUND"));
    }

    #[test]
    fn file_names_are_not_statuses() {
        let out = "  NT_STATUS_NOTES.txt                     A      120  Mon Jan  6 10:00:00 2025\n";
        assert!(check(ExitStatus::from_raw(0), out, "").is_ok());
    }

    #[test]
    fn failed_exit_without_status() {
        let err = check(ExitStatus::from_raw(1 << 8), "", "bad option\n").unwrap_err();
        assert!(matches!(err, SmbError::Exit { code: 1, .. }));
    }

    #[test]
    fn preview_cuts_between_characters() {
        let out = format!("{}é tail", "x".repeat(299));
        assert_eq!(preview(&out, 300), format!("{}é", "x".repeat(299)));
        assert_eq!(preview("née", 300), "née");
        assert_eq!(preview("日本語", 2), "日本");
    }

    #[test]
    fn credentials_stay_out_of_argv() {
        let creds = xfer_core::Credentials::password("alice", "hunter2");
        let config = SmbSessionConfig::new("nas", 445, &creds, &xfer_core::TransferConfig::default());
        let cmd = build(
            &config,
            Path::new("/tmp/auth"),
            Invocation::Share { share: "media", command: "ls" },
        );
        let args: Vec<String> = cmd.as_std().get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(args, ["//nas/media", "-A", "/tmp/auth", "-p", "445", "-c", "ls"]);
    }
}
