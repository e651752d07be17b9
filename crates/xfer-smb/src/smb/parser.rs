//! Parsers for smbclient's human-readable output.

use crate::smb::types::ShareInfo;
use chrono::{DateTime, NaiveDateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use xfer_core::types::join_path;
use xfer_core::FileInfo;

lazy_static! {
    //   name                      DA     1234  Mon Jan  6 10:00:00 2025
    static ref ENTRY: Regex = Regex::new(
        r"^  (.+?)\s+([A-Z]*)\s+(\d+)\s+([A-Z][a-z]{2}\s+[A-Z][a-z]{2}\s+\d{1,2}\s+\d{2}:\d{2}:\d{2}\s+\d{4})\s*$"
    )
    .expect("valid ls entry regex");
    static ref SHARE: Regex =
        Regex::new(r"^\s+(\S.*?)\s+(Disk|IPC|Printer)\s*(.*)$").expect("valid share regex");
    static ref SPACES: Regex = Regex::new(r"\s+").expect("valid whitespace regex");
}

/// One row of `ls` output, before it is placed in a directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LsEntry {
    pub name: String,
    pub attributes: String,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
}

impl LsEntry {
    pub fn is_directory(&self) -> bool {
        self.attributes.contains('D')
    }

    pub fn into_file_info(self, dir: &str) -> FileInfo {
        let is_directory = self.is_directory();
        FileInfo {
            path: join_path(dir, &self.name),
            size: if is_directory { 0 } else { self.size },
            is_directory,
            modified: self.modified,
            permissions: Some(self.attributes),
            name: self.name,
        }
    }
}

pub(crate) fn is_entry_line(line: &str) -> bool {
    ENTRY.is_match(line)
}

fn parse_time(raw: &str) -> Option<DateTime<Utc>> {
    let normalized = SPACES.replace_all(raw.trim(), " ");
    NaiveDateTime::parse_from_str(&normalized, "%a %b %d %H:%M:%S %Y")
        .ok()
        .map(|t| t.and_utc())
}

/// Entries of an `ls` listing, without `.` and `..` or the block footer.
pub fn parse_ls(output: &str) -> Vec<LsEntry> {
    output
        .lines()
        .filter_map(|line| {
            let caps = ENTRY.captures(line)?;
            let name = caps[1].to_string();
            if name == "." || name == ".." {
                return None;
            }
            Some(LsEntry {
                name,
                attributes: caps[2].to_string(),
                size: caps[3].parse().unwrap_or(0),
                modified: parse_time(&caps[4]),
            })
        })
        .collect()
}

/// Shares from `smbclient -L`, in listing order.
pub fn parse_shares(output: &str) -> Vec<ShareInfo> {
    let mut shares = Vec::new();
    let mut in_table = false;
    for line in output.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("---------") {
            in_table = true;
            continue;
        }
        if !in_table {
            continue;
        }
        if trimmed.is_empty() {
            break;
        }
        if let Some(caps) = SHARE.captures(line) {
            shares.push(ShareInfo {
                name: caps[1].to_string(),
                share_type: caps[2].to_string(),
                comment: caps[3].trim().to_string(),
            });
        }
    }
    shares
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = "  .                                   D        0  Mon Jan  6 10:00:00 2025
  ..                                  D        0  Mon Jan  6 10:00:00 2025
  holiday photos                      D        0  Sun Dec 29 18:12:44 2024
  clip.mp4                            A 73400320  Tue Jan 14 09:03:11 2025
  notes.txt                           AH     512  Wed Feb  5 23:59:59 2025

\t\t122683392 blocks of size 1024. 47316240 blocks available
";

    #[test]
    fn listing_skips_dot_entries_and_footer() {
        let entries = parse_ls(LISTING);
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["holiday photos", "clip.mp4", "notes.txt"]);
        assert!(entries[0].is_directory());
        assert_eq!(entries[1].size, 73_400_320);
        assert_eq!(
            entries[2].modified.map(|t| t.to_rfc3339()),
            Some("2025-02-05T23:59:59+00:00".to_string())
        );
    }

    #[test]
    fn directories_have_zero_size_in_file_info() {
        let info = parse_ls(LISTING).remove(0).into_file_info("/media");
        assert_eq!(info.path, "/media/holiday photos");
        assert!(info.is_directory);
        assert_eq!(info.size, 0);
    }

    #[test]
    fn share_table() {
        let out = "
\tSharename       Type      Comment
\t---------       ----      -------
\tmedia           Disk      Family media
\tbackups         Disk
\tIPC$            IPC       IPC Service (nas)

Reconnecting with SMB1 for workgroup listing.
";
        let shares = parse_shares(out);
        assert_eq!(shares.len(), 3);
        assert_eq!(shares[0].name, "media");
        assert_eq!(shares[0].comment, "Family media");
        assert_eq!(shares[1].comment, "");
        assert_eq!(shares[2].share_type, "IPC");
    }
}
