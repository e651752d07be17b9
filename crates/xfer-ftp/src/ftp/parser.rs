//! LIST / MLSD response parser.
//!
//! Supports three formats:
//! 1. **MLSD facts** (RFC 3659): `type=file;size=1234;modify=20260101120000; file.txt`
//! 2. **Unix-style** (`ls -l`): `-rwxr-xr-x 1 owner group 1234 Jan  1 12:00 file.txt`
//! 3. **Windows/IIS-style**: `01-01-26  12:00AM       1234 file.txt`
//!
//! Lines matching none of them (`total 12`, banners) are skipped.

use crate::ftp::types::{FtpEntry, FtpEntryKind};
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref UNIX_RE: Regex = Regex::new(
        r"(?x)
        ^([dlcbps-][rwxsStT-]{9})[@+.]?\s+   # permissions
        (\d+)\s+                            # link count
        (\S+)\s+                            # owner
        (\S+)\s+                            # group
        (\d+)\s+                            # size
        (\w{3}\s+\d{1,2}\s+[\d:]+)\s         # date
        (.+)$                               # name (possibly with -> target)
        ",
    )
    .expect("static unix listing pattern");
    static ref WINDOWS_RE: Regex = Regex::new(
        r"(?x)
        ^(\d{2}-\d{2}-\d{2,4})\s+           # date
        (\d{1,2}:\d{2}\s?(?:AM|PM)?)\s+     # time
        (<DIR>|\d+)\s+                      # size or <DIR>
        (.+)$                               # name
        ",
    )
    .expect("static windows listing pattern");
}

/// Parse a full LIST or MLSD body, dropping `.` and `..`.
pub fn parse_listing(raw: &str) -> Vec<FtpEntry> {
    raw.lines()
        .map(|l| l.trim_end_matches('\r'))
        .filter(|l| !l.trim().is_empty())
        .filter_map(parse_line)
        .filter(|e| e.name != "." && e.name != "..")
        .collect()
}

/// Parse a single listing line.
pub fn parse_line(line: &str) -> Option<FtpEntry> {
    if line.contains(';') && line.contains('=') {
        if let Some(e) = parse_mlsd(line) {
            return Some(e);
        }
    }
    parse_unix(line).or_else(|| parse_windows(line))
}

// ─── MLSD ────────────────────────────────────────────────────────────

/// `fact1=val1;fact2=val2; filename`
fn parse_mlsd(line: &str) -> Option<FtpEntry> {
    let line = line.trim_start();
    let (facts_str, name) = line.split_once(' ')?;
    if name.is_empty() {
        return None;
    }

    let mut kind = FtpEntryKind::Unknown;
    let mut size = 0;
    let mut modified = None;
    let mut permissions = None;

    for segment in facts_str.split(';') {
        let Some((key, value)) = segment.split_once('=') else {
            continue;
        };
        match key.to_ascii_lowercase().as_str() {
            "type" => {
                kind = match value.to_ascii_lowercase().as_str() {
                    "dir" | "cdir" | "pdir" => FtpEntryKind::Directory,
                    "file" => FtpEntryKind::File,
                    "os.unix=symlink" | "os.unix=slink" => FtpEntryKind::Symlink,
                    _ => FtpEntryKind::Unknown,
                }
            }
            "size" | "sizd" => size = value.parse().unwrap_or(0),
            "modify" => modified = parse_mlsd_time(value),
            "unix.mode" | "perm" if permissions.is_none() => permissions = Some(value.to_string()),
            _ => {}
        }
    }

    // `cdir`/`pdir` entries describe the listed directory and its parent.
    if facts_str.to_ascii_lowercase().contains("type=cdir") || facts_str.to_ascii_lowercase().contains("type=pdir") {
        return Some(FtpEntry {
            name: ".".into(),
            kind,
            size,
            modified,
            permissions,
            link_target: None,
        });
    }

    Some(FtpEntry {
        name: name.to_string(),
        kind,
        size,
        modified,
        permissions,
        link_target: None,
    })
}

/// `YYYYMMDDHHmmSS[.fraction]`, always UTC.
pub fn parse_mlsd_time(s: &str) -> Option<DateTime<Utc>> {
    let base = s.get(..14)?;
    NaiveDateTime::parse_from_str(base, "%Y%m%d%H%M%S")
        .ok()
        .map(|dt| Utc.from_utc_datetime(&dt))
}

// ─── Unix ────────────────────────────────────────────────────────────

/// ```text
/// drwxr-xr-x   2 user group  4096 Jan  1 12:00 dirname
/// -rw-r--r--   1 user group  1234 Jan  1  2025 file.txt
/// lrwxrwxrwx   1 user group    42 Jan  1 12:00 link -> target
/// ```
fn parse_unix(line: &str) -> Option<FtpEntry> {
    let caps = UNIX_RE.captures(line)?;

    let perms = caps.get(1)?.as_str();
    let size = caps.get(5)?.as_str().parse::<u64>().unwrap_or(0);
    let date_str = caps.get(6)?.as_str();
    // The date group swallows one separator; the rest may be alignment.
    let name_raw = caps.get(7)?.as_str().trim_start();

    let kind = match perms.as_bytes().first() {
        Some(b'd') => FtpEntryKind::Directory,
        Some(b'l') => FtpEntryKind::Symlink,
        Some(b'-') => FtpEntryKind::File,
        _ => FtpEntryKind::Unknown,
    };

    let (name, link_target) = match (kind, name_raw.find(" -> ")) {
        (FtpEntryKind::Symlink, Some(pos)) => (
            name_raw[..pos].to_string(),
            Some(name_raw[pos + 4..].to_string()),
        ),
        _ => (name_raw.to_string(), None),
    };

    Some(FtpEntry {
        name,
        kind,
        size,
        modified: parse_unix_date(date_str, Utc::now()),
        permissions: Some(perms.to_string()),
        link_target,
    })
}

/// "Jan  1 12:00" (within the last year) or "Jan  1  2025".
fn parse_unix_date(s: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let normalised = s.split_whitespace().collect::<Vec<_>>().join(" ");

    if normalised.contains(':') {
        let dt = NaiveDateTime::parse_from_str(&format!("{} {}", now.year(), normalised), "%Y %b %d %H:%M").ok()?;
        let dt = Utc.from_utc_datetime(&dt);
        // A timestamp "in the future" belongs to last year.
        if dt > now + chrono::Duration::days(1) {
            let prev = NaiveDateTime::parse_from_str(&format!("{} {}", now.year() - 1, normalised), "%Y %b %d %H:%M").ok()?;
            return Some(Utc.from_utc_datetime(&prev));
        }
        return Some(dt);
    }

    let date = NaiveDate::parse_from_str(&normalised, "%b %d %Y").ok()?;
    let dt = date.and_time(NaiveTime::from_hms_opt(0, 0, 0)?);
    Some(Utc.from_utc_datetime(&dt))
}

// ─── Windows ─────────────────────────────────────────────────────────

/// ```text
/// 01-01-26  12:00AM       1234 file.txt
/// 01-01-26  12:00PM      <DIR> Directory Name
/// ```
fn parse_windows(line: &str) -> Option<FtpEntry> {
    let caps = WINDOWS_RE.captures(line)?;

    let date_str = caps.get(1)?.as_str();
    let time_str = caps.get(2)?.as_str().replace(' ', "");
    let size_or_dir = caps.get(3)?.as_str();
    let name = caps.get(4)?.as_str().to_string();

    let (kind, size) = if size_or_dir == "<DIR>" {
        (FtpEntryKind::Directory, 0)
    } else {
        (FtpEntryKind::File, size_or_dir.parse::<u64>().unwrap_or(0))
    };

    Some(FtpEntry {
        name,
        kind,
        size,
        modified: parse_windows_date(date_str, &time_str),
        permissions: None,
        link_target: None,
    })
}

fn parse_windows_date(date: &str, time: &str) -> Option<DateTime<Utc>> {
    let combined = format!("{} {}", date, time);
    ["%m-%d-%y %I:%M%p", "%m-%d-%y %H:%M", "%m-%d-%Y %I:%M%p", "%m-%d-%Y %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(&combined, fmt).ok())
        .map(|dt| Utc.from_utc_datetime(&dt))
}
