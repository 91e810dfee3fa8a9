//! Session discovery: one subdirectory per session, named by its start time.

use std::io;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;

/// Directory-name and CSV timestamp format, e.g. `2021.12.30 21.00.05.123`
/// (fraction optional).
pub const SESSION_TIME_FORMAT: &str = "%Y.%m.%d %H.%M.%S%.f";

#[derive(Debug, Clone)]
pub struct SessionDir {
    pub started_at: NaiveDateTime,
    pub path: PathBuf,
}

/// List sessions under `dir`, oldest first. Entries that are not
/// directories or do not carry a session timestamp are ignored.
pub fn session_list(dir: &Path, after: Option<NaiveDateTime>) -> io::Result<Vec<SessionDir>> {
    let mut res = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name();
        let Some(started_at) = name.to_str().and_then(parse_session_stamp) else {
            continue;
        };
        if after.is_some_and(|after| started_at < after) {
            continue;
        }
        res.push(SessionDir {
            started_at,
            path: entry.path(),
        });
    }
    res.sort_by_key(|s| s.started_at);
    Ok(res)
}

pub fn parse_session_stamp(name: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(name, SESSION_TIME_FORMAT).ok()
}
