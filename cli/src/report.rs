//! CSV rendering of level reports.

use std::io::Write;

use bounty_core::LevelReport;
use chrono::NaiveDateTime;

use crate::discovery::SESSION_TIME_FORMAT;

pub const HEADER: [&str; 6] = [
    "session_start",
    "killed_at",
    "line_in_log",
    "killed",
    "clan",
    "score",
];

/// Append one row per scored kill of `level`.
pub fn write_level<W: Write>(
    w: &mut csv::Writer<W>,
    started_at: NaiveDateTime,
    level: &LevelReport,
) -> csv::Result<()> {
    for record in &level.score {
        w.write_record([
            started_at.format(SESSION_TIME_FORMAT).to_string(),
            record.time.clone(),
            record.line_num.to_string(),
            record.killed.clone(),
            level.enemy_clan(&record.killed).to_string(),
            record.award.to_string(),
        ])?;
    }
    Ok(())
}
