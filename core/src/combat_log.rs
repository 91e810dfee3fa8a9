//! Kill extraction from the combat log.
//!
//! The combat log has no level boundaries of its own; the scanner owns the
//! stream across levels and is driven one level at a time, bounded by the
//! timestamp of the next level's start marker taken from the game log. A
//! line whose time exceeds the bound is pushed back into a one-line peek
//! slot so the next level's scan starts with it.

use std::io::BufRead;

use chrono::NaiveTime;
use memchr::memmem;
use regex::Regex;
use thiserror::Error;

use crate::game_log::line_timestamp;

/// `21:08:54.870  CMBT   | Killed NikSvir	 Ship_Race2_S_T3_Premium|0000002708;	 killer ZiroTwo|0000002012 Weapon_Railgun_Sniper_T4_Rel`
const KILLED_PATTERN: &str = r"^(?P<time>\S+)\s+CMBT\s+\|\s+Killed\s+(?P<killed_name>\S+)\s+\S+\|\d+;\s+killer\s+(?P<killer_name>\S+)\|\d+\s+(?P<kill_with>\S*)\s*$";

/// One scored kill. Created only for lines where the killer is the tracked
/// player and the victim has a resolvable award.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeathRecord {
    /// 1-based line number, counted from the start of the combat log.
    pub line_num: usize,
    pub original: String,
    pub time: String,
    pub killed: String,
    pub killer: String,
    pub kill_with: String,
    pub award: i32,
}

/// Result of scanning one level's window of the combat log.
#[derive(Debug, Default)]
pub struct CombatScan {
    /// Records with award > 0, in line order.
    pub awards: Vec<DeathRecord>,
    /// Records with award <= 0, in line order.
    pub punishments: Vec<DeathRecord>,
    /// The underlying stream is exhausted; this was the last level.
    pub end_of_log: bool,
}

#[derive(Debug, Error)]
pub enum CombatLogError {
    #[error("read combat log: {0}")]
    Io(#[from] std::io::Error),
}

/// Forward-only scanner over one session's combat log.
pub struct CombatLogScanner<R> {
    rd: R,
    re: Regex,
    line_num: usize,
    /// Line read past the current level's bound, with its line number.
    peeked: Option<(usize, String)>,
}

impl<R: BufRead> CombatLogScanner<R> {
    pub fn new(rd: R) -> Self {
        Self {
            rd,
            // The pattern is a compile-time constant; it cannot fail to build.
            re: Regex::new(KILLED_PATTERN).unwrap(),
            line_num: 0,
            peeked: None,
        }
    }

    /// Scan kills credited to `tracked` up to `until` (exclusive bound on the
    /// line timestamp), or to end-of-stream when `until` is `None`.
    ///
    /// `score` maps a victim name to an award; `None` means the kill is not
    /// scored and the line is skipped entirely.
    pub fn scan_level(
        &mut self,
        tracked: &str,
        until: Option<NaiveTime>,
        mut score: impl FnMut(&str) -> Option<i32>,
    ) -> Result<CombatScan, CombatLogError> {
        let needle = format!("killer {tracked}");
        let finder = memmem::Finder::new(needle.as_bytes());

        let mut scan = CombatScan::default();
        loop {
            let Some((line_num, line)) = self.next_line()? else {
                scan.end_of_log = true;
                return Ok(scan);
            };

            if let (Some(until), Some(time)) = (until, line_timestamp(&line)) {
                if time > until {
                    // Belongs to the next level; keep it for the next scan.
                    self.peeked = Some((line_num, line));
                    return Ok(scan);
                }
            }

            // Cheap substring pre-filter before the regex.
            if finder.find(line.as_bytes()).is_none() {
                continue;
            }
            let Some(caps) = self.re.captures(line.trim_end()) else {
                // Not a kill line after all.
                continue;
            };
            let (Some(time), Some(killed), Some(killer), Some(kill_with)) = (
                caps.name("time"),
                caps.name("killed_name"),
                caps.name("killer_name"),
                caps.name("kill_with"),
            ) else {
                continue;
            };

            // The pre-filter matches substrings; the capture is exact.
            if killer.as_str() != tracked {
                continue;
            }
            let Some(award) = score(killed.as_str()) else {
                continue;
            };

            let record = DeathRecord {
                line_num,
                original: line.trim_end().to_string(),
                time: time.as_str().to_string(),
                killed: killed.as_str().to_string(),
                killer: killer.as_str().to_string(),
                kill_with: kill_with.as_str().to_string(),
                award,
            };
            if award > 0 {
                scan.awards.push(record);
            } else {
                scan.punishments.push(record);
            }
        }
    }

    fn next_line(&mut self) -> Result<Option<(usize, String)>, CombatLogError> {
        if let Some(peeked) = self.peeked.take() {
            return Ok(Some(peeked));
        }
        let mut buf = Vec::new();
        if self.rd.read_until(b'\n', &mut buf)? == 0 {
            return Ok(None);
        }
        self.line_num += 1;
        Ok(Some((self.line_num, String::from_utf8_lossy(&buf).into_owned())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn scanner(log: &str) -> CombatLogScanner<Cursor<Vec<u8>>> {
        CombatLogScanner::new(Cursor::new(log.as_bytes().to_vec()))
    }

    const KILL_LINES: &[(&str, &str)] = &[
        (
            "21:08:54.870  CMBT   | Killed NikSvir\t Ship_Race2_S_T3_Premium|0000002708;\t killer ZiroTwo|0000002012 Weapon_Railgun_Sniper_T4_Rel",
            "NikSvir",
        ),
        (
            "21:11:39.922  CMBT   | Killed NikSvir\t Ship_Race2_S_T3_Premium|0000125243;\t killer ZiroTwo|0000128312 SpaceMissile_Torpedo_T3_Mk3",
            "NikSvir",
        ),
        (
            "20:40:23.253  CMBT   | Killed HoWHoW\t Ship_Race1_M_T5_Faction2|0000003396;\t killer ZiroTwo|0000000374 Module_GuidedMissile_T4_Base",
            "HoWHoW",
        ),
    ];

    #[test]
    fn regex_matches_known_kill_lines() {
        let re = Regex::new(KILLED_PATTERN).unwrap();
        for (line, victim) in KILL_LINES {
            let caps = re.captures(line).unwrap_or_else(|| panic!("no match: {line}"));
            assert_eq!(&caps["killed_name"], *victim);
            assert_eq!(&caps["killer_name"], "ZiroTwo");
        }
    }

    #[test]
    fn scores_kills_and_splits_by_sign() {
        let log = format!("{}\nnoise\n{}\n", KILL_LINES[0].0, KILL_LINES[2].0);
        let mut it = scanner(&log);
        let scan = it
            .scan_level("ZiroTwo", None, |victim| match victim {
                "NikSvir" => Some(3),
                "HoWHoW" => Some(-100),
                _ => None,
            })
            .unwrap();

        assert!(scan.end_of_log);
        assert_eq!(scan.awards.len(), 1);
        assert_eq!(scan.awards[0].killed, "NikSvir");
        assert_eq!(scan.awards[0].line_num, 1);
        assert_eq!(scan.awards[0].kill_with, "Weapon_Railgun_Sniper_T4_Rel");
        assert_eq!(scan.punishments.len(), 1);
        assert_eq!(scan.punishments[0].award, -100);
        assert_eq!(scan.punishments[0].line_num, 3);
    }

    #[test]
    fn zero_award_counts_as_punishment() {
        let mut it = scanner(KILL_LINES[0].0);
        let scan = it.scan_level("ZiroTwo", None, |_| Some(0)).unwrap();
        assert!(scan.awards.is_empty());
        assert_eq!(scan.punishments.len(), 1);
        assert_eq!(scan.punishments[0].award, 0);
    }

    #[test]
    fn unresolved_victim_is_skipped() {
        let mut it = scanner(KILL_LINES[0].0);
        let scan = it.scan_level("ZiroTwo", None, |_| None).unwrap();
        assert!(scan.awards.is_empty() && scan.punishments.is_empty());
        assert!(scan.end_of_log);
    }

    #[test]
    fn nickname_substring_does_not_count() {
        // The pre-filter passes, the exact capture check must reject.
        let line = "21:08:54.870  CMBT   | Killed X\t Ship_A|0001;\t killer ZiroTwoFan|0002 Weapon_Foo";
        let mut it = scanner(line);
        let scan = it.scan_level("ZiroTwo", None, |_| Some(1)).unwrap();
        assert!(scan.awards.is_empty());
    }

    #[test]
    fn time_bound_splits_levels() {
        let log = format!("{}\n{}\n{}\n", KILL_LINES[2].0, KILL_LINES[0].0, KILL_LINES[1].0);
        let mut it = scanner(&log);

        // First level ends at 21:00; only the 20:40 kill belongs to it.
        let bound = NaiveTime::from_hms_opt(21, 0, 0).unwrap();
        let first = it
            .scan_level("ZiroTwo", Some(bound), |_| Some(1))
            .unwrap();
        assert!(!first.end_of_log);
        assert_eq!(first.awards.len(), 1);
        assert_eq!(first.awards[0].killed, "HoWHoW");

        // The pushed-back 21:08 line must open the second level.
        let second = it.scan_level("ZiroTwo", None, |_| Some(1)).unwrap();
        assert!(second.end_of_log);
        assert_eq!(second.awards.len(), 2);
        assert_eq!(second.awards[0].line_num, 2);
        assert_eq!(second.awards[1].line_num, 3);
    }

    #[test]
    fn empty_log_reports_end_of_log() {
        let mut it = scanner("");
        let scan = it.scan_level("ZiroTwo", None, |_| Some(1)).unwrap();
        assert!(scan.end_of_log);
        assert!(scan.awards.is_empty());
    }
}
