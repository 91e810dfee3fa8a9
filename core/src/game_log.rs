//! Level segmentation and roster extraction from the game log.
//!
//! The game log is the only stream that carries level boundaries. Each
//! `====== starting level:` marker both opens a new level and closes the
//! previous one; roster entries (`ADD_PLAYER` records) between two markers
//! belong to the level opened by the first.

use std::collections::HashMap;
use std::io::BufRead;

use chrono::NaiveTime;
use thiserror::Error;

/// Substring that identifies a level-start marker line.
///
/// `12:51:09.342         | ====== starting level: 'levels/area1/s1338_pandora_anomaly' KingOfTheHill client =====`
pub const LEVEL_START_MARKER: &str = "====== starting level:";

const ADD_PLAYER_TOKEN: &str = "ADD_PLAYER";
const STATUS_ONLINE: i64 = 4;
const STATUS_KEY: &str = "status";
const TEAM_KEY: &str = "team";
const GROUP_KEY: &str = "group";

/// One roster entry, immutable once extracted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    pub name: String,
    pub id: u64,
    /// Clan tag from the roster line, may be empty.
    pub clan_tag: String,
    /// Whether the player was in a group when the level started.
    pub in_group: bool,
}

/// Roster of one level: team id -> players, in log order.
#[derive(Debug, Clone, Default)]
pub struct LevelRoster {
    /// Quoted level path from the marker line, when present.
    pub map_name: Option<String>,
    /// Team of the tracked player. Established only by an ADD_PLAYER record
    /// carrying the tracked nickname; last write wins.
    pub your_team: i64,
    pub players: HashMap<i64, Vec<Player>>,
    /// Timestamp of this level's start marker.
    pub started_at: Option<NaiveTime>,
    /// Timestamp of the next level's start marker; `None` for the last level.
    pub ends_at: Option<NaiveTime>,
}

impl LevelRoster {
    /// All players not on the tracked player's team, keyed by name.
    pub fn enemies(&self) -> HashMap<String, Player> {
        let mut res = HashMap::new();
        for (&team, players) in &self.players {
            if team == self.your_team {
                continue;
            }
            for p in players {
                res.insert(p.name.clone(), p.clone());
            }
        }
        res
    }
}

/// Outcome of one [`GameLogScanner::scan_next_level`] call.
#[derive(Debug)]
pub enum LevelScan {
    /// A level terminated by the next level's start marker.
    Level(LevelRoster),
    /// End-of-stream hit while accumulating; the roster is still returned.
    LastLevel(LevelRoster),
    /// The stream is exhausted with nothing accumulated.
    EndOfLog,
}

#[derive(Debug, Error)]
pub enum GameLogError {
    #[error("read game log: {0}")]
    Io(#[from] std::io::Error),
    /// ADD_PLAYER record with a missing or unbalanced parenthesized group.
    #[error("malformed ADD_PLAYER record: {0:?}")]
    MalformedRecord(String),
    #[error("parse {field} in ADD_PLAYER record: {value:?}")]
    BadField { field: &'static str, value: String },
}

/// Where the scanner is relative to level boundaries.
enum ScanState {
    /// Before the first marker, discarding preamble lines.
    Seeking,
    /// Between two markers, accumulating a roster.
    InLevel,
}

/// Stateful, forward-only scanner over the game log. Not restartable.
pub struct GameLogScanner<R> {
    rd: R,
    nickname: String,
    state: ScanState,
    /// Marker info consumed while finishing the previous level; seeds the
    /// next level so the marker line is never re-processed as content.
    pending_start: Option<(Option<NaiveTime>, Option<String>)>,
}

impl<R: BufRead> GameLogScanner<R> {
    pub fn new(nickname: impl Into<String>, rd: R) -> Self {
        Self {
            rd,
            nickname: nickname.into(),
            state: ScanState::Seeking,
            pending_start: None,
        }
    }

    /// Scan forward to the end of the next level and return its roster.
    pub fn scan_next_level(&mut self) -> Result<LevelScan, GameLogError> {
        let mut roster = LevelRoster::default();

        if let Some((started_at, map_name)) = self.pending_start.take() {
            roster.started_at = started_at;
            roster.map_name = map_name;
            self.state = ScanState::InLevel;
        }

        let mut buf = Vec::new();
        loop {
            buf.clear();
            if self.rd.read_until(b'\n', &mut buf)? == 0 {
                return match self.state {
                    ScanState::InLevel => {
                        self.state = ScanState::Seeking;
                        Ok(LevelScan::LastLevel(roster))
                    }
                    ScanState::Seeking => Ok(LevelScan::EndOfLog),
                };
            }
            let line = String::from_utf8_lossy(&buf);
            let is_marker = line.contains(LEVEL_START_MARKER);

            match self.state {
                ScanState::Seeking => {
                    if is_marker {
                        roster.started_at = line_timestamp(&line);
                        roster.map_name = marker_map_name(&line);
                        self.state = ScanState::InLevel;
                    }
                    // Preamble before the first marker is discarded.
                }
                ScanState::InLevel => {
                    if is_marker {
                        // The marker belongs to the next level; the finished
                        // roster ends where that level starts.
                        let next_start = line_timestamp(&line);
                        roster.ends_at = next_start;
                        self.pending_start = Some((next_start, marker_map_name(&line)));
                        return Ok(LevelScan::Level(roster));
                    }
                    self.process_line(&mut roster, &line)?;
                }
            }
        }
    }

    /// Fold one in-level line into the roster. Non-ADD_PLAYER lines are
    /// ignored; structurally broken ADD_PLAYER records are fatal.
    ///
    /// `17:27:50.022         | client: ADD_PLAYER 9 (BNV [CSA], 1308282) status 4 team 2 group 4778580`
    fn process_line(&self, roster: &mut LevelRoster, line: &str) -> Result<(), GameLogError> {
        let Some((_, record)) = line.split_once(ADD_PLAYER_TOKEN) else {
            return Ok(());
        };

        let (paren_start, paren_end) = match (record.find('('), record.find(')')) {
            (Some(s), Some(e)) if s < e => (s, e),
            _ => return Err(GameLogError::MalformedRecord(line.trim_end().to_string())),
        };

        let mut player = parse_player_group(&record[paren_start + 1..paren_end])?;
        let fields = parse_key_values(&record[paren_end + 1..])?;

        if player.name == self.nickname {
            roster.your_team = fields.team;
        }
        if fields.group != 0 {
            player.in_group = true;
        }
        if fields.status != STATUS_ONLINE {
            // Offline entries never make the roster.
            return Ok(());
        }

        roster.players.entry(fields.team).or_default().push(player);
        Ok(())
    }
}

#[derive(Default)]
struct RecordFields {
    status: i64,
    team: i64,
    group: i64,
}

/// Parse the parenthesized `<name> [<tag>], <id>` group.
fn parse_player_group(group: &str) -> Result<Player, GameLogError> {
    let fields: Vec<&str> = group.split_whitespace().collect();
    let [name, tag, id] = fields[..] else {
        return Err(GameLogError::MalformedRecord(group.to_string()));
    };

    let clan_tag = tag
        .trim_start_matches('[')
        .trim_end_matches(',')
        .trim_end_matches(']');
    let id: u64 = id.parse().map_err(|_| GameLogError::BadField {
        field: "player id",
        value: id.to_string(),
    })?;

    Ok(Player {
        name: name.to_string(),
        id,
        clan_tag: clan_tag.to_string(),
        in_group: false,
    })
}

/// Scan the space-separated `status <s> team <t> group <g>` tokens, any order.
fn parse_key_values(rest: &str) -> Result<RecordFields, GameLogError> {
    let mut fields = RecordFields::default();
    let mut tokens = rest.split_whitespace();

    while let Some(key) = tokens.next() {
        let slot = match key {
            STATUS_KEY => &mut fields.status,
            TEAM_KEY => &mut fields.team,
            GROUP_KEY => &mut fields.group,
            _ => {
                // Unknown keys are skipped together with their value.
                tokens.next();
                continue;
            }
        };
        let value = tokens.next().ok_or(GameLogError::BadField {
            field: "record key",
            value: key.to_string(),
        })?;
        *slot = value.parse().map_err(|_| GameLogError::BadField {
            field: "record value",
            value: value.to_string(),
        })?;
    }

    Ok(fields)
}

/// Parse the leading `HH:MM:SS.mmm` token of a log line, if it has one.
pub(crate) fn line_timestamp(line: &str) -> Option<NaiveTime> {
    let token = line.split_whitespace().next()?;
    NaiveTime::parse_from_str(token, "%H:%M:%S%.3f").ok()
}

/// Extract the single-quoted level path from a marker line.
fn marker_map_name(line: &str) -> Option<String> {
    let rest = line.split_once(LEVEL_START_MARKER)?.1;
    let rest = rest.split_once('\'')?.1;
    Some(rest.split_once('\'')?.0.to_string())
}
