//! Parser for the sectioned rules text.
//!
//! ```text
//! === PLAYERS ===
//! +1
//! lafan4ik
//! OldNick, CurrentNick
//! -100
//! fyringsved
//! === CORPORATIONS ===
//! +5 HPrim
//! Feeling of Greatness [4CB]
//! ```
//!
//! An integer line sets the current score for the entries that follow, until
//! the next integer line or section header. A score may carry its first
//! entry on the same line (`+5 HPrim`). In the players section a
//! comma-separated line is the rename history of one pilot, oldest first;
//! every name gets the score and the older names become resolver aliases of
//! the last one.

use std::io::BufRead;

use super::RulesError;

const PLAYERS_HEADER: &str = "=== PLAYERS ===";
const CORPORATIONS_HEADER: &str = "=== CORPORATIONS ===";
const SCORE_DELIM: &str = "===";

/// Parsed rule tables plus the alias pairs to register with the resolver.
#[derive(Debug, Default)]
pub struct RuleTables {
    pub awards: Vec<(String, i32)>,
    pub punishments: Vec<(String, i32)>,
    pub clan_tags: Vec<(String, i32)>,
    pub clan_names: Vec<(String, i32)>,
    /// `(old_name, current_name)` pairs, in file order.
    pub aliases: Vec<(String, String)>,
}

#[derive(Clone, Copy, PartialEq)]
enum Section {
    None,
    Players,
    Corporations,
}

pub fn parse_rules(rd: impl BufRead) -> Result<RuleTables, RulesError> {
    let mut tables = RuleTables::default();
    let mut section = Section::None;
    let mut need_score = true;
    let mut score = 0i32;

    for line in rd.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match line {
            PLAYERS_HEADER => {
                section = Section::Players;
                need_score = true;
                continue;
            }
            CORPORATIONS_HEADER => {
                section = Section::Corporations;
                need_score = true;
                continue;
            }
            SCORE_DELIM => {
                need_score = true;
                continue;
            }
            _ => {}
        }

        // A score line may carry its first entry inline.
        if let Some((new_score, entry)) = split_score_prefix(line) {
            score = new_score.map_err(|source| RulesError::BadScore {
                line: line.to_string(),
                source,
            })?;
            need_score = false;
            if let Some(entry) = entry {
                register(&mut tables, section, entry, score);
            }
            continue;
        }
        if need_score {
            // The first line of a group must set the score.
            if let Err(source) = line.parse::<i32>() {
                return Err(RulesError::BadScore {
                    line: line.to_string(),
                    source,
                });
            }
        }

        register(&mut tables, section, line, score);
    }

    Ok(tables)
}

/// Recognize `<int>` and `<int> <entry>` lines. Returns `None` for plain
/// entry lines (first token not numeric).
#[allow(clippy::type_complexity)]
fn split_score_prefix(
    line: &str,
) -> Option<(Result<i32, std::num::ParseIntError>, Option<&str>)> {
    let (head, rest) = match line.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (line, ""),
    };
    // Only treat the token as a score if it looks numeric; otherwise it is
    // an entry name.
    if !head.starts_with(['+', '-']) && !head.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    if head.len() > 1 && !head[1..].chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let entry = (!rest.is_empty()).then_some(rest);
    Some((head.parse(), entry))
}

fn register(tables: &mut RuleTables, section: Section, entry: &str, score: i32) {
    match section {
        Section::Players => register_players(tables, entry, score),
        Section::Corporations => register_corporation(tables, entry, score),
        Section::None => {}
    }
}

fn register_players(tables: &mut RuleTables, entry: &str, score: i32) {
    let names: Vec<&str> = entry.split(',').map(str::trim).collect();
    let target = if score > 0 {
        &mut tables.awards
    } else {
        &mut tables.punishments
    };
    for name in &names {
        target.push((name.to_string(), score));
    }

    let current = names[names.len() - 1];
    for old in &names[..names.len() - 1] {
        tables.aliases.push((old.to_string(), current.to_string()));
    }
}

/// `Name [TAG]` fills both clan tables; a bracketless entry registers the
/// whole entry as both name and tag.
fn register_corporation(tables: &mut RuleTables, entry: &str, score: i32) {
    match split_corporation(entry) {
        (name, Some(tag)) => {
            if !tag.is_empty() {
                tables.clan_tags.push((tag.to_string(), score));
            }
            tables.clan_names.push((name.to_string(), score));
        }
        (name, None) => {
            tables.clan_tags.push((name.to_string(), score));
            tables.clan_names.push((name.to_string(), score));
        }
    }
}

fn split_corporation(entry: &str) -> (&str, Option<&str>) {
    let Some(tag_begin) = entry.find('[') else {
        return (entry, None);
    };
    let Some(tag_end) = entry.rfind(']') else {
        return (entry, None);
    };
    if tag_end < tag_begin {
        return (entry, None);
    }
    (entry[..tag_begin].trim(), Some(&entry[tag_begin + 1..tag_end]))
}
