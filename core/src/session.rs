//! Orchestration of one session: the game log drives level boundaries, the
//! combat log is scanned inside each level's time window, and completed
//! level reports are handed off one at a time to the consumer.

use std::collections::HashMap;
use std::io::BufRead;

use thiserror::Error;
use tokio::sync::{mpsc, watch};

use crate::combat_log::{CombatLogError, CombatLogScanner, DeathRecord};
use crate::game_log::{GameLogError, GameLogScanner, LevelScan, Player};
use crate::resolver::ClanResolver;
use crate::rules::RuleSet;

/// An enemy as shown in the output: roster data plus a display clan
/// (roster tag, or the resolved clan name when the tag is empty).
#[derive(Debug, Clone)]
pub struct Enemy {
    pub player: Player,
    pub clan: String,
}

/// Everything scored for one level. Moved to the consumer on handoff.
#[derive(Debug, Default)]
pub struct LevelReport {
    pub map_name: Option<String>,
    pub enemies: HashMap<String, Enemy>,
    /// Awards first, then punishments; line order within each.
    pub score: Vec<DeathRecord>,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("scan game log: {0}")]
    GameLog(#[from] GameLogError),
    #[error("scan combat log: {0}")]
    CombatLog(#[from] CombatLogError),
    #[error("consumer dropped the report channel")]
    ConsumerGone,
    #[error("shutdown requested")]
    Cancelled,
}

enum ParseState {
    Running,
    Done,
}

/// Parser for one session's pair of logs. Forward-only, single use.
pub struct SessionParser<'r, G, C, R> {
    nickname: String,
    rules: &'r mut RuleSet<R>,
    game: GameLogScanner<G>,
    combat: CombatLogScanner<C>,
    state: ParseState,
}

impl<'r, G, C, R> SessionParser<'r, G, C, R>
where
    G: BufRead,
    C: BufRead,
    R: ClanResolver,
{
    pub fn new(
        nickname: impl Into<String>,
        game: G,
        combat: C,
        rules: &'r mut RuleSet<R>,
    ) -> Self {
        let nickname = nickname.into();
        Self {
            game: GameLogScanner::new(nickname.clone(), game),
            combat: CombatLogScanner::new(combat),
            nickname,
            rules,
            state: ParseState::Running,
        }
    }

    /// Run the level loop, publishing each completed report over `reports`.
    /// The send blocks until the consumer accepts; the shutdown signal is
    /// checked at that handoff point only.
    pub async fn parse(
        mut self,
        reports: mpsc::Sender<LevelReport>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), SessionError> {
        while let ParseState::Running = self.state {
            let Some(report) = self.parse_level().await? else {
                break;
            };

            tokio::select! {
                res = reports.send(report) => {
                    res.map_err(|_| SessionError::ConsumerGone)?;
                }
                _ = shutdown.changed() => return Err(SessionError::Cancelled),
            }
        }
        Ok(())
    }

    /// Parse one level. `None` means the game log was already exhausted.
    async fn parse_level(&mut self) -> Result<Option<LevelReport>, SessionError> {
        let (roster, last_level) = match self.game.scan_next_level()? {
            LevelScan::Level(roster) => (roster, false),
            LevelScan::LastLevel(roster) => (roster, true),
            LevelScan::EndOfLog => {
                self.state = ParseState::Done;
                return Ok(None);
            }
        };

        let enemies = roster.enemies();
        tracing::debug!(
            map = roster.map_name.as_deref().unwrap_or("?"),
            enemies = enemies.len(),
            "scanned level roster"
        );

        let mut awards = HashMap::new();
        for (name, enemy) in &enemies {
            if let Some(award) = self.rules.get_award(enemy).await {
                awards.insert(name.clone(), award);
            }
        }

        let scan = self.combat.scan_level(&self.nickname, roster.ends_at, |victim| {
            awards.get(victim).copied()
        })?;
        // Only game-log exhaustion ends the session; a drained combat log
        // still leaves later levels to report (with empty scores).
        if last_level {
            self.state = ParseState::Done;
        }

        let mut score = scan.awards;
        score.extend(scan.punishments);

        let enemies = self.display_enemies(enemies).await;
        Ok(Some(LevelReport {
            map_name: roster.map_name,
            enemies,
            score,
        }))
    }

    /// Attach a display clan to every enemy. Resolution failures degrade to
    /// an empty clan.
    async fn display_enemies(
        &mut self,
        enemies: HashMap<String, Player>,
    ) -> HashMap<String, Enemy> {
        let mut res = HashMap::new();
        for (name, player) in enemies {
            let clan = if player.clan_tag.is_empty() {
                match self.rules.resolver_mut().resolve(&name).await {
                    Ok(clan) => clan,
                    Err(err) => {
                        tracing::debug!(player = %name, error = %err, "no display clan");
                        String::new()
                    }
                }
            } else {
                player.clan_tag.clone()
            };
            res.insert(name, Enemy { player, clan });
        }
        res
    }
}

impl LevelReport {
    pub fn has_score(&self) -> bool {
        !self.score.is_empty()
    }

    pub fn enemy_clan(&self, name: &str) -> &str {
        self.enemies.get(name).map(|e| e.clan.as_str()).unwrap_or("")
    }
}
