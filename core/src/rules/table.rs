//! The in-memory decision table consulted once per enemy.

use std::collections::HashMap;
use std::io::BufRead;

use super::parse::{RuleTables, parse_rules};
use super::RulesError;
use crate::game_log::Player;
use crate::resolver::ClanResolver;

/// Scoring rules with the clan resolver injected at construction. The
/// tables are read-only once loaded; only the resolver cache mutates.
pub struct RuleSet<C> {
    awards: HashMap<String, i32>,
    punishments: HashMap<String, i32>,
    clan_tags: HashMap<String, i32>,
    clan_names: HashMap<String, i32>,
    resolver: C,
}

impl<C: ClanResolver> RuleSet<C> {
    /// Parse the rules text and register the rename aliases with the
    /// resolver. An unresolvable alias aborts loading.
    pub async fn from_reader(rd: impl BufRead, resolver: C) -> Result<Self, RulesError> {
        let tables = parse_rules(rd)?;
        Self::from_tables(tables, resolver).await
    }

    pub async fn from_tables(tables: RuleTables, mut resolver: C) -> Result<Self, RulesError> {
        for (old, current) in &tables.aliases {
            resolver
                .add_alias(old, current)
                .await
                .map_err(|source| RulesError::Alias {
                    nickname: old.clone(),
                    source,
                })?;
        }
        Ok(Self {
            awards: tables.awards.into_iter().collect(),
            punishments: tables.punishments.into_iter().collect(),
            clan_tags: tables.clan_tags.into_iter().collect(),
            clan_names: tables.clan_names.into_iter().collect(),
            resolver,
        })
    }

    /// Decide the award for a kill of `player`. First match wins:
    /// nickname award, nickname punishment (waived while grouped), clan tag,
    /// then resolved clan name when the roster tag is empty.
    ///
    /// Resolution failures degrade to "not found"; they never abort the scan.
    pub async fn get_award(&mut self, player: &Player) -> Option<i32> {
        if let Some(&award) = self.awards.get(&player.name) {
            return Some(award);
        }
        if let Some(&punishment) = self.punishments.get(&player.name) {
            if player.in_group {
                return None;
            }
            return Some(punishment);
        }
        if !player.clan_tag.is_empty() {
            return self.clan_tags.get(&player.clan_tag).copied();
        }

        match self.resolver.resolve(&player.name).await {
            Ok(clan) => self.clan_names.get(&clan).copied(),
            Err(err) => {
                tracing::debug!(player = %player.name, error = %err, "clan resolution failed");
                None
            }
        }
    }

    pub fn resolver_mut(&mut self) -> &mut C {
        &mut self.resolver
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::ResolveError;

    /// Resolver backed by a fixed map; unknown names resolve to "".
    #[derive(Default)]
    struct MapResolver {
        clans: HashMap<String, String>,
        fail: bool,
    }

    impl MapResolver {
        fn with(clans: &[(&str, &str)]) -> Self {
            Self {
                clans: clans
                    .iter()
                    .map(|(n, c)| (n.to_string(), c.to_string()))
                    .collect(),
                fail: false,
            }
        }
    }

    impl ClanResolver for MapResolver {
        async fn resolve(&mut self, nickname: &str) -> Result<String, ResolveError> {
            if self.fail {
                return Err(ResolveError::Status(reqwest::StatusCode::BAD_GATEWAY));
            }
            Ok(self.clans.get(nickname).cloned().unwrap_or_default())
        }

        async fn add_alias(&mut self, old_name: &str, new_name: &str) -> Result<(), ResolveError> {
            let clan = self.resolve(new_name).await?;
            self.clans.insert(old_name.to_string(), clan);
            Ok(())
        }
    }

    fn player(name: &str, tag: &str, in_group: bool) -> Player {
        Player {
            name: name.to_string(),
            id: 1,
            clan_tag: tag.to_string(),
            in_group,
        }
    }

    async fn rules(text: &str, resolver: MapResolver) -> RuleSet<MapResolver> {
        RuleSet::from_reader(text.as_bytes(), resolver).await.unwrap()
    }

    const BASIC_RULES: &str = "\
=== PLAYERS ===
+1
lafan4ik
-100
fyringsved
=== CORPORATIONS ===
+5 HPrim
";

    #[tokio::test]
    async fn loads_the_event_rules() {
        let mut r = rules(BASIC_RULES, MapResolver::default()).await;
        assert_eq!(r.get_award(&player("lafan4ik", "", false)).await, Some(1));
        assert_eq!(r.get_award(&player("fyringsved", "", false)).await, Some(-100));
        assert_eq!(r.get_award(&player("other", "HPrim", false)).await, Some(5));
        assert_eq!(r.get_award(&player("nobody", "XYZ", false)).await, None);
    }

    #[tokio::test]
    async fn award_beats_punishment() {
        let text = "\
=== PLAYERS ===
+3
dual
-50
dual
";
        let mut r = rules(text, MapResolver::default()).await;
        assert_eq!(r.get_award(&player("dual", "", false)).await, Some(3));
    }

    #[tokio::test]
    async fn grouped_player_is_exempt_from_punishment() {
        let mut r = rules(BASIC_RULES, MapResolver::default()).await;
        assert_eq!(r.get_award(&player("fyringsved", "", true)).await, None);
        // Grouping does not waive awards.
        assert_eq!(r.get_award(&player("lafan4ik", "", true)).await, Some(1));
    }

    #[tokio::test]
    async fn resolves_clan_name_only_without_tag() {
        let text = "\
=== CORPORATIONS ===
+9
High Primary [HPR]
";
        let resolver = MapResolver::with(&[("tagless", "High Primary")]);
        let mut r = rules(text, resolver).await;

        // Roster tag wins over resolution.
        assert_eq!(r.get_award(&player("member", "HPR", false)).await, Some(9));
        // Tag present but unlisted: the resolver must not be consulted.
        assert_eq!(r.get_award(&player("tagless", "ZZZ", false)).await, None);
        // Empty tag goes through the resolver.
        assert_eq!(r.get_award(&player("tagless", "", false)).await, Some(9));
    }

    #[tokio::test]
    async fn resolver_failure_means_not_found() {
        let text = "\
=== CORPORATIONS ===
+9
High Primary [HPR]
";
        let mut resolver = MapResolver::with(&[("tagless", "High Primary")]);
        resolver.fail = true;
        let mut r = rules(text, resolver).await;
        assert_eq!(r.get_award(&player("tagless", "", false)).await, None);
    }

    #[tokio::test]
    async fn renamed_pilot_scores_under_both_names() {
        let text = "\
=== PLAYERS ===
+4
WasBefore, IsNow
";
        let resolver = MapResolver::with(&[("IsNow", "High Primary")]);
        let mut r = rules(text, resolver).await;
        assert_eq!(r.get_award(&player("WasBefore", "", false)).await, Some(4));
        assert_eq!(r.get_award(&player("IsNow", "", false)).await, Some(4));
        // The alias carried the clan over to the old name.
        assert_eq!(r.resolver_mut().resolve("WasBefore").await.unwrap(), "High Primary");
    }
}
