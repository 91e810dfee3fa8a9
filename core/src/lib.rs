pub mod combat_log;
pub mod config;
pub mod game_log;
pub mod resolver;
pub mod rules;
pub mod session;

// Re-exports for convenience
pub use combat_log::{CombatLogScanner, CombatScan, DeathRecord};
pub use config::AppConfig;
pub use game_log::{GameLogScanner, LevelRoster, LevelScan, Player};
pub use resolver::{CachingResolver, ClanApi, ClanResolver, HttpClanApi};
pub use rules::{RuleSet, RulesError};
pub use session::{Enemy, LevelReport, SessionError, SessionParser};
