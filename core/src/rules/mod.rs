//! Per-kill scoring rules: player awards and punishments, clan bounties.

mod parse;
mod table;

pub use parse::RuleTables;
pub use table::RuleSet;

use thiserror::Error;

use crate::resolver::ResolveError;

#[derive(Debug, Error)]
pub enum RulesError {
    #[error("read rules: {0}")]
    Io(#[from] std::io::Error),
    #[error("parse score line {line:?}: {source}")]
    BadScore {
        line: String,
        source: std::num::ParseIntError,
    },
    #[error("register alias of {nickname:?}: {source}")]
    Alias {
        nickname: String,
        source: ResolveError,
    },
}
