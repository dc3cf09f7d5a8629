use thiserror::Error;

use crate::parse::ParseError;
use crate::BuildError;

/// Unified error type covering parsing, tree construction, configuration,
/// and I/O.
///
/// Returned by convenience methods like
/// [`RuleTree::from_dsl()`](crate::RuleTree::from_dsl) and
/// [`ShieldOptions::from_json()`](crate::ShieldOptions::from_json).
#[derive(Debug, Error)]
pub enum RampartError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("invalid shield options: {0}")]
    Config(#[from] serde_json::Error),
}
